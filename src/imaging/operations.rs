//! High-level image operations.
//!
//! These functions combine calculations with backend execution. Planning is
//! pure: it decides file names and sizes for one `<img>`. Execution hands the
//! variants that still need writing to the backend in a single decode.

use super::backend::{BackendError, ImageBackend};
use super::calculations::{calculate_density_sizes, calculate_target_dimensions};
use super::params::{OutputFormat, Quality, TranscodeParams};
use crate::naming::image_file_name;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// One output file an image needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedVariant {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

/// Every output file for one image occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlan {
    pub format: OutputFormat,
    pub primary: PlannedVariant,
    /// Srcset candidates ordered by width. May contain the primary itself.
    pub density: Vec<PlannedVariant>,
}

impl ImagePlan {
    /// All distinct files the plan refers to, primary first.
    pub fn files(&self) -> Vec<&PlannedVariant> {
        let mut files = vec![&self.primary];
        for variant in &self.density {
            if variant.file_name != self.primary.file_name {
                files.push(variant);
            }
        }
        files
    }

    /// Srcset candidates with pixel-density descriptors relative to the
    /// primary, or `None` when the plan has a single file.
    ///
    /// The primary is always listed as `1x`. A multiplier clamped by the
    /// source gets its effective density (500px wide over a 400px primary is
    /// `1.25x`).
    pub fn density_candidates(&self) -> Option<Vec<(&PlannedVariant, String)>> {
        let mut files = self.files();
        if files.len() < 2 {
            return None;
        }
        files.sort_by_key(|v| v.width);
        let base = self.primary.width.max(1) as f64;
        Some(
            files
                .into_iter()
                .map(|v| (v, density_descriptor(v.width as f64 / base)))
                .collect(),
        )
    }
}

/// `2.0` → `2x`, `1.25` → `1.25x`.
fn density_descriptor(density: f64) -> String {
    let fixed = format!("{density:.2}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed}x")
}

fn variant(url: &str, (width, height): (u32, u32), format: OutputFormat) -> PlannedVariant {
    PlannedVariant {
        file_name: image_file_name(url, width, height, format.extension()),
        width,
        height,
    }
}

/// Plan the primary output and srcset variants for an image.
///
/// An empty `multipliers` slice disables srcset generation.
pub fn plan_image(
    url: &str,
    native: (u32, u32),
    declared: (Option<u32>, Option<u32>),
    format: OutputFormat,
    multipliers: &[f64],
) -> ImagePlan {
    let base = calculate_target_dimensions(native, declared.0, declared.1);
    let density = calculate_density_sizes(native, base, multipliers)
        .into_iter()
        .map(|size| variant(url, (size.width, size.height), format))
        .collect();

    ImagePlan {
        format,
        primary: variant(url, base, format),
        density,
    }
}

/// Write every file of `plan` that was not already written this run.
///
/// `written` maps output paths to their byte size and is shared across all
/// images of a run, so identical URL/width pairs are encoded once. Returns the
/// primary file's byte size.
pub fn execute_plan(
    backend: &(impl ImageBackend + ?Sized),
    source: &[u8],
    plan: &ImagePlan,
    output_dir: &Path,
    quality: Quality,
    written: &mut HashMap<PathBuf, u64>,
) -> Result<u64> {
    let pending: Vec<TranscodeParams> = plan
        .files()
        .into_iter()
        .map(|v| (v, output_dir.join(&v.file_name)))
        .filter(|(_, path)| !written.contains_key(path))
        .map(|(v, output)| TranscodeParams {
            output,
            width: v.width,
            height: v.height,
            format: plan.format,
            quality,
        })
        .collect();

    let sizes = backend.transcode(source, &pending)?;
    for (params, size) in pending.into_iter().zip(sizes) {
        written.insert(params.output, size);
    }

    let primary = output_dir.join(&plan.primary.file_name);
    Ok(written.get(&primary).copied().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};

    const URL: &str = "https://cdn.example.com/photo.jpg";

    #[test]
    fn plan_uses_declared_width() {
        let plan = plan_image(URL, (1600, 1200), (Some(400), None), OutputFormat::Webp, &[]);

        assert_eq!(plan.primary.width, 400);
        assert_eq!(plan.primary.height, 300);
        assert!(plan.primary.file_name.ends_with("-400x300.webp"));
        assert!(plan.density.is_empty());
    }

    #[test]
    fn plan_is_deterministic() {
        let a = plan_image(URL, (1600, 1200), (Some(400), None), OutputFormat::Webp, &[1.0, 2.0]);
        let b = plan_image(URL, (1600, 1200), (Some(400), None), OutputFormat::Webp, &[1.0, 2.0]);
        assert_eq!(a, b);
    }

    #[test]
    fn plan_files_skip_density_matching_primary() {
        let plan = plan_image(URL, (1600, 1200), (Some(400), None), OutputFormat::Webp, &[1.0, 2.0]);

        let widths: Vec<u32> = plan.density.iter().map(|v| v.width).collect();
        assert_eq!(widths, vec![400, 800]);
        // 1x is the primary itself, so only one extra file
        let files: Vec<u32> = plan.files().iter().map(|v| v.width).collect();
        assert_eq!(files, vec![400, 800]);
    }

    #[test]
    fn plan_clamped_density_collapses_onto_primary() {
        // Source is exactly the display size; 2x cannot exceed it
        let plan = plan_image(URL, (400, 300), (Some(400), None), OutputFormat::Webp, &[1.0, 2.0]);
        assert_eq!(plan.files().len(), 1);
    }

    #[test]
    fn same_width_different_box_gets_its_own_file() {
        let square = plan_image(URL, (1600, 1200), (Some(400), Some(400)), OutputFormat::Jpeg, &[]);
        let natural = plan_image(URL, (1600, 1200), (Some(400), None), OutputFormat::Jpeg, &[]);

        assert_eq!((square.primary.width, square.primary.height), (400, 400));
        assert_eq!((natural.primary.width, natural.primary.height), (400, 300));
        assert_ne!(square.primary.file_name, natural.primary.file_name);
    }

    #[test]
    fn density_candidates_use_x_descriptors() {
        let plan = plan_image(URL, (1600, 1200), (Some(400), None), OutputFormat::Webp, &[1.0, 2.0]);
        let candidates = plan.density_candidates().unwrap();
        let descriptors: Vec<&str> = candidates.iter().map(|(_, d)| d.as_str()).collect();
        assert_eq!(descriptors, vec!["1x", "2x"]);
        assert_eq!(candidates[0].0.file_name, plan.primary.file_name);
    }

    #[test]
    fn density_candidates_report_clamped_density() {
        // 2x of 400 clamps to the 500px source
        let plan = plan_image(URL, (500, 375), (Some(400), None), OutputFormat::Webp, &[1.0, 2.0]);
        let descriptors: Vec<String> = plan
            .density_candidates()
            .unwrap()
            .into_iter()
            .map(|(_, d)| d)
            .collect();
        assert_eq!(descriptors, vec!["1x", "1.25x"]);
    }

    #[test]
    fn density_candidates_include_primary_when_only_higher_multipliers() {
        let plan = plan_image(URL, (1600, 1200), (Some(400), None), OutputFormat::Webp, &[2.0]);
        let descriptors: Vec<String> = plan
            .density_candidates()
            .unwrap()
            .into_iter()
            .map(|(_, d)| d)
            .collect();
        assert_eq!(descriptors, vec!["1x", "2x"]);
    }

    #[test]
    fn single_file_plan_has_no_candidates() {
        let plan = plan_image(URL, (400, 300), (Some(400), None), OutputFormat::Webp, &[1.0, 2.0]);
        assert_eq!(plan.density_candidates(), None);
    }

    #[test]
    fn execute_writes_all_files_once() {
        let backend = MockBackend::with_dimensions(1600, 1200);
        let plan = plan_image(URL, (1600, 1200), (Some(400), None), OutputFormat::Webp, &[1.0, 2.0]);
        let mut written = HashMap::new();

        let size = execute_plan(
            &backend,
            b"src",
            &plan,
            Path::new("/out/images"),
            Quality::new(75),
            &mut written,
        )
        .unwrap();

        assert_eq!(size, 4000);
        assert_eq!(written.len(), 2);
        let ops = backend.get_operations();
        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[0], RecordedOp::Transcode { width: 400, quality: 75, .. }));
        assert!(matches!(&ops[1], RecordedOp::Transcode { width: 800, .. }));
    }

    #[test]
    fn execute_skips_files_written_earlier_in_run() {
        let backend = MockBackend::with_dimensions(1600, 1200);
        let mut written = HashMap::new();

        let first = plan_image(URL, (1600, 1200), (Some(800), None), OutputFormat::Webp, &[]);
        execute_plan(&backend, b"src", &first, Path::new("/out"), Quality::default(), &mut written)
            .unwrap();

        // 400w primary is new; its 2x variant is the 800w file from above
        let second =
            plan_image(URL, (1600, 1200), (Some(400), None), OutputFormat::Webp, &[1.0, 2.0]);
        let size = execute_plan(
            &backend,
            b"src",
            &second,
            Path::new("/out"),
            Quality::default(),
            &mut written,
        )
        .unwrap();

        assert_eq!(size, 4000);
        let outputs = backend.transcoded_outputs();
        assert_eq!(outputs.len(), 2);
        assert!(outputs[0].ends_with("-800x600.webp"));
        assert!(outputs[1].ends_with("-400x300.webp"));
    }

    #[test]
    fn execute_propagates_backend_failure() {
        let backend =
            MockBackend::with_dimensions(100, 100).only_formats(vec![OutputFormat::Jpeg]);
        let plan = plan_image(URL, (100, 100), (None, None), OutputFormat::Webp, &[]);
        let mut written = HashMap::new();

        let result = execute_plan(
            &backend,
            b"src",
            &plan,
            Path::new("/out"),
            Quality::default(),
            &mut written,
        );
        assert!(result.is_err());
        assert!(written.is_empty());
    }
}
