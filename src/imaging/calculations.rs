//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the output dimensions for an `<img>` from its declared size.
///
/// - Both dimensions declared: the declared box, scaled down uniformly if its
///   width exceeds the source.
/// - One dimension declared: the other follows the source aspect ratio.
/// - Nothing declared: the source dimensions.
///
/// Never upscales beyond the source's native resolution.
///
/// # Examples
/// ```
/// # use archipelago::imaging::calculate_target_dimensions;
/// // 1600x1200 source shown at width 400 → 400x300
/// assert_eq!(calculate_target_dimensions((1600, 1200), Some(400), None), (400, 300));
///
/// // Declared width larger than the source → clamped to 800x600
/// assert_eq!(calculate_target_dimensions((800, 600), Some(1200), None), (800, 600));
/// ```
pub fn calculate_target_dimensions(
    native: (u32, u32),
    declared_width: Option<u32>,
    declared_height: Option<u32>,
) -> (u32, u32) {
    let (native_w, native_h) = native;
    if native_w == 0 || native_h == 0 {
        return native;
    }

    match (declared_width, declared_height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => {
            if w <= native_w && h <= native_h {
                (w, h)
            } else {
                // Shrink the declared box uniformly until it fits the source
                let scale = (native_w as f64 / w as f64).min(native_h as f64 / h as f64);
                (
                    ((w as f64 * scale).round() as u32).max(1),
                    ((h as f64 * scale).round() as u32).max(1),
                )
            }
        }
        (Some(w), _) if w > 0 => {
            let w = w.min(native_w);
            (w, scale_height(native, w))
        }
        (_, Some(h)) if h > 0 => {
            let h = h.min(native_h);
            let w = (native_w as f64 * h as f64 / native_h as f64).round() as u32;
            (w.max(1), h)
        }
        _ => native,
    }
}

/// Height matching `width` at the source aspect ratio.
pub fn scale_height(native: (u32, u32), width: u32) -> u32 {
    let (native_w, native_h) = native;
    if native_w == 0 {
        return native_h;
    }
    ((native_h as f64 * width as f64 / native_w as f64).round() as u32).max(1)
}

/// A pixel-density variant for a srcset.
#[derive(Debug, Clone, PartialEq)]
pub struct DensitySize {
    pub multiplier: f64,
    /// Output width after clamping to the source.
    pub width: u32,
    pub height: u32,
}

/// Calculate srcset widths for a base display size.
///
/// Each multiplier scales the base box; results are clamped to the source
/// width and de-duplicated, so a multiplier that would upscale collapses onto
/// the native size instead of producing a second identical file. Output is
/// ordered by width.
pub fn calculate_density_sizes(
    native: (u32, u32),
    base: (u32, u32),
    multipliers: &[f64],
) -> Vec<DensitySize> {
    let (base_w, base_h) = base;
    let mut sizes: Vec<DensitySize> = Vec::new();

    for &multiplier in multipliers {
        if multiplier <= 0.0 {
            continue;
        }
        let scaled_w = (base_w as f64 * multiplier).round() as u32;
        let scaled_h = (base_h as f64 * multiplier).round() as u32;
        let (width, height) = calculate_target_dimensions(native, Some(scaled_w), Some(scaled_h));
        if sizes.iter().any(|s| s.width == width) {
            continue;
        }
        sizes.push(DensitySize {
            multiplier,
            width,
            height,
        });
    }

    sizes.sort_by_key(|s| s.width);
    sizes
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // calculate_target_dimensions tests
    // =========================================================================

    #[test]
    fn width_only_preserves_aspect() {
        assert_eq!(
            calculate_target_dimensions((2000, 1500), Some(400), None),
            (400, 300)
        );
    }

    #[test]
    fn height_only_preserves_aspect() {
        assert_eq!(
            calculate_target_dimensions((2000, 1500), None, Some(300)),
            (400, 300)
        );
    }

    #[test]
    fn both_declared_are_used_as_is() {
        // Declared box may crop-fit differently from the source; it is honoured
        assert_eq!(
            calculate_target_dimensions((2000, 1500), Some(400), Some(400)),
            (400, 400)
        );
    }

    #[test]
    fn never_upscales() {
        assert_eq!(
            calculate_target_dimensions((300, 200), Some(600), None),
            (300, 200)
        );
        assert_eq!(
            calculate_target_dimensions((300, 200), None, Some(800)),
            (300, 200)
        );
        // Declared 600x600 box on a 300x200 source → shrink to fit, keep box shape
        assert_eq!(
            calculate_target_dimensions((300, 200), Some(600), Some(600)),
            (200, 200)
        );
    }

    #[test]
    fn nothing_declared_is_native() {
        assert_eq!(calculate_target_dimensions((640, 480), None, None), (640, 480));
        assert_eq!(
            calculate_target_dimensions((640, 480), Some(0), None),
            (640, 480)
        );
    }

    // =========================================================================
    // calculate_density_sizes tests
    // =========================================================================

    #[test]
    fn density_sizes_scale_base() {
        let sizes = calculate_density_sizes((2000, 1500), (400, 300), &[1.0, 2.0]);
        let widths: Vec<u32> = sizes.iter().map(|s| s.width).collect();
        assert_eq!(widths, vec![400, 800]);
        assert_eq!(sizes[1].height, 600);
    }

    #[test]
    fn density_sizes_collapse_when_clamped() {
        // Source only 500px wide: 2x and 3x both clamp to 500
        let sizes = calculate_density_sizes((500, 375), (400, 300), &[1.0, 2.0, 3.0]);
        let widths: Vec<u32> = sizes.iter().map(|s| s.width).collect();
        assert_eq!(widths, vec![400, 500]);
    }

    #[test]
    fn density_sizes_ordered_by_width() {
        let sizes = calculate_density_sizes((4000, 3000), (400, 300), &[2.0, 1.5, 1.0]);
        let widths: Vec<u32> = sizes.iter().map(|s| s.width).collect();
        assert_eq!(widths, vec![400, 600, 800]);
    }

    #[test]
    fn density_sizes_skip_non_positive_multipliers() {
        let sizes = calculate_density_sizes((4000, 3000), (400, 300), &[0.0, -1.0, 1.0]);
        assert_eq!(sizes.len(), 1);
    }
}
