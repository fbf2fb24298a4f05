//! Per-page hydration bundles.
//!
//! For a page with islands, generates an entry module that imports exactly
//! those islands, registers them by import path (and by name, where the name
//! is unambiguous), and hydrates every `[data-island]` element on load. The
//! entry is bundled into `{slug}-hydrate.js`. Pages without islands get no
//! script at all.

use crate::bundle::{BundleError, BundleRequest, Bundler, ScratchBuild, js_string};
use crate::config::BuildConfig;
use crate::naming::hydrate_file_name;
use crate::types::{IslandDescriptor, PageDescriptor};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use thiserror::Error;
use tracing::debug;

const BOOTSTRAP: &str = include_str!("../static/hydrate-bootstrap.js");

#[derive(Error, Debug)]
pub enum HydrateError {
    #[error("Hydration bundle failed: {0}")]
    Bundle(#[from] BundleError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Bundler emitted no script for {slug}")]
    NoOutput { slug: String },
}

/// Source of the synthetic hydration entry for `islands`.
pub fn hydration_entry(islands: &[IslandDescriptor]) -> String {
    let mut name_counts: HashMap<&str, usize> = HashMap::new();
    for island in islands {
        *name_counts.entry(island.name.as_str()).or_default() += 1;
    }

    let mut src = String::new();
    src.push_str("import { createElement } from \"react\";\n");
    src.push_str("import { hydrateRoot } from \"react-dom/client\";\n");
    for (i, island) in islands.iter().enumerate() {
        let _ = writeln!(
            src,
            "import Island{i} from {};",
            js_string(&island.file_path.to_string_lossy())
        );
    }

    src.push_str("\nconst islands = {\n");
    for (i, island) in islands.iter().enumerate() {
        let _ = writeln!(src, "  {}: Island{i},", js_string(&island.import_path));
        if name_counts.get(island.name.as_str()) == Some(&1) && island.name != island.import_path
        {
            let _ = writeln!(src, "  {}: Island{i},", js_string(&island.name));
        }
    }
    src.push_str("};\n\n");
    src.push_str(BOOTSTRAP);
    src
}

/// Build `{slug}-hydrate.js` for a page.
///
/// Returns `None` without touching the bundler when the page has no islands.
pub fn build_hydration(
    page: &PageDescriptor,
    islands: &[IslandDescriptor],
    config: &BuildConfig,
    bundler: &dyn Bundler,
) -> Result<Option<String>, HydrateError> {
    let file_name = hydrate_file_name(&page.slug);
    let target = config.out_dir.join(&file_name);
    if islands.is_empty() {
        if target.exists() {
            fs::remove_file(&target)?;
        }
        return Ok(None);
    }

    let scratch = ScratchBuild::new(&config.scratch_dir, &format!("hydrate-{}", page.slug))?;
    let entry = scratch.write_entry("entry.jsx", &hydration_entry(islands))?;
    let entry_name = file_name.trim_end_matches(".js");

    let js = &config.js;
    let mut request = BundleRequest::new(&entry, &scratch.out_dir(), entry_name);
    request.minify = js.minifier == "esbuild";
    request.target = Some(js.target.clone());
    request.drop_console = js.drop_console;
    request.keep_names = js.keep_names;
    request.legal_comments = Some(js.legal_comments.clone());
    request.extra_args = config.plugins.clone();
    let output = bundler.bundle(&request)?;

    let script = output.find("js").ok_or_else(|| HydrateError::NoOutput {
        slug: page.slug.clone(),
    })?;
    fs::create_dir_all(&config.out_dir)?;
    fs::copy(script, &target)?;
    debug!(slug = %page.slug, islands = islands.len(), "wrote hydration bundle");
    Ok(Some(config.public_url(&file_name)))
}
