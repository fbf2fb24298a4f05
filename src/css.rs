//! Per-page CSS bundles.
//!
//! The bundler only emits the CSS a module graph actually imports, so the
//! cheapest way to get exactly one page's styles is to bundle a throwaway
//! entry that imports the global stylesheet and then the page. The JS that
//! comes out of that build is never copied out of the scratch directory.

use crate::bundle::{BundleError, BundleRequest, Bundler, Platform, ScratchBuild, import_statement};
use crate::config::BuildConfig;
use crate::naming::css_file_name;
use crate::types::PageDescriptor;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum CssError {
    #[error("CSS bundle failed: {0}")]
    Bundle(#[from] BundleError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of the synthetic entry: global stylesheet first, then the page.
pub fn css_entry(global_stylesheet: Option<&Path>, page: &Path) -> String {
    let mut entry = String::new();
    if let Some(sheet) = global_stylesheet {
        entry.push_str(&import_statement(sheet));
        entry.push('\n');
    }
    entry.push_str(&import_statement(page));
    entry.push('\n');
    entry
}

/// Build `{slug}.css` for a page.
///
/// Returns the stylesheet's public URL, or `None` when the page pulls in no
/// styles at all.
pub fn build_css(
    page: &PageDescriptor,
    config: &BuildConfig,
    bundler: &dyn Bundler,
) -> Result<Option<String>, CssError> {
    let global = global_stylesheet(config);
    let scratch = ScratchBuild::new(&config.scratch_dir, &format!("css-{}", page.slug))?;
    let entry = scratch.write_entry(
        "entry.js",
        &css_entry(global.as_deref(), &page.component_path),
    )?;

    let mut request = BundleRequest::new(&entry, &scratch.out_dir(), &page.slug);
    // Pages may pull in server-only modules; the JS half of this build is discarded.
    request.platform = Platform::Node;
    request.minify = config.css.minifier == "esbuild";
    request.extra_args = config.plugins.clone();
    let output = bundler.bundle(&request)?;

    let target = config.out_dir.join(css_file_name(&page.slug));
    let css = match output.find("css") {
        Some(path) => fs::read_to_string(path)?,
        None => String::new(),
    };
    if css.trim().is_empty() {
        debug!(slug = %page.slug, "page has no styles");
        if target.exists() {
            fs::remove_file(&target)?;
        }
        return Ok(None);
    }

    fs::create_dir_all(&config.out_dir)?;
    fs::write(&target, css)?;
    debug!(slug = %page.slug, path = %target.display(), "wrote stylesheet");
    Ok(Some(config.public_url(&css_file_name(&page.slug))))
}

fn global_stylesheet(config: &BuildConfig) -> Option<PathBuf> {
    let path = &config.css.global_stylesheet;
    if path.as_os_str().is_empty() {
        return None;
    }
    if !path.is_file() {
        warn!(path = %path.display(), "global stylesheet not found, skipping it");
        return None;
    }
    std::path::absolute(path).ok()
}
