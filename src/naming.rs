//! Artifact naming.
//!
//! Every file the build writes gets its name from here, so the HTML template,
//! the hosting configurator and the dev middleware agree on where a page's
//! artifacts live.
//!
//! ## Page artifacts
//!
//! ```text
//! {out_dir}/{slug}.html
//! {out_dir}/{slug}.css            # only if the page has styles
//! {out_dir}/{slug}-hydrate.js     # only if the page has islands
//! {out_dir}/images/{hash}-{w}x{h}.{ext}
//! ```
//!
//! ## Image names
//!
//! Optimized image names are derived from a SHA-256 of the source URL plus the
//! effective output box, never from the image bytes. The same logical image
//! at the same size always lands on the same file, which makes re-running the
//! optimizer idempotent without any manifest of previous runs. Two tags that
//! share a URL and width but declare different heights get different files.

use sha2::{Digest, Sha256};

/// Hex characters of the URL digest kept in image filenames.
const HASH_LEN: usize = 16;

pub fn html_file_name(slug: &str) -> String {
    format!("{slug}.html")
}

pub fn css_file_name(slug: &str) -> String {
    format!("{slug}.css")
}

pub fn hydrate_file_name(slug: &str) -> String {
    format!("{slug}-hydrate.js")
}

/// SHA-256 of a URL, truncated to [`HASH_LEN`] hex characters.
pub fn url_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..HASH_LEN].to_string()
}

/// Filename of an optimized image variant.
pub fn image_file_name(url: &str, width: u32, height: u32, extension: &str) -> String {
    format!("{}-{}x{}.{}", url_hash(url), width, height, extension)
}

/// Last path segment of a logical import path (`/components/Counter` → `Counter`).
///
/// A trailing `/index` segment is skipped so `./Counter/index` still names the
/// component after its directory.
pub fn island_name(import_path: &str) -> String {
    let trimmed = import_path.trim_end_matches('/');
    let mut segments = trimmed.rsplit('/').filter(|s| !s.is_empty());
    let last = segments.next().unwrap_or(trimmed);
    let stem = strip_code_extension(last);
    if stem == "index" {
        if let Some(parent) = segments.next() {
            return parent.to_string();
        }
    }
    stem.to_string()
}

fn strip_code_extension(segment: &str) -> &str {
    for ext in [".tsx", ".ts", ".jsx", ".js", ".mjs"] {
        if let Some(stem) = segment.strip_suffix(ext) {
            return stem;
        }
    }
    segment
}
