//! Hosting manifest synchronization.
//!
//! Rewrites the `rewrites` array of a `firebase.json`-style manifest so each
//! generated page's route serves its HTML artifact. The manifest is owned by
//! the project; only rules this stage can recognize as its own (destination
//! under the base URL, ending in `.html`) are ever removed. New rules go
//! directly in front of the first catch-all rule so they take precedence
//! over it, or at the start when there is none.

use crate::naming::html_file_name;
use crate::types::{GeneratedPageInfo, HostingRewriteRule};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Rule sources treated as catch-all.
pub const CATCH_ALL_SOURCES: &[&str] = &["**", "/**", "**/*"];

#[derive(Error, Debug)]
pub enum HostingError {
    #[error("Hosting manifest not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid hosting manifest JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} has no hosting section")]
    MissingHosting(PathBuf),
    #[error("Malformed hosting manifest: {0}")]
    Malformed(String),
}

/// What a sync changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub removed: usize,
    pub added: Vec<HostingRewriteRule>,
}

/// Rewrite rules for generated pages, in page order.
pub fn rewrite_rules(pages: &[GeneratedPageInfo], base_url: &str) -> Vec<HostingRewriteRule> {
    let base = base_url.trim_end_matches('/');
    pages
        .iter()
        .map(|page| HostingRewriteRule {
            source: page.route_url.clone(),
            destination: format!("{base}/{}", html_file_name(&page.slug)),
        })
        .collect()
}

/// True if a rule was written by a previous sync.
pub fn is_generated_rule(rule: &Value, base_url: &str) -> bool {
    let prefix = format!("{}/", base_url.trim_end_matches('/'));
    rule.get("destination")
        .and_then(Value::as_str)
        .is_some_and(|d| d.starts_with(&prefix) && d.ends_with(".html"))
}

fn is_catch_all(rule: &Value) -> bool {
    rule.get("source")
        .and_then(Value::as_str)
        .is_some_and(|s| CATCH_ALL_SOURCES.contains(&s))
}

/// Apply rules for `pages` to a parsed manifest.
pub fn apply_rewrites(
    manifest: &mut Value,
    manifest_path: &Path,
    pages: &[GeneratedPageInfo],
    base_url: &str,
) -> Result<SyncSummary, HostingError> {
    let hosting = match manifest.get_mut("hosting") {
        Some(Value::Array(sections)) => sections
            .first_mut()
            .ok_or_else(|| HostingError::MissingHosting(manifest_path.to_path_buf()))?,
        Some(section @ Value::Object(_)) => section,
        Some(_) => {
            return Err(HostingError::Malformed(
                "\"hosting\" must be an object or an array of objects".into(),
            ));
        }
        None => return Err(HostingError::MissingHosting(manifest_path.to_path_buf())),
    };
    let section = hosting
        .as_object_mut()
        .ok_or_else(|| HostingError::Malformed("hosting section must be an object".into()))?;
    let rewrites = section
        .entry("rewrites")
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| HostingError::Malformed("\"rewrites\" must be an array".into()))?;

    let before = rewrites.len();
    rewrites.retain(|rule| !is_generated_rule(rule, base_url));
    let removed = before - rewrites.len();

    let added = rewrite_rules(pages, base_url);
    let insert_at = rewrites.iter().position(is_catch_all).unwrap_or(0);
    let new_rules = added
        .iter()
        .map(|rule| serde_json::json!({ "source": rule.source, "destination": rule.destination }));
    rewrites.splice(insert_at..insert_at, new_rules);

    Ok(SyncSummary { removed, added })
}

/// Read, update and rewrite the manifest at `path`.
pub fn sync_hosting(
    path: &Path,
    pages: &[GeneratedPageInfo],
    base_url: &str,
) -> Result<SyncSummary, HostingError> {
    if !path.is_file() {
        return Err(HostingError::NotFound(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path).map_err(|source| HostingError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut manifest: Value = serde_json::from_str(&raw)?;
    let summary = apply_rewrites(&mut manifest, path, pages, base_url)?;

    let mut out = serde_json::to_string_pretty(&manifest)?;
    out.push('\n');
    fs::write(path, out).map_err(|source| HostingError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        manifest = %path.display(),
        removed = summary.removed,
        added = summary.added.len(),
        "hosting rewrites updated"
    );
    Ok(summary)
}
