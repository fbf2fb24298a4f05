//! Shared types passed between pipeline stages.
//!
//! Everything here is recomputed from scratch on every build; nothing is
//! persisted except [`GeneratedPageInfo`] values, which the hosting stage turns
//! into rewrite rules.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A page module found by discovery.
///
/// Built from static text analysis only; the module is never executed to
/// produce one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDescriptor {
    /// Absolute path of the page module.
    pub component_path: PathBuf,
    /// Output key: artifacts are named `{slug}.html`, `{slug}.css`, ...
    pub slug: String,
    /// Route the page is served at (`/` when not declared).
    pub route_url: String,
    /// Options block declares a head-content component.
    pub has_head: bool,
    /// Options block declares a context-wrapper function.
    pub has_context: bool,
}

/// An interactive component referenced from a page's import graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IslandDescriptor {
    /// Last segment of `import_path`, used as the registry key.
    pub name: String,
    /// Absolute path of the resolved component file.
    pub file_path: PathBuf,
    /// Logical path relative to the source root, e.g. `/components/Counter`.
    pub import_path: String,
}

/// Markup produced by the renderer for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedPage {
    pub body_html: String,
    pub head_html: String,
}

/// One optimized image written under the images directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedImageRecord {
    pub original_url: String,
    /// Public URL of the primary variant.
    pub local_url: String,
    pub width: u32,
    pub height: u32,
    /// File extension of the encoded output (`webp`, `avif`, ...).
    pub format: String,
    pub byte_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srcset: Option<String>,
}

/// Result record for one generated page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedPageInfo {
    pub slug: String,
    pub route_url: String,
    /// Path of the written HTML artifact.
    pub html_path: PathBuf,
}

/// A hosting rewrite: requests matching `source` are served `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostingRewriteRule {
    pub source: String,
    pub destination: String,
}

/// Outcome of a best-effort step.
///
/// Stages that degrade rather than fail return one of these so callers can
/// collect the reasons without unwinding the page pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Done(T),
    Skipped { reason: String },
}

impl<T> Outcome<T> {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Outcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }

    pub fn done(self) -> Option<T> {
        match self {
            Outcome::Done(value) => Some(value),
            Outcome::Skipped { .. } => None,
        }
    }

    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            Outcome::Done(_) => None,
            Outcome::Skipped { reason } => Some(reason),
        }
    }
}
