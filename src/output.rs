//! CLI output formatting.
//!
//! Every display is built by a pure `format_*` function returning lines, with
//! a thin `print_*` wrapper around it, so the exact output is unit tested
//! without capturing stdout.
//!
//! Pages lead with their positional index and slug; routes, source files and
//! artifacts follow as indented context lines.
//!
//! # Output Format
//!
//! ## Discover
//!
//! ```text
//! Pages
//! 001 about → /about
//!     Source: pages/About.tsx
//!     Options: head, context
//!     Island: /components/Counter
//!     Dropped: /components/Plain (missing "use client" directive)
//! 002 home → /
//!     Source: pages/Home.tsx
//!
//! Skipped
//!     pages/notes.tsx (no pageOptions block)
//! ```
//!
//! ## Build
//!
//! ```text
//! Found 2 pages
//! [1/2] about → /about
//!     HTML: about.html
//!     CSS: /static/about.css
//!     Hydration: /static/about-hydrate.js (1 island)
//!     Images: 1 optimized (12.0 KB)
//! [2/2] home → /
//!     HTML: home.html
//! Hosting: firebase.json (2 rules added, 2 replaced)
//! ```

use crate::pipeline::{BuildEvent, BuildReport, Inventory, PageSummary};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `about → /about`
fn page_header(slug: &str, route_url: &str) -> String {
    format!("{} → {}", slug, route_url)
}

/// Path relative to `root` when it lives below it.
fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// Byte count in B / KB / MB.
fn human_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

// ============================================================================
// Discover
// ============================================================================

/// Page inventory: options, islands, and dropped references per page.
pub fn format_inventory(inventory: &Inventory, root: &Path) -> Vec<String> {
    let mut lines = vec!["Pages".to_string()];
    for (i, (page, scan)) in inventory.pages.iter().enumerate() {
        lines.push(format!(
            "{} {}",
            format_index(i + 1),
            page_header(&page.slug, &page.route_url)
        ));
        lines.push(format!(
            "{}Source: {}",
            indent(1),
            display_path(&page.component_path, root)
        ));

        let options: Vec<&str> = [(page.has_head, "head"), (page.has_context, "context")]
            .into_iter()
            .filter_map(|(present, name)| present.then_some(name))
            .collect();
        if !options.is_empty() {
            lines.push(format!("{}Options: {}", indent(1), options.join(", ")));
        }
        for island in &scan.islands {
            lines.push(format!("{}Island: {}", indent(1), island.import_path));
        }
        for (path, reason) in &scan.dropped {
            lines.push(format!("{}Dropped: {} ({})", indent(1), path, reason));
        }
    }

    if !inventory.skipped_files.is_empty() {
        lines.push(String::new());
        lines.push("Skipped".to_string());
        for (path, reason) in &inventory.skipped_files {
            lines.push(format!(
                "{}{} ({})",
                indent(1),
                display_path(path, root),
                reason
            ));
        }
    }
    lines
}

pub fn print_inventory(inventory: &Inventory, root: &Path) {
    for line in format_inventory(inventory, root) {
        println!("{}", line);
    }
}

// ============================================================================
// Build
// ============================================================================

/// Context lines for a finished page.
fn page_lines(summary: &PageSummary) -> Vec<String> {
    let mut lines = Vec::new();
    let html_name = summary
        .html_path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| summary.html_path.display().to_string());
    lines.push(format!("{}HTML: {}", indent(1), html_name));

    if let Some(css) = &summary.css_url {
        lines.push(format!("{}CSS: {}", indent(1), css));
    }
    if let Some(js) = &summary.hydrate_url {
        lines.push(format!(
            "{}Hydration: {} ({})",
            indent(1),
            js,
            plural(summary.islands.len(), "island")
        ));
    }
    if !summary.images.is_empty() {
        let bytes: u64 = summary.images.iter().map(|i| i.byte_size).sum();
        lines.push(format!(
            "{}Images: {} optimized ({})",
            indent(1),
            summary.images.len(),
            human_bytes(bytes)
        ));
    }
    for warning in &summary.warnings {
        lines.push(format!("{}Warning: {}", indent(1), warning));
    }
    lines
}

/// Format a single build progress event as display lines.
pub fn format_build_event(event: &BuildEvent) -> Vec<String> {
    match event {
        BuildEvent::Discovered { pages, skipped } => {
            if *skipped == 0 {
                vec![format!("Found {}", plural(*pages, "page"))]
            } else {
                vec![format!(
                    "Found {} ({} skipped)",
                    plural(*pages, "page"),
                    plural(*skipped, "file")
                )]
            }
        }
        BuildEvent::PageStarted {
            index,
            total,
            slug,
            route_url,
        } => vec![format!(
            "[{}/{}] {}",
            index,
            total,
            page_header(slug, route_url)
        )],
        BuildEvent::PageFinished(summary) => page_lines(summary),
        BuildEvent::PageFailed { message, .. } => {
            vec![format!("{}FAILED: {}", indent(1), message)]
        }
        BuildEvent::HostingSynced { manifest, summary } => {
            let name = manifest
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| manifest.display().to_string());
            vec![format!(
                "Hosting: {} ({} added, {} replaced)",
                name,
                plural(summary.added.len(), "rule"),
                summary.removed
            )]
        }
        BuildEvent::HostingSkipped { reason } => vec![format!("Hosting: skipped, {}", reason)],
    }
}

/// Closing summary after a build.
pub fn format_build_summary(report: &BuildReport, out_dir: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    if report.is_success() {
        lines.push(format!(
            "==> Built {} → {}",
            plural(report.pages.len(), "page"),
            out_dir.display()
        ));
    } else {
        lines.push(format!(
            "==> Built {}, {} failed",
            plural(report.pages.len(), "page"),
            report.failures.len()
        ));
        for failure in &report.failures {
            lines.push(format!("{}{}", indent(1), failure));
        }
    }
    lines
}

pub fn print_build_summary(report: &BuildReport, out_dir: &Path) {
    for line in format_build_summary(report, out_dir) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
