//! Page discovery.
//!
//! Stage 1 of the build pipeline. Finds page modules and reads their
//! `pageOptions` block **without executing them**. Evaluating a page would need
//! a full module environment, including server-only providers, long before
//! the render stage actually needs one; reading the file text is enough to
//! learn the slug and route.
//!
//! ## Page module shape
//!
//! ```tsx
//! export const pageOptions = {
//!   slug: "about",          // required, string literal
//!   routeUrl: "/about",     // optional, defaults to "/"
//!   Head: AboutHead,        // optional head-content component
//!   context: async (app, { routeUrl }) => <Router url={routeUrl}>{app}</Router>,
//! };
//!
//! export default function About() { ... }
//! ```
//!
//! ## Input modes
//!
//! - **File**: the file must carry a `pageOptions` block with a string `slug`,
//!   otherwise discovery fails (there is nothing else to build).
//! - **Directory**: immediate `.tsx`/`.jsx` files are scanned; files without an
//!   options block, files that are not UTF-8 text and pages whose slug would
//!   leave the output directory are skipped with a warning. Zero pages overall
//!   is an error.
//!
//! Duplicate slugs are kept: the later page overwrites the earlier page's
//! artifacts. A warning names both files.

use crate::resolve::strip_comments;
use crate::types::PageDescriptor;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Name of the exported options constant.
pub const OPTIONS_EXPORT: &str = "pageOptions";

/// Extensions of page component files in directory mode.
pub const PAGE_EXTENSIONS: &[&str] = &["tsx", "jsx"];

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Input not found: {0}")]
    NotFound(PathBuf),
    #[error("{0} does not export a `pageOptions` block with a string `slug`")]
    MissingOptions(PathBuf),
    #[error("No page modules with a `pageOptions` block found in {0}")]
    NoPages(PathBuf),
    #[error("{path} declares slug `{slug}`, which is not a relative path inside the output directory")]
    InvalidSlug { path: PathBuf, slug: String },
}

/// Result of a discovery run.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Conforming pages, in file-name order.
    pub pages: Vec<PageDescriptor>,
    /// Files skipped in directory mode, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

/// Options extracted from a page module's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOptions {
    pub slug: String,
    pub route_url: Option<String>,
    pub has_head: bool,
    pub has_context: bool,
}

static OPTIONS_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"export\s+(?:const|let|var)\s+{OPTIONS_EXPORT}\b[^=]*=\s*\{{"
    ))
    .unwrap()
});

static HEAD_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[\s,{])(?:Head|head)\s*(?:[:,}(]|$)").unwrap());

static CONTEXT_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[\s,{])(?:async\s+)?context\s*(?:[:,}(]|$)").unwrap());

/// Discover pages from a file or directory path.
pub fn discover(input: &Path) -> Result<Discovery, DiscoverError> {
    if !input.exists() {
        return Err(DiscoverError::NotFound(input.to_path_buf()));
    }
    let input = std::path::absolute(input)?;

    if input.is_file() {
        let source = fs::read_to_string(&input)?;
        let options = parse_page_options(&source)
            .ok_or_else(|| DiscoverError::MissingOptions(input.clone()))?;
        if !is_valid_slug(&options.slug) {
            return Err(DiscoverError::InvalidSlug {
                path: input,
                slug: options.slug,
            });
        }
        return Ok(Discovery {
            pages: vec![descriptor(input, options)],
            skipped: Vec::new(),
        });
    }

    let mut discovery = Discovery::default();
    for entry in WalkDir::new(&input)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_page_file(e.path()))
    {
        let path = entry.into_path();
        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(e) => {
                warn!(path = %path.display(), "skipping unreadable file: {e}");
                discovery.skipped.push((path, format!("unreadable: {e}")));
                continue;
            }
        };
        match parse_page_options(&source) {
            Some(options) if !is_valid_slug(&options.slug) => {
                warn!(path = %path.display(), slug = %options.slug, "skipping page with an invalid slug");
                discovery
                    .skipped
                    .push((path, format!("invalid slug `{}`", options.slug)));
            }
            Some(options) => {
                debug!(path = %path.display(), slug = %options.slug, "page discovered");
                discovery.pages.push(descriptor(path, options));
            }
            None => {
                warn!(path = %path.display(), "skipping file without a pageOptions block");
                discovery
                    .skipped
                    .push((path, format!("no `{OPTIONS_EXPORT}` block")));
            }
        }
    }

    if discovery.pages.is_empty() {
        return Err(DiscoverError::NoPages(input));
    }
    warn_duplicate_slugs(&discovery.pages);
    Ok(discovery)
}

fn descriptor(component_path: PathBuf, options: PageOptions) -> PageDescriptor {
    PageDescriptor {
        component_path,
        slug: options.slug,
        route_url: options.route_url.unwrap_or_else(|| "/".to_string()),
        has_head: options.has_head,
        has_context: options.has_context,
    }
}

/// A slug names files under the output directory: non-empty, relative, and
/// made of plain segments only (`blog/post` is fine, `../x` and `/x` are not).
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.trim().is_empty()
        && !slug.contains('\\')
        && Path::new(slug)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

fn is_page_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| PAGE_EXTENSIONS.contains(&e))
}

fn warn_duplicate_slugs(pages: &[PageDescriptor]) {
    let mut seen: HashMap<&str, &Path> = HashMap::new();
    for page in pages {
        if let Some(earlier) = seen.insert(&page.slug, &page.component_path) {
            warn!(
                slug = %page.slug,
                earlier = %earlier.display(),
                later = %page.component_path.display(),
                "duplicate slug: the later page overwrites the earlier page's artifacts"
            );
        }
    }
}

/// Extract the `pageOptions` block from module text.
///
/// Returns `None` if there is no such export or it has no string `slug`.
pub fn parse_page_options(source: &str) -> Option<PageOptions> {
    let source = strip_comments(source);
    let decl = OPTIONS_DECL.find(&source)?;
    let body = object_body(&source, decl.end() - 1)?;
    let top_level = top_level_text(body);

    let slug = string_field(&top_level, "slug")?;
    let route_url = string_field(&top_level, "routeUrl");

    Some(PageOptions {
        slug,
        route_url,
        has_head: HEAD_KEY.is_match(&top_level),
        has_context: CONTEXT_KEY.is_match(&top_level),
    })
}

/// Text between the brace at `open` and its matching close brace.
fn object_body(source: &str, open: usize) -> Option<&str> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
        } else {
            match b {
                b'"' | b'\'' | b'`' => quote = Some(b),
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&source[open + 1..i]);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Replace everything nested inside `{}`, `()` or `[]` with spaces so key
/// matching only sees the object's own keys. String contents are kept.
fn top_level_text(body: &str) -> String {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    body.chars()
        .map(|c| {
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                return if depth == 0 { c } else { ' ' };
            }
            match c {
                '"' | '\'' | '`' => {
                    quote = Some(c);
                    if depth == 0 { c } else { ' ' }
                }
                '{' | '(' | '[' => {
                    depth += 1;
                    ' '
                }
                '}' | ')' | ']' => {
                    depth = depth.saturating_sub(1);
                    ' '
                }
                '\n' => '\n',
                _ if depth == 0 => c,
                _ => ' ',
            }
        })
        .collect()
}

/// Find `key: "literal"` among the top-level keys and return the literal.
///
/// String contents at the top level survive masking verbatim.
fn string_field(top_level: &str, key: &str) -> Option<String> {
    let pattern = Regex::new(&format!(
        r#"(?:^|[\s,{{])["']?{key}["']?\s*:\s*(?:"([^"\\\n]*)"|'([^'\\\n]*)'|`([^`$\\]*)`)"#
    ))
    .ok()?;
    let caps = pattern.captures(top_level)?;
    let value = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
    Some(value.as_str().to_string())
}
