//! HTML document generation.
//!
//! Turns one page's rendered markup and build artifacts into the final
//! `{slug}.html`. [`render_document`] is a pure function of its inputs;
//! [`write_page`] is the only part that touches disk.
//!
//! ## Document shape
//!
//! ```text
//! <!DOCTYPE html>
//! <html lang="{lang}">
//!   <head>
//!     meta charset / viewport
//!     <link rel="stylesheet">           if the page has CSS
//!     image preload hints                if any images were optimized
//!     page head markup
//!     configured head_inject
//!     route global                       only with hydration
//!   </head>
//!   <body>
//!     <div id="app">page body markup</div>
//!     configured body_inject
//!     inline hydration loader            only with hydration
//!   </body>
//! </html>
//! ```
//!
//! The loader does not include the hydration bundle. It injects it on the
//! first interaction, when an island scrolls into view, or after an idle
//! timeout when `IntersectionObserver` is unavailable.
//!
//! Uses [maud](https://maud.lambda.xyz/) for compile-time HTML templating.

use crate::bundle::js_string;
use crate::config::HtmlOptions;
use crate::naming::html_file_name;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const LOADER: &str = include_str!("../static/hydration-loader.js");

/// Global the hydration bundle reads to rebuild the server route.
pub const ROUTE_GLOBAL: &str = "__ISLAND_ROUTE__";

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Inputs for one HTML document.
#[derive(Debug, Clone, Default)]
pub struct PageDocument<'a> {
    pub head_html: &'a str,
    pub body_html: &'a str,
    pub css_path: Option<&'a str>,
    pub hydrate_js_path: Option<&'a str>,
    pub route_url: &'a str,
    /// Pre-rendered `<link rel="preload">` tags.
    pub image_preload_tags: Option<&'a str>,
}

/// Make a JS string literal safe to embed in an inline `<script>`.
fn inline_js_string(value: &str) -> String {
    js_string(value).replace("</", "<\\/")
}

/// Inline script that loads `hydrate_src` lazily.
pub fn hydration_loader(hydrate_src: &str) -> String {
    LOADER.replace("__HYDRATE_SRC__", &inline_js_string(hydrate_src))
}

fn route_script(route_url: &str) -> String {
    format!("window.{ROUTE_GLOBAL} = {};", inline_js_string(route_url))
}

/// Assemble a complete HTML document.
pub fn render_document(page: &PageDocument, options: &HtmlOptions) -> String {
    let markup: Markup = html! {
        (DOCTYPE)
        html lang=(options.lang) {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                @if let Some(css) = page.css_path {
                    link rel="stylesheet" href=(css);
                }
                @if let Some(preload) = page.image_preload_tags {
                    (PreEscaped(preload))
                }
                (PreEscaped(page.head_html))
                (PreEscaped(&options.head_inject))
                @if page.hydrate_js_path.is_some() {
                    script { (PreEscaped(route_script(page.route_url))) }
                }
            }
            body {
                div id="app" { (PreEscaped(page.body_html)) }
                (PreEscaped(&options.body_inject))
                @if let Some(js) = page.hydrate_js_path {
                    script { (PreEscaped(hydration_loader(js))) }
                }
            }
        }
    };
    markup.into_string()
}

/// Write `{slug}.html` into `out_dir`, returning its path.
pub fn write_page(out_dir: &Path, slug: &str, document: &str) -> Result<PathBuf, GenerateError> {
    let path = out_dir.join(html_file_name(slug));
    let parent = path.parent().unwrap_or(out_dir);
    fs::create_dir_all(parent).map_err(|source| GenerateError::Io {
        path: parent.to_path_buf(),
        source,
    })?;
    fs::write(&path, document).map_err(|source| GenerateError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
