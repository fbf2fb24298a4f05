//! Image optimization for rendered markup.
//!
//! Only `<img>` tags whose `src` is an absolute remote URL are touched.
//! Relative paths, data URIs and SVGs pass through byte for byte.
//!
//! ## Steps
//!
//! 1. Scan the markup for `<img>` tags, decoding entity-encoded `src` values
//!    and reading any declared `width`/`height`.
//! 2. Download each unique remote URL once, in bounded batches
//!    ([`fetch_all`]). Failed downloads leave their tags untouched.
//! 3. Plan and encode every occurrence at its declared size in the primary
//!    format, plus pixel-density srcset variants (`1x`, `2x`, ...), under
//!    file names hashed from the URL plus the output box.
//! 4. Rewrite `src`, `width`, `height` and `srcset` in place. Images after
//!    the first `lcp_image_count` also get `loading="lazy"`.
//!
//! When optimization is disabled, or the backend cannot encode any configured
//! format, the whole phase is skipped and the markup is returned as-is.
//! [`preload_tags`] turns the leading records into `<link rel="preload">`
//! hints for the document head.

use crate::config::BuildConfig;
use crate::fetch::{Fetcher, fetch_all};
use crate::imaging::{ImageBackend, OutputFormat, Quality, execute_plan, plan_image};
use crate::types::{OptimizedImageRecord, Outcome};
use maud::{Markup, html};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error("Failed to create images directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Rewritten markup plus everything written for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptimizedMarkup {
    pub html: String,
    /// One record per distinct primary file, in document order.
    pub images: Vec<OptimizedImageRecord>,
    /// Remote URLs left unoptimized, with the reason.
    pub skipped: Vec<(String, String)>,
}

/// An `<img>` tag found in markup.
#[derive(Debug, Clone, PartialEq)]
pub struct ImgTag {
    /// Byte range of the whole tag in the scanned markup.
    pub range: Range<usize>,
    /// Attributes in source order; values are kept raw (still entity-encoded).
    pub attrs: Vec<(String, Option<String>)>,
    pub self_closing: bool,
}

impl ImgTag {
    fn raw_attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_deref())
    }

    /// Decoded `src` value.
    pub fn src(&self) -> Option<String> {
        self.raw_attr("src").map(decode_entities)
    }

    pub fn declared_width(&self) -> Option<u32> {
        self.raw_attr("width").and_then(parse_dimension)
    }

    pub fn declared_height(&self) -> Option<u32> {
        self.raw_attr("height").and_then(parse_dimension)
    }

    fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Replace or append an attribute. `value` is unescaped text.
    fn set_attr(&mut self, name: &str, value: &str) {
        let escaped = escape_attr(value);
        match self.attrs.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(slot) => slot.1 = Some(escaped),
            None => self.attrs.push((name.to_string(), Some(escaped))),
        }
    }

    fn to_html(&self) -> String {
        let mut out = String::from("<img");
        for (name, value) in &self.attrs {
            out.push(' ');
            out.push_str(name);
            if let Some(value) = value {
                out.push_str("=\"");
                out.push_str(&value.replace('"', "&quot;"));
                out.push('"');
            }
        }
        out.push_str(if self.self_closing { " />" } else { ">" });
        out
    }
}

/// An `<img>` tag. Quoted attribute values may contain `>`.
static IMG_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img\b((?:[^>"']|"[^"]*"|'[^']*')*)>"#).unwrap()
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s"'<>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#).unwrap()
});

static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(?:[xX]([0-9a-fA-F]+)|([0-9]+));").unwrap());

/// Every `<img>` tag in `markup`, in document order.
pub fn find_images(markup: &str) -> Vec<ImgTag> {
    IMG_TAG
        .captures_iter(markup)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let inner = caps.get(1).map_or("", |m| m.as_str());
            let trimmed = inner.trim_end();
            let self_closing = trimmed.ends_with('/');
            let body = trimmed.strip_suffix('/').unwrap_or(trimmed);
            let attrs = ATTRIBUTE
                .captures_iter(body)
                .map(|a| {
                    let name = a[1].to_string();
                    let value = a
                        .get(2)
                        .or_else(|| a.get(3))
                        .or_else(|| a.get(4))
                        .map(|m| m.as_str().to_string());
                    (name, value)
                })
                .collect();
            Some(ImgTag {
                range: whole.range(),
                attrs,
                self_closing,
            })
        })
        .collect()
}

/// Decode the HTML entities that show up in attribute URLs.
pub fn decode_entities(value: &str) -> String {
    let named = value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    let numeric = NUMERIC_ENTITY.replace_all(&named, |caps: &regex::Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (_, Some(dec)) => dec.as_str().parse().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    // Last, so "&amp;lt;" decodes to "&lt;" rather than "<"
    numeric.replace("&amp;", "&")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

/// `"400"`, `"400px"` → 400. Percentages and junk → `None`.
fn parse_dimension(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_suffix("px").unwrap_or(trimmed).trim();
    digits.parse::<u32>().ok().filter(|v| *v > 0)
}

/// Absolute URL to download, or `None` for sources that pass through.
pub fn remote_url(src: &str) -> Option<String> {
    let url = if let Some(rest) = src.strip_prefix("//") {
        format!("https://{rest}")
    } else if src.starts_with("http://") || src.starts_with("https://") {
        src.to_string()
    } else {
        return None;
    };
    let path = url.split(['?', '#']).next().unwrap_or(&url);
    if path.to_ascii_lowercase().ends_with(".svg") {
        return None;
    }
    Some(url)
}

/// First configured format the backend can encode.
pub fn primary_format(formats: &[String], backend: &dyn ImageBackend) -> Option<OutputFormat> {
    formats
        .iter()
        .filter_map(|name| OutputFormat::from_name(name))
        .find(|format| backend.supports(*format))
}

/// Optimize every remote image in `markup`.
///
/// `written` carries output files (and their sizes) across pages of one run,
/// so shared images are encoded once.
pub fn optimize_images(
    markup: &str,
    config: &BuildConfig,
    backend: &dyn ImageBackend,
    fetcher: &dyn Fetcher,
    written: &mut HashMap<PathBuf, u64>,
) -> Result<Outcome<OptimizedMarkup>, OptimizeError> {
    let options = &config.image;
    if !options.enabled {
        return Ok(Outcome::skipped("image optimization disabled"));
    }
    let Some(format) = primary_format(&options.formats, backend) else {
        warn!(
            formats = ?options.formats,
            "no configured image format can be encoded, skipping image optimization"
        );
        return Ok(Outcome::skipped("no configured image format can be encoded"));
    };

    let mut tags = find_images(markup);
    let remote: Vec<Option<String>> = tags
        .iter()
        .map(|tag| tag.src().and_then(|src| remote_url(&src)))
        .collect();

    let mut unique: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for url in remote.iter().flatten() {
        if seen.insert(url.clone()) {
            unique.push(url.clone());
        }
    }
    if unique.is_empty() {
        return Ok(Outcome::Done(OptimizedMarkup {
            html: markup.to_string(),
            ..OptimizedMarkup::default()
        }));
    }

    let images_dir = config.images_out_dir();
    fs::create_dir_all(&images_dir).map_err(|source| OptimizeError::CreateDir {
        path: images_dir.clone(),
        source,
    })?;

    info!(count = unique.len(), format = %format, "optimizing remote images");
    let mut result = OptimizedMarkup::default();
    let mut sources: HashMap<String, (Vec<u8>, (u32, u32))> = HashMap::new();
    for (url, fetched) in fetch_all(fetcher, &unique, options.download_concurrency) {
        let bytes = match fetched {
            Outcome::Done(bytes) => bytes,
            Outcome::Skipped { reason } => {
                result.skipped.push((url, reason));
                continue;
            }
        };
        match backend.identify(&bytes) {
            Ok(dims) => {
                sources.insert(url, (bytes, (dims.width, dims.height)));
            }
            Err(e) => {
                warn!(url = %url, "cannot read downloaded image: {e}");
                result.skipped.push((url, format!("unreadable image: {e}")));
            }
        }
    }

    let multipliers: &[f64] = if options.generate_srcset {
        &options.srcset_multipliers
    } else {
        &[]
    };
    let quality = Quality::new(options.quality);
    let public_base = config.public_url(&options.images_dir);
    let mut optimized_count = 0usize;
    let mut recorded = HashSet::new();

    let mut rewritten = Vec::new();
    for (index, (tag, url)) in tags.iter_mut().zip(&remote).enumerate() {
        let Some(url) = url else { continue };
        let Some((bytes, native)) = sources.get(url) else {
            continue;
        };

        let plan = plan_image(
            url,
            *native,
            (tag.declared_width(), tag.declared_height()),
            format,
            multipliers,
        );
        let byte_size = match execute_plan(backend, bytes, &plan, &images_dir, quality, written) {
            Ok(size) => size,
            Err(e) => {
                warn!(url = %url, "image transcode failed: {e}");
                result.skipped.push((url.clone(), format!("transcode failed: {e}")));
                continue;
            }
        };

        let local_url = format!("{public_base}/{}", plan.primary.file_name);
        let srcset = plan.density_candidates().map(|candidates| {
            candidates
                .iter()
                .map(|(v, density)| format!("{public_base}/{} {density}", v.file_name))
                .collect::<Vec<_>>()
                .join(", ")
        });

        tag.set_attr("src", &local_url);
        tag.set_attr("width", &plan.primary.width.to_string());
        tag.set_attr("height", &plan.primary.height.to_string());
        if let Some(srcset) = &srcset {
            tag.set_attr("srcset", srcset);
        }
        if optimized_count >= options.lcp_image_count {
            if !tag.has_attr("loading") {
                tag.set_attr("loading", "lazy");
            }
            if !tag.has_attr("decoding") {
                tag.set_attr("decoding", "async");
            }
        }
        optimized_count += 1;
        rewritten.push(index);

        debug!(url = %url, file = %plan.primary.file_name, "image optimized");
        if recorded.insert(plan.primary.file_name.clone()) {
            result.images.push(OptimizedImageRecord {
                original_url: url.clone(),
                local_url,
                width: plan.primary.width,
                height: plan.primary.height,
                format: format.extension().to_string(),
                byte_size,
                srcset,
            });
        }
    }

    result.html = splice_tags(markup, rewritten.iter().map(|&i| &tags[i]));
    Ok(Outcome::Done(result))
}

/// Rebuild markup with the given tags re-serialized in place. Tags must be
/// in document order; everything else is copied verbatim.
fn splice_tags<'a>(markup: &str, tags: impl IntoIterator<Item = &'a ImgTag>) -> String {
    let mut out = String::with_capacity(markup.len() + 256);
    let mut cursor = 0;
    for tag in tags {
        out.push_str(&markup[cursor..tag.range.start]);
        out.push_str(&tag.to_html());
        cursor = tag.range.end;
    }
    out.push_str(&markup[cursor..]);
    out
}

/// Preload hints for the first `count` optimized images.
pub fn preload_tags(images: &[OptimizedImageRecord], count: usize) -> Markup {
    html! {
        @for image in images.iter().take(count) {
            link rel="preload" as="image" href=(image.local_url)
                imagesrcset=[image.srcset.as_deref()]
                type=[OutputFormat::from_name(&image.format).map(OutputFormat::mime_type)]
                fetchpriority="high";
        }
    }
}
