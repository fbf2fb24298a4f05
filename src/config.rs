//! Build configuration.
//!
//! Handles loading, validating, and merging build options. Configuration is
//! layered: stock defaults are overridden by `archipelago.toml`, which is in
//! turn overridden by command-line flags. Every layer is a sparse
//! `toml::Value` merged with [`merge_toml`], so downstream stages always see a
//! fully-populated [`BuildConfig`].
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! out_dir = "public/static"      # Where pages, bundles and images are written
//! base_url = "/static"           # Public URL prefix of out_dir
//! src_dir = "src"                # Source root for island and import resolution
//! scratch_dir = ".archipelago-temp"
//! plugins = []                   # Extra bundler arguments, forwarded verbatim
//! log_level = "info"
//!
//! [image]
//! enabled = true
//! formats = ["jpeg"]             # Preference order, first encodable wins
//! quality = 80
//! generate_srcset = true
//! srcset_multipliers = [1.0, 2.0]
//! lcp_image_count = 2            # Preloaded, never lazy-loaded
//! download_concurrency = 6
//! download_timeout_secs = 30
//! images_dir = "images"
//!
//! [css]
//! minifier = "esbuild"
//! global_stylesheet = "src/index.css"
//!
//! [js]
//! minifier = "esbuild"
//! target = "es2019"
//! drop_console = false
//! keep_names = false
//! legal_comments = "none"
//! bundler = ["esbuild"]
//! runtime = ["node", "--import", "tsx"]
//!
//! [html]
//! lang = "en"
//! head_inject = ""
//! body_inject = ""
//! ```
//!
//! ## Merge Rule
//!
//! Tables merge key-by-key with the overlay winning per field. Any other value,
//! arrays included, replaces the base value wholesale. Arrays are never
//! concatenated or merged element-wise.
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "archipelago.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Fully resolved build configuration.
///
/// Computed once per orchestrator run and shared read-only by every page
/// pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Output directory for pages, bundles and images.
    pub out_dir: PathBuf,
    /// Public URL path under which `out_dir` is served.
    pub base_url: String,
    /// Project source root.
    pub src_dir: PathBuf,
    /// Private scratch directory for synthetic bundler entries.
    pub scratch_dir: PathBuf,
    /// Extra bundler arguments applied to every CSS and hydration build.
    pub plugins: Vec<String>,
    pub image: ImageOptions,
    pub css: CssOptions,
    pub js: JsOptions,
    pub html: HtmlOptions,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("public/static"),
            base_url: "/static".to_string(),
            src_dir: PathBuf::from("src"),
            scratch_dir: PathBuf::from(".archipelago-temp"),
            plugins: Vec::new(),
            image: ImageOptions::default(),
            css: CssOptions::default(),
            js: JsOptions::default(),
            html: HtmlOptions::default(),
            log_level: "info".to_string(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];
const IMAGE_FORMATS: &[&str] = &["webp", "avif", "jpeg", "png"];
const MINIFIERS: &[&str] = &["esbuild", "none"];

impl BuildConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "base_url must start with '/', got {:?}",
                self.base_url
            )));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "log_level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }
        if self.image.quality == 0 || self.image.quality > 100 {
            return Err(ConfigError::Validation(
                "image.quality must be 1-100".into(),
            ));
        }
        if self.image.formats.is_empty() {
            return Err(ConfigError::Validation(
                "image.formats must not be empty".into(),
            ));
        }
        if let Some(unknown) = self
            .image
            .formats
            .iter()
            .find(|f| !IMAGE_FORMATS.contains(&f.as_str()))
        {
            return Err(ConfigError::Validation(format!(
                "image.formats: unknown format {unknown:?}"
            )));
        }
        if self.image.srcset_multipliers.iter().any(|m| *m <= 0.0) {
            return Err(ConfigError::Validation(
                "image.srcset_multipliers must be positive".into(),
            ));
        }
        if self.image.download_concurrency == 0 {
            return Err(ConfigError::Validation(
                "image.download_concurrency must be at least 1".into(),
            ));
        }
        if !MINIFIERS.contains(&self.css.minifier.as_str()) {
            return Err(ConfigError::Validation(format!(
                "css.minifier must be one of {}",
                MINIFIERS.join(", ")
            )));
        }
        if !MINIFIERS.contains(&self.js.minifier.as_str()) {
            return Err(ConfigError::Validation(format!(
                "js.minifier must be one of {}",
                MINIFIERS.join(", ")
            )));
        }
        if self.js.bundler.is_empty() || self.js.runtime.is_empty() {
            return Err(ConfigError::Validation(
                "js.bundler and js.runtime must name a command".into(),
            ));
        }
        Ok(())
    }

    /// Public URL of an artifact written directly into `out_dir`.
    pub fn public_url(&self, file_name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), file_name)
    }

    /// Directory optimized images are written to.
    pub fn images_out_dir(&self) -> PathBuf {
        self.out_dir.join(&self.image.images_dir)
    }
}

/// Image optimization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageOptions {
    pub enabled: bool,
    /// Output formats in preference order.
    pub formats: Vec<String>,
    /// Lossy encoding quality (1 = worst, 100 = best). Lossless webp and png
    /// ignore it.
    pub quality: u32,
    pub generate_srcset: bool,
    /// Pixel-density multipliers applied to the declared width.
    pub srcset_multipliers: Vec<f64>,
    /// Images at the top of the page: preloaded and never lazy.
    pub lcp_image_count: usize,
    /// Concurrent downloads per batch.
    pub download_concurrency: usize,
    pub download_timeout_secs: u64,
    /// Subdirectory of `out_dir` for optimized images.
    pub images_dir: String,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            formats: vec!["jpeg".to_string()],
            quality: 80,
            generate_srcset: true,
            srcset_multipliers: vec![1.0, 2.0],
            lcp_image_count: 2,
            download_concurrency: 6,
            download_timeout_secs: 30,
            images_dir: "images".to_string(),
        }
    }
}

/// CSS bundle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CssOptions {
    pub minifier: String,
    /// Project-wide stylesheet imported ahead of every page.
    pub global_stylesheet: PathBuf,
}

impl Default for CssOptions {
    fn default() -> Self {
        Self {
            minifier: "esbuild".to_string(),
            global_stylesheet: PathBuf::from("src/index.css"),
        }
    }
}

/// Hydration bundle settings and the external collaborator commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JsOptions {
    pub minifier: String,
    pub target: String,
    pub drop_console: bool,
    pub keep_names: bool,
    pub legal_comments: String,
    /// Bundler command line (program + leading arguments).
    pub bundler: Vec<String>,
    /// Module runtime used for server-side rendering.
    pub runtime: Vec<String>,
}

impl Default for JsOptions {
    fn default() -> Self {
        Self {
            minifier: "esbuild".to_string(),
            target: "es2019".to_string(),
            drop_console: false,
            keep_names: false,
            legal_comments: "none".to_string(),
            bundler: vec!["esbuild".to_string()],
            runtime: vec![
                "node".to_string(),
                "--import".to_string(),
                "tsx".to_string(),
            ],
        }
    }
}

/// Document-level HTML settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HtmlOptions {
    pub lang: String,
    /// Raw markup appended to `<head>`.
    pub head_inject: String,
    /// Raw markup appended to the end of `<body>`.
    pub body_inject: String,
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            head_inject: String::new(),
            body_inject: String::new(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(BuildConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely, arrays included.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge every overlay in order onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(
    overlays: impl IntoIterator<Item = toml::Value>,
) -> Result<BuildConfig, ConfigError> {
    let merged = overlays
        .into_iter()
        .fold(stock_defaults_value()?, merge_toml);
    let config: BuildConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the config file at `path` (if present) over the stock defaults, with
/// `cli_overrides` applied last.
pub fn load_config(
    path: &Path,
    cli_overrides: Option<toml::Value>,
) -> Result<BuildConfig, ConfigError> {
    let file = load_raw_config(path)?;
    resolve_config(file.into_iter().chain(cli_overrides))
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Archipelago Configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Tables merge key-by-key with the defaults; lists replace the default list.
# Unknown keys will cause an error.

# Output directory for generated pages, bundles and images.
out_dir = "public/static"

# Public URL path under which out_dir is served. Hosting rewrites point here.
base_url = "/static"

# Source root. Island paths like "/components/Counter" resolve against it.
src_dir = "src"

# Private scratch directory for synthetic bundler entries. Cleaned per build.
scratch_dir = ".archipelago-temp"

# Extra bundler arguments, forwarded verbatim to every CSS and hydration build.
# plugins = ["--loader:.svg=dataurl"]
plugins = []

# Log filter used when RUST_LOG is unset: error, warn, info, debug, trace.
log_level = "info"

# ---------------------------------------------------------------------------
# Image optimization (remote <img> sources only)
# ---------------------------------------------------------------------------
[image]
enabled = true
# Output formats in preference order: webp, avif, jpeg, png.
# Quality applies to avif and jpeg. webp is encoded lossless and png is
# lossless by nature, so both ignore it and may come out larger than the
# downloaded source.
formats = ["jpeg"]
# Lossy encoding quality (1 = worst, 100 = best). avif and jpeg only.
quality = 80
# Emit a srcset with extra pixel densities.
generate_srcset = true
srcset_multipliers = [1.0, 2.0]
# The first N images are preloaded; images after them are lazy-loaded.
lcp_image_count = 2
# Downloads run in batches of this size.
download_concurrency = 6
download_timeout_secs = 30
# Subdirectory of out_dir for optimized images.
images_dir = "images"

# ---------------------------------------------------------------------------
# CSS bundle
# ---------------------------------------------------------------------------
[css]
# "esbuild" or "none".
minifier = "esbuild"
# Imported ahead of every page's own styles. Skipped if missing.
global_stylesheet = "src/index.css"

# ---------------------------------------------------------------------------
# Hydration bundle
# ---------------------------------------------------------------------------
[js]
# "esbuild" or "none".
minifier = "esbuild"
target = "es2019"
drop_console = false
keep_names = false
legal_comments = "none"
# External collaborators.
bundler = ["esbuild"]
runtime = ["node", "--import", "tsx"]

# ---------------------------------------------------------------------------
# HTML document
# ---------------------------------------------------------------------------
[html]
lang = "en"
# Raw markup appended to <head> and <body>.
head_inject = ""
body_inject = ""
"##
}
