//! Build orchestration.
//!
//! Runs discovery once, then the full page pipeline for each page in turn:
//!
//! ```text
//! scan islands → render → optimize images → css → hydration → html → write
//! ```
//!
//! Pages are processed strictly one after another. The CSS and hydration
//! builders share the scratch directory and every stage writes into the same
//! output directory, none of which is locked.
//!
//! A fatal error in one page aborts only that page; it is recorded in the
//! [`BuildReport`] and the remaining pages still build. Degraded outcomes
//! (dropped islands, skipped images) become warnings on the page summary.
//! Hosting sync runs after every page and is skipped when any page failed,
//! so the manifest never routes to an artifact that was not written.
//!
//! Progress is reported through an optional `mpsc::Sender<BuildEvent>`; the
//! CLI drains it on a printer thread.

use crate::bundle::Bundler;
use crate::config::{BuildConfig, ConfigError};
use crate::css::{CssError, build_css};
use crate::discover::{DiscoverError, discover};
use crate::fetch::Fetcher;
use crate::generate::{GenerateError, PageDocument, render_document, write_page};
use crate::hosting::{HostingError, SyncSummary, sync_hosting};
use crate::hydrate::{HydrateError, build_hydration};
use crate::imaging::ImageBackend;
use crate::islands::{IslandError, IslandScan, scan_islands};
use crate::optimize::{OptimizeError, optimize_images, preload_tags};
use crate::render::{ComponentRuntime, RenderError, load_islands, render_page};
use crate::types::{
    GeneratedPageInfo, IslandDescriptor, OptimizedImageRecord, Outcome, PageDescriptor,
};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{error, info, warn};

/// External capabilities a build goes through.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub runtime: &'a dyn ComponentRuntime,
    pub bundler: &'a dyn Bundler,
    pub backend: &'a dyn ImageBackend,
    pub fetcher: &'a dyn Fetcher,
}

/// Pipeline stage, for error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scan,
    Render,
    Optimize,
    Css,
    Hydrate,
    Generate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Scan => "island scan",
            Stage::Render => "render",
            Stage::Optimize => "image optimization",
            Stage::Css => "css build",
            Stage::Hydrate => "hydration build",
            Stage::Generate => "html generation",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Islands(#[from] IslandError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Optimize(#[from] OptimizeError),
    #[error(transparent)]
    Css(#[from] CssError),
    #[error(transparent)]
    Hydrate(#[from] HydrateError),
    #[error(transparent)]
    Generate(#[from] GenerateError),
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Discovery failed: {0}")]
    Discover(#[from] DiscoverError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Page '{slug}' failed during {stage}: {source}")]
    Page {
        slug: String,
        stage: Stage,
        source: StageError,
    },
    #[error("{failed} of {total} pages failed")]
    PagesFailed { failed: usize, total: usize },
    #[error("Hosting sync failed: {0}")]
    Hosting(#[from] HostingError),
}

fn page_error(page: &PageDescriptor, stage: Stage) -> impl FnOnce(StageError) -> BuildError + '_ {
    move |source| BuildError::Page {
        slug: page.slug.clone(),
        stage,
        source,
    }
}

/// Everything one successful page pipeline produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSummary {
    pub slug: String,
    pub route_url: String,
    pub source: PathBuf,
    pub html_path: PathBuf,
    /// Import paths of the hydrated islands.
    pub islands: Vec<String>,
    pub css_url: Option<String>,
    pub hydrate_url: Option<String>,
    pub images: Vec<OptimizedImageRecord>,
    /// Degraded outcomes, one line each.
    pub warnings: Vec<String>,
}

impl PageSummary {
    pub fn info(&self) -> GeneratedPageInfo {
        GeneratedPageInfo {
            slug: self.slug.clone(),
            route_url: self.route_url.clone(),
            html_path: self.html_path.clone(),
        }
    }
}

/// Result of a build run.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub pages: Vec<PageSummary>,
    /// Page-level fatal errors.
    pub failures: Vec<BuildError>,
    /// Files directory discovery passed over.
    pub skipped_files: Vec<(PathBuf, String)>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Generated pages, one per slug. A later page with a slug already seen
    /// replaces the earlier one, matching what is on disk.
    pub fn generated(&self) -> Vec<GeneratedPageInfo> {
        let mut out: Vec<GeneratedPageInfo> = Vec::new();
        for page in &self.pages {
            out.retain(|p| p.slug != page.slug);
            out.push(page.info());
        }
        out
    }
}

/// Progress events emitted during a build.
#[derive(Debug, Clone)]
pub enum BuildEvent {
    Discovered {
        pages: usize,
        skipped: usize,
    },
    PageStarted {
        index: usize,
        total: usize,
        slug: String,
        route_url: String,
    },
    PageFinished(PageSummary),
    PageFailed {
        slug: String,
        message: String,
    },
    HostingSynced {
        manifest: PathBuf,
        summary: SyncSummary,
    },
    HostingSkipped {
        reason: String,
    },
}

fn emit(events: Option<&Sender<BuildEvent>>, event: BuildEvent) {
    if let Some(tx) = events {
        tx.send(event).ok();
    }
}

/// Source root as an absolute path, so island files and generated imports
/// do not depend on the bundler's working directory.
fn source_root(config: &BuildConfig) -> Result<PathBuf, BuildError> {
    Ok(std::path::absolute(&config.src_dir)?)
}

/// Run the page pipeline for every page under `input`.
///
/// Input-level failures (bad config, nothing discovered) are returned as
/// errors. Page-level failures are collected in the report.
pub fn build(
    input: &Path,
    config: &BuildConfig,
    collaborators: Collaborators<'_>,
    events: Option<&Sender<BuildEvent>>,
) -> Result<BuildReport, BuildError> {
    config.validate()?;
    let discovery = discover(input)?;
    let src_root = source_root(config)?;
    std::fs::create_dir_all(&config.out_dir)?;

    let total = discovery.pages.len();
    info!(pages = total, input = %input.display(), "starting build");
    emit(
        events,
        BuildEvent::Discovered {
            pages: total,
            skipped: discovery.skipped.len(),
        },
    );

    let mut report = BuildReport {
        skipped_files: discovery.skipped,
        ..BuildReport::default()
    };
    let mut written_images: HashMap<PathBuf, u64> = HashMap::new();

    for (index, page) in discovery.pages.iter().enumerate() {
        emit(
            events,
            BuildEvent::PageStarted {
                index: index + 1,
                total,
                slug: page.slug.clone(),
                route_url: page.route_url.clone(),
            },
        );
        match build_page(page, config, &src_root, collaborators, &mut written_images) {
            Ok(summary) => {
                emit(events, BuildEvent::PageFinished(summary.clone()));
                report.pages.push(summary);
            }
            Err(e) => {
                error!(slug = %page.slug, "{e}");
                emit(
                    events,
                    BuildEvent::PageFailed {
                        slug: page.slug.clone(),
                        message: e.to_string(),
                    },
                );
                report.failures.push(e);
            }
        }
    }

    info!(
        built = report.pages.len(),
        failed = report.failures.len(),
        "build finished"
    );
    Ok(report)
}

/// One page, start to finish.
pub fn build_page(
    page: &PageDescriptor,
    config: &BuildConfig,
    src_root: &Path,
    collaborators: Collaborators<'_>,
    written_images: &mut HashMap<PathBuf, u64>,
) -> Result<PageSummary, BuildError> {
    let mut warnings = Vec::new();

    let scan = scan_islands(&page.component_path, src_root)
        .map_err(StageError::from)
        .map_err(page_error(page, Stage::Scan))?;
    for (path, reason) in &scan.dropped {
        warnings.push(format!("island {path} dropped: {reason}"));
    }
    for (path, reason) in &scan.unreadable {
        warnings.push(format!("{} not scanned: {reason}", path.display()));
    }

    let registry =
        load_islands(collaborators.runtime, &scan.islands).with_aliases(scan.aliases.clone());
    for (path, reason) in &registry.failed {
        warnings.push(format!("island {path} failed to load: {reason}"));
    }
    let rendered = render_page(collaborators.runtime, page, &registry)
        .map_err(StageError::from)
        .map_err(page_error(page, Stage::Render))?;

    let (body_html, images) = match optimize_images(
        &rendered.body_html,
        config,
        collaborators.backend,
        collaborators.fetcher,
        written_images,
    )
    .map_err(StageError::from)
    .map_err(page_error(page, Stage::Optimize))?
    {
        Outcome::Done(optimized) => {
            for (url, reason) in &optimized.skipped {
                warnings.push(format!("image {url} skipped: {reason}"));
            }
            (optimized.html, optimized.images)
        }
        Outcome::Skipped { reason } => {
            if config.image.enabled {
                warnings.push(format!("image optimization skipped: {reason}"));
            }
            (rendered.body_html, Vec::new())
        }
    };

    let css_url = build_css(page, config, collaborators.bundler)
        .map_err(StageError::from)
        .map_err(page_error(page, Stage::Css))?;

    // Islands that failed to load rendered their fallback inside
    // data-island-unavailable, which the client never hydrates.
    let hydrated: Vec<IslandDescriptor> = scan
        .islands
        .iter()
        .filter(|island| registry.contains(&island.import_path))
        .cloned()
        .collect();
    let hydrate_url = build_hydration(page, &hydrated, config, collaborators.bundler)
        .map_err(StageError::from)
        .map_err(page_error(page, Stage::Hydrate))?;

    let preloads = (!images.is_empty())
        .then(|| preload_tags(&images, config.image.lcp_image_count).into_string());
    let document = render_document(
        &PageDocument {
            head_html: &rendered.head_html,
            body_html: &body_html,
            css_path: css_url.as_deref(),
            hydrate_js_path: hydrate_url.as_deref(),
            route_url: &page.route_url,
            image_preload_tags: preloads.as_deref(),
        },
        &config.html,
    );
    let html_path = write_page(&config.out_dir, &page.slug, &document)
        .map_err(StageError::from)
        .map_err(page_error(page, Stage::Generate))?;

    for warning in &warnings {
        warn!(slug = %page.slug, "{warning}");
    }
    info!(slug = %page.slug, path = %html_path.display(), "page written");

    Ok(PageSummary {
        slug: page.slug.clone(),
        route_url: page.route_url.clone(),
        source: page.component_path.clone(),
        html_path,
        islands: hydrated.into_iter().map(|i| i.import_path).collect(),
        css_url,
        hydrate_url,
        images,
        warnings,
    })
}

/// Point the hosting manifest at the pages of a finished build.
///
/// Skipped when the build had page failures.
pub fn apply_hosting(
    report: &BuildReport,
    manifest: &Path,
    config: &BuildConfig,
    events: Option<&Sender<BuildEvent>>,
) -> Result<Outcome<SyncSummary>, BuildError> {
    if !report.is_success() {
        let reason = format!(
            "{} page(s) failed, hosting rewrites left unchanged",
            report.failures.len()
        );
        warn!("{reason}");
        emit(
            events,
            BuildEvent::HostingSkipped {
                reason: reason.clone(),
            },
        );
        return Ok(Outcome::skipped(reason));
    }
    let summary = sync_hosting(manifest, &report.generated(), &config.base_url)?;
    emit(
        events,
        BuildEvent::HostingSynced {
            manifest: manifest.to_path_buf(),
            summary: summary.clone(),
        },
    );
    Ok(Outcome::Done(summary))
}

/// Discovery plus island scan, without rendering anything.
#[derive(Debug, Default)]
pub struct Inventory {
    pub pages: Vec<(PageDescriptor, IslandScan)>,
    pub skipped_files: Vec<(PathBuf, String)>,
}

pub fn discover_inventory(input: &Path, config: &BuildConfig) -> Result<Inventory, BuildError> {
    let discovery = discover(input)?;
    let src_root = source_root(config)?;
    let mut pages = Vec::with_capacity(discovery.pages.len());
    for page in discovery.pages {
        let scan = scan_islands(&page.component_path, &src_root)
            .map_err(StageError::from)
            .map_err(page_error(&page, Stage::Scan))?;
        pages.push((page, scan));
    }
    Ok(Inventory {
        pages,
        skipped_files: discovery.skipped,
    })
}

/// Build-tool hook: generate once after the host build has written its
/// output, then sync hosting.
pub struct BuildPlugin {
    input: PathBuf,
    config: BuildConfig,
    hosting_manifest: Option<PathBuf>,
    finished: bool,
}

impl BuildPlugin {
    pub fn new(input: &Path, config: BuildConfig) -> Self {
        Self {
            input: input.to_path_buf(),
            config,
            hosting_manifest: None,
            finished: false,
        }
    }

    pub fn with_hosting(mut self, manifest: &Path) -> Self {
        self.hosting_manifest = Some(manifest.to_path_buf());
        self
    }

    /// Returns `None` on every call after the first.
    pub fn on_build_finished(
        &mut self,
        collaborators: Collaborators<'_>,
        events: Option<&Sender<BuildEvent>>,
    ) -> Result<Option<BuildReport>, BuildError> {
        if self.finished {
            return Ok(None);
        }
        self.finished = true;

        let report = build(&self.input, &self.config, collaborators, events)?;
        if let Some(manifest) = &self.hosting_manifest {
            apply_hosting(&report, manifest, &self.config, events)?;
        }
        if !report.is_success() {
            return Err(BuildError::PagesFailed {
                failed: report.failures.len(),
                total: report.pages.len() + report.failures.len(),
            });
        }
        Ok(Some(report))
    }
}
