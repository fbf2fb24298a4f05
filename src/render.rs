//! Server-side rendering.
//!
//! Rendering is the one stage that must execute page code. It goes through
//! the [`ComponentRuntime`] trait: the pipeline describes *what* to render as
//! an [`Element`] tree and the runtime does the module loading and markup
//! generation. [`NodeRuntime`] is the production implementation; it runs the
//! configured JavaScript runtime on an embedded driver script and talks JSON
//! over stdin/stdout.
//!
//! Loaded islands are handed to the render call as an explicit
//! [`IslandRegistry`] rather than kept in shared state, so two page renders
//! never see each other's islands.
//!
//! ## Island markers
//!
//! The driver provides an `Island` component (`static/island.mjs`, exposed
//! as a global) that pages use as `<Island path="…" props={…} fallback={…} />`.
//! It resolves `path` to the logical import path and renders
//!
//! ```html
//! <div data-island="/components/Counter" data-island-props="{&quot;start&quot;:1}">…</div>
//! ```
//!
//! around the server-rendered island, which is what the hydration bootstrap
//! looks for. When the island did not load it renders `fallback` (or nothing)
//! inside `<div data-island-unavailable="/components/Counter">` instead, and
//! the client leaves it alone.

use crate::types::{IslandDescriptor, PageDescriptor, RenderedPage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Driver script executed by [`NodeRuntime`].
const SSR_RUNTIME: &str = include_str!("../static/ssr-runtime.mjs");

/// `Island` component module imported by the driver.
pub(crate) const ISLAND_WRAPPER: &str = include_str!("../static/island.mjs");

/// Attribute holding the logical import path of a hydratable island.
pub const ISLAND_ATTR: &str = "data-island";
/// Attribute holding the island's props as JSON.
pub const ISLAND_PROPS_ATTR: &str = "data-island-props";
/// Attribute marking an island whose implementation did not load.
pub const ISLAND_UNAVAILABLE_ATTR: &str = "data-island-unavailable";

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to start {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("Runtime exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("Unexpected runtime response: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("Cannot load {module}: {message}")]
    Load { module: PathBuf, message: String },
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to load page module {path}: {source}")]
    PageLoad {
        path: PathBuf,
        source: RuntimeError,
    },
    #[error("Failed to render {slug}: {source}")]
    Render { slug: String, source: RuntimeError },
}

/// What a loaded module exports, as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub exports: Vec<String>,
    /// `pageOptions.Head` is a component.
    #[serde(default)]
    pub has_head: bool,
    /// `pageOptions.context` is a function.
    #[serde(default)]
    pub has_context: bool,
}

impl ModuleInfo {
    pub fn has_default(&self) -> bool {
        self.exports.iter().any(|e| e == "default")
    }
}

/// A component tree to render, serialized to the runtime as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Element {
    /// A module export, rendered with `props`. `export` may be a dotted path
    /// such as `pageOptions.Head`.
    Component {
        module: PathBuf,
        export: String,
        props: serde_json::Value,
    },
    /// Exposes loaded island implementations to the subtree, keyed by
    /// logical import path. `aliases` maps references as written in source
    /// to those keys.
    IslandProvider {
        islands: BTreeMap<String, PathBuf>,
        #[serde(default)]
        aliases: BTreeMap<String, String>,
        child: Box<Element>,
    },
    /// Waits for all suspended work in `child` before markup is final.
    Suspense { child: Box<Element> },
    /// Passes `child` through the page's `pageOptions.context` wrapper.
    Context {
        module: PathBuf,
        #[serde(rename = "routeUrl")]
        route_url: String,
        child: Box<Element>,
    },
}

impl Element {
    pub fn component(module: &Path, export: &str) -> Self {
        Element::Component {
            module: module.to_path_buf(),
            export: export.to_string(),
            props: serde_json::Value::Object(Default::default()),
        }
    }
}

/// Capability to load and render component modules.
pub trait ComponentRuntime {
    /// Import a module and report its exports.
    fn load_module(&self, path: &Path) -> Result<ModuleInfo, RuntimeError>;

    /// Render with suspense support, resolving all async work first.
    fn render_to_string(&self, tree: &Element) -> Result<String, RuntimeError>;

    /// Render synchronously to static markup, no suspense.
    fn render_static(&self, tree: &Element) -> Result<String, RuntimeError>;
}

/// Island implementations that loaded successfully for one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IslandRegistry {
    entries: BTreeMap<String, PathBuf>,
    aliases: BTreeMap<String, String>,
    /// Islands that failed to load, with the error message.
    pub failed: Vec<(String, String)>,
}

impl IslandRegistry {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, import_path: &str) -> bool {
        self.entries.contains_key(import_path)
    }

    /// Attach the written-form → logical-path table from the island scan.
    pub fn with_aliases(mut self, aliases: BTreeMap<String, String>) -> Self {
        self.aliases = aliases;
        self
    }
}

/// Load every island module. Failures are logged and left out of the
/// registry; the island then renders its fallback content.
pub fn load_islands(runtime: &dyn ComponentRuntime, islands: &[IslandDescriptor]) -> IslandRegistry {
    let mut registry = IslandRegistry::default();
    for island in islands {
        match runtime.load_module(&island.file_path) {
            Ok(info) if info.has_default() => {
                registry
                    .entries
                    .insert(island.import_path.clone(), island.file_path.clone());
            }
            Ok(_) => {
                warn!(island = %island.import_path, "island module has no default export");
                registry
                    .failed
                    .push((island.import_path.clone(), "no default export".to_string()));
            }
            Err(e) => {
                warn!(island = %island.import_path, "failed to load island: {e}");
                registry
                    .failed
                    .push((island.import_path.clone(), e.to_string()));
            }
        }
    }
    registry
}

/// Render one page to body and head markup.
pub fn render_page(
    runtime: &dyn ComponentRuntime,
    page: &PageDescriptor,
    registry: &IslandRegistry,
) -> Result<RenderedPage, RenderError> {
    let module = &page.component_path;
    let info = runtime
        .load_module(module)
        .map_err(|source| RenderError::PageLoad {
            path: module.clone(),
            source,
        })?;
    if !info.has_default() {
        return Err(RenderError::PageLoad {
            path: module.clone(),
            source: RuntimeError::Load {
                module: module.clone(),
                message: "page module has no default export".to_string(),
            },
        });
    }

    let tree = page_tree(page, &info, registry);
    let body_html = runtime
        .render_to_string(&tree)
        .map_err(|source| RenderError::Render {
            slug: page.slug.clone(),
            source,
        })?;

    let head_html = if info.has_head {
        runtime
            .render_static(&Element::component(module, "pageOptions.Head"))
            .map_err(|source| RenderError::Render {
                slug: page.slug.clone(),
                source,
            })?
    } else {
        if page.has_head {
            warn!(slug = %page.slug, "pageOptions declares a head but it is not a component");
        }
        String::new()
    };

    info!(slug = %page.slug, bytes = body_html.len(), "page rendered");
    Ok(RenderedPage {
        body_html,
        head_html,
    })
}

/// Page component inside the island provider inside a suspense boundary,
/// optionally passed through the context wrapper.
fn page_tree(page: &PageDescriptor, info: &ModuleInfo, registry: &IslandRegistry) -> Element {
    let module = &page.component_path;
    let tree = Element::Suspense {
        child: Box::new(Element::IslandProvider {
            islands: registry.entries.clone(),
            aliases: registry.aliases.clone(),
            child: Box::new(Element::component(module, "default")),
        }),
    };
    if info.has_context {
        Element::Context {
            module: module.clone(),
            route_url: page.route_url.clone(),
            child: Box::new(tree),
        }
    } else {
        warn!(
            slug = %page.slug,
            "page has no context wrapper; rendering the bare tree"
        );
        tree
    }
}

// ============================================================================
// Node runtime
// ============================================================================

/// Runs the configured JS runtime command on the embedded driver script.
///
/// The driver and the `Island` module it imports are written side by side
/// into the scratch directory.
pub struct NodeRuntime {
    command: Vec<String>,
    script: PathBuf,
    working_dir: PathBuf,
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum Request<'a> {
    Inspect { module: &'a Path },
    Render { tree: &'a Element, stream: bool },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Response {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    module: Option<ModuleInfo>,
}

impl NodeRuntime {
    /// Write the driver script into `scratch_dir` and prepare to run it with
    /// `command` from `working_dir` (the project root, so package imports
    /// resolve).
    pub fn new(
        command: &[String],
        scratch_dir: &Path,
        working_dir: &Path,
    ) -> Result<Self, RuntimeError> {
        fs::create_dir_all(scratch_dir)?;
        let script = scratch_dir.join("ssr-runtime.mjs");
        fs::write(&script, SSR_RUNTIME)?;
        fs::write(scratch_dir.join("island.mjs"), ISLAND_WRAPPER)?;
        Ok(Self {
            command: command.to_vec(),
            script,
            working_dir: working_dir.to_path_buf(),
        })
    }

    fn call(&self, request: &Request) -> Result<Response, RuntimeError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| RuntimeError::Spawn {
                command: String::new(),
                source: std::io::Error::other("empty runtime command"),
            })?;

        let mut child = Command::new(program)
            .args(args)
            .arg(&self.script)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                command: self.command.join(" "),
                source,
            })?;

        let payload = serde_json::to_vec(request)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload)?;
        }
        let output = child.wait_with_output()?;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(RuntimeError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }
        if !stderr.is_empty() {
            debug!("runtime stderr: {stderr}");
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    fn render(&self, tree: &Element, stream: bool) -> Result<String, RuntimeError> {
        let response = self.call(&Request::Render { tree, stream })?;
        match (response.error, response.html) {
            (Some(message), _) => Err(RuntimeError::Failed {
                status: "render error".to_string(),
                stderr: message,
            }),
            (None, Some(html)) => Ok(html),
            (None, None) => Err(RuntimeError::Failed {
                status: "render error".to_string(),
                stderr: "runtime returned no markup".to_string(),
            }),
        }
    }
}

impl ComponentRuntime for NodeRuntime {
    fn load_module(&self, path: &Path) -> Result<ModuleInfo, RuntimeError> {
        let response = self.call(&Request::Inspect { module: path })?;
        if let Some(message) = response.error {
            return Err(RuntimeError::Load {
                module: path.to_path_buf(),
                message,
            });
        }
        response.module.ok_or_else(|| RuntimeError::Load {
            module: path.to_path_buf(),
            message: "runtime returned no module info".to_string(),
        })
    }

    fn render_to_string(&self, tree: &Element) -> Result<String, RuntimeError> {
        self.render(tree, true)
    }

    fn render_static(&self, tree: &Element) -> Result<String, RuntimeError> {
        self.render(tree, false)
    }
}
