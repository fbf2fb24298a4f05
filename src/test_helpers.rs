//! Shared test utilities.
//!
//! Project fixture writers plus recording mocks for every external
//! capability the pipeline goes through: [`MockRuntime`] for rendering,
//! [`MockBundler`] for CSS and hydration builds, and [`MockFetcher`] for
//! image downloads. The image backend mock lives next to its trait in
//! `imaging::backend::tests`.
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_project(tmp.path());
//! let config = test_config(tmp.path());
//! let bundler = MockBundler::new().emit_css(".about{}");
//! ```

use crate::bundle::{BundleError, BundleOutput, BundleRequest, Bundler, Platform, emitted_files};
use crate::config::{BuildConfig, CssOptions};
use crate::fetch::{FetchError, Fetcher};
use crate::render::{ComponentRuntime, Element, ModuleInfo, RuntimeError};
use crate::types::PageDescriptor;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// =========================================================================
// Fixtures
// =========================================================================

/// Write `content` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

/// A small PNG with a gradient, encoded in memory.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// Build config rooted at `root`: sources in `root/src`, output in
/// `root/public/static`, served under `/static`.
pub fn test_config(root: &Path) -> BuildConfig {
    fs::create_dir_all(root.join("src")).unwrap();
    let config = BuildConfig {
        out_dir: root.join("public/static"),
        src_dir: root.join("src"),
        scratch_dir: root.join(".archipelago-temp"),
        css: CssOptions {
            global_stylesheet: root.join("src/index.css"),
            ..CssOptions::default()
        },
        ..BuildConfig::default()
    };
    fs::create_dir_all(&config.scratch_dir).unwrap();
    config
}

pub fn page_descriptor(path: impl AsRef<Path>, slug: &str, route: &str) -> PageDescriptor {
    PageDescriptor {
        component_path: path.as_ref().to_path_buf(),
        slug: slug.to_string(),
        route_url: route.to_string(),
        has_head: false,
        has_context: false,
    }
}

pub const ABOUT_PAGE: &str = r#"import Layout from "../components/Layout";

export const pageOptions = {
  slug: "about",
  routeUrl: "/about",
  Head: () => <title>About</title>,
  context: async (app, { routeUrl }) => app,
};

export default function About() {
  return <Layout><h1>About</h1></Layout>;
}
"#;

pub const STATIC_PAGE: &str = r#"export const pageOptions = { slug: "home" };

export default function Home() {
  return <p>hello</p>;
}
"#;

pub const LAYOUT: &str = r#"export default function Layout({ children }) {
  return <main>{children}<Island path="/components/Counter" props={{ start: 1 }} /></main>;
}
"#;

pub const COUNTER: &str = r#""use client";
import { useState } from "react";

export default function Counter({ start }) {
  const [n, setN] = useState(start);
  return <button onClick={() => setN(n + 1)}>{n}</button>;
}
"#;

/// Two pages under `root/src/pages`: `About.tsx` (one island through a
/// layout) and `Home.tsx` (no islands). Returns the pages directory.
pub fn write_project(root: &Path) -> PathBuf {
    let src = root.join("src");
    write_file(&src, "pages/About.tsx", ABOUT_PAGE);
    write_file(&src, "pages/Home.tsx", STATIC_PAGE);
    write_file(&src, "components/Layout.tsx", LAYOUT);
    write_file(&src, "components/Counter.tsx", COUNTER);
    src.join("pages")
}

// =========================================================================
// MockFetcher
// =========================================================================

/// Serves canned bodies and records every request.
#[derive(Default)]
pub struct MockFetcher {
    bodies: HashMap<String, Vec<u8>>,
    fallback: Option<Vec<u8>>,
    failures: HashSet<String>,
    requested: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for any URL without a specific entry.
    pub fn serve_all(mut self, body: Vec<u8>) -> Self {
        self.fallback = Some(body);
        self
    }

    pub fn serve(mut self, url: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    /// Answer `url` with HTTP 500.
    pub fn fail(mut self, url: &str) -> Self {
        self.failures.insert(url.to_string());
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    /// Highest number of simultaneous `fetch` calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requested.lock().unwrap().push(url.to_string());
        std::thread::sleep(Duration::from_millis(5));

        let result = if self.failures.contains(url) {
            Err(FetchError::Status {
                url: url.to_string(),
                status: 500,
            })
        } else if let Some(body) = self.bodies.get(url).or(self.fallback.as_ref()) {
            Ok(body.clone())
        } else {
            Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// =========================================================================
// MockRuntime
// =========================================================================

/// Component runtime that never executes anything.
///
/// Every module loads with a default export unless marked failed. Rendering
/// returns `<div>{module}#{export}</div>` for the innermost component of the
/// tree, or a canned body registered with [`MockRuntime::body`].
#[derive(Default)]
pub struct MockRuntime {
    failed: HashSet<PathBuf>,
    has_head: bool,
    has_context: bool,
    bodies: HashMap<PathBuf, String>,
    rendered: Mutex<Vec<Element>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_module(mut self, path: &str) -> Self {
        self.failed.insert(PathBuf::from(path));
        self
    }

    /// What `pageOptions` exposes for every loaded module.
    pub fn with_page_exports(mut self, has_head: bool, has_context: bool) -> Self {
        self.has_head = has_head;
        self.has_context = has_context;
        self
    }

    /// Body markup returned when `module` is the rendered component.
    pub fn body(mut self, module: impl AsRef<Path>, html: &str) -> Self {
        self.bodies
            .insert(module.as_ref().to_path_buf(), html.to_string());
        self
    }

    /// Trees passed to `render_to_string`, in call order.
    pub fn rendered_trees(&self) -> Vec<Element> {
        self.rendered.lock().unwrap().clone()
    }
}

fn innermost_component(tree: &Element) -> (&Path, &str) {
    match tree {
        Element::Component { module, export, .. } => (module, export),
        Element::IslandProvider { child, .. }
        | Element::Suspense { child }
        | Element::Context { child, .. } => innermost_component(child),
    }
}

impl ComponentRuntime for MockRuntime {
    fn load_module(&self, path: &Path) -> Result<ModuleInfo, RuntimeError> {
        if self.failed.contains(path) {
            return Err(RuntimeError::Load {
                module: path.to_path_buf(),
                message: "SyntaxError: Unexpected token".to_string(),
            });
        }
        Ok(ModuleInfo {
            exports: vec!["default".to_string(), "pageOptions".to_string()],
            has_head: self.has_head,
            has_context: self.has_context,
        })
    }

    fn render_to_string(&self, tree: &Element) -> Result<String, RuntimeError> {
        self.rendered.lock().unwrap().push(tree.clone());
        let (module, export) = innermost_component(tree);
        Ok(match self.bodies.get(module) {
            Some(html) => html.clone(),
            None => format!("<div>{}#{export}</div>", module.display()),
        })
    }

    fn render_static(&self, tree: &Element) -> Result<String, RuntimeError> {
        let (module, export) = innermost_component(tree);
        Ok(format!("<title>{}#{export}</title>", module.display()))
    }
}

// =========================================================================
// MockBundler
// =========================================================================

/// A bundler call as the mock saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedBundle {
    pub entry_name: String,
    /// Contents of the entry file at call time.
    pub entry_source: String,
    pub platform: Platform,
    pub minify: bool,
    pub target: Option<String>,
    pub drop_console: bool,
    pub keep_names: bool,
    pub legal_comments: Option<String>,
    pub extra_args: Vec<String>,
}

/// Emits `{entry_name}.js` (and optionally `{entry_name}.css`) into the
/// requested output directory.
#[derive(Default)]
pub struct MockBundler {
    css: Option<String>,
    failing: bool,
    requests: Mutex<Vec<RecordedBundle>>,
}

impl MockBundler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit_css(mut self, css: &str) -> Self {
        self.css = Some(css.to_string());
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn requests(&self) -> Vec<RecordedBundle> {
        self.requests.lock().unwrap().clone()
    }
}

impl Bundler for MockBundler {
    fn bundle(&self, request: &BundleRequest) -> Result<BundleOutput, BundleError> {
        self.requests.lock().unwrap().push(RecordedBundle {
            entry_name: request.entry_name.clone(),
            entry_source: fs::read_to_string(&request.entry).unwrap_or_default(),
            platform: request.platform,
            minify: request.minify,
            target: request.target.clone(),
            drop_console: request.drop_console,
            keep_names: request.keep_names,
            legal_comments: request.legal_comments.clone(),
            extra_args: request.extra_args.clone(),
        });
        if self.failing {
            return Err(BundleError::Failed {
                entry: request.entry.clone(),
                stderr: "✘ [ERROR] Could not resolve \"missing\"".to_string(),
            });
        }

        fs::create_dir_all(&request.out_dir)?;
        fs::write(
            request.out_dir.join(format!("{}.js", request.entry_name)),
            "console.log(\"bundled\");\n",
        )?;
        if let Some(css) = &self.css {
            fs::write(
                request.out_dir.join(format!("{}.css", request.entry_name)),
                css,
            )?;
        }
        emitted_files(&request.out_dir)
    }
}
