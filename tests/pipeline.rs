//! End-to-end builds through the public API.
//!
//! The JavaScript runtime, the bundler and the network are replaced by small
//! in-process stand-ins; image work goes through the real [`RustBackend`].

use archipelago::bundle::{BundleError, BundleOutput, BundleRequest, Bundler, emitted_files};
use archipelago::config::{BuildConfig, CssOptions};
use archipelago::fetch::{FetchError, Fetcher};
use archipelago::imaging::RustBackend;
use archipelago::naming::image_file_name;
use archipelago::pipeline::{BuildReport, Collaborators, apply_hosting, build};
use archipelago::render::{ComponentRuntime, Element, ModuleInfo, RuntimeError};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PHOTO: &str = "https://images.example.com/team.png?w=2000&amp;fit=max";
const PHOTO_DECODED: &str = "https://images.example.com/team.png?w=2000&fit=max";

// =========================================================================
// Stand-in collaborators
// =========================================================================

/// Renders each page component to fixed markup keyed by file name.
struct StubRuntime;

fn page_component(tree: &Element) -> &Path {
    match tree {
        Element::Component { module, .. } => module,
        Element::IslandProvider { child, .. }
        | Element::Suspense { child }
        | Element::Context { child, .. } => page_component(child),
    }
}

impl ComponentRuntime for StubRuntime {
    fn load_module(&self, _path: &Path) -> Result<ModuleInfo, RuntimeError> {
        Ok(ModuleInfo {
            exports: vec!["default".into(), "pageOptions".into()],
            has_head: true,
            has_context: true,
        })
    }

    fn render_to_string(&self, tree: &Element) -> Result<String, RuntimeError> {
        let module = page_component(tree);
        Ok(match module.file_name().and_then(|f| f.to_str()) {
            Some("About.tsx") => format!(
                concat!(
                    "<main><h1>About us</h1>",
                    r#"<div data-island="/components/Counter" data-island-props="{{&quot;start&quot;:1}}"><button>1</button></div>"#,
                    r#"<img src="{}" width="400" alt="The team">"#,
                    r#"<img src="/local/logo.png" width="40">"#,
                    "</main>"
                ),
                PHOTO
            ),
            _ => "<main><p>hello</p></main>".to_string(),
        })
    }

    fn render_static(&self, tree: &Element) -> Result<String, RuntimeError> {
        let module = page_component(tree);
        let stem = module.file_stem().and_then(|s| s.to_str()).unwrap_or("page");
        Ok(format!("<title>{stem}</title>"))
    }
}

/// Copies imported stylesheets into `{name}.css` and the entry source into
/// `{name}.js`.
struct CopyBundler;

impl Bundler for CopyBundler {
    fn bundle(&self, request: &BundleRequest) -> Result<BundleOutput, BundleError> {
        let entry = fs::read_to_string(&request.entry)?;
        let mut css = String::new();
        for line in entry.lines() {
            let Some(path) = line
                .strip_prefix("import \"")
                .and_then(|rest| rest.strip_suffix("\";"))
            else {
                continue;
            };
            if path.ends_with(".css") {
                css.push_str(&fs::read_to_string(path)?);
            }
        }

        fs::create_dir_all(&request.out_dir)?;
        fs::write(
            request.out_dir.join(format!("{}.js", request.entry_name)),
            &entry,
        )?;
        if !css.is_empty() {
            fs::write(
                request.out_dir.join(format!("{}.css", request.entry_name)),
                css,
            )?;
        }
        emitted_files(&request.out_dir)
    }
}

/// Serves one PNG for every URL.
struct PngFetcher {
    body: Vec<u8>,
}

impl PngFetcher {
    fn new(width: u32, height: u32) -> Self {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 251) as u8, (y % 241) as u8, 90])
        });
        let mut body = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut body), image::ImageFormat::Png)
            .unwrap();
        Self { body }
    }
}

impl Fetcher for PngFetcher {
    fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        Ok(self.body.clone())
    }
}

// =========================================================================
// Fixture project
// =========================================================================

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn project() -> (TempDir, BuildConfig) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "src/index.css", "body { margin: 0; }\n");
    write(
        root,
        "src/pages/About.tsx",
        r#"import Layout from "@/components/Layout";

export const pageOptions = {
  slug: "about",
  routeUrl: "/about",
  Head: () => <title>About</title>,
  context: async (app, { routeUrl }) => app,
};

export default function About() {
  return <Layout />;
}
"#,
    );
    write(
        root,
        "src/pages/Home.tsx",
        "export const pageOptions = { slug: 'home' };\nexport default () => <p>hello</p>;\n",
    );
    write(
        root,
        "src/components/Layout.tsx",
        "export default () => <main><Island path=\"/components/Counter\" props={{ start: 1 }} /></main>;\n",
    );
    write(
        root,
        "src/components/Counter.tsx",
        "'use client';\nexport default function Counter({ start }) { return <button>{start}</button>; }\n",
    );

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
    (tmp, config)
}

fn run(input: &Path, config: &BuildConfig) -> BuildReport {
    let backend = RustBackend::new();
    let fetcher = PngFetcher::new(1600, 1200);
    let collaborators = Collaborators {
        runtime: &StubRuntime,
        bundler: &CopyBundler,
        backend: &backend,
        fetcher: &fetcher,
    };
    build(input, config, collaborators, None).unwrap()
}

// =========================================================================
// Scenarios
// =========================================================================

#[test]
fn about_page_with_island_and_image() {
    let (tmp, config) = project();
    let report = run(&tmp.path().join("src/pages"), &config);
    assert!(report.is_success(), "failures: {:?}", report.failures);

    let out = &config.out_dir;
    let html = fs::read_to_string(out.join("about.html")).unwrap();

    // Deferred hydration loader, never a direct script reference
    assert!(html.contains(r#"var src = "/static/about-hydrate.js";"#));
    assert!(html.contains(r#"window.__ISLAND_ROUTE__ = "/about";"#));
    assert!(!html.contains(r#"<script src="/static/about-hydrate.js""#));

    // Stylesheet in the head
    assert!(html.contains(r#"<link rel="stylesheet" href="/static/about.css">"#));
    let css = fs::read_to_string(out.join("about.css")).unwrap();
    assert!(css.contains("margin: 0"));

    // Head component output
    assert!(html.contains("<title>About</title>"));

    // Remote image rewritten to a local 400px variant, local image untouched
    let primary = image_file_name(PHOTO_DECODED, 400, 300, "jpg");
    assert!(out.join("images").join(&primary).is_file());
    assert!(html.contains(&format!(r#"src="/static/images/{primary}""#)));
    assert!(html.contains(r#"width="400""#));
    assert!(html.contains(r#"height="300""#));
    assert!(html.contains(r#"<img src="/local/logo.png" width="40">"#));
    assert!(!html.contains("images.example.com"));
    assert!(html.contains(&format!("/static/images/{primary} 1x")));
    assert!(!html.contains("800w"));

    // 2x density variant listed in srcset with density descriptors
    let double = image_file_name(PHOTO_DECODED, 800, 600, "jpg");
    assert!(out.join("images").join(&double).is_file());
    assert!(html.contains(&format!("/static/images/{double} 2x")));

    // Preload hint for the first image
    assert!(html.contains(r#"rel="preload""#));

    // Hydration bundle imports exactly the validated island
    let hydrate = fs::read_to_string(out.join("about-hydrate.js")).unwrap();
    assert!(hydrate.contains("Counter.tsx"));
    assert!(hydrate.contains(r#""/components/Counter": Island0"#));

    // Scratch builds leave nothing behind
    assert_eq!(fs::read_dir(&config.scratch_dir).unwrap().count(), 0);
}

#[test]
fn page_without_islands_has_no_hydration() {
    let (tmp, config) = project();
    let report = run(&tmp.path().join("src/pages"), &config);

    let home = report.pages.iter().find(|p| p.slug == "home").unwrap();
    assert_eq!(home.route_url, "/");
    assert_eq!(home.hydrate_url, None);

    let html = fs::read_to_string(config.out_dir.join("home.html")).unwrap();
    assert!(!html.contains("<script"));
    assert!(!html.contains("__ISLAND_ROUTE__"));
    assert!(!config.out_dir.join("home-hydrate.js").exists());
}

#[test]
fn rebuild_produces_identical_image_names() {
    let (tmp, config) = project();
    let input = tmp.path().join("src/pages");

    run(&input, &config);
    let mut first: Vec<_> = fs::read_dir(config.out_dir.join("images"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    first.sort();

    run(&input, &config);
    let mut second: Vec<_> = fs::read_dir(config.out_dir.join("images"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    second.sort();

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
}

#[test]
fn single_page_hosting_sync() {
    let (tmp, config) = project();
    let manifest = write(
        tmp.path(),
        "firebase.json",
        r#"{
  "hosting": {
    "public": "public",
    "rewrites": [
      { "source": "**", "destination": "/index.html" }
    ]
  }
}
"#,
    );

    let report = run(&tmp.path().join("src/pages/Home.tsx"), &config);
    apply_hosting(&report, &manifest, &config, None).unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&manifest).unwrap()).unwrap();
    assert_eq!(
        written["hosting"]["rewrites"],
        serde_json::json!([
            { "source": "/", "destination": "/static/home.html" },
            { "source": "**", "destination": "/index.html" }
        ])
    );
    assert_eq!(written["hosting"]["public"], "public");
}

#[test]
fn single_file_without_options_is_fatal() {
    let (tmp, config) = project();
    let backend = RustBackend::new();
    let fetcher = PngFetcher::new(8, 8);
    let collaborators = Collaborators {
        runtime: &StubRuntime,
        bundler: &CopyBundler,
        backend: &backend,
        fetcher: &fetcher,
    };

    let result = build(
        &tmp.path().join("src/components/Counter.tsx"),
        &config,
        collaborators,
        None,
    );
    assert!(result.is_err());
    assert!(!config.out_dir.exists());
}
