//! Development-time route middleware and server.
//!
//! Mirrors the hosting rewrites locally: a request for a route that belongs
//! to a discovered page is answered with that page's generated HTML. When the
//! artifact has not been built yet the answer is a diagnostic page naming the
//! expected file, never a 404, so a missing build is obvious.
//!
//! The route table comes from discovery and is built lazily on the first
//! request. A `notify` watcher on the page input marks it stale; the next
//! request rebuilds it. The watcher callback runs on notify's own thread, so
//! the flag is an `AtomicBool` and the table sits behind a `Mutex`.
//!
//! [`serve`] wraps the middleware in a single-threaded `tiny_http` loop that
//! also serves everything under `{base_url}/` straight from `out_dir`.

use crate::config::BuildConfig;
use crate::discover::discover;
use crate::naming::html_file_name;
use maud::{DOCTYPE, html};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tiny_http::{Header, Request, Response, Server, StatusCode};
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DevError {
    #[error("Failed to bind dev server on port {port}: {message}")]
    Bind { port: u16, message: String },
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A response produced by the middleware or the asset handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

/// Content type for a served file, by extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "text/javascript; charset=utf-8",
        Some("json" | "map") => "application/json",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Request path without query or fragment, and without a trailing slash
/// (except for `/` itself).
pub fn normalize_request_path(raw: &str) -> String {
    let path = raw.split(['?', '#']).next().unwrap_or("");
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn diagnostic_page(route: &str, slug: &str, artifact: &Path) -> String {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                title { "Not built: " (route) }
            }
            body {
                h1 { "Page not built yet" }
                p {
                    "Route " code { (route) } " belongs to page " code { (slug) }
                    ", but " code { (artifact.display()) } " does not exist."
                }
                p { "Run " code { "archipelago build" } " to generate it." }
            }
        }
    }
    .into_string()
}

/// Route-to-artifact middleware.
pub struct DevMiddleware {
    input: PathBuf,
    out_dir: PathBuf,
    /// Route URL to slug.
    routes: Mutex<Option<HashMap<String, String>>>,
    stale: Arc<AtomicBool>,
    watcher: Option<RecommendedWatcher>,
}

impl DevMiddleware {
    pub fn new(input: &Path, config: &BuildConfig) -> Self {
        Self {
            input: input.to_path_buf(),
            out_dir: config.out_dir.clone(),
            routes: Mutex::new(None),
            stale: Arc::new(AtomicBool::new(false)),
            watcher: None,
        }
    }

    /// Start watching the page input; any change invalidates the routes.
    pub fn watch(&mut self) -> Result<(), DevError> {
        let stale = Arc::clone(&self.stale);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res
                && !matches!(event.kind, EventKind::Access(_))
            {
                stale.store(true, Ordering::SeqCst);
            }
        })?;
        // Page discovery only looks at immediate files, and editors replace
        // files on save, so watch the directory rather than a single file.
        let target = if self.input.is_file() {
            self.input.parent().unwrap_or(Path::new("."))
        } else {
            self.input.as_path()
        };
        watcher.watch(target, RecursiveMode::NonRecursive)?;
        debug!(path = %target.display(), "watching pages");
        self.watcher = Some(watcher);
        Ok(())
    }

    /// Drop the cached route table.
    pub fn invalidate(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    fn build_routes(&self) -> HashMap<String, String> {
        match discover(&self.input) {
            Ok(discovery) => {
                let routes: HashMap<String, String> = discovery
                    .pages
                    .into_iter()
                    .map(|page| (normalize_request_path(&page.route_url), page.slug))
                    .collect();
                info!(routes = routes.len(), "dev route table built");
                routes
            }
            Err(e) => {
                warn!("dev route discovery failed: {e}");
                HashMap::new()
            }
        }
    }

    /// Slug serving `route`, rebuilding the route table if needed.
    pub fn slug_for(&self, route: &str) -> Option<String> {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        if self.stale.swap(false, Ordering::SeqCst) || routes.is_none() {
            *routes = Some(self.build_routes());
        }
        routes.as_ref().and_then(|r| r.get(route).cloned())
    }

    /// Answer `request_path` if it is a page route, otherwise `None`.
    pub fn handle(&self, request_path: &str) -> Option<DevResponse> {
        let route = normalize_request_path(request_path);
        let slug = self.slug_for(&route)?;
        let artifact = self.out_dir.join(html_file_name(&slug));

        match fs::read(&artifact) {
            Ok(body) => Some(DevResponse {
                status: 200,
                content_type: content_type(&artifact),
                body,
            }),
            Err(_) => {
                debug!(route = %route, artifact = %artifact.display(), "artifact missing");
                Some(DevResponse {
                    status: 200,
                    content_type: "text/html; charset=utf-8",
                    body: diagnostic_page(&route, &slug, &artifact).into_bytes(),
                })
            }
        }
    }
}

/// File under `out_dir` for a request below `{base_url}/`.
///
/// Rejects anything that would escape `out_dir`.
pub fn asset_path(config: &BuildConfig, request_path: &str) -> Option<PathBuf> {
    let path = request_path.split(['?', '#']).next().unwrap_or("");
    let prefix = format!("{}/", config.base_url.trim_end_matches('/'));
    let rel = path.strip_prefix(&prefix)?;
    let rel = Path::new(rel);
    if rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    let file = config.out_dir.join(rel);
    file.is_file().then_some(file)
}

/// Middleware first, then assets, then 404.
pub fn respond_to(middleware: &DevMiddleware, config: &BuildConfig, path: &str) -> DevResponse {
    if let Some(response) = middleware.handle(path) {
        return response;
    }
    if let Some(file) = asset_path(config, path)
        && let Ok(body) = fs::read(&file)
    {
        return DevResponse {
            status: 200,
            content_type: content_type(&file),
            body,
        };
    }
    DevResponse {
        status: 404,
        content_type: "text/plain; charset=utf-8",
        body: b"404 Not Found".to_vec(),
    }
}

fn send(request: Request, response: DevResponse) -> std::io::Result<()> {
    let mut out = Response::from_data(response.body).with_status_code(StatusCode(response.status));
    if let Ok(header) = Header::from_bytes("Content-Type", response.content_type) {
        out = out.with_header(header);
    }
    request.respond(out)
}

/// Serve until the process is stopped.
pub fn serve(middleware: &DevMiddleware, config: &BuildConfig, port: u16) -> Result<(), DevError> {
    let server = Server::http(("127.0.0.1", port)).map_err(|e| DevError::Bind {
        port,
        message: e.to_string(),
    })?;
    info!("dev server listening on http://127.0.0.1:{port}");

    for request in server.incoming_requests() {
        let url = request.url().to_string();
        let response = respond_to(middleware, config, &url);
        debug!(url = %url, status = response.status, "request");
        if let Err(e) = send(request, response) {
            warn!(url = %url, "failed to send response: {e}");
        }
    }
    Ok(())
}
