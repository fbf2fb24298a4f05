//! # Archipelago
//!
//! A static-site generator for component-based pages with partial
//! ("island") hydration. Every page is rendered to plain HTML at build time;
//! only the interactive islands a page actually contains are shipped to the
//! browser and re-activated there.
//!
//! # Architecture: Per-Page Pipeline
//!
//! Discovery runs once. Each discovered page then runs the full pipeline, one
//! page after another:
//!
//! ```text
//! discover   pages/*.tsx        →  PageDescriptor     (text analysis, no execution)
//! islands    page import graph  →  IslandDescriptor   ("use client" components)
//! render     page + islands     →  body + head HTML   (external JS runtime)
//! optimize   body HTML          →  local images       (download, resize, srcset)
//! css        global + page      →  {slug}.css         (external bundler)
//! hydrate    islands            →  {slug}-hydrate.js  (external bundler)
//! generate   all of the above   →  {slug}.html
//! ```
//!
//! After the last page, the hosting manifest is pointed at the new artifacts.
//!
//! Two passes look at page modules and they are deliberately kept apart.
//! Discovery and island scanning only read source text, so they run on trees
//! that do not build yet. Rendering genuinely imports modules and is the only
//! stage that needs a working JavaScript runtime.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `archipelago.toml` loading, layered merging, validation |
//! | [`types`] | Records passed between stages, and the [`types::Outcome`] tagged result |
//! | [`naming`] | Deterministic artifact and image file names |
//! | [`resolve`] | Local import resolution: extensions, index files, root-relative paths |
//! | [`discover`] | Page discovery from `pageOptions` blocks |
//! | [`islands`] | Import-graph walk collecting validated islands |
//! | [`render`] | Server rendering through the [`render::ComponentRuntime`] seam |
//! | [`imaging`] | Image identify / resize / encode behind [`imaging::ImageBackend`] |
//! | [`fetch`] | Bounded-concurrency remote downloads behind [`fetch::Fetcher`] |
//! | [`optimize`] | `<img>` rewriting, srcset generation, preload hints |
//! | [`bundle`] | External bundler seam and self-cleaning scratch builds |
//! | [`css`] | Per-page CSS bundles |
//! | [`hydrate`] | Per-page hydration entry generation and bundling |
//! | [`generate`] | HTML document assembly with Maud |
//! | [`hosting`] | Hosting manifest rewrite rules |
//! | [`dev`] | Dev-time route middleware and server |
//! | [`pipeline`] | Build orchestration, reports, build plugin hook |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## External Collaborators Behind Traits
//!
//! Rendering components and bundling module graphs are jobs for the
//! JavaScript toolchain, not for this crate. Each is a small trait
//! ([`render::ComponentRuntime`], [`bundle::Bundler`]) with one process-based
//! implementation and recording mocks in the test suite. Image encoding and
//! downloads get the same treatment ([`imaging::ImageBackend`],
//! [`fetch::Fetcher`]), so the whole pipeline runs in tests without node,
//! esbuild or network access.
//!
//! ## Degrade, Don't Abort
//!
//! Unresolvable islands, failed downloads and missing head components only
//! cost the page that feature. They come back as
//! [`types::Outcome::Skipped`] values with a reason and end up as warnings in
//! the build report. CSS and hydration failures are fatal for their page,
//! since styling and behavior cannot be approximated.
//!
//! ## Deferred Hydration
//!
//! Pages never reference their hydration bundle with a `<script src>`. A tiny
//! inline loader injects it on first interaction or when an island becomes
//! visible, keeping script cost off the critical rendering path. Pages
//! without islands carry no script at all.
//!
//! ## Deterministic Image Names
//!
//! Optimized images are named after a hash of the source URL plus the output
//! width. Rebuilding without a cache still produces the same files, and srcset
//! entries that collapse onto the primary size are not written twice.

pub mod bundle;
pub mod config;
pub mod css;
pub mod dev;
pub mod discover;
pub mod fetch;
pub mod generate;
pub mod hosting;
pub mod hydrate;
pub mod imaging;
pub mod islands;
pub mod naming;
pub mod optimize;
pub mod output;
pub mod pipeline;
pub mod render;
pub mod resolve;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
