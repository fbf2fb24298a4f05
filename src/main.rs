use archipelago::bundle::EsbuildBundler;
use archipelago::dev::{DevMiddleware, serve};
use archipelago::fetch::HttpFetcher;
use archipelago::imaging::RustBackend;
use archipelago::pipeline::{self, Collaborators};
use archipelago::render::NodeRuntime;
use archipelago::{config, output};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "archipelago")]
#[command(about = "Static site generation with island hydration")]
#[command(long_about = "\
Static site generation with island hydration

Pages are component modules that export a pageOptions block. Each page is
rendered to HTML at build time; only its interactive islands are shipped to
the browser and hydrated there.

Project structure:

  archipelago.toml               # Build config (optional)
  firebase.json                  # Hosting manifest (optional, --hosting)
  src/
  ├── index.css                  # Global stylesheet, bundled into every page
  ├── pages/
  │   ├── About.tsx              # export const pageOptions = { slug: \"about\", routeUrl: \"/about\" }
  │   └── Home.tsx               # export const pageOptions = { slug: \"home\" }
  └── components/
      ├── Layout.tsx             # <Island path=\"/components/Counter\" props={{ start: 1 }} />
      └── Counter.tsx            # \"use client\" on the first line makes it an island

Output (default public/static, served under /static):

  about.html  about.css  about-hydrate.js  images/<hash>-400x300.jpg

Run 'archipelago gen-config' to generate a documented archipelago.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// Output directory (overrides config)
    #[arg(long, global = true)]
    out_dir: Option<PathBuf>,

    /// Public URL prefix of the output directory (overrides config)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Log filter when RUST_LOG is unset (overrides config)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build every page under a file or directory
    Build {
        /// Page module or directory of page modules
        #[arg(default_value = "src/pages")]
        input: PathBuf,
        /// Hosting manifest to point at the generated pages
        #[arg(long)]
        hosting: Option<PathBuf>,
    },
    /// List pages and their islands without building
    Discover {
        #[arg(default_value = "src/pages")]
        input: PathBuf,
    },
    /// Serve built pages locally, mirroring hosting rewrites
    Serve {
        #[arg(default_value = "src/pages")]
        input: PathBuf,
        #[arg(long, default_value_t = 3000)]
        port: u16,
        /// Do not watch pages for route changes
        #[arg(long)]
        no_watch: bool,
    },
    /// Print a stock archipelago.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = config::load_config(&cli.config, cli_overrides(&cli))?;
    init_tracing(&config.log_level);

    match &cli.command {
        Command::Build { input, hosting } => {
            let cwd = std::env::current_dir()?;
            let runtime = NodeRuntime::new(&config.js.runtime, &config.scratch_dir, &cwd)?;
            let bundler = EsbuildBundler::new(&config.js.bundler, &cwd);
            let backend = RustBackend::new();
            let fetcher =
                HttpFetcher::new(Duration::from_secs(config.image.download_timeout_secs))?;
            let collaborators = Collaborators {
                runtime: &runtime,
                bundler: &bundler,
                backend: &backend,
                fetcher: &fetcher,
            };

            println!("==> Building {}", input.display());
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_build_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = pipeline::build(input, &config, collaborators, Some(&tx)).and_then(
                |report| match hosting {
                    Some(manifest) => {
                        pipeline::apply_hosting(&report, manifest, &config, Some(&tx))
                            .map(|_| report)
                    }
                    None => Ok(report),
                },
            );
            drop(tx);
            printer.join().ok();
            remove_scratch(&config.scratch_dir);

            let report = result?;
            output::print_build_summary(&report, &config.out_dir);
            if !report.is_success() {
                std::process::exit(1);
            }
        }
        Command::Discover { input } => {
            println!("==> Discovering {}", input.display());
            let inventory = pipeline::discover_inventory(input, &config)?;
            let root = std::path::absolute(&config.src_dir)?;
            output::print_inventory(&inventory, &root);
        }
        Command::Serve {
            input,
            port,
            no_watch,
        } => {
            let mut middleware = DevMiddleware::new(input, &config);
            if !no_watch {
                middleware.watch()?;
            }
            println!("==> Serving {} on http://127.0.0.1:{}", config.out_dir.display(), port);
            serve(&middleware, &config, *port)?;
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// CLI flags as a sparse config layer.
fn cli_overrides(cli: &Cli) -> Option<toml::Value> {
    let mut table = toml::Table::new();
    if let Some(out_dir) = &cli.out_dir {
        table.insert(
            "out_dir".into(),
            toml::Value::String(out_dir.to_string_lossy().into_owned()),
        );
    }
    if let Some(base_url) = &cli.base_url {
        table.insert("base_url".into(), toml::Value::String(base_url.clone()));
    }
    if let Some(level) = &cli.log_level {
        table.insert("log_level".into(), toml::Value::String(level.clone()));
    }
    (!table.is_empty()).then_some(toml::Value::Table(table))
}

/// `RUST_LOG` wins; otherwise the configured level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// The scratch directory only holds per-build intermediates.
fn remove_scratch(dir: &Path) {
    if dir.exists()
        && let Err(e) = std::fs::remove_dir_all(dir)
    {
        tracing::warn!(path = %dir.display(), "failed to remove scratch directory: {e}");
    }
}
