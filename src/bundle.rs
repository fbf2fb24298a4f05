//! External bundler seam.
//!
//! CSS and hydration builds both work the same way: write a synthetic entry
//! module into a private scratch directory, run the bundler on it, copy the
//! artifact that is actually wanted into the output directory. A
//! [`ScratchBuild`] owns that directory and removes it on drop, so the entry
//! and every by-product disappear on success, bundler failure or panic
//! alike.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to start bundler {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("Bundler failed on {entry}: {stderr}")]
    Failed { entry: PathBuf, stderr: String },
    #[error("Bundler command is empty")]
    NoCommand,
}

/// Target environment of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Browser,
    Node,
}

impl Platform {
    fn as_str(self) -> &'static str {
        match self {
            Platform::Browser => "browser",
            Platform::Node => "node",
        }
    }
}

/// One bundler invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleRequest {
    pub entry: PathBuf,
    pub out_dir: PathBuf,
    /// Base name of the emitted files (`{entry_name}.js`, `{entry_name}.css`).
    pub entry_name: String,
    pub platform: Platform,
    pub minify: bool,
    pub target: Option<String>,
    pub drop_console: bool,
    pub keep_names: bool,
    pub legal_comments: Option<String>,
    /// Forwarded verbatim after the generated arguments.
    pub extra_args: Vec<String>,
}

impl BundleRequest {
    pub fn new(entry: &Path, out_dir: &Path, entry_name: &str) -> Self {
        Self {
            entry: entry.to_path_buf(),
            out_dir: out_dir.to_path_buf(),
            entry_name: entry_name.to_string(),
            platform: Platform::Browser,
            minify: false,
            target: None,
            drop_console: false,
            keep_names: false,
            legal_comments: None,
            extra_args: Vec::new(),
        }
    }
}

/// Files a bundler run emitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundleOutput {
    pub files: Vec<PathBuf>,
}

impl BundleOutput {
    /// First emitted file with the given extension.
    pub fn find(&self, extension: &str) -> Option<&Path> {
        self.files
            .iter()
            .find(|f| f.extension().and_then(|e| e.to_str()) == Some(extension))
            .map(PathBuf::as_path)
    }
}

/// Capability to bundle a module graph.
pub trait Bundler {
    fn bundle(&self, request: &BundleRequest) -> Result<BundleOutput, BundleError>;
}

/// Private working directory for one sub-build.
pub struct ScratchBuild {
    dir: TempDir,
}

impl ScratchBuild {
    /// Create a fresh directory under `scratch_root` (created if missing).
    pub fn new(scratch_root: &Path, label: &str) -> Result<Self, BundleError> {
        fs::create_dir_all(scratch_root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{label}-"))
            .tempdir_in(scratch_root)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the bundler should emit.
    pub fn out_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    pub fn write_entry(&self, file_name: &str, contents: &str) -> Result<PathBuf, BundleError> {
        let path = self.dir.path().join(file_name);
        fs::write(&path, contents)?;
        Ok(path)
    }
}

/// `import "<path>";` with the path as a properly escaped string literal.
pub fn import_statement(path: &Path) -> String {
    format!("import {};", js_string(&path.to_string_lossy()))
}

/// A JavaScript string literal. JSON strings are valid JS strings.
pub fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Runs esbuild (or any CLI with the same flags).
pub struct EsbuildBundler {
    command: Vec<String>,
    working_dir: PathBuf,
}

impl EsbuildBundler {
    pub fn new(command: &[String], working_dir: &Path) -> Self {
        Self {
            command: command.to_vec(),
            working_dir: working_dir.to_path_buf(),
        }
    }
}

/// Command-line arguments for `request`.
pub fn esbuild_args(request: &BundleRequest) -> Vec<String> {
    let mut args = vec![
        request.entry.to_string_lossy().to_string(),
        "--bundle".to_string(),
        format!("--outdir={}", request.out_dir.display()),
        format!("--entry-names={}", request.entry_name),
        "--format=esm".to_string(),
        format!("--platform={}", request.platform.as_str()),
        "--jsx=automatic".to_string(),
        "--log-level=warning".to_string(),
    ];
    if request.minify {
        args.push("--minify".to_string());
    }
    if let Some(target) = &request.target {
        args.push(format!("--target={target}"));
    }
    if request.drop_console {
        args.push("--drop:console".to_string());
    }
    if request.keep_names {
        args.push("--keep-names".to_string());
    }
    if let Some(legal) = &request.legal_comments {
        args.push(format!("--legal-comments={legal}"));
    }
    args.extend(request.extra_args.iter().cloned());
    args
}

impl Bundler for EsbuildBundler {
    fn bundle(&self, request: &BundleRequest) -> Result<BundleOutput, BundleError> {
        let (program, base_args) = self.command.split_first().ok_or(BundleError::NoCommand)?;
        let args = esbuild_args(request);
        debug!(command = %program, ?args, "running bundler");

        let output = Command::new(program)
            .args(base_args)
            .args(&args)
            .current_dir(&self.working_dir)
            .output()
            .map_err(|source| BundleError::Spawn {
                command: self.command.join(" "),
                source,
            })?;
        if !output.status.success() {
            return Err(BundleError::Failed {
                entry: request.entry.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        emitted_files(&request.out_dir)
    }
}

/// Files directly inside `out_dir`, sorted. A missing directory means nothing
/// was emitted.
pub fn emitted_files(out_dir: &Path) -> Result<BundleOutput, BundleError> {
    if !out_dir.exists() {
        return Ok(BundleOutput::default());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(out_dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(BundleOutput { files })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_build_removes_itself() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("scratch");
        let kept;
        {
            let build = ScratchBuild::new(&root, "css").unwrap();
            let entry = build.write_entry("entry.js", "export {};").unwrap();
            assert!(entry.exists());
            assert!(build.path().file_name().unwrap().to_string_lossy().starts_with("css-"));
            kept = build.path().to_path_buf();
        }
        assert!(!kept.exists());
        assert!(root.exists());
    }

    #[test]
    fn args_cover_every_option() {
        let mut request = BundleRequest::new(
            Path::new("/scratch/entry.js"),
            Path::new("/scratch/out"),
            "about-hydrate",
        );
        request.minify = true;
        request.target = Some("es2019".into());
        request.drop_console = true;
        request.keep_names = true;
        request.legal_comments = Some("none".into());
        request.extra_args = vec!["--alias:foo=bar".into()];

        let args = esbuild_args(&request);
        assert_eq!(args[0], "/scratch/entry.js");
        for expected in [
            "--bundle",
            "--outdir=/scratch/out",
            "--entry-names=about-hydrate",
            "--platform=browser",
            "--minify",
            "--target=es2019",
            "--drop:console",
            "--keep-names",
            "--legal-comments=none",
        ] {
            assert!(args.iter().any(|a| a == expected), "missing {expected}");
        }
        assert_eq!(args.last().unwrap(), "--alias:foo=bar");
    }

    #[test]
    fn args_omit_disabled_options() {
        let request = BundleRequest::new(Path::new("/e.js"), Path::new("/o"), "x");
        let args = esbuild_args(&request);
        assert!(!args.iter().any(|a| a == "--minify" || a.starts_with("--target")));
    }

    #[test]
    fn import_statement_escapes_path() {
        assert_eq!(
            import_statement(Path::new("/src/it's \"here\".css")),
            r#"import "/src/it's \"here\".css";"#
        );
    }

    #[test]
    fn emitted_files_lists_output() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(emitted_files(&tmp.path().join("none")).unwrap(), BundleOutput::default());

        fs::write(tmp.path().join("b.js"), "").unwrap();
        fs::write(tmp.path().join("a.css"), "").unwrap();
        let output = emitted_files(tmp.path()).unwrap();
        assert_eq!(output.files.len(), 2);
        assert_eq!(output.find("css"), Some(tmp.path().join("a.css").as_path()));
        assert_eq!(output.find("map"), None);
    }

    #[test]
    fn missing_bundler_command_is_spawn_error() {
        let tmp = TempDir::new().unwrap();
        let bundler = EsbuildBundler::new(&["archipelago-no-such-bundler".into()], tmp.path());
        let request = BundleRequest::new(&tmp.path().join("e.js"), tmp.path(), "x");
        assert!(matches!(bundler.bundle(&request), Err(BundleError::Spawn { .. })));
    }
}
