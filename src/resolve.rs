//! Local module resolution for static analysis.
//!
//! A deliberately small resolver: it understands relative specifiers
//! (`./x`, `../x`) and root-relative ones (`/x`, `@/x`, `~/x`, resolved
//! against the source root), tries the code extensions in order and then an
//! `index` file. Package imports are classified as external and never
//! resolved. Nothing here loads or executes a module.

use std::path::{Component, Path, PathBuf};

/// Extensions tried, in order, when a specifier has none.
pub const CODE_EXTENSIONS: &[&str] = &["tsx", "ts", "jsx", "js", "mjs"];

/// Where an import specifier points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Specifier<'a> {
    /// `./x` or `../x`, relative to the importing file.
    Relative(&'a str),
    /// `/x`, `@/x`, `~/x`: relative to the source root. Holds the part after the prefix.
    RootRelative(&'a str),
    /// A package import, never entered.
    External(&'a str),
}

pub fn classify(spec: &str) -> Specifier<'_> {
    if spec.starts_with("./") || spec.starts_with("../") || spec == "." || spec == ".." {
        Specifier::Relative(spec)
    } else if let Some(rest) = spec
        .strip_prefix("@/")
        .or_else(|| spec.strip_prefix("~/"))
        .or_else(|| spec.strip_prefix('/'))
    {
        Specifier::RootRelative(rest)
    } else {
        Specifier::External(spec)
    }
}

/// Resolve a local import from `from_file` to a code file on disk.
///
/// Returns `None` for external specifiers, non-code assets, and anything that
/// does not exist.
pub fn resolve_import(spec: &str, from_file: &Path, src_root: &Path) -> Option<PathBuf> {
    let base = match classify(spec) {
        Specifier::Relative(rel) => from_file.parent()?.join(rel),
        Specifier::RootRelative(rest) => src_root.join(rest),
        Specifier::External(_) => return None,
    };
    resolve_file(&normalize(&base))
}

/// Try `base` as-is, then with each code extension, then as a directory index.
pub fn resolve_file(base: &Path) -> Option<PathBuf> {
    if base.is_file() && has_code_extension(base) {
        return Some(base.to_path_buf());
    }
    for ext in CODE_EXTENSIONS {
        let candidate = append_extension(base, ext);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    if base.is_dir() {
        for ext in CODE_EXTENSIONS {
            let candidate = base.join(format!("index.{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Logical import path of an island reference: always `/`-prefixed and
/// relative to the source root.
///
/// Relative references (`./Counter`) are anchored at the file that contains
/// the usage; everything else is taken as root-relative. Returns `None` when a
/// relative reference escapes the source root.
pub fn logical_island_path(reference: &str, from_file: &Path, src_root: &Path) -> Option<String> {
    let absolute = match classify(reference) {
        Specifier::Relative(rel) => normalize(&from_file.parent()?.join(rel)),
        Specifier::RootRelative(rest) => normalize(&src_root.join(rest)),
        Specifier::External(bare) => normalize(&src_root.join(bare)),
    };
    let relative = absolute.strip_prefix(normalize(src_root)).ok()?;
    let joined = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    Some(format!("/{joined}"))
}

/// Absolute file for a logical island path, if it resolves.
pub fn resolve_logical(import_path: &str, src_root: &Path) -> Option<PathBuf> {
    let rest = import_path.trim_start_matches('/');
    resolve_file(&normalize(&src_root.join(rest)))
}

/// Lexically normalize `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub fn has_code_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| CODE_EXTENSIONS.contains(&e))
}

fn append_extension(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Blank out `//` and `/* */` comments, leaving string literals intact.
///
/// Byte offsets and line breaks are preserved so matches can still be
/// reported against the original text.
pub fn strip_comments(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let mut quote: Option<u8> = None;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            out.push(b);
            if b == b'\\' && i + 1 < bytes.len() {
                out.push(bytes[i + 1]);
                i += 2;
                continue;
            }
            // Plain quotes cannot span lines; a stray apostrophe in JSX text ends here.
            if b == q || (b == b'\n' && q != b'`') {
                quote = None;
            }
            i += 1;
            continue;
        }
        match (b, bytes.get(i + 1)) {
            (b'"' | b'\'' | b'`', _) => {
                quote = Some(b);
                out.push(b);
                i += 1;
            }
            (b'/', Some(b'/')) => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out.push(b' ');
                    i += 1;
                }
            }
            (b'/', Some(b'*')) => {
                out.extend_from_slice(b"  ");
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    out.push(if bytes[i] == b'\n' { b'\n' } else { b' ' });
                    i += 1;
                }
                if i < bytes.len() {
                    out.extend_from_slice(b"  ");
                    i += 2;
                }
            }
            _ => {
                out.push(b);
                i += 1;
            }
        }
    }

    // Only ASCII bytes were replaced, so multi-byte sequences are intact.
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}
