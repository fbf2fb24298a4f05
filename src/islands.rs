//! Island scanning.
//!
//! Finds every interactive island a page can reach by following **local**
//! imports from its entry module. This is a restricted static import-graph
//! walk: it never loads a module, so it runs safely over source trees that do
//! not build yet. The price is soundness; re-exports behind package imports,
//! computed paths and conditional usages are invisible to it.
//!
//! ## Algorithm
//!
//! 1. Breadth-first traversal over a worklist seeded with the entry file. Each
//!    file is visited once.
//! 2. In each file, `<Island path="…">` usages add a logical reference to the
//!    result set, and local `import`/`export … from` specifiers are resolved
//!    and enqueued.
//! 3. Each unique reference is resolved to a file and validated: its first
//!    non-empty line must be the `"use client"` directive.
//!
//! Unresolved references and missing directives are dropped with a warning;
//! the page still builds, just without hydration for that island. Imported
//! files that cannot be read are skipped the same way; only an unreadable
//! entry file is an error.
//!
//! The scan also records how each reference was written. Relative references
//! only make sense next to the file that contains them, so the renderer gets
//! an alias table from written form to logical path.
//!
//! References are collected into ordered sets keyed by logical path, so the
//! result does not depend on import order or traversal order.

use crate::naming::island_name;
use crate::resolve::{logical_island_path, resolve_import, resolve_logical, strip_comments};
use crate::types::{IslandDescriptor, Outcome};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};

/// Required first-line directive of an island module.
pub const DIRECTIVE: &str = "use client";

#[derive(Error, Debug)]
pub enum IslandError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Everything the scanner found for one page.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IslandScan {
    /// Validated islands, ordered by import path.
    pub islands: Vec<IslandDescriptor>,
    /// References dropped during validation, with the reason.
    pub dropped: Vec<(String, String)>,
    /// Every file visited by the traversal.
    pub visited: Vec<PathBuf>,
    /// Reference strings as written (`../Counter`, `@/components/Menu`)
    /// mapped to their logical import path. A string that means different
    /// islands in different files is left out.
    pub aliases: BTreeMap<String, String>,
    /// Imported files that could not be read, with the error. The traversal
    /// continues past them.
    pub unreadable: Vec<(PathBuf, String)>,
}

static ISLAND_USAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<Island\b[^>]*?\bpath\s*=\s*(?:"([^"]+)"|'([^']+)'|\{\s*(?:"([^"]+)"|'([^']+)'|`([^`$]+)`)\s*\})"#,
    )
    .unwrap()
});

static IMPORT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:import|export)\b[^;'"`]*?\bfrom\s*["']([^"']+)["']"#).unwrap()
});

static BARE_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bimport\s*\(?\s*["']([^"']+)["']"#).unwrap());

/// Scan the import graph rooted at `entry` for island references.
pub fn scan_islands(entry: &Path, src_root: &Path) -> Result<IslandScan, IslandError> {
    let mut references: BTreeMap<String, PathBuf> = BTreeMap::new();
    let mut aliases: BTreeMap<String, Option<String>> = BTreeMap::new();
    let mut unreadable: Vec<(PathBuf, String)> = Vec::new();
    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut order: Vec<PathBuf> = Vec::new();
    let mut queue: VecDeque<PathBuf> = VecDeque::from([entry.to_path_buf()]);

    while let Some(file) = queue.pop_front() {
        if !visited.insert(file.clone()) {
            continue;
        }
        order.push(file.clone());

        let raw = match fs::read_to_string(&file) {
            Ok(raw) => raw,
            Err(source) if file == entry => {
                return Err(IslandError::Io { path: file, source });
            }
            Err(e) => {
                warn!(file = %file.display(), "skipping unreadable import: {e}");
                unreadable.push((file, e.to_string()));
                continue;
            }
        };
        let source = strip_comments(&raw);

        for reference in island_references(&source) {
            match logical_island_path(&reference, &file, src_root) {
                Some(logical) => {
                    if reference != logical {
                        record_alias(&mut aliases, &reference, &logical);
                    }
                    references.entry(logical).or_insert_with(|| file.clone());
                }
                None => warn!(
                    island = %reference,
                    file = %file.display(),
                    "island reference points outside the source root"
                ),
            }
        }

        for spec in import_specifiers(&source) {
            if let Some(target) = resolve_import(&spec, &file, src_root)
                && !visited.contains(&target)
            {
                queue.push_back(target);
            }
        }
    }

    let mut scan = IslandScan {
        visited: order,
        aliases: aliases
            .into_iter()
            .filter_map(|(reference, logical)| Some((reference, logical?)))
            .collect(),
        unreadable,
        ..IslandScan::default()
    };
    for (import_path, referenced_from) in references {
        match validate_island(&import_path, src_root) {
            Outcome::Done(island) => {
                debug!(island = %island.name, path = %island.import_path, "island validated");
                scan.islands.push(island);
            }
            Outcome::Skipped { reason } => {
                warn!(
                    island = %import_path,
                    referenced_from = %referenced_from.display(),
                    "dropping island: {reason}"
                );
                scan.dropped.push((import_path, reason));
            }
        }
    }
    Ok(scan)
}

fn record_alias(aliases: &mut BTreeMap<String, Option<String>>, reference: &str, logical: &str) {
    match aliases.get(reference) {
        None => {
            aliases.insert(reference.to_string(), Some(logical.to_string()));
        }
        Some(Some(existing)) if existing != logical => {
            warn!(
                island = %reference,
                "island reference means different components in different files; \
                 it only resolves by root-relative path at render time"
            );
            aliases.insert(reference.to_string(), None);
        }
        Some(_) => {}
    }
}

/// Island reference strings declared in module text.
pub fn island_references(source: &str) -> Vec<String> {
    ISLAND_USAGE
        .captures_iter(source)
        .filter_map(|caps| (1..=5).find_map(|i| caps.get(i)))
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// Every import specifier in module text, local or not.
pub fn import_specifiers(source: &str) -> BTreeSet<String> {
    IMPORT_FROM
        .captures_iter(source)
        .chain(BARE_IMPORT.captures_iter(source))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Resolve a logical island path and check its directive.
pub fn validate_island(import_path: &str, src_root: &Path) -> Outcome<IslandDescriptor> {
    let Some(file_path) = resolve_logical(import_path, src_root) else {
        return Outcome::skipped("could not resolve to a component file");
    };
    let content = match fs::read_to_string(&file_path) {
        Ok(content) => content,
        Err(e) => return Outcome::skipped(format!("unreadable: {e}")),
    };
    if !has_directive(&content) {
        return Outcome::skipped(format!(
            "{} does not start with the \"{DIRECTIVE}\" directive",
            file_path.display()
        ));
    }
    Outcome::Done(IslandDescriptor {
        name: island_name(import_path),
        file_path,
        import_path: import_path.to_string(),
    })
}

/// True if the first non-empty line is exactly the directive literal.
pub fn has_directive(content: &str) -> bool {
    let Some(first) = content
        .trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
    else {
        return false;
    };
    let literal = first.strip_suffix(';').unwrap_or(first).trim_end();
    [format!("\"{DIRECTIVE}\""), format!("'{DIRECTIVE}'")]
        .iter()
        .any(|quoted| literal == quoted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_file;
    use tempfile::TempDir;

    const COUNTER: &str = "\"use client\";\nexport default function Counter() {}\n";

    #[test]
    fn directive_detection() {
        assert!(has_directive("\"use client\";\nexport default 1;"));
        assert!(has_directive("\n\n  'use client'\nexport default 1;"));
        assert!(has_directive("\u{feff}\"use client\""));
        assert!(!has_directive("// \"use client\"\n"));
        assert!(!has_directive("import x from 'y';\n\"use client\";"));
        assert!(!has_directive("\"use server\";"));
        assert!(!has_directive("\"use client\"; export default 1;"));
        assert!(!has_directive(""));
    }

    #[test]
    fn island_usage_forms() {
        let src = r#"
            <Island path="/components/Counter" props={{ start: 1 }} />
            <Island props={{}} path='/components/Toggle' />
            <Island path={"@/components/Menu"} />
            <Island path={`/components/Clock`}/>
            <IslandLike path="/components/Nope" />
        "#;
        assert_eq!(
            island_references(src),
            vec![
                "/components/Counter",
                "/components/Toggle",
                "@/components/Menu",
                "/components/Clock",
            ]
        );
    }

    #[test]
    fn import_forms() {
        let src = r#"
            import React from "react";
            import { A, B } from './a';
            import * as C from "../c";
            export { D } from "@/d";
            import "./side-effect";
            const Lazy = import("./lazy");
        "#;
        let specs: Vec<String> = import_specifiers(src).into_iter().collect();
        assert_eq!(
            specs,
            vec!["../c", "./a", "./lazy", "./side-effect", "@/d", "react"]
        );
    }

    fn project() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write_file(
            &src,
            "pages/About.tsx",
            "import Layout from '../components/Layout';\nimport React from 'react';\nexport default () => <Layout />;\n",
        );
        write_file(
            &src,
            "components/Layout.tsx",
            "import { Nav } from './nav';\nexport default () => <div><Nav /><Island path=\"/components/Counter\" props={{}} /></div>;\n",
        );
        write_file(
            &src,
            "components/nav/index.tsx",
            "import Layout from '../Layout';\nexport const Nav = () => <Island path=\"../Counter\" />;\nexport const X = () => <Island path=\"/components/Plain\" />;\nexport const Y = () => <Island path=\"/components/Missing\" />;\n",
        );
        write_file(&src, "components/Counter.tsx", COUNTER);
        write_file(&src, "components/Plain.tsx", "export default function Plain() {}\n");
        tmp
    }

    #[test]
    fn follows_local_imports_and_validates() {
        let tmp = project();
        let src = tmp.path().join("src");
        let scan = scan_islands(&src.join("pages/About.tsx"), &src).unwrap();

        assert_eq!(scan.islands.len(), 1);
        let counter = &scan.islands[0];
        assert_eq!(counter.name, "Counter");
        assert_eq!(counter.import_path, "/components/Counter");
        assert_eq!(counter.file_path, src.join("components/Counter.tsx"));

        let dropped: Vec<&str> = scan.dropped.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(dropped, vec!["/components/Missing", "/components/Plain"]);

        // Entry, Layout, nav/index; the import cycle back to Layout is not revisited.
        assert_eq!(scan.visited.len(), 3);
    }

    #[test]
    fn written_references_map_to_logical_paths() {
        let tmp = project();
        let src = tmp.path().join("src");
        let scan = scan_islands(&src.join("pages/About.tsx"), &src).unwrap();

        assert_eq!(
            scan.aliases.get("../Counter").map(String::as_str),
            Some("/components/Counter")
        );
        // Already logical, no alias needed
        assert!(!scan.aliases.contains_key("/components/Counter"));
    }

    #[test]
    fn ambiguous_relative_reference_has_no_alias() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write_file(
            &src,
            "pages/Home.tsx",
            "import A from '../a/A';\nimport B from '../b/B';\nexport default () => <A />;\n",
        );
        write_file(&src, "a/A.tsx", "export default () => <Island path=\"./Widget\" />;\n");
        write_file(&src, "b/B.tsx", "export default () => <Island path=\"./Widget\" />;\n");
        write_file(&src, "a/Widget.tsx", COUNTER);
        write_file(&src, "b/Widget.tsx", COUNTER);

        let scan = scan_islands(&src.join("pages/Home.tsx"), &src).unwrap();
        assert_eq!(scan.islands.len(), 2);
        assert!(!scan.aliases.contains_key("./Widget"));
    }

    #[test]
    fn unreadable_import_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write_file(
            &src,
            "pages/Home.tsx",
            "import Legacy from '../components/Legacy';\nimport Layout from '../components/Layout';\nexport default () => <Layout />;\n",
        );
        write_file(
            &src,
            "components/Layout.tsx",
            "export default () => <Island path=\"/components/Counter\" />;\n",
        );
        let legacy = src.join("components/Legacy.jsx");
        fs::write(&legacy, [0xff, 0xfe, 0x00, 0x78]).unwrap();
        write_file(&src, "components/Counter.tsx", COUNTER);

        let scan = scan_islands(&src.join("pages/Home.tsx"), &src).unwrap();
        assert_eq!(scan.islands.len(), 1);
        assert_eq!(scan.unreadable.len(), 1);
        assert_eq!(scan.unreadable[0].0, legacy);
    }

    #[test]
    fn result_is_independent_of_import_order() {
        let tmp = project();
        let src = tmp.path().join("src");
        let first = scan_islands(&src.join("pages/About.tsx"), &src).unwrap();

        write_file(
            &src,
            "components/Layout.tsx",
            "export default () => <div><Island path=\"/components/Counter\" props={{}} /><Nav /></div>;\nimport { Nav } from './nav';\n",
        );
        let second = scan_islands(&src.join("pages/About.tsx"), &src).unwrap();

        assert_eq!(first.islands, second.islands);
        assert_eq!(first.dropped, second.dropped);
    }

    #[test]
    fn page_without_islands() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write_file(&src, "pages/Static.tsx", "export default () => <p>hi</p>;\n");
        let scan = scan_islands(&src.join("pages/Static.tsx"), &src).unwrap();
        assert!(scan.islands.is_empty());
        assert!(scan.dropped.is_empty());
    }

    #[test]
    fn unreadable_entry_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = scan_islands(&tmp.path().join("missing.tsx"), tmp.path());
        assert!(matches!(result, Err(IslandError::Io { .. })));
    }
}
