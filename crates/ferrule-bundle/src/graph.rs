//! The module graph the transform stages operate on.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

pub type ModuleId = usize;

/// How a module entered the graph, which decides which stages touch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// A `.ts`/`.tsx` source from the staging tree.
    Script,
    /// A `.css` module from the staging tree.
    Stylesheet,
    /// A third-party package entry point (classic CommonJS).
    Package,
}

/// One import statement, resolved to another module in the graph.
#[derive(Debug, Clone)]
pub struct ImportRecord {
    pub specifier: String,
    pub resolved: ModuleId,
    pub bindings: ImportBindings,
}

/// The local bindings an import statement introduces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportBindings {
    /// `import * as X from ...`
    pub namespace: Option<String>,
    /// `import X from ...`
    pub default: Option<String>,
    /// `import { imported as local } from ...` pairs
    pub named: Vec<(String, String)>,
}

impl ImportBindings {
    pub fn is_side_effect_only(&self) -> bool {
        self.namespace.is_none() && self.default.is_none() && self.named.is_empty()
    }
}

/// A module and its current source text. Stages rewrite `source` in place.
#[derive(Debug)]
pub struct Module {
    pub id: ModuleId,
    pub path: PathBuf,
    /// Display name, relative to the project (used in maps and messages).
    pub name: String,
    pub kind: ModuleKind,
    pub source: String,
    pub imports: Vec<ImportRecord>,
    /// For packages: the bare specifier they were imported by.
    pub package: Option<String>,
}

/// Modules in deterministic discovery order (depth-first from the entry).
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<Module>,
    by_path: IndexMap<PathBuf, ModuleId>,
    pub entry: Option<ModuleId>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        path: PathBuf,
        name: String,
        kind: ModuleKind,
        source: String,
        package: Option<String>,
    ) -> ModuleId {
        let id = self.modules.len();
        self.by_path.insert(path.clone(), id);
        self.modules.push(Module {
            id,
            path,
            name,
            kind,
            source,
            imports: Vec::new(),
            package,
        });
        id
    }

    pub fn lookup(&self, path: &Path) -> Option<ModuleId> {
        self.by_path.get(path).copied()
    }

    pub fn get(&self, id: ModuleId) -> &Module {
        &self.modules[id]
    }

    pub fn get_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id]
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Module> {
        self.modules.iter_mut()
    }
}

/// An import statement found in source, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportStatement {
    pub bindings: ImportBindings,
    pub specifier: String,
    pub type_only: bool,
}

static SIDE_EFFECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*import\s*['"]([^'"]+)['"]\s*;?\s*$"#).expect("Invalid side-effect regex")
});

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*import\s+(.+?)\s+from\s*['"]([^'"]+)['"]\s*;?\s*$"#)
        .expect("Invalid import regex")
});

/// Scan the import statements of a module.
///
/// Imports in this pipeline are one statement per line (the staged sources
/// are authored that way), so a line scan is sufficient.
pub fn scan_imports(source: &str) -> Vec<ImportStatement> {
    let mut found = Vec::new();

    for line in source.lines() {
        if let Some(cap) = SIDE_EFFECT_RE.captures(line) {
            found.push(ImportStatement {
                bindings: ImportBindings::default(),
                specifier: cap.get(1).map(|m| m.as_str()).unwrap_or("").to_string(),
                type_only: false,
            });
            continue;
        }

        if let Some(cap) = IMPORT_RE.captures(line) {
            let clause = cap.get(1).map(|m| m.as_str()).unwrap_or("");
            let specifier = cap.get(2).map(|m| m.as_str()).unwrap_or("").to_string();

            if let Some(rest) = clause.strip_prefix("type") {
                if rest.starts_with(char::is_whitespace) || rest.starts_with('{') {
                    found.push(ImportStatement {
                        bindings: ImportBindings::default(),
                        specifier,
                        type_only: true,
                    });
                    continue;
                }
            }

            found.push(ImportStatement {
                bindings: parse_import_clause(clause),
                specifier,
                type_only: false,
            });
        }
    }

    found
}

/// Parse the binding clause between `import` and `from`.
fn parse_import_clause(clause: &str) -> ImportBindings {
    let mut bindings = ImportBindings::default();
    let clause = clause.trim();

    let mut rest = clause;

    // Default binding first: `X` or `X, ...`
    if !rest.starts_with('{') && !rest.starts_with('*') {
        let end = rest.find(',').unwrap_or(rest.len());
        let default = rest[..end].trim();
        if !default.is_empty() {
            bindings.default = Some(default.to_string());
        }
        rest = rest[end..].trim_start_matches(',').trim();
    }

    if let Some(ns) = rest.strip_prefix('*') {
        let ns = ns.trim().strip_prefix("as").map(str::trim).unwrap_or("");
        if !ns.is_empty() {
            bindings.namespace = Some(ns.to_string());
        }
    } else if let Some(inner) = rest.strip_prefix('{') {
        let inner = inner.trim_end_matches('}');
        for item in inner.split(',') {
            let item = item.trim();
            if item.is_empty() || item.starts_with("type ") {
                continue;
            }
            if let Some((imported, local)) = item.split_once(" as ") {
                bindings
                    .named
                    .push((imported.trim().to_string(), local.trim().to_string()));
            } else {
                bindings.named.push((item.to_string(), item.to_string()));
            }
        }
    }

    bindings
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scans_namespace_import() {
        let found = scan_imports("import * as React from 'react';\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].specifier, "react");
        assert_eq!(found[0].bindings.namespace.as_deref(), Some("React"));
    }

    #[test]
    fn scans_named_imports_with_alias() {
        let found = scan_imports("import { render, createElement as h } from 'react';\n");
        assert_eq!(
            found[0].bindings.named,
            vec![
                ("render".to_string(), "render".to_string()),
                ("createElement".to_string(), "h".to_string())
            ]
        );
    }

    #[test]
    fn scans_default_import() {
        let found = scan_imports("import style from './index.css';\n");
        assert_eq!(found[0].bindings.default.as_deref(), Some("style"));
        assert_eq!(found[0].specifier, "./index.css");
    }

    #[test]
    fn scans_default_plus_named() {
        let found = scan_imports("import React, { Component } from 'react';\n");
        assert_eq!(found[0].bindings.default.as_deref(), Some("React"));
        assert_eq!(
            found[0].bindings.named,
            vec![("Component".to_string(), "Component".to_string())]
        );
    }

    #[test]
    fn scans_side_effect_import() {
        let found = scan_imports("import './global.css';\n");
        assert!(found[0].bindings.is_side_effect_only());
    }

    #[test]
    fn marks_type_only_imports() {
        let found = scan_imports("import type { Props } from './types';\n");
        assert!(found[0].type_only);
    }

    #[test]
    fn ignores_non_import_lines() {
        let found = scan_imports("const x = 1;\n// import nothing from 'here'\n");
        assert!(found.is_empty());
    }
}
