//! Module resolution: relative specifiers against the staging tree and bare
//! specifiers against the packages root, preferring browser-targeted entry
//! points.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::bundler::BundleError;
use crate::graph::{scan_imports, ImportRecord, ModuleGraph, ModuleId, ModuleKind};

/// Extension probe order for relative specifiers.
const PROBES: &[&str] = &["tsx", "ts", "css"];

pub struct Resolver {
    staging_root: PathBuf,
    packages_root: PathBuf,
}

impl Resolver {
    pub fn new(staging_root: impl Into<PathBuf>, packages_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
            packages_root: packages_root.into(),
        }
    }

    /// Build the module graph by walking imports depth-first from the entry.
    pub fn build_graph(&self, entry: &Path) -> Result<ModuleGraph, BundleError> {
        let mut graph = ModuleGraph::new();
        let entry = normalize(entry);

        if !entry.is_file() {
            return Err(BundleError::Resolve {
                specifier: entry.display().to_string(),
                importer: "<entry>".to_string(),
            });
        }

        let kind = kind_of(&entry);
        let id = self.load(&mut graph, entry, kind, None)?;
        graph.entry = Some(id);
        Ok(graph)
    }

    fn load(
        &self,
        graph: &mut ModuleGraph,
        path: PathBuf,
        kind: ModuleKind,
        package: Option<String>,
    ) -> Result<ModuleId, BundleError> {
        if let Some(id) = graph.lookup(&path) {
            return Ok(id);
        }

        let source = fs::read_to_string(&path).map_err(|e| BundleError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let name = self.display_name(&path);
        let id = graph.add(path.clone(), name, kind, source, package);

        // Only staged scripts are scanned for imports. Package sources are
        // classic CommonJS and must be self-contained single files.
        if kind != ModuleKind::Script {
            return Ok(id);
        }

        let statements = scan_imports(&graph.get(id).source.clone());
        let importer_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();

        let mut records = Vec::new();
        for statement in statements {
            if statement.type_only {
                continue;
            }

            let (target, target_kind, target_package) =
                self.resolve(&statement.specifier, &importer_dir, &path)?;
            let resolved = self.load(graph, target, target_kind, target_package)?;

            records.push(ImportRecord {
                specifier: statement.specifier,
                resolved,
                bindings: statement.bindings,
            });
        }

        graph.get_mut(id).imports = records;
        Ok(id)
    }

    fn resolve(
        &self,
        specifier: &str,
        importer_dir: &Path,
        importer: &Path,
    ) -> Result<(PathBuf, ModuleKind, Option<String>), BundleError> {
        if specifier.starts_with("./") || specifier.starts_with("../") {
            let base = normalize(&importer_dir.join(specifier));

            if base.is_file() {
                return Ok((base.clone(), kind_of(&base), None));
            }
            for ext in PROBES {
                let candidate = base.with_extension(ext);
                if candidate.is_file() {
                    return Ok((candidate.clone(), kind_of(&candidate), None));
                }
            }
            for index in ["index.tsx", "index.ts"] {
                let candidate = base.join(index);
                if candidate.is_file() {
                    return Ok((candidate, ModuleKind::Script, None));
                }
            }

            return Err(BundleError::Resolve {
                specifier: specifier.to_string(),
                importer: importer.display().to_string(),
            });
        }

        // Bare specifier: a package under the packages root.
        let package_dir = self.packages_root.join(specifier);
        let entry = package_entry(&package_dir).ok_or_else(|| BundleError::Resolve {
            specifier: specifier.to_string(),
            importer: importer.display().to_string(),
        })?;

        Ok((
            normalize(&entry),
            ModuleKind::Package,
            Some(specifier.to_string()),
        ))
    }

    fn display_name(&self, path: &Path) -> String {
        if let Ok(rel) = path.strip_prefix(&self.staging_root) {
            return rel.display().to_string().replace('\\', "/");
        }
        if let Ok(rel) = path.strip_prefix(&self.packages_root) {
            return format!("node_modules/{}", rel.display()).replace('\\', "/");
        }
        path.display().to_string()
    }
}

/// Pick a package's entry point: `browser`, then `module`, then `main`,
/// then `index.js`.
fn package_entry(package_dir: &Path) -> Option<PathBuf> {
    let manifest_path = package_dir.join("package.json");

    if let Ok(manifest) = fs::read_to_string(&manifest_path) {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&manifest) {
            for field in ["browser", "module", "main"] {
                if let Some(rel) = json.get(field).and_then(|v| v.as_str()) {
                    let candidate = package_dir.join(rel);
                    if candidate.is_file() {
                        return Some(candidate);
                    }
                }
            }
        }
    }

    let fallback = package_dir.join("index.js");
    fallback.is_file().then_some(fallback)
}

fn kind_of(path: &Path) -> ModuleKind {
    match path.extension().and_then(|e| e.to_str()) {
        Some("css") => ModuleKind::Stylesheet,
        _ => ModuleKind::Script,
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn staging(temp: &tempfile::TempDir) -> PathBuf {
        let dir = temp.path().join("build");
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn packages(temp: &tempfile::TempDir) -> PathBuf {
        let dir = temp.path().join("node_modules");
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn records_the_entry_module() {
        let temp = tempfile::tempdir().unwrap();
        let build = staging(&temp);
        fs::write(build.join("index.tsx"), "export const a = 1;\n").unwrap();

        let resolver = Resolver::new(&build, packages(&temp));
        let graph = resolver.build_graph(&build.join("index.tsx")).unwrap();

        assert_eq!(graph.entry, Some(0));
        assert_eq!(graph.get(0).kind, ModuleKind::Script);
    }

    #[test]
    fn resolves_relative_with_extension_probe() {
        let temp = tempfile::tempdir().unwrap();
        let build = staging(&temp);
        fs::create_dir_all(build.join("Hello")).unwrap();
        fs::write(build.join("index.tsx"), "import { Hello } from './Hello';\n").unwrap();
        fs::write(build.join("Hello/index.tsx"), "export const Hello = 1;\n").unwrap();

        let resolver = Resolver::new(&build, packages(&temp));
        let graph = resolver.build_graph(&build.join("index.tsx")).unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get(1).name, "Hello/index.tsx");
    }

    #[test]
    fn resolves_stylesheet_imports() {
        let temp = tempfile::tempdir().unwrap();
        let build = staging(&temp);
        fs::write(build.join("index.tsx"), "import style from './index.css';\n").unwrap();
        fs::write(build.join("index.css"), ".app { color: red; }\n").unwrap();

        let resolver = Resolver::new(&build, packages(&temp));
        let graph = resolver.build_graph(&build.join("index.tsx")).unwrap();

        assert_eq!(graph.get(1).kind, ModuleKind::Stylesheet);
    }

    #[test]
    fn prefers_browser_entry_for_packages() {
        let temp = tempfile::tempdir().unwrap();
        let build = staging(&temp);
        let node_modules = packages(&temp);
        fs::write(build.join("index.tsx"), "import * as React from 'react';\n").unwrap();
        fs::create_dir_all(node_modules.join("react")).unwrap();
        fs::write(
            node_modules.join("react/package.json"),
            r#"{ "main": "main.js", "browser": "browser.js" }"#,
        )
        .unwrap();
        fs::write(node_modules.join("react/browser.js"), "module.exports = {};\n").unwrap();
        fs::write(node_modules.join("react/main.js"), "module.exports = {};\n").unwrap();

        let resolver = Resolver::new(&build, &node_modules);
        let graph = resolver.build_graph(&build.join("index.tsx")).unwrap();

        let package = graph.get(1);
        assert_eq!(package.kind, ModuleKind::Package);
        assert!(package.path.ends_with("react/browser.js"));
        assert_eq!(package.package.as_deref(), Some("react"));
    }

    #[test]
    fn fails_on_unresolved_specifier() {
        let temp = tempfile::tempdir().unwrap();
        let build = staging(&temp);
        fs::write(build.join("index.tsx"), "import { x } from './missing';\n").unwrap();

        let resolver = Resolver::new(&build, packages(&temp));
        let err = resolver.build_graph(&build.join("index.tsx")).unwrap_err();

        assert!(matches!(err, BundleError::Resolve { .. }));
    }

    #[test]
    fn type_only_imports_are_not_resolved() {
        let temp = tempfile::tempdir().unwrap();
        let build = staging(&temp);
        fs::write(
            build.join("index.tsx"),
            "import type { Props } from './missing';\nexport const a = 1;\n",
        )
        .unwrap();

        let resolver = Resolver::new(&build, packages(&temp));
        let graph = resolver.build_graph(&build.join("index.tsx")).unwrap();

        assert_eq!(graph.len(), 1);
    }
}
