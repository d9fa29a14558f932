//! The ordered transform stages the bundler runs over the module graph.
//!
//! Stage order is fixed: interop checks run on the untouched graph, scripts
//! compile before any text substitution, stylesheets scope before assembly.

use std::fs;

use tracing::debug;

use crate::bundler::{BundleConfig, BundleError};
use crate::css;
use crate::graph::{ModuleGraph, ModuleKind};

/// Mutable state threaded through the stages.
pub struct BundleState {
    pub graph: ModuleGraph,
    /// The assembled output CSS, set by [`StylesheetStage`].
    pub stylesheet: Option<String>,
}

impl BundleState {
    pub fn new(graph: ModuleGraph) -> Self {
        Self {
            graph,
            stylesheet: None,
        }
    }
}

pub trait Stage {
    fn name(&self) -> &'static str;
    fn run(&self, state: &mut BundleState, config: &BundleConfig) -> Result<(), BundleError>;
}

/// The fixed stage order.
pub fn pipeline() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(InteropStage),
        Box::new(CompileStage),
        Box::new(StylesheetStage),
        Box::new(ReplaceEnvStage),
    ]
}

/// Validates named imports from packages against the allow-list. Package
/// entry points are classic CommonJS, so named bindings only work for the
/// exports the configuration vouches for.
pub struct InteropStage;

impl Stage for InteropStage {
    fn name(&self) -> &'static str {
        "interop"
    }

    fn run(&self, state: &mut BundleState, config: &BundleConfig) -> Result<(), BundleError> {
        for module in state.graph.iter() {
            for record in &module.imports {
                let target = state.graph.get(record.resolved);
                let Some(package) = &target.package else {
                    continue;
                };

                for (imported, _) in &record.bindings.named {
                    let allowed = config
                        .named_exports
                        .get(package.as_str())
                        .is_some_and(|names| names.iter().any(|n| n == imported));
                    if !allowed {
                        return Err(BundleError::MissingNamedExport {
                            package: package.clone(),
                            name: imported.clone(),
                            importer: module.name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Compiles every script module (JSX lowering, then type stripping), with a
/// content-addressed disk cache keyed on the source hash.
pub struct CompileStage;

impl Stage for CompileStage {
    fn name(&self) -> &'static str {
        "compile"
    }

    fn run(&self, state: &mut BundleState, config: &BundleConfig) -> Result<(), BundleError> {
        let cache_ready = fs::create_dir_all(&config.cache_root).is_ok();
        if !cache_ready {
            debug!(path = %config.cache_root.display(), "compile cache unavailable");
        }

        for module in state.graph.iter_mut() {
            if module.kind != ModuleKind::Script {
                continue;
            }

            let key = blake3::hash(module.source.as_bytes()).to_hex();
            let cached = config.cache_root.join(format!("{key}.js"));

            if cache_ready {
                if let Ok(compiled) = fs::read_to_string(&cached) {
                    debug!(module = %module.name, "compile cache hit");
                    module.source = compiled;
                    continue;
                }
            }

            let compiled =
                crate::compile::compile(&module.source).map_err(|e| BundleError::Compile {
                    path: module.name.clone(),
                    message: e.to_string(),
                })?;

            if cache_ready {
                if let Err(e) = fs::write(&cached, &compiled) {
                    debug!(path = %cached.display(), error = %e, "compile cache write failed");
                }
            }

            module.source = compiled;
        }

        Ok(())
    }
}

/// Scopes every stylesheet module, swaps its source for the class-map
/// script, and assembles the merged output CSS.
pub struct StylesheetStage;

impl Stage for StylesheetStage {
    fn name(&self) -> &'static str {
        "stylesheet"
    }

    fn run(&self, state: &mut BundleState, config: &BundleConfig) -> Result<(), BundleError> {
        let mut sheets = Vec::new();

        for module in state.graph.iter_mut() {
            if module.kind != ModuleKind::Stylesheet {
                continue;
            }

            let scoped =
                css::scope_stylesheet(&module.source, &module.name).map_err(|message| {
                    BundleError::Css {
                        path: module.name.clone(),
                        message,
                    }
                })?;

            module.source = css::class_map_source(&scoped.exports);
            sheets.push(scoped.css);
        }

        let assembled = css::assemble(&sheets, config.minify).map_err(|message| {
            BundleError::Css {
                path: config.output_stylesheet.display().to_string(),
                message,
            }
        })?;

        state.stylesheet = Some(assembled);
        Ok(())
    }
}

/// Substitutes `process.env.NODE_ENV` so package dev/prod gates collapse to
/// constants. Unset environments become the literal `undefined`.
pub struct ReplaceEnvStage;

const NODE_ENV: &str = "process.env.NODE_ENV";

impl Stage for ReplaceEnvStage {
    fn name(&self) -> &'static str {
        "replace-env"
    }

    fn run(&self, state: &mut BundleState, config: &BundleConfig) -> Result<(), BundleError> {
        let replacement = match &config.node_env {
            Some(value) => {
                serde_json::to_string(value).map_err(|e| BundleError::Emit {
                    message: format!("NODE_ENV value is not representable: {e}"),
                })?
            }
            None => "undefined".to_string(),
        };

        for module in state.graph.iter_mut() {
            if module.kind == ModuleKind::Stylesheet {
                continue;
            }
            if module.source.contains(NODE_ENV) {
                module.source = module.source.replace(NODE_ENV, &replacement);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::BundleConfig;
    use std::path::PathBuf;

    fn config(temp: &tempfile::TempDir) -> BundleConfig {
        BundleConfig::new(temp.path().join("build"), temp.path().join("node_modules"))
            .cache_root(temp.path().join(".cache"))
    }

    fn script_graph(source: &str) -> ModuleGraph {
        let mut graph = ModuleGraph::new();
        graph.add(
            PathBuf::from("index.tsx"),
            "index.tsx".to_string(),
            ModuleKind::Script,
            source.to_string(),
            None,
        );
        graph.entry = Some(0);
        graph
    }

    #[test]
    fn interop_rejects_unlisted_named_import() {
        let temp = tempfile::tempdir().unwrap();
        let mut graph = script_graph("import { hydrate } from 'react-dom';\n");
        graph.add(
            PathBuf::from("react-dom/index.js"),
            "node_modules/react-dom/index.js".to_string(),
            ModuleKind::Package,
            String::new(),
            Some("react-dom".to_string()),
        );
        let statement = crate::graph::scan_imports("import { hydrate } from 'react-dom';\n")
            .remove(0);
        graph.get_mut(0).imports.push(crate::graph::ImportRecord {
            specifier: statement.specifier,
            resolved: 1,
            bindings: statement.bindings,
        });

        let mut state = BundleState::new(graph);
        let err = InteropStage.run(&mut state, &config(&temp)).unwrap_err();

        assert!(
            matches!(err, BundleError::MissingNamedExport { ref name, .. } if name == "hydrate"),
            "{err}"
        );
    }

    #[test]
    fn interop_accepts_allow_listed_named_import() {
        let temp = tempfile::tempdir().unwrap();
        let mut graph = script_graph("import { render } from 'react-dom';\n");
        graph.add(
            PathBuf::from("react-dom/index.js"),
            "node_modules/react-dom/index.js".to_string(),
            ModuleKind::Package,
            String::new(),
            Some("react-dom".to_string()),
        );
        let statement = crate::graph::scan_imports("import { render } from 'react-dom';\n")
            .remove(0);
        graph.get_mut(0).imports.push(crate::graph::ImportRecord {
            specifier: statement.specifier,
            resolved: 1,
            bindings: statement.bindings,
        });

        let mut state = BundleState::new(graph);
        assert!(InteropStage.run(&mut state, &config(&temp)).is_ok());
    }

    #[test]
    fn compile_stage_strips_types() {
        let temp = tempfile::tempdir().unwrap();
        let mut state = BundleState::new(script_graph("const a: number = 1;\n"));

        CompileStage.run(&mut state, &config(&temp)).unwrap();

        assert_eq!(state.graph.get(0).source.trim(), "const a = 1;");
    }

    #[test]
    fn compile_stage_reuses_cache() {
        let temp = tempfile::tempdir().unwrap();
        let cfg = config(&temp);

        let mut first = BundleState::new(script_graph("const a: number = 1;\n"));
        CompileStage.run(&mut first, &cfg).unwrap();

        // Poison the cache entry; a hit will surface the poisoned text.
        let key = blake3::hash("const a: number = 1;\n".as_bytes()).to_hex();
        fs::write(cfg.cache_root.join(format!("{key}.js")), "cached!").unwrap();

        let mut second = BundleState::new(script_graph("const a: number = 1;\n"));
        CompileStage.run(&mut second, &cfg).unwrap();

        assert_eq!(second.graph.get(0).source, "cached!");
    }

    #[test]
    fn compile_stage_reports_module_name_on_error() {
        let temp = tempfile::tempdir().unwrap();
        let mut state = BundleState::new(script_graph("const s = 'oops\n"));

        let err = CompileStage.run(&mut state, &config(&temp)).unwrap_err();

        assert!(
            matches!(err, BundleError::Compile { ref path, .. } if path == "index.tsx"),
            "{err}"
        );
    }

    #[test]
    fn stylesheet_stage_scopes_and_rewrites() {
        let temp = tempfile::tempdir().unwrap();
        let mut graph = script_graph("import style from './index.css';\n");
        graph.add(
            PathBuf::from("index.css"),
            "index.css".to_string(),
            ModuleKind::Stylesheet,
            ".hello { color: red; }".to_string(),
            None,
        );

        let mut state = BundleState::new(graph);
        StylesheetStage.run(&mut state, &config(&temp)).unwrap();

        let rewritten = &state.graph.get(1).source;
        assert!(rewritten.contains("exports.default = classes;"), "{rewritten}");
        assert!(rewritten.contains("exports.hello = classes.hello;"), "{rewritten}");

        let css = state.stylesheet.as_deref().unwrap();
        assert!(css.contains("index_hello_"), "{css}");
    }

    #[test]
    fn replace_env_inserts_string_literal() {
        let temp = tempfile::tempdir().unwrap();
        let cfg = config(&temp).node_env(Some("production".to_string()));
        let mut state =
            BundleState::new(script_graph("if (process.env.NODE_ENV === 'production') {}\n"));

        ReplaceEnvStage.run(&mut state, &cfg).unwrap();

        assert_eq!(
            state.graph.get(0).source.trim(),
            "if (\"production\" === 'production') {}"
        );
    }

    #[test]
    fn replace_env_defaults_to_undefined() {
        let temp = tempfile::tempdir().unwrap();
        let mut state = BundleState::new(script_graph("var env = process.env.NODE_ENV;\n"));

        ReplaceEnvStage.run(&mut state, &config(&temp)).unwrap();

        assert_eq!(state.graph.get(0).source.trim(), "var env = undefined;");
    }
}
