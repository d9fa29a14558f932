//! Bundle emission: wraps every module in a registry function, rewrites
//! import/export statements to the tiny CommonJS runtime, and appends the
//! inline source map.
//!
//! Rewrites are line-for-line wherever the input allows it, so the
//! line-granular source map stays honest.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::graph::{ImportBindings, ModuleGraph, ModuleId, ModuleKind};
use crate::sourcemap::MappingBuilder;

static IMPORT_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*import\s+(.+?)\s+from\s*['"]([^'"]+)['"]\s*;?\s*$"#)
        .expect("Invalid import regex")
});

static SIDE_EFFECT_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*import\s*['"]([^'"]+)['"]\s*;?\s*$"#).expect("Invalid side-effect regex")
});

static EXPORT_DEFAULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)export\s+default\s+").expect("Invalid export-default regex")
});

static EXPORT_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)export\s+(const|let|var|function|async\s+function|class)\s+([A-Za-z_$][A-Za-z0-9_$]*)")
        .expect("Invalid export-decl regex")
});

static EXPORT_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*export\s*\{([^}]*)\}\s*;?\s*$").expect("Invalid export-list regex")
});

/// Emit the final script for a fully transformed graph.
pub fn emit(graph: &ModuleGraph) -> Result<String, String> {
    let entry = graph.entry.ok_or("module graph has no entry")?;

    let mut map = MappingBuilder::new();
    let mut out = String::new();
    let mut line = |map: &mut MappingBuilder, out: &mut String, text: &str| {
        out.push_str(text);
        out.push('\n');
        map.push_synthetic();
    };

    line(&mut map, &mut out, "(function () {");
    line(&mut map, &mut out, "'use strict';");
    line(&mut map, &mut out, "var __modules = {");

    for module in graph.iter() {
        let source_idx = map.add_source(&module.name, &module.source);
        line(
            &mut map,
            &mut out,
            &format!("{}: function (module, exports, __require) {{", module.id),
        );

        let body = match module.kind {
            ModuleKind::Script => rewrite_script(module.id, graph)?,
            // Stylesheet sources were replaced by class maps, packages are
            // classic CommonJS; both run unchanged.
            ModuleKind::Stylesheet | ModuleKind::Package => module
                .source
                .lines()
                .enumerate()
                .map(|(i, l)| BodyLine {
                    text: l.to_string(),
                    mapped: true,
                    source_line: i,
                })
                .collect(),
        };

        for body_line in &body {
            out.push_str(&body_line.text);
            out.push('\n');
            if body_line.mapped {
                map.push_mapped(source_idx, body_line.source_line);
            } else {
                map.push_synthetic();
            }
        }

        line(&mut map, &mut out, "},");
    }

    line(&mut map, &mut out, "};");
    line(&mut map, &mut out, "var __cache = {};");
    line(&mut map, &mut out, "function __require(id) {");
    line(&mut map, &mut out, "var cached = __cache[id];");
    line(&mut map, &mut out, "if (cached) { return cached.exports; }");
    line(&mut map, &mut out, "var module = { exports: {} };");
    line(&mut map, &mut out, "__cache[id] = module;");
    line(
        &mut map,
        &mut out,
        "__modules[id](module, module.exports, __require);",
    );
    line(&mut map, &mut out, "return module.exports;");
    line(&mut map, &mut out, "}");
    line(&mut map, &mut out, "function __interopDefault(mod) {");
    line(
        &mut map,
        &mut out,
        "return mod && mod.default !== undefined ? mod.default : mod;",
    );
    line(&mut map, &mut out, "}");
    line(&mut map, &mut out, &format!("__require({entry});"));
    line(&mut map, &mut out, "})();");

    let comment = map
        .into_inline_comment()
        .map_err(|e| format!("source map serialization failed: {e}"))?;
    out.push_str(&comment);
    out.push('\n');

    Ok(out)
}

struct BodyLine {
    text: String,
    mapped: bool,
    source_line: usize,
}

/// Rewrite one script module's import/export statements. Returns the body
/// lines with their original line numbers for the map.
fn rewrite_script(id: ModuleId, graph: &ModuleGraph) -> Result<Vec<BodyLine>, String> {
    let module = graph.get(id);

    let mut by_specifier: IndexMap<&str, ModuleId> = IndexMap::new();
    for record in &module.imports {
        by_specifier.insert(record.specifier.as_str(), record.resolved);
    }

    let mut body = Vec::new();
    let mut exported_names: Vec<String> = Vec::new();

    for (line_idx, line) in module.source.lines().enumerate() {
        let text = if let Some(cap) = SIDE_EFFECT_LINE_RE.captures(line) {
            let specifier = &cap[1];
            let target = by_specifier.get(specifier).ok_or_else(|| {
                format!("unscanned import '{}' in {}", specifier, module.name)
            })?;
            format!("__require({target});")
        } else if let Some(cap) = IMPORT_LINE_RE.captures(line) {
            let clause = cap[1].to_string();
            let specifier = cap[2].to_string();
            let target = *by_specifier.get(specifier.as_str()).ok_or_else(|| {
                format!("unscanned import '{}' in {}", specifier, module.name)
            })?;
            import_bindings_line(&clause, target)
        } else if let Some(cap) = EXPORT_LIST_RE.captures(line) {
            let mut assignments = Vec::new();
            for item in cap[1].split(',') {
                let item = item.trim();
                if item.is_empty() {
                    continue;
                }
                let (local, exported) = match item.split_once(" as ") {
                    Some((local, exported)) => (local.trim(), exported.trim()),
                    None => (item, item),
                };
                assignments.push(format!("exports.{exported} = {local};"));
            }
            assignments.join(" ")
        } else if let Some(cap) = EXPORT_DECL_RE.captures(line) {
            exported_names.push(cap[3].to_string());
            EXPORT_DECL_RE.replace(line, "$1$2 $3").into_owned()
        } else if EXPORT_DEFAULT_RE.is_match(line) {
            EXPORT_DEFAULT_RE
                .replace(line, "${1}exports.default = ")
                .into_owned()
        } else {
            line.to_string()
        };

        body.push(BodyLine {
            text,
            mapped: true,
            source_line: line_idx,
        });
    }

    for name in exported_names {
        body.push(BodyLine {
            text: format!("exports.{name} = {name};"),
            mapped: false,
            source_line: 0,
        });
    }

    Ok(body)
}

/// The `var` statement replacing one import line.
fn import_bindings_line(clause: &str, target: ModuleId) -> String {
    let bindings = parse_bindings(clause);

    if bindings.is_side_effect_only() {
        return format!("__require({target});");
    }

    let mut decls = Vec::new();
    if let Some(ns) = &bindings.namespace {
        decls.push(format!("{ns} = __require({target})"));
    }
    if let Some(default) = &bindings.default {
        decls.push(format!("{default} = __interopDefault(__require({target}))"));
    }
    for (imported, local) in &bindings.named {
        decls.push(format!("{local} = __require({target}).{imported}"));
    }

    format!("var {};", decls.join(", "))
}

fn parse_bindings(clause: &str) -> ImportBindings {
    // Reuses the scanner so emit and resolve agree on clause shapes.
    let statement = format!("import {clause} from 'x';");
    crate::graph::scan_imports(&statement)
        .into_iter()
        .next()
        .map(|s| s.bindings)
        .unwrap_or_default()
}
