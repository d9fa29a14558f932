//! CSS Modules scoping and stylesheet assembly.
//!
//! Each stylesheet module is compiled with scoped class names of the form
//! `[name]_[local]_[hash]`, its module source is replaced by a class-map
//! script, and the scoped CSS of every stylesheet in the graph is merged
//! into the single output file with vendor prefixes, merged media queries
//! and optional minification.

use indexmap::IndexMap;
use lightningcss::css_modules::{self, Pattern};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};

use ferrule_style::class_identifiers;

/// One stylesheet after scoping.
pub struct ScopedStylesheet {
    /// The CSS with class names rewritten to their scoped form.
    pub css: String,
    /// camelCase identifier -> scoped class name, in source order.
    pub exports: IndexMap<String, String>,
}

/// Browser versions prefixes and syntax lowering target (encoded as
/// `major << 16`).
fn browser_targets() -> Targets {
    Targets::from(Browsers {
        chrome: Some(90 << 16),
        firefox: Some(88 << 16),
        safari: Some(14 << 16),
        ..Browsers::default()
    })
}

/// Scope one stylesheet's class names. `name` is the module's display name
/// and seeds both the scoped-name prefix and the hash.
pub fn scope_stylesheet(css: &str, name: &str) -> Result<ScopedStylesheet, String> {
    let pattern = Pattern::parse("[name]_[local]_[hash]")
        .map_err(|e| format!("invalid scope pattern: {e}"))?;

    let options = ParserOptions {
        filename: name.to_string(),
        css_modules: Some(css_modules::Config {
            pattern,
            ..Default::default()
        }),
        ..Default::default()
    };

    let stylesheet =
        StyleSheet::parse(css, options).map_err(|e| format!("CSS parse error: {e}"))?;

    let result = stylesheet
        .to_css(PrinterOptions::default())
        .map_err(|e| format!("CSS print error: {e}"))?;

    let scoped_names = result.exports.unwrap_or_default();

    // Export keys follow source order, with collisions resolved the same
    // way the declaration files resolve them (later class wins).
    let mut exports = IndexMap::new();
    for (ident, class) in class_identifiers(css, name) {
        if let Some(export) = scoped_names.get(&class) {
            exports.insert(ident, export.name.clone());
        }
    }

    Ok(ScopedStylesheet {
        css: result.code,
        exports,
    })
}

/// The replacement module source for a scoped stylesheet: a class map as the
/// default export plus one named export per camelCase identifier.
pub fn class_map_source(exports: &IndexMap<String, String>) -> String {
    let mut out = String::from("var classes = {");
    for (i, (ident, scoped)) in exports.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format!("\n  {ident:?}: {scoped:?}"));
    }
    if !exports.is_empty() {
        out.push('\n');
    }
    out.push_str("};\nexports.default = classes;\n");

    for ident in exports.keys() {
        if is_valid_identifier(ident) {
            out.push_str(&format!("exports.{ident} = classes.{ident};\n"));
        }
    }

    out
}

/// Merge the scoped stylesheets into the final output CSS: vendor prefixes
/// for the browser targets, adjacent media queries merged, and whitespace
/// dropped when minifying.
pub fn assemble(sheets: &[String], minify: bool) -> Result<String, String> {
    let combined = sheets.join("\n");
    if combined.trim().is_empty() {
        return Ok(String::new());
    }

    let targets = browser_targets();

    let mut stylesheet = StyleSheet::parse(&combined, ParserOptions::default())
        .map_err(|e| format!("CSS parse error: {e}"))?;

    stylesheet
        .minify(MinifyOptions {
            targets,
            ..Default::default()
        })
        .map_err(|e| format!("CSS transform error: {e}"))?;

    let result = stylesheet
        .to_css(PrinterOptions {
            minify,
            targets,
            ..Default::default()
        })
        .map_err(|e| format!("CSS print error: {e}"))?;

    Ok(result.code)
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
