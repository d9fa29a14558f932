//! Stylus-subset to CSS transpiler.
//!
//! Covers the indented subset the pipeline's stylesheets are written in:
//! indentation-based nesting, `&` parent references, comma selector groups,
//! `name value` / `name: value;` declarations, `ident = value` variables,
//! nested `@media` blocks, and `//` / `/* */` comments. Anything outside the
//! subset is a syntax error carrying its 1-based line number; there is no
//! error recovery.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use walkdir::WalkDir;

/// A syntax error within a single stylesheet.
#[derive(Debug, Clone, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub message: String,
}

/// Errors from the style components of the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum StyleError {
    #[error("{path}: {source}")]
    Syntax {
        path: String,
        #[source]
        source: SyntaxError,
    },

    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to write {path}: {message}")]
    Write { path: String, message: String },
}

fn syntax(line: usize, message: impl Into<String>) -> SyntaxError {
    SyntaxError {
        line,
        message: message.into(),
    }
}

#[derive(Debug)]
enum Item {
    Decl {
        line: usize,
        name: String,
        value: String,
    },
    Rule {
        line: usize,
        selectors: Vec<String>,
        items: Vec<Item>,
    },
    AtRule {
        prelude: String,
        items: Vec<Item>,
    },
}

/// Transpile one stylesheet source to plain CSS.
pub fn transpile(source: &str) -> Result<String, SyntaxError> {
    let stripped = strip_comments(source);
    let lines: Vec<Line> = stripped
        .lines()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(idx, text)| Line {
            number: idx + 1,
            indent: text.len() - text.trim_start().len(),
            text: text.trim().to_string(),
        })
        .collect();

    let mut cursor = Cursor { lines, pos: 0 };
    let mut vars: HashMap<String, String> = HashMap::new();

    let indent = cursor.peek().map(|l| l.indent).unwrap_or(0);
    let items = parse_block(&mut cursor, indent, &mut vars)?;

    for item in &items {
        if let Item::Decl { line, name, .. } = item {
            return Err(syntax(
                *line,
                format!("property '{name}' outside of a selector"),
            ));
        }
    }

    let mut out = String::new();
    emit_items(&items, &[], &mut out)?;
    Ok(out)
}

struct Line {
    number: usize,
    indent: usize,
    text: String,
}

struct Cursor {
    lines: Vec<Line>,
    pos: usize,
}

impl Cursor {
    fn peek(&self) -> Option<&Line> {
        self.lines.get(self.pos)
    }

    fn next(&mut self) -> Option<&Line> {
        let line = self.lines.get(self.pos);
        if line.is_some() {
            self.pos += 1;
        }
        line
    }
}

static VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_$][A-Za-z0-9_-]*)\s*=\s*(.+)$").expect("Invalid variable regex")
});

static PROP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:--?)?[A-Za-z][A-Za-z0-9-]*)\s*:?\s*(.*)$").expect("Invalid property regex")
});

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_$][A-Za-z0-9_-]*").expect("Invalid ident regex"));

fn parse_block(
    cursor: &mut Cursor,
    indent: usize,
    vars: &mut HashMap<String, String>,
) -> Result<Vec<Item>, SyntaxError> {
    let mut items = Vec::new();

    loop {
        let Some(line) = cursor.peek() else { break };
        if line.indent < indent {
            break;
        }
        if line.indent > indent {
            return Err(syntax(line.number, "unexpected indentation"));
        }

        let number = line.number;
        let text = cursor.next().map(|l| l.text.clone()).unwrap_or_default();

        if text.contains('{') || text.contains('}') {
            return Err(syntax(number, "braces are not supported; use indentation"));
        }

        // Variable definition: `accent = #ff4081`
        if let Some(cap) = VAR_RE.captures(&text) {
            if cursor.peek().is_some_and(|l| l.indent > indent) {
                return Err(syntax(number, "a variable definition cannot open a block"));
            }
            let name = cap.get(1).map(|m| m.as_str()).unwrap_or("").to_string();
            let value = cap.get(2).map(|m| m.as_str().trim()).unwrap_or("").to_string();
            let value = substitute_vars(&value, vars);
            vars.insert(name, value);
            continue;
        }

        // Selector groups may spread over several comma-terminated lines.
        let mut header = text;
        while header.ends_with(',') {
            let continues = matches!(cursor.peek(), Some(next) if next.indent == indent);
            if !continues {
                return Err(syntax(number, "selector group ends with a trailing comma"));
            }
            let next = cursor.next().map(|l| l.text.clone()).unwrap_or_default();
            header.push(' ');
            header.push_str(&next);
        }

        let opens_block = cursor.peek().is_some_and(|l| l.indent > indent);

        if opens_block {
            // A declaration cannot open a block, so deeper lines under one
            // are a nesting mistake, not children.
            if !header.starts_with('@') && looks_like_declaration(&header) {
                let deeper = cursor.peek().map(|l| l.number).unwrap_or(number);
                return Err(syntax(deeper, "unexpected indentation"));
            }

            let child_indent = cursor.peek().map(|l| l.indent).unwrap_or(indent);
            let children = parse_block(cursor, child_indent, vars)?;

            if header.starts_with('@') {
                items.push(Item::AtRule {
                    prelude: header,
                    items: children,
                });
            } else {
                items.push(Item::Rule {
                    line: number,
                    selectors: header.split(',').map(|s| s.trim().to_string()).collect(),
                    items: children,
                });
            }
        } else {
            if header.starts_with('@') {
                return Err(syntax(number, "expected an indented block after at-rule"));
            }
            items.push(parse_decl(&header, number, vars)?);
        }
    }

    Ok(items)
}

fn parse_decl(
    text: &str,
    number: usize,
    vars: &HashMap<String, String>,
) -> Result<Item, SyntaxError> {
    if text.starts_with(['.', '#', '&', '[', '>', '*', '+', '~']) {
        return Err(syntax(
            number,
            format!("selector '{text}' has no declarations"),
        ));
    }

    let trimmed = text.trim_end_matches(';').trim_end();

    let Some(cap) = PROP_RE.captures(trimmed) else {
        return Err(syntax(number, format!("expected a declaration, found '{text}'")));
    };

    let name = cap.get(1).map(|m| m.as_str()).unwrap_or("").to_string();
    let value = cap.get(2).map(|m| m.as_str().trim()).unwrap_or("");

    if value.is_empty() {
        return Err(syntax(
            number,
            format!("expected a value for property '{name}'"),
        ));
    }

    Ok(Item::Decl {
        line: number,
        name,
        value: substitute_vars(value, vars),
    })
}

/// Whether a rule header actually has the shape of a `name value` /
/// `name: value` declaration. Selector punctuation (including the no-space
/// colon of pseudo-classes like `a:hover`) disqualifies it.
fn looks_like_declaration(text: &str) -> bool {
    if text.starts_with(['.', '#', '&', '[', '>', '*', '+', '~']) || text.contains(',') {
        return false;
    }

    let trimmed = text.trim_end_matches(';').trim_end();
    let Some(cap) = PROP_RE.captures(trimmed) else {
        return false;
    };
    if cap.get(2).map(|m| m.as_str().trim()).unwrap_or("").is_empty() {
        return false;
    }

    let rest = &trimmed[cap.get(1).map(|m| m.end()).unwrap_or(0)..];
    rest.starts_with(char::is_whitespace)
        || (rest.starts_with(':') && rest[1..].starts_with(char::is_whitespace))
}

/// Replace defined variable names inside a declaration value.
fn substitute_vars(value: &str, vars: &HashMap<String, String>) -> String {
    IDENT_RE
        .replace_all(value, |caps: &regex::Captures| {
            let word = caps.get(0).map(|m| m.as_str()).unwrap_or("");
            vars.get(word).cloned().unwrap_or_else(|| word.to_string())
        })
        .into_owned()
}

fn emit_items(items: &[Item], parents: &[String], out: &mut String) -> Result<(), SyntaxError> {
    // Declarations first, in one block per selector chain, then child rules.
    let decls: Vec<(&String, &String)> = items
        .iter()
        .filter_map(|i| match i {
            Item::Decl { name, value, .. } => Some((name, value)),
            _ => None,
        })
        .collect();

    if !decls.is_empty() && !parents.is_empty() {
        out.push_str(&parents.join(", "));
        out.push_str(" {\n");
        for (name, value) in decls {
            out.push_str(&format!("  {name}: {value};\n"));
        }
        out.push_str("}\n");
    }

    for item in items {
        match item {
            Item::Decl { .. } => {}
            Item::Rule {
                line,
                selectors,
                items,
            } => {
                let resolved = resolve_selectors(selectors, parents, *line)?;
                emit_items(items, &resolved, out)?;
            }
            Item::AtRule { prelude, items } => {
                out.push_str(prelude);
                out.push_str(" {\n");
                let mut inner = String::new();
                emit_items(items, parents, &mut inner)?;
                out.push_str(&inner);
                out.push_str("}\n");
            }
        }
    }

    Ok(())
}

fn resolve_selectors(
    selectors: &[String],
    parents: &[String],
    line: usize,
) -> Result<Vec<String>, SyntaxError> {
    if parents.is_empty() {
        for sel in selectors {
            if sel.contains('&') {
                return Err(syntax(line, "parent reference '&' at root level"));
            }
        }
        return Ok(selectors.to_vec());
    }

    let mut resolved = Vec::with_capacity(parents.len() * selectors.len());
    for parent in parents {
        for sel in selectors {
            if sel.contains('&') {
                resolved.push(sel.replace('&', parent));
            } else {
                resolved.push(format!("{parent} {sel}"));
            }
        }
    }
    Ok(resolved)
}

/// Strip `//` line comments and `/* */` block comments, preserving newlines
/// so reported line numbers stay aligned with the source.
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let bytes: Vec<char> = source.chars().collect();
    let mut i = 0;
    let mut last_significant = '\0';

    while i < bytes.len() {
        let c = bytes[i];
        let next = bytes.get(i + 1).copied().unwrap_or('\0');

        match c {
            '/' if next == '/' && !matches!(last_significant, ':' | '/') => {
                while i < bytes.len() && bytes[i] != '\n' {
                    i += 1;
                }
            }
            '/' if next == '*' => {
                i += 2;
                while i < bytes.len() {
                    if bytes[i] == '*' && bytes.get(i + 1) == Some(&'/') {
                        i += 2;
                        break;
                    }
                    if bytes[i] == '\n' {
                        out.push('\n');
                    }
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                out.push(c);
                i += 1;
                while i < bytes.len() {
                    out.push(bytes[i]);
                    if bytes[i] == '\\' && i + 1 < bytes.len() {
                        out.push(bytes[i + 1]);
                        i += 2;
                        continue;
                    }
                    let done = bytes[i] == quote;
                    i += 1;
                    if done {
                        break;
                    }
                }
                last_significant = quote;
            }
            _ => {
                if !c.is_whitespace() {
                    last_significant = c;
                }
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Transpile every `*.styl` under `source_root` into `staging_root`,
/// preserving relative paths with the extension swapped to `.css`.
///
/// Files are independent, so they transpile in parallel. The first failure
/// aborts the whole step.
pub fn transpile_tree(source_root: &Path, staging_root: &Path) -> Result<usize, StyleError> {
    let stylesheets: Vec<(PathBuf, PathBuf)> = WalkDir::new(source_root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "styl"))
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(source_root)
                .unwrap_or(e.path())
                .with_extension("css");
            (e.path().to_path_buf(), staging_root.join(rel))
        })
        .collect();

    stylesheets
        .par_iter()
        .try_for_each(|(source_path, target_path)| {
            let source = fs::read_to_string(source_path).map_err(|e| StyleError::Read {
                path: source_path.display().to_string(),
                message: e.to_string(),
            })?;

            let css = transpile(&source).map_err(|e| StyleError::Syntax {
                path: source_path.display().to_string(),
                source: e,
            })?;

            if let Some(parent) = target_path.parent() {
                fs::create_dir_all(parent).map_err(|e| StyleError::Write {
                    path: parent.display().to_string(),
                    message: e.to_string(),
                })?;
            }

            fs::write(target_path, css).map_err(|e| StyleError::Write {
                path: target_path.display().to_string(),
                message: e.to_string(),
            })?;

            tracing::debug!("Transpiled {}", source_path.display());
            Ok(())
        })?;

    Ok(stylesheets.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn transpiles_flat_rule() {
        let css = transpile(".banner\n  color red\n  padding 1rem\n").unwrap();
        assert_eq!(css, ".banner {\n  color: red;\n  padding: 1rem;\n}\n");
    }

    #[test]
    fn accepts_css_punctuation() {
        let css = transpile(".banner\n  color: red;\n").unwrap();
        assert_eq!(css, ".banner {\n  color: red;\n}\n");
    }

    #[test]
    fn accepts_prefixed_and_custom_properties() {
        let css = transpile(".a\n  -webkit-box-shadow none\n  --accent #f00\n").unwrap();
        assert!(css.contains("-webkit-box-shadow: none;"), "{css}");
        assert!(css.contains("--accent: #f00;"), "{css}");
    }

    #[test]
    fn nests_selectors() {
        let css = transpile(".banner\n  color red\n  .banner-logo\n    width 32px\n").unwrap();
        assert!(css.contains(".banner {\n  color: red;\n}"));
        assert!(css.contains(".banner .banner-logo {\n  width: 32px;\n}"));
    }

    #[test]
    fn resolves_parent_reference() {
        let css = transpile(".hello\n  &:hover\n    color blue\n").unwrap();
        assert_eq!(css, ".hello:hover {\n  color: blue;\n}\n");
    }

    #[test]
    fn expands_comma_groups() {
        let css = transpile("h1, h2\n  margin 0\n").unwrap();
        assert_eq!(css, "h1, h2 {\n  margin: 0;\n}\n");
    }

    #[test]
    fn substitutes_variables() {
        let css = transpile("accent = #ff4081\n.banner\n  color accent\n").unwrap();
        assert_eq!(css, ".banner {\n  color: #ff4081;\n}\n");
    }

    #[test]
    fn emits_media_blocks() {
        let css =
            transpile("@media screen and (max-width: 600px)\n  .banner\n    width 100%\n").unwrap();
        assert_eq!(
            css,
            "@media screen and (max-width: 600px) {\n.banner {\n  width: 100%;\n}\n}\n"
        );
    }

    #[test]
    fn bubbles_media_inside_rule() {
        let css = transpile(".banner\n  @media print\n    display none\n").unwrap();
        assert_eq!(css, "@media print {\n.banner {\n  display: none;\n}\n}\n");
    }

    #[test]
    fn strips_comments() {
        let css = transpile("// heading\n.banner\n  /* inline */\n  color red\n").unwrap();
        assert_eq!(css, ".banner {\n  color: red;\n}\n");
    }

    #[test]
    fn keeps_url_schemes_intact() {
        let css = transpile(".banner\n  background url(http://example.com/x.png)\n").unwrap();
        assert!(css.contains("url(http://example.com/x.png)"));
    }

    #[test]
    fn rejects_property_at_root() {
        let err = transpile("color red\n").unwrap_err();
        assert!(err.message.contains("outside of a selector"), "{err}");
    }

    #[test]
    fn rejects_selector_without_block() {
        let err = transpile(".banner\n  .empty\n".trim_end()).unwrap_err();
        assert!(err.message.contains("has no declarations"), "{err}");
    }

    #[test]
    fn rejects_unexpected_indentation() {
        let err = transpile(".a\n  color red\n      width 0\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("unexpected indentation"));
    }

    #[test]
    fn rejects_block_under_declaration() {
        let err = transpile(".a\n  margin 0\n    padding 0\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("unexpected indentation"));
    }

    #[test]
    fn keeps_pseudo_class_nesting() {
        let css = transpile(".a\n  a:hover\n    color blue\n").unwrap();
        assert_eq!(css, ".a a:hover {\n  color: blue;\n}\n");
    }

    #[test]
    fn rejects_braces() {
        let err = transpile(".a {\n  color red\n}\n").unwrap_err();
        assert!(err.message.contains("braces"), "{err}");
    }

    #[test]
    fn rejects_root_parent_reference() {
        let err = transpile("&:hover\n  color red\n").unwrap_err();
        assert!(err.message.contains("parent reference"), "{err}");
    }

    #[test]
    fn transpiles_tree_preserving_relative_paths() {
        let temp = tempfile::tempdir().unwrap();
        let src = temp.path().join("src");
        let staging = temp.path().join("build");

        fs::create_dir_all(src.join("Banner")).unwrap();
        fs::write(src.join("index.styl"), ".app\n  margin 0\n").unwrap();
        fs::write(src.join("Banner/index.styl"), ".banner\n  color red\n").unwrap();

        let count = transpile_tree(&src, &staging).unwrap();

        assert_eq!(count, 2);
        assert!(staging.join("index.css").exists());
        assert!(staging.join("Banner/index.css").exists());
    }

    #[test]
    fn tree_fails_on_syntax_error() {
        let temp = tempfile::tempdir().unwrap();
        let src = temp.path().join("src");
        let staging = temp.path().join("build");

        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("bad.styl"), "color red\n").unwrap();

        let err = transpile_tree(&src, &staging).unwrap_err();
        assert!(matches!(err, StyleError::Syntax { .. }));
    }
}
