//! Class-name extraction and the shared camelCase identifier transform.
//!
//! Both the declaration generator and the bundler's stylesheet-extraction
//! stage go through [`camel_case_class`], so the generated typings and the
//! runtime class-name object can never disagree on an identifier.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

/// Convert an authored CSS class name into a camelCase identifier.
///
/// Each run of `-`/`_` characters is deleted and the character that follows
/// it is upper-cased. A trailing run with nothing after it is kept as-is.
///
/// ```
/// use ferrule_style::classmap::camel_case_class;
///
/// assert_eq!(camel_case_class("item__frame--active"), "itemFrameActive");
/// assert_eq!(camel_case_class("foo-bar"), "fooBar");
/// ```
pub fn camel_case_class(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '-' || c == '_' {
            // Swallow the whole separator run.
            let mut run = String::new();
            run.push(c);
            while let Some(&sep) = chars.peek() {
                if sep != '-' && sep != '_' {
                    break;
                }
                run.push(sep);
                chars.next();
            }
            match chars.next() {
                Some(next) => out.extend(next.to_uppercase()),
                // Trailing separators survive untouched.
                None => out.push_str(&run),
            }
        } else {
            out.push(c);
        }
    }

    out
}

static SELECTOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^{}]+)\{").expect("Invalid selector regex"));

static CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.(-?[A-Za-z_][A-Za-z0-9_-]*)").expect("Invalid class regex"));

/// Extract every class name declared by a stylesheet, in source order,
/// deduplicated on first occurrence.
pub fn extract_class_names(css: &str) -> Vec<String> {
    let mut seen = Vec::new();

    for sel in SELECTOR_RE.captures_iter(css) {
        let prelude = sel.get(1).map(|m| m.as_str()).unwrap_or("");
        for cap in CLASS_RE.captures_iter(prelude) {
            let name = cap.get(1).map(|m| m.as_str()).unwrap_or("");
            if !name.is_empty() && !seen.iter().any(|s| s == name) {
                seen.push(name.to_string());
            }
        }
    }

    seen
}

/// Map every declared class to its camelCase identifier, in source order.
///
/// When two distinct class names normalize to the same identifier, the later
/// one wins and the collision is reported with a warning. The original
/// pipeline overwrote silently; the data loss is kept observable here.
pub fn class_identifiers(css: &str, origin: &str) -> IndexMap<String, String> {
    let mut map: IndexMap<String, String> = IndexMap::new();

    for class in extract_class_names(css) {
        let ident = camel_case_class(&class);
        if let Some(previous) = map.insert(ident.clone(), class.clone()) {
            if previous != class {
                tracing::warn!(
                    "{origin}: class names '{previous}' and '{class}' both normalize \
                     to '{ident}'; the later one wins"
                );
            }
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn camel_cases_separator_runs() {
        assert_eq!(camel_case_class("item__frame--active"), "itemFrameActive");
        assert_eq!(camel_case_class("foo-bar"), "fooBar");
        assert_eq!(camel_case_class("already-camel"), "alreadyCamel");
        assert_eq!(camel_case_class("plain"), "plain");
    }

    #[test]
    fn camel_cases_leading_and_mixed_runs() {
        assert_eq!(camel_case_class("--leading"), "Leading");
        assert_eq!(camel_case_class("a_-b"), "aB");
        assert_eq!(camel_case_class("foo_1bar"), "foo1bar");
    }

    #[test]
    fn keeps_trailing_separators() {
        assert_eq!(camel_case_class("trailing--"), "trailing--");
        assert_eq!(camel_case_class("x_"), "x_");
    }

    #[test]
    fn underscores_and_hyphens_agree() {
        assert_eq!(camel_case_class("foo-bar"), camel_case_class("foo_bar"));
    }

    #[test]
    fn extracts_classes_in_source_order() {
        let css = ".banner { color: red; }\n.banner-logo:hover { top: 0; }\nh1.hello { margin: 0; }";
        assert_eq!(extract_class_names(css), vec!["banner", "banner-logo", "hello"]);
    }

    #[test]
    fn extracts_classes_inside_media_blocks() {
        let css = "@media screen and (max-width: 600px) {\n.narrow { width: 100%; }\n}";
        assert_eq!(extract_class_names(css), vec!["narrow"]);
    }

    #[test]
    fn ignores_duplicate_selectors() {
        let css = ".a { color: red; }\n.a:hover { color: blue; }";
        assert_eq!(extract_class_names(css), vec!["a"]);
    }

    #[test]
    fn collision_keeps_later_class() {
        let css = ".foo-bar { color: red; }\n.foo_bar { color: blue; }";
        let map = class_identifiers(css, "test.css");

        assert_eq!(map.len(), 1);
        assert_eq!(map.get("fooBar").map(String::as_str), Some("foo_bar"));
    }
}
