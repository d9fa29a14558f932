//! Source map assembly for the bundled script.
//!
//! Mappings are line-granular: every generated line that came from a module
//! points at column 0 of the corresponding line of that module's compiled
//! source, which is embedded via `sourcesContent`. Runtime scaffolding lines
//! are left unmapped.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

const BASE64_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Serialize)]
struct SourceMap<'a> {
    version: u8,
    sources: &'a [String],
    #[serde(rename = "sourcesContent")]
    sources_content: &'a [String],
    names: [&'a str; 0],
    mappings: String,
}

/// One generated line's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOrigin {
    /// Bundler scaffolding with no source counterpart.
    Synthetic,
    /// Line `line` (0-based) of source `source` (index into `sources`).
    Source { source: usize, line: usize },
}

/// Accumulates per-line origins while the emitter writes the bundle.
#[derive(Debug, Default)]
pub struct MappingBuilder {
    sources: Vec<String>,
    contents: Vec<String>,
    lines: Vec<LineOrigin>,
}

impl MappingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source file, returning its index.
    pub fn add_source(&mut self, name: &str, content: &str) -> usize {
        self.sources.push(name.to_string());
        self.contents.push(content.to_string());
        self.sources.len() - 1
    }

    pub fn push_synthetic(&mut self) {
        self.lines.push(LineOrigin::Synthetic);
    }

    pub fn push_mapped(&mut self, source: usize, line: usize) {
        self.lines.push(LineOrigin::Source { source, line });
    }

    /// Render the map and return it as an inline `sourceMappingURL` comment.
    pub fn into_inline_comment(self) -> Result<String, serde_json::Error> {
        let mappings = encode_mappings(&self.lines);
        let map = SourceMap {
            version: 3,
            sources: &self.sources,
            sources_content: &self.contents,
            names: [],
            mappings,
        };

        let json = serde_json::to_string(&map)?;
        let encoded = STANDARD.encode(json.as_bytes());
        Ok(format!(
            "//# sourceMappingURL=data:application/json;charset=utf-8;base64,{encoded}"
        ))
    }
}

/// Encode the per-line origins as VLQ mapping groups. Fields are deltas
/// against the previous mapped segment, per the source map v3 format.
fn encode_mappings(lines: &[LineOrigin]) -> String {
    let mut out = String::new();
    let mut prev_source = 0i64;
    let mut prev_line = 0i64;

    for (i, origin) in lines.iter().enumerate() {
        if i > 0 {
            out.push(';');
        }
        if let LineOrigin::Source { source, line } = origin {
            let source = *source as i64;
            let line = *line as i64;
            // generated column, source index, source line, source column
            vlq(&mut out, 0);
            vlq(&mut out, source - prev_source);
            vlq(&mut out, line - prev_line);
            vlq(&mut out, 0);
            prev_source = source;
            prev_line = line;
        }
    }

    out
}

/// Base64 VLQ with the sign in the low bit.
fn vlq(out: &mut String, value: i64) {
    let mut n = if value < 0 {
        (((-value) as u64) << 1) | 1
    } else {
        (value as u64) << 1
    };

    loop {
        let mut digit = (n & 0x1f) as usize;
        n >>= 5;
        if n > 0 {
            digit |= 0x20;
        }
        out.push(BASE64_CHARS[digit] as char);
        if n == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vlq_str(value: i64) -> String {
        let mut s = String::new();
        vlq(&mut s, value);
        s
    }

    #[test]
    fn encodes_small_values() {
        assert_eq!(vlq_str(0), "A");
        assert_eq!(vlq_str(1), "C");
        assert_eq!(vlq_str(-1), "D");
        assert_eq!(vlq_str(15), "e");
    }

    #[test]
    fn encodes_multi_digit_values() {
        assert_eq!(vlq_str(16), "gB");
        assert_eq!(vlq_str(123), "2H");
    }

    #[test]
    fn synthetic_lines_have_empty_groups() {
        let lines = vec![
            LineOrigin::Synthetic,
            LineOrigin::Source { source: 0, line: 0 },
            LineOrigin::Source { source: 0, line: 1 },
        ];

        // Empty group, then absolute first segment, then a +1 line delta.
        assert_eq!(encode_mappings(&lines), ";AAAA;AACA");
    }

    #[test]
    fn source_switch_encodes_delta() {
        let lines = vec![
            LineOrigin::Source { source: 0, line: 4 },
            LineOrigin::Source { source: 1, line: 0 },
        ];

        assert_eq!(encode_mappings(&lines), "AAIA;ACJA");
    }

    #[test]
    fn inline_comment_embeds_sources_content() {
        let mut builder = MappingBuilder::new();
        let idx = builder.add_source("index.tsx", "const a = 1;\n");
        builder.push_synthetic();
        builder.push_mapped(idx, 0);

        let comment = builder.into_inline_comment().unwrap();
        let encoded = comment
            .rsplit("base64,")
            .next()
            .unwrap();
        let json = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();

        assert!(comment.starts_with("//# sourceMappingURL=data:application/json"));
        assert!(json.contains("\"version\":3"), "{json}");
        assert!(json.contains("index.tsx"), "{json}");
        assert!(json.contains("const a = 1;"), "{json}");
    }
}
