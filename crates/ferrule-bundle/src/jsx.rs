//! JSX lowering: rewrites JSX elements to `React.createElement` calls.
//!
//! Runs before type stripping so the stripper only ever sees plain
//! expressions. Elements nest arbitrarily; expression containers are
//! re-entered recursively so JSX inside props and children lowers too.

/// A JSX syntax error, with a 1-based source line.
#[derive(Debug, Clone, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct JsxError {
    pub line: usize,
    pub message: String,
}

/// Lower every JSX element in `source` to `React.createElement` calls.
pub fn lower_jsx(source: &str) -> Result<String, JsxError> {
    Lowerer::new(source).run()
}

struct Lowerer {
    chars: Vec<char>,
    pos: usize,
    out: String,
    /// Last significant (non-whitespace, non-comment) character copied.
    last_sig: char,
    /// Last identifier word copied, for `return <div>` style positions.
    last_word: String,
}

impl Lowerer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            out: String::with_capacity(source.len()),
            last_sig: '\0',
            last_word: String::new(),
        }
    }

    fn error(&self, at: usize, message: impl Into<String>) -> JsxError {
        let line = self.chars[..at.min(self.chars.len())]
            .iter()
            .filter(|c| **c == '\n')
            .count()
            + 1;
        JsxError {
            line,
            message: message.into(),
        }
    }

    fn peek(&self, offset: usize) -> char {
        self.chars.get(self.pos + offset).copied().unwrap_or('\0')
    }

    fn run(mut self) -> Result<String, JsxError> {
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];

            match c {
                '\'' | '"' => self.copy_string(c),
                '`' => self.copy_template(),
                '/' if self.peek(1) == '/' => self.copy_line_comment(),
                '/' if self.peek(1) == '*' => self.copy_block_comment(),
                '<' if self.at_jsx_start() => {
                    let element = self.parse_element()?;
                    self.out.push_str(&element);
                    self.last_sig = ')';
                    self.last_word.clear();
                }
                _ => {
                    if c.is_alphanumeric() || c == '_' || c == '$' {
                        if self
                            .last_sig
                            .is_alphanumeric()
                            || self.last_sig == '_'
                            || self.last_sig == '$'
                        {
                            self.last_word.push(c);
                        } else {
                            self.last_word.clear();
                            self.last_word.push(c);
                        }
                        self.last_sig = c;
                    } else if !c.is_whitespace() {
                        self.last_sig = c;
                        self.last_word.clear();
                    }
                    self.out.push(c);
                    self.pos += 1;
                }
            }
        }

        Ok(self.out)
    }

    /// Is the `<` at the current position the start of a JSX element?
    fn at_jsx_start(&self) -> bool {
        let next = self.peek(1);
        if !(next.is_ascii_alphabetic() || next == '>' ) {
            return false;
        }

        // Expression position: after an operator, an opener, or a keyword
        // that introduces an expression. After an identifier or a closing
        // bracket `<` is a comparison (or a generic, which is not ours to
        // parse here).
        if matches!(
            self.last_word.as_str(),
            "return" | "default" | "case" | "do" | "else" | "typeof" | "in" | "of" | "yield"
        ) {
            return true;
        }

        matches!(
            self.last_sig,
            '\0' | '(' | ',' | '=' | '{' | '[' | '?' | ':' | ';' | '&' | '|' | '!' | '>'
        ) && !(self.last_sig == '>' && !self.prev_is_arrow())
    }

    fn prev_is_arrow(&self) -> bool {
        // last_sig == '>' counts only for `=>`.
        let mut idx = self.pos;
        while idx > 0 {
            idx -= 1;
            let c = self.chars[idx];
            if c.is_whitespace() {
                continue;
            }
            return c == '>' && idx > 0 && self.chars[idx - 1] == '=';
        }
        false
    }

    fn copy_string(&mut self, quote: char) {
        self.out.push(self.chars[self.pos]);
        self.pos += 1;
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            self.out.push(c);
            self.pos += 1;
            if c == '\\' && self.pos < self.chars.len() {
                self.out.push(self.chars[self.pos]);
                self.pos += 1;
                continue;
            }
            if c == quote {
                break;
            }
        }
        self.last_sig = quote;
        self.last_word.clear();
    }

    fn copy_template(&mut self) {
        self.out.push('`');
        self.pos += 1;
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            self.out.push(c);
            self.pos += 1;
            if c == '\\' && self.pos < self.chars.len() {
                self.out.push(self.chars[self.pos]);
                self.pos += 1;
                continue;
            }
            if c == '`' {
                break;
            }
        }
        self.last_sig = '`';
        self.last_word.clear();
    }

    fn copy_line_comment(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos] != '\n' {
            self.out.push(self.chars[self.pos]);
            self.pos += 1;
        }
    }

    fn copy_block_comment(&mut self) {
        self.out.push_str("/*");
        self.pos += 2;
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            self.out.push(c);
            self.pos += 1;
            if c == '*' && self.chars.get(self.pos) == Some(&'/') {
                self.out.push('/');
                self.pos += 1;
                break;
            }
        }
    }

    /// Parse one element at `self.pos` (which points at `<`) and return the
    /// `React.createElement` expression for it.
    fn parse_element(&mut self) -> Result<String, JsxError> {
        let start = self.pos;
        self.pos += 1; // consume '<'

        // Fragment: <>...</>
        if self.peek(0) == '>' {
            self.pos += 1;
            let children = self.parse_children(start, "")?;
            return Ok(build_call("React.Fragment", &[], None, &children));
        }

        let name = self.read_tag_name();
        if name.is_empty() {
            return Err(self.error(start, "expected a JSX tag name"));
        }

        let mut props: Vec<String> = Vec::new();
        let mut spread: Option<Vec<String>> = None;

        loop {
            self.skip_whitespace();

            match self.peek(0) {
                '\0' => return Err(self.error(start, format!("unclosed JSX tag <{name}>"))),
                '/' if self.peek(1) == '>' => {
                    self.pos += 2;
                    return Ok(build_call(&tag_expr(&name), &props, spread.as_deref(), &[]));
                }
                '>' => {
                    self.pos += 1;
                    let children = self.parse_children(start, &name)?;
                    return Ok(build_call(&tag_expr(&name), &props, spread.as_deref(), &children));
                }
                '{' => {
                    // Spread attribute: {...expr}
                    let inner = self.read_braced(start)?;
                    let inner = inner.trim();
                    if let Some(expr) = inner.strip_prefix("...") {
                        let lowered = lower_jsx(expr)?;
                        spread.get_or_insert_with(Vec::new).push(lowered.trim().to_string());
                    } else {
                        return Err(self.error(start, "expected a spread attribute"));
                    }
                }
                _ => {
                    let attr = self.read_attr_name();
                    if attr.is_empty() {
                        return Err(self.error(self.pos, format!("unexpected character in <{name}>")));
                    }
                    self.skip_whitespace();

                    let value = if self.peek(0) == '=' {
                        self.pos += 1;
                        self.skip_whitespace();
                        match self.peek(0) {
                            '\'' | '"' => self.read_quoted(),
                            '{' => {
                                let inner = self.read_braced(start)?;
                                lower_jsx(inner.trim())?.trim().to_string()
                            }
                            _ => return Err(self.error(self.pos, "expected a JSX attribute value")),
                        }
                    } else {
                        "true".to_string()
                    };

                    props.push(format!("{}: {}", prop_key(&attr), value));
                }
            }
        }
    }

    fn parse_children(&mut self, start: usize, name: &str) -> Result<Vec<String>, JsxError> {
        let mut children = Vec::new();
        let mut text = String::new();

        loop {
            match self.peek(0) {
                '\0' => {
                    return Err(self.error(start, format!("missing closing tag for <{name}>")));
                }
                '<' if self.peek(1) == '/' => {
                    flush_text(&mut text, &mut children);
                    self.pos += 2;
                    self.skip_whitespace();
                    let close = self.read_tag_name();
                    self.skip_whitespace();
                    if self.peek(0) != '>' {
                        return Err(self.error(self.pos, "malformed JSX closing tag"));
                    }
                    self.pos += 1;
                    if close != name {
                        return Err(self.error(
                            start,
                            format!("expected </{name}>, found </{close}>"),
                        ));
                    }
                    return Ok(children);
                }
                '<' => {
                    flush_text(&mut text, &mut children);
                    let nested = self.parse_element()?;
                    children.push(nested);
                }
                '{' => {
                    flush_text(&mut text, &mut children);
                    let inner = self.read_braced(start)?;
                    let inner = inner.trim();
                    // {/* comment */} children vanish.
                    if inner.is_empty() || (inner.starts_with("/*") && inner.ends_with("*/")) {
                        continue;
                    }
                    children.push(lower_jsx(inner)?.trim().to_string());
                }
                c => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn read_tag_name(&mut self) -> String {
        let mut name = String::new();
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '$' | '-') {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        name
    }

    fn read_attr_name(&mut self) -> String {
        let mut name = String::new();
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '-') {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        name
    }

    fn read_quoted(&mut self) -> String {
        let quote = self.chars[self.pos];
        let mut value = String::new();
        value.push(quote);
        self.pos += 1;
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            value.push(c);
            self.pos += 1;
            if c == quote {
                break;
            }
        }
        value
    }

    /// Read a balanced `{ ... }` container, returning the inner text.
    fn read_braced(&mut self, start: usize) -> Result<String, JsxError> {
        debug_assert_eq!(self.peek(0), '{');
        self.pos += 1;
        let begin = self.pos;
        let mut depth = 1usize;

        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            match c {
                '\'' | '"' | '`' => {
                    let quote = c;
                    self.pos += 1;
                    while self.pos < self.chars.len() {
                        let s = self.chars[self.pos];
                        self.pos += 1;
                        if s == '\\' {
                            self.pos += 1;
                        } else if s == quote {
                            break;
                        }
                    }
                }
                '{' => {
                    depth += 1;
                    self.pos += 1;
                }
                '}' => {
                    depth -= 1;
                    self.pos += 1;
                    if depth == 0 {
                        let inner: String = self.chars[begin..self.pos - 1].iter().collect();
                        return Ok(inner);
                    }
                }
                _ => self.pos += 1,
            }
        }

        Err(self.error(start, "unbalanced braces in JSX expression"))
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }
}

/// Intrinsic elements become string tags, components stay identifiers.
fn tag_expr(name: &str) -> String {
    let intrinsic = name
        .chars()
        .next()
        .map(|c| c.is_ascii_lowercase())
        .unwrap_or(false)
        && !name.contains('.');
    if intrinsic {
        format!("\"{name}\"")
    } else {
        name.to_string()
    }
}

fn prop_key(name: &str) -> String {
    if name.contains('-') {
        format!("\"{name}\"")
    } else {
        name.to_string()
    }
}

/// JSX text semantics: leading/trailing whitespace runs containing a newline
/// vanish, interior whitespace collapses to a single space.
fn flush_text(text: &mut String, children: &mut Vec<String>) {
    if text.is_empty() {
        return;
    }

    let raw = std::mem::take(text);
    let mut cleaned = String::new();
    let mut pending_ws: Option<bool> = None; // Some(has_newline)

    for c in raw.chars() {
        if c.is_whitespace() {
            let has_newline = pending_ws.unwrap_or(false) || c == '\n';
            pending_ws = Some(has_newline);
        } else {
            match pending_ws.take() {
                Some(has_newline) => {
                    if cleaned.is_empty() {
                        if !has_newline {
                            cleaned.push(' ');
                        }
                    } else {
                        cleaned.push(' ');
                    }
                }
                None => {}
            }
            cleaned.push(c);
        }
    }

    // Trailing whitespace without a newline stays significant.
    if let Some(false) = pending_ws {
        if !cleaned.is_empty() {
            cleaned.push(' ');
        }
    }

    if cleaned.is_empty() {
        return;
    }

    children.push(string_literal(&cleaned));
}

fn string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn build_call(tag: &str, props: &[String], spread: Option<&[String]>, children: &[String]) -> String {
    let props_expr = match (props.is_empty(), spread) {
        (true, None) => "null".to_string(),
        (false, None) => format!("{{ {} }}", props.join(", ")),
        (true, Some(spreads)) => format!("Object.assign({{}}, {})", spreads.join(", ")),
        (false, Some(spreads)) => format!(
            "Object.assign({{}}, {}, {{ {} }})",
            spreads.join(", "),
            props.join(", ")
        ),
    };

    let mut call = format!("React.createElement({tag}, {props_expr}");
    for child in children {
        call.push_str(", ");
        call.push_str(child);
    }
    call.push(')');
    call
}
