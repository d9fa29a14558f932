//! Type stripping: erases the TypeScript-only syntax from a module so the
//! remaining source is plain JavaScript.
//!
//! Runs after JSX lowering, so angle brackets only ever mean comparisons or
//! generics here. The stripper is token-based and trivia-preserving: kept
//! tokens carry their leading whitespace and comments through unchanged, so
//! line structure (and therefore the source map) survives.

use crate::jsx::JsxError;

/// A compile error with a 1-based source line.
#[derive(Debug, Clone, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct CompileError {
    pub line: usize,
    pub message: String,
}

impl From<JsxError> for CompileError {
    fn from(err: JsxError) -> Self {
        CompileError {
            line: err.line,
            message: err.message,
        }
    }
}

/// Compile one script module: lower JSX, then strip type syntax.
pub fn compile(source: &str) -> Result<String, CompileError> {
    let lowered = crate::jsx::lower_jsx(source)?;
    strip_types(&lowered)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Punct,
    Str,
    Template,
    Num,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    text: String,
    /// Whitespace and comments preceding the token.
    leading: String,
    line: usize,
}

/// Multi-character punctuators, longest first. `>>` and `<<` are deliberately
/// not merged so generic brackets stay balanced token-by-token.
const PUNCTS: &[&str] = &[
    "===", "!==", "**=", "&&=", "||=", "??=", "...", "==", "!=", "<=", ">=", "&&", "||", "??",
    "?.", "=>", "++", "--", "+=", "-=", "*=", "/=", "%=", "**",
];

fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 1;
    let mut leading = String::new();

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            if c == '\n' {
                line += 1;
            }
            leading.push(c);
            i += 1;
            continue;
        }

        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                leading.push(chars[i]);
                i += 1;
            }
            continue;
        }

        if c == '/' && chars.get(i + 1) == Some(&'*') {
            leading.push_str("/*");
            i += 2;
            while i < chars.len() {
                let c = chars[i];
                if c == '\n' {
                    line += 1;
                }
                leading.push(c);
                i += 1;
                if c == '*' && chars.get(i) == Some(&'/') {
                    leading.push('/');
                    i += 1;
                    break;
                }
            }
            continue;
        }

        let start_line = line;
        let mut text = String::new();
        let kind;

        if c == '\'' || c == '"' {
            kind = TokenKind::Str;
            text.push(c);
            i += 1;
            while i < chars.len() {
                let s = chars[i];
                text.push(s);
                i += 1;
                if s == '\\' && i < chars.len() {
                    text.push(chars[i]);
                    i += 1;
                    continue;
                }
                if s == c {
                    break;
                }
                if s == '\n' {
                    return Err(CompileError {
                        line: start_line,
                        message: "unterminated string literal".to_string(),
                    });
                }
            }
        } else if c == '`' {
            kind = TokenKind::Template;
            text.push(c);
            i += 1;
            let mut depth = 0usize;
            while i < chars.len() {
                let s = chars[i];
                if s == '\n' {
                    line += 1;
                }
                text.push(s);
                i += 1;
                match s {
                    '\\' if i < chars.len() => {
                        text.push(chars[i]);
                        i += 1;
                    }
                    '$' if chars.get(i) == Some(&'{') => {
                        text.push('{');
                        i += 1;
                        depth += 1;
                    }
                    '}' if depth > 0 => depth -= 1,
                    '`' if depth == 0 => break,
                    _ => {}
                }
            }
        } else if c.is_ascii_alphabetic() || c == '_' || c == '$' {
            kind = TokenKind::Ident;
            while i < chars.len() {
                let s = chars[i];
                if s.is_ascii_alphanumeric() || s == '_' || s == '$' {
                    text.push(s);
                    i += 1;
                } else {
                    break;
                }
            }
        } else if c.is_ascii_digit() {
            kind = TokenKind::Num;
            while i < chars.len() {
                let s = chars[i];
                if s.is_ascii_alphanumeric() || s == '.' || s == '_' {
                    text.push(s);
                    i += 1;
                } else {
                    break;
                }
            }
        } else {
            kind = TokenKind::Punct;
            let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
            let matched = PUNCTS.iter().find(|p| rest.starts_with(**p));
            match matched {
                Some(p) => {
                    text.push_str(p);
                    i += p.len();
                }
                None => {
                    text.push(c);
                    i += 1;
                }
            }
        }

        tokens.push(Token {
            kind,
            text,
            leading: std::mem::take(&mut leading),
            line: start_line,
        });
    }

    // Trailing trivia rides on a synthetic end token.
    if !leading.is_empty() {
        tokens.push(Token {
            kind: TokenKind::Punct,
            text: String::new(),
            leading,
            line,
        });
    }

    Ok(tokens)
}

/// A bracket frame the stripper is inside of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    /// `( ... )` of a function or method signature.
    Params,
    /// Any other `( ... )`.
    Paren,
    /// `{ ... }` of a class body.
    ClassBody,
    /// Any other `{ ... }` (blocks and object literals).
    Brace,
    /// `[ ... ]`
    Bracket,
}

struct Stripper {
    tokens: Vec<Token>,
    keep: Vec<bool>,
    frames: Vec<Frame>,
    /// Open ternary `?`s per frame (index 0 is the top level), so their
    /// `:` arms are never mistaken for annotations.
    ternaries: Vec<usize>,
    /// Inside an `import`/`export` statement, where `as` is a binding rename.
    in_module_stmt: bool,
    /// A `let`/`const`/`var` statement, and the frame depth it started at.
    in_decl: Option<usize>,
    /// The next class-body `{` belongs to a class.
    pending_class: bool,
}

/// Strip interfaces, type aliases, annotations, generics, modifiers and
/// assertions, leaving runnable JavaScript.
pub fn strip_types(source: &str) -> Result<String, CompileError> {
    let tokens = tokenize(source)?;
    let keep = vec![true; tokens.len()];
    let mut stripper = Stripper {
        tokens,
        keep,
        frames: Vec::new(),
        ternaries: vec![0],
        in_module_stmt: false,
        in_decl: None,
        pending_class: false,
    };
    stripper.run()?;
    Ok(stripper.render())
}

impl Stripper {
    fn error(&self, i: usize, message: impl Into<String>) -> CompileError {
        let line = self.tokens.get(i).map(|t| t.line).unwrap_or(0);
        CompileError {
            line,
            message: message.into(),
        }
    }

    fn text(&self, i: usize) -> &str {
        self.tokens.get(i).map(|t| t.text.as_str()).unwrap_or("")
    }

    fn kind(&self, i: usize) -> Option<TokenKind> {
        self.tokens.get(i).map(|t| t.kind)
    }

    /// Next index that is still kept, after `i`.
    fn next_kept(&self, i: usize) -> usize {
        let mut j = i + 1;
        while j < self.tokens.len() && !self.keep[j] {
            j += 1;
        }
        j
    }

    /// Previous kept index before `i`, if any.
    fn prev_kept(&self, i: usize) -> Option<usize> {
        let mut j = i;
        while j > 0 {
            j -= 1;
            if self.keep[j] && !self.text(j).is_empty() {
                return Some(j);
            }
        }
        None
    }

    fn drop(&mut self, i: usize) {
        self.keep[i] = false;
    }

    fn drop_range(&mut self, from: usize, to: usize) {
        for k in &mut self.keep[from..to] {
            *k = false;
        }
    }

    fn in_class_body(&self) -> bool {
        self.frames.last() == Some(&Frame::ClassBody)
    }

    fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
        self.ternaries.push(0);
    }

    fn pop_frame(&mut self) -> Option<Frame> {
        if self.ternaries.len() > 1 {
            self.ternaries.pop();
        }
        self.frames.pop()
    }

    fn run(&mut self) -> Result<(), CompileError> {
        let mut i = 0;

        while i < self.tokens.len() {
            let text = self.text(i).to_string();
            let kind = self.kind(i);

            match (kind, text.as_str()) {
                (Some(TokenKind::Ident), "interface") if self.at_statement_start(i) => {
                    i = self.strip_interface(i)?;
                    continue;
                }
                (Some(TokenKind::Ident), "type")
                    if self.at_statement_start(i)
                        && self.kind(i + 1) == Some(TokenKind::Ident)
                        && (self.text(i + 2) == "=" || self.text(i + 2) == "<") =>
                {
                    i = self.strip_type_alias(i)?;
                    continue;
                }
                (Some(TokenKind::Ident), "import") | (Some(TokenKind::Ident), "export")
                    if self.at_statement_start(i) =>
                {
                    // `import type ...` and `export type ...` vanish whole.
                    if self.text(i + 1) == "type"
                        && (self.kind(i + 2) == Some(TokenKind::Ident) || self.text(i + 2) == "{")
                    {
                        i = self.strip_until_semicolon(i);
                        continue;
                    }
                    self.in_module_stmt = true;
                }
                (_, ";") => {
                    self.in_module_stmt = false;
                    self.in_decl = None;
                }
                (Some(TokenKind::Ident), "let")
                | (Some(TokenKind::Ident), "const")
                | (Some(TokenKind::Ident), "var") => {
                    self.in_decl = Some(self.frames.len());
                    self.in_module_stmt = false;
                }
                (Some(TokenKind::Ident), "class") | (Some(TokenKind::Ident), "function") => {
                    self.pending_class = text == "class";
                    self.in_module_stmt = false;
                }
                (Some(TokenKind::Ident), "implements") if self.pending_class => {
                    // Drop the implements clause up to the class body.
                    let mut j = i;
                    while j < self.tokens.len() && self.text(j) != "{" {
                        j += 1;
                    }
                    self.drop_range(i, j);
                    i = j;
                    continue;
                }
                (Some(TokenKind::Ident), "public")
                | (Some(TokenKind::Ident), "private")
                | (Some(TokenKind::Ident), "protected")
                    if self.in_class_body() && self.at_member_start(i) =>
                {
                    self.drop(i);
                    i += 1;
                    continue;
                }
                (Some(TokenKind::Ident), "readonly")
                    if self.in_class_body()
                        && self.at_member_start_or_after_modifier(i)
                        && self.kind(i + 1) == Some(TokenKind::Ident) =>
                {
                    self.drop(i);
                    i += 1;
                    continue;
                }
                (Some(TokenKind::Ident), "as") if !self.in_module_stmt => {
                    // `expr as T` assertion. `as` after `*` is a namespace
                    // rename inside an import and never reaches here.
                    if self.prev_is_value(i) {
                        let end = self.consume_type(i + 1, false)?;
                        self.drop_range(i, end);
                        i = end;
                        continue;
                    }
                }
                (_, "!") => {
                    // Non-null assertion: `!` directly after a value.
                    if self.prev_is_value(i) && self.text(i + 1) != "=" {
                        self.drop(i);
                        i += 1;
                        continue;
                    }
                }
                (_, "<") => {
                    if let Some(end) = self.try_generic_args(i) {
                        self.drop_range(i, end);
                        i = end;
                        continue;
                    }
                }
                (_, "(") => {
                    let frame = if self.at_signature_paren(i) {
                        Frame::Params
                    } else {
                        Frame::Paren
                    };
                    self.push_frame(frame);
                    self.pending_class = false;
                }
                (_, "{") => {
                    let frame = if self.pending_class {
                        Frame::ClassBody
                    } else {
                        Frame::Brace
                    };
                    self.pending_class = false;
                    self.push_frame(frame);
                }
                (_, "[") => self.push_frame(Frame::Bracket),
                (_, ")") => {
                    let was_params = self.pop_frame() == Some(Frame::Params);
                    if was_params && self.text(i + 1) == ":" {
                        // Return type annotation.
                        let end = self.consume_type(i + 2, true)?;
                        self.drop_range(i + 1, end);
                        i = end;
                        continue;
                    }
                }
                (_, "}") | (_, "]") => {
                    self.pop_frame();
                }
                (_, "?") => {
                    // Optional marker in params or class fields; otherwise
                    // a ternary whose `:` must be left alone.
                    if (self.text(i + 1) == ":" || self.text(i + 1) == ")")
                        && (self.frames.last() == Some(&Frame::Params) || self.in_class_body())
                    {
                        self.drop(i);
                        i += 1;
                        continue;
                    }
                    if let Some(open) = self.ternaries.last_mut() {
                        *open += 1;
                    }
                }
                (_, ":") => {
                    let ternary = self
                        .ternaries
                        .last()
                        .copied()
                        .unwrap_or(0);
                    if ternary > 0 {
                        if let Some(open) = self.ternaries.last_mut() {
                            *open -= 1;
                        }
                    } else if self.annotation_colon(i) {
                        let end = self.consume_type(i + 1, false)?;
                        self.drop_range(i, end);
                        i = end;
                        continue;
                    }
                }
                _ => {}
            }

            i += 1;
        }

        Ok(())
    }

    fn at_statement_start(&self, i: usize) -> bool {
        match self.prev_kept(i) {
            None => true,
            Some(p) => matches!(self.text(p), ";" | "{" | "}" | ")") || self.text(p) == "export",
        }
    }

    fn at_member_start(&self, i: usize) -> bool {
        match self.prev_kept(i) {
            None => false,
            Some(p) => matches!(self.text(p), "{" | "}" | ";"),
        }
    }

    fn at_member_start_or_after_modifier(&self, i: usize) -> bool {
        if self.at_member_start(i) {
            return true;
        }
        match self.prev_kept(i) {
            Some(p) => matches!(self.text(p), "public" | "private" | "protected" | "static"),
            None => false,
        }
    }

    /// Does the previous kept token end a value expression?
    fn prev_is_value(&self, i: usize) -> bool {
        match self.prev_kept(i) {
            None => false,
            Some(p) => {
                let t = &self.tokens[p];
                match t.kind {
                    TokenKind::Ident => !matches!(
                        t.text.as_str(),
                        "return" | "typeof" | "in" | "of" | "new" | "delete" | "void" | "case"
                    ),
                    TokenKind::Str | TokenKind::Template | TokenKind::Num => true,
                    TokenKind::Punct => matches!(t.text.as_str(), ")" | "]"),
                }
            }
        }
    }

    /// Is the `(` at `i` a function/method signature's parameter list?
    fn at_signature_paren(&self, i: usize) -> bool {
        if let Some(p) = self.prev_kept(i) {
            let prev = self.text(p).to_string();

            if prev == "function" || prev == "constructor" {
                return true;
            }
            if self.kind(p) == Some(TokenKind::Ident) {
                if let Some(pp) = self.prev_kept(p) {
                    let before = self.text(pp);
                    if before == "function" {
                        return true;
                    }
                    // Method definition at a class-body member position.
                    if self.in_class_body()
                        && matches!(
                            before,
                            "{" | "}" | ";" | "public" | "private" | "protected" | "static"
                                | "async" | "get" | "set"
                        )
                    {
                        return true;
                    }
                }
            }
            if matches!(
                prev.as_str(),
                "if" | "while" | "for" | "switch" | "catch" | "return"
            ) {
                return false;
            }
        }

        // Arrow function: the matching `)` is followed by `=>`, possibly
        // with a return annotation in between.
        if let Some(close) = self.matching_paren(i) {
            let after = self.text(close + 1);
            if after == "=>" || after == ":" {
                return true;
            }
        }
        false
    }

    fn matching_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for j in open..self.tokens.len() {
            match self.text(j) {
                "(" => depth += 1,
                ")" => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(j);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Is the `:` at `i` a type annotation (rather than an object-literal
    /// key or a ternary arm)?
    fn annotation_colon(&self, i: usize) -> bool {
        // Inside a parameter list every `name :` is an annotation.
        if self.frames.last() == Some(&Frame::Params) {
            return true;
        }
        // Class fields: `name :` at a member position.
        if self.in_class_body() {
            if let Some(p) = self.prev_kept(i) {
                if self.kind(p) == Some(TokenKind::Ident) {
                    return true;
                }
            }
        }
        // Declarations: `let name :` before the initializer, at the same
        // frame depth the declaration started at (colons inside an object
        // literal initializer are keys, not annotations).
        if self.in_decl == Some(self.frames.len()) {
            if let Some(p) = self.prev_kept(i) {
                if self.kind(p) == Some(TokenKind::Ident) || self.text(p) == "]" || self.text(p) == "}" {
                    return true;
                }
            }
        }
        false
    }

    /// Strip `interface Name<T> extends Other { ... }`.
    fn strip_interface(&mut self, i: usize) -> Result<usize, CompileError> {
        let mut j = i;
        while j < self.tokens.len() && self.text(j) != "{" {
            j += 1;
        }
        if j == self.tokens.len() {
            return Err(self.error(i, "interface without a body"));
        }

        let mut depth = 0usize;
        while j < self.tokens.len() {
            match self.text(j) {
                "{" => depth += 1,
                "}" => {
                    depth -= 1;
                    if depth == 0 {
                        j += 1;
                        // Also erase a preceding `export`.
                        let from = match self.prev_kept(i) {
                            Some(p) if self.text(p) == "export" => p,
                            _ => i,
                        };
                        self.drop_range(from, j);
                        return Ok(j);
                    }
                }
                _ => {}
            }
            j += 1;
        }

        Err(self.error(i, "unbalanced interface body"))
    }

    /// Strip `type Name = ...;` through the terminating semicolon.
    fn strip_type_alias(&mut self, i: usize) -> Result<usize, CompileError> {
        let end = self.strip_until_semicolon(i);
        if let Some(p) = self.prev_kept(i) {
            if self.text(p) == "export" {
                self.drop(p);
            }
        }
        Ok(end)
    }

    fn strip_until_semicolon(&mut self, i: usize) -> usize {
        let mut j = i;
        let mut depth = 0usize;
        while j < self.tokens.len() {
            match self.text(j) {
                "{" | "(" | "[" => depth += 1,
                "}" | ")" | "]" => depth = depth.saturating_sub(1),
                ";" if depth == 0 => {
                    j += 1;
                    break;
                }
                _ => {}
            }
            j += 1;
        }
        self.drop_range(i, j);
        j
    }

    /// Consume a type expression starting at `i`, returning the index one
    /// past its end. With `return_position`, a depth-0 `=>` or `{` ends the
    /// type (it belongs to the function body).
    fn consume_type(&mut self, i: usize, return_position: bool) -> Result<usize, CompileError> {
        let mut j = i;
        let mut depth = 0usize;
        let mut last_close: Option<&str> = None;

        while j < self.tokens.len() {
            let t = self.text(j);
            match t {
                "<" | "(" | "[" => {
                    depth += 1;
                    last_close = None;
                }
                "{" if depth == 0 => {
                    // An object type only follows an operator or starts the
                    // type; otherwise this brace is a function body.
                    if return_position || j != i && !matches!(self.text(j - 1), "|" | "&" | "<" | "(" | ",") {
                        return Ok(j);
                    }
                    depth += 1;
                }
                "{" => depth += 1,
                ">" | ")" | "]" | "}" => {
                    if depth == 0 {
                        return Ok(j);
                    }
                    depth -= 1;
                    last_close = Some(t);
                }
                "=>" if depth == 0 => {
                    // Part of a function type only right after its params.
                    if return_position || last_close != Some(")") {
                        return Ok(j);
                    }
                    last_close = None;
                }
                "=" | "," | ";" if depth == 0 => return Ok(j),
                "" => return Ok(j),
                _ => {
                    last_close = None;
                }
            }
            j += 1;
        }

        Ok(j)
    }

    /// If `<` at `i` opens generic arguments/parameters, return one past the
    /// closing `>`; otherwise `None` and the `<` stays a comparison.
    fn try_generic_args(&self, i: usize) -> Option<usize> {
        // Generics attach to an identifier (or follow `class X` / `function f`).
        let p = self.prev_kept(i)?;
        if self.kind(p) != Some(TokenKind::Ident) {
            return None;
        }
        if matches!(self.text(p), "return" | "in" | "of" | "case" | "typeof") {
            return None;
        }

        let mut depth = 0usize;
        let mut j = i;
        while j < self.tokens.len() {
            let t = self.text(j);
            match t {
                "<" => depth += 1,
                ">" => {
                    depth -= 1;
                    if depth == 0 {
                        // Argument lists are followed by a call or a body;
                        // parameter lists by `(`, `{` or `extends`.
                        let next = self.text(j + 1);
                        return matches!(next, "(" | "{" | "extends" | "implements")
                            .then_some(j + 1);
                    }
                }
                // Only type-ish tokens may appear inside.
                "," | "|" | "&" | "." | "[" | "]" | "(" | ")" | "=>" | "=" | "extends"
                | "keyof" | "typeof" | "readonly" | "?" | ":" => {}
                "" => return None,
                _ => {
                    let kind = self.kind(j)?;
                    if !matches!(kind, TokenKind::Ident | TokenKind::Str | TokenKind::Num) {
                        return None;
                    }
                }
            }
            j += 1;
        }
        None
    }

    fn render(&self) -> String {
        let mut out = String::new();
        let mut pending: Option<&str> = None;

        for (token, keep) in self.tokens.iter().zip(&self.keep) {
            if *keep {
                // A dropped run that started a line donates its newline
                // trivia so the kept remainder stays on its own line;
                // in-line trivia of dropped tokens is discarded.
                match pending.take() {
                    Some(lead) if lead.contains('\n') && !token.leading.contains('\n') => {
                        out.push_str(lead);
                    }
                    _ => out.push_str(&token.leading),
                }
                out.push_str(&token.text);
            } else if pending.is_none() {
                pending = Some(token.leading.as_str());
            }
        }

        out
    }
}
