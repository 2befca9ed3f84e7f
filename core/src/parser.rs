//! Template lexer and parser.
//!
//! Splits an extended SQL string into an ordered list of parts: verbatim
//! passthrough chunks, `$Type.member` input references, and `&Type.member`
//! output references. The parser knows nothing about SQL structure; grouped
//! forms such as `(col1, col2) VALUES ($T.*)` are recognised purely locally.

use std::fmt;

use crate::error::{Error, Result};

/// A two-part name: a qualified column (`table.column`) or a typed
/// reference (`Type.member`). Either side may be empty or `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FullName {
    pub prefix: String,
    pub name: String,
}

impl FullName {
    pub fn new(prefix: impl Into<String>, name: impl Into<String>) -> Self {
        FullName {
            prefix: prefix.into(),
            name: name.into(),
        }
    }

    pub fn bare(name: impl Into<String>) -> Self {
        FullName::new("", name)
    }

    /// True when the member/column side is `*`.
    pub fn is_star(&self) -> bool {
        self.name == "*"
    }
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "{}", self.name)
        } else if self.name.is_empty() {
            write!(f, "{}", self.prefix)
        } else {
            write!(f, "{}.{}", self.prefix, self.name)
        }
    }
}

/// A named parameter reference, optionally carrying the column list of a
/// `(columns) VALUES (...)` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPart {
    pub columns: Vec<FullName>,
    pub sources: Vec<FullName>,
    pub raw: String,
}

/// An output reference together with the source columns it selects from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPart {
    pub columns: Vec<FullName>,
    pub targets: Vec<FullName>,
    pub raw: String,
}

/// One fragment of a parsed template.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPart {
    /// Opaque text emitted verbatim.
    Passthrough(String),
    Input(InputPart),
    Output(OutputPart),
}

fn write_names(f: &mut fmt::Formatter<'_>, names: &[FullName]) -> fmt::Result {
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{name}")?;
    }
    Ok(())
}

impl fmt::Display for QueryPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryPart::Passthrough(chunk) => write!(f, "BypassPart[{chunk}]"),
            QueryPart::Input(p) => {
                if p.columns.is_empty() && p.sources.len() == 1 {
                    write!(f, "InputPart[{}]", p.sources[0])
                } else {
                    write!(f, "InputPart[Columns:")?;
                    write_names(f, &p.columns)?;
                    write!(f, " Sources:")?;
                    write_names(f, &p.sources)?;
                    write!(f, "]")
                }
            }
            QueryPart::Output(p) => {
                write!(f, "OutputPart[Columns:")?;
                write_names(f, &p.columns)?;
                write!(f, " Targets:")?;
                write_names(f, &p.targets)?;
                write!(f, "]")
            }
        }
    }
}

/// The immutable result of parsing one template.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExpr {
    parts: Vec<QueryPart>,
}

impl ParsedExpr {
    pub fn parts(&self) -> &[QueryPart] {
        &self.parts
    }
}

impl fmt::Display for ParsedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParsedExpr[")?;
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{part}")?;
        }
        write!(f, "]")
    }
}

/// Template parser. One instance may be reused for any number of `parse`
/// calls; all state is reset on entry.
#[derive(Debug, Default)]
pub struct Parser {
    text: String,
    pos: usize,
    prev_part: usize,
    part_start: usize,
    parts: Vec<QueryPart>,
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

impl Parser {
    pub fn new() -> Self {
        Parser::default()
    }

    fn init(&mut self, input: &str) {
        self.text = input.to_string();
        self.pos = 0;
        self.prev_part = 0;
        self.part_start = 0;
        self.parts = Vec::new();
    }

    pub fn parse(&mut self, input: &str) -> Result<ParsedExpr> {
        self.init(input);
        loop {
            self.part_start = self.pos;
            let Some(b) = self.peek() else { break };
            match b {
                b'$' => {
                    let part = self.parse_input_reference()?;
                    self.push(part);
                }
                b'&' => {
                    let part = self.parse_bare_output()?;
                    self.push(part);
                }
                b'\'' | b'"' => self.skip_string_literal()?,
                b'-' => {
                    if !self.skip_line_comment() {
                        self.pos += 1;
                    }
                }
                b'/' => {
                    if !self.skip_block_comment() {
                        self.pos += 1;
                    }
                }
                b'(' => {
                    if let Some(part) = self.try_grouped_expression()? {
                        self.push(part);
                    } else {
                        self.pos += 1;
                    }
                }
                b if is_name_start(b) || b == b'*' => {
                    if self.at_token_boundary() {
                        if let Some(part) = self.try_column_output()? {
                            self.push(part);
                        } else {
                            self.skip_token();
                        }
                    } else {
                        self.pos += 1;
                    }
                }
                _ => self.pos += 1,
            }
        }
        if self.prev_part < self.text.len() {
            let chunk = self.text[self.prev_part..].to_string();
            self.parts.push(QueryPart::Passthrough(chunk));
        }
        Ok(ParsedExpr {
            parts: std::mem::take(&mut self.parts),
        })
    }

    //--------------------------------------------------------------------------
    // low-level scanning helpers
    //--------------------------------------------------------------------------

    fn bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn peek_is(&self, b: u8) -> bool {
        self.peek() == Some(b)
    }

    /// Consumes `b` if it is the next byte.
    fn skip_byte(&mut self, b: u8) -> bool {
        if self.peek_is(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Advances to just past the next occurrence of `b`. Position is
    /// unchanged when `b` does not occur.
    fn skip_byte_find(&mut self, b: u8) -> bool {
        match self.bytes()[self.pos..].iter().position(|&c| c == b) {
            Some(offset) => {
                self.pos += offset + 1;
                true
            }
            None => false,
        }
    }

    /// Consumes a run of whitespace. Returns whether anything was skipped.
    fn skip_spaces(&mut self) -> bool {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b' ' || b == b'\t' || b == b'\r' || b == b'\n' {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.pos != start
    }

    /// Consumes `word` case-insensitively, provided it ends at a word
    /// boundary.
    fn skip_word(&mut self, word: &str) -> bool {
        let end = self.pos + word.len();
        if end > self.text.len() {
            return false;
        }
        if !self.bytes()[self.pos..end].eq_ignore_ascii_case(word.as_bytes()) {
            return false;
        }
        if self.bytes().get(end).copied().is_some_and(is_name_byte) {
            return false;
        }
        self.pos = end;
        true
    }

    fn parse_identifier(&mut self) -> Option<String> {
        let start = self.pos;
        if !self.peek().is_some_and(is_name_start) {
            return None;
        }
        while self.peek().is_some_and(is_name_byte) {
            self.pos += 1;
        }
        Some(self.text[start..self.pos].to_string())
    }

    /// True when the byte before the current part start cannot be the tail
    /// of a name, so a column may legitimately begin here.
    fn at_token_boundary(&self) -> bool {
        if self.part_start == 0 {
            return true;
        }
        let prev = self.bytes()[self.part_start - 1];
        !(is_name_byte(prev) || prev == b'.' || prev == b'*')
    }

    /// Advances past a single column-like token after a failed match.
    fn skip_token(&mut self) {
        if self.skip_byte(b'*') {
            return;
        }
        if self.parse_identifier().is_none() {
            self.pos += 1;
        }
    }

    fn error_at(&self, pos: usize, message: impl Into<String>) -> Error {
        Error::Parse {
            column: self.text[..pos.min(self.text.len())].chars().count() + 1,
            message: message.into(),
        }
    }

    //--------------------------------------------------------------------------
    // literals and comments
    //--------------------------------------------------------------------------

    /// Skips a quoted region. The quote character escapes itself by
    /// doubling.
    fn skip_string_literal(&mut self) -> Result<()> {
        let quote = self.bytes()[self.pos];
        let start = self.pos;
        self.pos += 1;
        loop {
            if !self.skip_byte_find(quote) {
                self.pos = self.text.len();
                return Err(self.error_at(start, "missing closing quote in string literal"));
            }
            if !self.skip_byte(quote) {
                return Ok(());
            }
        }
    }

    fn skip_line_comment(&mut self) -> bool {
        if !self.bytes()[self.pos..].starts_with(b"--") {
            return false;
        }
        self.pos += 2;
        if !self.skip_byte_find(b'\n') {
            self.pos = self.text.len();
        }
        true
    }

    fn skip_block_comment(&mut self) -> bool {
        if !self.bytes()[self.pos..].starts_with(b"/*") {
            return false;
        }
        self.pos += 2;
        match self.text[self.pos..].find("*/") {
            Some(offset) => self.pos += offset + 2,
            None => self.pos = self.text.len(),
        }
        true
    }

    //--------------------------------------------------------------------------
    // references
    //--------------------------------------------------------------------------

    /// Parses `&Type.member`, `&Type.*`, `$Type.member` or `$Type.*` with
    /// the marker byte still at the current position. A marker not followed
    /// by a well-formed reference is an error, per the template rules.
    fn parse_type_ref(&mut self) -> Result<FullName> {
        let marker = self.bytes()[self.pos] as char;
        self.pos += 1;
        let Some(type_name) = self.parse_identifier() else {
            return Err(self.error_at(self.pos, format!("invalid identifier after '{marker}'")));
        };
        if !self.skip_byte(b'.') {
            return Err(self.error_at(
                self.pos,
                format!("type {type_name} must be followed by '.' and a member name or '*'"),
            ));
        }
        let member = if self.skip_byte(b'*') {
            "*".to_string()
        } else {
            match self.parse_identifier() {
                Some(member) => member,
                None => {
                    return Err(self.error_at(self.pos, "invalid identifier after '.'"));
                }
            }
        };
        Ok(FullName::new(type_name, member))
    }

    fn parse_input_reference(&mut self) -> Result<QueryPart> {
        let source = self.parse_type_ref()?;
        Ok(QueryPart::Input(InputPart {
            columns: vec![],
            sources: vec![source],
            raw: self.raw(),
        }))
    }

    fn parse_bare_output(&mut self) -> Result<QueryPart> {
        let target = self.parse_type_ref()?;
        Ok(QueryPart::Output(OutputPart {
            columns: vec![],
            targets: vec![target],
            raw: self.raw(),
        }))
    }

    /// Parses `&T.m, &T.m, ...)` after the opening parenthesis. The caller
    /// has already committed by observing a leading `&`; anything that is
    /// not a well-formed reference list is an error.
    fn parse_target_list(&mut self) -> Result<Vec<FullName>> {
        let mut targets = Vec::new();
        loop {
            self.skip_spaces();
            if !self.peek_is(b'&') {
                return Err(self.error_here("expected '&' in grouped output reference"));
            }
            targets.push(self.parse_type_ref()?);
            self.skip_spaces();
            if self.skip_byte(b',') {
                continue;
            }
            if self.skip_byte(b')') {
                return Ok(targets);
            }
            return Err(self.error_here("expected ',' or ')' in grouped output reference"));
        }
    }

    /// As `parse_target_list`, for `$T.m, ...)` source groups.
    fn parse_source_list(&mut self) -> Result<Vec<FullName>> {
        let mut sources = Vec::new();
        loop {
            self.skip_spaces();
            if !self.peek_is(b'$') {
                return Err(self.error_here("expected '$' in grouped input reference"));
            }
            sources.push(self.parse_type_ref()?);
            self.skip_spaces();
            if self.skip_byte(b',') {
                continue;
            }
            if self.skip_byte(b')') {
                return Ok(sources);
            }
            return Err(self.error_here("expected ',' or ')' in grouped input reference"));
        }
    }

    fn error_here(&self, message: &str) -> Error {
        self.error_at(self.pos, message)
    }

    fn raw(&self) -> String {
        self.text[self.part_start..self.pos].to_string()
    }

    //--------------------------------------------------------------------------
    // columns
    //--------------------------------------------------------------------------

    /// Parses `*`, `name`, `table.name` or `table.*`. The caller restores
    /// the position on `None`.
    fn parse_column(&mut self) -> Option<FullName> {
        if self.skip_byte(b'*') {
            return Some(FullName::bare("*"));
        }
        let first = self.parse_identifier()?;
        if self.skip_byte(b'.') {
            if self.skip_byte(b'*') {
                Some(FullName::new(first, "*"))
            } else {
                self.parse_identifier().map(|second| FullName::new(first, second))
            }
        } else {
            Some(FullName::bare(first))
        }
    }

    /// Parses `c1, c2, ...)` after the opening parenthesis, or bails out
    /// (caller restores) when the contents are not a plain column list.
    fn parse_column_list(&mut self) -> Option<Vec<FullName>> {
        let mut columns = Vec::new();
        loop {
            self.skip_spaces();
            columns.push(self.parse_column()?);
            self.skip_spaces();
            if self.skip_byte(b',') {
                continue;
            }
            if self.skip_byte(b')') {
                return Some(columns);
            }
            return None;
        }
    }

    //--------------------------------------------------------------------------
    // grouped and column-prefixed forms
    //--------------------------------------------------------------------------

    /// Attempts the forms that open with a parenthesis:
    ///   `(&T.m, &T.m)`                        grouped bare output
    ///   `(c1, c2) AS &T.*` / `AS (&T.m, ...)` grouped column output
    ///   `(c1, c2) VALUES ($T.*)` / `($T.m, ...)` / `$T.*`  grouped input
    fn try_grouped_expression(&mut self) -> Result<Option<QueryPart>> {
        let snapshot = self.pos;
        self.pos += 1; // '('
        self.skip_spaces();

        if self.peek_is(b'&') {
            let targets = self.parse_target_list()?;
            return Ok(Some(QueryPart::Output(OutputPart {
                columns: vec![],
                targets,
                raw: self.raw(),
            })));
        }

        let Some(columns) = self.parse_column_list() else {
            self.pos = snapshot;
            return Ok(None);
        };
        self.skip_spaces();

        if self.skip_word("AS") {
            self.skip_spaces();
            if self.peek_is(b'&') {
                let target = self.parse_type_ref()?;
                return Ok(Some(QueryPart::Output(OutputPart {
                    columns,
                    targets: vec![target],
                    raw: self.raw(),
                })));
            }
            if self.peek_is(b'(') {
                let inner = self.pos;
                self.pos += 1;
                self.skip_spaces();
                if self.peek_is(b'&') {
                    let targets = self.parse_target_list()?;
                    return Ok(Some(QueryPart::Output(OutputPart {
                        columns,
                        targets,
                        raw: self.raw(),
                    })));
                }
                self.pos = inner;
            }
            self.pos = snapshot;
            return Ok(None);
        }

        if self.skip_word("VALUES") {
            self.skip_spaces();
            if self.peek_is(b'$') {
                let source = self.parse_type_ref()?;
                return Ok(Some(QueryPart::Input(InputPart {
                    columns,
                    sources: vec![source],
                    raw: self.raw(),
                })));
            }
            if self.peek_is(b'(') {
                let inner = self.pos;
                self.pos += 1;
                self.skip_spaces();
                if self.peek_is(b'$') {
                    let sources = self.parse_source_list()?;
                    return Ok(Some(QueryPart::Input(InputPart {
                        columns,
                        sources,
                        raw: self.raw(),
                    })));
                }
                self.pos = inner;
            }
        }

        self.pos = snapshot;
        Ok(None)
    }

    /// Attempts `column AS &T.m`, `column AS &T.*` and
    /// `column AS (&T1.m1, ...)` starting at a column token.
    fn try_column_output(&mut self) -> Result<Option<QueryPart>> {
        let snapshot = self.pos;
        let Some(column) = self.parse_column() else {
            self.pos = snapshot;
            return Ok(None);
        };
        if !self.skip_spaces() {
            self.pos = snapshot;
            return Ok(None);
        }
        if !self.skip_word("AS") {
            self.pos = snapshot;
            return Ok(None);
        }
        self.skip_spaces();
        if self.peek_is(b'&') {
            let target = self.parse_type_ref()?;
            return Ok(Some(QueryPart::Output(OutputPart {
                columns: vec![column],
                targets: vec![target],
                raw: self.raw(),
            })));
        }
        if self.peek_is(b'(') {
            let inner = self.pos;
            self.pos += 1;
            self.skip_spaces();
            if self.peek_is(b'&') {
                let targets = self.parse_target_list()?;
                return Ok(Some(QueryPart::Output(OutputPart {
                    columns: vec![column],
                    targets,
                    raw: self.raw(),
                })));
            }
            self.pos = inner;
        }
        self.pos = snapshot;
        Ok(None)
    }

    fn push(&mut self, part: QueryPart) {
        if self.part_start > self.prev_part {
            let chunk = self.text[self.prev_part..self.part_start].to_string();
            self.parts.push(QueryPart::Passthrough(chunk));
        }
        self.parts.push(part);
        self.prev_part = self.pos;
    }
}
