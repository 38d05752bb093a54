//! Statement boundary scanning.
//!
//! Splits a SQL buffer into statement ranges in a single left-to-right pass.
//! Delimiters inside string literals, quoted identifiers and comments are
//! ignored, and `DELIMITER <token>` lines switch the active delimiter for the
//! rest of the buffer, the same way the mysql command-line client does.
//!
//! Offsets are byte offsets into the buffer and always fall on char
//! boundaries.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Delimiter used when none is configured.
pub const DEFAULT_DELIMITER: &str = ";";

static DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i:delimiter)[ \t]+(\S+)").expect("valid directive regex"));

/// The location of one statement inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatementRange {
    /// Offset of the first statement byte.
    pub start: usize,
    /// Offset one past the last statement byte (delimiter excluded).
    pub end: usize,
    /// True when leading whitespace or comments after the previous
    /// delimiter were skipped to find `start`.
    pub look_behind_applied: bool,
    /// Offset one past the closing delimiter, or `None` when the statement
    /// runs to the end of the buffer without one.
    pub closed_at: Option<usize>,
}

impl StatementRange {
    /// Returns the statement text.
    pub fn text<'a>(&self, buffer: &'a str) -> &'a str {
        &buffer[self.start..self.end]
    }

    /// Returns the range as a `std::ops::Range`.
    pub fn span(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Returns true if `offset` lies inside the statement, both ends inclusive.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    /// Returns true if the statement ends with a delimiter.
    pub fn is_terminated(&self) -> bool {
        self.closed_at.is_some()
    }

    /// Returns true if `[from, to]` intersects the statement.
    pub fn overlaps(&self, from: usize, to: usize) -> bool {
        self.start <= to && from <= self.end
    }
}

/// Kind of construct left open at the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityKind {
    SingleQuote,
    DoubleQuote,
    Backtick,
    DollarQuote,
    BlockComment,
    ConditionalComment,
}

/// An unterminated quote or comment, closed implicitly at end of buffer.
///
/// Not an error: the remainder of the buffer still becomes part of the last
/// statement so the server gets to report the syntax problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanAmbiguity {
    pub kind: AmbiguityKind,
    /// Offset of the opening quote or comment marker.
    pub opened_at: usize,
}

/// A `DELIMITER` line found in the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelimiterDirective {
    /// Offset of the `DELIMITER` keyword.
    pub start: usize,
    /// End of the directive line, line break excluded.
    pub end: usize,
    /// The delimiter in effect after this line.
    pub delimiter: String,
}

/// Dialect-dependent scanning switches.
///
/// The default follows MySQL's lexical rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Treat `$tag$ ... $tag$` as a string literal (PostgreSQL).
    pub dollar_quotes: bool,
    /// `#` starts a line comment (MySQL). PostgreSQL uses `#` as an operator.
    pub hash_comments: bool,
    /// A backslash escapes the next character inside `'...'` and `"..."`.
    /// When off, only `E'...'` strings honour backslash escapes.
    pub backslash_escapes: bool,
    /// `--` opens a comment only when followed by whitespace, a control
    /// character or the end of the buffer (MySQL).
    pub dash_comment_needs_space: bool,
}

impl ScanOptions {
    /// MySQL and MariaDB rules.
    pub fn mysql() -> Self {
        Self {
            dollar_quotes: false,
            hash_comments: true,
            backslash_escapes: true,
            dash_comment_needs_space: true,
        }
    }

    /// PostgreSQL rules, with `standard_conforming_strings` on.
    pub fn postgres() -> Self {
        Self {
            dollar_quotes: true,
            hash_comments: false,
            backslash_escapes: false,
            dash_comment_needs_space: false,
        }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::mysql()
    }
}

/// Output of a full scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scan {
    /// Statements in ascending, non-overlapping order.
    pub ranges: Vec<StatementRange>,
    /// Delimiter directives in buffer order.
    pub directives: Vec<DelimiterDirective>,
    /// Constructs left open at the end of the buffer.
    pub ambiguities: Vec<ScanAmbiguity>,
    /// The delimiter in effect at the end of the buffer.
    pub final_delimiter: String,
}

impl Scan {
    /// Returns true if no statement was found.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns the text of every statement.
    pub fn statements<'a>(&self, buffer: &'a str) -> Vec<&'a str> {
        self.ranges.iter().map(|r| r.text(buffer)).collect()
    }
}

/// Splits SQL buffers into statements.
#[derive(Debug, Clone)]
pub struct StatementScanner {
    delimiter: String,
    options: ScanOptions,
}

impl Default for StatementScanner {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl StatementScanner {
    /// Creates a scanner starting with the given delimiter.
    ///
    /// An empty or whitespace-only delimiter falls back to `;`.
    pub fn new(delimiter: impl Into<String>) -> Self {
        let mut delimiter = delimiter.into();
        if delimiter.trim().is_empty() {
            debug!("empty delimiter, falling back to '{}'", DEFAULT_DELIMITER);
            delimiter = DEFAULT_DELIMITER.to_string();
        }
        Self {
            delimiter,
            options: ScanOptions::default(),
        }
    }

    /// Sets dialect-dependent options.
    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the initial delimiter.
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Scans `buffer` and returns its statements, directives and ambiguities.
    pub fn scan(&self, buffer: &str) -> Scan {
        let mut pass = Pass::new(buffer, &self.delimiter, self.options);
        pass.run();
        pass.finish()
    }
}

/// Scans `buffer` with `delimiter` and returns only the statement ranges.
pub fn scan(buffer: &str, delimiter: &str) -> Vec<StatementRange> {
    StatementScanner::new(delimiter).scan(buffer).ranges
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    Normal,
    Single,
    Double,
    Backtick,
    /// Dollar-quoted literal; the tag spans `open..tag_end` in the buffer.
    Dollar {
        open: usize,
        tag_end: usize,
    },
    LineComment,
    BlockComment,
    /// `/*! ... */`: hides delimiters but is executable content.
    ConditionalComment,
}

/// State of one scan over one buffer.
struct Pass<'a> {
    buffer: &'a str,
    bytes: &'a [u8],
    delimiter: String,
    options: ScanOptions,
    state: QuoteState,
    /// Where the current construct was opened, for ambiguity reporting.
    opened_at: usize,
    /// Backslash escapes apply inside the open quote.
    escapes: bool,
    escape_pending: bool,
    segment_start: usize,
    content_start: Option<usize>,
    content_end: usize,
    pos: usize,
    ranges: Vec<StatementRange>,
    directives: Vec<DelimiterDirective>,
    ambiguities: Vec<ScanAmbiguity>,
}

impl<'a> Pass<'a> {
    fn new(buffer: &'a str, delimiter: &str, options: ScanOptions) -> Self {
        Self {
            buffer,
            bytes: buffer.as_bytes(),
            delimiter: delimiter.to_string(),
            options,
            state: QuoteState::Normal,
            opened_at: 0,
            escapes: false,
            escape_pending: false,
            segment_start: 0,
            content_start: None,
            content_end: 0,
            pos: 0,
            ranges: Vec::new(),
            directives: Vec::new(),
            ambiguities: Vec::new(),
        }
    }

    fn run(&mut self) {
        while self.pos < self.bytes.len() {
            match self.state {
                QuoteState::Normal => self.step_normal(),
                QuoteState::Single => self.step_escaped_quote(b'\''),
                QuoteState::Double => self.step_escaped_quote(b'"'),
                QuoteState::Backtick => {
                    if self.bytes[self.pos] == b'`' {
                        self.close_literal(1);
                    } else {
                        self.pos += 1;
                    }
                }
                QuoteState::Dollar { open, tag_end } => {
                    let bytes = self.bytes;
                    let tag = &bytes[open..tag_end];
                    if bytes[self.pos..].starts_with(tag) {
                        self.close_literal(tag.len());
                    } else {
                        self.pos += 1;
                    }
                }
                QuoteState::LineComment => {
                    if self.bytes[self.pos] == b'\n' {
                        self.state = QuoteState::Normal;
                    }
                    self.pos += 1;
                }
                QuoteState::BlockComment => {
                    if self.bytes[self.pos..].starts_with(b"*/") {
                        self.state = QuoteState::Normal;
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                    }
                }
                QuoteState::ConditionalComment => {
                    if self.bytes[self.pos..].starts_with(b"*/") {
                        self.close_literal(2);
                    } else {
                        self.pos += 1;
                    }
                }
            }
        }
    }

    fn step_normal(&mut self) {
        let i = self.pos;
        let b = self.bytes[i];

        if self.content_start.is_none()
            && matches!(b, b'd' | b'D')
            && self.at_line_start(i)
            && self.try_directive(i)
        {
            return;
        }

        if self.bytes[i..].starts_with(self.delimiter.as_bytes()) {
            let closed_at = i + self.delimiter.len();
            self.emit(Some(closed_at));
            self.segment_start = closed_at;
            self.pos = closed_at;
            return;
        }

        let next = self.bytes.get(i + 1).copied();
        match b {
            b'\'' => {
                self.escapes = self.options.backslash_escapes || self.escape_string_prefix(i);
                self.open(QuoteState::Single, 1);
            }
            b'"' => {
                self.escapes = self.options.backslash_escapes;
                self.open(QuoteState::Double, 1);
            }
            b'`' => self.open(QuoteState::Backtick, 1),
            b'/' if next == Some(b'*') => {
                if self.bytes.get(i + 2) == Some(&b'!') {
                    self.open(QuoteState::ConditionalComment, 3);
                } else {
                    self.opened_at = i;
                    self.state = QuoteState::BlockComment;
                    self.pos += 2;
                }
            }
            b'#' if self.options.hash_comments && self.at_token_start(i) => {
                self.state = QuoteState::LineComment;
                self.pos += 1;
            }
            b'-' if next == Some(b'-') && self.at_token_start(i) && self.dash_comment_at(i) => {
                self.state = QuoteState::LineComment;
                self.pos += 2;
            }
            b'$' if self.dollar_quotes_active() && self.at_token_start(i) => {
                match self.dollar_tag_end(i) {
                    Some(tag_end) => self.open(QuoteState::Dollar { open: i, tag_end }, tag_end - i),
                    None => self.touch_char(i),
                }
            }
            _ if b.is_ascii_whitespace() => self.pos += 1,
            _ => self.touch_char(i),
        }
    }

    fn step_escaped_quote(&mut self, quote: u8) {
        let b = self.bytes[self.pos];
        if self.escape_pending {
            self.escape_pending = false;
            self.pos += 1;
        } else if b == b'\\' && self.escapes {
            self.escape_pending = true;
            self.pos += 1;
        } else if b == quote {
            self.close_literal(1);
        } else {
            self.pos += 1;
        }
    }

    /// Enters a quoted construct that counts as statement content.
    fn open(&mut self, state: QuoteState, marker_len: usize) {
        let i = self.pos;
        self.content_start.get_or_insert(i);
        self.content_end = i + marker_len;
        self.opened_at = i;
        self.state = state;
        self.pos = i + marker_len;
    }

    fn close_literal(&mut self, marker_len: usize) {
        self.pos += marker_len;
        self.content_end = self.pos;
        self.state = QuoteState::Normal;
    }

    /// Marks the character at `i` as statement content and steps over it.
    fn touch_char(&mut self, i: usize) {
        let width = if self.bytes[i].is_ascii() {
            1
        } else {
            self.buffer[i..].chars().next().map_or(1, char::len_utf8)
        };
        self.content_start.get_or_insert(i);
        self.content_end = i + width;
        self.pos = i + width;
    }

    fn emit(&mut self, closed_at: Option<usize>) {
        if let Some(start) = self.content_start.take() {
            self.ranges.push(StatementRange {
                start,
                end: self.content_end,
                look_behind_applied: start > self.segment_start,
                closed_at,
            });
        }
        self.content_end = 0;
    }

    /// Only spaces and tabs separate `i` from the previous line break.
    fn at_line_start(&self, i: usize) -> bool {
        self.bytes[..i]
            .iter()
            .rev()
            .find(|b| !matches!(b, b' ' | b'\t'))
            .map_or(true, |b| *b == b'\n')
    }

    fn at_token_start(&self, i: usize) -> bool {
        i == 0 || !is_identifier_byte(self.bytes[i - 1])
    }

    /// `--` at `i` is followed by what the dialect requires of a comment.
    fn dash_comment_at(&self, i: usize) -> bool {
        if !self.options.dash_comment_needs_space {
            return true;
        }
        self.bytes
            .get(i + 2)
            .map_or(true, |b| b.is_ascii_whitespace() || b.is_ascii_control())
    }

    /// The quote at `i` opens a PostgreSQL `E'...'` escape string.
    fn escape_string_prefix(&self, i: usize) -> bool {
        i > 0 && matches!(self.bytes[i - 1], b'E' | b'e') && self.at_token_start(i - 1)
    }

    fn dollar_quotes_active(&self) -> bool {
        self.options.dollar_quotes && !self.delimiter.starts_with('$')
    }

    /// Returns the offset one past the closing `$` of a `$tag$` opener.
    fn dollar_tag_end(&self, i: usize) -> Option<usize> {
        let mut j = i + 1;
        while j < self.bytes.len() {
            let b = self.bytes[j];
            if b == b'$' {
                return Some(j + 1);
            }
            let valid = b.is_ascii_alphabetic() || b == b'_' || (j > i + 1 && b.is_ascii_digit());
            if !valid {
                return None;
            }
            j += 1;
        }
        None
    }

    fn try_directive(&mut self, i: usize) -> bool {
        let line_end = self.bytes[i..]
            .iter()
            .position(|b| *b == b'\n')
            .map_or(self.bytes.len(), |p| i + p);
        let line = &self.buffer[i..line_end];

        let Some(token) = DIRECTIVE.captures(line).and_then(|c| c.get(1)) else {
            return false;
        };
        let delimiter = token.as_str().to_string();
        debug!(
            "delimiter changed from '{}' to '{}' at offset {}",
            self.delimiter, delimiter, i
        );

        self.directives.push(DelimiterDirective {
            start: i,
            end: line_end,
            delimiter: delimiter.clone(),
        });
        self.delimiter = delimiter;
        self.segment_start = line_end;
        self.pos = line_end;
        true
    }

    fn finish(mut self) -> Scan {
        let kind = match self.state {
            QuoteState::Single => Some(AmbiguityKind::SingleQuote),
            QuoteState::Double => Some(AmbiguityKind::DoubleQuote),
            QuoteState::Backtick => Some(AmbiguityKind::Backtick),
            QuoteState::Dollar { .. } => Some(AmbiguityKind::DollarQuote),
            QuoteState::BlockComment => Some(AmbiguityKind::BlockComment),
            QuoteState::ConditionalComment => Some(AmbiguityKind::ConditionalComment),
            QuoteState::Normal | QuoteState::LineComment => None,
        };

        if let Some(kind) = kind {
            debug!("{:?} opened at {} is never closed", kind, self.opened_at);
            self.ambiguities.push(ScanAmbiguity {
                kind,
                opened_at: self.opened_at,
            });
            if self.content_start.is_some() {
                self.content_end = self.bytes.len();
            }
        }

        self.emit(None);

        Scan {
            ranges: self.ranges,
            directives: self.directives,
            ambiguities: self.ambiguities,
            final_delimiter: self.delimiter,
        }
    }
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || !b.is_ascii()
}
