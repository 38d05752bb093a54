//! Editor-facing query operations.
//!
//! An `EditorSnapshot` is an immutable copy of an editor buffer together with
//! its selection. The operations a query editor offers (which query is under
//! the caret, select it, count queries, comment lines out) are answered from
//! one scan of that snapshot; edits come back as `TextEdit`s for the editor
//! to apply.

use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::query::{
    nth_statement_from, resolve, RunMode, Scan, StatementRange, StatementScanner,
};

/// Selected text, as byte offsets. An empty selection is a caret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    /// Creates a selection, ordering the bounds.
    pub fn new(a: usize, b: usize) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    /// Creates an empty selection at `offset`.
    pub fn caret(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl From<Range<usize>> for Selection {
    fn from(range: Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

/// A replacement of `range` in the buffer by `replacement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub range: Range<usize>,
    pub replacement: String,
}

impl TextEdit {
    /// Returns `text` with the edit applied.
    pub fn apply(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + self.replacement.len());
        out.push_str(&text[..self.range.start]);
        out.push_str(&self.replacement);
        out.push_str(&text[self.range.end..]);
        out
    }
}

/// Immutable editor state with its statement ranges.
#[derive(Debug, Clone)]
pub struct EditorSnapshot {
    text: Arc<str>,
    selection: Selection,
    scan: Scan,
}

impl EditorSnapshot {
    /// Snapshots `text` and scans it with `scanner`.
    ///
    /// Selection bounds past the end of the text are clamped to it.
    pub fn new(text: impl Into<Arc<str>>, selection: Selection, scanner: &StatementScanner) -> Self {
        let text = text.into();
        let len = text.len();
        let selection = Selection::new(
            floor_char_boundary(&text, selection.start.min(len)),
            floor_char_boundary(&text, selection.end.min(len)),
        );
        let scan = scanner.scan(&text);
        Self {
            text,
            selection,
            scan,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns a shared handle to the text, e.g. for a background run.
    pub fn shared_text(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn scan(&self) -> &Scan {
        &self.scan
    }

    pub fn ranges(&self) -> &[StatementRange] {
        &self.scan.ranges
    }

    pub fn number_of_queries(&self) -> usize {
        self.scan.ranges.len()
    }

    /// Returns the text of the query at `position`.
    pub fn query_at_position(&self, position: usize, look_behind: bool) -> Option<&str> {
        self.query_range_at_position(position, look_behind)
            .map(|range| range.text(&self.text))
    }

    /// Returns the range of the query at `position`.
    pub fn query_range_at_position(
        &self,
        position: usize,
        look_behind: bool,
    ) -> Option<StatementRange> {
        resolve(&self.scan.ranges, position, look_behind)
    }

    /// Returns the query under the caret, looking behind.
    pub fn current_query(&self) -> Option<StatementRange> {
        self.query_range_at_position(self.selection.start, true)
    }

    /// Returns the selection covering the query under the caret.
    pub fn select_current_query(&self) -> Option<Selection> {
        self.current_query()
            .map(|range| Selection::new(range.start, range.end))
    }

    /// Returns the text range of the `index`-th query (0-based) counted from
    /// the first query ending at or after `start_position`.
    pub fn query_text_range_for_query(
        &self,
        index: usize,
        start_position: usize,
    ) -> Option<Range<usize>> {
        nth_statement_from(&self.scan.ranges, index, start_position).map(|range| range.span())
    }

    /// Returns the run mode matching the selection: the selected queries, or
    /// the query under the caret.
    pub fn run_mode(&self) -> RunMode {
        if self.selection.is_empty() {
            RunMode::Current {
                caret: self.selection.start,
            }
        } else {
            RunMode::Selection {
                start: self.selection.start,
                end: self.selection.end,
            }
        }
    }

    /// Toggles `-- ` line comments on every line the selection touches.
    ///
    /// When each non-blank line is already commented the markers are removed,
    /// otherwise every non-blank line gets one.
    pub fn comment_out(&self) -> TextEdit {
        let start = line_start(&self.text, self.selection.start);
        let end = line_end(&self.text, self.selection.end);
        let block = &self.text[start..end];

        let commented = block
            .lines()
            .filter(|line| !line.trim().is_empty())
            .all(|line| line.trim_start().starts_with("--"));
        let has_content = block.lines().any(|line| !line.trim().is_empty());

        let replacement = block
            .split('\n')
            .map(|line| {
                if line.trim().is_empty() {
                    line.to_string()
                } else if commented && has_content {
                    uncomment_line(line)
                } else {
                    format!("-- {line}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        TextEdit {
            range: start..end,
            replacement,
        }
    }

    /// Toggles a `/* */` block comment around the current query, or around
    /// the selection when `take_selection` is set and something is selected.
    pub fn comment_out_current_query(&self, take_selection: bool) -> Option<TextEdit> {
        let range = if take_selection && !self.selection.is_empty() {
            self.selection.start..self.selection.end
        } else {
            self.current_query()?.span()
        };

        let target = &self.text[range.clone()];
        let replacement = match target
            .strip_prefix("/*")
            .and_then(|inner| inner.strip_suffix("*/"))
        {
            Some(inner) if !inner.starts_with('!') => inner.trim().to_string(),
            _ => format!("/* {target} */"),
        };

        Some(TextEdit { range, replacement })
    }
}

fn uncomment_line(line: &str) -> String {
    let indent = line.len() - line.trim_start().len();
    let body = &line[indent..];
    let body = body
        .strip_prefix("-- ")
        .or_else(|| body.strip_prefix("--"))
        .unwrap_or(body);
    format!("{}{}", &line[..indent], body)
}

fn line_start(text: &str, offset: usize) -> usize {
    text[..offset].rfind('\n').map_or(0, |i| i + 1)
}

fn line_end(text: &str, offset: usize) -> usize {
    text[offset..].find('\n').map_or(text.len(), |i| offset + i)
}

fn floor_char_boundary(text: &str, mut offset: usize) -> usize {
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}
