//! Caret and selection resolution over scanned statement ranges.
//!
//! All functions here take the ranges produced by the scanner (ascending,
//! non-overlapping) and are pure.

use super::scanner::StatementRange;

/// Returns the statement at `caret`.
///
/// A caret inside a statement (both ends inclusive) selects it. A caret in
/// the space between statements selects the preceding statement when
/// `look_behind` is set and the following one otherwise. With `look_behind`,
/// a caret that touches the previous statement's closing delimiter selects
/// that previous statement even if it also sits on the next statement's
/// first character.
pub fn resolve(
    ranges: &[StatementRange],
    caret: usize,
    look_behind: bool,
) -> Option<StatementRange> {
    resolve_index(ranges, caret, look_behind).map(|i| ranges[i])
}

/// Index form of [`resolve`].
pub fn resolve_index(ranges: &[StatementRange], caret: usize, look_behind: bool) -> Option<usize> {
    let idx = ranges.partition_point(|r| r.end < caret);

    match ranges.get(idx) {
        Some(range) if range.start <= caret => {
            let touches_previous = look_behind
                && caret == range.start
                && idx > 0
                && ranges[idx - 1].closed_at == Some(caret);
            if touches_previous {
                Some(idx - 1)
            } else {
                Some(idx)
            }
        }
        _ if look_behind => idx.checked_sub(1),
        Some(_) => Some(idx),
        None => None,
    }
}

/// Returns the statements touched by the selection `[start, end]`.
///
/// The first statement is resolved without look-behind and the last one
/// with it, so a selection that begins in the gap before a statement or ends
/// right after a delimiter picks whole statements only. The bounds may be
/// given in either order.
pub fn ranges_in_selection(ranges: &[StatementRange], start: usize, end: usize) -> &[StatementRange] {
    let (from, to) = if start <= end { (start, end) } else { (end, start) };

    let (Some(first), Some(last)) = (
        resolve_index(ranges, from, false),
        resolve_index(ranges, to, true),
    ) else {
        return &[];
    };

    if first > last {
        return &[];
    }
    &ranges[first..=last]
}

/// Returns the `index`-th statement (0-based) among those ending at or after
/// `start_position`.
///
/// Used to locate a failing statement of a partial run in the full buffer.
pub fn nth_statement_from(
    ranges: &[StatementRange],
    index: usize,
    start_position: usize,
) -> Option<StatementRange> {
    let first = ranges.partition_point(|r| r.end < start_position);
    ranges.get(first + index).copied()
}

/// Maps a server-reported character position inside a statement back to a
/// byte offset in the buffer.
///
/// Without a position the statement start is used. Positions past the end
/// of the statement are clamped to its end.
pub fn map_error_offset(buffer: &str, range: &StatementRange, position: Option<usize>) -> usize {
    let Some(chars) = position else {
        return range.start;
    };
    let text = range.text(buffer);
    let within = text
        .char_indices()
        .nth(chars)
        .map_or(text.len(), |(byte, _)| byte);
    range.start + within
}
