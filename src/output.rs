//! Result printing for the command-line front end.
//!
//! `PrintingSink` writes each statement result as it arrives, either as a
//! plain-text table or as one JSON object per line. `write_scan` prints the
//! statement boundaries found by the scanner.

use std::io::{self, Write};
use std::sync::Arc;

use serde_json::json;

use crate::cli::OutputFormat;
use crate::db::QueryResult;
use crate::query::{ExecutionResult, ResultSink, RunSummary, Scan, StatementOutcome};

/// Returns the 1-based line and column (in characters) of a byte offset.
pub fn line_column(buffer: &str, offset: usize) -> (usize, usize) {
    let before = &buffer[..offset.min(buffer.len())];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

/// Sink that prints results to a writer.
///
/// Write failures do not stop the run; the first one is kept and returned by
/// [`PrintingSink::finish`].
pub struct PrintingSink<W: Write + Send> {
    writer: W,
    format: OutputFormat,
    buffer: Arc<str>,
    io_error: Option<io::Error>,
}

impl<W: Write + Send> PrintingSink<W> {
    pub fn new(writer: W, format: OutputFormat, buffer: Arc<str>) -> Self {
        Self {
            writer,
            format,
            buffer,
            io_error: None,
        }
    }

    /// Flushes the writer and reports the first write failure, if any.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(e) = self.io_error.take() {
            return Err(e);
        }
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn record(&mut self, result: io::Result<()>) {
        if let Err(e) = result {
            if self.io_error.is_none() {
                self.io_error = Some(e);
            }
        }
    }

    fn write_result_text(&mut self, result: &ExecutionResult) -> io::Result<()> {
        let (line, _) = line_column(&self.buffer, result.range.start);
        writeln!(
            self.writer,
            "-- [{}] line {} ({}, {} ms)",
            result.index + 1,
            line,
            result.classification.kind,
            result.elapsed.as_millis()
        )?;

        match &result.outcome {
            StatementOutcome::Rows(rows) if rows.has_columns() => {
                write_table(&mut self.writer, rows)?;
                if let Some(warning) = rows.truncation_warning() {
                    writeln!(self.writer, "{warning}")?;
                }
                let noun = if rows.row_count == 1 { "row" } else { "rows" };
                writeln!(self.writer, "{} {noun}", rows.row_count)?;
            }
            StatementOutcome::Rows(rows) => {
                writeln!(self.writer, "OK, {} rows affected", rows.affected_rows)?;
            }
            StatementOutcome::Error(error) => {
                let (line, column) = line_column(&self.buffer, error.buffer_offset);
                writeln!(self.writer, "{} (line {line}, column {column})", error.message)?;
            }
        }
        writeln!(self.writer)
    }

    fn write_result_json(&mut self, result: &ExecutionResult) -> io::Result<()> {
        let value = json!({ "type": "result", "result": result });
        serde_json::to_writer(&mut self.writer, &value)?;
        writeln!(self.writer)
    }

    fn write_summary(&mut self, summary: &RunSummary) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => {
                writeln!(
                    self.writer,
                    "{} executed, {} succeeded, {} failed, {} rows affected ({:?}, {} ms)",
                    summary.executed,
                    summary.succeeded,
                    summary.failed,
                    summary.affected_rows,
                    summary.status,
                    summary.elapsed.as_millis()
                )?;
                if let Some(database) = &summary.current_database {
                    writeln!(self.writer, "Current database: {database}")?;
                }
                if summary.schema_changed {
                    writeln!(self.writer, "Schema changed")?;
                }
                Ok(())
            }
            OutputFormat::Json => {
                let value = json!({ "type": "summary", "summary": summary });
                serde_json::to_writer(&mut self.writer, &value)?;
                writeln!(self.writer)
            }
        }
    }
}

impl<W: Write + Send> ResultSink for PrintingSink<W> {
    fn on_result(&mut self, result: ExecutionResult) {
        let written = match self.format {
            OutputFormat::Text => self.write_result_text(&result),
            OutputFormat::Json => self.write_result_json(&result),
        };
        self.record(written);
    }

    fn on_summary(&mut self, summary: &RunSummary) {
        let written = self.write_summary(summary);
        self.record(written);
    }
}

fn write_table<W: Write>(writer: &mut W, result: &QueryResult) -> io::Result<()> {
    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(|v| v.to_display_string()).collect())
        .collect();

    let mut widths: Vec<usize> = result
        .columns
        .iter()
        .map(|c| c.name.chars().count())
        .collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let header: Vec<String> = result.columns.iter().map(|c| c.name.clone()).collect();
    write_row(writer, &header, &widths)?;
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    writeln!(writer, "{}", rule.join("-+-"))?;
    for row in &cells {
        write_row(writer, row, &widths)?;
    }
    Ok(())
}

fn write_row<W: Write>(writer: &mut W, cells: &[String], widths: &[usize]) -> io::Result<()> {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    writeln!(writer, "{}", padded.join(" | ").trim_end())
}

/// Prints the statements, delimiter directives and ambiguities of a scan.
pub fn write_scan<W: Write>(
    writer: &mut W,
    scan: &Scan,
    buffer: &str,
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Json => {
            let statements: Vec<_> = scan
                .ranges
                .iter()
                .map(|range| json!({ "range": range, "sql": range.text(buffer) }))
                .collect();
            let value = json!({
                "statements": statements,
                "directives": scan.directives,
                "ambiguities": scan.ambiguities,
                "final_delimiter": scan.final_delimiter,
            });
            serde_json::to_writer_pretty(&mut *writer, &value)?;
            writeln!(writer)
        }
        OutputFormat::Text => {
            for (i, range) in scan.ranges.iter().enumerate() {
                let (line, column) = line_column(buffer, range.start);
                writeln!(
                    writer,
                    "[{}] {}..{} (line {line}, column {column}){}",
                    i + 1,
                    range.start,
                    range.end,
                    if range.is_terminated() { "" } else { " unterminated" }
                )?;
                writeln!(writer, "{}", range.text(buffer))?;
            }
            for directive in &scan.directives {
                let (line, _) = line_column(buffer, directive.start);
                writeln!(writer, "-- delimiter {} (line {line})", directive.delimiter)?;
            }
            for ambiguity in &scan.ambiguities {
                let (line, column) = line_column(buffer, ambiguity.opened_at);
                writeln!(
                    writer,
                    "-- warning: unterminated {:?} opened at line {line}, column {column}",
                    ambiguity.kind
                )?;
            }
            Ok(())
        }
    }
}
