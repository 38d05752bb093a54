//! Sequential statement execution.
//!
//! The runner sends resolved statement ranges to a database client one at a
//! time, hands each result to a sink as soon as it arrives and returns a
//! summary of the run. Statements never overlap: later statements may depend
//! on the session state left behind by earlier ones.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::{Classification, SqlClassifier};
use crate::config::RunnerSettings;
use crate::db::{duration_serde, DatabaseBackend, DatabaseClient, QueryResult};
use crate::error::{Error, Result};

use super::resolver::{map_error_offset, ranges_in_selection, resolve_index};
use super::scanner::{StatementRange, StatementScanner, DEFAULT_DELIMITER};

/// Which statements of the buffer to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Every statement, in buffer order.
    All,
    /// The statements touched by the selection `[start, end]`.
    Selection { start: usize, end: usize },
    /// The statement at the caret, resolved with look-behind.
    Current { caret: usize },
}

impl RunMode {
    /// Returns the ranges this mode selects.
    pub fn select<'r>(&self, ranges: &'r [StatementRange]) -> &'r [StatementRange] {
        match *self {
            Self::All => ranges,
            Self::Selection { start, end } => ranges_in_selection(ranges, start, end),
            Self::Current { caret } => match resolve_index(ranges, caret, true) {
                Some(i) => &ranges[i..=i],
                None => &[],
            },
        }
    }
}

/// Runner configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Stop at the first failing statement.
    pub abort_on_error: bool,
    /// Delimiter in effect at the top of the buffer.
    pub delimiter: String,
    /// Dialect used for scanning and classification.
    pub backend: DatabaseBackend,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            abort_on_error: false,
            delimiter: DEFAULT_DELIMITER.to_string(),
            backend: DatabaseBackend::default(),
        }
    }
}

impl RunnerConfig {
    /// Builds the runner configuration from file settings, falling back to
    /// `backend` when no dialect is configured.
    pub fn from_settings(settings: &RunnerSettings, backend: DatabaseBackend) -> Self {
        Self {
            abort_on_error: settings.abort_on_error,
            delimiter: settings.delimiter.clone(),
            backend: settings.dialect.unwrap_or(backend),
        }
    }

    /// Sets abort-on-first-error.
    pub fn with_abort_on_error(mut self, abort: bool) -> Self {
        self.abort_on_error = abort;
        self
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every selected statement was executed.
    Completed,
    /// The cancellation token fired between two statements.
    Cancelled,
    /// A statement failed and abort-on-first-error is set.
    Aborted,
}

/// Lifecycle of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Finished(RunStatus),
}

/// A statement the server rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementError {
    pub message: String,
    /// Character offset inside the statement, as reported by the server.
    pub server_position: Option<usize>,
    /// Byte offset of the error in the buffer.
    pub buffer_offset: usize,
}

/// What a single statement produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementOutcome {
    Rows(QueryResult),
    Error(StatementError),
}

impl StatementOutcome {
    /// Returns true if the statement failed.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Result of one executed statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Position of the statement within the run, starting at 0.
    pub index: usize,
    pub range: StatementRange,
    pub sql: String,
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
    pub classification: Classification,
    pub outcome: StatementOutcome,
}

impl ExecutionResult {
    /// Returns the error, if the statement failed.
    pub fn error(&self) -> Option<&StatementError> {
        match &self.outcome {
            StatementOutcome::Error(e) => Some(e),
            StatementOutcome::Rows(_) => None,
        }
    }
}

/// Totals for a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub executed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub affected_rows: u64,
    pub status: RunStatus,
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
    /// A schema statement succeeded during the run.
    pub schema_changed: bool,
    /// Database selected by the last successful `USE`.
    pub current_database: Option<String>,
    /// Text of the last statement sent to the server.
    pub last_statement: Option<String>,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            executed: 0,
            succeeded: 0,
            failed: 0,
            affected_rows: 0,
            status: RunStatus::Completed,
            elapsed: Duration::ZERO,
            schema_changed: false,
            current_database: None,
            last_statement: None,
        }
    }
}

/// Receives results while a run is in progress.
pub trait ResultSink: Send {
    /// Called once per executed statement, in order.
    fn on_result(&mut self, result: ExecutionResult);

    /// Called once when the run ends.
    fn on_summary(&mut self, _summary: &RunSummary) {}
}

/// Sink that keeps everything it receives.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub results: Vec<ExecutionResult>,
    pub summary: Option<RunSummary>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultSink for CollectingSink {
    fn on_result(&mut self, result: ExecutionResult) {
        self.results.push(result);
    }

    fn on_summary(&mut self, summary: &RunSummary) {
        self.summary = Some(summary.clone());
    }
}

/// Executes statement ranges against one database session.
pub struct StatementRunner {
    client: Arc<dyn DatabaseClient>,
    config: RunnerConfig,
    cancel: CancellationToken,
    classifier: SqlClassifier,
    state: RunState,
}

impl StatementRunner {
    /// Creates a runner over `client`.
    pub fn new(client: Arc<dyn DatabaseClient>, config: RunnerConfig) -> Self {
        let classifier = SqlClassifier::new(config.backend);
        Self {
            client,
            config,
            cancel: CancellationToken::new(),
            classifier,
            state: RunState::Idle,
        }
    }

    /// Uses `token` for cancellation instead of a private one.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Returns a handle that cancels the current run between statements.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Scans `buffer` with the configured delimiter and dialect, then runs it.
    pub async fn run_script(
        &mut self,
        buffer: &str,
        mode: RunMode,
        sink: &mut dyn ResultSink,
    ) -> Result<RunSummary> {
        let scan = StatementScanner::new(self.config.delimiter.as_str())
            .with_options(self.config.backend.scan_options())
            .scan(buffer);

        for ambiguity in &scan.ambiguities {
            warn!(
                kind = ?ambiguity.kind,
                opened_at = ambiguity.opened_at,
                "Unterminated construct runs to end of buffer"
            );
        }

        self.run(buffer, &scan.ranges, mode, sink).await
    }

    /// Runs the ranges selected by `mode`, in order.
    ///
    /// Returns `Error::EmptyStatementSet` without contacting the server when
    /// the mode selects nothing. Statement failures are reported through the
    /// sink and counted in the summary; they never make this return `Err`.
    pub async fn run(
        &mut self,
        buffer: &str,
        ranges: &[StatementRange],
        mode: RunMode,
        sink: &mut dyn ResultSink,
    ) -> Result<RunSummary> {
        let selected = mode.select(ranges);
        if selected.is_empty() {
            debug!(?mode, "No statements selected");
            return Err(Error::EmptyStatementSet);
        }

        info!(statements = selected.len(), ?mode, "Starting run");
        self.state = RunState::Running;
        let started = Instant::now();
        let mut summary = RunSummary::new();

        for (index, range) in selected.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(executed = summary.executed, "Run cancelled");
                summary.status = RunStatus::Cancelled;
                break;
            }

            let result = self.execute(index, buffer, range).await;
            summary.executed += 1;
            summary.last_statement = Some(result.sql.clone());

            let failed = match &result.outcome {
                StatementOutcome::Rows(rows) => {
                    summary.succeeded += 1;
                    summary.affected_rows += rows.affected_rows;
                    if result.classification.kind.changes_schema() {
                        summary.schema_changed = true;
                    }
                    if let Some(database) = &result.classification.database {
                        summary.current_database = Some(database.clone());
                    }
                    false
                }
                StatementOutcome::Error(_) => {
                    summary.failed += 1;
                    true
                }
            };

            sink.on_result(result);

            if failed && self.config.abort_on_error {
                info!(index, "Aborting run after failed statement");
                summary.status = RunStatus::Aborted;
                break;
            }
        }

        summary.elapsed = started.elapsed();
        self.state = RunState::Finished(summary.status);
        info!(
            executed = summary.executed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            status = ?summary.status,
            "Run finished"
        );

        sink.on_summary(&summary);
        Ok(summary)
    }

    async fn execute(&self, index: usize, buffer: &str, range: &StatementRange) -> ExecutionResult {
        let sql = range.text(buffer);
        let classification = self.classifier.classify(sql);
        debug!(index, kind = %classification.kind, "Executing statement");

        let started = Instant::now();
        let outcome = match self.client.execute_query(sql).await {
            Ok(rows) => StatementOutcome::Rows(rows),
            Err(e) => {
                let (message, server_position) = match e {
                    Error::Query { message, position } => (message, position),
                    other => (other.to_string(), None),
                };
                let buffer_offset = map_error_offset(buffer, range, server_position);
                warn!(index, buffer_offset, "Statement failed: {}", message);
                StatementOutcome::Error(StatementError {
                    message,
                    server_position,
                    buffer_offset,
                })
            }
        };

        ExecutionResult {
            index,
            range: *range,
            sql: sql.to_string(),
            elapsed: started.elapsed(),
            classification,
            outcome,
        }
    }
}
