//! Statement splitting, caret resolution and execution.
//!
//! `scanner` finds statement boundaries, `resolver` maps carets and
//! selections onto them, and `runner` executes the chosen statements.

pub mod resolver;
pub mod runner;
pub mod scanner;

pub use resolver::{map_error_offset, nth_statement_from, ranges_in_selection, resolve, resolve_index};
pub use runner::{
    CollectingSink, ExecutionResult, ResultSink, RunMode, RunState, RunStatus, RunSummary,
    RunnerConfig, StatementError, StatementOutcome, StatementRunner,
};
pub use scanner::{
    scan, AmbiguityKind, DelimiterDirective, Scan, ScanAmbiguity, ScanOptions, StatementRange,
    StatementScanner, DEFAULT_DELIMITER,
};
