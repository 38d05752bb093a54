//! Integration tests for sqlrun.

pub mod editor_test;
pub mod query_test;
pub mod runner_test;
pub mod scanner_test;
