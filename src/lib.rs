//! sqlrun - SQL script splitting and sequential statement execution.
//!
//! This library exposes the core modules for use by the binary and by
//! integration tests.

pub mod classify;
pub mod cli;
pub mod config;
pub mod db;
pub mod editor;
pub mod error;
pub mod logging;
pub mod output;
pub mod query;
