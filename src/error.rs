//! Error types for sqlrun.
//!
//! Defines the main error enum used throughout the library. Per-statement
//! failures during a batch are not errors at this level: they are recorded in
//! the statement's `ExecutionResult` and the batch keeps going.

use thiserror::Error;

/// Main error type for sqlrun operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement execution errors reported by the server.
    ///
    /// `position` is a 0-based character offset into the submitted SQL text,
    /// when the server reports where the error occurred.
    #[error("Query error: {message}")]
    Query {
        message: String,
        position: Option<usize>,
    },

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The requested run mode selected no statements, so nothing was executed.
    #[error("No statements to execute")]
    EmptyStatementSet,

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error without a server-reported position.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query {
            message: msg.into(),
            position: None,
        }
    }

    /// Creates a query error located at a character offset of the statement.
    pub fn query_at(msg: impl Into<String>, position: usize) -> Self {
        Self::Query {
            message: msg.into(),
            position: Some(position),
        }
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query { .. } => "Query Error",
            Self::Config(_) => "Configuration Error",
            Self::EmptyStatementSet => "Nothing To Run",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using the crate error.
pub type Result<T> = std::result::Result<T, Error>;
