//! Statement classification module.
//!
//! Labels each statement of a run by what it does to the server: reads,
//! data writes, schema changes, session changes and transaction control.
//! The runner uses the labels to tell its caller that cached schema
//! information is stale, or that `USE` switched the current database.

mod parser;

pub use parser::{classify_sql, SqlClassifier};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad effect of a SQL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// Returns data without changing it (SELECT, SHOW, EXPLAIN).
    Read,
    /// Changes table data (INSERT, UPDATE, DELETE, TRUNCATE).
    Write,
    /// Changes the schema (CREATE, ALTER, DROP, RENAME).
    Schema,
    /// Changes session state (USE, SET).
    Session,
    /// Transaction control (BEGIN, COMMIT, ROLLBACK, SAVEPOINT).
    Transaction,
    /// Anything else, including statements that could not be recognized.
    Other,
}

impl StatementKind {
    /// Returns true if executing the statement may have changed the schema.
    pub fn changes_schema(&self) -> bool {
        matches!(self, Self::Schema)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Schema => write!(f, "schema"),
            Self::Session => write!(f, "session"),
            Self::Transaction => write!(f, "transaction"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Result of classifying one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: StatementKind,
    /// Leading keyword in upper case, e.g. `SELECT`.
    pub keyword: String,
    /// Database named by a `USE` statement.
    pub database: Option<String>,
}

impl Classification {
    /// Creates a classification without a database switch.
    pub fn new(kind: StatementKind, keyword: impl Into<String>) -> Self {
        Self {
            kind,
            keyword: keyword.into(),
            database: None,
        }
    }
}
