//! Mock database clients for testing.
//!
//! Provides in-memory implementations that record what they were asked to
//! execute, so runner behavior can be checked without a server.

use super::{ColumnInfo, DatabaseClient, QueryResult, Value};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A mock database client that returns predefined results.
///
/// SELECT-like statements return one row echoing the statement; everything
/// else reports one affected row. Statements containing a configured marker
/// fail with a query error positioned at the marker. After `close`, every
/// statement fails with a connection error, like the real clients.
#[derive(Debug, Default)]
pub struct MockDatabaseClient {
    fail_marker: Option<String>,
    executed: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockDatabaseClient {
    /// Creates a new mock database client that never fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock that fails every statement containing `marker`.
    pub fn failing_on(marker: impl Into<String>) -> Self {
        Self {
            fail_marker: Some(marker.into()),
            ..Self::default()
        }
    }

    /// Returns the statements executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        if self.is_closed() {
            return Err(Error::connection("connection closed"));
        }
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }

        if let Some(marker) = &self.fail_marker {
            if let Some(byte) = sql.find(marker.as_str()) {
                let position = sql[..byte].chars().count();
                return Err(Error::query_at(
                    format!("You have an error in your SQL syntax near '{marker}'"),
                    position,
                ));
            }
        }

        let sql_upper = sql.trim_start().to_uppercase();
        let returns_rows = ["SELECT", "SHOW", "EXPLAIN", "DESCRIBE", "WITH"]
            .iter()
            .any(|keyword| sql_upper.starts_with(keyword));

        if returns_rows {
            let columns = vec![ColumnInfo::new("result", "text")];
            let rows = vec![vec![Value::String(format!("Mock result for: {}", sql))]];
            Ok(QueryResult::with_data(columns, rows).with_execution_time(Duration::from_millis(1)))
        } else {
            Ok(QueryResult::affected(1).with_execution_time(Duration::from_millis(1)))
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A mock database client that fails every statement.
#[derive(Debug, Clone)]
pub struct FailingDatabaseClient {
    message: String,
}

impl FailingDatabaseClient {
    /// Creates a client whose every statement fails with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for FailingDatabaseClient {
    fn default() -> Self {
        Self::new("Lost connection to MySQL server during query")
    }
}

#[async_trait]
impl DatabaseClient for FailingDatabaseClient {
    async fn execute_query(&self, _sql: &str) -> Result<QueryResult> {
        Err(Error::query(self.message.clone()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
