//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient`
//! trait using sqlx. The client owns a single connection so that session
//! state carries over from one statement to the next.

use crate::classify::{classify_sql, StatementKind};
use crate::config::ConnectionConfig;
use crate::db::{ColumnInfo, DatabaseBackend, DatabaseClient, QueryResult, Row, Value, MAX_ROWS};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::{PgConnection, PgDatabaseError, PgErrorPosition, PgRow};
use sqlx::{Column as SqlxColumn, Connection, Either, Executor, Row as SqlxRow, TypeInfo};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    /// `None` once the client has been closed.
    conn: Mutex<Option<PgConnection>>,
}

impl PostgresClient {
    /// Wraps an already established connection.
    pub fn from_connection(conn: PgConnection) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
        }
    }

    /// Connects using the given configuration, retrying transient failures.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            match PgConnection::connect(&conn_str).await {
                Ok(conn) => {
                    debug!("Successfully connected to database");
                    return Ok(Self::from_connection(conn));
                }
                Err(e) => {
                    let is_transient = is_transient_error(&e);
                    last_error = Some(e);

                    if attempt < MAX_RETRY_ATTEMPTS && is_transient {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    } else {
                        break;
                    }
                }
            }
        }

        Err(match last_error {
            Some(error) => map_connection_error(error, config),
            None => Error::connection("no connection attempt was made"),
        })
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| Error::connection("connection closed"))?;
        let counts_rows = counts_affected_rows(sql);

        let mut stream = conn.fetch_many(sqlx::raw_sql(sql));
        let mut columns: Option<Vec<ColumnInfo>> = None;
        let mut rows: Vec<Row> = Vec::new();
        let mut total_rows = 0usize;
        let mut affected_rows = 0u64;

        while let Some(step) = stream.try_next().await.map_err(map_query_error)? {
            match step {
                Either::Left(done) if counts_rows => affected_rows += done.rows_affected(),
                Either::Left(_) => {}
                Either::Right(row) => {
                    if columns.is_none() {
                        columns = Some(column_info(&row));
                    }
                    total_rows += 1;
                    if rows.len() < MAX_ROWS {
                        rows.push(convert_row(&row));
                    }
                }
            }
        }

        let was_truncated = total_rows > MAX_ROWS;
        if was_truncated {
            warn!(
                "Statement returned {} rows, truncating to {} rows",
                total_rows, MAX_ROWS
            );
        }

        Ok(QueryResult {
            columns: columns.unwrap_or_default(),
            row_count: rows.len(),
            rows,
            execution_time: start.elapsed(),
            affected_rows,
            total_rows: Some(total_rows),
            was_truncated,
        })
    }

    async fn close(&self) -> Result<()> {
        let Some(conn) = self.conn.lock().await.take() else {
            return Ok(());
        };
        debug!("Closing database connection");
        conn.close()
            .await
            .map_err(|e| Error::connection(format!("Failed to close connection: {e}")))
    }
}

/// Whether the command tag of `sql` reports affected rows.
///
/// The tag of a query (`SELECT n`) is a row count, not a change count, while
/// `INSERT/UPDATE/DELETE ... RETURNING` report both rows and changes.
fn counts_affected_rows(sql: &str) -> bool {
    classify_sql(sql, DatabaseBackend::Postgres).kind != StatementKind::Read
}

fn column_info(row: &PgRow) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        // raw_sql uses the text protocol, so everything else decodes as text
        _ => row
            .try_get_unchecked::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> Error {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.effective_port();
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        Error::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        Error::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        Error::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("timed out") {
        Error::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        Error::connection(error.to_string())
    }
}

/// Converts a statement failure into a query error, keeping the position.
///
/// PostgreSQL reports a 1-based character position into the statement.
fn map_query_error(error: sqlx::Error) -> Error {
    let Some(db_error) = error.as_database_error() else {
        return Error::query(error.to_string());
    };

    let mut message = format!("ERROR: {}", db_error.message());
    let mut position = None;

    if let Some(pg_error) = db_error.try_downcast_ref::<PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            message.push_str("\n  DETAIL: ");
            message.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            message.push_str("\n  HINT: ");
            message.push_str(hint);
        }
        if let Some(PgErrorPosition::Original(p)) = pg_error.position() {
            position = Some(p.saturating_sub(1));
        }
    }

    Error::Query { message, position }
}
