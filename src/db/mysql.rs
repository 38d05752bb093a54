//! MySQL / MariaDB database client implementation.
//!
//! Mirrors the PostgreSQL client: one owned connection, statements sent
//! over the text protocol, rows capped at `MAX_ROWS`.

use crate::config::ConnectionConfig;
use crate::db::{ColumnInfo, DatabaseClient, QueryResult, Row, Value, MAX_ROWS};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use regex::Regex;
use sqlx::mysql::{MySqlConnection, MySqlDatabaseError, MySqlRow};
use sqlx::{Column as SqlxColumn, Connection, Either, Executor, Row as SqlxRow, TypeInfo};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Matches the location suffix of MySQL syntax errors: `near '...' at line N`.
static NEAR_AT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)near '(.*)' at line (\d+)$").expect("valid location pattern")
});

/// MySQL database client.
#[derive(Debug)]
pub struct MySqlClient {
    /// `None` once the client has been closed.
    conn: Mutex<Option<MySqlConnection>>,
}

impl MySqlClient {
    /// Wraps an already established connection.
    pub fn from_connection(conn: MySqlConnection) -> Self {
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

            match MySqlConnection::connect(&conn_str).await {
                Ok(conn) => {
                    debug!("Successfully connected to database");
                    return Ok(Self::from_connection(conn));
                }
                Err(e) => {
                    let retry = attempt < MAX_RETRY_ATTEMPTS && is_transient_error(&e);
                    last_error = Some(e);
                    if !retry {
                        break;
                    }
                    warn!(
                        "Connection attempt {} failed (transient error), retrying in {:?}",
                        attempt, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
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
impl DatabaseClient for MySqlClient {
    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| Error::connection("connection closed"))?;

        let mut stream = conn.fetch_many(sqlx::raw_sql(sql));
        let mut columns: Option<Vec<ColumnInfo>> = None;
        let mut rows: Vec<Row> = Vec::new();
        let mut total_rows = 0usize;
        let mut affected_rows = 0u64;

        while let Some(step) = stream
            .try_next()
            .await
            .map_err(|e| map_query_error(sql, e))?
        {
            match step {
                Either::Left(done) => affected_rows += done.rows_affected(),
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

fn column_info(row: &MySqlRow) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

fn convert_row(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a MySqlRow to our Value type.
fn convert_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    let upper = type_name.to_uppercase();
    match upper.as_str() {
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => row
            .try_get_unchecked::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        // BIGINT UNSIGNED may not fit in i64, keep the digits as text then
        t if t.ends_with("UNSIGNED") => match row.try_get_unchecked::<Option<u64>, _>(index) {
            Ok(Some(v)) => i64::try_from(v)
                .map(Value::Int)
                .unwrap_or_else(|_| Value::String(v.to_string())),
            _ => Value::Null,
        },

        "FLOAT" | "DOUBLE" => row
            .try_get_unchecked::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => row
            .try_get_unchecked::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        _ => row
            .try_get_unchecked::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("too many connections")
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

    if error_str.contains("connection refused") {
        Error::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("access denied") {
        Error::connection(format!(
            "Access denied for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("unknown database") {
        Error::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("timed out") {
        Error::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        Error::connection(error.to_string())
    }
}

/// Converts a statement failure into a query error.
///
/// MySQL only reports the line and the text following the failure point, so
/// the position is recovered by finding that text on the reported line.
fn map_query_error(sql: &str, error: sqlx::Error) -> Error {
    let Some(db_error) = error.as_database_error() else {
        return Error::query(error.to_string());
    };

    let message = match db_error.try_downcast_ref::<MySqlDatabaseError>() {
        Some(mysql_error) => format!("ERROR {}: {}", mysql_error.number(), mysql_error.message()),
        None => format!("ERROR: {}", db_error.message()),
    };

    let position = error_position(sql, db_error.message());
    Error::Query { message, position }
}

/// Derives a 0-based character offset from a MySQL error message.
pub(crate) fn error_position(sql: &str, message: &str) -> Option<usize> {
    let caps = NEAR_AT_LINE.captures(message)?;
    let near = caps.get(1).map_or("", |m| m.as_str());
    let line: usize = caps.get(2)?.as_str().parse().ok()?;

    let line_start = line_start_byte(sql, line)?;
    let byte = if near.is_empty() {
        // "near ''" means the failure is at the end of the statement
        sql.len()
    } else {
        sql[line_start..]
            .find(near)
            .map_or(line_start, |found| line_start + found)
    };

    Some(sql[..byte].chars().count())
}

fn line_start_byte(sql: &str, line: usize) -> Option<usize> {
    if line <= 1 {
        return Some(0);
    }
    sql.match_indices('\n')
        .nth(line - 2)
        .map(|(idx, _)| idx + 1)
}
