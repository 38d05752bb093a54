//! Database abstraction layer for sqlrun.
//!
//! Provides a trait-based interface for statement execution, allowing
//! different database backends to be used interchangeably by the runner.

mod mock;
mod mysql;
mod postgres;
mod types;

pub use mock::{FailingDatabaseClient, MockDatabaseClient};
pub use mysql::MySqlClient;
pub use postgres::PostgresClient;
pub use types::{ColumnInfo, QueryResult, Row, Value};
pub(crate) use types::duration_serde;

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::query::scanner::ScanOptions;
use async_trait::async_trait;

/// Maximum rows kept from a single result set.
pub const MAX_ROWS: usize = 1000;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    #[serde(alias = "mariadb")]
    MySql,
    #[serde(alias = "postgresql")]
    Postgres,
}

impl DatabaseBackend {
    /// Returns the backend as a string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Some(Self::MySql),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }

    /// Returns the default port for this backend.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::MySql => 3306,
            Self::Postgres => 5432,
        }
    }

    /// Returns the URL scheme for this backend.
    pub fn url_scheme(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
        }
    }

    /// Returns the client environment variables for host, port, database,
    /// user and password, in that order.
    pub fn env_vars(&self) -> [&'static str; 5] {
        match self {
            Self::MySql => [
                "MYSQL_HOST",
                "MYSQL_TCP_PORT",
                "MYSQL_DATABASE",
                "MYSQL_USER",
                "MYSQL_PWD",
            ],
            Self::Postgres => ["PGHOST", "PGPORT", "PGDATABASE", "PGUSER", "PGPASSWORD"],
        }
    }

    /// Returns the lexical rules the scanner applies for this dialect.
    pub fn scan_options(&self) -> ScanOptions {
        match self {
            Self::MySql => ScanOptions::mysql(),
            Self::Postgres => ScanOptions::postgres(),
        }
    }
}

/// Creates a database client for the given backend and configuration.
///
/// This is the central factory function for database connections.
pub async fn connect(config: &ConnectionConfig) -> Result<Box<dyn DatabaseClient>> {
    match config.backend {
        DatabaseBackend::MySql => {
            let client = MySqlClient::connect(config).await?;
            Ok(Box::new(client))
        }
        DatabaseBackend::Postgres => {
            let client = PostgresClient::connect(config).await?;
            Ok(Box::new(client))
        }
    }
}

/// Trait defining the interface for database clients.
///
/// Implementations keep one session: statements sent through the same
/// client observe each other's session state (`USE`, `SET`, open
/// transactions).
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Executes one SQL statement and returns its result.
    ///
    /// Server-side failures are returned as `Error::Query`, carrying the
    /// character position of the error inside `sql` when the server reports
    /// one.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}
