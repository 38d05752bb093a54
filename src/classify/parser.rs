//! SQL parsing and classification logic.
//!
//! Uses sqlparser-rs with the dialect of the connected backend. Statements
//! the parser rejects (stored program bodies, vendor extensions) fall back to
//! their leading keyword.

use std::sync::LazyLock;

use regex::Regex;
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;
use tracing::debug;

use crate::db::DatabaseBackend;

use super::{Classification, StatementKind};

static USE_DATABASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?i:use)\s+(?:`([^`]+)`|"([^"]+)"|([^\s;`"]+))\s*$"#)
        .expect("valid USE pattern")
});

/// SQL classifier for one backend dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlClassifier {
    backend: DatabaseBackend,
}

impl SqlClassifier {
    /// Creates a classifier that parses with the dialect of `backend`.
    pub fn new(backend: DatabaseBackend) -> Self {
        Self { backend }
    }

    /// Classifies one statement.
    pub fn classify(&self, sql: &str) -> Classification {
        let keyword = first_keyword(sql);

        if let Some(database) = use_target(sql) {
            return Classification {
                kind: StatementKind::Session,
                keyword,
                database: Some(database),
            };
        }

        let parsed = match self.backend {
            DatabaseBackend::MySql => parse_kind(&MySqlDialect {}, sql),
            DatabaseBackend::Postgres => parse_kind(&PostgreSqlDialect {}, sql),
        };

        let kind = parsed.unwrap_or_else(|| {
            debug!(keyword = %keyword, "Falling back to keyword classification");
            classify_keyword(&keyword)
        });
        Classification::new(kind, keyword)
    }
}

/// Convenience function to classify SQL without creating a classifier instance.
pub fn classify_sql(sql: &str, backend: DatabaseBackend) -> Classification {
    SqlClassifier::new(backend).classify(sql)
}

fn parse_kind(dialect: &dyn Dialect, sql: &str) -> Option<StatementKind> {
    let statements = Parser::parse_sql(dialect, sql).ok()?;
    match statements.as_slice() {
        [statement] => classify_statement(statement),
        _ => None,
    }
}

fn classify_statement(statement: &Statement) -> Option<StatementKind> {
    let kind = match statement {
        Statement::Query(_)
        | Statement::Explain { .. }
        | Statement::ExplainTable { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. } => StatementKind::Read,

        Statement::Insert(_)
        | Statement::Update { .. }
        | Statement::Delete(_)
        | Statement::Merge { .. }
        | Statement::Truncate { .. }
        | Statement::Copy { .. } => StatementKind::Write,

        Statement::CreateTable { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateView { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateFunction { .. }
        | Statement::CreateProcedure { .. }
        | Statement::CreateSequence { .. }
        | Statement::CreateType { .. }
        | Statement::AlterTable { .. }
        | Statement::AlterIndex { .. }
        | Statement::AlterView { .. }
        | Statement::Drop { .. }
        | Statement::DropFunction { .. }
        | Statement::Comment { .. } => StatementKind::Schema,

        Statement::SetVariable { .. }
        | Statement::SetNames { .. }
        | Statement::SetNamesDefault { .. }
        | Statement::SetTimeZone { .. }
        | Statement::SetRole { .. }
        | Statement::Use { .. } => StatementKind::Session,

        Statement::StartTransaction { .. }
        | Statement::SetTransaction { .. }
        | Statement::Commit { .. }
        | Statement::Rollback { .. }
        | Statement::Savepoint { .. }
        | Statement::ReleaseSavepoint { .. } => StatementKind::Transaction,

        _ => return None,
    };
    Some(kind)
}

/// Classifies by leading keyword when the statement did not parse.
fn classify_keyword(keyword: &str) -> StatementKind {
    match keyword {
        "SELECT" | "SHOW" | "EXPLAIN" | "DESCRIBE" | "DESC" | "WITH" | "TABLE" | "VALUES"
        | "HELP" | "CHECKSUM" => StatementKind::Read,
        "INSERT" | "UPDATE" | "DELETE" | "REPLACE" | "TRUNCATE" | "MERGE" | "COPY" | "LOAD"
        | "CALL" | "DO" => StatementKind::Write,
        "CREATE" | "ALTER" | "DROP" | "RENAME" | "COMMENT" => StatementKind::Schema,
        "USE" | "SET" | "RESET" => StatementKind::Session,
        "BEGIN" | "START" | "COMMIT" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" | "END"
        | "ABORT" => StatementKind::Transaction,
        _ => StatementKind::Other,
    }
}

/// Returns the leading keyword in upper case.
///
/// Opening parentheses and the `/*!NNNNN` prefix of a MySQL conditional
/// comment are skipped.
fn first_keyword(sql: &str) -> String {
    let mut rest = sql.trim_start();
    loop {
        if let Some(inner) = rest.strip_prefix("/*!") {
            rest = inner.trim_start_matches(|c: char| c.is_ascii_digit()).trim_start();
        } else if let Some(inner) = rest.strip_prefix('(') {
            rest = inner.trim_start();
        } else {
            break;
        }
    }

    rest.chars()
        .take_while(|c| c.is_ascii_alphabetic() || *c == '_')
        .collect::<String>()
        .to_uppercase()
}

/// Returns the database named by a `USE` statement.
fn use_target(sql: &str) -> Option<String> {
    let caps = USE_DATABASE.captures(sql.trim())?;
    (1..=3)
        .find_map(|i| caps.get(i))
        .map(|m| m.as_str().to_string())
}
