//! Live database tests.
//!
//! These need DATABASE_URL pointing at a MySQL or PostgreSQL server and are
//! skipped otherwise. They only create temporary tables.

use std::sync::Arc;

use sqlrun::config::ConnectionConfig;
use sqlrun::db::{self, DatabaseBackend, DatabaseClient, Value};
use sqlrun::query::{CollectingSink, RunMode, RunStatus, RunnerConfig, StatementRunner};

/// Helper to create a test client and the backend it talks to.
async fn get_test_client() -> Option<(Arc<dyn DatabaseClient>, DatabaseBackend)> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let config = ConnectionConfig::from_connection_string(&url).ok()?;
    let client = db::connect(&config).await.ok()?;
    Some((Arc::from(client), config.backend))
}

#[tokio::test]
async fn test_execute_simple_select() {
    let Some((client, _)) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = client
        .execute_query("SELECT 1 AS num, 'hello' AS greeting")
        .await
        .unwrap();

    assert_eq!(result.columns.len(), 2);
    assert_eq!(result.columns[0].name, "num");
    assert_eq!(result.columns[1].name, "greeting");
    assert_eq!(result.row_count, 1);
    assert_eq!(result.rows[0][1], Value::String("hello".to_string()));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_script_shares_one_session() {
    let Some((client, backend)) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let script = "\
CREATE TEMPORARY TABLE sqlrun_items (id INT, note VARCHAR(20));
INSERT INTO sqlrun_items VALUES (1, 'a;b'), (2, 'c');
UPDATE sqlrun_items SET note = 'd' WHERE id = 2;
SELECT note FROM sqlrun_items ORDER BY id;
";
    let config = RunnerConfig {
        backend,
        ..RunnerConfig::default()
    };
    let mut runner = StatementRunner::new(client.clone(), config);
    let mut sink = CollectingSink::new();

    let summary = runner
        .run_script(script, RunMode::All, &mut sink)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.failed, 0, "{:#?}", sink.results);
    assert_eq!(summary.affected_rows, 3);
    assert!(summary.schema_changed);

    let last = sink.results.last().unwrap();
    match &last.outcome {
        sqlrun::query::StatementOutcome::Rows(rows) => {
            assert_eq!(rows.rows[0][0].to_display_string(), "a;b");
            assert_eq!(rows.rows[1][0].to_display_string(), "d");
        }
        other => panic!("Expected rows, got {other:?}"),
    }

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_server_error_maps_into_buffer() {
    let Some((client, backend)) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let script = "SELECT 1;\nSELECT 2 FORM nowhere;\nSELECT 3;";
    let config = RunnerConfig {
        backend,
        ..RunnerConfig::default()
    };
    let mut runner = StatementRunner::new(client.clone(), config);
    let mut sink = CollectingSink::new();

    let summary = runner
        .run_script(script, RunMode::All, &mut sink)
        .await
        .unwrap();

    assert_eq!(summary.executed, 3);
    assert_eq!(summary.failed, 1);

    let error = sink.results[1].error().unwrap();
    assert!(error.buffer_offset >= script.find("SELECT 2").unwrap());
    assert!(error.buffer_offset <= script.find("nowhere").unwrap() + "nowhere".len());

    client.close().await.unwrap();
}
