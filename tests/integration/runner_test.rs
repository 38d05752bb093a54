//! Statement runner tests against the mock database client.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use sqlrun::classify::StatementKind;
use sqlrun::db::{DatabaseBackend, DatabaseClient, MockDatabaseClient};
use sqlrun::error::Error;
use sqlrun::query::{
    scan, CollectingSink, RunMode, RunState, RunStatus, RunnerConfig, StatementOutcome,
    StatementRunner,
};

const SCRIPT: &str = "\
USE shop;
CREATE TABLE items (id INT, name TEXT);
INSERT INTO items VALUES (1, 'a;b');
SELECT * FROM items;
";

fn mock_runner(client: MockDatabaseClient, abort: bool) -> (Arc<MockDatabaseClient>, StatementRunner) {
    let client = Arc::new(client);
    let runner = StatementRunner::new(
        client.clone(),
        RunnerConfig::default().with_abort_on_error(abort),
    );
    (client, runner)
}

#[tokio::test]
async fn test_run_whole_script() {
    let (client, mut runner) = mock_runner(MockDatabaseClient::new(), false);
    let mut sink = CollectingSink::new();

    let summary = runner
        .run_script(SCRIPT, RunMode::All, &mut sink)
        .await
        .unwrap();

    assert_eq!(
        client.executed(),
        vec![
            "USE shop",
            "CREATE TABLE items (id INT, name TEXT)",
            "INSERT INTO items VALUES (1, 'a;b')",
            "SELECT * FROM items",
        ]
    );
    assert_eq!(summary.executed, 4);
    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.current_database.as_deref(), Some("shop"));
    assert!(summary.schema_changed);

    let kinds: Vec<_> = sink
        .results
        .iter()
        .map(|r| r.classification.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            StatementKind::Session,
            StatementKind::Schema,
            StatementKind::Write,
            StatementKind::Read,
        ]
    );

    match &sink.results[3].outcome {
        StatementOutcome::Rows(rows) => assert_eq!(rows.row_count, 1),
        other => panic!("Expected rows, got {other:?}"),
    }
    assert_eq!(sink.summary.as_ref(), Some(&summary));
}

#[tokio::test]
async fn test_second_of_three_fails() {
    let buffer = "SELECT 1;\nSELECT nope FORM t;\nSELECT 3;";

    let (_, mut runner) = mock_runner(MockDatabaseClient::failing_on("FORM"), false);
    let mut sink = CollectingSink::new();
    let summary = runner
        .run_script(buffer, RunMode::All, &mut sink)
        .await
        .unwrap();
    assert_eq!(sink.results.len(), 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.status, RunStatus::Completed);

    let error = sink.results[1].error().unwrap();
    assert_eq!(error.buffer_offset, buffer.find("FORM").unwrap());

    let (_, mut runner) = mock_runner(MockDatabaseClient::failing_on("FORM"), true);
    let mut sink = CollectingSink::new();
    let summary = runner
        .run_script(buffer, RunMode::All, &mut sink)
        .await
        .unwrap();
    assert_eq!(sink.results.len(), 2);
    assert_eq!(summary.status, RunStatus::Aborted);
    assert_eq!(runner.state(), RunState::Finished(RunStatus::Aborted));
}

#[tokio::test]
async fn test_only_delimiters_is_empty_statement_set() {
    let (client, mut runner) = mock_runner(MockDatabaseClient::new(), false);
    let mut sink = CollectingSink::new();

    let result = runner.run_script(";;;", RunMode::All, &mut sink).await;

    assert!(matches!(result, Err(Error::EmptyStatementSet)));
    assert!(client.executed().is_empty());
}

#[tokio::test]
async fn test_caret_past_last_statement_runs_it() {
    let (client, mut runner) = mock_runner(MockDatabaseClient::new(), false);
    let mut sink = CollectingSink::new();

    runner
        .run_script(
            SCRIPT,
            RunMode::Current {
                caret: SCRIPT.len(),
            },
            &mut sink,
        )
        .await
        .unwrap();

    assert_eq!(client.executed(), vec!["SELECT * FROM items"]);
}

#[tokio::test]
async fn test_selection_outside_statements_is_empty() {
    let buffer = "SELECT 1;   \n\n";
    let ranges = scan(buffer, ";");
    let (_, mut runner) = mock_runner(MockDatabaseClient::new(), false);
    let mut sink = CollectingSink::new();

    let result = runner
        .run(
            buffer,
            &ranges,
            RunMode::Selection { start: 11, end: 13 },
            &mut sink,
        )
        .await;

    assert!(matches!(result, Err(Error::EmptyStatementSet)));
}

#[tokio::test]
async fn test_postgres_dialect_keeps_dollar_bodies_whole() {
    let client: Arc<dyn DatabaseClient> = Arc::new(MockDatabaseClient::new());
    let config = RunnerConfig {
        backend: DatabaseBackend::Postgres,
        ..RunnerConfig::default()
    };
    let mut runner = StatementRunner::new(client, config);
    let mut sink = CollectingSink::new();

    let buffer = "DO $$ BEGIN PERFORM 1; END $$;\nSELECT 2;";
    let summary = runner
        .run_script(buffer, RunMode::All, &mut sink)
        .await
        .unwrap();

    assert_eq!(summary.executed, 2);
    assert_eq!(sink.results[0].sql, "DO $$ BEGIN PERFORM 1; END $$");
}

#[tokio::test]
async fn test_postgres_json_operators_do_not_hide_statements() {
    let client = Arc::new(MockDatabaseClient::new());
    let config = RunnerConfig {
        backend: DatabaseBackend::Postgres,
        ..RunnerConfig::default()
    };
    let mut runner = StatementRunner::new(client.clone(), config);
    let mut sink = CollectingSink::new();

    let buffer = "SELECT data #> '{a}' FROM t; SELECT 'C:\\'; SELECT 2;";
    let summary = runner
        .run_script(buffer, RunMode::All, &mut sink)
        .await
        .unwrap();

    assert_eq!(summary.executed, 3);
    assert_eq!(
        client.executed(),
        vec!["SELECT data #> '{a}' FROM t", "SELECT 'C:\\'", "SELECT 2"]
    );
}

#[tokio::test]
async fn test_run_on_closed_client_records_connection_errors() {
    let (client, mut runner) = mock_runner(MockDatabaseClient::new(), false);
    client.close().await.unwrap();
    let mut sink = CollectingSink::new();

    let summary = runner
        .run_script("SELECT 1; SELECT 2;", RunMode::All, &mut sink)
        .await
        .unwrap();

    assert_eq!(summary.executed, 2);
    assert_eq!(summary.failed, 2);
    assert!(client.executed().is_empty());
    let error = sink.results[0].error().unwrap();
    assert!(error.message.contains("connection closed"), "{}", error.message);
}
