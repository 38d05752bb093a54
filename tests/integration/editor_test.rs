//! Editor snapshot tests: query lookup, selection and running from the caret.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use sqlrun::db::MockDatabaseClient;
use sqlrun::editor::{EditorSnapshot, Selection};
use sqlrun::query::{CollectingSink, RunnerConfig, StatementRunner, StatementScanner};

const BUFFER: &str = "\
SELECT id
  FROM users;

-- recent orders
SELECT * FROM orders
 WHERE created_at > NOW() - INTERVAL 1 DAY;
";

#[test]
fn test_current_query_skips_leading_comment() {
    let caret = BUFFER.find("WHERE").unwrap();
    let snap = EditorSnapshot::new(BUFFER, Selection::caret(caret), &StatementScanner::default());

    let range = snap.current_query().unwrap();
    assert!(range.look_behind_applied);
    assert!(range.text(BUFFER).starts_with("SELECT * FROM orders"));
    assert_eq!(snap.number_of_queries(), 2);
}

#[test]
fn test_caret_on_comment_line_looks_behind() {
    let caret = BUFFER.find("recent").unwrap();
    let snap = EditorSnapshot::new(BUFFER, Selection::caret(caret), &StatementScanner::default());

    assert_eq!(
        snap.query_at_position(caret, true),
        Some("SELECT id\n  FROM users")
    );
    assert!(snap
        .query_at_position(caret, false)
        .unwrap()
        .starts_with("SELECT * FROM orders"));
}

#[tokio::test]
async fn test_run_from_editor_selection() {
    let start = BUFFER.find("users").unwrap();
    let end = BUFFER.find("WHERE").unwrap();
    let snap = EditorSnapshot::new(BUFFER, Selection::new(start, end), &StatementScanner::default());

    let client = Arc::new(MockDatabaseClient::new());
    let mut runner = StatementRunner::new(client.clone(), RunnerConfig::default());
    let mut sink = CollectingSink::new();
    let text = snap.shared_text();

    let summary = runner
        .run(&text, snap.ranges(), snap.run_mode(), &mut sink)
        .await
        .unwrap();

    assert_eq!(summary.executed, 2);
    assert_eq!(client.executed().len(), 2);
}

#[test]
fn test_comment_out_then_rescan() {
    let caret = BUFFER.find("FROM users").unwrap();
    let snap = EditorSnapshot::new(BUFFER, Selection::caret(caret), &StatementScanner::default());

    let edit = snap.comment_out_current_query(false).unwrap();
    let edited = edit.apply(BUFFER);

    let after = EditorSnapshot::new(edited.as_str(), Selection::caret(0), &StatementScanner::default());
    assert_eq!(after.number_of_queries(), 1);
}
