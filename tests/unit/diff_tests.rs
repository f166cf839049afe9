//! Unit tests for diff synthesis around edit tools.

use serde_json::json;

use agent_bridge::diff::DiffSynthesizer;
use agent_bridge::models::update::{SessionUpdate, ToolCallContent};
use agent_bridge::translate::EventTranslator;

// ── Synthesizer ─────────────────────────────────────────────────────────────

/// Changed content yields a diff with both texts and consumes the snapshot.
#[tokio::test]
async fn changed_file_yields_diff() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("a.txt");
    std::fs::write(&path, "before\n").expect("write");

    let mut diffs = DiffSynthesizer::new();
    assert!(diffs.snapshot("t1", path.clone()).await);
    std::fs::write(&path, "after\n").expect("write");

    let diff = diffs.finish("t1").await;

    assert_eq!(
        diff,
        Some(ToolCallContent::Diff {
            path: path.display().to_string(),
            old_text: Some("before\n".into()),
            new_text: "after\n".into(),
        })
    );
    assert!(diffs.is_empty());
}

/// Unchanged content yields nothing, and the snapshot is still removed.
#[tokio::test]
async fn unchanged_file_yields_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("same.txt");
    std::fs::write(&path, "same\n").expect("write");

    let mut diffs = DiffSynthesizer::new();
    diffs.snapshot("t1", path).await;

    assert_eq!(diffs.finish("t1").await, None);
    assert!(diffs.is_empty());
}

/// A file that does not exist yet is not snapshotted.
#[tokio::test]
async fn missing_file_is_not_snapshotted() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut diffs = DiffSynthesizer::new();
    let taken = diffs.snapshot("t1", dir.path().join("new.txt")).await;

    assert!(!taken);
    assert_eq!(diffs.finish("t1").await, None);
}

/// Discarding drops the snapshot without reading the file.
#[tokio::test]
async fn discard_removes_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("a.txt");
    std::fs::write(&path, "x").expect("write");

    let mut diffs = DiffSynthesizer::new();
    diffs.snapshot("t1", path).await;
    assert_eq!(diffs.len(), 1);

    diffs.discard("t1");
    assert!(diffs.is_empty());
}

// ── Through the translator ──────────────────────────────────────────────────

fn start(id: &str, path: &str) -> serde_json::Value {
    json!({
        "type": "tool_execution_start", "toolCallId": id, "toolName": "edit",
        "args": {"path": path, "oldText": "before", "newText": "after"}
    })
}

fn end(id: &str, is_error: bool) -> serde_json::Value {
    json!({
        "type": "tool_execution_end", "toolCallId": id, "toolName": "edit",
        "result": {"content": [{"type": "text", "text": "Edited file"}]}, "isError": is_error
    })
}

fn completion_content(updates: &[SessionUpdate]) -> Vec<ToolCallContent> {
    match updates {
        [SessionUpdate::ToolCallUpdate {
            content: Some(content),
            ..
        }] => content.clone(),
        other => panic!("unexpected updates {other:?}"),
    }
}

/// An edit from "before\n" to "after\n" attaches a diff next to the text.
#[tokio::test]
async fn edit_completion_carries_diff() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("file.txt");
    std::fs::write(&path, "before\n").expect("write");
    let mut t = EventTranslator::new(dir.path(), vec!["edit".into()]);

    t.translate_value(&start("e1", "file.txt")).await;
    std::fs::write(&path, "after\n").expect("write");
    let updates = t.translate_value(&end("e1", false)).await;

    let content = completion_content(&updates);
    assert_eq!(content.len(), 2);
    assert!(matches!(
        &content[0],
        ToolCallContent::Diff { old_text: Some(old), new_text, .. }
            if old == "before\n" && new_text == "after\n"
    ));
    assert_eq!(content[1], ToolCallContent::text("Edited file"));
    assert!(t.diffs().is_empty());
}

/// An edit that leaves the file untouched has no diff block.
#[tokio::test]
async fn noop_edit_has_no_diff() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("file.txt"), "before\n").expect("write");
    let mut t = EventTranslator::new(dir.path(), vec!["edit".into()]);

    t.translate_value(&start("e2", "file.txt")).await;
    let updates = t.translate_value(&end("e2", false)).await;

    let content = completion_content(&updates);
    assert_eq!(content, vec![ToolCallContent::text("Edited file")]);
}

/// A failed edit never produces a diff and still frees its snapshot.
#[tokio::test]
async fn failed_edit_discards_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("file.txt");
    std::fs::write(&path, "before\n").expect("write");
    let mut t = EventTranslator::new(dir.path(), vec!["edit".into()]);

    t.translate_value(&start("e3", "file.txt")).await;
    std::fs::write(&path, "partial\n").expect("write");
    let updates = t.translate_value(&end("e3", true)).await;

    let content = completion_content(&updates);
    assert!(content.iter().all(|c| !matches!(c, ToolCallContent::Diff { .. })));
    assert!(t.diffs().is_empty());
}

/// A start replayed after the edit finished is ignored and leaves no snapshot.
#[tokio::test]
async fn repeated_start_after_completion_takes_no_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("file.txt");
    std::fs::write(&path, "before\n").expect("write");
    let mut t = EventTranslator::new(dir.path(), vec!["edit".into()]);

    t.translate_value(&start("e4", "file.txt")).await;
    std::fs::write(&path, "after\n").expect("write");
    t.translate_value(&end("e4", false)).await;
    assert!(t.diffs().is_empty());

    let updates = t.translate_value(&start("e4", "file.txt")).await;

    assert!(updates.is_empty(), "got {updates:?}");
    assert!(t.diffs().is_empty());
}
