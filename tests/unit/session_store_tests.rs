//! Unit tests for the session stores.

use std::path::PathBuf;

use chrono::{Duration, Utc};

use agent_bridge::persistence::{JsonSessionStore, MemorySessionStore, SessionRecord, SessionStore};
use agent_bridge::AppError;

fn record(id: &str, minutes_ago: i64) -> SessionRecord {
    let mut record = SessionRecord::new(
        id,
        PathBuf::from("/work"),
        Some(PathBuf::from(format!("/state/{id}.jsonl"))),
    );
    record.updated_at = Utc::now() - Duration::minutes(minutes_ago);
    record
}

fn exercise(store: &dyn SessionStore) {
    store.put(record("old", 30)).expect("put old");
    store.put(record("new", 1)).expect("put new");
    store.put(record("mid", 10)).expect("put mid");

    let ids: Vec<_> = store
        .list()
        .expect("list")
        .into_iter()
        .map(|r| r.session_id)
        .collect();
    assert_eq!(ids, vec!["new", "mid", "old"]);

    let mut titled = store.get("mid").expect("get").expect("mid exists");
    titled.title = Some("fix the build".into());
    store.put(titled).expect("replace");
    assert_eq!(
        store.get("mid").expect("get").and_then(|r| r.title).as_deref(),
        Some("fix the build")
    );

    assert!(store.remove("old").expect("remove"));
    assert!(!store.remove("old").expect("second remove"));
    assert_eq!(store.get("old").expect("get"), None);
}

// ── Memory store ────────────────────────────────────────────────────────────

/// The in-memory store honours the repository contract.
#[test]
fn memory_store_contract() {
    exercise(&MemorySessionStore::new());
}

// ── JSON store ──────────────────────────────────────────────────────────────

/// The file store honours the repository contract.
#[test]
fn json_store_contract() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = JsonSessionStore::open(dir.path().join("sessions.json")).expect("open");
    exercise(&store);
}

/// Records survive reopening the store.
#[test]
fn json_store_persists_across_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("sessions.json");

    {
        let store = JsonSessionStore::open(&path).expect("open");
        store.put(record("s1", 0)).expect("put");
    }

    let reopened = JsonSessionStore::open(&path).expect("reopen");
    let found = reopened.get("s1").expect("get").expect("s1 persisted");
    assert_eq!(found.session_file, Some(PathBuf::from("/state/s1.jsonl")));
    assert_eq!(reopened.path(), path.as_path());
}

/// A missing or empty file opens as an empty store.
#[test]
fn json_store_missing_or_empty_file_is_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = JsonSessionStore::open(dir.path().join("none.json")).expect("open missing");
    assert!(missing.list().expect("list").is_empty());

    let empty_path = dir.path().join("empty.json");
    std::fs::write(&empty_path, "  \n").expect("write");
    let empty = JsonSessionStore::open(&empty_path).expect("open empty");
    assert!(empty.list().expect("list").is_empty());
}

/// A corrupt file is a persistence error, not an empty store.
#[test]
fn json_store_rejects_corrupt_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sessions.json");
    std::fs::write(&path, "{not json").expect("write");

    let err = JsonSessionStore::open(&path).expect_err("corrupt store");
    assert!(matches!(err, AppError::Persistence(_)), "got {err:?}");
}
