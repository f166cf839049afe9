//! Integration tests for the session lifecycle against scripted agents.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use agent_bridge::models::update::{ContentBlock, SessionUpdate};
use agent_bridge::models::StopReason;
use agent_bridge::orchestrator::{AgentLauncher, SessionManager};
use agent_bridge::persistence::{MemorySessionStore, SessionRecord, SessionStore};
use agent_bridge::translate::UpdateSink;
use agent_bridge::{AppError, GlobalConfig};

use super::test_helpers::{wait_until, RecordingSink, Script, ScriptedLauncher};

struct Fixture {
    manager: SessionManager,
    launcher: Arc<ScriptedLauncher>,
    store: Arc<MemorySessionStore>,
    sink: Arc<RecordingSink>,
    cwd: PathBuf,
    _dir: tempfile::TempDir,
}

fn fixture(script: Script) -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let launcher = Arc::new(ScriptedLauncher::new(script));
    let store = Arc::new(MemorySessionStore::new());
    let sink = Arc::new(RecordingSink::default());
    let manager = SessionManager::new(
        Arc::new(GlobalConfig::default()),
        Arc::clone(&launcher) as Arc<dyn AgentLauncher>,
        Arc::clone(&store) as Arc<dyn SessionStore>,
        Arc::clone(&sink) as Arc<dyn UpdateSink>,
    );
    Fixture {
        manager,
        launcher,
        store,
        sink,
        cwd: dir.path().to_path_buf(),
        _dir: dir,
    }
}

fn hello() -> Vec<ContentBlock> {
    vec![ContentBlock::text("fix the build\nand run the tests")]
}

// ── Creation ────────────────────────────────────────────────────────────────

/// A new session launches an agent in the cwd, stores it and publishes commands.
#[tokio::test]
async fn new_session_registers_and_stores() {
    let f = fixture(Script::default());

    let info = f.manager.new_session(f.cwd.clone()).await.expect("new session");

    assert_eq!(f.launcher.launches(), vec![(info.session_id.clone(), f.cwd.clone())]);
    assert_eq!(f.manager.session_ids(), vec![info.session_id.clone()]);
    assert_eq!(
        info.state.session_file,
        Some(f.cwd.join(".sessions").join(format!("{}.jsonl", info.session_id)))
    );

    let record = f.store.get(&info.session_id).expect("get").expect("stored");
    assert_eq!(record.cwd, f.cwd);
    assert_eq!(record.session_file, info.state.session_file);

    wait_until(|| {
        f.sink
            .updates()
            .iter()
            .any(|u| matches!(u, SessionUpdate::AvailableCommandsUpdate { .. }))
    })
    .await;
}

/// Sessions get distinct ids and independent agents.
#[tokio::test]
async fn sessions_are_independent() {
    let f = fixture(Script::default());

    let a = f.manager.new_session(f.cwd.clone()).await.expect("a");
    let b = f.manager.new_session(f.cwd.clone()).await.expect("b");

    assert_ne!(a.session_id, b.session_id);
    assert_eq!(f.manager.session_ids().len(), 2);
    assert_eq!(f.launcher.launches().len(), 2);
}

// ── Prompting ───────────────────────────────────────────────────────────────

/// The first prompt names the session before the turn's own updates.
#[tokio::test]
async fn first_prompt_names_session() {
    let f = fixture(Script::default());
    let info = f.manager.new_session(f.cwd.clone()).await.expect("new session");

    let stop = f.manager.prompt(&info.session_id, &hello()).await.expect("prompt");
    assert_eq!(stop, StopReason::EndTurn);

    let updates = f.sink.updates();
    let title_at = updates
        .iter()
        .position(|u| matches!(u, SessionUpdate::SessionInfoUpdate { title: Some(t), .. } if t == "fix the build"))
        .expect("title update");
    let hi_at = updates
        .iter()
        .position(|u| u == &SessionUpdate::agent_text("Hi"))
        .expect("agent text");
    assert!(title_at < hi_at);

    let record = f.store.get(&info.session_id).expect("get").expect("stored");
    assert_eq!(record.title.as_deref(), Some("fix the build"));
    wait_until(|| f.launcher.command_types().iter().any(|t| t == "set_session_name")).await;

    let prompt = f
        .launcher
        .commands()
        .into_iter()
        .find(|c| c["type"] == "prompt")
        .expect("prompt command");
    assert_eq!(prompt["message"], "fix the build\nand run the tests");
}

/// Later prompts do not rename the session.
#[tokio::test]
async fn later_prompts_keep_title() {
    let f = fixture(Script::default());
    let info = f.manager.new_session(f.cwd.clone()).await.expect("new session");

    f.manager.prompt(&info.session_id, &hello()).await.expect("first");
    f.manager
        .prompt(&info.session_id, &[ContentBlock::text("something else")])
        .await
        .expect("second");

    let titles = f
        .sink
        .updates()
        .into_iter()
        .filter(|u| matches!(u, SessionUpdate::SessionInfoUpdate { .. }))
        .count();
    assert_eq!(titles, 1);
    assert_eq!(f.sink.agent_texts(), vec!["Hi", "Hi"]);
}

/// Unknown sessions are reported as not found.
#[tokio::test]
async fn unknown_session_is_not_found() {
    let f = fixture(Script::default());

    let err = f.manager.prompt("nope", &hello()).await.expect_err("unknown");
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(matches!(f.manager.cancel("nope").await, Err(AppError::NotFound(_))));
}

/// Credential failures on prompt surface as an authentication error.
#[tokio::test]
async fn prompt_auth_failure_is_reported() {
    let f = fixture(Script {
        prompt_error: Some("No API key found for anthropic".into()),
        ..Script::default()
    });
    let info = f.manager.new_session(f.cwd.clone()).await.expect("new session");

    let stop = f.manager.prompt(&info.session_id, &hello()).await.expect("prompt");

    assert!(matches!(stop, StopReason::Error(AppError::AuthRequired(_))), "got {stop:?}");
}

// ── Loading ─────────────────────────────────────────────────────────────────

/// Loading resumes the stored state file and replays the conversation.
#[tokio::test]
async fn load_session_resumes_and_replays() {
    let f = fixture(Script {
        messages: vec![
            json!({"role": "user", "content": "hello"}),
            json!({"role": "assistant", "content": [{"type": "text", "text": "Hi there"}]}),
        ],
        ..Script::default()
    });
    let state_file = f.cwd.join("old.jsonl");
    std::fs::write(&state_file, "").expect("write state file");
    let mut record = SessionRecord::new("stored-1", f.cwd.clone(), Some(state_file.clone()));
    record.title = Some("earlier work".into());
    f.store.put(record).expect("seed");

    let info = f
        .manager
        .load_session("stored-1", f.cwd.clone())
        .await
        .expect("load");

    assert_eq!(info.session_id, "stored-1");
    let switch = f
        .launcher
        .commands()
        .into_iter()
        .find(|c| c["type"] == "switch_session")
        .expect("switch_session sent");
    assert_eq!(switch["sessionPath"], state_file.display().to_string());

    let updates = f.sink.updates();
    assert_eq!(
        updates[..2],
        [
            SessionUpdate::UserMessageChunk {
                content: ContentBlock::text("hello")
            },
            SessionUpdate::agent_text("Hi there"),
        ]
    );

    f.manager.prompt("stored-1", &hello()).await.expect("prompt");
    assert!(!f
        .sink
        .updates()
        .iter()
        .any(|u| matches!(u, SessionUpdate::SessionInfoUpdate { .. })));
}

/// Loading an unknown session fails without launching anything.
#[tokio::test]
async fn load_unknown_session_fails() {
    let f = fixture(Script::default());

    let err = f
        .manager
        .load_session("missing", f.cwd.clone())
        .await
        .expect_err("unknown");

    assert!(matches!(err, AppError::NotFound(_)));
    assert!(f.launcher.launches().is_empty());
}

/// A record whose state file was deleted is dropped instead of resumed.
#[tokio::test]
async fn load_with_deleted_state_file_forgets_record() {
    let f = fixture(Script::default());
    let record = SessionRecord::new("stored-2", f.cwd.clone(), Some(f.cwd.join("gone.jsonl")));
    f.store.put(record).expect("seed");

    let err = f
        .manager
        .load_session("stored-2", f.cwd.clone())
        .await
        .expect_err("state file missing");

    assert!(matches!(err, AppError::NotFound(_)), "got {err:?}");
    assert!(f.launcher.launches().is_empty());
    assert_eq!(f.store.get("stored-2").expect("get"), None);
}

/// A load whose history cannot be fetched leaves no live session behind.
#[tokio::test]
async fn load_failing_history_closes_session() {
    let f = fixture(Script {
        messages_error: Some("history unavailable".into()),
        ..Script::default()
    });
    f.store
        .put(SessionRecord::new("stored-3", f.cwd.clone(), None))
        .expect("seed");

    let err = f
        .manager
        .load_session("stored-3", f.cwd.clone())
        .await
        .expect_err("history fails");

    assert!(matches!(err, AppError::Command { .. }), "got {err:?}");
    assert!(f.manager.session_ids().is_empty());
    assert!(matches!(
        f.manager.prompt("stored-3", &hello()).await,
        Err(AppError::NotFound(_))
    ));
}

// ── Agent controls ──────────────────────────────────────────────────────────

/// Model and thinking changes are forwarded as agent commands.
#[tokio::test]
async fn model_controls_are_forwarded() {
    let f = fixture(Script::default());
    let info = f.manager.new_session(f.cwd.clone()).await.expect("new session");

    f.manager
        .set_model(&info.session_id, "openai", "gpt-5")
        .await
        .expect("set model");
    f.manager
        .set_thinking_level(&info.session_id, "high")
        .await
        .expect("thinking");
    let models = f.manager.available_models(&info.session_id).await.expect("models");
    let export = f.manager.export_html(&info.session_id, None).await.expect("export");

    let commands = f.launcher.commands();
    let set_model = commands.iter().find(|c| c["type"] == "set_model").expect("set_model");
    assert_eq!(set_model["provider"], "openai");
    assert_eq!(set_model["modelId"], "gpt-5");
    let thinking = commands
        .iter()
        .find(|c| c["type"] == "set_thinking_level")
        .expect("set_thinking_level");
    assert_eq!(thinking["level"], "high");
    assert_eq!(models.len(), 2);
    assert_eq!(export, PathBuf::from("/tmp/session.html"));
}

// ── Closing ─────────────────────────────────────────────────────────────────

/// Closing forgets the session and is reported only once.
#[tokio::test]
async fn close_session_forgets_it() {
    let f = fixture(Script::default());
    let info = f.manager.new_session(f.cwd.clone()).await.expect("new session");

    assert!(f.manager.close_session(&info.session_id).await);
    assert!(!f.manager.close_session(&info.session_id).await);
    assert!(f.manager.session_ids().is_empty());
    assert!(matches!(
        f.manager.prompt(&info.session_id, &hello()).await,
        Err(AppError::NotFound(_))
    ));
    assert_eq!(f.manager.stored_sessions().expect("stored").len(), 1);
}
