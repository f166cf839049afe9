//! Integration tests for turn serialisation, queueing and cancellation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;

use agent_bridge::models::{PromptPayload, StopReason};
use agent_bridge::orchestrator::{TurnController, TurnOptions, TurnSnapshot};
use agent_bridge::rpc::RpcChannel;
use agent_bridge::translate::{Emitter, EventTranslator, UpdateSink};
use agent_bridge::AppError;

use super::test_helpers::{fake_channel, wait_until, RecordingSink};

const QUIET: Duration = Duration::from_millis(150);

fn start(channel: RpcChannel, sink: &Arc<RecordingSink>, options: TurnOptions) -> TurnController {
    let (emitter, _task) = Emitter::start("s1", Arc::clone(sink) as Arc<dyn UpdateSink>);
    let translator = EventTranslator::new("/work", vec!["edit".into(), "write".into()]);
    TurnController::start(channel, translator, emitter, options).0
}

fn prompt(controller: &TurnController, text: &str) -> JoinHandle<StopReason> {
    let controller = controller.clone();
    let payload = PromptPayload::text(text);
    tokio::spawn(async move { controller.prompt(payload).await })
}

async fn wait_for_queue(controller: &TurnController, queued: usize) {
    for _ in 0..500 {
        let snapshot = controller.snapshot().await.expect("snapshot");
        if snapshot.queued == queued {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("queue never reached {queued}");
}

// ── Single turn ─────────────────────────────────────────────────────────────

/// A prompt is forwarded, its text streamed once, and the turn ends normally.
#[tokio::test]
async fn prompt_streams_text_and_ends_turn() {
    let (channel, mut agent) = fake_channel("s1");
    let sink = Arc::new(RecordingSink::default());
    let controller = start(channel, &sink, TurnOptions::default());

    let turn = prompt(&controller, "hello");
    let command = agent.next_command().await;
    assert_eq!(command["type"], "prompt");
    assert_eq!(command["message"], "hello");
    agent.respond(&command, json!(null)).await;
    agent.say("Hi").await;

    assert_eq!(turn.await.expect("join"), StopReason::EndTurn);
    assert_eq!(sink.agent_texts(), vec!["Hi".to_owned()]);
    assert!(sink.notifications().iter().all(|n| n.session_id == "s1"));
}

/// Intermediate sub-turn ends do not resolve the prompt.
#[tokio::test]
async fn turn_end_does_not_resolve() {
    let (channel, mut agent) = fake_channel("s1");
    let sink = Arc::new(RecordingSink::default());
    let controller = start(channel, &sink, TurnOptions::default());

    let turn = prompt(&controller, "work");
    let command = agent.next_command().await;
    agent.respond(&command, json!(null)).await;
    agent.send(json!({"type": "turn_end"})).await;
    agent
        .send(json!({
            "type": "message_update",
            "assistantMessageEvent": {"type": "text_delta", "delta": "still going"}
        }))
        .await;
    wait_until(|| !sink.agent_texts().is_empty()).await;

    let snapshot = controller.snapshot().await.expect("snapshot");
    assert_eq!(
        snapshot,
        TurnSnapshot {
            active: true,
            cancelling: false,
            queued: 0
        }
    );
    assert!(!turn.is_finished());

    agent.send(json!({"type": "agent_end"})).await;
    assert_eq!(turn.await.expect("join"), StopReason::EndTurn);
}

/// Lines that are not events are ignored while the turn keeps streaming.
#[tokio::test]
async fn unrecognised_lines_do_not_disturb_turn() {
    let (channel, mut agent) = fake_channel("s1");
    let sink = Arc::new(RecordingSink::default());
    let controller = start(channel, &sink, TurnOptions::default());

    let turn = prompt(&controller, "hello");
    let command = agent.next_command().await;
    agent.respond(&command, json!(null)).await;
    agent.send(json!({"progress": 0.5})).await;
    agent.send(json!([1, 2])).await;
    agent.say("Hi").await;

    assert_eq!(turn.await.expect("join"), StopReason::EndTurn);
    assert_eq!(sink.agent_texts(), vec!["Hi".to_owned()]);
}

// ── Queueing ────────────────────────────────────────────────────────────────

/// Prompts sent during a turn run afterwards in FIFO order, with notices.
#[tokio::test]
async fn queued_prompts_run_in_order() {
    let (channel, mut agent) = fake_channel("s1");
    let sink = Arc::new(RecordingSink::default());
    let controller = start(channel, &sink, TurnOptions::default());

    let first = prompt(&controller, "first");
    let cmd = agent.next_command().await;
    let second = prompt(&controller, "second");
    wait_for_queue(&controller, 1).await;
    let third = prompt(&controller, "third");
    wait_for_queue(&controller, 2).await;

    assert_eq!(agent.try_next_command(QUIET).await, None);

    let mut cmd = cmd;
    for (expected, reply) in [("first", "one"), ("second", "two"), ("third", "three")] {
        assert_eq!(cmd["message"], expected);
        agent.respond(&cmd, json!(null)).await;
        agent.say(reply).await;
        if expected != "third" {
            cmd = agent.next_command().await;
        }
    }

    for turn in [first, second, third] {
        assert_eq!(turn.await.expect("join"), StopReason::EndTurn);
    }
    assert_eq!(
        sink.agent_texts(),
        vec![
            "Queued prompt (position 1)",
            "Queued prompt (position 2)",
            "one",
            "two",
            "three"
        ]
    );
}

/// Queue notices can be switched off.
#[tokio::test]
async fn queue_notice_is_optional() {
    let (channel, mut agent) = fake_channel("s1");
    let sink = Arc::new(RecordingSink::default());
    let controller = start(channel, &sink, TurnOptions { queue_notice: false });

    let first = prompt(&controller, "first");
    let cmd = agent.next_command().await;
    let second = prompt(&controller, "second");
    wait_for_queue(&controller, 1).await;

    agent.respond(&cmd, json!(null)).await;
    agent.say("one").await;
    let cmd = agent.next_command().await;
    agent.respond(&cmd, json!(null)).await;
    agent.say("two").await;

    assert_eq!(first.await.expect("join"), StopReason::EndTurn);
    assert_eq!(second.await.expect("join"), StopReason::EndTurn);
    assert_eq!(sink.agent_texts(), vec!["one", "two"]);
}

// ── Cancellation ────────────────────────────────────────────────────────────

/// Cancel aborts the active turn and drains the queue without sending it.
#[tokio::test]
async fn cancel_drains_queue_and_aborts() {
    let (channel, mut agent) = fake_channel("s1");
    let sink = Arc::new(RecordingSink::default());
    let controller = start(channel, &sink, TurnOptions::default());

    let active = prompt(&controller, "long task");
    let cmd = agent.next_command().await;
    agent.respond(&cmd, json!(null)).await;
    let queued_a = prompt(&controller, "queued a");
    let queued_b = prompt(&controller, "queued b");
    wait_for_queue(&controller, 2).await;

    let cancel = tokio::spawn({
        let controller = controller.clone();
        async move { controller.cancel().await }
    });

    assert_eq!(queued_a.await.expect("join"), StopReason::Cancelled);
    assert_eq!(queued_b.await.expect("join"), StopReason::Cancelled);

    let abort = agent.next_command().await;
    assert_eq!(abort["type"], "abort");
    agent.respond(&abort, json!(null)).await;
    cancel.await.expect("join").expect("cancel");

    let snapshot = controller.snapshot().await.expect("snapshot");
    assert!(snapshot.active && snapshot.cancelling);
    assert_eq!(snapshot.queued, 0);

    agent.send(json!({"type": "agent_end"})).await;
    assert_eq!(active.await.expect("join"), StopReason::Cancelled);
    assert_eq!(agent.try_next_command(QUIET).await, None);
}

/// Cancel with nothing running succeeds without contacting the agent.
#[tokio::test]
async fn cancel_when_idle_is_noop() {
    let (channel, mut agent) = fake_channel("s1");
    let sink = Arc::new(RecordingSink::default());
    let controller = start(channel, &sink, TurnOptions::default());

    controller.cancel().await.expect("cancel");

    assert_eq!(agent.try_next_command(QUIET).await, None);
}

/// A cancelled turn whose prompt then fails still reports cancellation.
#[tokio::test]
async fn cancel_wins_over_prompt_failure() {
    let (channel, mut agent) = fake_channel("s1");
    let sink = Arc::new(RecordingSink::default());
    let controller = start(channel, &sink, TurnOptions::default());

    let turn = prompt(&controller, "doomed");
    let cmd = agent.next_command().await;
    let cancel = tokio::spawn({
        let controller = controller.clone();
        async move { controller.cancel().await }
    });
    let abort = agent.next_command().await;
    agent.respond(&abort, json!(null)).await;
    cancel.await.expect("join").expect("cancel");

    agent.fail(&cmd, "aborted").await;

    assert_eq!(turn.await.expect("join"), StopReason::Cancelled);
}

// ── Failures ────────────────────────────────────────────────────────────────

/// A rejected prompt ends the turn with its error and the session stays usable.
#[tokio::test]
async fn prompt_failure_resolves_error() {
    let (channel, mut agent) = fake_channel("s1");
    let sink = Arc::new(RecordingSink::default());
    let controller = start(channel, &sink, TurnOptions::default());

    let turn = prompt(&controller, "first");
    let cmd = agent.next_command().await;
    agent.fail(&cmd, "model overloaded").await;

    assert_eq!(
        turn.await.expect("join"),
        StopReason::Error(AppError::Command {
            command: "prompt".into(),
            message: "model overloaded".into()
        })
    );

    let retry = prompt(&controller, "again");
    let cmd = agent.next_command().await;
    assert_eq!(cmd["message"], "again");
    agent.respond(&cmd, json!(null)).await;
    agent.say("ok").await;
    assert_eq!(retry.await.expect("join"), StopReason::EndTurn);
}

/// An agent exit mid-turn resolves the turn with the exit error.
#[tokio::test]
async fn process_exit_resolves_error() {
    let (channel, mut agent) = fake_channel("s1");
    let sink = Arc::new(RecordingSink::default());
    let controller = start(channel, &sink, TurnOptions::default());

    let turn = prompt(&controller, "crash");
    agent.next_command().await;
    agent.exit(Some(1));

    assert_eq!(
        turn.await.expect("join"),
        StopReason::Error(AppError::ProcessExited {
            code: Some(1),
            signal: None
        })
    );

    let after = controller.prompt(PromptPayload::text("again")).await;
    assert!(matches!(after, StopReason::Error(AppError::ProcessExited { .. })));
}
