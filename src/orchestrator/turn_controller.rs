//! Turn controller: one actor task per session that serialises prompts.
//!
//! The actor owns everything a session mutates while turns run: the active
//! turn, the FIFO queue behind it, the event translator and the session's
//! subscription to agent events. [`TurnController`] handles talk to it over
//! a control channel, so no state is shared and no locks are taken.
//!
//! A turn is forwarded to the agent as one `prompt` command and resolves
//! only when the agent reports `agent_end` (intermediate `turn_end` events
//! are bookkeeping), when the `prompt` command fails, or when the agent
//! process goes away. Before a turn resolves, every update generated so far
//! has been delivered.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::prompt::{PromptPayload, StopReason};
use crate::models::update::SessionUpdate;
use crate::rpc::protocol::{RpcCommand, RpcEvent};
use crate::rpc::{RpcChannel, Subscription};
use crate::translate::{Emitter, EventTranslator};
use crate::{AppError, Result};

const CONTROL_CAPACITY: usize = 64;

/// Behaviour switches for a session's turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnOptions {
    /// Emit `Queued prompt (position N)` when a prompt waits behind another.
    pub queue_notice: bool,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self { queue_notice: true }
    }
}

/// Point-in-time view of a session's turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnSnapshot {
    /// Whether a turn is running.
    pub active: bool,
    /// Whether cancellation was requested for the running turn.
    pub cancelling: bool,
    /// Turns waiting behind the running one.
    pub queued: usize,
}

enum Control {
    Prompt {
        payload: PromptPayload,
        reply: oneshot::Sender<StopReason>,
    },
    Cancel {
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<TurnSnapshot>,
    },
}

/// Handle to a session's turn actor. Cheap to clone; the actor stops once
/// every handle is dropped.
#[derive(Clone)]
pub struct TurnController {
    session_id: Arc<str>,
    control_tx: mpsc::Sender<Control>,
}

impl std::fmt::Debug for TurnController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnController")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl TurnController {
    /// Start the actor for `channel`.
    ///
    /// The event subscription is taken before this returns, so no event
    /// written by the agent afterwards is missed.
    pub fn start(
        channel: RpcChannel,
        translator: EventTranslator,
        emitter: Emitter,
        options: TurnOptions,
    ) -> (Self, JoinHandle<()>) {
        let session_id: Arc<str> = Arc::from(emitter.session_id());
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let events = channel.subscribe();

        let actor = TurnLoop {
            session_id: Arc::clone(&session_id),
            channel,
            events,
            events_open: true,
            translator,
            emitter,
            options,
            active: None,
            queue: VecDeque::new(),
            in_flight: None,
            generation: 0,
        };
        let task = tokio::spawn(actor.run(control_rx));

        (
            Self {
                session_id,
                control_tx,
            },
            task,
        )
    }

    /// Session this controller serves.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Run a prompt, waiting behind any active turn, and return how it ended.
    pub async fn prompt(&self, payload: PromptPayload) -> StopReason {
        let (reply, rx) = oneshot::channel();
        if self
            .control_tx
            .send(Control::Prompt { payload, reply })
            .await
            .is_err()
        {
            return StopReason::Error(AppError::Cancelled);
        }
        rx.await.unwrap_or(StopReason::Error(AppError::Cancelled))
    }

    /// Cancel the active turn and every queued one.
    ///
    /// Queued turns resolve `Cancelled` immediately and are never sent to the
    /// agent; the active turn resolves `Cancelled` once the agent winds down.
    ///
    /// # Errors
    ///
    /// Returns the failure of the `abort` command. Local state is already
    /// cleared when that happens.
    pub async fn cancel(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.control_tx
            .send(Control::Cancel { reply })
            .await
            .map_err(|_| AppError::Cancelled)?;
        rx.await.unwrap_or(Err(AppError::Cancelled))
    }

    /// Current turn state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cancelled` if the actor has stopped.
    pub async fn snapshot(&self) -> Result<TurnSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.control_tx
            .send(Control::Snapshot { reply })
            .await
            .map_err(|_| AppError::Cancelled)?;
        rx.await.map_err(|_| AppError::Cancelled)
    }
}

struct ActiveTurn {
    reply: oneshot::Sender<StopReason>,
    cancelled: bool,
    generation: u64,
}

struct QueuedTurn {
    payload: PromptPayload,
    reply: oneshot::Sender<StopReason>,
}

struct PromptCall {
    generation: u64,
    handle: JoinHandle<Result<Value>>,
}

struct TurnLoop {
    session_id: Arc<str>,
    channel: RpcChannel,
    events: Subscription,
    events_open: bool,
    translator: EventTranslator,
    emitter: Emitter,
    options: TurnOptions,
    active: Option<ActiveTurn>,
    queue: VecDeque<QueuedTurn>,
    in_flight: Option<PromptCall>,
    generation: u64,
}

/// Wait for the outstanding `prompt` command, if any.
async fn join_prompt(call: &mut Option<PromptCall>) -> (u64, Result<Value>) {
    let Some(call) = call.as_mut() else {
        return std::future::pending().await;
    };
    let result = (&mut call.handle)
        .await
        .unwrap_or_else(|err| Err(AppError::Protocol(format!("prompt task failed: {err}"))));
    (call.generation, result)
}

impl TurnLoop {
    async fn run(mut self, mut control_rx: mpsc::Receiver<Control>) {
        loop {
            tokio::select! {
                biased;

                control = control_rx.recv() => {
                    let Some(control) = control else { break };
                    self.handle_control(control).await;
                }

                line = self.events.recv(), if self.events_open => match line {
                    Some(line) => self.handle_line(&line).await,
                    None => self.handle_channel_closed().await,
                },

                (generation, result) = join_prompt(&mut self.in_flight), if self.in_flight.is_some() => {
                    self.in_flight = None;
                    self.handle_prompt_result(generation, result).await;
                }
            }
        }

        debug!(
            session_id = %self.session_id,
            queued = self.queue.len(),
            "turn controller stopped"
        );
    }

    async fn handle_control(&mut self, control: Control) {
        match control {
            Control::Prompt { payload, reply } => {
                if self.active.is_none() {
                    self.start_turn(payload, reply);
                    return;
                }
                self.queue.push_back(QueuedTurn { payload, reply });
                let position = self.queue.len();
                info!(session_id = %self.session_id, position, "prompt queued");
                if self.options.queue_notice {
                    self.emitter
                        .emit(SessionUpdate::agent_text(format!(
                            "Queued prompt (position {position})"
                        )))
                        .await;
                }
            }
            Control::Cancel { reply } => self.cancel(reply),
            Control::Snapshot { reply } => {
                let _ = reply.send(TurnSnapshot {
                    active: self.active.is_some(),
                    cancelling: self.active.as_ref().is_some_and(|t| t.cancelled),
                    queued: self.queue.len(),
                });
            }
        }
    }

    fn start_turn(&mut self, payload: PromptPayload, reply: oneshot::Sender<StopReason>) {
        self.generation += 1;
        let generation = self.generation;

        let command = RpcCommand::Prompt {
            message: payload.text,
            images: payload.attachments,
        };
        let channel = self.channel.clone();
        let handle = tokio::spawn(async move { channel.send(&command).await });

        self.active = Some(ActiveTurn {
            reply,
            cancelled: false,
            generation,
        });
        self.in_flight = Some(PromptCall { generation, handle });
        info!(session_id = %self.session_id, generation, "turn started");
    }

    fn cancel(&mut self, reply: oneshot::Sender<Result<()>>) {
        if let Some(turn) = self.active.as_mut() {
            turn.cancelled = true;
        }

        let drained = self.queue.len();
        for queued in self.queue.drain(..) {
            let _ = queued.reply.send(StopReason::Cancelled);
        }
        info!(
            session_id = %self.session_id,
            active = self.active.is_some(),
            drained,
            "cancel requested"
        );

        if self.active.is_none() {
            let _ = reply.send(Ok(()));
            return;
        }

        let channel = self.channel.clone();
        let session_id = Arc::clone(&self.session_id);
        tokio::spawn(async move {
            let result = channel.send(&RpcCommand::Abort).await.map(|_| ());
            if let Err(err) = &result {
                warn!(session_id = %session_id, %err, "abort failed");
            }
            let _ = reply.send(result);
        });
    }

    async fn handle_line(&mut self, line: &Value) {
        let Some(event) = RpcEvent::from_value(line) else {
            let event_type = line.get("type").and_then(Value::as_str);
            debug!(
                session_id = %self.session_id,
                event_type,
                "unrecognised agent event skipped"
            );
            return;
        };

        let updates = self.translator.translate(&event).await;
        self.emitter.emit_all(updates).await;

        match event {
            RpcEvent::AgentEnd => self.resolve(StopReason::EndTurn).await,
            RpcEvent::TurnEnd => debug!(session_id = %self.session_id, "sub-turn ended"),
            _ => {}
        }
    }

    async fn handle_prompt_result(&mut self, generation: u64, result: Result<Value>) {
        if self.active.as_ref().map(|t| t.generation) != Some(generation) {
            debug!(session_id = %self.session_id, generation, "stale prompt result ignored");
            return;
        }
        match result {
            Ok(_) => debug!(session_id = %self.session_id, generation, "prompt accepted"),
            Err(err) => {
                warn!(session_id = %self.session_id, generation, %err, "prompt command failed");
                self.resolve(StopReason::Error(err)).await;
            }
        }
    }

    async fn handle_channel_closed(&mut self) {
        self.events_open = false;
        let err = self.channel.closed().unwrap_or(AppError::ProcessExited {
            code: None,
            signal: None,
        });
        warn!(session_id = %self.session_id, %err, "agent event stream ended");
        self.resolve(StopReason::Error(err)).await;
    }

    /// Resolve the active turn and start the next queued one.
    async fn resolve(&mut self, outcome: StopReason) {
        let Some(turn) = self.active.take() else {
            debug!(session_id = %self.session_id, "no active turn to resolve");
            return;
        };

        if self
            .in_flight
            .as_ref()
            .is_some_and(|call| call.generation == turn.generation)
        {
            self.in_flight = None;
        }

        let reason = if turn.cancelled {
            StopReason::Cancelled
        } else {
            outcome
        };

        self.emitter.flush().await;
        info!(
            session_id = %self.session_id,
            generation = turn.generation,
            reason = ?reason,
            "turn resolved"
        );
        let _ = turn.reply.send(reason);

        if let Some(next) = self.queue.pop_front() {
            self.start_turn(next.payload, next.reply);
        }
    }
}
