//! Session lifecycle: create, load, prompt, cancel, close.
//!
//! Each live session owns one agent process, one turn controller and one
//! emission chain; sessions share nothing but the injected store and sink.
//! The session map lock is never held across an await.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{AgentConfig, GlobalConfig};
use crate::models::prompt::{PromptPayload, StopReason};
use crate::models::update::{AvailableCommand, ContentBlock, SessionUpdate};
use crate::orchestrator::turn_controller::{TurnController, TurnOptions};
use crate::persistence::{SessionRecord, SessionStore};
use crate::rpc::protocol::{list_payload, AgentCommand, AgentState, ModelInfo, RpcCommand};
use crate::rpc::spawner::SpawnConfig;
use crate::rpc::RpcChannel;
use crate::translate::history::replay_messages;
use crate::translate::{Emitter, EventTranslator, UpdateSink};
use crate::{AppError, Result};

/// Longest session title derived from a prompt.
pub const TITLE_MAX_CHARS: usize = 60;

/// Starts agent processes for sessions.
pub trait AgentLauncher: Send + Sync {
    /// Start an agent for `session_id` running in `cwd`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` when the agent cannot be started.
    fn launch(&self, session_id: &str, cwd: &Path) -> Result<RpcChannel>;
}

/// Launches the configured agent executable as a child process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    agent: AgentConfig,
}

impl ProcessLauncher {
    /// Launcher for `agent`.
    #[must_use]
    pub fn new(agent: AgentConfig) -> Self {
        Self { agent }
    }
}

impl AgentLauncher for ProcessLauncher {
    fn launch(&self, session_id: &str, cwd: &Path) -> Result<RpcChannel> {
        RpcChannel::spawn(
            session_id,
            &SpawnConfig::from_agent(&self.agent, cwd.to_path_buf()),
        )
    }
}

/// Result of creating or loading a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Bridge session id.
    pub session_id: String,
    /// Agent state reported by the handshake.
    pub state: AgentState,
}

/// One live session.
#[derive(Debug)]
pub struct LiveSession {
    session_id: String,
    cwd: PathBuf,
    channel: RpcChannel,
    turns: TurnController,
    emitter: Emitter,
    titled: AtomicBool,
}

impl LiveSession {
    /// Bridge session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Project directory of the agent.
    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Agent channel.
    #[must_use]
    pub fn channel(&self) -> &RpcChannel {
        &self.channel
    }

    /// Turn controller.
    #[must_use]
    pub fn turns(&self) -> &TurnController {
        &self.turns
    }
}

/// Registry of live sessions.
pub struct SessionManager {
    config: Arc<GlobalConfig>,
    launcher: Arc<dyn AgentLauncher>,
    store: Arc<dyn SessionStore>,
    sink: Arc<dyn UpdateSink>,
    sessions: Mutex<HashMap<String, Arc<LiveSession>>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.session_ids())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Manager delivering every session's updates into `sink`.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        launcher: Arc<dyn AgentLauncher>,
        store: Arc<dyn SessionStore>,
        sink: Arc<dyn UpdateSink>,
    ) -> Self {
        Self {
            config,
            launcher,
            store,
            sink,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<LiveSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ids of the live sessions.
    #[must_use]
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Look up a live session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown id.
    pub fn session(&self, session_id: &str) -> Result<Arc<LiveSession>> {
        self.lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("session {session_id}")))
    }

    /// Stored sessions, most recent first.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn stored_sessions(&self) -> Result<Vec<SessionRecord>> {
        self.store.list()
    }

    /// Start a new agent in `cwd` and register the session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` when the agent cannot be started, or the
    /// handshake failure.
    pub async fn new_session(&self, cwd: PathBuf) -> Result<SessionInfo> {
        let session_id = Uuid::new_v4().to_string();
        let span = info_span!("new_session", session_id = session_id.as_str());

        async {
            let channel = self.launcher.launch(&session_id, &cwd)?;
            let state = channel.handshake().await?;

            let record = SessionRecord::new(&session_id, cwd.clone(), state.session_file.clone());
            if let Err(err) = self.store.put(record) {
                warn!(%err, "failed to record session");
            }

            let session = self.attach(&session_id, cwd, channel, false);
            self.publish_commands(&session).await;

            info!(session_file = ?state.session_file, "session created");
            Ok::<_, AppError>(SessionInfo { session_id, state })
        }
        .instrument(span)
        .await
    }

    /// Resume a stored session in `cwd` and replay its history.
    ///
    /// A session that is already live is restarted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when the store has no such session or
    /// its state file no longer exists (the record is then dropped),
    /// `AppError::Spawn` when the agent cannot be started, or the failure of
    /// the resume commands. A session whose history cannot be fetched is
    /// closed again before the error is returned.
    pub async fn load_session(&self, session_id: &str, cwd: PathBuf) -> Result<SessionInfo> {
        let span = info_span!("load_session", session_id);

        async {
            let mut record = self
                .store
                .get(session_id)?
                .ok_or_else(|| AppError::NotFound(format!("session {session_id}")))?;

            if let Some(file) = record.session_file.as_ref().filter(|f| !f.exists()) {
                warn!(session_file = %file.display(), "state file gone, forgetting session");
                self.store.remove(session_id)?;
                return Err(AppError::NotFound(format!(
                    "session file {}",
                    file.display()
                )));
            }

            if self.close_session(session_id).await {
                debug!("restarting live session");
            }

            let channel = self.launcher.launch(session_id, &cwd)?;
            let mut state = channel.handshake().await?;

            if let Some(file) = &record.session_file {
                channel
                    .send(&RpcCommand::SwitchSession {
                        session_path: file.display().to_string(),
                    })
                    .await?;
                let data = channel.send(&RpcCommand::GetState).await?;
                state = serde_json::from_value(data).unwrap_or(state);
            }

            let session = self.attach(session_id, cwd.clone(), channel, record.title.is_some());

            let data = match session.channel.send(&RpcCommand::GetMessages).await {
                Ok(data) => data,
                Err(err) => {
                    warn!(%err, "history unavailable, closing session");
                    self.close_session(session_id).await;
                    return Err(err);
                }
            };
            let messages: Vec<Value> = list_payload(&data, "messages");
            let replay = replay_messages(&messages, &cwd, &self.config.agent.edit_tools);
            info!(messages = messages.len(), updates = replay.len(), "replaying history");
            session.emitter.emit_all(replay).await;
            self.publish_commands(&session).await;
            session.emitter.flush().await;

            record.cwd = cwd;
            if state.session_file.is_some() {
                record.session_file.clone_from(&state.session_file);
            }
            record.touch();
            if let Err(err) = self.store.put(record) {
                warn!(%err, "failed to update session record");
            }

            Ok::<_, AppError>(SessionInfo {
                session_id: session_id.to_owned(),
                state,
            })
        }
        .instrument(span)
        .await
    }

    /// Run a prompt and wait for the turn to end.
    ///
    /// The first prompt of a session also names it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session. Turn failures are
    /// reported as [`StopReason::Error`], not as `Err`.
    pub async fn prompt(&self, session_id: &str, blocks: &[ContentBlock]) -> Result<StopReason> {
        let session = self.session(session_id)?;
        let payload = PromptPayload::from_blocks(blocks);

        if !session.titled.swap(true, Ordering::SeqCst) {
            self.name_session(&session, &payload).await;
        }

        Ok(session.turns.prompt(payload).await)
    }

    /// Cancel the active and queued turns of a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session, or the `abort`
    /// failure.
    pub async fn cancel(&self, session_id: &str) -> Result<()> {
        self.session(session_id)?.turns.cancel().await
    }

    /// Switch the session's model.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or the command failure.
    pub async fn set_model(&self, session_id: &str, provider: &str, model_id: &str) -> Result<()> {
        let session = self.session(session_id)?;
        session
            .channel
            .send(&RpcCommand::SetModel {
                provider: provider.to_owned(),
                model_id: model_id.to_owned(),
            })
            .await?;
        info!(session_id, provider, model_id, "model switched");
        Ok(())
    }

    /// Change the session's thinking level.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or the command failure.
    pub async fn set_thinking_level(&self, session_id: &str, level: &str) -> Result<()> {
        let session = self.session(session_id)?;
        session
            .channel
            .send(&RpcCommand::SetThinkingLevel {
                level: level.to_owned(),
            })
            .await?;
        info!(session_id, level, "thinking level changed");
        Ok(())
    }

    /// Models the session's agent can switch to.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or the command failure.
    pub async fn available_models(&self, session_id: &str) -> Result<Vec<ModelInfo>> {
        let session = self.session(session_id)?;
        let data = session.channel.send(&RpcCommand::GetAvailableModels).await?;
        Ok(list_payload(&data, "models"))
    }

    /// Current agent state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or the command failure.
    pub async fn state(&self, session_id: &str) -> Result<AgentState> {
        let session = self.session(session_id)?;
        let data = session.channel.send(&RpcCommand::GetState).await?;
        Ok(serde_json::from_value(data).unwrap_or_default())
    }

    /// Compact the conversation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or the command failure.
    pub async fn compact(&self, session_id: &str, instructions: Option<String>) -> Result<Value> {
        let session = self.session(session_id)?;
        session
            .channel
            .send(&RpcCommand::Compact {
                custom_instructions: instructions,
            })
            .await
    }

    /// Export the conversation as HTML, returning the written path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound`, the command failure, or
    /// `AppError::Protocol` when the agent does not report a path.
    pub async fn export_html(&self, session_id: &str, output_path: Option<String>) -> Result<PathBuf> {
        let session = self.session(session_id)?;
        let data = session
            .channel
            .send(&RpcCommand::ExportHtml { output_path })
            .await?;
        data.get("path")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .ok_or_else(|| AppError::Protocol("export_html returned no path".into()))
    }

    /// Stop a session's agent and forget it. Returns whether it was live.
    pub async fn close_session(&self, session_id: &str) -> bool {
        let removed = self.lock().remove(session_id);
        let Some(session) = removed else {
            return false;
        };
        session.channel.shutdown().await;
        info!(session_id, "session closed");
        true
    }

    /// Close every live session.
    pub async fn close_all(&self) {
        for session_id in self.session_ids() {
            self.close_session(&session_id).await;
        }
    }

    fn attach(&self, session_id: &str, cwd: PathBuf, channel: RpcChannel, titled: bool) -> Arc<LiveSession> {
        let (emitter, _emitter_task) = Emitter::start(session_id, Arc::clone(&self.sink));
        let translator = EventTranslator::new(cwd.clone(), self.config.agent.edit_tools.clone());
        let options = TurnOptions {
            queue_notice: self.config.queue_notice,
        };
        let (turns, _turn_task) =
            TurnController::start(channel.clone(), translator, emitter.clone(), options);

        let session = Arc::new(LiveSession {
            session_id: session_id.to_owned(),
            cwd,
            channel,
            turns,
            emitter,
            titled: AtomicBool::new(titled),
        });
        self.lock().insert(session_id.to_owned(), Arc::clone(&session));
        session
    }

    async fn publish_commands(&self, session: &LiveSession) {
        match session.channel.send(&RpcCommand::GetCommands).await {
            Ok(data) => {
                let commands: Vec<AgentCommand> = list_payload(&data, "commands");
                if commands.is_empty() {
                    return;
                }
                let available_commands = commands
                    .into_iter()
                    .map(|c| AvailableCommand {
                        name: c.name,
                        description: c.description,
                    })
                    .collect();
                session
                    .emitter
                    .emit(SessionUpdate::AvailableCommandsUpdate { available_commands })
                    .await;
            }
            Err(err) => debug!(session_id = session.session_id, %err, "get_commands failed"),
        }
    }

    async fn name_session(&self, session: &LiveSession, payload: &PromptPayload) {
        let Some(title) = payload.title(TITLE_MAX_CHARS) else {
            return;
        };

        let channel = session.channel.clone();
        let name = title.clone();
        let session_id = session.session_id.clone();
        tokio::spawn(async move {
            if let Err(err) = channel.send(&RpcCommand::SetSessionName { name }).await {
                debug!(session_id, %err, "set_session_name failed");
            }
        });

        let now = Utc::now();
        session
            .emitter
            .emit(SessionUpdate::SessionInfoUpdate {
                title: Some(title.clone()),
                updated_at: Some(now.to_rfc3339()),
            })
            .await;

        match self.store.get(&session.session_id) {
            Ok(Some(mut record)) => {
                record.title = Some(title);
                record.updated_at = now;
                if let Err(err) = self.store.put(record) {
                    warn!(session_id = session.session_id, %err, "failed to store session title");
                }
            }
            Ok(None) => {}
            Err(err) => warn!(session_id = session.session_id, %err, "failed to read session record"),
        }
    }
}
