//! Event translator: subprocess events → session updates.
//!
//! | Agent event                               | Updates                                  |
//! |-------------------------------------------|------------------------------------------|
//! | `message_update` / `text_delta`           | one `agent_message_chunk`                |
//! | `message_update` / `thinking_delta`       | one `agent_thought_chunk`                |
//! | `message_update` / `toolcall_*`           | `tool_call` (`pending`) on first sighting |
//! | `tool_execution_start`                    | `tool_call` or `tool_call_update` (`in_progress`) |
//! | `tool_execution_update`                   | `tool_call_update` with partial output   |
//! | `tool_execution_end`                      | `tool_call_update` (`completed`/`failed`), plus a diff for edits |
//! | `agent_start`, `turn_*`, others           | nothing                                  |
//!
//! All tool-call status changes pass through [`ToolCallTracker`], so a status
//! never moves backwards on the wire.

use std::path::PathBuf;

use serde_json::Value;
use tracing::debug;

use crate::diff::{resolve_tool_path, DiffSynthesizer};
use crate::models::update::{ContentBlock, SessionUpdate, ToolCallContent, ToolCallStatus};
use crate::rpc::protocol::{AssistantDelta, RpcEvent};
use crate::translate::tool_calls::{ToolCallTracker, Transition};
use crate::translate::tool_info::{result_text, tool_kind, tool_locations, tool_path, tool_title};

/// Per-session translator state.
#[derive(Debug)]
pub struct EventTranslator {
    cwd: PathBuf,
    edit_tools: Vec<String>,
    tools: ToolCallTracker,
    diffs: DiffSynthesizer,
}

impl EventTranslator {
    /// Translator for a session rooted at `cwd`; `edit_tools` names the tools
    /// whose executions are snapshotted for diffs.
    #[must_use]
    pub fn new(cwd: impl Into<PathBuf>, edit_tools: Vec<String>) -> Self {
        Self {
            cwd: cwd.into(),
            edit_tools,
            tools: ToolCallTracker::new(),
            diffs: DiffSynthesizer::new(),
        }
    }

    /// In-flight tool calls.
    #[must_use]
    pub fn tools(&self) -> &ToolCallTracker {
        &self.tools
    }

    /// Outstanding edit snapshots.
    #[must_use]
    pub fn diffs(&self) -> &DiffSynthesizer {
        &self.diffs
    }

    fn is_edit_tool(&self, tool_name: &str) -> bool {
        self.edit_tools.iter().any(|t| t == tool_name)
    }

    /// Translate one raw line; lines that are not recognisable events yield
    /// nothing.
    pub async fn translate_value(&mut self, value: &Value) -> Vec<SessionUpdate> {
        match RpcEvent::from_value(value) {
            Some(event) => self.translate(&event).await,
            None => {
                let event_type = value.get("type").and_then(Value::as_str);
                debug!(
                    event_type,
                    "translator: unrecognised event shape"
                );
                Vec::new()
            }
        }
    }

    /// Translate one event into zero or more updates, in emission order.
    pub async fn translate(&mut self, event: &RpcEvent) -> Vec<SessionUpdate> {
        match event {
            RpcEvent::MessageUpdate {
                assistant_message_event,
            } => self.assistant_delta(assistant_message_event),
            RpcEvent::ToolExecutionStart {
                tool_call_id,
                tool_name,
                args,
            } => self.tool_start(tool_call_id, tool_name, args).await,
            RpcEvent::ToolExecutionUpdate {
                tool_call_id,
                tool_name,
                partial_result,
                ..
            } => self.tool_progress(tool_call_id, tool_name, partial_result),
            RpcEvent::ToolExecutionEnd {
                tool_call_id,
                tool_name,
                result,
                is_error,
            } => self.tool_end(tool_call_id, tool_name, result, *is_error).await,
            RpcEvent::AgentEnd => {
                if !self.diffs.is_empty() {
                    debug!(leftover = self.diffs.len(), "translator: dropping unfinished snapshots");
                }
                self.diffs.clear();
                self.tools.reset();
                Vec::new()
            }
            RpcEvent::AgentStart | RpcEvent::TurnStart | RpcEvent::TurnEnd | RpcEvent::Other => {
                Vec::new()
            }
        }
    }

    fn assistant_delta(&mut self, delta: &AssistantDelta) -> Vec<SessionUpdate> {
        match delta {
            AssistantDelta::TextDelta { delta } if !delta.is_empty() => {
                vec![SessionUpdate::agent_text(delta.clone())]
            }
            AssistantDelta::ThinkingDelta { delta } if !delta.is_empty() => {
                vec![SessionUpdate::AgentThoughtChunk {
                    content: ContentBlock::text(delta.clone()),
                }]
            }
            AssistantDelta::ToolcallStart { .. }
            | AssistantDelta::ToolcallDelta { .. }
            | AssistantDelta::ToolcallEnd { .. } => {
                let Some(call) = delta.tool_call() else {
                    return Vec::new();
                };
                if call.id.is_empty() {
                    return Vec::new();
                }
                let finished = matches!(delta, AssistantDelta::ToolcallEnd { .. });
                match self.tools.observe(&call.id, &call.name, ToolCallStatus::Pending) {
                    Transition::Created(status) => {
                        vec![self.announce(&call.id, &call.name, &call.arguments, status, Vec::new())]
                    }
                    // Arguments are complete now; refresh what was derived from them.
                    Transition::Unchanged(_) if finished => vec![SessionUpdate::ToolCallUpdate {
                        tool_call_id: call.id.clone(),
                        status: None,
                        title: Some(tool_title(&call.name, &call.arguments)),
                        content: None,
                        locations: Some(tool_locations(&self.cwd, &call.arguments)),
                        raw_input: Some(call.arguments.clone()),
                        raw_output: None,
                    }],
                    _ => Vec::new(),
                }
            }
            _ => Vec::new(),
        }
    }

    async fn tool_start(&mut self, id: &str, tool_name: &str, args: &Value) -> Vec<SessionUpdate> {
        let transition = self.tools.observe(id, tool_name, ToolCallStatus::InProgress);

        // A repeated or stale start must not leave a snapshot behind.
        if matches!(transition, Transition::Created(_) | Transition::Advanced { .. })
            && self.is_edit_tool(tool_name)
        {
            if let Some(raw) = tool_path(args) {
                let path = resolve_tool_path(&self.cwd, raw);
                self.diffs.snapshot(id, path).await;
            }
        }

        match transition {
            Transition::Created(status) => {
                vec![self.announce(id, tool_name, args, status, Vec::new())]
            }
            Transition::Advanced { to, .. } => vec![SessionUpdate::ToolCallUpdate {
                tool_call_id: id.to_owned(),
                status: Some(to),
                title: Some(tool_title(tool_name, args)),
                content: None,
                locations: Some(tool_locations(&self.cwd, args)),
                raw_input: Some(args.clone()),
                raw_output: None,
            }],
            Transition::Unchanged(_) | Transition::Stale => Vec::new(),
        }
    }

    fn tool_progress(&mut self, id: &str, tool_name: &str, partial: &Value) -> Vec<SessionUpdate> {
        let transition = self.tools.observe(id, tool_name, ToolCallStatus::InProgress);
        if !transition.is_emittable() {
            return Vec::new();
        }

        let text = result_text(partial);
        let status = match transition {
            Transition::Created(to) | Transition::Advanced { to, .. } => Some(to),
            Transition::Unchanged(_) | Transition::Stale => None,
        };
        if text.is_empty() && status.is_none() {
            return Vec::new();
        }

        vec![SessionUpdate::ToolCallUpdate {
            tool_call_id: id.to_owned(),
            status,
            title: None,
            content: (!text.is_empty()).then(|| vec![ToolCallContent::text(text)]),
            locations: None,
            raw_input: None,
            raw_output: None,
        }]
    }

    async fn tool_end(
        &mut self,
        id: &str,
        tool_name: &str,
        result: &Value,
        is_error: bool,
    ) -> Vec<SessionUpdate> {
        let mut content = Vec::new();
        if is_error {
            self.diffs.discard(id);
        } else if let Some(diff) = self.diffs.finish(id).await {
            content.push(diff);
        }
        let text = result_text(result);
        if !text.is_empty() {
            content.push(ToolCallContent::text(text));
        }

        let status = if is_error {
            ToolCallStatus::Failed
        } else {
            ToolCallStatus::Completed
        };

        match self.tools.observe(id, tool_name, status) {
            Transition::Created(status) => {
                vec![self.announce(id, tool_name, &Value::Null, status, content)]
            }
            Transition::Advanced { to, .. } => vec![SessionUpdate::ToolCallUpdate {
                tool_call_id: id.to_owned(),
                status: Some(to),
                title: None,
                content: Some(content),
                locations: None,
                raw_input: None,
                raw_output: Some(result.clone()),
            }],
            Transition::Unchanged(_) | Transition::Stale => {
                debug!(tool_call_id = id, "translator: duplicate tool end ignored");
                Vec::new()
            }
        }
    }

    fn announce(
        &self,
        id: &str,
        tool_name: &str,
        args: &Value,
        status: ToolCallStatus,
        content: Vec<ToolCallContent>,
    ) -> SessionUpdate {
        SessionUpdate::ToolCall {
            tool_call_id: id.to_owned(),
            title: tool_title(tool_name, args),
            kind: tool_kind(tool_name, self.is_edit_tool(tool_name)),
            status,
            content,
            locations: tool_locations(&self.cwd, args),
            raw_input: (!args.is_null()).then(|| args.clone()),
        }
    }
}
