//! Typed messages of the agent subprocess protocol.
//!
//! # Outbound commands
//!
//! Every command is one JSON object tagged by `type`; the channel adds a
//! correlation `id` before writing it:
//!
//! ```json
//! {"type":"prompt","id":"req-7","message":"hello"}
//! ```
//!
//! # Inbound lines
//!
//! | `type`                  | Meaning                                       |
//! |-------------------------|-----------------------------------------------|
//! | `response`              | Answer to exactly one outstanding command     |
//! | `message_update`        | Streamed assistant delta (text, thinking, tool-call arguments) |
//! | `tool_execution_*`      | Tool start / progress / end                   |
//! | `agent_start`/`agent_end` | Boundaries of one prompt's agent loop       |
//! | `turn_start`/`turn_end` | Internal sub-turn boundaries                  |
//! | *(any other)*           | Forwarded to subscribers, ignored by the translator |

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value of the `type` field that marks a correlated response line.
pub const RESPONSE_TYPE: &str = "response";

/// How queued steering / follow-up messages are delivered by the agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum QueueMode {
    /// Deliver every queued message at once.
    All,
    /// Deliver queued messages one per turn.
    OneAtATime,
}

/// Binary attachment forwarded alongside a prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Attachment {
    /// Base64 image data.
    Image {
        /// Base64-encoded bytes.
        data: String,
        /// MIME type such as `image/png`.
        mime_type: String,
    },
}

/// Commands understood by the agent subprocess.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RpcCommand {
    /// Start an agent loop for a user message.
    Prompt {
        /// User text.
        message: String,
        /// Image attachments.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        images: Vec<Attachment>,
    },
    /// Abort the running agent loop.
    Abort,
    /// Query model, thinking level and persisted-state metadata.
    GetState,
    /// List models the agent can switch to.
    GetAvailableModels,
    /// Switch the active model.
    SetModel {
        /// Provider name, e.g. `anthropic`.
        provider: String,
        /// Provider-specific model id.
        model_id: String,
    },
    /// Change the reasoning effort.
    SetThinkingLevel {
        /// Level name, e.g. `off`, `low`, `high`.
        level: String,
    },
    /// Summarise the conversation to reclaim context.
    Compact {
        /// Extra guidance for the summary.
        #[serde(skip_serializing_if = "Option::is_none")]
        custom_instructions: Option<String>,
    },
    /// Toggle automatic compaction.
    SetAutoCompaction {
        /// New setting.
        enabled: bool,
    },
    /// Render the session as HTML.
    ExportHtml {
        /// Destination file; the agent picks one when absent.
        #[serde(skip_serializing_if = "Option::is_none")]
        output_path: Option<String>,
    },
    /// Resume a session from its state file.
    SwitchSession {
        /// Path of the persisted session state file.
        session_path: String,
    },
    /// Fetch the conversation history.
    GetMessages,
    /// List slash commands the agent supports.
    GetCommands,
    /// Set the human-readable session name.
    SetSessionName {
        /// New name.
        name: String,
    },
    /// Configure delivery of steering messages.
    SetSteeringMode {
        /// Delivery mode.
        mode: QueueMode,
    },
    /// Configure delivery of follow-up messages.
    SetFollowUpMode {
        /// Delivery mode.
        mode: QueueMode,
    },
}

impl RpcCommand {
    /// Wire name of the command (the `type` field).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Prompt { .. } => "prompt",
            Self::Abort => "abort",
            Self::GetState => "get_state",
            Self::GetAvailableModels => "get_available_models",
            Self::SetModel { .. } => "set_model",
            Self::SetThinkingLevel { .. } => "set_thinking_level",
            Self::Compact { .. } => "compact",
            Self::SetAutoCompaction { .. } => "set_auto_compaction",
            Self::ExportHtml { .. } => "export_html",
            Self::SwitchSession { .. } => "switch_session",
            Self::GetMessages => "get_messages",
            Self::GetCommands => "get_commands",
            Self::SetSessionName { .. } => "set_session_name",
            Self::SetSteeringMode { .. } => "set_steering_mode",
            Self::SetFollowUpMode { .. } => "set_follow_up_mode",
        }
    }
}

/// A `type: "response"` line.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RpcResponse {
    /// Correlation id copied from the command.
    #[serde(default)]
    pub id: Option<String>,
    /// Name of the command being answered.
    #[serde(default)]
    pub command: Option<String>,
    /// Whether the command succeeded.
    pub success: bool,
    /// Command-specific payload.
    #[serde(default)]
    pub data: Option<Value>,
    /// Error text when `success` is false.
    #[serde(default)]
    pub error: Option<String>,
}

/// Tool call as streamed inside an assistant message.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ToolCallInfo {
    /// Tool call id, shared with the later `tool_execution_*` events.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Arguments parsed so far.
    #[serde(default)]
    pub arguments: Value,
}

/// Sub-event carried by `message_update`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AssistantDelta {
    /// Incremental assistant text.
    TextDelta {
        /// Text fragment.
        delta: String,
    },
    /// Incremental reasoning text.
    #[serde(alias = "reasoning_delta")]
    ThinkingDelta {
        /// Reasoning fragment.
        delta: String,
    },
    /// A tool call started streaming.
    ToolcallStart {
        /// Index of the tool-call block in `partial.content`.
        #[serde(default)]
        content_index: Option<usize>,
        /// Partial assistant message.
        #[serde(default)]
        partial: Option<Value>,
        /// Tool call, when the agent includes it directly.
        #[serde(default)]
        tool_call: Option<ToolCallInfo>,
    },
    /// More tool-call arguments arrived.
    ToolcallDelta {
        /// Index of the tool-call block in `partial.content`.
        #[serde(default)]
        content_index: Option<usize>,
        /// Partial assistant message.
        #[serde(default)]
        partial: Option<Value>,
        /// Tool call, when the agent includes it directly.
        #[serde(default)]
        tool_call: Option<ToolCallInfo>,
    },
    /// Tool-call arguments are complete.
    ToolcallEnd {
        /// Index of the tool-call block in `partial.content`.
        #[serde(default)]
        content_index: Option<usize>,
        /// Partial assistant message.
        #[serde(default)]
        partial: Option<Value>,
        /// Complete tool call.
        #[serde(default)]
        tool_call: Option<ToolCallInfo>,
    },
    /// Any other sub-event (`text_start`, `done`, ...).
    #[default]
    #[serde(other)]
    Other,
}

impl AssistantDelta {
    /// The tool call a `toolcall_*` sub-event refers to, if it can be found.
    ///
    /// Prefers the explicit `toolCall` field and falls back to the
    /// `partial.content[contentIndex]` block.
    #[must_use]
    pub fn tool_call(&self) -> Option<ToolCallInfo> {
        let (content_index, partial, tool_call) = match self {
            Self::ToolcallStart {
                content_index,
                partial,
                tool_call,
            }
            | Self::ToolcallDelta {
                content_index,
                partial,
                tool_call,
            }
            | Self::ToolcallEnd {
                content_index,
                partial,
                tool_call,
            } => (content_index, partial, tool_call),
            _ => return None,
        };

        if let Some(call) = tool_call {
            return Some(call.clone());
        }

        let block = partial.as_ref()?.get("content")?.get((*content_index)?)?;
        if block.get("type").and_then(Value::as_str) != Some("toolCall") {
            return None;
        }
        serde_json::from_value(block.clone()).ok()
    }
}

/// Events emitted by the agent outside of command responses.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RpcEvent {
    /// The agent loop for a prompt began.
    AgentStart,
    /// The agent loop for a prompt finished; the prompt is complete.
    AgentEnd,
    /// An internal sub-turn began.
    TurnStart,
    /// An internal sub-turn ended (once per tool round trip).
    TurnEnd,
    /// Streamed assistant output.
    MessageUpdate {
        /// The nested delta.
        #[serde(default)]
        assistant_message_event: AssistantDelta,
    },
    /// A tool began executing.
    ToolExecutionStart {
        /// Tool call id.
        tool_call_id: String,
        /// Tool name.
        tool_name: String,
        /// Tool arguments.
        #[serde(default)]
        args: Value,
    },
    /// A tool reported partial output.
    ToolExecutionUpdate {
        /// Tool call id.
        tool_call_id: String,
        /// Tool name.
        tool_name: String,
        /// Tool arguments.
        #[serde(default)]
        args: Value,
        /// Accumulated partial result.
        #[serde(default)]
        partial_result: Value,
    },
    /// A tool finished.
    ToolExecutionEnd {
        /// Tool call id.
        tool_call_id: String,
        /// Tool name.
        tool_name: String,
        /// Final result (`{content: [...]}`).
        #[serde(default)]
        result: Value,
        /// Whether the tool failed.
        #[serde(default)]
        is_error: bool,
    },
    /// Anything the bridge does not interpret.
    #[serde(other)]
    Other,
}

impl RpcEvent {
    /// Interpret a raw inbound line.
    ///
    /// Returns `None` when a known event type has an unexpected shape; such
    /// lines are tolerated the same way malformed JSON is.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Model descriptor returned by `get_state` and `get_available_models`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Provider name.
    pub provider: String,
    /// Model id.
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Payload of a successful `get_state` response.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentState {
    /// Active model.
    pub model: Option<ModelInfo>,
    /// Active thinking level.
    pub thinking_level: Option<String>,
    /// Whether an agent loop is currently running.
    pub is_streaming: bool,
    /// File the agent persists the conversation to.
    pub session_file: Option<PathBuf>,
    /// The agent's own session id.
    pub session_id: Option<String>,
    /// Number of messages in the conversation.
    pub message_count: Option<u64>,
}

/// Slash command advertised by `get_commands`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentCommand {
    /// Command name without the leading slash.
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
}

/// Extract a list payload that may be wrapped as `{ "<key>": [...] }`.
pub(crate) fn list_payload<T: serde::de::DeserializeOwned>(data: &Value, key: &str) -> Vec<T> {
    let list = data.get(key).unwrap_or(data);
    serde_json::from_value(list.clone()).unwrap_or_default()
}
