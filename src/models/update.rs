//! Session update notifications delivered to the client.
//!
//! Serialised in the client protocol's shape: every update is tagged by a
//! `sessionUpdate` field and uses camelCase keys.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One content block of a message or prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Inline image.
    Image {
        /// Base64-encoded bytes.
        data: String,
        /// MIME type.
        mime_type: String,
        /// Origin of the image, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
    },
    /// Reference to a resource the agent can read itself.
    ResourceLink {
        /// Resource URI.
        uri: String,
        /// Display name.
        name: String,
    },
    /// Resource whose contents are embedded in the prompt.
    Resource {
        /// The embedded contents.
        resource: EmbeddedResource,
    },
}

impl ContentBlock {
    /// Shorthand for a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Embedded resource contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedResource {
    /// Resource URI.
    pub uri: String,
    /// Text contents, for text resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Lifecycle status of a tool call.
///
/// Declared in lifecycle order; the derived `Ord` is what keeps updates
/// monotonic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Announced while the agent streams its arguments.
    Pending,
    /// Executing.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl ToolCallStatus {
    /// Whether no further updates may follow.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Coarse category of a tool, used by clients to pick an icon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Reads files.
    Read,
    /// Modifies files.
    Edit,
    /// Runs shell commands.
    Execute,
    /// Searches the workspace.
    Search,
    /// Anything else.
    Other,
}

/// Content attached to a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ToolCallContent {
    /// Regular content (tool output text).
    Content {
        /// The block.
        content: ContentBlock,
    },
    /// Before/after view of a modified file.
    Diff {
        /// Absolute path of the file.
        path: String,
        /// Content before the edit; absent for newly created files.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_text: Option<String>,
        /// Content after the edit.
        new_text: String,
    },
}

impl ToolCallContent {
    /// Shorthand for a text content entry.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Content {
            content: ContentBlock::text(text),
        }
    }
}

/// File touched by a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallLocation {
    /// Path of the file.
    pub path: String,
}

/// Slash command offered to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailableCommand {
    /// Command name without the slash.
    pub name: String,
    /// Short description.
    pub description: String,
}

/// Update notification body.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(
    tag = "sessionUpdate",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum SessionUpdate {
    /// Replayed user message text.
    UserMessageChunk {
        /// The fragment.
        content: ContentBlock,
    },
    /// Assistant text fragment.
    AgentMessageChunk {
        /// The fragment.
        content: ContentBlock,
    },
    /// Assistant reasoning fragment.
    AgentThoughtChunk {
        /// The fragment.
        content: ContentBlock,
    },
    /// First announcement of a tool call.
    ToolCall {
        /// Tool call id.
        tool_call_id: String,
        /// Human-readable title.
        title: String,
        /// Category.
        kind: ToolKind,
        /// Initial status.
        status: ToolCallStatus,
        /// Attached content.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        content: Vec<ToolCallContent>,
        /// Files involved.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        locations: Vec<ToolCallLocation>,
        /// Raw tool arguments.
        #[serde(skip_serializing_if = "Option::is_none")]
        raw_input: Option<Value>,
    },
    /// Change to a previously announced tool call.
    ToolCallUpdate {
        /// Tool call id.
        tool_call_id: String,
        /// New status, if it changed.
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<ToolCallStatus>,
        /// New title, if it changed.
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        /// Replacement content.
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<Vec<ToolCallContent>>,
        /// Files involved.
        #[serde(skip_serializing_if = "Option::is_none")]
        locations: Option<Vec<ToolCallLocation>>,
        /// Raw tool arguments.
        #[serde(skip_serializing_if = "Option::is_none")]
        raw_input: Option<Value>,
        /// Raw tool result.
        #[serde(skip_serializing_if = "Option::is_none")]
        raw_output: Option<Value>,
    },
    /// Slash commands available in this session.
    AvailableCommandsUpdate {
        /// The commands.
        available_commands: Vec<AvailableCommand>,
    },
    /// Session metadata changed.
    SessionInfoUpdate {
        /// Session title.
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        /// RFC 3339 timestamp of the change.
        #[serde(skip_serializing_if = "Option::is_none")]
        updated_at: Option<String>,
    },
}

impl SessionUpdate {
    /// Assistant text fragment.
    #[must_use]
    pub fn agent_text(text: impl Into<String>) -> Self {
        Self::AgentMessageChunk {
            content: ContentBlock::text(text),
        }
    }

    /// Status-only tool call update.
    #[must_use]
    pub fn tool_status(tool_call_id: impl Into<String>, status: ToolCallStatus) -> Self {
        Self::ToolCallUpdate {
            tool_call_id: tool_call_id.into(),
            status: Some(status),
            title: None,
            content: None,
            locations: None,
            raw_input: None,
            raw_output: None,
        }
    }
}

/// `session/update` notification params.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionNotification {
    /// Bridge session id.
    pub session_id: String,
    /// The update.
    pub update: SessionUpdate,
}
