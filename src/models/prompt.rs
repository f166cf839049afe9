//! Prompt payloads and turn outcomes.

use serde::Serialize;

use crate::models::update::{ContentBlock, EmbeddedResource};
use crate::rpc::protocol::Attachment;
use crate::AppError;

/// What one prompt sends to the agent: text plus image attachments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptPayload {
    /// Message text.
    pub text: String,
    /// Image attachments.
    pub attachments: Vec<Attachment>,
}

impl PromptPayload {
    /// Plain text prompt without attachments.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    /// Flatten client content blocks into a single agent message.
    ///
    /// Text blocks are joined with newlines, resource links become
    /// `@uri` mentions, embedded text resources are appended inside
    /// `<context>` tags, and images become attachments.
    #[must_use]
    pub fn from_blocks(blocks: &[ContentBlock]) -> Self {
        let mut parts: Vec<String> = Vec::new();
        let mut context: Vec<String> = Vec::new();
        let mut attachments = Vec::new();

        for block in blocks {
            match block {
                ContentBlock::Text { text } => parts.push(text.clone()),
                ContentBlock::ResourceLink { uri, .. } => parts.push(format!("@{}", display_uri(uri))),
                ContentBlock::Resource {
                    resource: EmbeddedResource { uri, text, .. },
                } => match text {
                    Some(text) => context.push(format!(
                        "<context ref=\"{}\">\n{text}\n</context>",
                        display_uri(uri)
                    )),
                    None => parts.push(format!("@{}", display_uri(uri))),
                },
                ContentBlock::Image {
                    data, mime_type, ..
                } => attachments.push(Attachment::Image {
                    data: data.clone(),
                    mime_type: mime_type.clone(),
                }),
            }
        }

        let mut text = parts.join("\n");
        for block in context {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(&block);
        }

        Self { text, attachments }
    }

    /// First line of the text, truncated to `max_chars`, for session titles.
    #[must_use]
    pub fn title(&self, max_chars: usize) -> Option<String> {
        let line = self.text.lines().map(str::trim).find(|l| !l.is_empty())?;
        if line.chars().count() <= max_chars {
            return Some(line.to_owned());
        }
        let mut title: String = line.chars().take(max_chars.saturating_sub(1)).collect();
        title.push('…');
        Some(title)
    }
}

fn display_uri(uri: &str) -> &str {
    uri.strip_prefix("file://").unwrap_or(uri)
}

/// How a prompt call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The agent loop finished normally.
    EndTurn,
    /// Cancellation was requested before the turn resolved.
    Cancelled,
    /// The prompt command or the agent process failed.
    Error(AppError),
}

impl StopReason {
    /// Client-protocol name of a successful stop reason.
    #[must_use]
    pub fn wire_name(&self) -> Option<WireStopReason> {
        match self {
            Self::EndTurn => Some(WireStopReason::EndTurn),
            Self::Cancelled => Some(WireStopReason::Cancelled),
            Self::Error(_) => None,
        }
    }
}

/// Stop reasons as they appear in a `session/prompt` result.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WireStopReason {
    /// Normal completion.
    EndTurn,
    /// Cancelled by the client.
    Cancelled,
}
