//! Conversation replay for loaded sessions.
//!
//! Turns the `get_messages` payload into the updates a client would have
//! seen live: user text as `user_message_chunk`, assistant text and thinking
//! as message/thought chunks, and each tool call as one finished `tool_call`.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use crate::models::update::{ContentBlock, SessionUpdate, ToolCallContent, ToolCallStatus};
use crate::translate::tool_info::{result_text, tool_kind, tool_locations, tool_title};

/// Replay `messages` (the array returned by `get_messages`).
#[must_use]
pub fn replay_messages(messages: &[Value], cwd: &Path, edit_tools: &[String]) -> Vec<SessionUpdate> {
    let results: HashMap<&str, (&Value, bool)> = messages
        .iter()
        .filter(|m| role(m) == Some("toolResult"))
        .filter_map(|m| {
            let id = m.get("toolCallId").and_then(Value::as_str)?;
            let is_error = m.get("isError").and_then(Value::as_bool).unwrap_or(false);
            Some((id, (m, is_error)))
        })
        .collect();

    let mut updates = Vec::new();
    for message in messages {
        match role(message) {
            Some("user") => {
                for text in texts(message.get("content")) {
                    updates.push(SessionUpdate::UserMessageChunk {
                        content: ContentBlock::text(text),
                    });
                }
            }
            Some("assistant") => {
                let Some(blocks) = message.get("content").and_then(Value::as_array) else {
                    continue;
                };
                for block in blocks {
                    if let Some(update) = assistant_block(block, &results, cwd, edit_tools) {
                        updates.push(update);
                    }
                }
            }
            _ => {}
        }
    }
    updates
}

fn role(message: &Value) -> Option<&str> {
    message.get("role").and_then(Value::as_str)
}

fn texts(content: Option<&Value>) -> Vec<String> {
    match content {
        Some(Value::String(text)) => vec![text.clone()],
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}

fn assistant_block(
    block: &Value,
    results: &HashMap<&str, (&Value, bool)>,
    cwd: &Path,
    edit_tools: &[String],
) -> Option<SessionUpdate> {
    match block.get("type").and_then(Value::as_str)? {
        "text" => {
            let text = block.get("text").and_then(Value::as_str)?;
            Some(SessionUpdate::agent_text(text))
        }
        "thinking" => {
            let text = block.get("thinking").and_then(Value::as_str)?;
            Some(SessionUpdate::AgentThoughtChunk {
                content: ContentBlock::text(text),
            })
        }
        "toolCall" => {
            let id = block.get("id").and_then(Value::as_str)?;
            let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
            let args = block.get("arguments").cloned().unwrap_or(Value::Null);

            let (status, content) = match results.get(id) {
                Some((result, true)) => (ToolCallStatus::Failed, result_content(result)),
                Some((result, false)) => (ToolCallStatus::Completed, result_content(result)),
                None => (ToolCallStatus::Completed, Vec::new()),
            };
            let is_edit = edit_tools.iter().any(|t| t == name);

            Some(SessionUpdate::ToolCall {
                tool_call_id: id.to_owned(),
                title: tool_title(name, &args),
                kind: tool_kind(name, is_edit),
                status,
                content,
                locations: tool_locations(cwd, &args),
                raw_input: (!args.is_null()).then_some(args),
            })
        }
        _ => None,
    }
}

fn result_content(result: &Value) -> Vec<ToolCallContent> {
    let text = result_text(result);
    if text.is_empty() {
        Vec::new()
    } else {
        vec![ToolCallContent::text(text)]
    }
}
