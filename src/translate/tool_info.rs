//! Presentation details derived from tool names and arguments.

use std::path::Path;

use serde_json::Value;

use crate::diff::resolve_tool_path;
use crate::models::update::{ToolCallLocation, ToolKind};

/// Longest command shown in a `Run ...` title.
const MAX_COMMAND_TITLE: usize = 80;

/// Category of a tool by name; `is_edit` comes from the configured edit tools.
#[must_use]
pub fn tool_kind(tool_name: &str, is_edit: bool) -> ToolKind {
    if is_edit {
        return ToolKind::Edit;
    }
    match tool_name {
        "read" => ToolKind::Read,
        "edit" | "write" => ToolKind::Edit,
        "bash" => ToolKind::Execute,
        "grep" | "find" | "ls" => ToolKind::Search,
        _ => ToolKind::Other,
    }
}

/// File path named by tool arguments (`path` or `file_path`).
#[must_use]
pub fn tool_path(args: &Value) -> Option<&str> {
    args.get("path")
        .or_else(|| args.get("file_path"))
        .and_then(Value::as_str)
        .filter(|p| !p.trim().is_empty())
}

/// Locations for a tool call, resolved against `cwd`.
#[must_use]
pub fn tool_locations(cwd: &Path, args: &Value) -> Vec<ToolCallLocation> {
    tool_path(args)
        .map(|raw| ToolCallLocation {
            path: resolve_tool_path(cwd, raw).display().to_string(),
        })
        .into_iter()
        .collect()
}

/// Human-readable title for a tool call.
#[must_use]
pub fn tool_title(tool_name: &str, args: &Value) -> String {
    if let Some(command) = args.get("command").and_then(Value::as_str) {
        let line = command.lines().next().unwrap_or_default().trim();
        let mut shown: String = line.chars().take(MAX_COMMAND_TITLE).collect();
        if shown.len() < command.trim().len() {
            shown.push('…');
        }
        return format!("Run {shown}");
    }

    let verb = match tool_name {
        "read" => "Read",
        "edit" => "Edit",
        "write" => "Write",
        "grep" => "Search",
        "find" => "Find",
        "ls" => "List",
        other => return tool_path(args).map_or_else(|| other.to_owned(), |p| format!("{other} {p}")),
    };

    if let Some(pattern) = args.get("pattern").and_then(Value::as_str) {
        return match tool_path(args) {
            Some(path) => format!("{verb} {pattern} in {path}"),
            None => format!("{verb} {pattern}"),
        };
    }
    match tool_path(args) {
        Some(path) => format!("{verb} {path}"),
        None => verb.to_owned(),
    }
}

/// Concatenated text blocks of a tool result (`{content: [{type: "text", ...}]}`).
///
/// Plain string results are returned as-is.
#[must_use]
pub fn result_text(result: &Value) -> String {
    if let Some(text) = result.as_str() {
        return text.to_owned();
    }
    let Some(blocks) = result.get("content").and_then(Value::as_array) else {
        return String::new();
    };
    blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}
