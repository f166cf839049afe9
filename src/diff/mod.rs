//! Diff synthesis for file-editing tool calls.
//!
//! The agent reports edits with a file path only. The synthesizer snapshots
//! the file when an edit tool starts and compares it with the file on disk
//! once the tool ends, producing a before/after diff block when the content
//! changed.

use std::path::{Component, Path, PathBuf};

pub mod synthesizer;

pub use synthesizer::DiffSynthesizer;

/// Resolve a path as written in tool arguments against the session `cwd`.
///
/// Accepts `@`-prefixed mentions and `~/` home paths, and normalizes `.` and
/// `..` components lexically. The result is absolute whenever `cwd` is.
#[must_use]
pub fn resolve_tool_path(cwd: &Path, raw: &str) -> PathBuf {
    let raw = raw.trim();
    let raw = raw.strip_prefix('@').unwrap_or(raw);

    let candidate = match raw.strip_prefix("~/") {
        Some(rest) => std::env::var_os("HOME")
            .map_or_else(|| PathBuf::from(raw), |home| PathBuf::from(home).join(rest)),
        None => PathBuf::from(raw),
    };

    let joined = if candidate.is_absolute() {
        candidate
    } else {
        cwd.join(candidate)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
