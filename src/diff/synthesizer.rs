//! Snapshot store keyed by tool call id.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;

use crate::models::update::ToolCallContent;

/// File content captured when an edit tool started.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EditSnapshot {
    path: PathBuf,
    old_text: String,
}

/// Before/after snapshots for in-flight edit tool calls.
///
/// Every snapshot is removed by [`finish`](Self::finish) or
/// [`discard`](Self::discard), so the map only ever holds tool calls that
/// are still running.
#[derive(Debug, Default)]
pub struct DiffSynthesizer {
    snapshots: HashMap<String, EditSnapshot>,
}

impl DiffSynthesizer {
    /// Empty synthesizer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current content of `path` for `tool_call_id`.
    ///
    /// Best-effort: a file that cannot be read (typically one that does not
    /// exist yet) is not snapshotted and later yields no diff. Returns whether
    /// a snapshot was taken.
    pub async fn snapshot(&mut self, tool_call_id: &str, path: PathBuf) -> bool {
        match tokio::fs::read_to_string(&path).await {
            Ok(old_text) => {
                self.snapshots
                    .insert(tool_call_id.to_owned(), EditSnapshot { path, old_text });
                true
            }
            Err(err) => {
                debug!(
                    tool_call_id,
                    path = %path.display(),
                    %err,
                    "diff: no snapshot taken"
                );
                false
            }
        }
    }

    /// Consume the snapshot for `tool_call_id` and compare it with the file.
    ///
    /// Returns a diff block when the content changed; `None` when it did not,
    /// when no snapshot exists, or when the file can no longer be read.
    pub async fn finish(&mut self, tool_call_id: &str) -> Option<ToolCallContent> {
        let snapshot = self.snapshots.remove(tool_call_id)?;

        let new_text = match tokio::fs::read_to_string(&snapshot.path).await {
            Ok(text) => text,
            Err(err) => {
                debug!(
                    tool_call_id,
                    path = %snapshot.path.display(),
                    %err,
                    "diff: post-edit read failed"
                );
                return None;
            }
        };

        if new_text == snapshot.old_text {
            debug!(tool_call_id, "diff: content unchanged");
            return None;
        }

        let (added, removed) = line_changes(&snapshot.old_text, &new_text);
        debug!(
            tool_call_id,
            path = %snapshot.path.display(),
            added,
            removed,
            "diff: synthesized"
        );

        Some(ToolCallContent::Diff {
            path: snapshot.path.display().to_string(),
            old_text: Some(snapshot.old_text),
            new_text,
        })
    }

    /// Drop the snapshot for `tool_call_id` without comparing.
    pub fn discard(&mut self, tool_call_id: &str) {
        self.snapshots.remove(tool_call_id);
    }

    /// Number of snapshots held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether no snapshots are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Drop every snapshot.
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

/// Count inserted and deleted lines between two texts.
fn line_changes(old: &str, new: &str) -> (usize, usize) {
    let patch = diffy::create_patch(old, new);
    let mut added = 0;
    let mut removed = 0;
    for hunk in patch.hunks() {
        for line in hunk.lines() {
            match line {
                diffy::Line::Insert(_) => added += 1,
                diffy::Line::Delete(_) => removed += 1,
                diffy::Line::Context(_) => {}
            }
        }
    }
    (added, removed)
}
