//! Monotonic tool-call status tracking.
//!
//! Every status change for a tool call goes through
//! [`ToolCallTracker::observe`], the single place the transition rule lives:
//!
//! - unknown id → recorded (unless the first sighting is already terminal);
//! - higher status → advanced, terminal statuses drop the record;
//! - equal status → unchanged;
//! - lower status, or any status after a terminal one → stale, ignored.
//!
//! Ids that reached a terminal status are remembered until [`reset`] (called
//! at the end of each agent loop) so a late `pending` announcement cannot
//! resurrect them.
//!
//! [`reset`]: ToolCallTracker::reset

use std::collections::{HashMap, HashSet};

use crate::models::update::ToolCallStatus;

/// Result of observing a status for a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First sighting; announce the tool call with this status.
    Created(ToolCallStatus),
    /// Status moved forward.
    Advanced {
        /// Previous status.
        from: ToolCallStatus,
        /// New status.
        to: ToolCallStatus,
    },
    /// Same status as already recorded.
    Unchanged(ToolCallStatus),
    /// Would move backwards (or the call already finished); must not be emitted.
    Stale,
}

impl Transition {
    /// Whether the transition may be surfaced to the client.
    #[must_use]
    pub fn is_emittable(self) -> bool {
        !matches!(self, Self::Stale)
    }
}

/// A tool call that has not reached a terminal status yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRecord {
    /// Tool name.
    pub tool_name: String,
    /// Latest status.
    pub status: ToolCallStatus,
}

/// Map of in-flight tool calls keyed by id.
#[derive(Debug, Default)]
pub struct ToolCallTracker {
    records: HashMap<String, ToolCallRecord>,
    finished: HashSet<String>,
}

impl ToolCallTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `status` to tool call `id` and report what changed.
    pub fn observe(&mut self, id: &str, tool_name: &str, status: ToolCallStatus) -> Transition {
        if self.finished.contains(id) {
            return Transition::Stale;
        }

        let Some(record) = self.records.get_mut(id) else {
            if status.is_terminal() {
                self.finished.insert(id.to_owned());
            } else {
                self.records.insert(
                    id.to_owned(),
                    ToolCallRecord {
                        tool_name: tool_name.to_owned(),
                        status,
                    },
                );
            }
            return Transition::Created(status);
        };

        let from = record.status;
        if status < from {
            return Transition::Stale;
        }
        if status == from {
            return Transition::Unchanged(status);
        }

        if status.is_terminal() {
            self.records.remove(id);
            self.finished.insert(id.to_owned());
        } else {
            record.status = status;
        }
        Transition::Advanced { from, to: status }
    }

    /// Current record for `id`, if it is still in flight.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ToolCallRecord> {
        self.records.get(id)
    }

    /// Number of in-flight tool calls.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.records.len()
    }

    /// Forget everything; called when an agent loop ends.
    pub fn reset(&mut self) {
        self.records.clear();
        self.finished.clear();
    }
}
