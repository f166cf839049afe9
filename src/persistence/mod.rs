//! Session store: maps bridge session ids to the agent's state files.
//!
//! The store is injected into the session manager as a repository so the
//! core never touches global state and tests can use [`MemorySessionStore`].

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

pub mod json_store;
pub mod memory;

pub use json_store::JsonSessionStore;
pub use memory::MemorySessionStore;

/// Persisted facts about one bridge session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    /// Bridge session id handed to the client.
    pub session_id: String,
    /// Project directory the agent runs in.
    pub cwd: PathBuf,
    /// Agent state file used to resume the conversation.
    #[serde(default)]
    pub session_file: Option<PathBuf>,
    /// Title derived from the first prompt.
    #[serde(default)]
    pub title: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Fresh record stamped with the current time.
    #[must_use]
    pub fn new(session_id: impl Into<String>, cwd: PathBuf, session_file: Option<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            cwd,
            session_file,
            title: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bump `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Repository of [`SessionRecord`]s.
pub trait SessionStore: Send + Sync {
    /// Look up a record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Persistence` if the backing storage cannot be read.
    fn get(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// Insert or replace a record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Persistence` or `AppError::Io` if the write fails.
    fn put(&self, record: SessionRecord) -> Result<()>;

    /// All records, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Persistence` if the backing storage cannot be read.
    fn list(&self) -> Result<Vec<SessionRecord>>;

    /// Delete a record, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Persistence` or `AppError::Io` if the write fails.
    fn remove(&self, session_id: &str) -> Result<bool>;
}

fn sort_recent_first(records: &mut [SessionRecord]) {
    records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}
