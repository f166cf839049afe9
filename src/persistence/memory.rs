//! In-memory session store.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::{sort_recent_first, SessionRecord, SessionStore};
use crate::Result;

/// Session store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: Mutex<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(session_id).cloned())
    }

    fn put(&self, record: SessionRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert(record.session_id.clone(), record);
        Ok(())
    }

    fn list(&self) -> Result<Vec<SessionRecord>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<_> = records.values().cloned().collect();
        sort_recent_first(&mut list);
        Ok(list)
    }

    fn remove(&self, session_id: &str) -> Result<bool> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.remove(session_id).is_some())
    }
}
