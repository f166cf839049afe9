//! Session store backed by a single JSON file.
//!
//! The whole map is rewritten on every change through a temporary file in
//! the same directory that is atomically renamed over the target, so a crash
//! never leaves a half-written store behind.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tempfile::NamedTempFile;
use tracing::debug;

use super::{sort_recent_first, SessionRecord, SessionStore};
use crate::{AppError, Result};

type Records = BTreeMap<String, SessionRecord>;

/// JSON-file session store.
#[derive(Debug)]
pub struct JsonSessionStore {
    path: PathBuf,
    records: Mutex<Records>,
}

impl JsonSessionStore {
    /// Open the store at `path`, loading existing records. A missing file is
    /// an empty store.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file exists but cannot be read, or
    /// `AppError::Persistence` if it is not a valid store document.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => Records::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|err| {
                AppError::Persistence(format!("invalid session store {}: {err}", path.display()))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Records::new(),
            Err(err) => {
                return Err(AppError::Io(format!(
                    "failed to read session store {}: {err}",
                    path.display()
                )))
            }
        };
        debug!(path = %path.display(), count = records.len(), "session store opened");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self, records: &Records) -> Result<()> {
        let body = serde_json::to_vec_pretty(records)
            .map_err(|err| AppError::Persistence(format!("failed to encode session store: {err}")))?;

        let parent = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(|err| {
            AppError::Io(format!("failed to create {}: {err}", parent.display()))
        })?;

        let mut tmp = NamedTempFile::new_in(parent)
            .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;
        tmp.write_all(&body)
            .map_err(|err| AppError::Io(format!("failed to write session store: {err}")))?;
        tmp.persist(&self.path).map_err(|err| {
            AppError::Io(format!("failed to persist {}: {err}", self.path.display()))
        })?;
        Ok(())
    }
}

impl SessionStore for JsonSessionStore {
    fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.lock().get(session_id).cloned())
    }

    fn put(&self, record: SessionRecord) -> Result<()> {
        let mut records = self.lock();
        records.insert(record.session_id.clone(), record);
        self.save(&records)
    }

    fn list(&self) -> Result<Vec<SessionRecord>> {
        let mut list: Vec<_> = self.lock().values().cloned().collect();
        sort_recent_first(&mut list);
        Ok(list)
    }

    fn remove(&self, session_id: &str) -> Result<bool> {
        let mut records = self.lock();
        let existed = records.remove(session_id).is_some();
        if existed {
            self.save(&records)?;
        }
        Ok(existed)
    }
}
