//! The persistence collaborator for finished recordings.
//!
//! Saving happens only at explicit checkpoints (a recording closing), never
//! on the emit hot path. Two backends ship with the crate: an in-memory
//! store for tests and ephemeral sessions, and a single JSON file.
//! [`recording_store`] picks one from the configured path.

use std::cell::RefCell;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chorus_types::Recording;
use tracing::{debug, warn};

/// Errors raised by persistence backends.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Reading or writing the backing file failed.
    #[error("recording store I/O failed for {path}: {source}")]
    Io {
        /// The backing file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The backing file did not contain a valid recording list.
    #[error("recording store {path} is corrupt: {source}")]
    Corrupt {
        /// The backing file.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },
}

/// Durable storage for recordings.
pub trait Persistence {
    /// Replace the stored set with `recordings`.
    ///
    /// # Errors
    ///
    /// Backend-specific [`PersistenceError`].
    fn save(&self, recordings: &[Recording]) -> Result<(), PersistenceError>;

    /// Load the stored set. An empty store yields an empty list.
    ///
    /// # Errors
    ///
    /// Backend-specific [`PersistenceError`].
    fn load(&self) -> Result<Vec<Recording>, PersistenceError>;

    /// Move stored data that [`load`](Self::load) could not read out of the
    /// way, so the next `save` does not overwrite it. Returns where it went;
    /// `None` when the backend has nothing to keep.
    ///
    /// # Errors
    ///
    /// Backend-specific [`PersistenceError`]. Callers must not save over the
    /// store after a failure here.
    fn set_aside(&self) -> Result<Option<PathBuf>, PersistenceError> {
        Ok(None)
    }
}

/// The store a recorder writes to: `path` as a JSON file, or memory only
/// when `path` is blank.
pub fn recording_store(path: &str) -> Rc<dyn Persistence> {
    if path.trim().is_empty() {
        debug!("no recordings path, keeping recordings in memory");
        Rc::new(MemoryPersistence::new())
    } else {
        Rc::new(JsonFilePersistence::new(path))
    }
}

/// Keeps recordings in memory.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    stored: RefCell<Vec<Recording>>,
    saves: RefCell<u64>,
}

impl MemoryPersistence {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> u64 {
        *self.saves.borrow()
    }
}

impl Persistence for MemoryPersistence {
    fn save(&self, recordings: &[Recording]) -> Result<(), PersistenceError> {
        *self.stored.borrow_mut() = recordings.to_vec();
        let mut saves = self.saves.borrow_mut();
        *saves = saves.saturating_add(1);
        Ok(())
    }

    fn load(&self) -> Result<Vec<Recording>, PersistenceError> {
        Ok(self.stored.borrow().clone())
    }
}

/// Stores all recordings as one pretty-printed JSON array.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    /// Use `path` as the backing file. Nothing is touched until the first
    /// call.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn corrupt(&self, source: serde_json::Error) -> PersistenceError {
        PersistenceError::Corrupt {
            path: self.path.clone(),
            source,
        }
    }

    /// `<path>.corrupt`, next to the backing file.
    pub fn quarantine_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".corrupt");
        PathBuf::from(name)
    }
}

impl Persistence for JsonFilePersistence {
    fn save(&self, recordings: &[Recording]) -> Result<(), PersistenceError> {
        let body = serde_json::to_vec_pretty(recordings).map_err(|e| self.corrupt(e))?;
        std::fs::write(&self.path, body).map_err(|e| self.io(e))?;
        debug!(path = %self.path.display(), count = recordings.len(), "recordings saved");
        Ok(())
    }

    fn load(&self) -> Result<Vec<Recording>, PersistenceError> {
        let body = match std::fs::read(&self.path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io(e)),
        };
        serde_json::from_slice(&body).map_err(|e| self.corrupt(e))
    }

    fn set_aside(&self) -> Result<Option<PathBuf>, PersistenceError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let target = self.quarantine_path();
        std::fs::rename(&self.path, &target).map_err(|e| self.io(e))?;
        warn!(
            path = %self.path.display(),
            moved_to = %target.display(),
            "unreadable recording store set aside"
        );
        Ok(Some(target))
    }
}
