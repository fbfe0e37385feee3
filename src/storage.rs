//! Destinations for finalized recordings.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::info;

use crate::error::StorageError;
use crate::types::Recording;

/// Receives each finalized [`Recording`].  Ownership moves to the store.
///
/// Called synchronously from the notification loop, so implementations
/// should be quick.
pub trait Storage {
    fn persist(&mut self, recording: Recording) -> Result<(), StorageError>;
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn persist(&mut self, recording: Recording) -> Result<(), StorageError> {
        (**self).persist(recording)
    }
}

/// Keeps recordings in memory.  Clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    recordings: Arc<Mutex<Vec<Recording>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything persisted so far.
    pub fn recordings(&self) -> Vec<Recording> {
        self.recordings
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn len(&self) -> usize {
        self.recordings().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStore {
    fn persist(&mut self, recording: Recording) -> Result<(), StorageError> {
        self.recordings
            .lock()
            .map_err(|_| StorageError::Rejected("memory store lock poisoned".into()))?
            .push(recording);
        Ok(())
    }
}

/// Writes one pretty-printed JSON file per recording into a directory.
///
/// File names are `<start-time>_<id>.json` so a directory listing sorts
/// chronologically.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    /// Create the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, recording: &Recording) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.json",
            recording.started_at.format("%Y%m%dT%H%M%S"),
            recording.id
        ))
    }

    /// Read a recording previously written by this store.
    pub fn load(path: impl AsRef<Path>) -> Result<Recording, StorageError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl Storage for JsonDirStore {
    fn persist(&mut self, recording: Recording) -> Result<(), StorageError> {
        if !recording.is_finalized() {
            return Err(StorageError::Rejected(format!(
                "recording {} is still open",
                recording.id
            )));
        }
        let path = self.path_for(&recording);
        let json = serde_json::to_string_pretty(&recording)?;
        fs::write(&path, json)?;
        info!("recording {} written to {}", recording.id, path.display());
        Ok(())
    }
}
