use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{OutboxError, Result};
use crate::event::{DeadLetterEntry, OutboxEvent};
use crate::store::{DeadLetterStore, OutboxStore};

pub const OUTBOX_FILENAME: &str = "outbox.json";
pub const DEAD_LETTER_FILENAME: &str = "dlq.json";

#[derive(Serialize, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct Records<T> {
    events: Vec<T>,
}

/// Replaces `path` with `content` through a synced temp file in the same
/// directory, so readers see either the old or the new file. Missing parent
/// directories are created.
///
/// # Errors
///
/// Returns the I/O error of the step that failed.
pub fn write_atomically(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// A JSON document of the form `{"events": [...]}`, rewritten atomically on
/// every change.
#[derive(Debug)]
struct JsonRecordFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonRecordFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn load<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|source| OutboxError::Read {
            path: self.path.clone(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let records: Records<T> =
            serde_json::from_str(&content).map_err(|source| OutboxError::Parse {
                path: self.path.clone(),
                source,
            })?;
        Ok(records.events)
    }

    fn save<T: Serialize>(&self, events: Vec<T>) -> Result<()> {
        let content = serde_json::to_string_pretty(&Records { events }).map_err(|source| {
            OutboxError::Serialize {
                path: self.path.clone(),
                source,
            }
        })?;

        write_atomically(&self.path, content.as_bytes()).map_err(|source| OutboxError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Load, apply `change`, save; all under the file lock.
    fn modify<T, R, F>(&self, change: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut Vec<T>) -> Result<R>,
    {
        let _guard = self.lock.lock().map_err(|_| OutboxError::LockPoisoned)?;
        let mut events = self.load()?;
        let result = change(&mut events)?;
        self.save(events)?;
        Ok(result)
    }

    fn read<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let _guard = self.lock.lock().map_err(|_| OutboxError::LockPoisoned)?;
        self.load()
    }
}

/// Outbox store persisted as a JSON file.
#[derive(Debug)]
pub struct JsonFileOutboxStore {
    file: JsonRecordFile,
}

impl JsonFileOutboxStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonRecordFile::new(path.into()),
        }
    }

    /// Store at `<dir>/outbox.json`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(OUTBOX_FILENAME))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.file.path
    }
}

impl OutboxStore for JsonFileOutboxStore {
    fn append(&self, event: OutboxEvent) -> Result<()> {
        debug!(path = %self.file.path.display(), event_id = %event.id, "appending outbox event");
        self.file.modify(|events: &mut Vec<OutboxEvent>| {
            events.push(event);
            Ok(())
        })
    }

    fn events(&self) -> Result<Vec<OutboxEvent>> {
        self.file.read()
    }

    fn update(&self, event: &OutboxEvent) -> Result<()> {
        self.file.modify(|events: &mut Vec<OutboxEvent>| {
            let slot = events
                .iter_mut()
                .find(|e| e.id == event.id)
                .ok_or_else(|| OutboxError::UnknownEvent(event.id.clone()))?;
            *slot = event.clone();
            Ok(())
        })
    }

    fn update_pending(
        &self,
        id: &str,
        change: &mut dyn FnMut(&mut OutboxEvent),
    ) -> Result<Option<OutboxEvent>> {
        self.file.modify(|events: &mut Vec<OutboxEvent>| {
            let slot = events
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| OutboxError::UnknownEvent(id.to_string()))?;
            if !slot.is_pending() {
                return Ok(None);
            }
            change(&mut *slot);
            Ok(Some(slot.clone()))
        })
    }
}

/// Dead-letter store persisted as a JSON file.
#[derive(Debug)]
pub struct JsonFileDeadLetterStore {
    file: JsonRecordFile,
}

impl JsonFileDeadLetterStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonRecordFile::new(path.into()),
        }
    }

    /// Store at `<dir>/dlq.json`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(DEAD_LETTER_FILENAME))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.file.path
    }
}

impl DeadLetterStore for JsonFileDeadLetterStore {
    fn push(&self, entry: DeadLetterEntry) -> Result<()> {
        self.file.modify(|entries: &mut Vec<DeadLetterEntry>| {
            entries.push(entry);
            Ok(())
        })
    }

    fn entries(&self) -> Result<Vec<DeadLetterEntry>> {
        self.file.read()
    }
}
