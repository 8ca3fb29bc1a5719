//! Durable storage for the pending queue.
//!
//! The whole queue is written as one JSON array after every mutation, so a
//! restart picks up exactly what was pending.

use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use syncdeck_types::QueueItem;

use crate::QueueError;

/// Default file name for [`FileStorage`].
pub const DEFAULT_QUEUE_FILE: &str = "syncdeck-queue.json";

/// Key-value style persistence of the queue.
///
/// Calls are synchronous: `enqueue` persists before it returns and never
/// awaits.
pub trait QueueStorage: Send + Sync + Debug {
    /// Load the persisted queue. A store that was never written is empty.
    fn load(&self) -> Result<Vec<QueueItem>, QueueError>;

    /// Replace the persisted queue.
    fn save(&self, items: &[QueueItem]) -> Result<(), QueueError>;
}

/// Persists the queue as a JSON file.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a crash mid-write leaves the previous queue intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_QUEUE_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl QueueStorage for FileStorage {
    fn load(&self) -> Result<Vec<QueueItem>, QueueError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn save(&self, items: &[QueueItem]) -> Result<(), QueueError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(items)?;
        let temp = self.temp_path();
        fs::write(&temp, json)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

/// In-memory storage holding the serialized JSON.
///
/// Clones share the same slot, so a second queue built from a clone sees
/// what the first one persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-filled with raw contents, valid or not.
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(contents.into()))),
        }
    }

    /// The raw persisted JSON, if anything was saved.
    pub fn contents(&self) -> Option<String> {
        self.slot.lock().clone()
    }
}

impl QueueStorage for MemoryStorage {
    fn load(&self) -> Result<Vec<QueueItem>, QueueError> {
        match self.slot.lock().as_deref() {
            Some(text) => Ok(serde_json::from_str(text)?),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, items: &[QueueItem]) -> Result<(), QueueError> {
        let json = serde_json::to_string(items)?;
        *self.slot.lock() = Some(json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use syncdeck_types::NewQueueItem;

    fn items() -> Vec<QueueItem> {
        vec![
            NewQueueItem::new("kpi_update", json!({"kpi": "mrr", "value": 12}))
                .priority(2)
                .into_item("a".into(), 1_700_000_000_000),
            NewQueueItem::new("goal_update", json!({"goal": "hire", "done": true}))
                .into_item("b".into(), 1_700_000_000_500),
        ]
    }

    #[test]
    fn file_storage_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("queue.json"));
        assert!(storage.load().unwrap().is_empty());
    }

    #[test]
    fn file_storage_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("queue.json");
        let storage = FileStorage::new(&path);

        let mut saved = items();
        saved[1].retry_count = 2;
        storage.save(&saved).unwrap();

        let reloaded = FileStorage::new(&path).load().unwrap();
        assert_eq!(reloaded, saved);
        assert!(!storage.temp_path().exists());
    }

    #[test]
    fn file_storage_uses_camel_case_array() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("queue.json"));
        storage.save(&items()[..1]).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(storage.path()).unwrap()).unwrap();
        assert_eq!(raw[0]["type"], "kpi_update");
        assert_eq!(raw[0]["retryCount"], 0);
    }

    #[test]
    fn file_storage_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        fs::write(&path, "{not json").unwrap();

        let err = FileStorage::new(&path).load().unwrap_err();
        assert!(matches!(err, QueueError::Serialize(_)));
    }

    #[test]
    fn memory_storage_clones_share_contents() {
        let storage = MemoryStorage::new();
        storage.clone().save(&items()).unwrap();

        assert_eq!(storage.load().unwrap(), items());
        assert!(storage.contents().unwrap().starts_with('['));
    }
}
