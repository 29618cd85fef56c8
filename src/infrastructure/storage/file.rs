//! JSON file key-value storage
//!
//! Holds every entry in one JSON object on disk. Several processes may
//! share the file, so each call re-reads it and a change rewrites only
//! the touched key through a temp file + rename.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::application::ports::KeyValueStore;
use crate::domain::{SyncError, SyncResult};

/// Durable storage backed by a single JSON file
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileKeyValueStore {
    /// Open the store at `path`.
    ///
    /// A missing file reads as empty; an unreadable or malformed file is
    /// logged and also reads as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let store = Self {
            path,
            lock: Mutex::new(()),
        };
        debug!(path = %store.path.display(), entries = store.load().len(), "Storage opened");
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> BTreeMap<String, String> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Storage file malformed, reading as empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Storage file unreadable, reading as empty");
                BTreeMap::new()
            }
        }
    }

    fn write(&self, entries: &BTreeMap<String, String>) -> SyncResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::Storage(e.to_string()))?;
        }
        let raw = serde_json::to_string_pretty(entries)
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        let tmp = self
            .path
            .with_extension(format!("json.{}.tmp", std::process::id()));
        std::fs::write(&tmp, raw).map_err(|e| SyncError::Storage(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| SyncError::Storage(e.to_string()))
    }

    /// Reload from disk, apply `change` and write back when it reports a change.
    fn update(&self, change: impl FnOnce(&mut BTreeMap<String, String>) -> bool) -> SyncResult<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| SyncError::Storage("storage lock poisoned".to_string()))?;
        let mut entries = self.load();
        if change(&mut entries) {
            self.write(&entries)?;
        }
        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> SyncResult<Option<String>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| SyncError::Storage("storage lock poisoned".to_string()))?;
        Ok(self.load().remove(key))
    }

    fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string()).as_deref() != Some(value)
        })
    }

    fn remove(&self, key: &str) -> SyncResult<()> {
        self.update(|entries| entries.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("ride-store-{}", uuid::Uuid::new_v4()))
            .join("state.json")
    }

    #[test]
    fn entries_survive_reopen() {
        let path = temp_path();
        {
            let store = FileKeyValueStore::open(&path);
            store.set("activeBookingId", "42").unwrap();
            store.set("token", "t-1").unwrap();
            store.remove("token").unwrap();
        }

        let reopened = FileKeyValueStore::open(&path);
        assert_eq!(reopened.get("activeBookingId").unwrap().as_deref(), Some("42"));
        assert_eq!(reopened.get("token").unwrap(), None);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn writers_sharing_a_file_keep_each_others_keys() {
        let path = temp_path();
        let watcher = FileKeyValueStore::open(&path);
        watcher.set("activeBookingId", "42").unwrap();

        let login = FileKeyValueStore::open(&path);
        login.set("token", "fresh-jwt").unwrap();
        assert_eq!(watcher.get("token").unwrap().as_deref(), Some("fresh-jwt"));

        watcher.remove("activeBookingId").unwrap();

        let reopened = FileKeyValueStore::open(&path);
        assert_eq!(reopened.get("token").unwrap().as_deref(), Some("fresh-jwt"));
        assert_eq!(reopened.get("activeBookingId").unwrap(), None);

        let canceller = FileKeyValueStore::open(&path);
        watcher.set("activeBookingId", "43").unwrap();
        canceller.remove("activeBookingId").unwrap();
        watcher.set("activeRoute", "{}").unwrap();
        assert_eq!(reopened.get("activeBookingId").unwrap(), None);
        assert_eq!(reopened.get("activeRoute").unwrap().as_deref(), Some("{}"));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn malformed_file_starts_empty() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let store = FileKeyValueStore::open(&path);
        assert_eq!(store.get("activeBookingId").unwrap(), None);

        store.set("activeBookingId", "7").unwrap();
        let reopened = FileKeyValueStore::open(&path);
        assert_eq!(reopened.get("activeBookingId").unwrap().as_deref(), Some("7"));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn missing_file_is_not_created_by_reads() {
        let path = temp_path();
        let store = FileKeyValueStore::open(&path);
        assert_eq!(store.get("anything").unwrap(), None);
        store.remove("anything").unwrap();
        assert!(!path.exists());
    }
}
