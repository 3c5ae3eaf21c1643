//! File-backed store backend
//!
//! One `<key>.json` file per key under the configured data directory.
//! Files are loaded once at startup; every successful put writes through
//! to disk while holding the write lock, so file contents and the
//! in-memory map cannot diverge.
//!
//! Versions are process-local: they restart at 1 after a reload, which is
//! sufficient because every writer re-reads before writing.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::{JsonStore, StoreError, Version, Versioned};
use crate::logger;

struct Entry {
    value: Value,
    version: Version,
}

pub struct FileStore {
    data_dir: PathBuf,
    entries: RwLock<HashMap<String, Entry>>,
}

impl FileStore {
    /// Open the store, creating `data_dir` if needed and loading every
    /// existing `*.json` file. Unparseable files are logged and skipped.
    pub fn open(data_dir: &str) -> Result<Self, StoreError> {
        let data_dir = PathBuf::from(data_dir);
        fs::create_dir_all(&data_dir)?;

        let mut entries = HashMap::new();
        for dir_entry in fs::read_dir(&data_dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match load_value(&path) {
                Some(value) => {
                    entries.insert(key.to_string(), Entry { value, version: 1 });
                }
                None => {
                    logger::log_warning(&format!(
                        "Skipping unreadable store file: {}",
                        path.display()
                    ));
                }
            }
        }

        Ok(Self {
            data_dir,
            entries: RwLock::new(entries),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }
}

/// Read and parse one store file, logging the reason on failure
fn load_value(path: &Path) -> Option<Value> {
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                logger::log_error(&format!("Failed to parse {}: {e}", path.display()));
                None
            }
        },
        Err(e) => {
            logger::log_error(&format!("Failed to read {}: {e}", path.display()));
            None
        }
    }
}

#[async_trait]
impl JsonStore for FileStore {
    async fn get(&self, key: &str) -> Result<Versioned, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).map_or(
            Versioned {
                value: None,
                version: 0,
            },
            |entry| Versioned {
                value: Some(entry.value.clone()),
                version: entry.version,
            },
        ))
    }

    async fn put(&self, key: &str, value: Value, expected: Version) -> Result<Version, StoreError> {
        let mut entries = self.entries.write().await;
        let current = entries.get(key).map_or(0, |entry| entry.version);

        if current != expected {
            return Err(StoreError::VersionConflict {
                key: key.to_string(),
                expected,
                current,
            });
        }

        let serialized =
            serde_json::to_string_pretty(&value).map_err(|source| StoreError::Serialize {
                key: key.to_string(),
                source,
            })?;

        // Write through before updating the map so a failed write
        // leaves both sides on the old state
        fs::write(self.path_for(key), serialized)?;

        let version = current + 1;
        entries.insert(key.to_string(), Entry { value, version });
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "craftboard-store-test-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn test_put_writes_file_and_survives_reopen() {
        let dir = temp_dir("reopen");
        let dir_str = dir.to_string_lossy().to_string();

        {
            let store = FileStore::open(&dir_str).unwrap();
            store
                .put("posts", json!([{"id": 1, "title": "hi"}]), 0)
                .await
                .unwrap();
        }

        assert!(dir.join("posts.json").exists());

        let reopened = FileStore::open(&dir_str).unwrap();
        let read = reopened.get("posts").await.unwrap();
        assert_eq!(read.value, Some(json!([{"id": 1, "title": "hi"}])));
        assert_eq!(read.version, 1);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_stale_put_leaves_file_untouched() {
        let dir = temp_dir("stale");
        let dir_str = dir.to_string_lossy().to_string();

        let store = FileStore::open(&dir_str).unwrap();
        store.put("servers", json!([1]), 0).await.unwrap();

        let err = store.put("servers", json!([2]), 0).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));

        let on_disk: Value =
            serde_json::from_str(&fs::read_to_string(dir.join("servers.json")).unwrap()).unwrap();
        assert_eq!(on_disk, json!([1]));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_skipped_on_open() {
        let dir = temp_dir("corrupt");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("users.json"), "{not json").unwrap();

        let store = FileStore::open(&dir.to_string_lossy()).unwrap();
        let read = store.get("users").await.unwrap();
        assert!(read.value.is_none());
        assert_eq!(read.version, 0);

        let _ = fs::remove_dir_all(&dir);
    }
}
