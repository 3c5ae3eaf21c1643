//! In-memory store backend
//!
//! Default backend; contents are lost on shutdown. Also the backend every
//! handler test runs against.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{JsonStore, StoreError, Version, Versioned};

struct Entry {
    value: Value,
    version: Version,
}

pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JsonStore for MemoryStore {
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

        let version = current + 1;
        entries.insert(key.to_string(), Entry { value, version });
        Ok(version)
    }
}
