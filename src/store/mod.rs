//! Store module
//!
//! The single storage primitive the request router depends on: a key-value
//! store holding whole JSON values. Every value carries a version so that
//! read-modify-write cycles can detect concurrent writers instead of
//! silently losing updates.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{StorageBackend, StorageConfig};

/// Monotonic per-key version. An absent key has version 0.
pub type Version = u64;

/// A value read from the store together with the version to pass back
/// on the next `put` for that key.
#[derive(Debug, Clone)]
pub struct Versioned {
    /// `None` when the key has never been written
    pub value: Option<Value>,
    pub version: Version,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer updated the key between get and put
    #[error("version conflict on key '{key}': expected {expected}, current {current}")]
    VersionConflict {
        key: String,
        expected: Version,
        current: Version,
    },

    #[error("storage i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize value for key '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Whole-value JSON persistence with optimistic concurrency.
///
/// `get` and `put` are each atomic; there is no cross-call transaction.
/// Callers that mutate must pass the version they read and retry on
/// `VersionConflict`.
#[async_trait]
pub trait JsonStore: Send + Sync {
    /// Fetch the value under `key`, or version 0 if absent.
    async fn get(&self, key: &str) -> Result<Versioned, StoreError>;

    /// Replace the value under `key` if its current version equals
    /// `expected`. Returns the new version on success.
    async fn put(&self, key: &str, value: Value, expected: Version) -> Result<Version, StoreError>;
}

/// Open the store backend selected by configuration.
pub fn open(cfg: &StorageConfig) -> Result<Arc<dyn JsonStore>, StoreError> {
    match cfg.backend {
        StorageBackend::Memory => Ok(Arc::new(memory::MemoryStore::new())),
        StorageBackend::File => Ok(Arc::new(file::FileStore::open(&cfg.data_dir)?)),
    }
}
