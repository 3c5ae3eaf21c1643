// Application state module
// Shared state handed to every connection task

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::types::Config;
use crate::store::JsonStore;

/// Application state
pub struct AppState {
    pub config: Config,
    /// The single storage primitive every handler depends on
    pub store: Arc<dyn JsonStore>,

    // Cached config value for fast access without locks
    pub cached_access_log: AtomicBool,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn JsonStore>) -> Self {
        let cached_access_log = AtomicBool::new(config.logging.access_log);
        Self {
            config,
            store,
            cached_access_log,
        }
    }
}
