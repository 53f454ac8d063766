//! Generic key-value state persistence.
//!
//! The host shell exposes a state database to extensions; this is its
//! stand-in. Values are JSON, stored together in one file under the
//! user's config directory:
//! - macOS: ~/Library/Application Support/gs-inspector/state.json
//! - Linux: ~/.config/gs-inspector/state.json
//! - Windows: C:\Users\<User>\AppData\Roaming\gs-inspector\state.json

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;

use log::warn;
use serde_json::Value;

/// Key→JSON persistence, best-effort on the write path.
pub trait StateStore: Send + Sync {
    fn fetch(&self, key: &str) -> Option<Value>;
    fn save(&self, key: &str, value: Value);
}

/// File-backed state store.
pub struct FileStateStore {
    path: PathBuf,
    cache: StdMutex<HashMap<String, Value>>,
}

impl FileStateStore {
    /// Open the default store under the user config directory.
    pub fn open_default() -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("gs-inspector");
        Self::open(dir.join("state.json"))
    }

    /// Open a store at an explicit path. Missing or unreadable files
    /// start empty.
    pub fn open(path: PathBuf) -> Self {
        let cache = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        Self {
            path,
            cache: StdMutex::new(cache),
        }
    }

    fn persist(&self, entries: &HashMap<String, Value>) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("could not create state directory {:?}: {}", parent, e);
                return;
            }
        }
        match serde_json::to_string_pretty(entries) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    warn!("could not persist state to {:?}: {}", self.path, e);
                }
            }
            Err(e) => warn!("could not serialize state: {}", e),
        }
    }
}

impl StateStore for FileStateStore {
    fn fetch(&self, key: &str) -> Option<Value> {
        let cache = self.cache.lock().expect("state lock poisoned");
        cache.get(key).cloned()
    }

    fn save(&self, key: &str, value: Value) {
        let mut cache = self.cache.lock().expect("state lock poisoned");
        cache.insert(key.to_string(), value);
        self.persist(&cache);
    }
}
