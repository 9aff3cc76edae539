//! Small key-value store for UI preferences (last chosen folder, spreadsheet
//! display-name aliases). Only the HTTP layer reads or writes it.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::error::PreferenceError;

pub const FOLDER_KEY: &str = "driveFolderId";
pub const SHEET_ALIAS_KEY: &str = "sheetAliasMap";

pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<(), PreferenceError>;
}

// Every write swaps whole entries, so a poisoned map is still consistent.
fn lock(values: &Mutex<Map<String, Value>>) -> MutexGuard<'_, Map<String, Value>> {
    values.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
pub struct MemoryPreferences {
    values: Mutex<Map<String, Value>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<Value> {
        lock(&self.values).get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), PreferenceError> {
        lock(&self.values).insert(key.to_string(), value);
        Ok(())
    }
}

/// One JSON object on disk, rewritten in full on every `set`.
pub struct JsonFilePreferences {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonFilePreferences {
    /// Opens `path`, starting empty when the file is missing or unreadable.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Map<String, Value>>(&content) {
                Ok(map) => map,
                Err(e) => {
                    warn!("[prefs] ignoring unreadable {:?}: {}", path, e);
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };
        info!("[prefs] 💾 {} preferences loaded from {:?}", values.len(), path);

        Self {
            path,
            values: Mutex::new(values),
        }
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn get(&self, key: &str) -> Option<Value> {
        lock(&self.values).get(key).cloned()
    }

    /// Memory only changes once the file write succeeded.
    fn set(&self, key: &str, value: Value) -> Result<(), PreferenceError> {
        let mut values = lock(&self.values);
        let mut next = values.clone();
        next.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(&next)?;
        std::fs::write(&self.path, content)?;

        *values = next;
        Ok(())
    }
}
