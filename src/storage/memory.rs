use std::collections::HashMap;
use std::sync::Mutex;

use super::SettingsRepository;
use crate::error::StorageError;

/// Settings kept in memory only; used by tests and ephemeral runs
#[derive(Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, serde_json::Value>> {
        // a poisoned map is still consistent: every write is a single insert
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SettingsRepository for MemorySettingsStore {
    fn load_value(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    fn store_value(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError> {
        self.lock().insert(key.to_string(), value);
        Ok(())
    }
}
