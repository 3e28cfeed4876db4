use std::fs;
use std::path::PathBuf;

use super::SettingsRepository;
use crate::error::StorageError;

/// One pretty-printed JSON file per setting key
#[derive(Clone)]
pub struct FileSettingsStore {
    base_path: PathBuf,
}

impl FileSettingsStore {
    /// Create a new store with the default base directory ("./listener-data")
    pub fn new() -> Self {
        Self {
            base_path: PathBuf::from("./listener-data"),
        }
    }

    /// Create a store with a custom base directory (for testing)
    pub fn new_with_base_dir(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Get the base directory path for settings
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_path
    }

    fn setting_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", key))
    }

    /// List all stored setting keys
    pub fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        if !self.base_path.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl Default for FileSettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsRepository for FileSettingsStore {
    fn load_value(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        let path = self.setting_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Written to a temporary file and renamed, so a crash leaves either the
    /// old or the new value on disk
    fn store_value(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError> {
        fs::create_dir_all(&self.base_path)?;
        let path = self.setting_path(key);
        let tmp_path = self.base_path.join(format!("{}.json.tmp", key));

        let json = serde_json::to_string_pretty(&value)?;
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &path)?;
        log::debug!("Persisted setting {}", key);
        Ok(())
    }
}
