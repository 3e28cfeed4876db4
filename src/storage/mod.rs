//! Settings persistence layer
//!
//! - Key/value settings repository (file system and in-memory)
//! - Persisted models (scan cursor)

mod file_system;
mod memory;
mod models;

pub use file_system::FileSettingsStore;
pub use memory::MemorySettingsStore;
pub use models::ScanCursor;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

/// Key/value store for small JSON settings, keyed by a stable per-chain
/// string
pub trait SettingsRepository: Send + Sync {
    fn load_value(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError>;

    fn store_value(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError>;
}

/// Typed access on top of [`SettingsRepository`]
pub trait SettingsRepositoryExt {
    fn get_setting<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError>;

    fn put_setting<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError>;
}

impl<S: SettingsRepository + ?Sized> SettingsRepositoryExt for S {
    fn get_setting<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.load_value(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn put_setting<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        self.store_value(key, serde_json::to_value(value)?)
    }
}
