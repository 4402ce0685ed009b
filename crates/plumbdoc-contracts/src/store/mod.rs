//! Key-value persistence modelled on browser local storage: string values
//! under fixed keys, one JSON array per document type.

use std::path::PathBuf;

mod autosave;
mod file;
mod local;
mod memory;

pub use autosave::{AutosaveReport, Autosaver, DEFAULT_AUTOSAVE_DELAY};
pub use file::FileStore;
pub use local::{LocalStore, UpsertOutcome, SETTINGS_KEY};
pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("value stored under '{key}' is malformed: {reason}")]
    Malformed { key: String, reason: String },

    #[error("failed to serialize value for '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage lock poisoned")]
    Poisoned,
}

/// `apply` receives the current value and returns the replacement, or `None`
/// to leave the key as it is.
pub type ItemUpdate<'a> =
    dyn FnMut(Option<String>) -> Result<Option<String>, StoreError> + 'a;

pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove_item(&self, key: &str) -> Result<(), StoreError>;
    fn keys(&self) -> Result<Vec<String>, StoreError>;
    /// Read-modify-write of one key without letting another writer in
    /// between the read and the write.
    fn update_item(&self, key: &str, apply: &mut ItemUpdate<'_>) -> Result<(), StoreError>;
}
