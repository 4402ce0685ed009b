use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{ItemUpdate, KeyValueStore, StoreError};

/// Process-local store, mostly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        let items = self.items.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut items = self.items.lock().map_err(|_| StoreError::Poisoned)?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        let mut items = self.items.lock().map_err(|_| StoreError::Poisoned)?;
        items.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let items = self.items.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(items.keys().cloned().collect())
    }

    fn update_item(&self, key: &str, apply: &mut ItemUpdate<'_>) -> Result<(), StoreError> {
        let mut items = self.items.lock().map_err(|_| StoreError::Poisoned)?;
        if let Some(next) = apply(items.get(key).cloned())? {
            items.insert(key.to_string(), next);
        }
        Ok(())
    }
}
