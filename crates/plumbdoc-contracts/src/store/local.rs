use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{FileStore, KeyValueStore, MemoryStore, StoreError};
use crate::documents::{CompanySettings, Document, DocumentKind, DocumentSummary};

pub const SETTINGS_KEY: &str = "plumbdoc_settings";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Typed collections on top of a [`KeyValueStore`].
///
/// Absent keys read as empty collections. Anything else that goes wrong is
/// returned to the caller; [`LocalStore::fetch_all_or_default`] is there for
/// callers that prefer to degrade to an empty list.
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn KeyValueStore>,
}

impl LocalStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileStore::new(path)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn backend(&self) -> &dyn KeyValueStore {
        self.backend.as_ref()
    }

    pub fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.backend
            .get_item(key)?
            .map(|raw| decode_item(key, &raw))
            .transpose()
    }

    pub fn write_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        self.backend.set_item(key, &encode_item(key, value)?)
    }

    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.backend.remove_item(key)
    }

    pub fn fetch_raw(&self, kind: DocumentKind) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .read_json::<Vec<Value>>(kind.storage_key())?
            .unwrap_or_default())
    }

    pub fn get_raw(&self, kind: DocumentKind, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .fetch_raw(kind)?
            .into_iter()
            .find(|record| record_id(record) == Some(id)))
    }

    /// Replaces the record with the same id in place, or puts it at the head.
    ///
    /// The collection is read and rewritten under the backend's lock.
    pub fn upsert_raw(
        &self,
        kind: DocumentKind,
        record: Value,
    ) -> Result<UpsertOutcome, StoreError> {
        let key = kind.storage_key();
        let Some(id) = record_id(&record).map(str::to_string) else {
            return Err(StoreError::Malformed {
                key: key.to_string(),
                reason: "record has no string id".to_string(),
            });
        };
        let mut pending = Some(record);
        let mut outcome = UpsertOutcome::Inserted;
        self.backend.update_item(key, &mut |current| {
            let Some(record) = pending.take() else {
                return Ok(None);
            };
            let mut records = decode_collection(key, current)?;
            match records
                .iter_mut()
                .find(|existing| record_id(existing) == Some(id.as_str()))
            {
                Some(existing) => {
                    *existing = record;
                    outcome = UpsertOutcome::Updated;
                }
                None => records.insert(0, record),
            }
            encode_item(key, &records).map(Some)
        })?;
        Ok(outcome)
    }

    /// Returns whether a record was removed.
    pub fn delete_raw(&self, kind: DocumentKind, id: &str) -> Result<bool, StoreError> {
        let key = kind.storage_key();
        let mut removed = false;
        self.backend.update_item(key, &mut |current| {
            let mut records = decode_collection(key, current)?;
            let before = records.len();
            records.retain(|record| record_id(record) != Some(id));
            removed = records.len() != before;
            if !removed {
                return Ok(None);
            }
            encode_item(key, &records).map(Some)
        })?;
        Ok(removed)
    }

    pub fn summaries(&self, kind: DocumentKind) -> Result<Vec<DocumentSummary>, StoreError> {
        Ok(self
            .fetch_raw(kind)?
            .iter()
            .filter_map(|record| DocumentSummary::from_value(kind, record))
            .collect())
    }

    pub fn fetch_all<T: Document>(&self) -> Result<Vec<T>, StoreError> {
        self.fetch_raw(T::KIND)?
            .into_iter()
            .map(|record| decode_record(T::KIND, record))
            .collect()
    }

    pub fn fetch_all_or_default<T: Document>(&self) -> Vec<T> {
        match self.fetch_all::<T>() {
            Ok(records) => records,
            Err(err) => {
                let kind = T::KIND;
                tracing::warn!(%kind, error = %err, "reading collection failed; treating as empty");
                Vec::new()
            }
        }
    }

    pub fn get<T: Document>(&self, id: &str) -> Result<Option<T>, StoreError> {
        self.get_raw(T::KIND, id)?
            .map(|record| decode_record(T::KIND, record))
            .transpose()
    }

    pub fn upsert<T: Document>(&self, document: &T) -> Result<UpsertOutcome, StoreError> {
        let record = serde_json::to_value(document).map_err(|source| StoreError::Serialize {
            key: T::KIND.storage_key().to_string(),
            source,
        })?;
        self.upsert_raw(T::KIND, record)
    }

    pub fn delete<T: Document>(&self, id: &str) -> Result<bool, StoreError> {
        self.delete_raw(T::KIND, id)
    }

    pub fn settings(&self) -> Result<Option<CompanySettings>, StoreError> {
        self.read_json(SETTINGS_KEY)
    }

    pub fn save_settings(&self, settings: &CompanySettings) -> Result<(), StoreError> {
        self.write_json(SETTINGS_KEY, settings)
    }
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

fn decode_item<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|err| StoreError::Malformed {
        key: key.to_string(),
        reason: err.to_string(),
    })
}

fn encode_item<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Serialize {
        key: key.to_string(),
        source,
    })
}

fn decode_collection(key: &str, raw: Option<String>) -> Result<Vec<Value>, StoreError> {
    raw.map(|raw| decode_item(key, &raw))
        .transpose()
        .map(Option::unwrap_or_default)
}

fn decode_record<T: DeserializeOwned>(kind: DocumentKind, record: Value) -> Result<T, StoreError> {
    serde_json::from_value(record).map_err(|err| StoreError::Malformed {
        key: kind.storage_key().to_string(),
        reason: err.to_string(),
    })
}
