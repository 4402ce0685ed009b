use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use serde_json::{Map, Value};

use super::{ItemUpdate, KeyValueStore, StoreError};

/// All keys live in one JSON object file. Every call re-reads the file so
/// several handles on the same path observe each other's writes; writes go
/// through a sibling temp file and a rename.
///
/// Handles opened on the same path in one process share a lock. Separate
/// processes writing the same file are not coordinated.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock = path_lock(&path);
        Self { path, lock }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_object(&self) -> Result<Map<String, Value>, StoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        let parsed: Value = serde_json::from_str(&raw).map_err(|err| StoreError::Corrupt {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;
        match parsed {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::Corrupt {
                path: self.path.clone(),
                reason: format!("expected a JSON object, found {}", json_type_name(&other)),
            }),
        }
    }

    fn write_object(&self, payload: Map<String, Value>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let rendered = serde_json::to_string_pretty(&Value::Object(payload)).map_err(|source| {
            StoreError::Serialize {
                key: self.path.display().to_string(),
                source,
            }
        })?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, rendered).map_err(io_err)?;
        std::fs::rename(&tmp_path, &self.path).map_err(io_err)?;
        Ok(())
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut Map<String, Value>) -> Result<bool, StoreError>,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut on_disk = self.read_object()?;
        if apply(&mut on_disk)? {
            self.write_object(on_disk)?;
        }
        Ok(())
    }
}

fn path_lock(path: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let mut locks = match LOCKS.get_or_init(Default::default).lock() {
        Ok(locks) => locks,
        Err(poisoned) => poisoned.into_inner(),
    };
    Arc::clone(locks.entry(path.to_path_buf()).or_default())
}

fn item_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let payload = self.read_object()?;
        Ok(payload.get(key).map(item_text))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(|payload| {
            let next = Value::String(value.to_string());
            if payload.get(key) == Some(&next) {
                return Ok(false);
            }
            payload.insert(key.to_string(), next);
            Ok(true)
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.update(|payload| Ok(payload.remove(key).is_some()))
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.read_object()?.keys().cloned().collect())
    }

    fn update_item(&self, key: &str, apply: &mut ItemUpdate<'_>) -> Result<(), StoreError> {
        self.update(|payload| match apply(payload.get(key).map(item_text))? {
            Some(next) => {
                payload.insert(key.to_string(), Value::String(next));
                Ok(true)
            }
            None => Ok(false),
        })
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
