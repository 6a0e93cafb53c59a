//! Opaque key-value storage for counters and persisted extras.
//!
//! Keys are namespaced strings such as `stats:max-local`. Durability is
//! best effort: [`JsonFileStorage`] rewrites its file on flush.

use crate::error::StorageError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub trait Storage {
    fn get(&self, key: &str) -> Option<&Value>;

    /// Set a key, or delete it with `None`.
    fn set(&mut self, key: &str, value: Option<Value>);

    fn flush(&mut self) -> Result<(), StorageError>;

    /// Integer value of a key, if present and numeric.
    fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }
}

/// Volatile storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: BTreeMap<String, Value>,
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    fn set(&mut self, key: &str, value: Option<Value>) {
        match value {
            Some(v) => {
                self.data.insert(key.to_string(), v);
            }
            None => {
                self.data.remove(key);
            }
        }
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Storage backed by a JSON object on disk.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    inner: MemoryStorage,
    dirty: bool,
}

impl JsonFileStorage {
    /// Open the file, starting empty if it does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            inner: MemoryStorage { data },
            dirty: false,
        })
    }
}

impl Storage for JsonFileStorage {
    fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: Option<Value>) {
        self.inner.set(key, value);
        self.dirty = true;
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        if !self.dirty {
            return Ok(());
        }
        let content = serde_json::to_string_pretty(&self.inner.data)?;
        std::fs::write(&self.path, content)?;
        self.dirty = false;
        Ok(())
    }
}
