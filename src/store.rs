//! Key-value persistence for usage counters and license state.
//!
//! Values are stored as JSON so a sled tree and an in-memory map behave
//! identically behind [`KvStore`].

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Number of successful summaries on `lastUsed`.
pub const USAGE_COUNT: &str = "usageCount";
/// Calendar date (`%Y-%m-%d`) the usage count belongs to.
pub const LAST_USED: &str = "lastUsed";
/// License key entered by the user.
pub const LICENSE_KEY: &str = "licenseKey";
/// Cached result of the last successful verification.
pub const IS_PRO: &str = "isPro";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    DbError(#[from] sled::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Minimal key-value store.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Write several keys as a single unit.
    fn set_many(&self, entries: &[(&str, Value)]) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Typed reads on top of [`KvStore`].
pub trait KvStoreExt: KvStore {
    /// Read and deserialize a value. A value of the wrong shape reads as absent.
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        Ok(self
            .get(key)?
            .and_then(|value| serde_json::from_value(value).ok()))
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}

/// Sled-backed store.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open or create storage at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

impl KvStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        match self.db.get(key.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.db.insert(key.as_bytes(), serde_json::to_vec(&value)?)?;
        self.db.flush()?;
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, Value)]) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for (key, value) in entries {
            batch.insert(key.as_bytes(), serde_json::to_vec(value)?);
        }
        self.db.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.db.remove(key.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }
}

/// In-process store, handy for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, Value)]) -> Result<(), StoreError> {
        let mut map = self.entries.lock();
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
