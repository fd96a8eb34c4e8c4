//! In-memory object store for dry runs and tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::ObjectStore;
use super::error::StorageError;

/// [`ObjectStore`] holding objects in a shared map.
///
/// Clones share the same contents, so a caller can keep a handle and inspect
/// what a pipeline wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl MemoryObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored key in order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Returns a copy of the object at `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Stores `value` at `key` synchronously.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.lock().insert(key.into(), value);
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_json(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::invalid_key(key));
        }
        self.insert(key, value.clone());
        Ok(())
    }

    async fn get_json(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.get(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let dir = format!("{}/", prefix.trim_end_matches('/'));
        Ok(self
            .lock()
            .keys()
            .filter(|key| {
                key.strip_prefix(&dir)
                    .is_some_and(|rest| !rest.contains('/') && rest.ends_with(".json"))
            })
            .cloned()
            .collect())
    }
}
