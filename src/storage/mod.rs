//! Object storage for raw snapshots.
//!
//! The raw layer is a bucket of JSON objects addressed by slash-separated
//! keys (see [`paths`]). [`ObjectStore`] is the capability the pipeline and
//! the curation step depend on; [`LocalObjectStore`] keeps the bucket on disk
//! and [`MemoryObjectStore`] keeps it in memory.

mod error;
mod local;
mod memory;
pub mod paths;

use async_trait::async_trait;
use serde_json::Value;

pub use error::StorageError;
pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;

/// Key to JSON-blob storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes `value` at `key`, replacing any existing object.
    async fn put_json(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    /// Reads the object at `key`; `Ok(None)` when it does not exist.
    async fn get_json(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Lists keys of `.json` objects directly under `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}
