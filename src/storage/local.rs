//! Directory-backed object store.
//!
//! Simulates a bucket on local disk: each key is a relative path under the
//! bucket root and each object is one pretty-printed UTF-8 JSON file.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use super::ObjectStore;
use super::error::StorageError;

/// [`ObjectStore`] rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Creates a store rooted at `root`. The directory is created lazily on
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the bucket root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a key to a path inside the bucket, rejecting keys that would
    /// escape it.
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key.trim_end_matches('/'));
        let well_formed = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !well_formed {
            return Err(StorageError::invalid_key(key));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    #[instrument(skip(self, value), fields(root = %self.root.display()))]
    async fn put_json(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| StorageError::encode(key, e))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }

        // Write-then-rename so a crash never leaves a truncated object behind.
        let mut tmp_name = path.file_name().map(OsString::from).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| StorageError::io(&tmp_path, e))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        debug!(key, bytes = bytes.len(), "stored object");
        Ok(())
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn get_json(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.resolve(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::decode(key, e))
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix = prefix.trim_end_matches('/');
        let dir = self.resolve(prefix)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&dir, e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&dir, e))?
        {
            let path = entry.path();
            let is_json = path.extension().is_some_and(|ext| ext == "json");
            let is_file = entry
                .file_type()
                .await
                .map_err(|e| StorageError::io(&path, e))?
                .is_file();
            if let (true, true, Some(name)) = (is_json, is_file, path.file_name()) {
                keys.push(format!("{prefix}/{}", name.to_string_lossy()));
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_put_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path());

        store
            .put_json("data/2020/AFG.json", &json!([{"value": 1.5}]))
            .await
            .unwrap();

        let on_disk = temp_dir.path().join("data/2020/AFG.json");
        assert!(on_disk.exists());
        let text = std::fs::read_to_string(on_disk).unwrap();
        assert!(text.contains("\n"), "expected pretty-printed JSON: {text}");
        assert!(!temp_dir.path().join("data/2020/AFG.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_object() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path());

        store.put_json("checkpoints/checkpoint.json", &json!({"year": 2019})).await.unwrap();
        store.put_json("checkpoints/checkpoint.json", &json!({"year": 2020})).await.unwrap();

        let value = store.get_json("checkpoints/checkpoint.json").await.unwrap();
        assert_eq!(value, Some(json!({"year": 2020})));
    }

    #[tokio::test]
    async fn test_get_missing_object_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path());
        assert_eq!(store.get_json("countries/countries.json").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_corrupt_object_is_decode_error() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("checkpoints")).unwrap();
        std::fs::write(temp_dir.path().join("checkpoints/checkpoint.json"), "{not json").unwrap();

        let store = LocalObjectStore::new(temp_dir.path());
        let result = store.get_json("checkpoints/checkpoint.json").await;
        assert!(matches!(result, Err(StorageError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_list_returns_sorted_json_keys_only() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path());
        store.put_json("data/2020/ALB.json", &json!([])).await.unwrap();
        store.put_json("data/2020/AFG.json", &json!([])).await.unwrap();
        std::fs::write(temp_dir.path().join("data/2020/notes.txt"), "x").unwrap();
        std::fs::create_dir_all(temp_dir.path().join("data/2020/nested")).unwrap();

        let keys = store.list("data/2020/").await.unwrap();
        assert_eq!(keys, vec!["data/2020/AFG.json", "data/2020/ALB.json"]);
    }

    #[tokio::test]
    async fn test_list_missing_prefix_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path());
        assert!(store.list("data/1999").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keys_cannot_escape_bucket() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path());

        for key in ["", "../outside.json", "/etc/passwd", "data/../../x.json"] {
            let result = store.put_json(key, &json!(null)).await;
            assert!(
                matches!(result, Err(StorageError::InvalidKey { .. })),
                "key {key:?} should be rejected"
            );
        }
    }
}
