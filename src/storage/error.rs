//! Error types for object storage.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by [`ObjectStore`](super::ObjectStore) implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem I/O failed.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A stored object is not valid JSON.
    #[error("object {key} is not valid JSON: {source}")]
    Decode {
        /// Object key.
        key: String,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be serialized for storage.
    #[error("failed to serialize object {key}: {source}")]
    Encode {
        /// Object key.
        key: String,
        /// Serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// The key is empty, absolute, or escapes the bucket.
    #[error("invalid object key {key:?}")]
    InvalidKey {
        /// The rejected key.
        key: String,
    },
}

impl StorageError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a decode error.
    pub fn decode(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            key: key.into(),
            source,
        }
    }

    /// Creates an encode error.
    pub fn encode(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Encode {
            key: key.into(),
            source,
        }
    }

    /// Creates an invalid key error.
    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey { key: key.into() }
    }
}
