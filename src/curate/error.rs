//! Error types for curation.

use thiserror::Error;

use super::schema::ColumnType;
use crate::storage::StorageError;

/// Errors that abort curation.
#[derive(Debug, Error)]
pub enum CurationError {
    /// Reading raw objects failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The analytical database failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A raw object is not a JSON array of records.
    #[error("raw object {key} is not a list of records")]
    NotAList {
        /// Object key.
        key: String,
    },

    /// A record inside a raw object is not a JSON object.
    #[error("record {index} is not an object: {found}")]
    InvalidRecord {
        /// Position of the record in the batch.
        index: usize,
        /// Compact rendering of the offending value.
        found: String,
    },

    /// A value cannot be cast to its column type.
    #[error("cannot cast {value} to {expected} for column {column}")]
    Cast {
        /// Output column name.
        column: &'static str,
        /// Compact rendering of the offending value.
        value: String,
        /// Column type.
        expected: ColumnType,
    },

    /// A merge key column is missing or null.
    #[error("record {index} has no value for merge key {column}")]
    MissingMergeKey {
        /// Position of the record in the batch.
        index: usize,
        /// Output column name.
        column: &'static str,
    },
}

impl CurationError {
    /// Creates a cast error.
    pub fn cast(column: &'static str, value: &serde_json::Value, expected: ColumnType) -> Self {
        Self::Cast {
            column,
            value: value.to_string(),
            expected,
        }
    }

    /// Creates a not-a-list error.
    pub fn not_a_list(key: impl Into<String>) -> Self {
        Self::NotAList { key: key.into() }
    }
}
