//! Fatal errors of an ingestion run.
//!
//! Per-unit fetch failures are not represented here: they are soft errors,
//! recorded as strings and flushed to the error report.

use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::client::ApiError;
use crate::storage::StorageError;

/// Errors that abort an ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    /// `GET /countries` failed while refreshing the snapshot.
    #[error("failed to discover countries: {0}")]
    CountryDiscovery(#[source] ApiError),

    /// `GET /years` failed.
    #[error("failed to discover valid years: {0}")]
    YearDiscovery(#[source] ApiError),

    /// No country snapshot exists and refresh was not requested.
    #[error(
        "countries snapshot {key} not found\n  Suggestion: run once with UPDATE_COUNTRIES=true (or --update-countries) to fetch it"
    )]
    MissingCountriesSnapshot {
        /// Object key of the snapshot.
        key: String,
    },

    /// The country snapshot exists but is not a list of countries.
    #[error("countries snapshot {key} is malformed: {source}")]
    InvalidCountriesSnapshot {
        /// Object key of the snapshot.
        key: String,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// An object store read or write failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The checkpoint could not be read or written.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl IngestError {
    /// Creates a missing snapshot error.
    pub fn missing_countries_snapshot(key: impl Into<String>) -> Self {
        Self::MissingCountriesSnapshot { key: key.into() }
    }

    /// Creates a malformed snapshot error.
    pub fn invalid_countries_snapshot(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::InvalidCountriesSnapshot {
            key: key.into(),
            source,
        }
    }
}
