//! Durable resume marker for the ingestion pipeline.
//!
//! A single object at [`paths::CHECKPOINT`] records the last work unit that
//! was persisted. It is overwritten, never appended, and read once at the
//! start of each run.
//!
//! # Ordering
//!
//! [`Checkpoint::covers`] compares `(year, country_code)` tuples with plain
//! byte-wise string ordering on the country code. The aggregate sentinel
//! `"all"` is compared the same way, so whether a whole year counts as done
//! depends on how the stored code sorts against `"all"`:
//! numeric and upper-case codes sort before it, lower-case codes after it.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::storage::{ObjectStore, StorageError, paths};

/// Errors from checkpoint persistence.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The object store failed.
    #[error("checkpoint storage error: {0}")]
    Storage(#[from] StorageError),

    /// The checkpoint object exists but is not `{year, country_code}`.
    #[error(
        "checkpoint at {key} is malformed: {source}\n  Suggestion: delete it to restart ingestion from START_YEAR"
    )]
    Malformed {
        /// Object key of the checkpoint.
        key: &'static str,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
}

/// The last work unit known to have completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Year of the unit.
    pub year: i32,
    /// Country code of the unit (may be the aggregate sentinel).
    pub country_code: String,
}

impl Checkpoint {
    /// Creates a checkpoint.
    pub fn new(year: i32, country_code: impl Into<String>) -> Self {
        Self {
            year,
            country_code: country_code.into(),
        }
    }

    /// Returns true when `(year, country_code)` is at or before this
    /// checkpoint, i.e. already done.
    #[must_use]
    pub fn covers(&self, year: i32, country_code: &str) -> bool {
        self.year > year || (self.year == year && self.country_code.as_str() >= country_code)
    }
}

/// Reads and writes the checkpoint object.
#[derive(Debug, Clone)]
pub struct CheckpointManager<S> {
    store: S,
}

impl<S: ObjectStore> CheckpointManager<S> {
    /// Creates a manager over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Overwrites the checkpoint with `(year, country_code)`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Storage`] if the write fails.
    #[instrument(skip(self))]
    pub async fn save(&self, year: i32, country_code: &str) -> Result<(), CheckpointError> {
        let checkpoint = Checkpoint::new(year, country_code);
        let value = serde_json::to_value(&checkpoint)
            .map_err(|e| StorageError::encode(paths::CHECKPOINT, e))?;
        self.store.put_json(paths::CHECKPOINT, &value).await?;
        debug!(year, country_code, "checkpoint saved");
        Ok(())
    }

    /// Loads the checkpoint.
    ///
    /// A missing (or empty) checkpoint is the normal first-run state and
    /// yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Storage`] if the read fails and
    /// [`CheckpointError::Malformed`] if the object has the wrong shape.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let Some(value) = self.store.get_json(paths::CHECKPOINT).await? else {
            warn!("checkpoint not found, requesting data between start and end year");
            return Ok(None);
        };

        if value.as_object().is_some_and(serde_json::Map::is_empty) {
            warn!("checkpoint is empty, requesting data between start and end year");
            return Ok(None);
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|source| CheckpointError::Malformed {
                key: paths::CHECKPOINT,
                source,
            })
    }
}
