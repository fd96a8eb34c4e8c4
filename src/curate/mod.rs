//! Curation of raw snapshots into the analytical table.
//!
//! For each year, every raw object under `data/{year}/` is read and
//! concatenated, transformed through a [`TableSchema`] and upserted into an
//! [`AnalyticsStore`].

mod error;
mod schema;
mod store;
mod transform;

use std::ops::RangeInclusive;

use serde_json::Value;
use tracing::{info, instrument, warn};

pub use error::CurationError;
pub use schema::{CARBON_FOOTPRINT_TABLE, Column, ColumnType, TableSchema};
pub use store::AnalyticsStore;
pub use transform::{CellValue, Row, cast, transform};

use crate::client::Records;
use crate::storage::{ObjectStore, paths};

/// Outcome of a curation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurationSummary {
    /// Years with at least one row loaded.
    pub years_loaded: Vec<i32>,
    /// Years with no raw data.
    pub years_empty: Vec<i32>,
    /// Total rows written.
    pub rows_upserted: u64,
}

/// Loads raw objects from a store into the analytical table.
pub struct Curator<S> {
    store: S,
    analytics: AnalyticsStore,
    schema: TableSchema,
}

impl<S: ObjectStore> Curator<S> {
    /// Creates a curator.
    pub fn new(store: S, analytics: AnalyticsStore, schema: TableSchema) -> Self {
        Self {
            store,
            analytics,
            schema,
        }
    }

    /// Reads and concatenates every raw object of `year`.
    ///
    /// A year with no objects yields an empty list and a warning.
    ///
    /// # Errors
    ///
    /// Returns [`CurationError::Storage`] if a read fails and
    /// [`CurationError::NotAList`] if an object is not a JSON array.
    pub async fn read_year(&self, year: i32) -> Result<Records, CurationError> {
        let keys = self.store.list(&paths::raw_year_prefix(year)).await?;
        if keys.is_empty() {
            warn!(year, "no raw data found");
            return Ok(Records::new());
        }

        let mut records = Records::new();
        for key in keys {
            match self.store.get_json(&key).await? {
                Some(Value::Array(batch)) => records.extend(batch),
                Some(_) => return Err(CurationError::not_a_list(key)),
                None => warn!(key = %key, "raw object disappeared while reading"),
            }
        }
        Ok(records)
    }

    /// Curates one year; returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns any read, transform, or load error.
    #[instrument(skip(self), fields(table = self.schema.table()))]
    pub async fn curate_year(&self, year: i32) -> Result<u64, CurationError> {
        let records = self.read_year(year).await?;
        let rows = transform(&self.schema, &records)?;
        let written = self.analytics.upsert(&self.schema, &rows).await?;
        info!(year, rows = written, "curated year");
        Ok(written)
    }

    /// Curates every year in `years` in order, then closes the database.
    ///
    /// # Errors
    ///
    /// Stops at the first failing year. The database is closed either way.
    #[instrument(skip(self), fields(table = self.schema.table()))]
    pub async fn run(self, years: RangeInclusive<i32>) -> Result<CurationSummary, CurationError> {
        let outcome = self.curate_years(years).await;
        self.analytics.close().await;
        outcome
    }

    async fn curate_years(
        &self,
        years: RangeInclusive<i32>,
    ) -> Result<CurationSummary, CurationError> {
        self.analytics.ensure_table(&self.schema).await?;

        let mut summary = CurationSummary::default();
        for year in years {
            let written = self.curate_year(year).await?;
            if written == 0 {
                summary.years_empty.push(year);
            } else {
                summary.years_loaded.push(year);
                summary.rows_upserted += written;
            }
        }
        info!(
            years_loaded = summary.years_loaded.len(),
            years_empty = summary.years_empty.len(),
            rows = summary.rows_upserted,
            "curation finished"
        );
        Ok(summary)
    }
}
