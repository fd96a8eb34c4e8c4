//! Resumable ingestion of raw footprint data.
//!
//! [`IngestionPipeline`] discovers countries and valid years, walks every
//! `(year, country)` work unit in range through a [`UnitSequence`], persists
//! each unit to the object store and checkpoints the last one. Per-unit
//! failures are soft: they are collected and written as one error report at
//! the end of a successful run.

mod error;
mod pipeline;
mod units;

pub use error::IngestError;
pub use pipeline::{IngestOptions, IngestionPipeline, IngestionSummary, Phase};
pub use units::{UnitSequence, WorkUnit};
