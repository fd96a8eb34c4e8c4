//! Footprint Core Library
//!
//! Ingests environmental-footprint statistics from the Global Footprint
//! Network API into a bucket of raw JSON snapshots, and curates those
//! snapshots into a typed analytical table.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`client`] - HTTP transport and the typed footprint API
//! - [`storage`] - Object store for raw snapshots
//! - [`checkpoint`] - Durable resume marker
//! - [`ingest`] - The resumable ingestion pipeline
//! - [`curate`] - Schema-driven transform and SQLite upsert
//! - [`config`] - Settings loaded from the environment

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod checkpoint;
pub mod client;
pub mod config;
pub mod curate;
pub mod ingest;
pub mod storage;

// Re-export commonly used types
pub use checkpoint::{Checkpoint, CheckpointError, CheckpointManager};
pub use client::{ApiClient, ApiError, Credentials, FootprintApi, GlobalFootprintClient};
pub use config::{ConfigError, Settings};
pub use curate::{AnalyticsStore, CurationError, CurationSummary, Curator, TableSchema};
pub use ingest::{IngestError, IngestOptions, IngestionPipeline, IngestionSummary};
pub use storage::{LocalObjectStore, MemoryObjectStore, ObjectStore, StorageError};
