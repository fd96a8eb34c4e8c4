//! Object keys shared by ingestion and curation.
//!
//! These keys are the contract between the raw layer and its consumers;
//! changing them breaks existing buckets.

/// Snapshot of the last `GET /countries` response.
pub const COUNTRIES_SNAPSHOT: &str = "countries/countries.json";

/// The single resume checkpoint.
pub const CHECKPOINT: &str = "checkpoints/checkpoint.json";

/// Prefix under which raw data objects live.
pub const DATA_PREFIX: &str = "data";

/// Prefix under which ingestion error reports live.
pub const INGESTION_ERRORS_PREFIX: &str = "data/ingestion_errors";

/// Key of the raw payload for one work unit.
#[must_use]
pub fn raw_data(year: i32, country_code: &str) -> String {
    format!("{DATA_PREFIX}/{year}/{country_code}.json")
}

/// Prefix holding every raw payload of one year.
#[must_use]
pub fn raw_year_prefix(year: i32) -> String {
    format!("{DATA_PREFIX}/{year}")
}

/// Key of an ingestion error report.
#[must_use]
pub fn ingestion_errors(timestamp: &str) -> String {
    format!("{INGESTION_ERRORS_PREFIX}/{timestamp}.json")
}
