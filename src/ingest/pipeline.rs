//! The resumable ingestion pipeline.
//!
//! Phases run in order: discover countries, discover years, iterate years
//! (with nested country iteration inside [`UnitSequence`]), finalize.
//! Finalize always runs once iteration has started: it saves the checkpoint
//! for the last persisted unit even when iteration ended in a fatal error,
//! then flushes the soft-error report if the run was otherwise successful.

use std::fmt;

use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use super::error::IngestError;
use super::units::UnitSequence;
use crate::checkpoint::{Checkpoint, CheckpointManager};
use crate::client::{Country, FootprintApi, country_codes};
use crate::storage::{ObjectStore, paths};

/// Timestamp format of error report keys; filesystem safe, microsecond
/// resolution so runs started in the same second do not share a report.
const REPORT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%6f";

/// Stages of a run, used as a structured logging field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Load or refresh the country list.
    DiscoverCountries,
    /// Fetch the valid years.
    DiscoverYears,
    /// Walk the configured year range.
    IterateYears,
    /// Walk the countries of one year.
    IterateCountries,
    /// Save the checkpoint and flush the error report.
    Finalize,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DiscoverCountries => "discover_countries",
            Self::DiscoverYears => "discover_years",
            Self::IterateYears => "iterate_years",
            Self::IterateCountries => "iterate_countries",
            Self::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// What a run should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Refresh the countries snapshot from the API instead of reading it.
    pub update_countries: bool,
    /// First year, inclusive.
    pub start_year: i32,
    /// Last year, inclusive.
    pub end_year: i32,
    /// Consult the checkpoint. It is written regardless.
    pub checkpoint_enabled: bool,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestionSummary {
    /// Number of raw objects written.
    pub units_persisted: usize,
    /// Soft errors recorded during iteration.
    pub soft_errors: Vec<String>,
    /// The last unit persisted, which is also the saved checkpoint.
    pub last_unit: Option<Checkpoint>,
    /// Key of the error report, if one was written.
    pub error_report: Option<String>,
}

#[derive(Debug, Default)]
struct Progress {
    units_persisted: usize,
    last_unit: Option<Checkpoint>,
}

/// Fetches every work unit in range and persists it to the object store.
pub struct IngestionPipeline<A, S> {
    api: A,
    store: S,
    checkpoints: CheckpointManager<S>,
    options: IngestOptions,
}

impl<A, S> IngestionPipeline<A, S>
where
    A: FootprintApi,
    S: ObjectStore + Clone,
{
    /// Creates a pipeline.
    pub fn new(api: A, store: S, options: IngestOptions) -> Self {
        Self {
            checkpoints: CheckpointManager::new(store.clone()),
            api,
            store,
            options,
        }
    }

    /// Options this pipeline runs with.
    #[must_use]
    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Runs the pipeline to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if country or year discovery fails, if the
    /// checkpoint cannot be read, or if any object store write fails. When a
    /// write fails mid-iteration, the checkpoint for the last persisted unit
    /// is saved before the error is returned and no error report is written.
    #[instrument(skip(self), fields(start_year = self.options.start_year, end_year = self.options.end_year))]
    pub async fn run(&self) -> Result<IngestionSummary, IngestError> {
        let started_at = Utc::now();

        info!(phase = %Phase::DiscoverCountries, update = self.options.update_countries, "discovering countries");
        let codes = self.discover_countries().await?;

        info!(phase = %Phase::DiscoverYears, "discovering valid years");
        let valid_years = self.api.years().await.map_err(IngestError::YearDiscovery)?;

        let resume_from = if self.options.checkpoint_enabled {
            let checkpoint = self.checkpoints.load().await?;
            if let Some(checkpoint) = &checkpoint {
                info!(
                    year = checkpoint.year,
                    country_code = %checkpoint.country_code,
                    "resuming after checkpoint"
                );
            }
            checkpoint
        } else {
            info!("checkpoint disabled, starting from the first unit");
            None
        };

        info!(
            phase = %Phase::IterateYears,
            countries = codes.len(),
            valid_years = valid_years.len(),
            "iterating work units"
        );
        let mut units = UnitSequence::new(
            &self.api,
            codes,
            valid_years,
            self.options.start_year..=self.options.end_year,
            resume_from,
        );
        let mut progress = Progress::default();
        let outcome = self.persist_units(&mut units, &mut progress).await;
        let soft_errors = units.into_errors();

        info!(phase = %Phase::Finalize, units = progress.units_persisted, "finalizing");
        let saved = self.save_checkpoint(progress.last_unit.as_ref()).await;

        if let Err(e) = outcome {
            if let Err(save_error) = saved {
                error!(error = %save_error, "failed to save checkpoint after aborted run");
            }
            if !soft_errors.is_empty() {
                warn!(count = soft_errors.len(), "run aborted, soft errors not reported");
            }
            return Err(e);
        }
        saved?;

        let timestamp = started_at.format(REPORT_TIMESTAMP_FORMAT).to_string();
        let error_report = self.flush_errors(&soft_errors, &timestamp).await?;

        Ok(IngestionSummary {
            units_persisted: progress.units_persisted,
            soft_errors,
            last_unit: progress.last_unit,
            error_report,
        })
    }

    async fn discover_countries(&self) -> Result<Vec<String>, IngestError> {
        let key = paths::COUNTRIES_SNAPSHOT;

        let snapshot = if self.options.update_countries {
            let countries = self
                .api
                .countries()
                .await
                .map_err(IngestError::CountryDiscovery)?;
            let snapshot = Value::Array(countries);
            self.store.put_json(key, &snapshot).await?;
            info!(key, "stored countries snapshot");
            snapshot
        } else {
            self.store
                .get_json(key)
                .await?
                .ok_or_else(|| IngestError::missing_countries_snapshot(key))?
        };

        let countries: Vec<Country> = serde_json::from_value(snapshot)
            .map_err(|e| IngestError::invalid_countries_snapshot(key, e))?;
        Ok(country_codes(&countries))
    }

    async fn persist_units(
        &self,
        units: &mut UnitSequence<'_, A>,
        progress: &mut Progress,
    ) -> Result<(), IngestError> {
        while let Some(unit) = units.next_unit().await {
            let key = paths::raw_data(unit.year, &unit.country_code);
            let records = unit.records.len();
            self.store.put_json(&key, &Value::Array(unit.records)).await?;
            info!(year = unit.year, country_code = %unit.country_code, records, "persisted unit");

            progress.units_persisted += 1;
            progress.last_unit = Some(Checkpoint::new(unit.year, unit.country_code));
        }
        Ok(())
    }

    async fn save_checkpoint(&self, last_unit: Option<&Checkpoint>) -> Result<(), IngestError> {
        let Some(last_unit) = last_unit else {
            info!("no units persisted, checkpoint unchanged");
            return Ok(());
        };
        self.checkpoints
            .save(last_unit.year, &last_unit.country_code)
            .await?;
        info!(year = last_unit.year, country_code = %last_unit.country_code, "checkpoint saved");
        Ok(())
    }

    async fn flush_errors(
        &self,
        soft_errors: &[String],
        timestamp: &str,
    ) -> Result<Option<String>, IngestError> {
        if soft_errors.is_empty() {
            return Ok(None);
        }
        let key = paths::ingestion_errors(timestamp);
        let report = Value::Array(soft_errors.iter().cloned().map(Value::String).collect());
        self.store.put_json(&key, &report).await?;
        warn!(count = soft_errors.len(), key = %key, "ingestion finished with errors");
        Ok(Some(key))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ingest::testing::{FailingStore, ScriptedApi};
    use crate::storage::MemoryObjectStore;

    fn options(start_year: i32, end_year: i32) -> IngestOptions {
        IngestOptions {
            update_countries: true,
            start_year,
            end_year,
            checkpoint_enabled: true,
        }
    }

    fn data_keys(store: &MemoryObjectStore) -> Vec<String> {
        store
            .keys()
            .into_iter()
            .filter(|key| key.starts_with("data/") && !key.starts_with(paths::INGESTION_ERRORS_PREFIX))
            .collect()
    }

    #[tokio::test]
    async fn test_two_years_two_countries_writes_four_objects() {
        let api = ScriptedApi::new(&["AFG", "ALB"], &[2020, 2021])
            .with_data("AFG", 2020, json!([{"record": "BiocapPerCap", "value": 0.5}]));
        let store = MemoryObjectStore::new();

        let summary = IngestionPipeline::new(api, store.clone(), options(2020, 2021))
            .run()
            .await
            .unwrap();

        assert_eq!(
            data_keys(&store),
            vec![
                "data/2020/AFG.json",
                "data/2020/ALB.json",
                "data/2021/AFG.json",
                "data/2021/ALB.json",
            ]
        );
        assert_eq!(
            store.get("data/2020/AFG.json"),
            Some(json!([{"record": "BiocapPerCap", "value": 0.5}]))
        );
        assert_eq!(
            store.get(paths::CHECKPOINT),
            Some(json!({"year": 2021, "country_code": "ALB"}))
        );
        assert_eq!(summary.units_persisted, 4);
        assert_eq!(summary.last_unit, Some(Checkpoint::new(2021, "ALB")));
        assert_eq!(summary.error_report, None);
    }

    #[tokio::test]
    async fn test_refresh_stores_countries_snapshot() {
        let api = ScriptedApi::new(&["AFG", "all"], &[2020]);
        let store = MemoryObjectStore::new();

        IngestionPipeline::new(api, store.clone(), options(2020, 2020))
            .run()
            .await
            .unwrap();

        let snapshot = store.get(paths::COUNTRIES_SNAPSHOT).unwrap();
        assert_eq!(snapshot, json!([{"countryCode": "AFG"}, {"countryCode": "all"}]));
        // The sentinel is never iterated as a country.
        assert_eq!(data_keys(&store), vec!["data/2020/AFG.json"]);
    }

    #[tokio::test]
    async fn test_refresh_stores_countries_response_verbatim() {
        let response = vec![
            json!({"countryCode": 4, "countryName": "Afghanistan", "isoa2": "AF"}),
            json!({"countryCode": "all", "countryName": "World"}),
        ];
        let api = ScriptedApi::new(&[], &[2020]).with_raw_countries(response.clone());
        let store = MemoryObjectStore::new();

        IngestionPipeline::new(api, store.clone(), options(2020, 2020))
            .run()
            .await
            .unwrap();

        assert_eq!(store.get(paths::COUNTRIES_SNAPSHOT), Some(Value::Array(response)));
        assert_eq!(data_keys(&store), vec!["data/2020/4.json"]);
    }

    #[tokio::test]
    async fn test_invalid_countries_response_is_fatal() {
        let api = ScriptedApi::new(&[], &[2020]).with_raw_countries(vec![json!({"name": "x"})]);
        let result = IngestionPipeline::new(api, MemoryObjectStore::new(), options(2020, 2020))
            .run()
            .await;
        assert!(matches!(result, Err(IngestError::InvalidCountriesSnapshot { .. })));
    }

    #[tokio::test]
    async fn test_reads_existing_snapshot_without_refresh() {
        let api = ScriptedApi::new(&["IGNORED"], &[2020]);
        let store = MemoryObjectStore::new();
        store.insert(paths::COUNTRIES_SNAPSHOT, json!([{"countryCode": "ALB"}, {"countryCode": 4}]));

        let opts = IngestOptions {
            update_countries: false,
            ..options(2020, 2020)
        };
        IngestionPipeline::new(api, store.clone(), opts).run().await.unwrap();

        assert_eq!(data_keys(&store), vec!["data/2020/4.json", "data/2020/ALB.json"]);
    }

    #[tokio::test]
    async fn test_missing_snapshot_without_refresh_is_fatal() {
        let api = ScriptedApi::new(&["AFG"], &[2020]);
        let store = MemoryObjectStore::new();
        let opts = IngestOptions {
            update_countries: false,
            ..options(2020, 2020)
        };

        let result = IngestionPipeline::new(api, store.clone(), opts).run().await;

        assert!(matches!(result, Err(IngestError::MissingCountriesSnapshot { .. })));
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_country_discovery_failure_is_fatal() {
        let api = ScriptedApi::new(&["AFG"], &[2020]).with_countries_failure(503);
        let result = IngestionPipeline::new(api, MemoryObjectStore::new(), options(2020, 2020))
            .run()
            .await;
        assert!(matches!(result, Err(IngestError::CountryDiscovery(_))));
    }

    #[tokio::test]
    async fn test_year_discovery_failure_is_fatal_and_writes_nothing() {
        let api = ScriptedApi::new(&["AFG"], &[2020]).with_years_failure(500);
        let store = MemoryObjectStore::new();

        let result = IngestionPipeline::new(api, store.clone(), options(2020, 2020))
            .run()
            .await;

        assert!(matches!(result, Err(IngestError::YearDiscovery(_))));
        assert_eq!(store.get(paths::CHECKPOINT), None);
    }

    #[tokio::test]
    async fn test_resume_from_checkpoint() {
        let api = ScriptedApi::new(&["DEU", "FRA", "GBR"], &[2015, 2016]);
        let store = MemoryObjectStore::new();
        store.insert(paths::CHECKPOINT, json!({"year": 2015, "country_code": "FRA"}));

        let summary = IngestionPipeline::new(api, store.clone(), options(2015, 2016))
            .run()
            .await
            .unwrap();

        assert_eq!(
            data_keys(&store),
            vec![
                "data/2015/GBR.json",
                "data/2016/DEU.json",
                "data/2016/FRA.json",
                "data/2016/GBR.json",
            ]
        );
        assert_eq!(summary.last_unit, Some(Checkpoint::new(2016, "GBR")));
    }

    #[tokio::test]
    async fn test_disabled_checkpoint_is_written_but_not_consulted() {
        let api = ScriptedApi::new(&["DEU", "FRA"], &[2015]);
        let store = MemoryObjectStore::new();
        store.insert(paths::CHECKPOINT, json!({"year": 2015, "country_code": "DEU"}));
        let opts = IngestOptions {
            checkpoint_enabled: false,
            ..options(2015, 2015)
        };

        let summary = IngestionPipeline::new(api, store.clone(), opts).run().await.unwrap();

        assert_eq!(summary.units_persisted, 2);
        assert_eq!(
            store.get(paths::CHECKPOINT),
            Some(json!({"year": 2015, "country_code": "FRA"}))
        );
    }

    #[tokio::test]
    async fn test_disabled_checkpoint_ignores_malformed_checkpoint() {
        let api = ScriptedApi::new(&["DEU", "FRA"], &[2015]);
        let store = MemoryObjectStore::new();
        store.insert(paths::CHECKPOINT, json!({"year": "soon"}));
        let opts = IngestOptions {
            checkpoint_enabled: false,
            ..options(2015, 2015)
        };

        let summary = IngestionPipeline::new(api, store.clone(), opts).run().await.unwrap();

        assert_eq!(summary.units_persisted, 2);
        assert_eq!(
            store.get(paths::CHECKPOINT),
            Some(json!({"year": 2015, "country_code": "FRA"}))
        );
    }

    #[tokio::test]
    async fn test_enabled_checkpoint_rejects_malformed_checkpoint() {
        let api = ScriptedApi::new(&["DEU"], &[2015]);
        let store = MemoryObjectStore::new();
        store.insert(paths::CHECKPOINT, json!({"year": "soon"}));

        let result = IngestionPipeline::new(api, store.clone(), options(2015, 2015))
            .run()
            .await;

        assert!(matches!(result, Err(IngestError::Checkpoint(_))));
        assert_eq!(data_keys(&store), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_rerun_without_checkpoint_is_idempotent() {
        let build_api = || {
            ScriptedApi::new(&["AFG", "ALB"], &[2020])
                .with_data("ALB", 2020, json!([{"record": "EFConsPerCap", "value": 2.1}]))
        };
        let store = MemoryObjectStore::new();
        let opts = IngestOptions {
            checkpoint_enabled: false,
            ..options(2020, 2020)
        };

        IngestionPipeline::new(build_api(), store.clone(), opts).run().await.unwrap();
        let first: Vec<_> = store.keys().into_iter().map(|k| (store.get(&k), k)).collect();

        IngestionPipeline::new(build_api(), store.clone(), opts).run().await.unwrap();
        let second: Vec<_> = store.keys().into_iter().map(|k| (store.get(&k), k)).collect();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_soft_errors_are_flushed_as_one_report() {
        let api = ScriptedApi::new(&["AUT", "DEU", "FRA"], &[2020])
            .with_failure("DEU", 2020, 500);
        let store = MemoryObjectStore::new();

        let summary = IngestionPipeline::new(api, store.clone(), options(2019, 2020))
            .run()
            .await
            .unwrap();

        assert_eq!(data_keys(&store), vec!["data/2020/AUT.json", "data/2020/FRA.json"]);
        assert_eq!(summary.soft_errors.len(), 2);
        assert_eq!(summary.soft_errors[0], "Year 2019 not found in valid years");
        assert!(summary.soft_errors[1].starts_with("Error getting data for DEU in 2020"));

        let reports = store.list(paths::INGESTION_ERRORS_PREFIX).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(summary.error_report.as_ref(), Some(&reports[0]));
        let report = store.get(&reports[0]).unwrap();
        assert_eq!(report.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_back_to_back_runs_keep_separate_reports() {
        let store = MemoryObjectStore::new();
        let opts = IngestOptions {
            checkpoint_enabled: false,
            ..options(2019, 2020)
        };

        let first = IngestionPipeline::new(ScriptedApi::new(&["AUT"], &[2020]), store.clone(), opts)
            .run()
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        let second = IngestionPipeline::new(ScriptedApi::new(&["AUT"], &[2020]), store.clone(), opts)
            .run()
            .await
            .unwrap();

        let first_key = first.error_report.unwrap();
        let second_key = second.error_report.unwrap();
        assert_ne!(first_key, second_key);
        let reports = store.list(paths::INGESTION_ERRORS_PREFIX).await.unwrap();
        assert_eq!(reports, vec![first_key, second_key]);
    }

    #[tokio::test]
    async fn test_no_units_leaves_checkpoint_untouched() {
        let api = ScriptedApi::new(&["AFG"], &[2020]);
        let store = MemoryObjectStore::new();
        store.insert(paths::CHECKPOINT, json!({"year": 2020, "country_code": "all"}));

        let summary = IngestionPipeline::new(api, store.clone(), options(2020, 2020))
            .run()
            .await
            .unwrap();

        assert_eq!(summary.units_persisted, 0);
        assert_eq!(summary.last_unit, None);
        assert_eq!(
            store.get(paths::CHECKPOINT),
            Some(json!({"year": 2020, "country_code": "all"}))
        );
    }

    #[tokio::test]
    async fn test_write_failure_saves_checkpoint_for_last_persisted_unit() {
        let api = ScriptedApi::new(&["A01", "A02", "A03", "A04", "A05", "A06", "A07"], &[2020])
            .with_failure("A03", 2020, 500);
        let inner = MemoryObjectStore::new();
        // Snapshot write plus five data objects succeed; the sixth data write fails.
        let store = FailingStore::new(inner.clone(), "data/2020/A07.json");

        let result = IngestionPipeline::new(api, store, options(2020, 2020)).run().await;

        assert!(matches!(result, Err(IngestError::Storage(_))));
        assert_eq!(data_keys(&inner).len(), 5);
        assert_eq!(
            inner.get(paths::CHECKPOINT),
            Some(json!({"year": 2020, "country_code": "A06"}))
        );
        // Soft errors are lost on abort.
        assert!(inner.list(paths::INGESTION_ERRORS_PREFIX).await.unwrap().is_empty());
    }
}
