//! Lazy production of work units.
//!
//! [`UnitSequence`] walks `years x (ALL + country codes)` with an explicit
//! cursor and fetches one unit per call to [`UnitSequence::next_unit`]. The
//! caller persists each unit before asking for the next, so a crash loses at
//! most the unit in flight.

use std::collections::HashSet;
use std::ops::RangeInclusive;

use tracing::{debug, info, warn};

use super::pipeline::Phase;
use crate::checkpoint::Checkpoint;
use crate::client::{AGGREGATE_COUNTRY_CODE, FootprintApi, Records};

/// One fetched `(year, country_code)` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    /// Year of the unit.
    pub year: i32,
    /// Country code, or the aggregate sentinel.
    pub country_code: String,
    /// Raw records as returned by the API.
    pub records: Records,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// About to evaluate this year.
    NextYear(i32),
    /// Iterating the countries of `year`; `next` indexes the country codes.
    Countries { year: i32, next: usize },
    Exhausted,
}

fn after(year: i32) -> Cursor {
    year.checked_add(1).map_or(Cursor::Exhausted, Cursor::NextYear)
}

/// Finite sequence of work units for one run.
pub struct UnitSequence<'a, A: ?Sized> {
    api: &'a A,
    country_codes: Vec<String>,
    valid_years: HashSet<i32>,
    end_year: i32,
    resume_from: Option<Checkpoint>,
    cursor: Cursor,
    errors: Vec<String>,
}

impl<'a, A: FootprintApi + ?Sized> UnitSequence<'a, A> {
    /// Creates a sequence over `years`.
    ///
    /// `country_codes` must already be sorted and exclude the sentinel.
    /// Units covered by `resume_from` are skipped without fetching.
    pub fn new(
        api: &'a A,
        country_codes: Vec<String>,
        valid_years: impl IntoIterator<Item = i32>,
        years: RangeInclusive<i32>,
        resume_from: Option<Checkpoint>,
    ) -> Self {
        let (start_year, end_year) = years.into_inner();
        Self {
            api,
            country_codes,
            valid_years: valid_years.into_iter().collect(),
            end_year,
            resume_from,
            cursor: Cursor::NextYear(start_year),
            errors: Vec::new(),
        }
    }

    /// Soft errors recorded so far, in the order they occurred.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Consumes the sequence and returns its soft errors.
    #[must_use]
    pub fn into_errors(self) -> Vec<String> {
        self.errors
    }

    /// Fetches the next unit, or `None` once every year has been visited.
    ///
    /// Fetch failures never end the sequence: aggregate failures fall back to
    /// per-country iteration and per-country failures are recorded as soft
    /// errors.
    pub async fn next_unit(&mut self) -> Option<WorkUnit> {
        loop {
            match self.cursor {
                Cursor::Exhausted => return None,
                Cursor::NextYear(year) if year > self.end_year => {
                    self.cursor = Cursor::Exhausted;
                }
                Cursor::NextYear(year) => {
                    if let Some(unit) = self.enter_year(year).await {
                        return Some(unit);
                    }
                }
                Cursor::Countries { year, next } => {
                    if let Some(unit) = self.visit_country(year, next).await {
                        return Some(unit);
                    }
                }
            }
        }
    }

    fn is_done(&self, year: i32, country_code: &str) -> bool {
        self.resume_from
            .as_ref()
            .is_some_and(|checkpoint| checkpoint.covers(year, country_code))
    }

    async fn enter_year(&mut self, year: i32) -> Option<WorkUnit> {
        if !self.valid_years.contains(&year) {
            let message = format!("Year {year} not found in valid years");
            warn!(year, "{message}");
            self.errors.push(message);
            self.cursor = after(year);
            return None;
        }

        if self.is_done(year, AGGREGATE_COUNTRY_CODE) {
            debug!(year, "year already ingested, skipping");
            self.cursor = after(year);
            return None;
        }

        info!(year, "requesting data");
        let aggregate = match self.api.country_data(AGGREGATE_COUNTRY_CODE, year).await {
            Ok(records) => records,
            Err(e) => {
                warn!(year, error = %e, "aggregate request failed, falling back to countries");
                Records::new()
            }
        };

        if aggregate.is_empty() {
            debug!(year, phase = %Phase::IterateCountries, countries = self.country_codes.len(), "no aggregate data");
            self.cursor = Cursor::Countries { year, next: 0 };
            return None;
        }

        self.cursor = after(year);
        Some(WorkUnit {
            year,
            country_code: AGGREGATE_COUNTRY_CODE.to_string(),
            records: aggregate,
        })
    }

    async fn visit_country(&mut self, year: i32, next: usize) -> Option<WorkUnit> {
        let Some(country_code) = self.country_codes.get(next).cloned() else {
            self.cursor = after(year);
            return None;
        };
        self.cursor = Cursor::Countries {
            year,
            next: next + 1,
        };

        if self.is_done(year, &country_code) {
            debug!(year, country_code = %country_code, "unit already ingested, skipping");
            return None;
        }

        match self.api.country_data(&country_code, year).await {
            Ok(records) => Some(WorkUnit {
                year,
                country_code,
                records,
            }),
            Err(e) => {
                let message = format!("Error getting data for {country_code} in {year}: {e}");
                warn!(year, country_code = %country_code, error = %e, "unit fetch failed");
                self.errors.push(message);
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ingest::testing::ScriptedApi;

    async fn drain<A: FootprintApi + ?Sized>(units: &mut UnitSequence<'_, A>) -> Vec<(i32, String)> {
        let mut seen = Vec::new();
        while let Some(unit) = units.next_unit().await {
            seen.push((unit.year, unit.country_code));
        }
        seen
    }

    fn codes(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_visits_years_then_countries_in_order() {
        let api = ScriptedApi::new(&["AFG", "ALB"], &[2020, 2021]);
        let mut units = UnitSequence::new(&api, codes(&["AFG", "ALB"]), [2020, 2021], 2020..=2021, None);

        let seen = drain(&mut units).await;

        assert_eq!(
            seen,
            vec![
                (2020, "AFG".to_string()),
                (2020, "ALB".to_string()),
                (2021, "AFG".to_string()),
                (2021, "ALB".to_string()),
            ]
        );
        assert!(units.errors().is_empty());
    }

    #[tokio::test]
    async fn test_empty_country_payload_is_still_a_unit() {
        let api = ScriptedApi::new(&["AFG"], &[2020]);
        let mut units = UnitSequence::new(&api, codes(&["AFG"]), [2020], 2020..=2020, None);

        let unit = units.next_unit().await.unwrap();
        assert_eq!(unit.country_code, "AFG");
        assert!(unit.records.is_empty());
        assert_eq!(units.next_unit().await, None);
    }

    #[tokio::test]
    async fn test_aggregate_data_short_circuits_year() {
        let api = ScriptedApi::new(&["AFG", "ALB"], &[2020])
            .with_data("all", 2020, json!([{"record": "EFConsTotGHA", "value": 1.0}]));
        let mut units = UnitSequence::new(&api, codes(&["AFG", "ALB"]), [2020], 2020..=2020, None);

        let seen = drain(&mut units).await;

        assert_eq!(seen, vec![(2020, "all".to_string())]);
        assert_eq!(api.calls(), vec![("all".to_string(), 2020)]);
    }

    #[tokio::test]
    async fn test_failed_aggregate_falls_back_to_countries() {
        let api = ScriptedApi::new(&["AFG"], &[2020]).with_failure("all", 2020, 502);
        let mut units = UnitSequence::new(&api, codes(&["AFG"]), [2020], 2020..=2020, None);

        let seen = drain(&mut units).await;

        assert_eq!(seen, vec![(2020, "AFG".to_string())]);
        assert!(units.errors().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_year_records_one_error_and_continues() {
        let api = ScriptedApi::new(&["AFG"], &[2019, 2021]);
        let mut units =
            UnitSequence::new(&api, codes(&["AFG"]), [2019, 2021], 2019..=2021, None);

        let seen = drain(&mut units).await;

        assert_eq!(seen, vec![(2019, "AFG".to_string()), (2021, "AFG".to_string())]);
        assert_eq!(units.errors(), ["Year 2020 not found in valid years"]);
        assert!(api.calls().iter().all(|(_, year)| *year != 2020));
    }

    #[tokio::test]
    async fn test_invalid_year_is_reported_even_when_checkpoint_covers_it() {
        let api = ScriptedApi::new(&["AFG"], &[2021]);
        let resume = Some(Checkpoint::new(2021, "all"));
        let mut units = UnitSequence::new(&api, codes(&["AFG"]), [2021], 2020..=2021, resume);

        assert_eq!(units.next_unit().await, None);
        assert_eq!(units.into_errors(), vec!["Year 2020 not found in valid years"]);
    }

    #[tokio::test]
    async fn test_country_failure_is_isolated() {
        let api = ScriptedApi::new(&["AUT", "DEU", "FRA"], &[2020]).with_failure("DEU", 2020, 500);
        let mut units =
            UnitSequence::new(&api, codes(&["AUT", "DEU", "FRA"]), [2020], 2020..=2020, None);

        let seen = drain(&mut units).await;

        assert_eq!(seen, vec![(2020, "AUT".to_string()), (2020, "FRA".to_string())]);
        assert_eq!(units.errors().len(), 1);
        assert!(
            units.errors()[0].starts_with("Error getting data for DEU in 2020: HTTP 500"),
            "unexpected message: {}",
            units.errors()[0]
        );
    }

    #[tokio::test]
    async fn test_resume_skips_covered_units_without_fetching() {
        let api = ScriptedApi::new(&["DEU", "FRA", "GBR"], &[2014, 2015, 2016]);
        let resume = Some(Checkpoint::new(2015, "FRA"));
        let mut units = UnitSequence::new(
            &api,
            codes(&["DEU", "FRA", "GBR"]),
            [2014, 2015, 2016],
            2014..=2016,
            resume,
        );

        let seen = drain(&mut units).await;

        assert_eq!(
            seen,
            vec![
                (2015, "GBR".to_string()),
                (2016, "DEU".to_string()),
                (2016, "FRA".to_string()),
                (2016, "GBR".to_string()),
            ]
        );
        assert!(api.calls().iter().all(|(_, year)| *year != 2014));
        assert!(!api.calls().contains(&("DEU".to_string(), 2015)));
        assert!(!api.calls().contains(&("FRA".to_string(), 2015)));
    }

    #[tokio::test]
    async fn test_lowercase_checkpoint_code_closes_the_whole_year() {
        // "zwe" sorts after the "all" sentinel, so the year counts as done
        // even though upper-case codes after it were never fetched.
        let api = ScriptedApi::new(&["ZAF"], &[2015, 2016]);
        let resume = Some(Checkpoint::new(2015, "zwe"));
        let mut units = UnitSequence::new(&api, codes(&["ZAF"]), [2015, 2016], 2015..=2016, resume);

        let seen = drain(&mut units).await;

        assert_eq!(seen, vec![(2016, "ZAF".to_string())]);
    }

    #[tokio::test]
    async fn test_reversed_range_yields_nothing() {
        let api = ScriptedApi::new(&["AFG"], &[2020]);
        let mut units = UnitSequence::new(&api, codes(&["AFG"]), [2020], 2021..=2020, None);

        assert_eq!(units.next_unit().await, None);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_range_ending_at_max_year_terminates() {
        let api = ScriptedApi::new(&[], &[i32::MAX]);
        let mut units = UnitSequence::new(&api, Vec::new(), [i32::MAX], i32::MAX..=i32::MAX, None);

        assert_eq!(units.next_unit().await, None);
        assert_eq!(api.calls(), vec![("all".to_string(), i32::MAX)]);
    }
}
