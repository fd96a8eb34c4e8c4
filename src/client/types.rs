//! Wire types for the footprint API.
//!
//! The API is inconsistent about whether identifiers are JSON strings or
//! numbers, so both are accepted where we need them.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sentinel country code for "all countries combined".
pub const AGGREGATE_COUNTRY_CODE: &str = "all";

/// Raw records for one (year, country) request, keyed by upstream field names.
pub type Records = Vec<Value>;

/// One decoded entry of `GET /countries`.
///
/// Fields other than `countryCode` are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    /// Country code as reported by the API (`"all"` for the aggregate).
    #[serde(rename = "countryCode", deserialize_with = "string_or_number")]
    pub country_code: String,

    /// Remaining upstream fields.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Country {
    /// Creates a country entry with no extra details.
    pub fn new(country_code: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
            details: Map::new(),
        }
    }

    /// Returns true for the aggregate sentinel entry.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        self.country_code == AGGREGATE_COUNTRY_CODE
    }
}

/// One entry of `GET /years`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct YearEntry {
    /// The calendar year.
    #[serde(deserialize_with = "year_from_string_or_number")]
    pub year: i32,
}

/// Sorted, de-duplicated country codes with the aggregate sentinel removed.
#[must_use]
pub fn country_codes(countries: &[Country]) -> Vec<String> {
    let mut codes: Vec<String> = countries
        .iter()
        .filter(|country| !country.is_aggregate())
        .map(|country| country.country_code.clone())
        .collect();
    codes.sort();
    codes.dedup();
    codes
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn year_from_string_or_number<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = string_or_number(deserializer)?;
    raw.trim()
        .parse::<i32>()
        .map_err(|_| de::Error::custom(format!("invalid year {raw:?}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_country_accepts_numeric_code_and_keeps_details() {
        let country: Country = serde_json::from_value(json!({
            "countryCode": 229,
            "countryName": "United Kingdom",
            "isoa2": "GB"
        }))
        .unwrap();
        assert_eq!(country.country_code, "229");
        assert_eq!(country.details["countryName"], "United Kingdom");
        assert_eq!(country.details["isoa2"], "GB");
    }

    #[test]
    fn test_country_serializes_upstream_key() {
        let value = serde_json::to_value(Country::new("AFG")).unwrap();
        assert_eq!(value, json!({"countryCode": "AFG"}));
    }

    #[test]
    fn test_year_entry_accepts_string_and_number() {
        let years: Vec<YearEntry> =
            serde_json::from_value(json!([{"year": 2019}, {"year": "2020"}])).unwrap();
        assert_eq!(years, vec![YearEntry { year: 2019 }, YearEntry { year: 2020 }]);
    }

    #[test]
    fn test_year_entry_rejects_non_numeric() {
        let result: Result<YearEntry, _> = serde_json::from_value(json!({"year": "latest"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_country_codes_sorted_without_aggregate() {
        let countries = vec![
            Country::new("ALB"),
            Country::new(AGGREGATE_COUNTRY_CODE),
            Country::new("AFG"),
            Country::new("ALB"),
        ];
        assert_eq!(country_codes(&countries), vec!["AFG", "ALB"]);
    }
}
