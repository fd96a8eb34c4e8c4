//! Runtime settings read from the environment.
//!
//! [`Settings`] is built once at startup and passed down explicitly. Empty
//! variables count as unset. Command-line flags are applied by the binary on
//! top of the loaded values, followed by [`Settings::validate`].

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{Datelike, Utc};
use thiserror::Error;

use crate::client::{
    ApiClient, ApiError, CONNECT_TIMEOUT_SECS, Credentials, DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES,
    RateLimiter, READ_TIMEOUT_SECS, RetryPolicy,
};
use crate::ingest::IngestOptions;

/// First year ingested when `START_YEAR` is unset.
pub const DEFAULT_START_YEAR: i32 = 2010;

/// Bucket root when `RAW_PATH` is unset.
pub const DEFAULT_RAW_PATH: &str = "bucket";

/// Analytical database when `DATABASE_PATH` is unset.
pub const DEFAULT_DATABASE_PATH: &str = "footprint.db";

const MAX_RETRIES_RANGE: RangeInclusive<u32> = 1..=10;
const MAX_REQUEST_DELAY_MS: u64 = 60_000;
const TIMEOUT_SECS_RANGE: RangeInclusive<u64> = 1..=3600;

/// Errors from loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set to something that cannot be parsed or is out of range.
    #[error("invalid value for {key}: {value:?}. Expected {expected}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// The rejected value.
        value: String,
        /// What would have been accepted.
        expected: &'static str,
    },

    /// `START_YEAR` is after `END_YEAR`.
    #[error("START_YEAR ({start}) is after END_YEAR ({end})")]
    YearRange {
        /// Configured start year.
        start: i32,
        /// Configured end year.
        end: i32,
    },

    /// Only one of `API_USERNAME` and `API_KEY` is set, or neither when the
    /// API is needed.
    #[error("API credentials missing\n  Suggestion: set both API_USERNAME and API_KEY")]
    MissingCredentials,

    /// The HTTP client could not be built from these settings.
    #[error(transparent)]
    Client(#[from] ApiError),
}

impl ConfigError {
    fn invalid(key: &'static str, value: impl Into<String>, expected: &'static str) -> Self {
        Self::Invalid {
            key,
            value: value.into(),
            expected,
        }
    }
}

/// Everything a run needs to know.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Basic-auth pair; required for ingestion only.
    pub credentials: Option<Credentials>,
    /// API base URL.
    pub api_base_url: String,
    /// Refresh the countries snapshot from the API.
    pub update_countries: bool,
    /// First year, inclusive.
    pub start_year: i32,
    /// Last year, inclusive.
    pub end_year: i32,
    /// Consult the checkpoint when resuming.
    pub checkpoint_enabled: bool,
    /// Root directory of the raw bucket.
    pub raw_path: PathBuf,
    /// SQLite file of the analytical table.
    pub database_path: PathBuf,
    /// Attempts per request, including the first.
    pub max_retries: u32,
    /// Minimum spacing between API requests.
    pub request_delay: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub read_timeout: Duration,
}

impl Settings {
    /// Loads settings from the process environment. See
    /// [`Settings::from_lookup`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first invalid variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through `lookup`, which maps a variable name to its
    /// value.
    ///
    /// Only per-variable parsing happens here. Range and cross-field rules
    /// are left to [`Settings::validate`], which callers run once any
    /// command-line overrides have been applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first invalid variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let credentials = match (get("API_USERNAME"), get("API_KEY")) {
            (Some(username), Some(key)) => Some(Credentials::new(username, key)),
            (None, None) => None,
            _ => return Err(ConfigError::MissingCredentials),
        };

        let settings = Self {
            credentials,
            api_base_url: get("API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            update_countries: parse_or("UPDATE_COUNTRIES", get("UPDATE_COUNTRIES"), false, parse_bool)?,
            start_year: parse_or("START_YEAR", get("START_YEAR"), DEFAULT_START_YEAR, parse_year)?,
            end_year: parse_or("END_YEAR", get("END_YEAR"), Utc::now().year(), parse_year)?,
            checkpoint_enabled: parse_or("CHECKPOINT", get("CHECKPOINT"), true, parse_bool)?,
            raw_path: get("RAW_PATH").map_or_else(|| PathBuf::from(DEFAULT_RAW_PATH), PathBuf::from),
            database_path: get("DATABASE_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH), PathBuf::from),
            max_retries: parse_or("MAX_RETRIES", get("MAX_RETRIES"), DEFAULT_MAX_RETRIES, parse_u32)?,
            request_delay: Duration::from_millis(parse_or(
                "REQUEST_DELAY_MS",
                get("REQUEST_DELAY_MS"),
                0,
                parse_u64,
            )?),
            connect_timeout: Duration::from_secs(parse_or(
                "HTTP_CONNECT_TIMEOUT_SECS",
                get("HTTP_CONNECT_TIMEOUT_SECS"),
                CONNECT_TIMEOUT_SECS,
                parse_u64,
            )?),
            read_timeout: Duration::from_secs(parse_or(
                "HTTP_READ_TIMEOUT_SECS",
                get("HTTP_READ_TIMEOUT_SECS"),
                READ_TIMEOUT_SECS,
                parse_u64,
            )?),
        };
        Ok(settings)
    }

    /// Checks ranges and cross-field rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_year > self.end_year {
            return Err(ConfigError::YearRange {
                start: self.start_year,
                end: self.end_year,
            });
        }
        if !MAX_RETRIES_RANGE.contains(&self.max_retries) {
            return Err(ConfigError::invalid(
                "MAX_RETRIES",
                self.max_retries.to_string(),
                "range 1..=10",
            ));
        }
        let delay_ms = self.request_delay.as_millis();
        if delay_ms > u128::from(MAX_REQUEST_DELAY_MS) {
            return Err(ConfigError::invalid(
                "REQUEST_DELAY_MS",
                delay_ms.to_string(),
                "range 0..=60000",
            ));
        }
        for (key, timeout) in [
            ("HTTP_CONNECT_TIMEOUT_SECS", self.connect_timeout),
            ("HTTP_READ_TIMEOUT_SECS", self.read_timeout),
        ] {
            if !TIMEOUT_SECS_RANGE.contains(&timeout.as_secs()) {
                return Err(ConfigError::invalid(
                    key,
                    timeout.as_secs().to_string(),
                    "range 1..=3600",
                ));
            }
        }
        Ok(())
    }

    /// Years to process, inclusive.
    #[must_use]
    pub fn years(&self) -> RangeInclusive<i32> {
        self.start_year..=self.end_year
    }

    /// Options for the ingestion pipeline.
    #[must_use]
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            update_countries: self.update_countries,
            start_year: self.start_year,
            end_year: self.end_year,
            checkpoint_enabled: self.checkpoint_enabled,
        }
    }

    /// Builds the API client described by these settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredentials`] without credentials and
    /// [`ConfigError::Client`] if the client cannot be built.
    pub fn api_client(&self) -> Result<ApiClient, ConfigError> {
        let credentials = self
            .credentials
            .clone()
            .ok_or(ConfigError::MissingCredentials)?;
        let client = ApiClient::builder(&self.api_base_url)
            .credentials(credentials)
            .retry_policy(RetryPolicy::with_max_attempts(self.max_retries))
            .rate_limiter(RateLimiter::new(self.request_delay))
            .timeouts(self.connect_timeout, self.read_timeout)
            .build()?;
        Ok(client)
    }
}

fn parse_or<T>(
    key: &'static str,
    raw: Option<String>,
    default: T,
    parse: fn(&str) -> Result<T, &'static str>,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(raw) => parse(raw.trim()).map_err(|expected| ConfigError::invalid(key, raw, expected)),
    }
}

fn parse_bool(raw: &str) -> Result<bool, &'static str> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err("one of true/false/1/0/yes/no"),
    }
}

fn parse_year(raw: &str) -> Result<i32, &'static str> {
    raw.parse().map_err(|_| "a year such as 2010")
}

fn parse_u32(raw: &str) -> Result<u32, &'static str> {
    raw.parse().map_err(|_| "a non-negative integer")
}

fn parse_u64(raw: &str) -> Result<u64, &'static str> {
    raw.parse().map_err(|_| "a non-negative integer")
}
