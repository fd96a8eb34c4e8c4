//! Typed accessors for the Global Footprint Network API.

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::error::ApiError;
use super::http::ApiClient;
use super::types::{Records, YearEntry};

const COUNTRIES_ENDPOINT: &str = "countries";
const YEARS_ENDPOINT: &str = "years";
const DATA_ENDPOINT: &str = "data";

/// The remote API capability the ingestion pipeline depends on.
///
/// Object-safe through `async_trait` so tests can substitute scripted
/// implementations.
#[async_trait]
pub trait FootprintApi: Send + Sync {
    /// `GET /countries`, entries exactly as the API returned them.
    async fn countries(&self) -> Result<Records, ApiError>;

    /// `GET /years`, reduced to the list of years.
    async fn years(&self) -> Result<Vec<i32>, ApiError>;

    /// `GET /data/{country_code}/{year}`. The aggregate sentinel is a valid code.
    async fn country_data(&self, country_code: &str, year: i32) -> Result<Records, ApiError>;
}

/// [`FootprintApi`] backed by the real HTTP API.
#[derive(Debug)]
pub struct GlobalFootprintClient {
    http: ApiClient,
}

impl GlobalFootprintClient {
    /// Wraps a configured [`ApiClient`].
    #[must_use]
    pub fn new(http: ApiClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl FootprintApi for GlobalFootprintClient {
    #[instrument(skip(self))]
    async fn countries(&self) -> Result<Records, ApiError> {
        let countries: Records = self.http.get_json(COUNTRIES_ENDPOINT).await?;
        debug!(count = countries.len(), "fetched countries");
        Ok(countries)
    }

    #[instrument(skip(self))]
    async fn years(&self) -> Result<Vec<i32>, ApiError> {
        let entries: Vec<YearEntry> = self.http.get_json(YEARS_ENDPOINT).await?;
        Ok(entries.into_iter().map(|entry| entry.year).collect())
    }

    #[instrument(skip(self))]
    async fn country_data(&self, country_code: &str, year: i32) -> Result<Records, ApiError> {
        self.http
            .get_json(&format!("{DATA_ENDPOINT}/{country_code}/{year}"))
            .await
    }
}
