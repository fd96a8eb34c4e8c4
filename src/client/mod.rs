//! Remote API client for footprint statistics.
//!
//! - [`ApiClient`] - generic authenticated JSON GET with retry and pacing
//! - [`FootprintApi`] - the typed capability the ingestion pipeline uses
//! - [`GlobalFootprintClient`] - the HTTP implementation of it
//!
//! # Example
//!
//! ```no_run
//! use footprint_core::client::{ApiClient, Credentials, FootprintApi, GlobalFootprintClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let http = ApiClient::builder("https://api.footprintnetwork.org/v1")
//!     .credentials(Credentials::new("analyst", "api-key"))
//!     .build()?;
//! let api = GlobalFootprintClient::new(http);
//! let years = api.years().await?;
//! println!("{} valid years", years.len());
//! # Ok(())
//! # }
//! ```

mod error;
mod footprint;
mod http;
mod rate_limiter;
mod retry;
mod types;

pub use error::ApiError;
pub use footprint::{FootprintApi, GlobalFootprintClient};
pub use http::{
    ApiClient, ApiClientBuilder, CONNECT_TIMEOUT_SECS, Credentials, DEFAULT_BASE_URL,
    READ_TIMEOUT_SECS,
};
pub use rate_limiter::{RateLimiter, parse_retry_after};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};
pub use types::{AGGREGATE_COUNTRY_CODE, Country, Records, YearEntry, country_codes};
