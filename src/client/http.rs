//! Generic JSON-over-HTTP GET client.
//!
//! [`ApiClient`] owns the transport policy shared by every endpoint:
//! base URL joining, basic-auth credentials, timeouts, request pacing, and
//! retry with exponential backoff. Endpoint-specific typing lives in
//! [`super::footprint`].

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};
use url::Url;

use super::error::ApiError;
use super::rate_limiter::{RateLimiter, parse_retry_after};
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};

/// Default base URL of the Global Footprint Network API.
pub const DEFAULT_BASE_URL: &str = "https://api.footprintnetwork.org/v1";

/// Default HTTP connect timeout.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default HTTP read timeout.
pub const READ_TIMEOUT_SECS: u64 = 60;

fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("footprint/{version} (footprint-ingest)")
}

/// Basic-auth credential pair for the API.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    key: String,
}

impl Credentials {
    /// Creates a credential pair.
    pub fn new(username: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            key: key.into(),
        }
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Builder for [`ApiClient`].
#[derive(Debug)]
pub struct ApiClientBuilder {
    base_url: String,
    credentials: Option<Credentials>,
    retry_policy: RetryPolicy,
    rate_limiter: RateLimiter,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl ApiClientBuilder {
    /// Sets the basic-auth credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Sets the request pacing.
    #[must_use]
    pub fn rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Sets connect and read timeouts.
    #[must_use]
    pub fn timeouts(mut self, connect_timeout: Duration, read_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.read_timeout = read_timeout;
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] for an unparseable base URL and
    /// [`ApiError::Build`] if the HTTP client cannot be constructed.
    pub fn build(self) -> Result<ApiClient, ApiError> {
        // A trailing slash makes Url::join append instead of replacing the last segment.
        let normalized = format!("{}/", self.base_url.trim_end_matches('/'));
        let base_url =
            Url::parse(&normalized).map_err(|_| ApiError::invalid_url(self.base_url.clone()))?;

        let client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.read_timeout)
            .user_agent(default_user_agent())
            .gzip(true)
            .build()
            .map_err(ApiError::Build)?;

        Ok(ApiClient {
            client,
            base_url,
            credentials: self.credentials,
            retry_policy: self.retry_policy,
            rate_limiter: self.rate_limiter,
        })
    }
}

/// HTTP client issuing authenticated JSON GET requests against one API.
///
/// Created once per run and reused for every request, taking advantage of
/// connection pooling.
#[derive(Debug)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    credentials: Option<Credentials>,
    retry_policy: RetryPolicy,
    rate_limiter: RateLimiter,
}

impl ApiClient {
    /// Starts building a client for the given base URL.
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: base_url.into(),
            credentials: None,
            retry_policy: RetryPolicy::default(),
            rate_limiter: RateLimiter::disabled(),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
        }
    }

    /// Returns the normalized base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Joins an endpoint path onto the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if the result is not a valid URL.
    pub fn build_url(&self, endpoint: &str) -> Result<Url, ApiError> {
        let endpoint = endpoint.trim_start_matches('/');
        self.base_url
            .join(endpoint)
            .map_err(|_| ApiError::invalid_url(format!("{}{endpoint}", self.base_url)))
    }

    /// Fetches `endpoint` and decodes the JSON body into `T`.
    ///
    /// Transient and rate-limited failures are retried according to the
    /// configured [`RetryPolicy`]; a Retry-After header overrides the
    /// backoff delay.
    ///
    /// # Errors
    ///
    /// Returns the last [`ApiError`] once retries are exhausted or the
    /// failure is permanent.
    #[instrument(skip(self), fields(endpoint = %endpoint))]
    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let url = self.build_url(endpoint)?;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.rate_limiter.acquire().await;

            let error = match self.send_once(&url).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let failure_type = classify_error(&error);
            let retry_after_delay = if failure_type == FailureType::RateLimited {
                self.retry_after_delay(&error)
            } else {
                None
            };

            match self.retry_policy.should_retry(failure_type, attempt) {
                RetryDecision::Retry {
                    delay: backoff_delay,
                    attempt: next_attempt,
                } => {
                    let delay = retry_after_delay.unwrap_or(backoff_delay);
                    info!(
                        url = %url,
                        attempt = next_attempt,
                        max_attempts = self.retry_policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        using_retry_after = retry_after_delay.is_some(),
                        error = %error,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url = %url, %reason, "not retrying request");
                    return Err(error);
                }
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(&self, url: &Url) -> Result<T, ApiError> {
        let mut request = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json");
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            return Err(ApiError::http_status_with_retry_after(
                url.as_str(),
                status.as_u16(),
                retry_after,
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(url.as_str(), e))?;

        serde_json::from_slice(&body).map_err(|e| ApiError::decode(url.as_str(), e.to_string()))
    }

    fn retry_after_delay(&self, error: &ApiError) -> Option<Duration> {
        let ApiError::HttpStatus {
            retry_after: Some(header),
            ..
        } = error
        else {
            return None;
        };
        let delay = parse_retry_after(header)?;
        self.rate_limiter.record_rate_limit(delay);
        Some(delay)
    }
}

fn transport_error(url: &str, error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::timeout(url)
    } else {
        ApiError::network(url, error)
    }
}
