//! Google Drive HTTP client
//!
//! Wraps `reqwest::Client` with the bearer header, base URL construction,
//! connect and read timeouts and handling of throttled responses.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use cloudmirror_gdrive::client::DriveClient;
//! use reqwest::Method;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = DriveClient::new("access-token-here", Duration::from_secs(60))?;
//! let response = client
//!     .execute(Method::GET, "/drive/v3/about", |req| req.query(&[("fields", "user")]))
//!     .await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{redirect, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::DriveError;

/// Base URL of the Google APIs front end
pub const DRIVE_BASE_URL: &str = "https://www.googleapis.com";

/// Default wait when a throttled response carries no usable `Retry-After`
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(2);

/// Longest `Retry-After` the client is willing to honour
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Default number of in-client retries for throttled responses
const DEFAULT_MAX_RETRIES: u32 = 3;

/// HTTP client for Drive API calls
pub struct DriveClient {
    client: Client,
    base_url: String,
    access_token: String,
    max_retries: u32,
}

impl DriveClient {
    /// Creates a client for the public Drive endpoint
    ///
    /// # Arguments
    /// * `access_token` - OAuth2 bearer token with a Drive scope
    /// * `timeout` - Limit for establishing a connection and for each wait
    ///   on the server (response headers, every body read). A transfer that
    ///   keeps making progress is never cut off, however large it is.
    pub fn new(access_token: impl Into<String>, timeout: Duration) -> Result<Self, DriveError> {
        // Resumable uploads answer intermediate chunks with 308, which must
        // reach the caller instead of being followed.
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            base_url: DRIVE_BASE_URL.to_string(),
            access_token: access_token.into(),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Points the client at another base URL (mock servers in tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets how many times a throttled request is retried inside the client
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates an authenticated request builder for `path` below the base URL
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_url(method, &format!("{}{}", self.base_url, path))
    }

    /// Creates an authenticated request builder for an absolute URL, such
    /// as an upload session URI handed out by the server
    pub fn request_url(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(&self.access_token)
    }

    /// Sends a request, retrying throttled and failed-upstream responses
    ///
    /// `decorate` adds query parameters, headers and body to the bare
    /// request and is called again for every attempt.
    ///
    /// Retried in the client:
    /// - 429 (and 403 rate limit reasons), for every method, since the
    ///   request was rejected before being applied
    /// - 5xx for every method but `POST`, since a failed `POST` may
    ///   still have created something
    ///
    /// The wait honours `Retry-After` when present.
    ///
    /// # Errors
    /// The classified [`DriveError`] of the last attempt.
    pub async fn execute<F>(
        &self,
        method: Method,
        path: &str,
        decorate: F,
    ) -> Result<Response, DriveError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let response = decorate(self.request(method.clone(), path)).send().await?;
            let status = response.status();

            if status.is_success() {
                if attempt > 0 {
                    info!(path, attempt, "Request succeeded after retry");
                }
                return Ok(response);
            }

            let retry_after = retry_after_of(&response);
            let err = error_from_response(response).await;

            let retryable = match &err {
                DriveError::TooManyRequests { .. } => true,
                DriveError::Server { .. } => method != Method::POST,
                _ => false,
            };
            if !retryable || attempt >= self.max_retries {
                if retryable {
                    warn!(path, attempts = attempt + 1, status = status.as_u16(), "Retry limit exhausted");
                }
                return Err(err);
            }

            info!(
                path,
                attempt,
                status = status.as_u16(),
                retry_after_ms = retry_after.as_millis() as u64,
                "Throttled, backing off"
            );
            tokio::time::sleep(retry_after).await;
            attempt += 1;
        }
    }

    /// Sends a request and decodes a JSON response body
    pub async fn execute_json<T, F>(
        &self,
        method: Method,
        path: &str,
        decorate: F,
    ) -> Result<T, DriveError>
    where
        T: DeserializeOwned,
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let response = self.execute(method, path, decorate).await?;
        let status = response.status();
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| {
            debug!(path, status = status.as_u16(), "Undecodable response body");
            DriveError::InvalidResponse(format!("{path}: {e}"))
        })
    }
}

/// Classifies a non-success response, consuming its body
pub(crate) async fn error_from_response(response: Response) -> DriveError {
    let status = response.status();
    let retry_after = retry_after_of(&response);
    let body = response.text().await.unwrap_or_default();
    DriveError::from_status(status, &body, retry_after)
}

fn retry_after_of(response: &Response) -> Duration {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER))
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// Parses a `Retry-After` header value
///
/// Accepts delay-seconds and HTTP-dates. Dates in the past, delays above one
/// hour and unparseable values yield `default`.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        let delay = Duration::from_secs(seconds);
        return if delay <= MAX_RETRY_AFTER { delay } else { default };
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let remaining = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        if let Ok(delay) = remaining.to_std() {
            if delay <= MAX_RETRY_AFTER {
                return delay;
            }
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}
