//! cloudmirror-gdrive - Google Drive v3 adapter
//!
//! Implements the core ports against Google Drive:
//! - [`store::DriveRemoteStore`] - `IRemoteStore` over the Drive v3 files API
//! - [`auth::CredentialsFileAuthenticator`] - `IAuthenticator` reading a
//!   credentials JSON file
//!
//! ## Modules
//!
//! - [`auth`] - Credentials file parsing and the refresh-token exchange
//! - [`client`] - Authenticated HTTP client with 429/5xx handling
//! - [`query`] - Drive search query construction and escaping
//! - [`store`] - Remote store adapter
//! - [`upload`] - Multipart and resumable (chunked) uploads

pub mod auth;
pub mod client;
pub mod query;
pub mod store;
pub mod upload;

use std::time::Duration;

use cloudmirror_core::domain::errors::{RemoteError, RemoteErrorKind};
use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to the Drive API
///
/// Display strings start with the HTTP status. The remote store tags each
/// error with [`DriveError::kind`] so callers need not parse them.
#[derive(Debug, Error)]
pub enum DriveError {
    /// The access token is missing, invalid or expired
    #[error("HTTP 401 Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("HTTP 403 Forbidden: {0}")]
    Forbidden(String),

    /// The requested file or folder does not exist
    #[error("HTTP 404 Not Found: {0}")]
    NotFound(String),

    /// Rate limit exceeded; retry after the specified duration
    #[error("HTTP 429 Too Many Requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration to wait before retrying
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx)
    #[error("HTTP {status} server error: {message}")]
    Server {
        status: u16,
        message: String,
    },

    /// Any other unexpected status
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
    },

    /// A network-level error occurred (connect, timeout, body read)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl DriveError {
    /// Classifies a non-success response
    ///
    /// Drive reports per-user rate limiting as 403 with a
    /// `rateLimitExceeded`/`userRateLimitExceeded` reason, which is mapped
    /// to [`DriveError::TooManyRequests`] like a 429.
    pub fn from_status(status: StatusCode, body: &str, retry_after: Duration) -> Self {
        let message = error_message(body);
        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized(message),
            StatusCode::FORBIDDEN if is_rate_limit_reason(body) => {
                Self::TooManyRequests { retry_after }
            }
            StatusCode::FORBIDDEN => Self::Forbidden(message),
            StatusCode::NOT_FOUND => Self::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => Self::TooManyRequests { retry_after },
            s if s.is_server_error() => Self::Server {
                status: s.as_u16(),
                message,
            },
            s => Self::Status {
                status: s.as_u16(),
                message,
            },
        }
    }

    /// How the sync engine should treat this error
    pub fn kind(&self) -> RemoteErrorKind {
        match self {
            Self::TooManyRequests { .. } => RemoteErrorKind::RateLimited,
            Self::Server { .. } | Self::Network(_) => RemoteErrorKind::Transient,
            _ => RemoteErrorKind::Permanent,
        }
    }
}

/// Tags the error with its [`RemoteErrorKind`] for the engine's retry policy
impl From<DriveError> for RemoteError {
    fn from(err: DriveError) -> Self {
        RemoteError::new(err.kind(), err)
    }
}

fn is_rate_limit_reason(body: &str) -> bool {
    body.contains("rateLimitExceeded") || body.contains("userRateLimitExceeded")
}

/// Pulls `error.message` out of a Drive error body, falling back to the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
