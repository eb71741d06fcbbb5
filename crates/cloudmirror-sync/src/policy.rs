//! Per-operation failure policy
//!
//! Every remote call the engine makes has an [`OperationKind`]. The kind
//! decides whether a failure aborts the mapping and which failures are worth
//! retrying. Transient failures are retried with exponential backoff.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use cloudmirror_core::config::RetryConfig;
use cloudmirror_core::domain::errors::{RemoteError, RemoteErrorKind};
use serde::Serialize;
use tracing::{info, warn};

// ============================================================================
// Operation kinds and the policy table
// ============================================================================

/// A kind of remote store call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    FindChild,
    ListChildren,
    CreateFolder,
    CreateFile,
    UpdateFile,
    DeleteNode,
}

/// What a failure of an operation means for the mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Abort the current mapping
    Fatal,
    /// Log, count and continue
    BestEffort,
}

/// Which failures of an operation are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Network errors, rate limiting and 5xx responses
    Transient,
    /// Only rate limiting. A timed-out create may still have been applied,
    /// and the store allows duplicate names, so creates are not replayed
    /// unless the store said it rejected the request.
    RateLimitedOnly,
}

/// Row of the policy table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationPolicy {
    pub severity: Severity,
    pub retry: RetryClass,
}

impl OperationKind {
    pub const ALL: [OperationKind; 6] = [
        Self::FindChild,
        Self::ListChildren,
        Self::CreateFolder,
        Self::CreateFile,
        Self::UpdateFile,
        Self::DeleteNode,
    ];

    /// The policy table
    pub fn policy(self) -> OperationPolicy {
        use RetryClass::{RateLimitedOnly, Transient};
        use Severity::{BestEffort, Fatal};

        let (severity, retry) = match self {
            Self::FindChild => (Fatal, Transient),
            Self::ListChildren => (Fatal, Transient),
            Self::CreateFolder => (Fatal, RateLimitedOnly),
            Self::CreateFile => (Fatal, RateLimitedOnly),
            Self::UpdateFile => (Fatal, Transient),
            Self::DeleteNode => (BestEffort, Transient),
        };
        OperationPolicy { severity, retry }
    }

    pub fn severity(self) -> Severity {
        self.policy().severity
    }

    /// Lookups and listings, as opposed to mutations
    pub fn is_query(self) -> bool {
        matches!(self, Self::FindChild | Self::ListChildren)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FindChild => "find_child",
            Self::ListChildren => "list_children",
            Self::CreateFolder => "create_folder",
            Self::CreateFile => "create_file",
            Self::UpdateFile => "update_file",
            Self::DeleteNode => "delete_node",
        }
    }

    fn should_retry(self, err: &anyhow::Error) -> bool {
        match self.policy().retry {
            RetryClass::Transient => is_transient_error(err),
            RetryClass::RateLimitedOnly => is_rate_limited(err),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Error classification
// ============================================================================

/// Classifies a remote store failure
///
/// Adapters tag their errors with [`RemoteError`]; the tag is authoritative.
/// Untagged errors fall back to [`classify_message`].
pub fn classify(err: &anyhow::Error) -> RemoteErrorKind {
    RemoteError::kind_of(err).unwrap_or_else(|| classify_message(err))
}

/// Classifies an untagged error from its messages
///
/// An `HTTP <status>` prefix anywhere in the chain decides on its own: 429
/// is rate limiting, 5xx is transient, any other status is permanent. Only
/// errors without a status are matched against network keywords, so ids
/// and names that happen to contain digits do not change the outcome.
pub fn classify_message(err: &anyhow::Error) -> RemoteErrorKind {
    let messages: Vec<String> = err
        .chain()
        .map(|cause| cause.to_string().to_lowercase())
        .collect();

    if let Some(status) = messages.iter().find_map(|m| http_status(m)) {
        return match status {
            429 => RemoteErrorKind::RateLimited,
            500..=599 => RemoteErrorKind::Transient,
            _ => RemoteErrorKind::Permanent,
        };
    }

    let any = |needles: &[&str]| {
        messages
            .iter()
            .any(|m| needles.iter().any(|needle| m.contains(needle)))
    };
    if any(&["too many requests", "rate limit"]) {
        RemoteErrorKind::RateLimited
    } else if any(&[
        "network",
        "connection",
        "timeout",
        "timed out",
        "dns",
        "reset by peer",
        "broken pipe",
    ]) {
        RemoteErrorKind::Transient
    } else {
        RemoteErrorKind::Permanent
    }
}

/// Status code following the first `http ` in a lowercased message
fn http_status(message: &str) -> Option<u16> {
    message.match_indices("http ").find_map(|(at, prefix)| {
        let digits: String = message[at + prefix.len()..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        if digits.len() == 3 {
            digits.parse().ok()
        } else {
            None
        }
    })
}

/// Checks if an error is transient and should be retried
///
/// Transient errors include network issues, rate limiting (429),
/// and server errors (5xx).
pub fn is_transient_error(err: &anyhow::Error) -> bool {
    classify(err) != RemoteErrorKind::Permanent
}

/// Checks if an error reports rate limiting
pub fn is_rate_limited(err: &anyhow::Error) -> bool {
    classify(err) == RemoteErrorKind::RateLimited
}

// ============================================================================
// Retry
// ============================================================================

/// Retry budget and backoff for remote calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `attempt + 1`: `base_delay * 2^attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, Duration::from_millis(config.base_delay_ms))
    }
}

/// Executes an async operation with exponential backoff retry
///
/// Retries only the failures the operation's policy row allows.
/// Other errors are returned immediately.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, kind: OperationKind, f: F) -> anyhow::Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation = %kind, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt < policy.max_retries && kind.should_retry(&err) {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        operation = %kind,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                } else {
                    return Err(err);
                }
            }
        }
    }
}
