//! Domain error types
//!
//! This module defines error types specific to domain operations
//! (validation of identifiers and logical paths), the error type
//! returned by the authenticator port, and the classification remote store
//! adapters attach to their failures.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid logical remote path
    #[error("Invalid logical path: {0}")]
    InvalidLogicalPath(String),

    /// Invalid remote ID format
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Invalid local path
    #[error("Invalid local path: {0}")]
    InvalidLocalPath(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Errors produced while acquiring transport credentials
#[derive(Debug, Error)]
pub enum AuthError {
    /// The credential material could not be read from disk
    #[error("Cannot read credentials file {}: {source}", .path.display())]
    Unreadable {
        /// Path of the credentials file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The credential material is malformed or incomplete
    #[error("Invalid credentials: {0}")]
    Invalid(String),

    /// The token endpoint rejected the credentials or could not be reached
    #[error("Token exchange failed: {0}")]
    Exchange(String),
}

/// How a failed remote store call may be treated by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// The store throttled the request without applying it
    RateLimited,
    /// Network failure or upstream error; the same call may succeed later
    Transient,
    /// Retrying the same call cannot succeed
    Permanent,
}

/// An adapter error tagged with its [`RemoteErrorKind`]
///
/// Displays as the wrapped error and exposes the wrapped error's source, so
/// error chains read the same with or without the tag.
#[derive(Debug)]
pub struct RemoteError {
    kind: RemoteErrorKind,
    inner: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl RemoteError {
    pub fn new(
        kind: RemoteErrorKind,
        inner: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            kind,
            inner: inner.into(),
        }
    }

    pub fn kind(&self) -> RemoteErrorKind {
        self.kind
    }

    /// The kind of the first tagged error in `err`'s chain, if any
    pub fn kind_of(err: &anyhow::Error) -> Option<RemoteErrorKind> {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<RemoteError>())
            .map(RemoteError::kind)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for RemoteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}
