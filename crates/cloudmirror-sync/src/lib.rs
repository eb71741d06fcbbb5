//! cloudmirror Sync - One-way tree reconciliation engine
//!
//! Provides:
//! - Logical path resolution against a name-and-parent addressed store
//! - Recursive diff of a local tree against a remote child snapshot
//! - Per-mapping orchestration with exclusions and a run report
//! - A per-operation failure and retry policy
//!
//! ## Modules
//!
//! - [`engine`] - Reconciliation driver and run reports
//! - [`resolver`] - Segment-by-segment path resolution and parent chain creation
//! - [`index`] - Arena snapshot of a remote subtree keyed by `(parent, name)`
//! - [`walker`] - Local tree traversal producing create/update/delete actions
//! - [`gateway`] - Remote store calls with retry and error context
//! - [`policy`] - Operation kinds, severities and retry backoff
//! - [`dry_run`] - Store wrapper that logs mutations instead of applying them

pub mod dry_run;
pub mod engine;
pub mod gateway;
pub mod index;
pub mod policy;
pub mod resolver;
pub mod walker;

use std::path::PathBuf;

use cloudmirror_core::domain::errors::{AuthError, DomainError};
use cloudmirror_core::domain::newtypes::RemoteId;
use thiserror::Error;

pub use dry_run::DryRunStore;
pub use engine::{EngineOptions, MappingFailure, MappingReport, ReconcileReport, ReconciliationEngine};
pub use policy::{OperationKind, RetryPolicy, Severity};

/// Errors that can occur during reconciliation
#[derive(Debug, Error)]
pub enum SyncError {
    /// Invalid mapping or exclusion input, detected before any remote call
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Credential acquisition failed
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// A lookup or listing against the remote store failed
    #[error("{operation} failed for query {query:?} under parent {parent}")]
    RemoteQuery {
        operation: OperationKind,
        query: String,
        parent: RemoteId,
        #[source]
        source: anyhow::Error,
    },

    /// A create, update or delete against the remote store failed
    #[error("{operation} failed for {name:?} under parent {parent}")]
    RemoteMutation {
        operation: OperationKind,
        name: String,
        parent: RemoteId,
        #[source]
        source: anyhow::Error,
    },

    /// A local entry could not be read or listed
    #[error("Local I/O error at {}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The traversal and the remote snapshot disagree
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// A mapping was aborted by one of the errors above
    #[error("Mapping {} failed", .local_root.display())]
    MappingFailed {
        local_root: PathBuf,
        #[source]
        source: Box<SyncError>,
    },
}

impl From<DomainError> for SyncError {
    fn from(err: DomainError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl SyncError {
    /// The error and all of its causes joined by `": "`
    pub fn chain(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}
