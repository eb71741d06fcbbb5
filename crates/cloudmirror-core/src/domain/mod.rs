//! Domain entities and business logic
//!
//! This module contains the core domain types for cloudmirror:
//! - Newtypes for validated identifiers and logical remote paths
//! - Remote node types as reported by a remote store
//! - Mappings and exclusion sets loaded from configuration
//! - The node classifier for local entries
//! - Run policies (change detection, cross-mapping failure handling)
//! - Domain-specific error types

pub mod classifier;
pub mod errors;
pub mod mapping;
pub mod newtypes;
pub mod node;
pub mod policy;

// Re-export commonly used types
pub use classifier::{classify, content_type_for, LocalEntryInfo, DEFAULT_CONTENT_TYPE};
pub use errors::{AuthError, DomainError, RemoteError, RemoteErrorKind};
pub use mapping::{ExclusionSet, Mapping};
pub use newtypes::{LogicalPath, RemoteId};
pub use node::{NodeKind, RemoteNode};
pub use policy::{ChangeDetection, MappingErrorPolicy};
