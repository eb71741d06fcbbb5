//! Remote node types
//!
//! A [`RemoteNode`] is what the remote store reports for a file or folder.
//! It carries no parent reference: the engine always knows the parent id it
//! looked a node up under, and keys its bookkeeping by `(parent, name)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::RemoteId;

/// Whether a node is a folder or a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Folder,
    File,
}

impl NodeKind {
    #[must_use]
    pub fn is_folder(self) -> bool {
        matches!(self, Self::Folder)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Folder => write!(f, "folder"),
            Self::File => write!(f, "file"),
        }
    }
}

/// A file or folder in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNode {
    /// Opaque node identifier
    pub id: RemoteId,
    /// Node name (unique per parent as far as the engine is concerned)
    pub name: String,
    /// Folder or file
    pub kind: NodeKind,
    /// Content size in bytes (files only, when the store reports it)
    pub size: Option<u64>,
    /// Last modification time reported by the store
    pub modified: Option<DateTime<Utc>>,
    /// Content type reported by the store (files only)
    pub content_type: Option<String>,
}

impl RemoteNode {
    /// A folder node with no metadata
    pub fn folder(id: RemoteId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: NodeKind::Folder,
            size: None,
            modified: None,
            content_type: None,
        }
    }

    /// A file node with no metadata
    pub fn file(id: RemoteId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: NodeKind::File,
            size: None,
            modified: None,
            content_type: None,
        }
    }

    /// Builder-style setter for size and modified time
    #[must_use]
    pub fn with_metadata(mut self, size: Option<u64>, modified: Option<DateTime<Utc>>) -> Self {
        self.size = size;
        self.modified = modified;
        self
    }

    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }
}
