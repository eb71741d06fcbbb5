//! Remote store port (driven/secondary port)
//!
//! A remote store organises files and folders as named nodes under parent
//! references. It has no notion of a full path: every node is reached by
//! asking for a name under a known parent id.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific;
//!   the engine attaches operation context and classifies them as transient or not.
//!   Adapters wrap their failures in [`RemoteError`](crate::domain::errors::RemoteError)
//!   so the classification does not depend on message text.
//! - File content is a [`Bytes`] buffer, so a retried upload shares the buffer
//!   instead of copying it.
//! - Uses `#[async_trait]` for async trait methods.

use bytes::Bytes;

use crate::domain::newtypes::RemoteId;
use crate::domain::node::RemoteNode;

/// Port trait for the remote hierarchical object store
///
/// ## Implementation Notes
///
/// - `find_child` is kind-agnostic: a folder and a file with the same name
///   both match.
/// - `list_children` returns every direct child; pagination is the
///   implementation's concern.
/// - Content is passed as a complete buffer. How it is transferred (one
///   request or several chunks) is the implementation's concern.
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Looks up a direct child of `parent` by name
    ///
    /// # Returns
    /// The first matching node, or `None` when no child has that name
    async fn find_child(&self, parent: &RemoteId, name: &str)
        -> anyhow::Result<Option<RemoteNode>>;

    /// Lists all direct children of `parent`
    async fn list_children(&self, parent: &RemoteId) -> anyhow::Result<Vec<RemoteNode>>;

    /// Creates an empty folder named `name` under `parent`
    async fn create_folder(&self, parent: &RemoteId, name: &str) -> anyhow::Result<RemoteNode>;

    /// Creates a file under `parent` with the given content
    async fn create_file(
        &self,
        parent: &RemoteId,
        name: &str,
        content_type: &str,
        content: Bytes,
    ) -> anyhow::Result<RemoteNode>;

    /// Replaces the content and content type of an existing file
    ///
    /// `parent` is the folder the engine located the file under; stores
    /// supporting multiple parents make sure the file stays linked there.
    async fn update_file(
        &self,
        node: &RemoteId,
        parent: &RemoteId,
        content_type: &str,
        content: Bytes,
    ) -> anyhow::Result<RemoteNode>;

    /// Deletes a node; folders are deleted together with their descendants
    async fn delete_node(&self, node: &RemoteId) -> anyhow::Result<()>;
}
