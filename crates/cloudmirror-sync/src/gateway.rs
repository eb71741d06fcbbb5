//! Remote store calls with retry and error context
//!
//! [`RemoteGateway`] is the only place the engine talks to an
//! [`IRemoteStore`]. Each call runs under the retry policy of its
//! [`OperationKind`] and failures are wrapped into [`SyncError`] with the
//! query or node name and the parent id attached.

use bytes::Bytes;
use cloudmirror_core::domain::newtypes::RemoteId;
use cloudmirror_core::domain::node::RemoteNode;
use cloudmirror_core::ports::remote_store::IRemoteStore;
use tracing::debug;

use crate::policy::{with_retry, OperationKind, RetryPolicy};
use crate::SyncError;

pub struct RemoteGateway<'a> {
    store: &'a dyn IRemoteStore,
    retry: RetryPolicy,
}

impl<'a> RemoteGateway<'a> {
    pub fn new(store: &'a dyn IRemoteStore, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub async fn find_child(
        &self,
        parent: &RemoteId,
        name: &str,
    ) -> Result<Option<RemoteNode>, SyncError> {
        let kind = OperationKind::FindChild;
        let found = with_retry(&self.retry, kind, || self.store.find_child(parent, name))
            .await
            .map_err(|source| SyncError::RemoteQuery {
                operation: kind,
                query: name.to_string(),
                parent: parent.clone(),
                source,
            })?;
        debug!(parent = %parent, name, found = found.is_some(), "Looked up child");
        Ok(found)
    }

    pub async fn list_children(&self, parent: &RemoteId) -> Result<Vec<RemoteNode>, SyncError> {
        let kind = OperationKind::ListChildren;
        let children = with_retry(&self.retry, kind, || self.store.list_children(parent))
            .await
            .map_err(|source| SyncError::RemoteQuery {
                operation: kind,
                query: "*".to_string(),
                parent: parent.clone(),
                source,
            })?;
        debug!(parent = %parent, count = children.len(), "Listed children");
        Ok(children)
    }

    pub async fn create_folder(
        &self,
        parent: &RemoteId,
        name: &str,
    ) -> Result<RemoteNode, SyncError> {
        let kind = OperationKind::CreateFolder;
        with_retry(&self.retry, kind, || self.store.create_folder(parent, name))
            .await
            .map_err(|source| mutation_error(kind, name, parent, source))
    }

    /// Each attempt hands the store the same shared buffer
    pub async fn create_file(
        &self,
        parent: &RemoteId,
        name: &str,
        content_type: &str,
        content: Bytes,
    ) -> Result<RemoteNode, SyncError> {
        let kind = OperationKind::CreateFile;
        with_retry(&self.retry, kind, || {
            self.store
                .create_file(parent, name, content_type, content.clone())
        })
        .await
        .map_err(|source| mutation_error(kind, name, parent, source))
    }

    /// `name` is only used for error context
    pub async fn update_file(
        &self,
        node: &RemoteId,
        parent: &RemoteId,
        name: &str,
        content_type: &str,
        content: Bytes,
    ) -> Result<RemoteNode, SyncError> {
        let kind = OperationKind::UpdateFile;
        with_retry(&self.retry, kind, || {
            self.store
                .update_file(node, parent, content_type, content.clone())
        })
        .await
        .map_err(|source| mutation_error(kind, name, parent, source))
    }

    /// `name` and `parent` are only used for error context
    pub async fn delete_node(
        &self,
        node: &RemoteId,
        parent: &RemoteId,
        name: &str,
    ) -> Result<(), SyncError> {
        let kind = OperationKind::DeleteNode;
        with_retry(&self.retry, kind, || self.store.delete_node(node))
            .await
            .map_err(|source| mutation_error(kind, name, parent, source))
    }
}

fn mutation_error(
    operation: OperationKind,
    name: &str,
    parent: &RemoteId,
    source: anyhow::Error,
) -> SyncError {
    SyncError::RemoteMutation {
        operation,
        name: name.to_string(),
        parent: parent.clone(),
        source,
    }
}
