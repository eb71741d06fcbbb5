//! Dry-run store
//!
//! Wraps a real store: lookups and listings are forwarded, mutations are
//! logged and answered with synthetic nodes. Folders created during a dry
//! run have ids starting with `dry-run-` and are always empty.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use cloudmirror_core::domain::newtypes::RemoteId;
use cloudmirror_core::domain::node::RemoteNode;
use cloudmirror_core::ports::remote_store::IRemoteStore;
use tracing::info;

const SYNTHETIC_PREFIX: &str = "dry-run-";

pub struct DryRunStore {
    inner: Arc<dyn IRemoteStore>,
    next_id: AtomicU64,
}

impl DryRunStore {
    pub fn new(inner: Arc<dyn IRemoteStore>) -> Self {
        Self {
            inner,
            next_id: AtomicU64::new(1),
        }
    }

    fn synthetic_id(&self) -> anyhow::Result<RemoteId> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(RemoteId::new(format!("{SYNTHETIC_PREFIX}{n}"))?)
    }

    fn is_synthetic(id: &RemoteId) -> bool {
        id.as_str().starts_with(SYNTHETIC_PREFIX)
    }
}

#[async_trait::async_trait]
impl IRemoteStore for DryRunStore {
    async fn find_child(
        &self,
        parent: &RemoteId,
        name: &str,
    ) -> anyhow::Result<Option<RemoteNode>> {
        if Self::is_synthetic(parent) {
            return Ok(None);
        }
        self.inner.find_child(parent, name).await
    }

    async fn list_children(&self, parent: &RemoteId) -> anyhow::Result<Vec<RemoteNode>> {
        if Self::is_synthetic(parent) {
            return Ok(Vec::new());
        }
        self.inner.list_children(parent).await
    }

    async fn create_folder(&self, parent: &RemoteId, name: &str) -> anyhow::Result<RemoteNode> {
        info!(parent = %parent, name, "[dry-run] would create folder");
        Ok(RemoteNode::folder(self.synthetic_id()?, name))
    }

    async fn create_file(
        &self,
        parent: &RemoteId,
        name: &str,
        content_type: &str,
        content: Bytes,
    ) -> anyhow::Result<RemoteNode> {
        info!(
            parent = %parent,
            name,
            content_type,
            size = content.len(),
            "[dry-run] would create file"
        );
        let mut node = RemoteNode::file(self.synthetic_id()?, name);
        node.size = Some(content.len() as u64);
        node.content_type = Some(content_type.to_string());
        Ok(node)
    }

    async fn update_file(
        &self,
        node: &RemoteId,
        parent: &RemoteId,
        content_type: &str,
        content: Bytes,
    ) -> anyhow::Result<RemoteNode> {
        info!(
            id = %node,
            parent = %parent,
            content_type,
            size = content.len(),
            "[dry-run] would update file"
        );
        let mut updated = RemoteNode::file(node.clone(), String::new());
        updated.size = Some(content.len() as u64);
        updated.content_type = Some(content_type.to_string());
        Ok(updated)
    }

    async fn delete_node(&self, node: &RemoteId) -> anyhow::Result<()> {
        info!(id = %node, "[dry-run] would delete node");
        Ok(())
    }
}
