//! Tree walker
//!
//! Makes the remote subtree under a folder match a local directory. The
//! local tree is walked depth first in file name order; each entry is looked
//! up by `(parent id, name)` in a [`RemoteChildIndex`] snapshot and created,
//! updated or left alone. Whatever the walk never touched is deleted at the
//! end.
//!
//! The parent id of a local entry comes from the traversal context: every
//! directory records the remote folder id it was matched to or created as,
//! and its children read it back from there.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use cloudmirror_core::domain::classifier::{classify, content_type_for};
use cloudmirror_core::domain::mapping::ExclusionSet;
use cloudmirror_core::domain::newtypes::RemoteId;
use cloudmirror_core::domain::node::RemoteNode;
use cloudmirror_core::domain::policy::ChangeDetection;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::engine::MappingReport;
use crate::gateway::RemoteGateway;
use crate::index::RemoteChildIndex;
use crate::policy::{OperationKind, Severity};
use crate::SyncError;

pub struct TreeWalker<'g, 'a> {
    gateway: &'g RemoteGateway<'a>,
    exclusions: &'g ExclusionSet,
    change_detection: ChangeDetection,
}

/// Mutable state of one reconciliation pass
struct Pass<'r> {
    index: RemoteChildIndex,
    /// Local directory -> remote folder id, seeded with the pass root
    folder_ids: HashMap<PathBuf, RemoteId>,
    report: &'r mut MappingReport,
}

impl<'g, 'a> TreeWalker<'g, 'a> {
    pub fn new(
        gateway: &'g RemoteGateway<'a>,
        exclusions: &'g ExclusionSet,
        change_detection: ChangeDetection,
    ) -> Self {
        Self {
            gateway,
            exclusions,
            change_detection,
        }
    }

    /// Converges the remote folder `remote_folder` to the local directory `local_root`
    #[instrument(skip_all, fields(local = %local_root.display(), remote = %remote_folder))]
    pub async fn diff_folder(
        &self,
        local_root: &Path,
        remote_folder: &RemoteId,
        report: &mut MappingReport,
    ) -> Result<(), SyncError> {
        let index = RemoteChildIndex::build(self.gateway, remote_folder).await?;
        self.reconcile(local_root, remote_folder, index, report).await
    }

    /// Creates `local_root` as a new folder under `parent`, then every
    /// non-excluded descendant
    ///
    /// Nothing exists remotely yet, so no listing is made.
    #[instrument(skip_all, fields(local = %local_root.display(), parent = %parent))]
    pub async fn create_tree(
        &self,
        local_root: &Path,
        parent: &RemoteId,
        report: &mut MappingReport,
    ) -> Result<RemoteNode, SyncError> {
        let info = classify(local_root, true);
        let folder = self.gateway.create_folder(parent, &info.name).await?;
        info!(name = %info.name, parent = %parent, id = %folder.id, "Created folder");
        report.folders_created += 1;

        let index = RemoteChildIndex::empty(folder.id.clone());
        self.reconcile(local_root, &folder.id, index, report).await?;
        Ok(folder)
    }

    /// Uploads `path` as a new file under `parent`
    pub async fn create_file(
        &self,
        path: &Path,
        parent: &RemoteId,
        report: &mut MappingReport,
    ) -> Result<RemoteNode, SyncError> {
        let info = classify(path, false);
        let content_type = content_type_for(path);
        let content = read_local(path).await?;
        let size = content.len();

        let node = self
            .gateway
            .create_file(parent, &info.name, content_type, content)
            .await?;
        info!(
            path = %path.display(),
            parent = %parent,
            id = %node.id,
            size,
            content_type,
            "Created file"
        );
        report.files_created += 1;
        Ok(node)
    }

    /// Replaces the content of the existing remote file `node` with `path`
    ///
    /// Under [`ChangeDetection::Always`] the upload always happens.
    pub async fn update_file(
        &self,
        path: &Path,
        node: &RemoteNode,
        parent: &RemoteId,
        report: &mut MappingReport,
    ) -> Result<(), SyncError> {
        if self.change_detection == ChangeDetection::SizeAndModified {
            let metadata = tokio::fs::metadata(path)
                .await
                .map_err(|source| local_io(path, source))?;
            let local_modified = metadata.modified().ok().map(DateTime::<Utc>::from);
            if is_unchanged(node, metadata.len(), local_modified) {
                debug!(path = %path.display(), id = %node.id, "File unchanged, skipping upload");
                report.files_unchanged += 1;
                return Ok(());
            }
        }

        let content_type = content_type_for(path);
        let content = read_local(path).await?;
        let size = content.len();
        self.gateway
            .update_file(&node.id, parent, &node.name, content_type, content)
            .await?;
        info!(path = %path.display(), id = %node.id, size, "Updated file");
        report.files_updated += 1;
        Ok(())
    }

    async fn reconcile(
        &self,
        local_root: &Path,
        root_id: &RemoteId,
        index: RemoteChildIndex,
        report: &mut MappingReport,
    ) -> Result<(), SyncError> {
        let mut pass = Pass {
            index,
            folder_ids: HashMap::from([(local_root.to_path_buf(), root_id.clone())]),
            report,
        };

        let mut entries = WalkDir::new(local_root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = entries.next() {
            let entry = entry.map_err(walk_error)?;
            let path = entry.path();
            let file_type = entry.file_type();

            let parent_id = path
                .parent()
                .and_then(|parent| pass.folder_ids.get(parent))
                .cloned()
                .ok_or_else(|| {
                    SyncError::Consistency(format!(
                        "parent folder not found: {}",
                        path.parent().unwrap_or(local_root).display()
                    ))
                })?;
            let info = classify(path, file_type.is_dir());

            if self.exclusions.is_excluded(path) {
                debug!(path = %path.display(), "Excluded");
                pass.report.entries_excluded += 1;
                pass.index.mark_subtree_processed(&parent_id, &info.name);
                if file_type.is_dir() {
                    entries.skip_current_dir();
                }
                continue;
            }

            if !file_type.is_dir() && !file_type.is_file() {
                warn!(
                    path = %path.display(),
                    "Skipping entry that is neither a regular file nor a directory"
                );
                pass.report.entries_skipped += 1;
                pass.index.mark_subtree_processed(&parent_id, &info.name);
                continue;
            }

            if file_type.is_dir() {
                let folder_id = self
                    .reconcile_dir(&mut pass, &parent_id, &info.name)
                    .await?;
                pass.folder_ids.insert(path.to_path_buf(), folder_id);
            } else {
                self.reconcile_file(&mut pass, &parent_id, &info.name, path)
                    .await?;
            }
        }

        self.prune_orphans(&pass.index, pass.report).await?;
        Ok(())
    }

    async fn reconcile_dir(
        &self,
        pass: &mut Pass<'_>,
        parent: &RemoteId,
        name: &str,
    ) -> Result<RemoteId, SyncError> {
        match pass.index.get(parent, name).cloned() {
            Some(existing) if existing.is_folder() => {
                pass.index.mark_processed(parent, name);
                debug!(name, id = %existing.id, "Folder exists");
                Ok(existing.id)
            }
            Some(existing) => {
                self.discard(pass, parent, &existing).await?;
                self.new_folder(pass, parent, name).await
            }
            None => self.new_folder(pass, parent, name).await,
        }
    }

    async fn reconcile_file(
        &self,
        pass: &mut Pass<'_>,
        parent: &RemoteId,
        name: &str,
        path: &Path,
    ) -> Result<(), SyncError> {
        match pass.index.get(parent, name).cloned() {
            Some(existing) if !existing.is_folder() => {
                pass.index.mark_processed(parent, name);
                self.update_file(path, &existing, parent, pass.report).await
            }
            Some(existing) => {
                self.discard(pass, parent, &existing).await?;
                let node = self.create_file(path, parent, pass.report).await?;
                pass.index.insert_processed(parent, node);
                Ok(())
            }
            None => {
                let node = self.create_file(path, parent, pass.report).await?;
                pass.index.insert_processed(parent, node);
                Ok(())
            }
        }
    }

    async fn new_folder(
        &self,
        pass: &mut Pass<'_>,
        parent: &RemoteId,
        name: &str,
    ) -> Result<RemoteId, SyncError> {
        let folder = self.gateway.create_folder(parent, name).await?;
        info!(name, parent = %parent, id = %folder.id, "Created folder");
        pass.report.folders_created += 1;
        let id = folder.id.clone();
        pass.index.insert_processed(parent, folder);
        Ok(id)
    }

    /// Deletes a remote node whose kind differs from the local entry of the
    /// same name, so the entry can be created fresh
    async fn discard(
        &self,
        pass: &mut Pass<'_>,
        parent: &RemoteId,
        existing: &RemoteNode,
    ) -> Result<(), SyncError> {
        info!(
            name = %existing.name,
            id = %existing.id,
            remote_kind = %existing.kind,
            "Remote node has the wrong kind, replacing"
        );
        pass.index.mark_subtree_processed(parent, &existing.name);
        self.delete(parent, existing, pass.report).await?;
        Ok(())
    }

    /// Deletes every node the pass never matched, parents first
    ///
    /// Descendants of a folder that was deleted go with it and are not
    /// deleted one by one.
    async fn prune_orphans(
        &self,
        index: &RemoteChildIndex,
        report: &mut MappingReport,
    ) -> Result<(), SyncError> {
        let mut gone = vec![false; index.len()];
        for (slot, orphan) in index.orphans() {
            if orphan.parent_slot.is_some_and(|parent| gone[parent]) {
                gone[slot] = true;
                continue;
            }
            gone[slot] = self.delete(&orphan.parent, &orphan.node, report).await?;
        }
        Ok(())
    }

    /// Deletes one node under the delete policy; returns whether it is gone
    async fn delete(
        &self,
        parent: &RemoteId,
        node: &RemoteNode,
        report: &mut MappingReport,
    ) -> Result<bool, SyncError> {
        match self.gateway.delete_node(&node.id, parent, &node.name).await {
            Ok(()) => {
                info!(name = %node.name, id = %node.id, parent = %parent, "Deleted remote node");
                report.nodes_deleted += 1;
                Ok(true)
            }
            Err(err) => match OperationKind::DeleteNode.severity() {
                Severity::BestEffort => {
                    warn!(
                        name = %node.name,
                        id = %node.id,
                        error = %err.chain(),
                        "Failed to delete remote node, continuing"
                    );
                    report.delete_failures += 1;
                    Ok(false)
                }
                Severity::Fatal => Err(err),
            },
        }
    }
}

/// True when the remote copy has the local size and is not older than the
/// local file. Missing metadata on either side counts as changed.
pub fn is_unchanged(
    remote: &RemoteNode,
    local_size: u64,
    local_modified: Option<DateTime<Utc>>,
) -> bool {
    match (remote.size, remote.modified, local_modified) {
        (Some(size), Some(remote_modified), Some(local_modified)) => {
            size == local_size && remote_modified >= local_modified
        }
        _ => false,
    }
}

async fn read_local(path: &Path) -> Result<Bytes, SyncError> {
    tokio::fs::read(path)
        .await
        .map(Bytes::from)
        .map_err(|source| local_io(path, source))
}

fn local_io(path: &Path, source: std::io::Error) -> SyncError {
    SyncError::LocalIo {
        path: path.to_path_buf(),
        source,
    }
}

fn walk_error(err: walkdir::Error) -> SyncError {
    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
    SyncError::LocalIo {
        path,
        source: std::io::Error::from(err),
    }
}
