//! Reconciliation driver
//!
//! Runs every configured mapping: resolves the mapping's remote location,
//! then either diffs an existing folder, updates an existing file, or
//! creates the missing parent chain and uploads the local entry under it.
//!
//! Mappings share no state and run one after another. What happens when one
//! fails is decided by [`MappingErrorPolicy`].

use std::path::PathBuf;
use std::sync::Arc;

use cloudmirror_core::config::Config;
use cloudmirror_core::domain::mapping::{ExclusionSet, Mapping};
use cloudmirror_core::domain::newtypes::RemoteId;
use cloudmirror_core::domain::policy::{ChangeDetection, MappingErrorPolicy};
use cloudmirror_core::ports::remote_store::IRemoteStore;
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::gateway::RemoteGateway;
use crate::policy::RetryPolicy;
use crate::resolver::PathResolver;
use crate::walker::TreeWalker;
use crate::SyncError;

// ============================================================================
// Reports
// ============================================================================

/// What one mapping did to the remote store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingReport {
    pub local_root: PathBuf,
    pub remote_path: String,
    /// Folders created, including missing parent segments
    pub folders_created: usize,
    pub files_created: usize,
    pub files_updated: usize,
    /// Files whose upload was skipped by change detection
    pub files_unchanged: usize,
    pub nodes_deleted: usize,
    /// Best-effort deletions that failed
    pub delete_failures: usize,
    pub entries_excluded: usize,
    /// Symlinks and special files
    pub entries_skipped: usize,
}

impl MappingReport {
    pub fn new(mapping: &Mapping) -> Self {
        Self {
            local_root: mapping.local_root.clone(),
            remote_path: mapping.remote_path.to_string(),
            ..Self::default()
        }
    }

    /// Create calls made, folders and files together
    pub fn creates(&self) -> usize {
        self.folders_created + self.files_created
    }
}

/// A mapping that failed under [`MappingErrorPolicy::ContinueAndReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingFailure {
    pub local_root: PathBuf,
    pub remote_path: String,
    /// The error and its causes
    pub error: String,
}

/// Summary of a reconciliation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub mappings: Vec<MappingReport>,
    pub failures: Vec<MappingFailure>,
    /// Wall-clock duration of the run in milliseconds
    pub duration_ms: u64,
}

impl ReconcileReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Sums one counter over all successful mappings
    pub fn total(&self, counter: impl Fn(&MappingReport) -> usize) -> usize {
        self.mappings.iter().map(counter).sum()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Tunables of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub change_detection: ChangeDetection,
    pub on_mapping_error: MappingErrorPolicy,
    pub retry: RetryPolicy,
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            change_detection: config.sync.change_detection,
            on_mapping_error: config.sync.on_mapping_error,
            retry: RetryPolicy::from(&config.retry),
        }
    }
}

/// One-way reconciliation of local roots into a remote store
pub struct ReconciliationEngine {
    store: Arc<dyn IRemoteStore>,
    root_id: RemoteId,
    exclusions: ExclusionSet,
    options: EngineOptions,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn IRemoteStore>,
        root_id: RemoteId,
        exclusions: ExclusionSet,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            root_id,
            exclusions,
            options,
        }
    }

    /// Reconciles every mapping in order
    ///
    /// # Errors
    /// Under [`MappingErrorPolicy::FailFast`], the first failing mapping as
    /// [`SyncError::MappingFailed`]; mappings already reconciled are kept.
    #[instrument(skip_all, fields(mappings = mappings.len(), root = %self.root_id))]
    pub async fn run(&self, mappings: &[Mapping]) -> Result<ReconcileReport, SyncError> {
        let start = std::time::Instant::now();
        let mut report = ReconcileReport::default();

        for mapping in mappings {
            match self.reconcile_mapping(mapping).await {
                Ok(mapping_report) => report.mappings.push(mapping_report),
                Err(err) => {
                    let err = SyncError::MappingFailed {
                        local_root: mapping.local_root.clone(),
                        source: Box::new(err),
                    };
                    let message = err.chain();
                    error!(mapping = %mapping.local_root.display(), error = %message, "Mapping failed");

                    match self.options.on_mapping_error {
                        MappingErrorPolicy::FailFast => return Err(err),
                        MappingErrorPolicy::ContinueAndReport => {
                            report.failures.push(MappingFailure {
                                local_root: mapping.local_root.clone(),
                                remote_path: mapping.remote_path.to_string(),
                                error: message,
                            });
                        }
                    }
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            succeeded = report.mappings.len(),
            failed = report.failures.len(),
            created = report.total(MappingReport::creates),
            updated = report.total(|m| m.files_updated),
            deleted = report.total(|m| m.nodes_deleted),
            duration_ms = report.duration_ms,
            "Reconciliation complete"
        );
        Ok(report)
    }

    /// Reconciles a single mapping
    #[instrument(skip_all, fields(mapping = %mapping.local_root.display(), remote_path = %mapping.remote_path))]
    pub async fn reconcile_mapping(&self, mapping: &Mapping) -> Result<MappingReport, SyncError> {
        let mut report = MappingReport::new(mapping);
        let local_root = mapping.local_root.as_path();

        if self.exclusions.is_excluded(local_root) {
            info!("Mapping root is excluded, skipping");
            report.entries_excluded += 1;
            return Ok(report);
        }

        let metadata = tokio::fs::metadata(local_root)
            .await
            .map_err(|source| SyncError::LocalIo {
                path: local_root.to_path_buf(),
                source,
            })?;
        let is_dir = metadata.is_dir();
        if !is_dir && !metadata.is_file() {
            return Err(SyncError::Configuration(format!(
                "{} is neither a regular file nor a directory",
                local_root.display()
            )));
        }
        let name = mapping.entry_name().ok_or_else(|| {
            SyncError::Configuration(format!(
                "{} does not name a file or directory",
                local_root.display()
            ))
        })?;

        let gateway = RemoteGateway::new(self.store.as_ref(), self.options.retry);
        let resolver = PathResolver::new(&gateway);
        let walker = TreeWalker::new(&gateway, &self.exclusions, self.options.change_detection);

        // The local root's own node is the last segment.
        let mut segments = mapping.remote_path.segments().to_vec();
        segments.push(name);

        let resolution = resolver.resolve(&self.root_id, &segments).await?;

        if resolution.fully_existed {
            let node = resolution.node.ok_or_else(|| {
                SyncError::Consistency("resolved path has no node".to_string())
            })?;
            match (is_dir, node.is_folder()) {
                (true, true) => {
                    info!(id = %node.id, "Remote folder exists, diffing");
                    walker.diff_folder(local_root, &node.id, &mut report).await?;
                }
                (false, false) => {
                    walker
                        .update_file(local_root, &node, &resolution.parent_id, &mut report)
                        .await?;
                }
                _ => {
                    return Err(SyncError::Consistency(format!(
                        "{} is a {} locally but {}/{} is a {} remotely",
                        local_root.display(),
                        if is_dir { "directory" } else { "file" },
                        mapping.remote_path,
                        node.name,
                        node.kind
                    )));
                }
            }
        } else {
            let missing = &segments[resolution.resolved_depth..segments.len() - 1];
            let parent = resolver
                .create_missing(&resolution.resolved_id, missing)
                .await?;
            report.folders_created += missing.len();

            if is_dir {
                walker.create_tree(local_root, &parent, &mut report).await?;
            } else {
                walker.create_file(local_root, &parent, &mut report).await?;
            }
        }

        info!(
            folders_created = report.folders_created,
            files_created = report.files_created,
            files_updated = report.files_updated,
            files_unchanged = report.files_unchanged,
            nodes_deleted = report.nodes_deleted,
            delete_failures = report.delete_failures,
            "Mapping reconciled"
        );
        Ok(report)
    }
}
