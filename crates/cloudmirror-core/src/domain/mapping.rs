//! Mappings and exclusion sets
//!
//! Both are loaded once from configuration and never mutated afterwards.

use std::path::{Path, PathBuf};

use super::newtypes::LogicalPath;

/// A local root mirrored under a logical remote location
///
/// `remote_path` names the remote *parent* location: the local root's own
/// node is named after its base name and lives directly under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub local_root: PathBuf,
    pub remote_path: LogicalPath,
}

impl Mapping {
    pub fn new(local_root: impl Into<PathBuf>, remote_path: LogicalPath) -> Self {
        Self {
            local_root: local_root.into(),
            remote_path,
        }
    }

    /// Base name of the local root, i.e. the name of its remote counterpart
    pub fn entry_name(&self) -> Option<String> {
        self.local_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }
}

/// Local paths that must never be mirrored
///
/// Matching is component-wise: `/data/tmp` excludes `/data/tmp` and
/// `/data/tmp/x`, but not `/data/tmpfile`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    paths: Vec<PathBuf>,
}

impl ExclusionSet {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// True if `path` equals or lies below any excluded entry
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.paths.iter().any(|excluded| path.starts_with(excluded))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
