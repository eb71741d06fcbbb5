//! Path resolution
//!
//! The remote store has no path primitive, so a logical path is turned into
//! a node id by asking for one segment at a time under the node found for
//! the previous segment.

use cloudmirror_core::domain::newtypes::RemoteId;
use cloudmirror_core::domain::node::RemoteNode;
use tracing::{debug, info};

use crate::gateway::RemoteGateway;
use crate::SyncError;

/// Outcome of resolving a list of segments from a root id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Id of the deepest node that exists (the root when nothing matched)
    pub resolved_id: RemoteId,
    /// Number of leading segments that exist; index of the first missing one
    pub resolved_depth: usize,
    /// True when every segment exists
    pub fully_existed: bool,
    /// The node for the last matched segment, `None` when nothing matched
    pub node: Option<RemoteNode>,
    /// Id of the folder `node` was found under (`root` when nothing matched)
    pub parent_id: RemoteId,
}

pub struct PathResolver<'g, 'a> {
    gateway: &'g RemoteGateway<'a>,
}

impl<'g, 'a> PathResolver<'g, 'a> {
    pub fn new(gateway: &'g RemoteGateway<'a>) -> Self {
        Self { gateway }
    }

    /// Resolves `segments` left to right starting at `root`
    ///
    /// Stops at the first segment with no matching child. Every segment but
    /// the last must resolve to a folder; a file in the middle of the path
    /// is a consistency error.
    pub async fn resolve(
        &self,
        root: &RemoteId,
        segments: &[String],
    ) -> Result<Resolution, SyncError> {
        let mut current = root.clone();
        let mut parent_id = root.clone();
        let mut node = None;

        for (depth, segment) in segments.iter().enumerate() {
            match self.gateway.find_child(&current, segment).await? {
                Some(found) => {
                    let is_last = depth + 1 == segments.len();
                    if !is_last && !found.is_folder() {
                        return Err(SyncError::Consistency(format!(
                            "remote path segment {segment:?} under {current} is a file"
                        )));
                    }
                    parent_id = std::mem::replace(&mut current, found.id.clone());
                    node = Some(found);
                }
                None => {
                    debug!(segment, depth, parent = %current, "Path segment missing");
                    return Ok(Resolution {
                        resolved_id: current,
                        resolved_depth: depth,
                        fully_existed: false,
                        node,
                        parent_id,
                    });
                }
            }
        }

        Ok(Resolution {
            resolved_id: current,
            resolved_depth: segments.len(),
            fully_existed: true,
            node,
            parent_id,
        })
    }

    /// Creates each segment as an empty folder, chaining parent ids, and
    /// returns the id of the last one (`parent` itself when `segments` is empty)
    pub async fn create_missing(
        &self,
        parent: &RemoteId,
        segments: &[String],
    ) -> Result<RemoteId, SyncError> {
        let mut current = parent.clone();
        for segment in segments {
            let created = self.gateway.create_folder(&current, segment).await?;
            info!(name = %segment, parent = %current, id = %created.id, "Created folder");
            current = created.id;
        }
        Ok(current)
    }
}
