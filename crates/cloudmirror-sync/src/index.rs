//! Remote child index
//!
//! A snapshot of every node below one remote folder, stored as an arena of
//! nodes with parent links and looked up by `(parent id, name)`. The index
//! is built before the diff pass mutates anything; creates made during the
//! pass are inserted so later lookups see them without another listing.
//!
//! Nodes are appended parent-first, so arena order is always a valid
//! deletion order for orphans.

use std::collections::HashMap;

use cloudmirror_core::domain::newtypes::RemoteId;
use cloudmirror_core::domain::node::RemoteNode;
use tracing::debug;

use crate::gateway::RemoteGateway;
use crate::SyncError;

/// One slot of the arena
#[derive(Debug, Clone)]
pub struct IndexedNode {
    pub node: RemoteNode,
    /// Id of the folder the node was listed or created under
    pub parent: RemoteId,
    /// Arena slot of the parent, `None` when the parent is the index root
    pub parent_slot: Option<usize>,
    processed: bool,
}

impl IndexedNode {
    pub fn is_processed(&self) -> bool {
        self.processed
    }
}

#[derive(Debug, Clone)]
pub struct RemoteChildIndex {
    root: RemoteId,
    nodes: Vec<IndexedNode>,
    by_key: HashMap<(RemoteId, String), usize>,
    by_id: HashMap<RemoteId, usize>,
}

impl RemoteChildIndex {
    /// An index with no nodes, for folders known to be empty
    pub fn empty(root: RemoteId) -> Self {
        Self {
            root,
            nodes: Vec::new(),
            by_key: HashMap::new(),
            by_id: HashMap::new(),
        }
    }

    /// Lists every descendant of `root`, descending into folder children only
    pub async fn build(gateway: &RemoteGateway<'_>, root: &RemoteId) -> Result<Self, SyncError> {
        let mut index = Self::empty(root.clone());
        let mut pending = vec![root.clone()];

        while let Some(folder) = pending.pop() {
            for child in gateway.list_children(&folder).await? {
                if child.is_folder() {
                    pending.push(child.id.clone());
                }
                index.insert(&folder, child);
            }
        }

        debug!(root = %root, nodes = index.len(), "Built remote child index");
        Ok(index)
    }

    pub fn root(&self) -> &RemoteId {
        &self.root
    }

    /// Adds a node under `parent` and returns its slot
    ///
    /// If another node already has the same name under `parent`, the key
    /// now points at the new node; the old one stays in the arena and is
    /// pruned as an orphan unless something marks it processed.
    pub fn insert(&mut self, parent: &RemoteId, node: RemoteNode) -> usize {
        let slot = self.nodes.len();
        let parent_slot = self.by_id.get(parent).copied();
        self.by_key.insert((parent.clone(), node.name.clone()), slot);
        self.by_id.insert(node.id.clone(), slot);
        self.nodes.push(IndexedNode {
            node,
            parent: parent.clone(),
            parent_slot,
            processed: false,
        });
        slot
    }

    /// Adds a node created during the pass, already marked processed
    pub fn insert_processed(&mut self, parent: &RemoteId, node: RemoteNode) -> usize {
        let slot = self.insert(parent, node);
        self.nodes[slot].processed = true;
        slot
    }

    pub fn get(&self, parent: &RemoteId, name: &str) -> Option<&RemoteNode> {
        self.slot_of(parent, name).map(|slot| &self.nodes[slot].node)
    }

    fn slot_of(&self, parent: &RemoteId, name: &str) -> Option<usize> {
        self.by_key.get(&(parent.clone(), name.to_string())).copied()
    }

    /// Marks the node at `(parent, name)` as matched by a local entry
    pub fn mark_processed(&mut self, parent: &RemoteId, name: &str) -> bool {
        match self.slot_of(parent, name) {
            Some(slot) => {
                self.nodes[slot].processed = true;
                true
            }
            None => false,
        }
    }

    /// Marks the node at `(parent, name)` and all of its indexed descendants
    /// as processed, returning how many nodes were marked
    pub fn mark_subtree_processed(&mut self, parent: &RemoteId, name: &str) -> usize {
        let Some(top) = self.slot_of(parent, name) else {
            return 0;
        };

        // Descendants always come after their ancestors in the arena.
        let mut in_subtree = vec![false; self.nodes.len()];
        in_subtree[top] = true;
        let mut marked = 0;
        for slot in top..self.nodes.len() {
            let inside = slot == top
                || self.nodes[slot]
                    .parent_slot
                    .is_some_and(|parent_slot| in_subtree[parent_slot]);
            if inside {
                in_subtree[slot] = true;
                self.nodes[slot].processed = true;
                marked += 1;
            }
        }
        marked
    }

    /// Nodes never matched during the pass, in parent-first order
    pub fn orphans(&self) -> impl Iterator<Item = (usize, &IndexedNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.processed)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
