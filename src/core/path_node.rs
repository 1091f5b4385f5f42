//! Path trees (spec §3 "Path node", §4.C4 path profile aggregator).
//!
//! Grounded on the call/return bookkeeping sketched in
//! `original_source/propeller/bb_handle.h`'s `CallRetInfo` and the
//! `binary_address_mapper.h` path-extraction contract, adapted from a
//! single-call/single-return-site struct into per-predecessor
//! `call_freqs`/`return_to_freqs` maps on [`PathPredInfoEntry`] — a path
//! node's predecessor can be a call or return site on more than one
//! traced run, so a frequency map fits the aggregated tree better than
//! one `Option` pair would. The tree itself follows spec §3 exactly
//! (per-function path tree, root at path length 2).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Index of a path node within a per-function path tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PathNodeId(pub usize);

/// Profile data attached to one path predecessor of a path node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathPredInfoEntry {
    pub freq: u64,
    pub cache_pressure: f64,
    /// Keyed by callee bb index within the function.
    pub call_freqs: HashMap<u32, u64>,
    /// Keyed by the flat bb index execution returns to.
    pub return_to_freqs: HashMap<u32, u64>,
}

/// A vertex of a per-function path tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathNode {
    pub bb_index: u32,
    /// Path-predecessor bb index -> profile info for that predecessor.
    pub preds: HashMap<u32, PathPredInfoEntry>,
    /// The "missing predecessor" case: this bb was reached without a
    /// recorded predecessor in the path trace.
    pub missing_pred: PathPredInfoEntry,
    pub parent: Option<PathNodeId>,
    /// Children keyed by the bb index extending the path.
    pub children: HashMap<u32, PathNodeId>,
    /// Number of bbs from the root including the predecessor; the root
    /// itself has path length 2.
    pub path_length: u32,
}

impl PathNode {
    pub fn root(bb_index: u32) -> Self {
        PathNode {
            bb_index,
            preds: HashMap::new(),
            missing_pred: PathPredInfoEntry::default(),
            parent: None,
            children: HashMap::new(),
            path_length: 2,
        }
    }

    pub fn child(bb_index: u32, parent: PathNodeId, parent_path_length: u32) -> Self {
        PathNode {
            bb_index,
            preds: HashMap::new(),
            missing_pred: PathPredInfoEntry::default(),
            parent: Some(parent),
            children: HashMap::new(),
            path_length: parent_path_length + 1,
        }
    }
}

/// A per-function path tree: an arena of `PathNode`s rooted at index 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathTree {
    pub nodes: Vec<PathNode>,
}

impl PathTree {
    pub fn new_rooted_at(bb_index: u32) -> Self {
        PathTree {
            nodes: vec![PathNode::root(bb_index)],
        }
    }

    pub fn root_id(&self) -> PathNodeId {
        PathNodeId(0)
    }

    pub fn node(&self, id: PathNodeId) -> &PathNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: PathNodeId) -> &mut PathNode {
        &mut self.nodes[id.0]
    }

    /// Finds or creates the child of `parent` for `bb_index`.
    pub fn child_or_insert(&mut self, parent: PathNodeId, bb_index: u32) -> PathNodeId {
        if let Some(existing) = self.nodes[parent.0].children.get(&bb_index) {
            return *existing;
        }
        let parent_path_length = self.nodes[parent.0].path_length;
        self.nodes
            .push(PathNode::child(bb_index, parent, parent_path_length));
        let id = PathNodeId(self.nodes.len() - 1);
        self.nodes[parent.0].children.insert(bb_index, id);
        id
    }
}
