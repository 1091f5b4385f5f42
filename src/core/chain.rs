//! Node chains (spec §3 "Node chain", §4.C5 ExtTSP node-chain builder).
//!
//! Grounded on `original_source/lld/ELF/PropellerBBReordering.h`'s
//! `NodeChain`, adapted to the arena/index model of [`crate::core::cfg`]:
//! a chain holds an ordered list of `GlobalNodeId`s (nodes may come from
//! different functions after inter-procedural splitting) rather than raw
//! `CFGNode*`.

use serde::{Deserialize, Serialize};

use crate::core::cfg::GlobalNodeId;

/// Index of a chain within the chain-builder's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChainId(pub usize);

/// An ordered sequence of basic blocks to be laid out contiguously.
///
/// Invariants (enforced by `chain_builder`, not by this type): nodes
/// appear at increasing chain offsets (prefix sums of their sizes); a
/// node belongs to exactly one chain at a time; the chain's first node is
/// the entry of its function iff the delegate is an entry node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeChain {
    /// The lowest-address member, used as the chain's stable identity.
    pub delegate: GlobalNodeId,
    pub nodes: Vec<GlobalNodeId>,
    pub size: u64,
    pub freq: u64,
    /// Sum of ExtTSP per-edge scores for edges whose both endpoints are
    /// in this chain.
    pub score: f64,
    /// `function_transitions[i]` is set when `nodes[i]` begins a
    /// different function than `nodes[i - 1]` (always set for `i == 0`).
    pub function_transitions: Vec<bool>,
}

impl NodeChain {
    /// A fresh single-node chain.
    pub fn single(node: GlobalNodeId, size: u64, freq: u64) -> Self {
        NodeChain {
            delegate: node,
            nodes: vec![node],
            size,
            freq,
            score: 0.0,
            function_transitions: vec![true],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn first(&self) -> Option<GlobalNodeId> {
        self.nodes.first().copied()
    }

    pub fn last(&self) -> Option<GlobalNodeId> {
        self.nodes.last().copied()
    }

    /// Execution density: `weight / max(size, 1)`.
    pub fn density(&self) -> f64 {
        self.freq as f64 / self.size.max(1) as f64
    }
}
