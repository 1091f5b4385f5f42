//! Chain clusters (spec §3 "Cluster", §4.C6 C³ chain clustering).
//!
//! Grounded on `original_source/lld/ELF/PropellerBBReordering.h`'s
//! `ChainClustering::Cluster`.

use serde::{Deserialize, Serialize};

use crate::core::chain::ChainId;

/// Index of a cluster within the clustering pass's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub usize);

/// An unordered group of chains laid out consecutively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub chains: Vec<ChainId>,
    /// Stable identity: the chain this cluster was seeded from.
    pub delegate: ChainId,
    pub size: u64,
    pub weight: u64,
}

impl Cluster {
    pub fn seed(delegate: ChainId, size: u64, weight: u64) -> Self {
        Cluster {
            chains: vec![delegate],
            delegate,
            size,
            weight,
        }
    }

    /// `weight / max(size, 1)` in bytes.
    pub fn density(&self) -> f64 {
        self.weight as f64 / self.size.max(1) as f64
    }

    /// Merges `other` (`K`) into `self` (`P`), appending so `other`'s
    /// chains follow `self`'s in layout order (spec §4.C6 "Merge loop"
    /// step 3: `P.chains <- P.chains ++ K.chains`).
    pub fn merge_with(&mut self, mut other: Cluster) {
        self.chains.append(&mut other.chains);
        self.size += other.size;
        self.weight += other.weight;
    }
}
