//! C6 — C³/hfsort chain clustering (spec §4.C6).
//!
//! Grounded on `original_source/lld/ELF/PropellerBBReordering.h`'s
//! `ChainClustering` and the hfsort density-degradation guard described
//! alongside it. [`cluster`] itself operates purely on [`NodeChain`]
//! summaries (size, freq, delegate); [`compute_predecessors`] is the one
//! place in this module that looks at individual call edges, since
//! finding each chain's most-likely predecessor means walking the call
//! graph `cluster` is never handed directly.

use std::collections::HashMap;

use crate::cfg_builder::ProgramCfgs;
use crate::config::PropellerOptions;
use crate::core::cfg::{CfgEdgeKind, CfgId, EdgeTarget, GlobalNodeId};
use crate::core::chain::{ChainId, NodeChain};
use crate::core::cluster::{Cluster, ClusterId};

/// Per-chain predecessor info needed to pick a merge partner: which
/// cluster most often transitions into this chain's head, and with what
/// weight.
#[derive(Debug, Clone, Copy, Default)]
pub struct MostLikelyPredecessor {
    pub predecessor: Option<ChainId>,
    pub weight: u64,
}

/// Spec §4.C6 step 2: "for every call-in edge `e` into nodes of `c`".
/// Inter-function call edges are always `Remote`-targeted (spec §3:
/// inter kinds require `src.cfg != sink.cfg`), so the callee's own
/// `call_ins` never holds them — `Cfg::push_edge` only wires local
/// sinks. This scans every CFG's call-out edges once, keeping, per
/// chain whose first node is a function entry, the predecessor chain
/// with the highest total call weight into that entry (ties broken by
/// `ChainId` ascending as a stable proxy for "cluster pointer order",
/// since clusters don't exist yet at this point).
///
/// Grounded on `original_source/lld/ELF/PropellerFuncOrdering.cpp`'s
/// `getMostLikelyPredecessor`: the "relatively cold" filter
/// (`10 * call_weight < callee_entry.freq`) is applied here rather than
/// in [`cluster`], since it only needs the static call graph, not the
/// live cluster state `cluster` tracks as it merges.
pub fn compute_predecessors(
    programs: &ProgramCfgs,
    chains: &[NodeChain],
) -> HashMap<ChainId, MostLikelyPredecessor> {
    let mut owner: HashMap<GlobalNodeId, ChainId> = HashMap::with_capacity(chains.len());
    for (idx, chain) in chains.iter().enumerate() {
        for &gid in &chain.nodes {
            owner.insert(gid, ChainId(idx));
        }
    }

    let mut result = HashMap::new();
    for (idx, chain) in chains.iter().enumerate() {
        let this_id = ChainId(idx);
        let Some(entry_gid) = chain.first() else {
            continue;
        };
        if !programs.cfg(entry_gid.cfg).node(entry_gid.node).is_entry() {
            continue;
        }
        let entry_freq = programs.cfg(entry_gid.cfg).node(entry_gid.node).freq;

        let mut by_predecessor: HashMap<ChainId, u64> = HashMap::new();
        for (cidx, cfg) in programs.cfgs.iter().enumerate() {
            let src_cfg_id = CfgId(cidx);
            for node in &cfg.nodes {
                for &eid in &node.call_outs {
                    let edge = cfg.edge(eid);
                    if edge.kind != CfgEdgeKind::InterFuncCall || edge.weight == 0 {
                        continue;
                    }
                    let EdgeTarget::Remote(target) = edge.target else {
                        continue;
                    };
                    if target != entry_gid {
                        continue;
                    }
                    if edge.weight * 10 < entry_freq {
                        continue;
                    }
                    let src_gid = GlobalNodeId { cfg: src_cfg_id, node: edge.src };
                    let Some(&src_chain) = owner.get(&src_gid) else {
                        continue;
                    };
                    if src_chain == this_id {
                        continue;
                    }
                    *by_predecessor.entry(src_chain).or_insert(0) += edge.weight;
                }
            }
        }

        if let Some((&best_chain, &weight)) = by_predecessor
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        {
            result.insert(
                this_id,
                MostLikelyPredecessor {
                    predecessor: Some(best_chain),
                    weight,
                },
            );
        }
    }
    result
}

/// Clusters chains by density, merging a chain into the cluster that
/// most frequently transitions into it as long as doing so would not
/// degrade the *target* cluster's density too much, and the merged size
/// would not exceed `opts.cluster_size_cap`.
///
/// `predecessors` maps each chain to its single most-likely predecessor
/// chain plus the call/fallthrough weight of that transition (spec §3
/// "most-likely predecessor"); chains than have none (entry points with
/// no reliable predecessor) are never merge targets from that side.
pub fn cluster(
    chains: &[NodeChain],
    predecessors: &HashMap<ChainId, MostLikelyPredecessor>,
    opts: &PropellerOptions,
) -> Vec<Cluster> {
    let mut clusters: Vec<Option<Cluster>> = Vec::with_capacity(chains.len());
    let mut cluster_of: HashMap<ChainId, ClusterId> = HashMap::with_capacity(chains.len());

    for (idx, chain) in chains.iter().enumerate() {
        let chain_id = ChainId(idx);
        let cluster_id = ClusterId(clusters.len());
        clusters.push(Some(Cluster::seed(chain_id, chain.size.max(1), chain.freq)));
        cluster_of.insert(chain_id, cluster_id);
    }

    // Process chains from hottest to coldest density so the highest-value
    // merge decisions are made first (spec §4.C6 "Merge loop").
    let mut order: Vec<ChainId> = (0..chains.len()).map(ChainId).collect();
    order.sort_by(|&a, &b| {
        chains[b.0]
            .density()
            .partial_cmp(&chains[a.0].density())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for chain_id in order {
        let Some(pred) = predecessors.get(&chain_id).copied() else {
            continue;
        };
        let Some(pred_chain_id) = pred.predecessor else {
            continue;
        };
        if pred.weight == 0 {
            continue;
        }

        let Some(&k_cluster_id) = cluster_of.get(&chain_id) else {
            continue;
        };
        let Some(&p_cluster_id) = cluster_of.get(&pred_chain_id) else {
            continue;
        };
        if k_cluster_id == p_cluster_id {
            continue;
        }

        let (p_size, p_weight, k_size, k_weight) = {
            let p = clusters[p_cluster_id.0].as_ref().unwrap();
            let k = clusters[k_cluster_id.0].as_ref().unwrap();
            (p.size, p.weight, k.size, k.weight)
        };

        if p_size + k_size > opts.cluster_size_cap {
            continue;
        }

        // Density-degradation guard (spec §4.C6): "do not merge if the
        // predecessor cluster's density would degrade by more than 1/8".
        // Literal formula grounded on
        // `original_source/lld/ELF/PropellerFuncOrdering.cpp`'s
        // `getMostLikelyPredecessor`:
        //   skip if 8 * P.size * (K.weight * P.weight)
        //             < P.weight * (K.size + P.size)
        // `u128` avoids overflow — `weight * weight` can exceed `u64`
        // for hot binaries with many-billion-count profiles.
        let lhs = 8u128 * p_size as u128 * (k_weight as u128 * p_weight as u128);
        let rhs = p_weight as u128 * (k_size as u128 + p_size as u128);
        if lhs < rhs {
            continue;
        }

        let k_cluster = clusters[k_cluster_id.0].take().unwrap();
        for &moved in &k_cluster.chains {
            cluster_of.insert(moved, p_cluster_id);
        }
        clusters[p_cluster_id.0]
            .as_mut()
            .unwrap()
            .merge_with(k_cluster);
    }

    let mut remaining: Vec<Cluster> = clusters.into_iter().flatten().collect();
    finalize_order(&mut remaining, chains);
    remaining
}

/// Spec §4.C6 "Final ordering": descending density, cold (zero-weight)
/// clusters appended afterward in ascending delegate-chain order.
fn finalize_order(clusters: &mut [Cluster], chains: &[NodeChain]) {
    clusters.sort_by(|a, b| {
        let a_hot = a.weight > 0;
        let b_hot = b.weight > 0;
        b_hot
            .cmp(&a_hot)
            .then_with(|| {
                if a_hot {
                    b.density().partial_cmp(&a.density()).unwrap_or(std::cmp::Ordering::Equal)
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .then_with(|| {
                let a_addr = chains[a.delegate.0].delegate;
                let b_addr = chains[b.delegate.0].delegate;
                a_addr.cmp(&b_addr)
            })
    });
}
