//! C4 — Path Profile Aggregator (spec §2 "extract intra-function branch
//! paths from LBR-like traces; feed a path-cloning analyzer", §3 "Path
//! node").
//!
//! Grounded on the call/return bookkeeping in
//! `original_source/propeller/bb_handle.h`'s `CallRetInfo` and the
//! path-extraction contract sketched in `binary_address_mapper.h` (see
//! `core::path_node` for how that bookkeeping is represented here). The
//! upstream path-cloning analyzer that
//! *consumes* these trees is not specified in spec.md beyond "feed a
//! path-cloning analyzer" (see DESIGN.md); this module implements the
//! extraction and tree-building side only, which is the part spec §3
//! gives a concrete data model for.
//!
//! Each per-function [`PathTree`] is rooted at the function's entry bb
//! and grows one level per additional bb visited along a trace, up to
//! [`MAX_PATH_LENGTH`]. A path node's `preds` map records, per
//! *immediate* predecessor bb, how often execution reached this node
//! from that predecessor (`freq`), plus call/return bookkeeping for
//! branches that were calls or returns.

use std::collections::HashMap;

use crate::address_mapper::{AddressMapper, Direction};
use crate::core::bb_handle::BbHandle;
use crate::core::path_node::{PathNodeId, PathTree};

/// A trace's longest path depth before a new branch stops extending the
/// current path node and instead restarts accumulation at its parent.
/// Upstream bounds path length to avoid unbounded tree growth on long
/// traces; we pick a conservative default matching the cloning
/// analyzer's typical working set (a handful of calling contexts).
pub const MAX_PATH_LENGTH: u32 = 8;

/// One taken branch as recorded in an LBR-like hardware trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LbrBranch {
    pub from_address: u64,
    pub to_address: u64,
}

/// One full LBR sample: a chronological (oldest-first) sequence of taken
/// branches.
pub type LbrTrace = Vec<LbrBranch>;

/// Builds per-function path trees from a set of LBR traces.
pub struct PathProfileAggregator<'a> {
    mapper: &'a AddressMapper,
}

impl<'a> PathProfileAggregator<'a> {
    pub fn new(mapper: &'a AddressMapper) -> Self {
        PathProfileAggregator { mapper }
    }

    /// Aggregates every trace, returning one [`PathTree`] per function
    /// index that had at least one resolvable intra-function run.
    pub fn aggregate(&self, traces: &[LbrTrace]) -> HashMap<usize, PathTree> {
        let mut trees: HashMap<usize, PathTree> = HashMap::new();
        for trace in traces {
            self.aggregate_trace(trace, &mut trees);
        }
        trees
    }

    fn aggregate_trace(&self, trace: &LbrTrace, trees: &mut HashMap<usize, PathTree>) {
        let mut current_run: Vec<(BbHandle, bool, bool)> = Vec::new();

        let flush = |run: &mut Vec<(BbHandle, bool, bool)>, trees: &mut HashMap<usize, PathTree>| {
            if run.len() >= 2 {
                self.insert_run(run, trees);
            }
            run.clear();
        };

        for branch in trace {
            let Some(from_h) = self.mapper.find(branch.from_address, Direction::From) else {
                flush(&mut current_run, trees);
                continue;
            };
            let Some(to_h) = self.mapper.find(branch.to_address, Direction::To) else {
                flush(&mut current_run, trees);
                continue;
            };

            let same_function = current_run
                .last()
                .map(|(h, _, _)| h.function_index == from_h.function_index)
                .unwrap_or(true);
            if !same_function {
                flush(&mut current_run, trees);
            }
            if current_run.is_empty() {
                current_run.push((from_h, false, false));
            }

            let is_call = self.mapper.is_call(&to_h, branch.to_address);
            let is_return = self.mapper.is_return(Some(&from_h), &to_h, branch.to_address);

            if to_h.function_index != from_h.function_index {
                // A call or return crossing functions: record it against
                // the current run's last node, then stop this run (the
                // callee/caller's own blocks are a different function's
                // tree).
                if let Some(last) = current_run.last_mut() {
                    last.1 = last.1 || is_call;
                    last.2 = last.2 || is_return;
                }
                flush(&mut current_run, trees);
                continue;
            }

            current_run.push((to_h, is_call, is_return));
            if current_run.len() as u32 > MAX_PATH_LENGTH {
                flush(&mut current_run, trees);
            }
        }
        flush(&mut current_run, trees);
    }

    /// Inserts one intra-function run of bb handles into that function's
    /// tree, extending the chain one path node per visited bb.
    fn insert_run(&self, run: &[(BbHandle, bool, bool)], trees: &mut HashMap<usize, PathTree>) {
        let function_index = run[0].0.function_index;
        let tree = trees
            .entry(function_index)
            .or_insert_with(|| PathTree::new_rooted_at(run[0].0.bb_index as u32));

        let mut node_id = tree.root_id();
        let mut prev_bb_index: Option<u32> = None;

        for &(handle, is_call, is_return) in &run[1..] {
            let bb_index = handle.bb_index as u32;
            let entry = match prev_bb_index {
                Some(pred) => tree.node_mut(node_id).preds.entry(pred).or_default(),
                None => &mut tree.node_mut(node_id).missing_pred,
            };
            entry.freq += 1;
            // Deeper contexts place more pressure on the i-cache working
            // set; a coarse proxy tracked per spec §3's `cache_pressure`
            // field, refined by whichever cloning heuristic consumes it.
            entry.cache_pressure += tree.node(node_id).path_length as f64;
            if is_call {
                *entry.call_freqs.entry(bb_index).or_insert(0) += 1;
            }
            if is_return {
                *entry.return_to_freqs.entry(bb_index).or_insert(0) += 1;
            }

            prev_bb_index = Some(bb_index);
            node_id = tree.child_or_insert(node_id, bb_index);
        }
    }
}

/// Looks up the path node reached after following `bb_sequence` from the
/// tree's root, if the tree was ever extended that far.
pub fn lookup_path(tree: &PathTree, bb_sequence: &[u32]) -> Option<PathNodeId> {
    let mut id = tree.root_id();
    for &bb in bb_sequence {
        id = *tree.node(id).children.get(&bb)?;
    }
    Some(id)
}
