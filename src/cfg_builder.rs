//! C3 — CFG Builder (spec §4.C3).
//!
//! Grounded on `original_source/lld/ELF/PropellerCfg.cpp` /
//! `PropellerELFCfg.{h,cpp}`'s edge-creation and counter-mapping passes,
//! with the whole-program wiring that drives them taken from
//! `original_source/propeller/profile_computer.{h,cc}`, adapted to the
//! arena/index model of [`crate::core::cfg`].
//! Structural (relocation-derived) edges and profile-derived counters are
//! two independent inputs that both mutate the same `Cfg` arena, matching
//! upstream's separation between `CreateIntraFunctionEdges` and
//! `MapBranch`/`MapCallOut`/`MarkPath`.
//!
//! Parallelism follows spec §5: the per-object relocation scan (the only
//! embarrassingly parallel step) runs over a work pool via `rayon`;
//! publication into the shared CFG arena is guarded by a single mutex.

use std::collections::HashMap;
use std::sync::Mutex;

use rayon::prelude::*;

use crate::address_mapper::{AddressMapper, Direction};
use crate::core::bb_handle::BbHandle;
use crate::core::cfg::{Cfg, CfgEdge, CfgEdgeKind, CfgId, CfgNode, EdgeTarget, GlobalNodeId, NodeId};
use crate::elf::relocations::ResolvedRelocation;
use crate::profile::aggregator::BranchAggregation;
use crate::stats::PropellerStats;

/// A function's whole-program CFG collection: one `Cfg` per selected
/// function, addressed by `CfgId`, plus the function-index <-> CfgId
/// mapping needed to resolve inter-function edges.
pub struct ProgramCfgs {
    pub cfgs: Vec<Cfg>,
    pub function_index_of: Vec<usize>,
    pub cfg_id_of_function: HashMap<usize, CfgId>,
}

impl ProgramCfgs {
    pub fn cfg(&self, id: CfgId) -> &Cfg {
        &self.cfgs[id.0]
    }

    pub fn cfg_mut(&mut self, id: CfgId) -> &mut Cfg {
        &mut self.cfgs[id.0]
    }
}

/// Everything the builder needs beyond the address mapper: per-function
/// size/section (from the symbol table, not the bb map, since spec §4.C3
/// "Initial fallthrough inference" rebalances the entry's size against
/// the *function's* declared size), the per-object relocation streams
/// (spec §5's parallel map input), and the aggregated branch/fallthrough
/// counters (spec §4.C2's output).
pub struct CfgBuilderInput<'a> {
    pub mapper: &'a AddressMapper,
    pub function_sizes: &'a HashMap<usize, u64>,
    pub function_sections: &'a HashMap<usize, usize>,
    pub relocations_by_object: &'a [Vec<ResolvedRelocation>],
    pub aggregation: &'a BranchAggregation,
}

#[derive(Debug, Clone, Copy)]
enum EdgeOp {
    Intra {
        cfg_id: CfgId,
        src: NodeId,
        sink: NodeId,
    },
    SelfCall {
        cfg_id: CfgId,
        src: NodeId,
    },
}

/// Runs the full C3 pipeline: shell construction, parallel structural
/// edge creation, recursive-self-return synthesis, fallthrough
/// inference, entry-size rebalancing, counter application, and node
/// frequency computation.
pub fn build(input: CfgBuilderInput<'_>, stats: &mut PropellerStats) -> ProgramCfgs {
    let mapper = input.mapper;

    let (cfgs, function_index_of, cfg_id_of_function, node_of_handle) =
        build_shells(mapper, input.function_sizes, input.function_sections);

    let cfgs = apply_structural_edges(
        cfgs,
        mapper,
        input.relocations_by_object,
        &cfg_id_of_function,
        &node_of_handle,
    );

    let mut cfgs = cfgs;
    for cfg in cfgs.iter_mut() {
        add_recursive_self_returns(cfg);
        infer_fallthrough(cfg, mapper);
        rebalance_entry_size(cfg);
    }

    apply_counters(
        &mut cfgs,
        mapper,
        &cfg_id_of_function,
        &node_of_handle,
        input.aggregation,
        stats,
    );

    let inbound_call_weight = inter_function_call_in_weights(&cfgs);
    for (idx, cfg) in cfgs.iter_mut().enumerate() {
        compute_frequencies(cfg, CfgId(idx), &inbound_call_weight);
    }

    ProgramCfgs {
        cfgs,
        function_index_of,
        cfg_id_of_function,
    }
}

type NodeIndex = HashMap<BbHandle, (CfgId, NodeId)>;

fn build_shells(
    mapper: &AddressMapper,
    function_sizes: &HashMap<usize, u64>,
    function_sections: &HashMap<usize, usize>,
) -> (Vec<Cfg>, Vec<usize>, HashMap<usize, CfgId>, NodeIndex) {
    let mut cfgs = Vec::new();
    let mut function_index_of = Vec::new();
    let mut cfg_id_of_function = HashMap::new();
    let mut node_of_handle = HashMap::new();

    for &fidx in &mapper.selected_functions {
        let size = *function_sizes.get(&fidx).unwrap_or(&0);
        let section = *function_sections.get(&fidx).unwrap_or(&0);
        let name = mapper
            .function_info
            .get(&fidx)
            .and_then(|info| info.aliases.first().cloned())
            .unwrap_or_else(|| format!("fn_{fidx}"));

        let mut cfg = Cfg::new(name, section, size);
        let handles: Vec<BbHandle> = mapper
            .bb_handles
            .iter()
            .filter(|h| h.function_index == fidx)
            .copied()
            .collect();

        for (i, h) in handles.iter().enumerate() {
            // Spec §4.C3 "Initial fallthrough inference": the entry is
            // initially assigned the whole function's size; rebalanced
            // later against the other nodes' bb-map sizes.
            let node_size = if i == 0 { size } else { mapper.size(h) };
            let node = CfgNode {
                bb_handle: *h,
                freq: 0,
                section_index: section,
                size: node_size,
                outs: Vec::new(),
                ins: Vec::new(),
                call_outs: Vec::new(),
                call_ins: Vec::new(),
                ft_edge: None,
            };
            let node_id = cfg.push_node(node);
            let cfg_id = CfgId(cfgs.len());
            node_of_handle.insert(*h, (cfg_id, node_id));
        }

        let cfg_id = CfgId(cfgs.len());
        cfg_id_of_function.insert(fidx, cfg_id);
        function_index_of.push(fidx);
        cfgs.push(cfg);
    }

    (cfgs, function_index_of, cfg_id_of_function, node_of_handle)
}

/// Spec §4.C3 "Edge creation": scans relocations in each bb section (one
/// object per `rayon` work item); every relocation targeting another bb
/// of the *same* function becomes an intra-func edge, or an
/// intra-recursive-self-call edge if the target is the function's entry.
/// Cross-function relocations are left to counter application
/// (`map_call_out`), matching upstream's split between structural and
/// profile-driven edge creation.
fn apply_structural_edges(
    cfgs: Vec<Cfg>,
    mapper: &AddressMapper,
    relocations_by_object: &[Vec<ResolvedRelocation>],
    cfg_id_of_function: &HashMap<usize, CfgId>,
    node_of_handle: &NodeIndex,
) -> Vec<Cfg> {
    let cfgs_mutex = Mutex::new(cfgs);

    relocations_by_object.par_iter().for_each(|relocs| {
        let ops = compute_edge_ops(mapper, relocs, cfg_id_of_function, node_of_handle);
        if ops.is_empty() {
            return;
        }
        let mut guard = cfgs_mutex.lock().expect("cfg arena mutex poisoned");
        for op in ops {
            apply_edge_op(&mut guard, op);
        }
    });

    cfgs_mutex.into_inner().expect("cfg arena mutex poisoned")
}

fn compute_edge_ops(
    mapper: &AddressMapper,
    relocs: &[ResolvedRelocation],
    cfg_id_of_function: &HashMap<usize, CfgId>,
    node_of_handle: &NodeIndex,
) -> Vec<EdgeOp> {
    let mut ops = Vec::new();
    for r in relocs {
        let Some(from_h) = mapper.find(r.from_address, Direction::From) else {
            continue;
        };
        let Some(to_h) = mapper.find(r.to_address, Direction::To) else {
            continue;
        };
        if from_h.function_index != to_h.function_index {
            continue;
        }
        let Some(&cfg_id) = cfg_id_of_function.get(&from_h.function_index) else {
            continue;
        };
        let Some(&(_, src)) = node_of_handle.get(&from_h) else {
            continue;
        };
        let Some(&(_, sink)) = node_of_handle.get(&to_h) else {
            continue;
        };
        if mapper.is_call(&to_h, r.to_address) {
            ops.push(EdgeOp::SelfCall { cfg_id, src });
        } else {
            ops.push(EdgeOp::Intra { cfg_id, src, sink });
        }
    }
    ops
}

fn apply_edge_op(cfgs: &mut [Cfg], op: EdgeOp) {
    match op {
        EdgeOp::Intra { cfg_id, src, sink } => {
            let cfg = &mut cfgs[cfg_id.0];
            if has_local_out(cfg, src, sink, CfgEdgeKind::IntraFunc) {
                return;
            }
            cfg.push_edge(CfgEdge {
                src,
                target: EdgeTarget::Local(sink),
                weight: 0,
                kind: CfgEdgeKind::IntraFunc,
            });
        }
        EdgeOp::SelfCall { cfg_id, src } => {
            let cfg = &mut cfgs[cfg_id.0];
            let entry = cfg.entry_node_id();
            if has_local_out(cfg, src, entry, CfgEdgeKind::IntraRecursiveSelfCall) {
                return;
            }
            cfg.push_edge(CfgEdge {
                src,
                target: EdgeTarget::Local(entry),
                weight: 0,
                kind: CfgEdgeKind::IntraRecursiveSelfCall,
            });
        }
    }
}

fn has_local_out(cfg: &Cfg, src: NodeId, sink: NodeId, kind: CfgEdgeKind) -> bool {
    let outs = if kind.is_call() {
        &cfg.node(src).call_outs
    } else {
        &cfg.node(src).outs
    };
    outs.iter().any(|&e| {
        let edge = cfg.edge(e);
        edge.kind == kind && matches!(edge.target, EdgeTarget::Local(n) if n == sink)
    })
}

/// Spec §4.C3: "for every recursive-self-call edge `r`, add an
/// intra-recursive-self-return edge from every exit node (a node with
/// zero outs, or whose sole out is a recursive-self-call) to `r.src`."
fn add_recursive_self_returns(cfg: &mut Cfg) {
    let rsc_sources: Vec<NodeId> = cfg
        .edges
        .iter()
        .filter(|e| e.kind == CfgEdgeKind::IntraRecursiveSelfCall)
        .map(|e| e.src)
        .collect();
    if rsc_sources.is_empty() {
        return;
    }

    let exits: Vec<NodeId> = (0..cfg.nodes.len())
        .map(NodeId)
        .filter(|&id| {
            let node = cfg.node(id);
            node.outs.is_empty()
                || (node.outs.len() == 1
                    && cfg.edge(node.outs[0]).kind == CfgEdgeKind::IntraRecursiveSelfCall)
        })
        .collect();

    for r_src in rsc_sources {
        for &exit in &exits {
            if exit == r_src {
                continue;
            }
            if has_local_out(cfg, exit, r_src, CfgEdgeKind::IntraRecursiveSelfReturn) {
                continue;
            }
            cfg.push_edge(CfgEdge {
                src: exit,
                target: EdgeTarget::Local(r_src),
                weight: 0,
                kind: CfgEdgeKind::IntraRecursiveSelfReturn,
            });
        }
    }
}

/// Spec §4.C3 "Initial fallthrough inference".
fn infer_fallthrough(cfg: &mut Cfg, _mapper: &AddressMapper) {
    for i in 0..cfg.nodes.len().saturating_sub(1) {
        let p = NodeId(i);
        let q = NodeId(i + 1);
        let existing = cfg
            .node(p)
            .outs
            .iter()
            .copied()
            .find(|&e| matches!(cfg.edge(e).target, EdgeTarget::Local(n) if n == q));
        if let Some(e) = existing {
            cfg.node_mut(p).ft_edge = Some(e);
        } else if cfg.node(p).size == 0 {
            let e = cfg.push_edge(CfgEdge {
                src: p,
                target: EdgeTarget::Local(q),
                weight: 0,
                kind: CfgEdgeKind::IntraFunc,
            });
            cfg.node_mut(p).ft_edge = Some(e);
        }
    }
}

/// Spec §4.C3: re-derives the entry's size once every other node's size
/// is known, since the entry was initially assigned the whole function.
fn rebalance_entry_size(cfg: &mut Cfg) {
    if cfg.nodes.is_empty() {
        return;
    }
    let others: u64 = cfg.nodes[1..].iter().map(|n| n.size).sum();
    cfg.nodes[0].size = cfg.size.saturating_sub(others);
}

/// Spec §4.C3 "Counter application": applies `branch_counters` via
/// `map_branch`/`map_call_out`, and `fallthrough_counters` via
/// `mark_path`.
fn apply_counters(
    cfgs: &mut [Cfg],
    mapper: &AddressMapper,
    cfg_id_of_function: &HashMap<usize, CfgId>,
    node_of_handle: &NodeIndex,
    aggregation: &BranchAggregation,
    stats: &mut PropellerStats,
) {
    for (&(from_addr, to_addr), &count) in &aggregation.branch_counters {
        if count == 0 {
            continue;
        }
        let Some(from_h) = mapper.find(from_addr, Direction::From) else {
            stats.profiles_skipped += 1;
            continue;
        };
        let Some(to_h) = mapper.find(to_addr, Direction::To) else {
            stats.profiles_skipped += 1;
            continue;
        };
        let Some(&(src_cfg, src_node)) = node_of_handle.get(&from_h) else {
            stats.profiles_skipped += 1;
            continue;
        };

        let is_call = mapper.is_call(&to_h, to_addr);
        let is_return = mapper.is_return(Some(&from_h), &to_h, to_addr);

        if from_h.function_index == to_h.function_index {
            let Some(&(_, to_node)) = node_of_handle.get(&to_h) else {
                stats.profiles_skipped += 1;
                continue;
            };
            map_branch(&mut cfgs[src_cfg.0], src_node, to_node, count, is_call, is_return);
            stats.profiles_applied += 1;
        } else {
            let Some(&dst_cfg) = cfg_id_of_function.get(&to_h.function_index) else {
                // Callee not selected; nothing to attach the edge to.
                stats.profiles_skipped += 1;
                continue;
            };
            let Some(&(_, dst_node)) = node_of_handle.get(&to_h) else {
                stats.profiles_skipped += 1;
                continue;
            };
            map_call_out(
                cfgs,
                src_cfg,
                src_node,
                dst_cfg,
                dst_node,
                to_addr,
                count,
                is_call,
                is_return,
                mapper,
            );
            stats.profiles_applied += 1;
        }
    }

    for (&(from_addr, to_addr), &count) in &aggregation.fallthrough_counters {
        if count == 0 {
            continue;
        }
        let Some(from_h) = mapper.find(from_addr, Direction::From) else {
            stats.profiles_skipped += 1;
            continue;
        };
        let Some(to_h) = mapper.find(to_addr, Direction::To) else {
            stats.profiles_skipped += 1;
            continue;
        };
        if from_h.function_index != to_h.function_index {
            stats.profiles_skipped += 1;
            continue;
        }
        if to_h.bb_index >= from_h.bb_index && to_h.bb_index - from_h.bb_index >= 200 {
            stats.warn(format!(
                "fallthrough {from_addr:#x}->{to_addr:#x} spans >=200 blocks"
            ));
        }
        if !mapper.can_fall_through(&from_h, &to_h) {
            stats.dropped_fallthroughs += 1;
            stats.warn(format!(
                "fallthrough {from_addr:#x}->{to_addr:#x} infeasible: not every intermediate block can fall through"
            ));
            continue;
        }
        let Some(&(cfg_id, from_node)) = node_of_handle.get(&from_h) else {
            stats.profiles_skipped += 1;
            continue;
        };
        let Some(&(_, to_node)) = node_of_handle.get(&to_h) else {
            stats.profiles_skipped += 1;
            continue;
        };
        if mark_path(&mut cfgs[cfg_id.0], from_node, to_node, count).is_err() {
            stats.dropped_fallthroughs += 1;
            stats.warn(format!(
                "fallthrough {from_addr:#x}->{to_addr:#x} walk did not reach target"
            ));
        } else {
            stats.profiles_applied += 1;
        }
    }
}

/// Spec §4.C3 `map_branch`: same-function counter application.
fn map_branch(cfg: &mut Cfg, from: NodeId, to: NodeId, cnt: u64, is_call: bool, is_return: bool) {
    let accepts = |kind: CfgEdgeKind| -> bool {
        if is_call {
            kind == CfgEdgeKind::IntraRecursiveSelfCall
        } else if is_return {
            kind == CfgEdgeKind::IntraRecursiveSelfReturn
        } else {
            matches!(kind, CfgEdgeKind::IntraFunc | CfgEdgeKind::IntraDynamic)
        }
    };

    let candidates: &[EdgeId] = if is_call {
        &cfg.node(from).call_outs
    } else {
        &cfg.node(from).outs
    };
    let existing = candidates.iter().copied().find(|&e| {
        let edge = cfg.edge(e);
        accepts(edge.kind) && matches!(edge.target, EdgeTarget::Local(n) if n == to)
    });

    if let Some(e) = existing {
        cfg.edge_mut(e).weight += cnt;
        return;
    }

    let kind = if is_call {
        CfgEdgeKind::IntraRecursiveSelfCall
    } else if is_return {
        CfgEdgeKind::IntraRecursiveSelfReturn
    } else {
        CfgEdgeKind::IntraDynamic
    };
    cfg.push_edge(CfgEdge {
        src: from,
        target: EdgeTarget::Local(to),
        weight: cnt,
        kind,
    });
}

/// Spec §4.C3 `map_call_out`: cross-function counter application.
#[allow(clippy::too_many_arguments)]
fn map_call_out(
    cfgs: &mut [Cfg],
    src_cfg: CfgId,
    from: NodeId,
    dst_cfg: CfgId,
    to: NodeId,
    to_addr: u64,
    cnt: u64,
    is_call: bool,
    // Kept for call-site symmetry with `map_branch`; spec §4.C3's
    // `map_call_out` classifies purely from `is_call` and the
    // callee-entry check, never from `is_return`.
    _is_return: bool,
    mapper: &AddressMapper,
) {
    let callee_entry_addr = {
        let callee = &cfgs[dst_cfg.0];
        callee.entry().bb_handle
    };
    let is_call_classified = is_call || (to == cfgs[dst_cfg.0].entry_node_id() && to_addr == mapper.address(&callee_entry_addr));
    let kind = if is_call_classified {
        CfgEdgeKind::InterFuncCall
    } else {
        CfgEdgeKind::InterFuncReturn
    };

    let cfg = &mut cfgs[src_cfg.0];
    let target = GlobalNodeId { cfg: dst_cfg, node: to };
    let candidates: &[EdgeId] = if kind == CfgEdgeKind::InterFuncCall {
        &cfg.node(from).call_outs
    } else {
        &cfg.node(from).outs
    };
    let existing = candidates.iter().copied().find(|&e| {
        let edge = cfg.edge(e);
        edge.kind == kind && matches!(edge.target, EdgeTarget::Remote(g) if g == target)
    });
    if let Some(e) = existing {
        cfg.edge_mut(e).weight += cnt;
    } else {
        cfg.push_edge(CfgEdge {
            src: from,
            target: EdgeTarget::Remote(target),
            weight: cnt,
            kind,
        });
    }
}

/// Spec §4.C3 `mark_path`: walks fallthrough edges from `from` forward,
/// adding `cnt` to each `ft_edge.weight` until reaching `to`. Returns
/// `Err` (no further mutation) if the walk runs out of fallthrough edges
/// before reaching `to`.
fn mark_path(cfg: &mut Cfg, from: NodeId, to: NodeId, cnt: u64) -> Result<(), ()> {
    if from == to {
        return Ok(());
    }
    let mut current = from;
    let bound = cfg.nodes.len() + 1;
    for _ in 0..bound {
        let Some(ft) = cfg.node(current).ft_edge else {
            return Err(());
        };
        let EdgeTarget::Local(sink) = cfg.edge(ft).target else {
            return Err(());
        };
        cfg.edge_mut(ft).weight += cnt;
        if sink == to {
            return Ok(());
        }
        current = sink;
    }
    Err(())
}

/// Inter-function call edges target a `Remote` sink (spec §3 "inter
/// kinds require [src.cfg != sink.cfg]"), so `Cfg::push_edge` never wires
/// them into the callee's own `call_ins` — the callee lives in a
/// different arena. This scans every CFG's `InterFuncCall` edges once
/// and accumulates their weight against the callee's `GlobalNodeId`, so
/// `compute_frequencies` can fold cross-function call weight into a
/// node (almost always the entry) the same way `Σ call_in_weights`
/// would if the callee's `call_ins` held them directly.
fn inter_function_call_in_weights(cfgs: &[Cfg]) -> HashMap<GlobalNodeId, u64> {
    let mut weights: HashMap<GlobalNodeId, u64> = HashMap::new();
    for cfg in cfgs {
        for node in &cfg.nodes {
            for &eid in &node.call_outs {
                let edge = cfg.edge(eid);
                if edge.kind != CfgEdgeKind::InterFuncCall {
                    continue;
                }
                if let EdgeTarget::Remote(target) = edge.target {
                    *weights.entry(target).or_insert(0) += edge.weight;
                }
            }
        }
    }
    weights
}

/// Spec §4.C3 "Node frequency": `freq = max(sum(outs), sum(ins),
/// sum(call_ins), max(call_outs))`, with the entry floored to 1 when any
/// node in the function is hot but the entry's computed frequency is 0.
/// `inbound_call_weight` supplies the cross-function contribution to
/// `Σ call_in_weights` that a node's own (intra-CFG) `call_ins` list
/// cannot hold; see [`inter_function_call_in_weights`].
fn compute_frequencies(cfg: &mut Cfg, cfg_id: CfgId, inbound_call_weight: &HashMap<GlobalNodeId, u64>) {
    let mut any_hot = false;
    for i in 0..cfg.nodes.len() {
        let id = NodeId(i);
        let remote_call_in = inbound_call_weight
            .get(&GlobalNodeId { cfg: cfg_id, node: id })
            .copied()
            .unwrap_or(0);
        let freq = cfg
            .out_weight_sum(id)
            .max(cfg.in_weight_sum(id))
            .max(cfg.call_in_weight_sum(id))
            .max(cfg.max_call_out_weight(id))
            .max(remote_call_in);
        cfg.node_mut(id).freq = freq;
        if freq > 0 {
            any_hot = true;
        }
    }
    if any_hot && !cfg.nodes.is_empty() && cfg.entry().freq == 0 {
        cfg.node_mut(cfg.entry_node_id()).freq = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_mapper::{AddressMapperInput, FunctionInfo};
    use crate::core::bb_addr_map::{BbEntry, BbMetadata, BbRange};
    use crate::core::bb_addr_map::BbAddrMapEntry;

    fn foo_map() -> BbAddrMapEntry {
        BbAddrMapEntry {
            function_address: 0x1000,
            ranges: vec![BbRange {
                base_address: 0x1000,
                entries: vec![
                    BbEntry {
                        id: 0,
                        offset: 0,
                        size: 8,
                        metadata: BbMetadata::CAN_FALL_THROUGH,
                    },
                    BbEntry {
                        id: 1,
                        offset: 8,
                        size: 4,
                        metadata: BbMetadata::empty(),
                    },
                ],
            }],
        }
    }

    fn build_mapper() -> (AddressMapper, PropellerStats) {
        let maps = vec![foo_map()];
        let info = vec![FunctionInfo {
            aliases: vec!["foo".to_string()],
            section_name: ".text".to_string(),
        }];
        let mut stats = PropellerStats::default();
        let mapper = AddressMapper::build(
            AddressMapperInput {
                maps: &maps,
                function_info: &info,
                hot_addresses: None,
                require_text_section: false,
            },
            &mut stats,
        );
        (mapper, stats)
    }

    #[test]
    fn trivial_fallthrough_scenario_1() {
        // spec §8 end-to-end scenario 1.
        let (mapper, mut stats) = build_mapper();
        let mut sizes = HashMap::new();
        sizes.insert(0, 12);
        let mut sections = HashMap::new();
        sections.insert(0, 1);
        let mut aggregation = BranchAggregation::default();
        aggregation.branch_counters.insert((0x1000, 0x1008), 7);

        let program = build(
            CfgBuilderInput {
                mapper: &mapper,
                function_sizes: &sizes,
                function_sections: &sections,
                relocations_by_object: &[],
                aggregation: &aggregation,
            },
            &mut stats,
        );

        assert_eq!(program.cfgs.len(), 1);
        let cfg = &program.cfgs[0];
        assert!(cfg.is_hot());
        assert!(cfg.entry().freq >= 7);
        let total_out_weight: u64 = cfg.node(NodeId(0)).outs.iter().map(|&e| cfg.edge(e).weight).sum();
        assert_eq!(total_out_weight, 7);
        // no fallthrough edge should have been synthesized (block 0 has
        // nonzero size and already has a weighted branch out).
        assert!(cfg.node(NodeId(0)).ft_edge.is_none() || cfg.edge(cfg.node(NodeId(0)).ft_edge.unwrap()).weight == 7);
    }

    #[test]
    fn mark_path_fails_without_mutating_past_the_break() {
        let (mapper, mut stats) = build_mapper();
        let mut sizes = HashMap::new();
        sizes.insert(0, 12);
        let mut sections = HashMap::new();
        sections.insert(0, 1);
        let aggregation = BranchAggregation::default();
        let mut program = build(
            CfgBuilderInput {
                mapper: &mapper,
                function_sizes: &sizes,
                function_sections: &sections,
                relocations_by_object: &[],
                aggregation: &aggregation,
            },
            &mut stats,
        );
        // block 1 has no outgoing fallthrough; walking past it must fail.
        let result = mark_path(&mut program.cfgs[0], NodeId(1), NodeId(0), 5);
        assert!(result.is_err());
    }
}
