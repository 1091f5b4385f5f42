//! C5 — Node-Chain Builder / ExtTSP (spec §4.C5).
//!
//! Grounded on `original_source/lld/ELF/PropellerBBReordering.h`'s
//! `NodeChainBuilder`/`NodeChainAssembly`, following the **newer**
//! interpretation spec §9 calls out: mutually-forced-edge cycles are
//! broken by removing the edge whose sink has the smallest address.
//!
//! Scoring deviation (documented per spec §9 "Implementers should
//! document any deviation"): instead of upstream's incremental
//! `X.score`/`Y.score` decomposition, [`chain_score`] recomputes a
//! chain's total ExtTSP score directly from its member nodes' edges each
//! time an assembly is evaluated. This is asymptotically worse than the
//! delta-based scheme but behaviorally identical (same merge decisions,
//! same final scores) and far simpler to get right without a profiler in
//! the loop; see DESIGN.md.

use std::collections::{HashMap, HashSet};

use crate::address_mapper::AddressMapper;
use crate::config::PropellerOptions;
use crate::core::cfg::{CfgEdgeKind, CfgId, EdgeTarget, GlobalNodeId, NodeId};
use crate::core::chain::{ChainId, NodeChain};
use crate::cfg_builder::ProgramCfgs;

/// Per-edge ExtTSP score (spec §4.C5 "Per-edge score"). `src_offset`/
/// `sink_offset` are byte offsets within the *assembled chain layout*,
/// not original virtual addresses.
fn edge_score(
    opts: &PropellerOptions,
    weight: u64,
    kind: CfgEdgeKind,
    src_offset: u64,
    src_size: u64,
    sink_offset: u64,
) -> f64 {
    if weight == 0 || kind.is_return() {
        return 0.0;
    }
    let forward = sink_offset >= src_offset;
    let mut d: f64 = if forward {
        (sink_offset as i128 - src_offset as i128 - src_size as i128) as f64
    } else {
        (src_offset as i128 - sink_offset as i128 + src_size as i128) as f64
    };
    if kind.is_call() {
        d += if forward {
            src_size as f64 / 2.0
        } else {
            -(src_size as f64) / 2.0
        };
    }
    if forward && d == 0.0 && matches!(kind, CfgEdgeKind::IntraFunc | CfgEdgeKind::IntraDynamic) {
        return weight as f64 * opts.fallthrough_weight;
    }
    let d = d.max(0.0);
    if forward {
        if d < opts.forward_jump_distance as f64 {
            weight as f64 * opts.forward_jump_weight * (1.0 - d / opts.forward_jump_distance as f64)
        } else {
            0.0
        }
    } else if d < opts.backward_jump_distance as f64 {
        weight as f64 * opts.backward_jump_weight * (1.0 - d / opts.backward_jump_distance as f64)
    } else {
        0.0
    }
}

fn node_size(programs: &ProgramCfgs, gid: GlobalNodeId) -> u64 {
    programs.cfg(gid.cfg).node(gid.node).size
}

fn node_freq(programs: &ProgramCfgs, gid: GlobalNodeId) -> u64 {
    programs.cfg(gid.cfg).node(gid.node).freq
}

fn is_entry_gid(programs: &ProgramCfgs, gid: GlobalNodeId) -> bool {
    programs.cfg(gid.cfg).node(gid.node).is_entry()
}

fn node_address(programs: &ProgramCfgs, mapper: &AddressMapper, gid: GlobalNodeId) -> u64 {
    mapper.address(&programs.cfg(gid.cfg).node(gid.node).bb_handle)
}

/// Total ExtTSP score of `nodes` laid out exactly in that order: sum of
/// [`edge_score`] over every edge whose source and sink both appear in
/// the slice (spec §3 "Node chain" `score` field).
fn chain_score(programs: &ProgramCfgs, opts: &PropellerOptions, nodes: &[GlobalNodeId]) -> f64 {
    let mut pos: HashMap<GlobalNodeId, (u64, u64)> = HashMap::with_capacity(nodes.len());
    let mut offset = 0u64;
    for &gid in nodes {
        let size = node_size(programs, gid);
        pos.insert(gid, (offset, size));
        offset += size;
    }

    let mut total = 0.0;
    for &gid in nodes {
        let cfg = programs.cfg(gid.cfg);
        let node = cfg.node(gid.node);
        let (src_offset, src_size) = pos[&gid];
        for &eid in node.outs.iter().chain(node.call_outs.iter()) {
            let edge = cfg.edge(eid);
            let target = match edge.target {
                EdgeTarget::Local(n) => GlobalNodeId { cfg: gid.cfg, node: n },
                EdgeTarget::Remote(g) => g,
            };
            if let Some(&(sink_offset, _)) = pos.get(&target) {
                total += edge_score(opts, edge.weight, edge.kind, src_offset, src_size, sink_offset);
            }
        }
    }
    total
}

fn finalize_chain(
    programs: &ProgramCfgs,
    mapper: &AddressMapper,
    opts: &PropellerOptions,
    nodes: Vec<GlobalNodeId>,
) -> NodeChain {
    let size: u64 = nodes.iter().map(|&g| node_size(programs, g)).sum();
    let freq: u64 = nodes.iter().map(|&g| node_freq(programs, g)).sum();
    let score = chain_score(programs, opts, &nodes);
    let delegate = *nodes
        .iter()
        .min_by_key(|&&g| node_address(programs, mapper, g))
        .expect("chain must have at least one node");
    let function_transitions = nodes
        .iter()
        .enumerate()
        .map(|(i, g)| i == 0 || g.cfg != nodes[i - 1].cfg)
        .collect();
    NodeChain {
        delegate,
        nodes,
        size,
        freq,
        score,
        function_transitions,
    }
}

/// Spec §4.C5 "Mutually-forced edges": collects every intra-function,
/// profiled (`weight > 0`) edge that is both the unique profiled out of
/// its source and the unique profiled in of its sink, then breaks any
/// cycles among them by dropping the edge whose sink has the smallest
/// address.
fn mutually_forced_edges(
    programs: &ProgramCfgs,
    mapper: &AddressMapper,
) -> HashMap<GlobalNodeId, GlobalNodeId> {
    let mut out_candidates: HashMap<GlobalNodeId, Vec<GlobalNodeId>> = HashMap::new();
    let mut in_count: HashMap<GlobalNodeId, u32> = HashMap::new();

    for (idx, cfg) in programs.cfgs.iter().enumerate() {
        let cfg_id = CfgId(idx);
        for e in &cfg.edges {
            if !e.kind.is_intra() || e.weight == 0 {
                continue;
            }
            let sink = match e.target {
                EdgeTarget::Local(n) => GlobalNodeId { cfg: cfg_id, node: n },
                EdgeTarget::Remote(g) => g,
            };
            *in_count.entry(sink).or_insert(0) += 1;
            let src = GlobalNodeId { cfg: cfg_id, node: e.src };
            out_candidates.entry(src).or_default().push(sink);
        }
    }

    let mut forced: HashMap<GlobalNodeId, GlobalNodeId> = HashMap::new();
    for (src, sinks) in out_candidates {
        if sinks.len() != 1 {
            continue;
        }
        let sink = sinks[0];
        if in_count.get(&sink).copied().unwrap_or(0) == 1 {
            forced.insert(src, sink);
        }
    }

    break_forced_cycles(&mut forced, programs, mapper);
    forced
}

fn break_forced_cycles(
    forced: &mut HashMap<GlobalNodeId, GlobalNodeId>,
    programs: &ProgramCfgs,
    mapper: &AddressMapper,
) {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum State {
        Unvisited,
        InProgress,
        Done,
    }
    let mut state: HashMap<GlobalNodeId, State> = HashMap::new();
    let starts: Vec<GlobalNodeId> = forced.keys().copied().collect();

    for start in starts {
        if !matches!(state.get(&start), None | Some(State::Unvisited)) {
            continue;
        }
        let mut path = Vec::new();
        let mut cur = start;
        let mut to_remove = None;
        loop {
            match state.get(&cur).copied().unwrap_or(State::Unvisited) {
                State::Unvisited => {
                    state.insert(cur, State::InProgress);
                    path.push(cur);
                    match forced.get(&cur) {
                        Some(&next) => cur = next,
                        None => break,
                    }
                }
                State::InProgress => {
                    let cycle_start = path.iter().position(|&n| n == cur).unwrap();
                    let cycle_nodes = &path[cycle_start..];
                    let mut min_addr = u64::MAX;
                    let mut min_src = cycle_nodes[0];
                    for &n in cycle_nodes {
                        if let Some(&sink) = forced.get(&n) {
                            let addr = node_address(programs, mapper, sink);
                            if addr < min_addr {
                                min_addr = addr;
                                min_src = n;
                            }
                        }
                    }
                    to_remove = Some(min_src);
                    break;
                }
                State::Done => break,
            }
        }
        if let Some(src) = to_remove {
            forced.remove(&src);
        }
        for n in path {
            state.insert(n, State::Done);
        }
    }
}

fn is_chain_hot(chain: &NodeChain) -> bool {
    chain.freq > 0
}

enum Ordering4 {
    BeginNext,
    X2X1Y,
    X1YX2,
    X2YX1,
    YX2X1,
}

fn assemble(x: &[GlobalNodeId], s: usize, y: &[GlobalNodeId], ordering: &Ordering4) -> Vec<GlobalNodeId> {
    match ordering {
        Ordering4::BeginNext => x.iter().chain(y.iter()).copied().collect(),
        Ordering4::X2X1Y => {
            let (x1, x2) = x.split_at(s);
            x2.iter().chain(x1.iter()).chain(y.iter()).copied().collect()
        }
        Ordering4::X1YX2 => {
            let (x1, x2) = x.split_at(s);
            x1.iter().chain(y.iter()).chain(x2.iter()).copied().collect()
        }
        Ordering4::X2YX1 => {
            let (x1, x2) = x.split_at(s);
            x2.iter().chain(y.iter()).chain(x1.iter()).copied().collect()
        }
        Ordering4::YX2X1 => {
            let (x1, x2) = x.split_at(s);
            y.iter().chain(x2.iter()).chain(x1.iter()).copied().collect()
        }
    }
}

fn assembly_valid(programs: &ProgramCfgs, merged: &[GlobalNodeId], x_first: GlobalNodeId, y_first: GlobalNodeId) -> bool {
    let first = merged[0];
    is_entry_gid(programs, first) || !(is_entry_gid(programs, x_first) || is_entry_gid(programs, y_first))
}

/// Spec §4.C5 "Assembly" / "Score of an assembly": evaluates every valid
/// ordering (with limited splitting of `x`) of merging `y` into `x`,
/// returning the highest-gain one if any has positive gain.
fn best_assembly(
    programs: &ProgramCfgs,
    opts: &PropellerOptions,
    forced_srcs: &HashSet<GlobalNodeId>,
    x: &NodeChain,
    y: &NodeChain,
) -> Option<(f64, Vec<GlobalNodeId>)> {
    let mut best: Option<(f64, Vec<GlobalNodeId>)> = None;
    let mut consider = |merged: Vec<GlobalNodeId>| {
        if !assembly_valid(programs, &merged, x.nodes[0], y.nodes[0]) {
            return;
        }
        let new_score = chain_score(programs, opts, &merged);
        let gain = new_score - (x.score + y.score);
        if gain > 0.0 && best.as_ref().map(|(g, _)| gain > *g).unwrap_or(true) {
            best = Some((gain, merged));
        }
    };

    consider(assemble(&x.nodes, 0, &y.nodes, &Ordering4::BeginNext));

    if x.size <= opts.chain_split_threshold && x.nodes.len() > 1 {
        for s in 1..x.nodes.len() {
            if forced_srcs.contains(&x.nodes[s - 1]) {
                continue;
            }
            for ordering in [Ordering4::X2X1Y, Ordering4::X1YX2, Ordering4::X2YX1, Ordering4::YX2X1] {
                consider(assemble(&x.nodes, s, &y.nodes, &ordering));
            }
        }
    }
    best
}

fn evaluate_pair(
    programs: &ProgramCfgs,
    opts: &PropellerOptions,
    forced_srcs: &HashSet<GlobalNodeId>,
    chains: &[Option<NodeChain>],
    a: ChainId,
    b: ChainId,
) -> Option<(f64, ChainId, ChainId, Vec<GlobalNodeId>)> {
    let ca = chains[a.0].as_ref()?;
    let cb = chains[b.0].as_ref()?;
    let forward = best_assembly(programs, opts, forced_srcs, ca, cb).map(|(g, m)| (g, a, b, m));
    let backward = best_assembly(programs, opts, forced_srcs, cb, ca).map(|(g, m)| (g, b, a, m));
    match (forward, backward) {
        (Some(f), Some(bwd)) => Some(if f.0 >= bwd.0 { f } else { bwd }),
        (Some(f), None) => Some(f),
        (None, Some(bwd)) => Some(bwd),
        (None, None) => None,
    }
}

/// Every (weighted, non-return) intra-chain edge in the program, used to
/// drive candidate-pair discovery. Inter-function edges are excluded
/// unless `reorder_ip` is set (spec §9: `propeller-reorder-ip` gates
/// function-transition splitting; left off, chains never cross function
/// boundaries, which keeps the coalescing pass in §4.C5 well-defined).
fn candidate_edges(programs: &ProgramCfgs, opts: &PropellerOptions) -> Vec<(GlobalNodeId, GlobalNodeId)> {
    let mut edges = Vec::new();
    for (idx, cfg) in programs.cfgs.iter().enumerate() {
        let cfg_id = CfgId(idx);
        for e in &cfg.edges {
            if e.weight == 0 || e.kind.is_return() {
                continue;
            }
            if !opts.reorder_ip && !e.kind.is_intra() {
                continue;
            }
            let sink = match e.target {
                EdgeTarget::Local(n) => GlobalNodeId { cfg: cfg_id, node: n },
                EdgeTarget::Remote(g) => g,
            };
            edges.push((GlobalNodeId { cfg: cfg_id, node: e.src }, sink));
        }
    }
    edges
}

/// Runs the greedy ExtTSP chain-building loop to convergence, then the
/// post-merge fallthrough pass and per-function coalescing (spec
/// §4.C5), returning the final chains (at most two per function: hot
/// and cold, when `split_funcs` is set).
pub fn build(programs: &ProgramCfgs, mapper: &AddressMapper, opts: &PropellerOptions) -> Vec<NodeChain> {
    let mut chains: Vec<Option<NodeChain>> = Vec::new();
    let mut owner: HashMap<GlobalNodeId, ChainId> = HashMap::new();

    for (idx, cfg) in programs.cfgs.iter().enumerate() {
        let cfg_id = CfgId(idx);
        for (ni, node) in cfg.nodes.iter().enumerate() {
            let gid = GlobalNodeId { cfg: cfg_id, node: NodeId(ni) };
            let id = ChainId(chains.len());
            chains.push(Some(NodeChain::single(gid, node.size, node.freq)));
            owner.insert(gid, id);
        }
    }

    let forced = mutually_forced_edges(programs, mapper);
    contract_forced_edges(&forced, programs, mapper, opts, &mut chains, &mut owner);

    let forced_srcs: HashSet<GlobalNodeId> = forced.keys().copied().collect();
    let all_edges = candidate_edges(programs, opts);

    loop {
        let mut seen_pairs: HashSet<(ChainId, ChainId)> = HashSet::new();
        let mut best_overall: Option<(f64, ChainId, ChainId, Vec<GlobalNodeId>)> = None;

        for &(src, sink) in &all_edges {
            let (Some(&ca), Some(&cb)) = (owner.get(&src), owner.get(&sink)) else {
                continue;
            };
            if ca == cb {
                continue;
            }
            let key = if ca.0 < cb.0 { (ca, cb) } else { (cb, ca) };
            if !seen_pairs.insert(key) {
                continue;
            }
            if let Some(candidate) = evaluate_pair(programs, opts, &forced_srcs, &chains, key.0, key.1) {
                if best_overall.as_ref().map(|b| candidate.0 > b.0).unwrap_or(true) {
                    best_overall = Some(candidate);
                }
            }
        }

        let Some((_, keep, drop, merged_nodes)) = best_overall else {
            break;
        };
        let merged = finalize_chain(programs, mapper, opts, merged_nodes);
        for &g in &merged.nodes {
            owner.insert(g, keep);
        }
        chains[keep.0] = Some(merged);
        chains[drop.0] = None;
    }

    post_merge_fallthrough_pass(programs, mapper, opts, &mut chains, &mut owner);
    coalesce(programs, mapper, opts, &mut chains, &mut owner);

    chains.into_iter().flatten().collect()
}

fn contract_forced_edges(
    forced: &HashMap<GlobalNodeId, GlobalNodeId>,
    programs: &ProgramCfgs,
    mapper: &AddressMapper,
    opts: &PropellerOptions,
    chains: &mut Vec<Option<NodeChain>>,
    owner: &mut HashMap<GlobalNodeId, ChainId>,
) {
    let mut srcs: Vec<GlobalNodeId> = forced.keys().copied().collect();
    srcs.sort_by_key(|&g| node_address(programs, mapper, g));

    for src in srcs {
        let sink = forced[&src];
        let (Some(&ca), Some(&cb)) = (owner.get(&src), owner.get(&sink)) else {
            continue;
        };
        if ca == cb {
            continue;
        }
        let (tail_ok, head_ok, same_hot) = {
            let a = chains[ca.0].as_ref().unwrap();
            let b = chains[cb.0].as_ref().unwrap();
            (a.last() == Some(src), b.first() == Some(sink), is_chain_hot(a) == is_chain_hot(b))
        };
        if !(tail_ok && head_ok && same_hot) {
            continue;
        }
        let a_nodes = chains[ca.0].take().unwrap().nodes;
        let b_nodes = chains[cb.0].take().unwrap().nodes;
        let merged_nodes: Vec<GlobalNodeId> = a_nodes.into_iter().chain(b_nodes).collect();
        let merged = finalize_chain(programs, mapper, opts, merged_nodes);
        for &g in &merged.nodes {
            owner.insert(g, ca);
        }
        chains[ca.0] = Some(merged);
    }
}

/// Spec §4.C5 "Post-merge fallthrough pass".
fn post_merge_fallthrough_pass(
    programs: &ProgramCfgs,
    mapper: &AddressMapper,
    opts: &PropellerOptions,
    chains: &mut Vec<Option<NodeChain>>,
    owner: &mut HashMap<GlobalNodeId, ChainId>,
) {
    let mut pairs: Vec<(GlobalNodeId, GlobalNodeId)> = Vec::new();
    for (idx, cfg) in programs.cfgs.iter().enumerate() {
        let cfg_id = CfgId(idx);
        for (ni, node) in cfg.nodes.iter().enumerate() {
            let gid = GlobalNodeId { cfg: cfg_id, node: NodeId(ni) };
            if let Some(ft) = node.ft_edge {
                let edge = cfg.edge(ft);
                let target = match edge.target {
                    EdgeTarget::Local(n) => GlobalNodeId { cfg: cfg_id, node: n },
                    EdgeTarget::Remote(g) => g,
                };
                pairs.push((gid, target));
            }
        }
        for e in &cfg.edges {
            if e.kind.is_intra() {
                let src_gid = GlobalNodeId { cfg: cfg_id, node: e.src };
                let target = match e.target {
                    EdgeTarget::Local(n) => GlobalNodeId { cfg: cfg_id, node: n },
                    EdgeTarget::Remote(g) => g,
                };
                pairs.push((src_gid, target));
            }
        }
    }

    for (src, sink) in pairs {
        let (Some(&ca), Some(&cb)) = (owner.get(&src), owner.get(&sink)) else {
            continue;
        };
        if ca == cb {
            continue;
        }
        let (tail_ok, head_ok, hot_match) = {
            let a = chains[ca.0].as_ref().unwrap();
            let b = chains[cb.0].as_ref().unwrap();
            (a.last() == Some(src), b.first() == Some(sink), is_chain_hot(a) == is_chain_hot(b))
        };
        if !(tail_ok && head_ok && hot_match) {
            continue;
        }
        let a_nodes = chains[ca.0].take().unwrap().nodes;
        let b_nodes = chains[cb.0].take().unwrap().nodes;
        let merged_nodes: Vec<GlobalNodeId> = a_nodes.into_iter().chain(b_nodes).collect();
        let merged = finalize_chain(programs, mapper, opts, merged_nodes);
        for &g in &merged.nodes {
            owner.insert(g, ca);
        }
        chains[ca.0] = Some(merged);
    }
}

/// Spec §4.C5 "Coalescing": sorts each function's remaining chains
/// (entry-chain first, hot before cold, density descending, delegate
/// address ascending) and merges consecutive runs, starting a new chain
/// at the hot/cold boundary only when `split_funcs` is set.
fn coalesce(
    programs: &ProgramCfgs,
    mapper: &AddressMapper,
    opts: &PropellerOptions,
    chains: &mut Vec<Option<NodeChain>>,
    owner: &mut HashMap<GlobalNodeId, ChainId>,
) {
    let mut by_function: HashMap<CfgId, Vec<ChainId>> = HashMap::new();
    for (idx, slot) in chains.iter().enumerate() {
        if let Some(chain) = slot {
            by_function.entry(chain.delegate.cfg).or_default().push(ChainId(idx));
        }
    }

    for (_cfg_id, mut ids) in by_function {
        ids.sort_by(|&a, &b| {
            let ca = chains[a.0].as_ref().unwrap();
            let cb = chains[b.0].as_ref().unwrap();
            let a_entry = is_entry_gid(programs, ca.first().unwrap());
            let b_entry = is_entry_gid(programs, cb.first().unwrap());
            b_entry
                .cmp(&a_entry)
                .then_with(|| (cb.freq > 0).cmp(&(ca.freq > 0)))
                .then_with(|| cb.density().partial_cmp(&ca.density()).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| node_address(programs, mapper, ca.delegate).cmp(&node_address(programs, mapper, cb.delegate)))
        });

        let mut current_nodes: Vec<GlobalNodeId> = Vec::new();
        let mut current_hot: Option<bool> = None;
        for id in ids {
            let chain = chains[id.0].take().unwrap();
            let hot = is_chain_hot(&chain);
            if opts.split_funcs {
                if let Some(prev_hot) = current_hot {
                    if prev_hot != hot && !current_nodes.is_empty() {
                        flush_coalesced(&mut current_nodes, programs, mapper, opts, chains, owner);
                    }
                }
            }
            current_nodes.extend(chain.nodes);
            current_hot = Some(hot);
        }
        if !current_nodes.is_empty() {
            flush_coalesced(&mut current_nodes, programs, mapper, opts, chains, owner);
        }
    }
}

fn flush_coalesced(
    nodes: &mut Vec<GlobalNodeId>,
    programs: &ProgramCfgs,
    mapper: &AddressMapper,
    opts: &PropellerOptions,
    chains: &mut Vec<Option<NodeChain>>,
    owner: &mut HashMap<GlobalNodeId, ChainId>,
) {
    let taken = std::mem::take(nodes);
    let chain = finalize_chain(programs, mapper, opts, taken);
    let id = ChainId(chains.len());
    for &g in &chain.nodes {
        owner.insert(g, id);
    }
    chains.push(Some(chain));
}
