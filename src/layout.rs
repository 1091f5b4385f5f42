//! C7 — Layout Emitter (spec §4.C7).
//!
//! Grounded on `original_source/lld/ELF/PropellerBBReordering.h`'s final
//! symbol-order construction and the `original_source/propeller`
//! DOT-dump helper named in spec §6 "Outputs" #2.
//!
//! Spec's `hot_end`/`cold_end` placeholder scheme exists to let upstream
//! insert each cfg's blocks as it streams through functions in whatever
//! order they arrive. Since [`crate::clustering::cluster`] already
//! returns clusters in final hot-then-cold order, that placeholder
//! bookkeeping collapses to a single concatenation pass here: walking
//! clusters, then each cluster's chains, then each chain's nodes, in
//! order, produces exactly the same list the marker scheme would.

use std::collections::HashSet;

use crate::address_mapper::AddressMapper;
use crate::cfg_builder::ProgramCfgs;
use crate::core::cfg::GlobalNodeId;
use crate::core::chain::{ChainId, NodeChain};
use crate::core::cluster::Cluster;

/// One emitted symbol name, tagged with whether it names a function entry
/// or a basic block (spec §4.C7 `should_keep_bb_symbol`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedSymbol {
    pub name: String,
    pub is_function: bool,
}

/// The layout emitter's output: the final symbol order plus the set of
/// cold bb symbols that must be kept for the legacy symbol table.
pub struct Layout {
    pub symbols: Vec<OrderedSymbol>,
    pub retained_bb_symbols: HashSet<String>,
}

impl Layout {
    /// Names in final order, ready to write one-per-line (spec §6
    /// "Outputs" #1).
    pub fn symbol_names(&self) -> Vec<String> {
        self.symbols.iter().map(|s| s.name.clone()).collect()
    }

    pub fn should_keep_bb_symbol(&self, symbol: &OrderedSymbol) -> bool {
        symbol.is_function || self.retained_bb_symbols.contains(&symbol.name)
    }
}

fn function_name(mapper: &AddressMapper, function_index: usize) -> String {
    mapper
        .function_info
        .get(&function_index)
        .and_then(|info| info.aliases.first().cloned())
        .unwrap_or_else(|| format!("fn_{function_index}"))
}

/// A node's emitted name: the function's primary alias for its entry
/// block, `"<primary>.bb<index>"` for every other block. This is a
/// stable naming scheme layered on top of the pipeline's internal
/// indices, not a reproduction of the legacy profile's `<ordinal>.<unary
/// bb-index>` encoding (spec §6 Inputs #2) — that encoding only exists
/// to address profile counters, not to name link-time symbols.
fn node_name(programs: &ProgramCfgs, mapper: &AddressMapper, gid: GlobalNodeId) -> OrderedSymbol {
    let node = programs.cfg(gid.cfg).node(gid.node);
    let primary = function_name(mapper, node.bb_handle.function_index);
    if node.is_entry() {
        OrderedSymbol {
            name: primary,
            is_function: true,
        }
    } else {
        OrderedSymbol {
            name: format!("{primary}.bb{}", node.bb_handle.bb_index),
            is_function: false,
        }
    }
}

/// Builds the final layout from clustered chains (spec §4.C7).
pub fn emit(programs: &ProgramCfgs, mapper: &AddressMapper, clusters: &[Cluster], chains: &[NodeChain]) -> Layout {
    let mut symbols = Vec::new();
    let mut retained_bb_symbols = HashSet::new();

    let mut prev_function: Option<usize> = None;
    let mut partition_cold = false;
    let mut kept_for_partition = false;

    for cluster in clusters {
        for &chain_id in &cluster.chains {
            let chain = chain_of(chains, chain_id);
            let chain_cold = chain.freq == 0;
            for &gid in &chain.nodes {
                let node = programs.cfg(gid.cfg).node(gid.node);
                let function_index = node.bb_handle.function_index;
                if prev_function != Some(function_index) {
                    prev_function = Some(function_index);
                    partition_cold = chain_cold;
                    kept_for_partition = false;
                }

                let symbol = node_name(programs, mapper, gid);
                if !symbol.is_function && partition_cold && !kept_for_partition {
                    retained_bb_symbols.insert(symbol.name.clone());
                    kept_for_partition = true;
                }
                symbols.push(symbol);
            }
        }
    }

    Layout {
        symbols,
        retained_bb_symbols,
    }
}

fn chain_of(chains: &[NodeChain], id: ChainId) -> &NodeChain {
    &chains[id.0]
}

/// Per-function DOT dump (spec §6 "Outputs" #2).
pub mod dot {
    use std::fmt::Write as _;

    use crate::core::cfg::{Cfg, EdgeTarget};

    /// Renders `cfg` as `digraph <name> { ... }`: one node per bb with a
    /// `size=` attribute, one edge per intra-function edge labeled with
    /// its weight (`1.0` for the fallthrough edge, `0.1` otherwise).
    pub fn dump(cfg: &Cfg) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph {} {{", cfg.name);
        for (i, node) in cfg.nodes.iter().enumerate() {
            let _ = writeln!(out, "  n{i} [size={}];", node.size);
        }
        for (i, node) in cfg.nodes.iter().enumerate() {
            for &eid in node.outs.iter().chain(node.call_outs.iter()) {
                let edge = cfg.edge(eid);
                if !edge.kind.is_intra() {
                    continue;
                }
                let EdgeTarget::Local(sink) = edge.target else {
                    continue;
                };
                let is_ft = node.ft_edge == Some(eid);
                let weight_attr = if is_ft { 1.0 } else { 0.1 };
                let _ = writeln!(
                    out,
                    "  n{i} -> n{} [label={}, weight={weight_attr}];",
                    sink.0, edge.weight
                );
            }
        }
        let _ = writeln!(out, "}}");
        out
    }
}
