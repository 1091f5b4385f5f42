//! Arena-owned control-flow graphs (spec §3 "CFG node" / "CFG edge" /
//! "CFG (function)", spec §9 "Cyclic object graphs").
//!
//! CFG nodes and edges form cycles (recursive self-calls, loops), so they
//! are not modeled with owned pointers the way the teacher's
//! `core::control_flow_graph::ControlFlowGraph` models them with cloned
//! `String` ids. Instead each `Cfg` is an arena of `CfgNode`/`CfgEdge`
//! values addressed by `NodeId`/`EdgeId` — plain indices into `Vec`s — and
//! a `CfgId` addresses one function's CFG within the program-wide
//! collection built by `cfg_builder`. Inter-function edges carry a
//! `CfgId` alongside the sink `NodeId` since their sink lives in a
//! different arena.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::bb_handle::BbHandle;

/// Index of a CFG within the program-wide CFG collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CfgId(pub usize);

/// Index of a node within one `Cfg`'s node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Index of an edge within one `Cfg`'s edge arena (the "source's CFG"
/// owns every edge, per spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A node's identity across the whole program: which CFG it belongs to,
/// and its index within that CFG's node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalNodeId {
    pub cfg: CfgId,
    pub node: NodeId,
}

/// Edge kind, per spec §3 "CFG edge".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CfgEdgeKind {
    IntraFunc,
    IntraRecursiveSelfCall,
    IntraRecursiveSelfReturn,
    IntraDynamic,
    InterFuncCall,
    InterFuncReturn,
}

impl CfgEdgeKind {
    /// Intra kinds require `src.cfg == sink.cfg`; inter kinds require the
    /// opposite (spec §3 invariant).
    pub fn is_intra(self) -> bool {
        matches!(
            self,
            CfgEdgeKind::IntraFunc
                | CfgEdgeKind::IntraRecursiveSelfCall
                | CfgEdgeKind::IntraRecursiveSelfReturn
                | CfgEdgeKind::IntraDynamic
        )
    }

    pub fn is_call(self) -> bool {
        matches!(
            self,
            CfgEdgeKind::IntraRecursiveSelfCall | CfgEdgeKind::InterFuncCall
        )
    }

    pub fn is_return(self) -> bool {
        matches!(
            self,
            CfgEdgeKind::IntraRecursiveSelfReturn | CfgEdgeKind::InterFuncReturn
        )
    }
}

/// An edge's sink: local when it stays inside the owning CFG (intra
/// kinds), remote when it targets a node in another function's CFG
/// (inter kinds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeTarget {
    Local(NodeId),
    Remote(GlobalNodeId),
}

/// A directed CFG edge, owned by the source node's CFG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgEdge {
    pub src: NodeId,
    pub target: EdgeTarget,
    pub weight: u64,
    pub kind: CfgEdgeKind,
}

impl CfgEdge {
    /// Validates the intra/inter vs. local/remote invariant of spec §3.
    pub fn is_consistent(&self) -> bool {
        match self.target {
            EdgeTarget::Local(_) => self.kind.is_intra(),
            EdgeTarget::Remote(_) => !self.kind.is_intra(),
        }
    }
}

/// A basic block as a CFG vertex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgNode {
    pub bb_handle: BbHandle,
    pub freq: u64,
    pub section_index: usize,
    pub size: u64,
    pub outs: Vec<EdgeId>,
    pub ins: Vec<EdgeId>,
    pub call_outs: Vec<EdgeId>,
    pub call_ins: Vec<EdgeId>,
    /// Aliases one entry of `outs`; see spec §9 "Mutable aliasing of
    /// `ft_edge`". Never a second owning reference.
    pub ft_edge: Option<EdgeId>,
}

impl CfgNode {
    pub fn is_entry(&self) -> bool {
        self.bb_handle.range_index == 0 && self.bb_handle.bb_index == 0
    }
}

/// One function's control-flow graph: an arena of nodes (ordered by
/// address) and edges it owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cfg {
    pub name: String,
    pub section: usize,
    pub size: u64,
    pub nodes: Vec<CfgNode>,
    pub edges: Vec<CfgEdge>,
}

impl Cfg {
    pub fn new(name: String, section: usize, size: u64) -> Self {
        Cfg {
            name,
            section,
            size,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn entry_node_id(&self) -> NodeId {
        NodeId(0)
    }

    pub fn entry(&self) -> &CfgNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: NodeId) -> &CfgNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut CfgNode {
        &mut self.nodes[id.0]
    }

    pub fn edge(&self, id: EdgeId) -> &CfgEdge {
        &self.edges[id.0]
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> &mut CfgEdge {
        &mut self.edges[id.0]
    }

    pub fn push_node(&mut self, node: CfgNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Adds an edge and wires it into the source's `outs`/`call_outs` and,
    /// for local edges, the sink's `ins`/`call_ins`.
    pub fn push_edge(&mut self, edge: CfgEdge) -> EdgeId {
        debug_assert!(edge.is_consistent());
        let src = edge.src;
        let local_sink = match edge.target {
            EdgeTarget::Local(n) => Some(n),
            EdgeTarget::Remote(_) => None,
        };
        let is_call_like = edge.kind.is_call();
        let is_return_like = edge.kind.is_return();
        self.edges.push(edge);
        let id = EdgeId(self.edges.len() - 1);
        if is_call_like {
            self.nodes[src.0].call_outs.push(id);
        } else {
            self.nodes[src.0].outs.push(id);
        }
        if let Some(sink) = local_sink {
            if is_return_like {
                self.nodes[sink.0].call_ins.push(id);
            } else {
                self.nodes[sink.0].ins.push(id);
            }
        }
        id
    }

    /// `Σ out_weights`, including the fallthrough edge if present.
    pub fn out_weight_sum(&self, id: NodeId) -> u64 {
        self.nodes[id.0]
            .outs
            .iter()
            .map(|e| self.edges[e.0].weight)
            .sum()
    }

    pub fn in_weight_sum(&self, id: NodeId) -> u64 {
        self.nodes[id.0]
            .ins
            .iter()
            .map(|e| self.edges[e.0].weight)
            .sum()
    }

    pub fn call_in_weight_sum(&self, id: NodeId) -> u64 {
        self.nodes[id.0]
            .call_ins
            .iter()
            .map(|e| self.edges[e.0].weight)
            .sum()
    }

    pub fn max_call_out_weight(&self, id: NodeId) -> u64 {
        self.nodes[id.0]
            .call_outs
            .iter()
            .map(|e| self.edges[e.0].weight)
            .max()
            .unwrap_or(0)
    }

    /// Hot iff the entry node has non-zero frequency (spec §4.C3
    /// "Hotness").
    pub fn is_hot(&self) -> bool {
        self.nodes
            .first()
            .map(|n| n.freq > 0)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(bb_index: usize, size: u64) -> CfgNode {
        CfgNode {
            bb_handle: BbHandle {
                function_index: 0,
                range_index: 0,
                bb_index,
            },
            freq: 0,
            section_index: 0,
            size,
            outs: Vec::new(),
            ins: Vec::new(),
            call_outs: Vec::new(),
            call_ins: Vec::new(),
            ft_edge: None,
        }
    }

    #[test]
    fn push_edge_wires_both_endpoints() {
        let mut cfg = Cfg::new("foo".to_string(), 1, 12);
        let a = cfg.push_node(node(0, 8));
        let b = cfg.push_node(node(1, 4));
        let e = cfg.push_edge(CfgEdge {
            src: a,
            target: EdgeTarget::Local(b),
            weight: 7,
            kind: CfgEdgeKind::IntraFunc,
        });
        cfg.node_mut(a).ft_edge = Some(e);
        assert_eq!(cfg.node(a).outs, vec![e]);
        assert_eq!(cfg.node(b).ins, vec![e]);
        assert_eq!(cfg.out_weight_sum(a), 7);
        assert!(cfg.is_hot() == false);
        cfg.node_mut(a).freq = 7;
        assert!(cfg.is_hot());
    }

    #[test]
    fn entry_node_is_first() {
        let mut cfg = Cfg::new("foo".to_string(), 1, 8);
        let a = cfg.push_node(node(0, 8));
        assert_eq!(cfg.entry_node_id(), a);
        assert!(cfg.entry().is_entry());
    }
}
