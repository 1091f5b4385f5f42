//! Core data types for the Propeller code-layout pipeline.
//!
//! Arena-owned graph/chain/cluster types (spec §9 "Cyclic object graphs")
//! plus the address-map and symbol-table shapes that feed them.

pub mod bb_addr_map;
pub mod bb_handle;
pub mod cfg;
pub mod chain;
pub mod cluster;
pub mod path_node;
pub mod symbol;

pub use bb_addr_map::{BbAddrMapEntry, BbEntry, BbMetadata, BbRange};
pub use bb_handle::{BbHandle, FlatBbHandle};
pub use cfg::{Cfg, CfgEdge, CfgEdgeKind, CfgId, CfgNode, EdgeId, EdgeTarget, GlobalNodeId, NodeId};
pub use chain::{ChainId, NodeChain};
pub use cluster::{Cluster, ClusterId};
pub use path_node::{PathNode, PathNodeId, PathPredInfoEntry, PathTree};
pub use symbol::{BbSymbol, FunctionSymbol, SymbolEntry};
