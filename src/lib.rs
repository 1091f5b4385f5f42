//! Propeller: a post-link, profile-guided code-layout optimizer for ELF
//! binaries. Given a binary's `LLVM_BB_ADDR_MAP` section and a branch
//! profile, the pipeline builds per-function control-flow graphs,
//! greedily reorders their basic blocks for instruction-cache locality
//! (ExtTSP), clusters the resulting chains (C³/hfsort), and emits a
//! final symbol order plus a legacy bb-symbol retain set.
//!
//! Pipeline: [`address_mapper`] (C1) feeds [`profile`] (C2) and
//! [`path_profile`] (C4); [`cfg_builder`] (C3) builds the control-flow
//! graphs those counters attach to; [`chain_builder`] (C5) greedily
//! reorders blocks; [`clustering`] (C6) groups the resulting chains;
//! [`layout`] (C7) emits the final order.

/// Core arena-owned data types shared across every pipeline stage.
pub mod core;

/// ELF section decoding: `LLVM_BB_ADDR_MAP`, relocations, symbol table.
pub mod elf;

/// Error types and the `Result` alias used throughout the pipeline.
pub mod error;

/// Non-fatal diagnostics accumulated while running the pipeline.
pub mod stats;

/// Logging and tracing infrastructure.
pub mod logging;

/// Pipeline configuration (`propeller-*` options).
pub mod config;

/// C1 — Address Mapper.
pub mod address_mapper;

/// C2 — Branch Aggregator and profile parsing (legacy textual format).
pub mod profile;

/// C3 — CFG Builder.
pub mod cfg_builder;

/// C4 — Path Profile Aggregator.
pub mod path_profile;

/// C5 — ExtTSP Node-Chain Builder.
pub mod chain_builder;

/// C6 — C³/hfsort chain clustering.
pub mod clustering;

/// C7 — Layout Emitter.
pub mod layout;

pub use error::{PropellerError, Result};
pub use stats::PropellerStats;
