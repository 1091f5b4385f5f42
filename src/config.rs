//! Pipeline configuration (spec §6 "CLI / configuration options").
//!
//! This struct is the in-process surface the external CLI driver
//! populates; it does not parse argv itself (argv parsing is out of
//! scope per spec §1).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropellerOptions {
    pub reorder_funcs: bool,
    pub reorder_blocks: bool,
    pub split_funcs: bool,
    /// Gates the function-transition splitting logic in §4.C5 (spec §9
    /// "Open questions": `propeller-reorder-ip` is only partially
    /// specified upstream; treated here as an advanced mode layered on
    /// top of `reorder_blocks`).
    pub reorder_ip: bool,

    /// Splits are only attempted when a chain's size is at or below this
    /// many bytes (spec §4.C5 default 1024).
    pub chain_split_threshold: u64,
    /// `D_fwd` (spec §4.C5 default 1024).
    pub forward_jump_distance: u64,
    /// `D_bwd` (spec §4.C5 default 640).
    pub backward_jump_distance: u64,
    /// `W_ft` (spec §4.C5 default 1.0).
    pub fallthrough_weight: f64,
    /// `W_fwd` (spec §4.C5 default 0.1).
    pub forward_jump_weight: f64,
    /// `W_bwd` (spec §4.C5 default 0.1).
    pub backward_jump_weight: f64,

    /// `S_max`, the cluster size ceiling (spec §4.C6 default 2 MiB).
    pub cluster_size_cap: u64,

    /// Function names to emit a DOT dump for.
    pub dump_cfgs: Vec<String>,
    /// Path to write the final symbol ordering to, if any.
    pub dump_symbol_order: Option<String>,
    pub print_stats: bool,

    /// Whether the address mapper additionally requires a `.text`/
    /// `.text.*` section name (spec §4.C1 selection policy, point 3).
    pub require_text_section: bool,
}

impl Default for PropellerOptions {
    fn default() -> Self {
        PropellerOptions {
            reorder_funcs: true,
            reorder_blocks: true,
            split_funcs: false,
            reorder_ip: false,
            chain_split_threshold: 1024,
            forward_jump_distance: 1024,
            backward_jump_distance: 640,
            fallthrough_weight: 1.0,
            forward_jump_weight: 0.1,
            backward_jump_weight: 0.1,
            cluster_size_cap: 2 * 1024 * 1024,
            dump_cfgs: Vec::new(),
            dump_symbol_order: None,
            print_stats: false,
            require_text_section: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let opts = PropellerOptions::default();
        assert_eq!(opts.chain_split_threshold, 1024);
        assert_eq!(opts.backward_jump_distance, 640);
        assert_eq!(opts.cluster_size_cap, 2 * 1024 * 1024);
        assert_eq!(opts.forward_jump_weight, opts.backward_jump_weight);
    }
}
