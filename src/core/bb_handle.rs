//! Basic-block handles (spec §3 "Basic-block handle").
//!
//! Grounded on `original_source/propeller/bb_handle.h`'s `BbHandle` /
//! `FlatBbHandle`, adapted to Rust index conventions (no -1 sentinels —
//! "no handle" is expressed with `Option`).

use serde::{Deserialize, Serialize};

/// `(function_index, range_index, bb_index)` triple addressing one block
/// inside a function's bb-address map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BbHandle {
    pub function_index: usize,
    pub range_index: usize,
    pub bb_index: usize,
}

/// `(function_index, flat_bb_index)`: the same block, addressed by a flat
/// index numbering blocks across all ranges of a function in address
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlatBbHandle {
    pub function_index: usize,
    pub flat_bb_index: usize,
}
