//! BB address map (spec §3 "BB address map entry").
//!
//! Per function: an entry address and an ordered list of ranges, each with
//! a base address and an ordered list of bb entries. Mirrors the wire
//! shape of LLVM's `SHT_LLVM_BB_ADDR_MAP` section (see
//! `elf::bb_addr_map` for the decoder).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Per-block metadata flags carried by the bb address map.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct BbMetadata: u8 {
        const HAS_RETURN         = 0b0000_0001;
        const HAS_TAIL_CALL      = 0b0000_0010;
        const IS_EH_PAD          = 0b0000_0100;
        const CAN_FALL_THROUGH   = 0b0000_1000;
        const HAS_INDIRECT_BRANCH = 0b0001_0000;
    }
}

/// One basic block within a range: a stable id, its offset from the
/// range base, its byte size, and metadata flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BbEntry {
    pub id: u32,
    pub offset: u64,
    pub size: u64,
    pub metadata: BbMetadata,
}

/// One contiguous address range of a function's bb address map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BbRange {
    pub base_address: u64,
    pub entries: Vec<BbEntry>,
}

impl BbRange {
    /// The half-open interval `[range_base, range_base + last.offset +
    /// last.size)` covered by this range, per the selection policy in
    /// spec §4.C1.
    pub fn covered_interval(&self) -> Option<(u64, u64)> {
        let last = self.entries.last()?;
        let end = self.base_address + last.offset + last.size;
        Some((self.base_address, end))
    }

    pub fn entry_address(&self, entry: &BbEntry) -> u64 {
        self.base_address + entry.offset
    }

    pub fn entry_end_address(&self, entry: &BbEntry) -> u64 {
        self.base_address + entry.offset + entry.size
    }
}

/// The full bb address map for one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BbAddrMapEntry {
    pub function_address: u64,
    pub ranges: Vec<BbRange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covered_interval_uses_last_entry() {
        let range = BbRange {
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
        };
        assert_eq!(range.covered_interval(), Some((0x1000, 0x100c)));
    }
}
