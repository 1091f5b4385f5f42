//! Branch aggregator (spec §4.C2): the two input variants, normalized to
//! one output schema.
//!
//! Grounded on `original_source/propeller/branch_aggregation.h`
//! (`BranchAggregation`) and `branch_frequencies.h` (`BranchFrequencies`):
//! kept as two independent input shapes rather than collapsed into one,
//! per SPEC_FULL.md §2.

use std::collections::HashMap;

/// Output schema shared by both aggregator variants: counts per
/// `(from_address, to_address)` branch and per `(from_address,
/// to_address)` fallthrough range.
#[derive(Debug, Clone, Default)]
pub struct BranchAggregation {
    pub branch_counters: HashMap<(u64, u64), u64>,
    pub fallthrough_counters: HashMap<(u64, u64), u64>,
}

impl BranchAggregation {
    pub fn number_of_branch_counters(&self) -> u64 {
        self.branch_counters.values().sum()
    }

    pub fn unique_addresses(&self) -> std::collections::HashSet<u64> {
        let mut set = std::collections::HashSet::new();
        for &(from, to) in self.branch_counters.keys() {
            set.insert(from);
            set.insert(to);
        }
        for &(from, to) in self.fallthrough_counters.keys() {
            set.insert(from);
            set.insert(to);
        }
        set
    }
}

/// Taken-branch aggregator: consumes `(from, to) -> count` pairs
/// directly. Fallthrough counters are left for the CFG builder (spec
/// §4.C3) to infer from the CFG's own fallthrough edges.
pub fn aggregate_taken_branches(records: &[(u64, u64, u64)]) -> BranchAggregation {
    let mut out = BranchAggregation::default();
    for &(from, to, count) in records {
        *out.branch_counters.entry((from, to)).or_insert(0) += count;
    }
    out
}

/// Per-address taken/not-taken frequency counters (the second C2
/// variant's input shape).
#[derive(Debug, Clone, Default)]
pub struct BranchFrequencies {
    pub taken_branch_counters: HashMap<(u64, u64), u64>,
    pub not_taken_branch_counters: HashMap<u64, u64>,
}

impl BranchFrequencies {
    pub fn number_of_taken_branch_counters(&self) -> u64 {
        self.taken_branch_counters.values().sum()
    }
}

/// What the frequency aggregator needs to know about the block
/// containing a given address, to infer fallthroughs (spec §4.C2's
/// "Single unconditional-terminator blocks use the block range computed
/// in §4.C3"). Implemented by `address_mapper` once C1 has run.
pub trait BlockLookup {
    /// `(block_start, block_end, can_fall_through)` for the block
    /// containing `addr`, if any.
    fn containing_block(&self, addr: u64) -> Option<(u64, u64, bool)>;
    /// The start address of the block immediately following the block
    /// ending at `block_end`, in the same function, if any.
    fn next_block_start(&self, block_end: u64) -> Option<u64>;
}

/// Converts `BranchFrequencies` into the shared `BranchAggregation`
/// schema, inferring fallthroughs from not-taken counters (spec §4.C2
/// "Frequency aggregator").
pub fn aggregate_branch_frequencies(
    freqs: &BranchFrequencies,
    lookup: &dyn BlockLookup,
) -> BranchAggregation {
    let mut out = BranchAggregation::default();
    out.branch_counters = freqs.taken_branch_counters.clone();

    for (&addr, &count) in &freqs.not_taken_branch_counters {
        let Some((start, end, can_fall_through)) = lookup.containing_block(addr) else {
            continue;
        };
        if !can_fall_through {
            continue;
        }
        let Some(next_start) = lookup.next_block_start(end) else {
            continue;
        };
        *out
            .fallthrough_counters
            .entry((start, next_start))
            .or_insert(0) += count;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLookup;
    impl BlockLookup for FixedLookup {
        fn containing_block(&self, addr: u64) -> Option<(u64, u64, bool)> {
            if addr == 0x1004 {
                Some((0x1000, 0x1008, true))
            } else {
                None
            }
        }
        fn next_block_start(&self, block_end: u64) -> Option<u64> {
            if block_end == 0x1008 {
                Some(0x1008)
            } else {
                None
            }
        }
    }

    #[test]
    fn taken_branch_aggregator_sums_duplicates() {
        let agg = aggregate_taken_branches(&[(0x1000, 0x1008, 4), (0x1000, 0x1008, 3)]);
        assert_eq!(agg.branch_counters[&(0x1000, 0x1008)], 7);
    }

    #[test]
    fn frequency_aggregator_infers_fallthrough_scenario_2() {
        // spec §8 end-to-end scenario 2.
        let mut freqs = BranchFrequencies::default();
        freqs.not_taken_branch_counters.insert(0x1004, 19);
        let agg = aggregate_branch_frequencies(&freqs, &FixedLookup);
        assert_eq!(agg.fallthrough_counters[&(0x1000, 0x1008)], 19);
    }

    /// `AddressMapper` is the production `BlockLookup`; exercise it (not
    /// `FixedLookup`) against the same scenario 2 shape to confirm
    /// `aggregate_branch_frequencies` is actually reachable end to end.
    #[test]
    fn frequency_aggregator_works_against_real_address_mapper() {
        use crate::address_mapper::{AddressMapper, AddressMapperInput, FunctionInfo};
        use crate::core::bb_addr_map::{BbAddrMapEntry, BbEntry, BbMetadata, BbRange};
        use crate::stats::PropellerStats;

        let map = BbAddrMapEntry {
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
        };
        let info = vec![FunctionInfo {
            aliases: vec!["foo".to_string()],
            section_name: ".text".to_string(),
        }];
        let mut stats = PropellerStats::default();
        let mapper = AddressMapper::build(
            AddressMapperInput {
                maps: &[map],
                function_info: &info,
                hot_addresses: None,
                require_text_section: false,
            },
            &mut stats,
        );

        let mut freqs = BranchFrequencies::default();
        freqs.not_taken_branch_counters.insert(0x1004, 19);
        let agg = aggregate_branch_frequencies(&freqs, &mapper);
        assert_eq!(agg.fallthrough_counters[&(0x1000, 0x1008)], 19);
    }
}
