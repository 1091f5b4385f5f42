//! C1 — Address Mapper (spec §4.C1).
//!
//! Grounded on `original_source/propeller/binary_address_mapper.h`'s
//! `BinaryAddressMapper`/`BinaryAddressMapperBuilder`: inverts a sparse,
//! per-function bb address map into an address -> handle lookup that
//! disambiguates zero-sized blocks and call/return landing pads.

use std::collections::HashMap;

use crate::core::bb_addr_map::BbAddrMapEntry;
use crate::core::bb_handle::{BbHandle, FlatBbHandle};
use crate::profile::aggregator::BlockLookup;
use crate::stats::PropellerStats;

/// Direction of an address lookup (spec §4.C1 "Address->handle lookup").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    From,
    To,
}

/// A function's selected aliases, in priority order (first = primary),
/// and the section it lives in.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub aliases: Vec<String>,
    pub section_name: String,
}

/// Inputs to the address mapper: the full bb address map (indexed by
/// function index, as emitted by the object file(s)) plus the symbol
/// names/sections attached to each function index.
pub struct AddressMapperInput<'a> {
    pub maps: &'a [BbAddrMapEntry],
    pub function_info: &'a [FunctionInfo],
    pub hot_addresses: Option<&'a [u64]>,
    pub require_text_section: bool,
}

/// The built address mapper: every selected function's blocks in
/// ascending address order, plus the set of function indices retained.
pub struct AddressMapper {
    maps: Vec<BbAddrMapEntry>,
    /// `bb_handles` in ascending address order; ties keep the original
    /// `(range_index, bb_index)` insertion order.
    pub bb_handles: Vec<BbHandle>,
    pub selected_functions: Vec<usize>,
    pub function_info: HashMap<usize, FunctionInfo>,
}

impl AddressMapper {
    /// Builds the mapper, applying the selection policy of spec §4.C1
    /// and recording non-fatal diagnostics (duplicate unique-linkage
    /// symbols) into `stats`.
    pub fn build(input: AddressMapperInput<'_>, stats: &mut PropellerStats) -> AddressMapper {
        let candidates = select_functions(&input, stats);

        let mut bb_handles = Vec::new();
        let mut function_info = HashMap::new();
        let mut selected_functions = Vec::new();
        for &function_index in &candidates {
            selected_functions.push(function_index);
            function_info.insert(function_index, input.function_info[function_index].clone());
            let map = &input.maps[function_index];
            for (range_index, range) in map.ranges.iter().enumerate() {
                for entry in &range.entries {
                    bb_handles.push(BbHandle {
                        function_index,
                        range_index,
                        bb_index: entry.id as usize,
                    });
                }
            }
        }
        selected_functions.sort_unstable();

        bb_handles.sort_by_key(|h| Self::address_with(input.maps, h));

        AddressMapper {
            maps: input.maps.to_vec(),
            bb_handles,
            selected_functions,
            function_info,
        }
    }

    fn address_with(maps: &[BbAddrMapEntry], h: &BbHandle) -> u64 {
        let range = &maps[h.function_index].ranges[h.range_index];
        let entry = range
            .entries
            .iter()
            .find(|e| e.id as usize == h.bb_index)
            .expect("bb handle must reference an existing entry");
        range.base_address + entry.offset
    }

    /// `addr(h)`.
    pub fn address(&self, h: &BbHandle) -> u64 {
        Self::address_with(&self.maps, h)
    }

    /// `addr(h) + entry(h).size`.
    pub fn end_address(&self, h: &BbHandle) -> u64 {
        let entry = self.entry(h);
        self.address(h) + entry.size
    }

    pub fn size(&self, h: &BbHandle) -> u64 {
        self.entry(h).size
    }

    pub fn can_fall_through_flag(&self, h: &BbHandle) -> bool {
        self.entry(h)
            .metadata
            .contains(crate::core::bb_addr_map::BbMetadata::CAN_FALL_THROUGH)
    }

    pub fn has_return(&self, h: &BbHandle) -> bool {
        self.entry(h)
            .metadata
            .contains(crate::core::bb_addr_map::BbMetadata::HAS_RETURN)
    }

    fn entry(&self, h: &BbHandle) -> &crate::core::bb_addr_map::BbEntry {
        self.maps[h.function_index].ranges[h.range_index]
            .entries
            .iter()
            .find(|e| e.id as usize == h.bb_index)
            .expect("bb handle must reference an existing entry")
    }

    /// Address -> handle lookup (spec §4.C1).
    pub fn find(&self, address: u64, direction: Direction) -> Option<BbHandle> {
        // Upper-bound by address, then step back one.
        let idx = self
            .bb_handles
            .partition_point(|h| self.address(h) <= address);
        if idx == 0 {
            return None;
        }
        let i = idx - 1;
        let h = self.bb_handles[i];
        let addr = self.address(&h);
        let size = self.size(&h);

        if address > addr && address < addr + size {
            return Some(h);
        }
        if address == addr + size && direction == Direction::To {
            return Some(h);
        }
        if address == addr {
            return self.disambiguate_zero_address(i, direction);
        }
        None
    }

    /// Resolves ties when multiple (possibly zero-sized) entries share
    /// the same address as `bb_handles[i]`.
    fn disambiguate_zero_address(&self, i: usize, direction: Direction) -> Option<BbHandle> {
        let h = self.bb_handles[i];
        let addr = self.address(&h);
        let func = h.function_index;

        // Collect the contiguous run of handles at this address within
        // the same function.
        let mut lo = i;
        while lo > 0
            && self.bb_handles[lo - 1].function_index == func
            && self.address(&self.bb_handles[lo - 1]) == addr
        {
            lo -= 1;
        }
        let mut hi = i;
        while hi + 1 < self.bb_handles.len()
            && self.bb_handles[hi + 1].function_index == func
            && self.address(&self.bb_handles[hi + 1]) == addr
        {
            hi += 1;
        }

        match direction {
            Direction::To => Some(self.bb_handles[lo]),
            Direction::From => (lo..=hi)
                .map(|k| self.bb_handles[k])
                .find(|h| self.size(h) > 0),
        }
    }

    /// Fallthrough feasibility (spec §4.C1).
    pub fn can_fall_through(&self, a: &BbHandle, b: &BbHandle) -> bool {
        if a.function_index != b.function_index || a.range_index != b.range_index {
            return false;
        }
        if a.bb_index > b.bb_index {
            return false;
        }
        let range = &self.maps[a.function_index].ranges[a.range_index];
        range
            .entries
            .iter()
            .filter(|e| (e.id as usize) >= a.bb_index && (e.id as usize) < b.bb_index)
            .all(|e| {
                e.metadata
                    .contains(crate::core::bb_addr_map::BbMetadata::CAN_FALL_THROUGH)
            })
    }

    /// Flat -> triple handle conversion (spec §4.C1 "Flat<->triple
    /// conversion").
    pub fn from_flat(&self, flat: &FlatBbHandle) -> Option<BbHandle> {
        let map = self.maps.get(flat.function_index)?;
        let mut remaining = flat.flat_bb_index;
        for (range_index, range) in map.ranges.iter().enumerate() {
            if remaining < range.entries.len() {
                let bb_index = range.entries[remaining].id as usize;
                return Some(BbHandle {
                    function_index: flat.function_index,
                    range_index,
                    bb_index,
                });
            }
            remaining -= range.entries.len();
        }
        None
    }

    pub fn to_flat(&self, h: &BbHandle) -> Option<FlatBbHandle> {
        let map = self.maps.get(h.function_index)?;
        let mut flat_bb_index = 0usize;
        for (range_index, range) in map.ranges.iter().enumerate() {
            if range_index == h.range_index {
                let pos = range.entries.iter().position(|e| e.id as usize == h.bb_index)?;
                return Some(FlatBbHandle {
                    function_index: h.function_index,
                    flat_bb_index: flat_bb_index + pos,
                });
            }
            flat_bb_index += range.entries.len();
        }
        None
    }

    /// Call classification (spec §4.C1 "Call/return classification").
    pub fn is_call(&self, to: &BbHandle, to_addr: u64) -> bool {
        to.range_index == 0 && to.bb_index == 0 && to_addr == self.address(to)
    }

    /// Return classification. `from` is `None` when the source block is
    /// unknown (e.g. an indirect jump table entry).
    pub fn is_return(&self, from: Option<&BbHandle>, to: &BbHandle, to_addr: u64) -> bool {
        if self.address(to) != to_addr {
            return true;
        }
        if to.range_index != 0 || to.bb_index != 0 {
            return match from {
                None => true,
                Some(f) => self.has_return(f),
            };
        }
        false
    }
}

/// Backs the frequency aggregator's fallthrough inference (spec §4.C2
/// "Single unconditional-terminator blocks use the block range computed
/// in §4.C3") once C1 has built the mapper.
impl BlockLookup for AddressMapper {
    fn containing_block(&self, addr: u64) -> Option<(u64, u64, bool)> {
        let h = self.find(addr, Direction::From)?;
        Some((
            self.address(&h),
            self.end_address(&h),
            self.can_fall_through_flag(&h),
        ))
    }

    fn next_block_start(&self, block_end: u64) -> Option<u64> {
        let h = self.find(block_end, Direction::To)?;
        if self.address(&h) == block_end {
            // Blocks are contiguous: `h` already starts at `block_end`.
            return Some(block_end);
        }
        // `h` ends exactly at `block_end` with a gap before the next
        // block (e.g. alignment padding); the next block, if any,
        // immediately follows `h` in address order within the function.
        let idx = self.bb_handles.iter().position(|x| *x == h)?;
        let next = self.bb_handles.get(idx + 1)?;
        if next.function_index == h.function_index {
            Some(self.address(next))
        } else {
            None
        }
    }
}

fn select_functions(input: &AddressMapperInput<'_>, stats: &mut PropellerStats) -> Vec<usize> {
    let mut candidates: Vec<usize> = Vec::new();

    'outer: for (function_index, map) in input.maps.iter().enumerate() {
        if let Some(hot) = input.hot_addresses {
            let mut any_hot = false;
            for range in &map.ranges {
                if let Some((start, end)) = range.covered_interval() {
                    if hot.iter().any(|&a| a >= start && a < end) {
                        any_hot = true;
                        break;
                    }
                }
            }
            if !any_hot {
                continue 'outer;
            }
        }

        let info = &input.function_info[function_index];
        if info.aliases.is_empty() {
            continue;
        }

        if input.require_text_section
            && info.section_name != ".text"
            && !info.section_name.starts_with(".text.")
        {
            continue;
        }

        candidates.push(function_index);
    }

    apply_collision_rule(candidates, input, stats)
}

fn bb_structure(map: &BbAddrMapEntry) -> Vec<(u64, u64)> {
    map.ranges
        .iter()
        .flat_map(|r| r.entries.iter().map(|e| (e.offset, e.size)))
        .collect()
}

fn apply_collision_rule(
    candidates: Vec<usize>,
    input: &AddressMapperInput<'_>,
    stats: &mut PropellerStats,
) -> Vec<usize> {
    // Group candidates by every alias name they carry.
    let mut by_alias: HashMap<&str, Vec<usize>> = HashMap::new();
    for &idx in &candidates {
        for alias in &input.function_info[idx].aliases {
            by_alias.entry(alias.as_str()).or_default().push(idx);
        }
    }

    let mut dropped: std::collections::HashSet<usize> = std::collections::HashSet::new();
    let mut kept_unique: std::collections::HashSet<usize> = std::collections::HashSet::new();

    for group in by_alias.values() {
        if group.len() <= 1 {
            continue;
        }
        let mut uniq = group.clone();
        uniq.sort_unstable();
        uniq.dedup();
        if uniq.len() <= 1 {
            continue;
        }

        let all_unique_linkage = uniq
            .iter()
            .all(|&idx| input.function_info[idx].aliases.iter().any(|a| a.contains(".__uniq.")));
        let first_structure = bb_structure(&input.maps[uniq[0]]);
        let same_structure = uniq.iter().all(|&idx| bb_structure(&input.maps[idx]) == first_structure);

        if all_unique_linkage && same_structure {
            let keep = *uniq.iter().min().unwrap();
            if kept_unique.insert(keep) {
                stats.duplicate_symbols += (uniq.len() - 1) as u64;
            }
            for &idx in &uniq {
                if idx != keep {
                    dropped.insert(idx);
                }
            }
        } else {
            for &idx in &uniq {
                dropped.insert(idx);
            }
        }
    }

    candidates.into_iter().filter(|i| !dropped.contains(i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bb_addr_map::{BbEntry, BbMetadata, BbRange};

    fn single_range_map(function_address: u64, entries: Vec<BbEntry>) -> BbAddrMapEntry {
        BbAddrMapEntry {
            function_address,
            ranges: vec![BbRange {
                base_address: function_address,
                entries,
            }],
        }
    }

    fn info(name: &str) -> FunctionInfo {
        FunctionInfo {
            aliases: vec![name.to_string()],
            section_name: ".text".to_string(),
        }
    }

    #[test]
    fn zero_sized_block_disambiguation_scenario_4() {
        // spec §8 scenario 4.
        let map = single_range_map(
            0x10,
            vec![
                BbEntry {
                    id: 0,
                    offset: 0,
                    size: 0,
                    metadata: BbMetadata::empty(),
                },
                BbEntry {
                    id: 1,
                    offset: 0,
                    size: 0,
                    metadata: BbMetadata::empty(),
                },
                BbEntry {
                    id: 2,
                    offset: 0,
                    size: 6,
                    metadata: BbMetadata::empty(),
                },
            ],
        );
        let maps = vec![map];
        let function_info = vec![info("foo")];
        let mut stats = PropellerStats::default();
        let mapper = AddressMapper::build(
            AddressMapperInput {
                maps: &maps,
                function_info: &function_info,
                hot_addresses: None,
                require_text_section: false,
            },
            &mut stats,
        );

        let to_handle = mapper.find(0x1a, Direction::To).unwrap();
        assert_eq!(to_handle.bb_index, 0);

        let from_handle = mapper.find(0x1a, Direction::From).unwrap();
        assert_eq!(from_handle.bb_index, 2);
    }

    #[test]
    fn duplicate_unique_linkage_keeps_one_copy() {
        // spec §8 scenario 3.
        let name = "foo.__uniq.148988607218547176184555965669372770545";
        let entries = vec![BbEntry {
            id: 0,
            offset: 0,
            size: 4,
            metadata: BbMetadata::empty(),
        }];
        let maps = vec![single_range_map(0x2000, entries.clone()), single_range_map(0x3000, entries)];
        let function_info = vec![info(name), info(name)];
        let mut stats = PropellerStats::default();
        let mapper = AddressMapper::build(
            AddressMapperInput {
                maps: &maps,
                function_info: &function_info,
                hot_addresses: None,
                require_text_section: false,
            },
            &mut stats,
        );
        assert_eq!(mapper.selected_functions.len(), 1);
        assert_eq!(stats.duplicate_symbols, 1);
    }

    #[test]
    fn fallthrough_feasibility_checks_each_intermediate_block() {
        let map = single_range_map(
            0x1000,
            vec![
                BbEntry {
                    id: 0,
                    offset: 0,
                    size: 4,
                    metadata: BbMetadata::CAN_FALL_THROUGH,
                },
                BbEntry {
                    id: 1,
                    offset: 4,
                    size: 4,
                    metadata: BbMetadata::empty(),
                },
                BbEntry {
                    id: 2,
                    offset: 8,
                    size: 4,
                    metadata: BbMetadata::CAN_FALL_THROUGH,
                },
            ],
        );
        let maps = vec![map];
        let function_info = vec![info("foo")];
        let mut stats = PropellerStats::default();
        let mapper = AddressMapper::build(
            AddressMapperInput {
                maps: &maps,
                function_info: &function_info,
                hot_addresses: None,
                require_text_section: false,
            },
            &mut stats,
        );
        let a = BbHandle {
            function_index: 0,
            range_index: 0,
            bb_index: 0,
        };
        let b = BbHandle {
            function_index: 0,
            range_index: 0,
            bb_index: 2,
        };
        assert!(!mapper.can_fall_through(&a, &b));
        let c = BbHandle {
            function_index: 0,
            range_index: 0,
            bb_index: 1,
        };
        assert!(mapper.can_fall_through(&a, &c));
    }
}
