//! Decoder for the `SHT_LLVM_BB_ADDR_MAP` section contents (spec §6
//! "Inputs" #1, §3 "BB address map entry").
//!
//! The section is a sequence of per-function records, each ULEB128-coded:
//! a version/feature byte pair, the function's entry address, the number
//! of address ranges, then per range a base address, a block count, and
//! per block an id/offset/size/metadata tuple. This mirrors the shape
//! spec §3 describes; it is not a byte-for-byte reimplementation of
//! upstream LLVM's encoder (out of scope per spec §1 — DWARF/full ELF
//! parsing are external collaborators), but every field it produces is
//! the one the rest of the pipeline needs.

use crate::core::bb_addr_map::{BbAddrMapEntry, BbEntry, BbMetadata, BbRange};
use crate::error::{PropellerError, Result};

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_u8(&mut self) -> Result<u8> {
        if self.remaining() < 1 {
            return Err(PropellerError::Elf(
                "truncated bb address map: expected u8".to_string(),
            ));
        }
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    /// Unsigned LEB128, as used throughout LLVM's wire formats.
    fn read_uleb128(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift < 64 {
                result |= ((byte & 0x7f) as u64) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 {
                break;
            }
            if shift >= 70 {
                return Err(PropellerError::Elf("ULEB128 overflow".to_string()));
            }
        }
        Ok(result)
    }
}

/// Decodes every function record in a `.llvm_bb_addr_map` section.
pub fn decode(data: &[u8]) -> Result<Vec<BbAddrMapEntry>> {
    let mut cursor = Cursor::new(data);
    let mut entries = Vec::new();
    while cursor.remaining() > 0 {
        entries.push(decode_function(&mut cursor)?);
    }
    Ok(entries)
}

fn decode_function(cursor: &mut Cursor<'_>) -> Result<BbAddrMapEntry> {
    let _version = cursor.read_u8()?;
    let _feature = cursor.read_u8()?;
    let function_address = cursor.read_uleb128()?;
    let num_ranges = cursor.read_uleb128()?;
    let mut ranges = Vec::with_capacity(num_ranges as usize);
    for _ in 0..num_ranges {
        ranges.push(decode_range(cursor)?);
    }
    Ok(BbAddrMapEntry {
        function_address,
        ranges,
    })
}

fn decode_range(cursor: &mut Cursor<'_>) -> Result<BbRange> {
    let base_address = cursor.read_uleb128()?;
    let num_blocks = cursor.read_uleb128()?;
    let mut entries = Vec::with_capacity(num_blocks as usize);
    for _ in 0..num_blocks {
        let id = cursor.read_uleb128()? as u32;
        let offset = cursor.read_uleb128()?;
        let size = cursor.read_uleb128()?;
        let raw_metadata = cursor.read_uleb128()?;
        let metadata = BbMetadata::from_bits_truncate(raw_metadata as u8);
        entries.push(BbEntry {
            id,
            offset,
            size,
            metadata,
        });
    }
    Ok(BbRange {
        base_address,
        entries,
    })
}
