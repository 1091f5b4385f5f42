//! ELF input adapter (spec §6 "Inputs" #1, SPEC_FULL.md §2).
//!
//! Spec §1 treats raw ELF/DWARF parsing as an external collaborator, but
//! §6 specifies the `LLVM_BB_ADDR_MAP` section's wire contract in enough
//! detail to justify a thin, concrete decoder here. Built on the `object`
//! crate the same way `analysis::cfg::parse_exec_regions` in the teacher
//! repo opens a binary and enumerates its sections/symbols — no
//! hand-rolled header parsing, no DWARF.

pub mod bb_addr_map;
pub mod relocations;
pub mod symbols;

use object::{Object, ObjectSection};

use crate::error::{PropellerError, Result};

/// The section name LLVM emits the basic-block address map under.
pub const BB_ADDR_MAP_SECTION: &str = ".llvm_bb_addr_map";

/// One parsed ELF input, wrapping `object::File` with the narrow set of
/// accessors Propeller's pipeline needs.
pub struct ElfInput<'data> {
    pub ordinal: usize,
    object: object::File<'data>,
}

impl<'data> ElfInput<'data> {
    /// Parses `data` as an ELF object. `ordinal` is this object's position
    /// in command-line order, used to break weak-symbol ties (spec §5
    /// "Ordering guarantees").
    pub fn parse(data: &'data [u8], ordinal: usize) -> Result<Self> {
        let object = object::File::parse(data).map_err(|e| PropellerError::Elf(e.to_string()))?;
        Ok(ElfInput { ordinal, object })
    }

    pub fn inner(&self) -> &object::File<'data> {
        &self.object
    }

    /// Raw bytes of the `.llvm_bb_addr_map` section, if present.
    pub fn bb_addr_map_bytes(&self) -> Option<&'data [u8]> {
        let section = self.object.section_by_name(BB_ADDR_MAP_SECTION)?;
        section.data().ok()
    }

    /// Build-id, used to validate perf mmap records against this binary
    /// (spec §7 `BuildIdMismatch`).
    pub fn build_id(&self) -> Option<Vec<u8>> {
        self.object.build_id().ok().flatten().map(|b| b.to_vec())
    }
}
