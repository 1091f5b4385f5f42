//! Relocation scanning for CFG edge creation (spec §4.C3 "Edge
//! creation").
//!
//! Grounded on the teacher's hand-rolled `formats::elf::relocations`
//! (`RelocationTable::parse`), but built directly on the `object` crate's
//! section-relocation iterator the way `analysis::cfg` already does,
//! since Propeller only needs `(from_address, to_symbol_address)` pairs,
//! not a general-purpose relocation table.

use object::{Object, ObjectSection, ObjectSymbol, RelocationTarget};

/// One relocation inside a bb-mapped section: the address of the
/// relocated site and the resolved address of its target, when the
/// target symbol's address could be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRelocation {
    pub from_address: u64,
    pub to_address: u64,
}

/// Scans every relocation in `section`, resolving symbol targets to
/// addresses via `object_file`'s symbol table.
pub fn scan_section(
    object_file: &object::File<'_>,
    section: &object::Section<'_, '_>,
) -> Vec<ResolvedRelocation> {
    let base = section.address();
    let mut out = Vec::new();
    for (offset, reloc) in section.relocations() {
        let target_addr = match reloc.target() {
            RelocationTarget::Symbol(idx) => object_file
                .symbol_by_index(idx)
                .ok()
                .map(|s| s.address().wrapping_add(reloc.addend() as u64)),
            RelocationTarget::Section(_) => None,
            RelocationTarget::Absolute => Some(reloc.addend() as u64),
            _ => None,
        };
        if let Some(to_address) = target_addr {
            out.push(ResolvedRelocation {
                from_address: base + offset,
                to_address,
            });
        }
    }
    out
}
