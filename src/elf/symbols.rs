//! Function symbol extraction from an ELF object (spec §4.C1 "Selection
//! policy").
//!
//! Grounded on the teacher's `formats::elf::symbols::SymbolTable` (by-name
//! / by-address indices) and `analysis::cfg::parse_function_seeds`'s use
//! of `object::ObjectSymbol`, simplified to what the address mapper
//! needs: one function symbol record per defined text symbol, with every
//! alias sharing an address grouped together.

use std::collections::BTreeMap;

use object::{Object, ObjectSymbol, SymbolKind};

/// A defined function symbol as seen in the ELF symbol table, before
/// alias grouping.
#[derive(Debug, Clone)]
pub struct ElfFunctionSymbol {
    pub name: String,
    pub address: u64,
    pub size: u64,
}

/// Collects every defined `SymbolKind::Text` symbol, grouped by address
/// so weak aliases of the same function are easy to merge (spec §4.C1
/// point 4, the `.__uniq.` duplicate-handling rule).
pub fn function_symbols_by_address(
    object_file: &object::File<'_>,
) -> BTreeMap<u64, Vec<ElfFunctionSymbol>> {
    let mut by_address: BTreeMap<u64, Vec<ElfFunctionSymbol>> = BTreeMap::new();
    for sym in object_file.symbols() {
        if !sym.is_definition() || sym.kind() != SymbolKind::Text {
            continue;
        }
        let Ok(name) = sym.name() else { continue };
        if name.is_empty() {
            continue;
        }
        by_address.entry(sym.address()).or_default().push(ElfFunctionSymbol {
            name: name.to_string(),
            address: sym.address(),
            size: sym.size(),
        });
    }
    by_address
}
