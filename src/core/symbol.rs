//! Profile symbol entries (spec §3 "Symbol entry").
//!
//! A symbol table maps the 1-based ordinals used throughout the legacy
//! textual profile format to either a function (carrying an ordered alias
//! list, first element primary) or a basic block inside one.

use serde::{Deserialize, Serialize};

/// A function symbol: one or more aliases (weak definitions collapse onto
/// the same address), ordered with the primary name first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSymbol {
    pub ordinal: u64,
    pub aliases: Vec<String>,
    pub size: u64,
}

impl FunctionSymbol {
    /// The primary (first) alias.
    pub fn primary_name(&self) -> &str {
        self.aliases
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// A basic-block symbol, holding a back-reference to its containing
/// function and its position (bb index) within the function's bb list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BbSymbol {
    pub ordinal: u64,
    pub name: String,
    pub size: u64,
    pub function_ordinal: u64,
    pub bb_index: u32,
}

/// A profile symbol table entry: either a function or one of its blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolEntry {
    Function(FunctionSymbol),
    BasicBlock(BbSymbol),
}

impl SymbolEntry {
    pub fn ordinal(&self) -> u64 {
        match self {
            SymbolEntry::Function(f) => f.ordinal,
            SymbolEntry::BasicBlock(b) => b.ordinal,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            SymbolEntry::Function(f) => f.size,
            SymbolEntry::BasicBlock(b) => b.size,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, SymbolEntry::Function(_))
    }
}
