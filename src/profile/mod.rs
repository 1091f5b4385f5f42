//! Profile ingestion (spec §4.C2 Branch Aggregator, §6 "Inputs" #2/#3).

pub mod aggregator;
pub mod legacy_text;

pub use aggregator::{
    aggregate_branch_frequencies, aggregate_taken_branches, BlockLookup, BranchAggregation,
    BranchFrequencies,
};
pub use legacy_text::{BranchRecord, BranchTag, FallthroughRecord, LegacyProfile};
