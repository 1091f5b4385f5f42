//! Run statistics and non-fatal diagnostics (spec §7 error handling
//! design, §6 `propeller-print-stats`).
//!
//! Grounded on the teacher's `error::AnalysisBudget` bookkeeping-struct
//! pattern: a plain data struct of counters, accumulated as the pipeline
//! runs and printed at the end when `propeller-print-stats` is set.

use serde::{Deserialize, Serialize};

/// Counters and accumulated warnings for one layout run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropellerStats {
    /// Unique-linkage duplicate function symbols collapsed to one copy
    /// (spec §8 scenario 3).
    pub duplicate_symbols: u64,
    /// Fallthrough records rejected because an intermediate block lacked
    /// `can_fall_through`, or because the fallthrough spanned too many
    /// blocks (spec §4.C1).
    pub dropped_fallthroughs: u64,
    /// Branch/fallthrough records successfully applied to some CFG.
    pub profiles_applied: u64,
    /// Branch/fallthrough records skipped (mismatched output file,
    /// missing symbol after deferred resolution, or no matching edge).
    pub profiles_skipped: u64,
    /// CFGs discarded due to a fatal per-CFG error during the parallel
    /// build (spec §7 "Propagation").
    pub discarded_cfgs: u64,
    /// Free-form warning messages, in emission order.
    pub warnings: Vec<String>,
}

impl PropellerStats {
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.warnings.push(message);
    }

    /// `NoProfileUsable` check (spec §7): zero branch or fallthrough
    /// records were ever applied.
    pub fn no_profile_usable(&self) -> bool {
        self.profiles_applied == 0
    }
}
