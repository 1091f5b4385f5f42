//! Error types for the Propeller code-layout pipeline.
//!
//! The taxonomy below follows the pipeline's own error handling design: a
//! handful of variants distinguish fatal failures (the driver should stop
//! and report non-zero) from the non-fatal ones that are recorded in
//! [`crate::stats::PropellerStats`] and logged as warnings while the rest
//! of the run proceeds.

use thiserror::Error;

/// Main error type for Propeller operations.
#[derive(Debug, Error)]
pub enum PropellerError {
    /// A profile record is syntactically invalid: a bad ordinal, a
    /// malformed size field, an unparsable name. Fatal.
    #[error("malformed profile at {context}: {message}")]
    ProfileMalformed { context: String, message: String },

    /// The profile's `@` output-file directive does not match the binary
    /// being laid out. Non-fatal: the profile is ignored.
    #[error("profile output-file mismatch: expected {expected}, got {actual}")]
    ProfileMismatch { expected: String, actual: String },

    /// A profile referenced a function ordinal that was never defined.
    #[error("profile references undefined ordinal {ordinal} ({context})")]
    MissingSymbol { ordinal: u64, context: String },

    /// A perf mmap build-id did not match any binary build-id; the
    /// sample set is skipped.
    #[error("build-id mismatch: sample build-id {sample} has no matching binary")]
    BuildIdMismatch { sample: String },

    /// No branch or fallthrough records were applied to any CFG.
    #[error("no usable profile records were applied")]
    NoProfileUsable,

    /// A structural invariant inside the address mapper or chain builder
    /// was violated. Always fatal; these indicate a bug, not bad input.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    /// Errors surfaced while decoding an ELF input (sections, symbols,
    /// relocations, the `LLVM_BB_ADDR_MAP` section).
    #[error("ELF decode error: {0}")]
    Elf(String),

    /// File I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error not covered by a more specific variant.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for Propeller operations.
pub type Result<T> = std::result::Result<T, PropellerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PropellerError::MissingSymbol {
            ordinal: 14,
            context: "branch record".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "profile references undefined ordinal 14 (branch record)"
        );

        let err = PropellerError::ProfileMismatch {
            expected: "a.out".to_string(),
            actual: "b.out".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "profile output-file mismatch: expected a.out, got b.out"
        );
    }

    #[test]
    fn test_io_error_converts_via_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PropellerError = io_err.into();
        assert!(matches!(err, PropellerError::Io(_)));
    }
}
