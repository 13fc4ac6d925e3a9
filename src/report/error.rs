//! Reporter error types

use thiserror::Error;

/// Reporter bookkeeping errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    /// A case already has its outcome
    #[error("duplicate outcome for {test}[{case}]")]
    DuplicateSubmission { test: String, case: String },

    /// Slot was never reserved
    #[error("slot {slot} out of range ({len} reserved)")]
    OutOfRange { slot: usize, len: usize },

    /// Report requested while cases are still outstanding
    #[error("{missing} of {total} cases have no outcome")]
    Incomplete { missing: usize, total: usize },
}

/// Result type for reporter operations
pub type ReportResult<T> = Result<T, ReportError>;
