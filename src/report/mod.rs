//! Result reporting
//!
//! The [`Reporter`] accepts outcomes from concurrently running cases and
//! produces a [`TestReport`] once every reserved case has one.

pub mod error;
pub mod outcome;
pub mod reporter;
pub mod summary;

pub use error::{ReportError, ReportResult};
pub use outcome::{CaseRecord, OutcomeKind, TestOutcome};
pub use reporter::{Reporter, SlotId};
pub use summary::{Summary, TestReport, EXIT_ALL_PASSED, EXIT_NOT_ALL_PASSED, EXIT_USAGE};
