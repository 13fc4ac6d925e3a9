//! Suite execution: concurrency, abort and fail-fast

pub mod abort;
pub mod suite;

pub use abort::{AbortListener, AbortReason, AbortSignal};
pub use suite::SuiteRunner;
