//! compat-matrix - version-matrixed compatibility test harness
//!
//! Features:
//! - Lazy Cartesian expansion of version axes into test cases
//! - Per-case service lifecycle with dependency-ordered start and guaranteed teardown
//! - Bounded parallel execution over a shared pool of test-bed nodes
//! - One outcome per case, reported in generation order

pub mod catalog;
pub mod config;
pub mod executor;
pub mod lifecycle;
pub mod matrix;
pub mod report;
pub mod runner;
pub mod service;
pub mod version;

pub use config::HarnessConfig;
pub use executor::{CaseContext, CaseError, CaseResult, TestBody, TestDefinition};
pub use matrix::{Matrix, TestCase};
pub use report::{TestOutcome, TestReport};
pub use runner::SuiteRunner;
pub use version::Version;
