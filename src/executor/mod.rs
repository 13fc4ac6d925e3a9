//! Test case execution
//!
//! A [`TestDefinition`] pairs a version matrix with a [`CaseTemplate`] that
//! turns axis values into service descriptors and a [`TestBody`] that runs
//! against the provisioned services. [`CaseExecutor`] runs one case and
//! converts whatever happens into an outcome.

pub mod case;
pub mod context;
pub mod definition;
pub mod error;

pub use case::{dependency_order, CaseExecutor};
pub use context::CaseContext;
pub use definition::{CaseTemplate, TestBody, TestDefinition};
pub use error::{CaseError, CaseResult};
