//! Test case error types

use thiserror::Error;

use crate::lifecycle::{LifecycleError, ProvisionError};
use crate::matrix::MatrixError;
use crate::report::TestOutcome;
use crate::version::VersionError;

/// What a template or test body can fail with
#[derive(Error, Debug)]
pub enum CaseError {
    /// The compatibility check itself failed
    #[error("{0}")]
    Assertion(String),

    /// Application under test crashed or raised
    #[error("application raised: {0}")]
    Application(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    /// Case lacks an axis the template reads
    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error(transparent)]
    Version(#[from] VersionError),
}

impl CaseError {
    /// Classify as FAIL (assertion) or ERROR (everything else)
    pub fn into_outcome(self) -> TestOutcome {
        match self {
            CaseError::Assertion(reason) => TestOutcome::fail(reason),
            CaseError::Application(message) => TestOutcome::error("application", message),
            CaseError::Lifecycle(LifecycleError::Provision(e)) | CaseError::Provision(e) => {
                TestOutcome::error("provision", e.to_string())
            }
            CaseError::Lifecycle(e) => TestOutcome::error(e.kind(), e.to_string()),
            CaseError::Matrix(e) => TestOutcome::error("declaration", e.to_string()),
            CaseError::Version(e) => TestOutcome::error("declaration", e.to_string()),
        }
    }
}

/// Result type for test bodies
pub type CaseResult<T> = Result<T, CaseError>;
