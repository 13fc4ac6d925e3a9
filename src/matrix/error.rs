//! Matrix error types

use thiserror::Error;

/// Matrix declaration and lookup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatrixError {
    /// Two axes declared with the same name
    #[error("duplicate axis: {0}")]
    DuplicateAxis(String),

    /// Axis declared with an empty name
    #[error("axis name must not be empty")]
    EmptyAxisName,

    /// Test case has no assignment for the requested axis
    #[error("test case has no value for axis {0}")]
    MissingAxis(String),
}

/// Result type for matrix operations
pub type MatrixResult<T> = Result<T, MatrixError>;
