//! Concrete test cases produced by matrix expansion

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{MatrixError, MatrixResult};

/// One axis bound to one value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub axis: String,
    pub value: String,
}

/// One combination of axis values
///
/// `ordinal` is the position in the expansion, which keeps repeated
/// combinations (duplicate axis values) distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestCase {
    pub ordinal: usize,
    pub assignments: Vec<Assignment>,
}

impl TestCase {
    /// Value assigned to `axis`, if present
    pub fn get(&self, axis: &str) -> Option<&str> {
        self.assignments
            .iter()
            .find(|a| a.axis == axis)
            .map(|a| a.value.as_str())
    }

    /// Value assigned to `axis`, or an error naming the axis
    pub fn require(&self, axis: &str) -> MatrixResult<&str> {
        self.get(axis)
            .ok_or_else(|| MatrixError::MissingAxis(axis.to_string()))
    }

    /// Stable identifier, e.g. `server_version=dev.thin_client_version=latest`
    pub fn id(&self) -> String {
        self.assignments
            .iter()
            .map(|a| format!("{}={}", a.axis, a.value))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.assignments.is_empty() {
            write!(f, "#{}", self.ordinal)
        } else {
            f.write_str(&self.id())
        }
    }
}
