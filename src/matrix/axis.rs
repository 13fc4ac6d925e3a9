//! Axis and matrix declarations

use super::error::{MatrixError, MatrixResult};
use super::expand::Expansion;

/// Named dimension of variation with ordered candidate values
///
/// Duplicate values are kept: listing a value twice runs that
/// configuration twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axis {
    name: String,
    values: Vec<String>,
}

impl Axis {
    /// Create an axis from a name and its candidate values
    pub fn new<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Axis name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Candidate values in declaration order
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Number of candidate values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the axis has no candidate values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Ordered set of axes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matrix {
    axes: Vec<Axis>,
}

impl Matrix {
    /// Create a matrix with no axes (expands to a single empty case)
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style axis declaration
    pub fn axis<I, V>(mut self, name: impl Into<String>, values: I) -> MatrixResult<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.push(Axis::new(name, values))?;
        Ok(self)
    }

    /// Append an axis after the existing ones
    pub fn push(&mut self, axis: Axis) -> MatrixResult<()> {
        if axis.name().is_empty() {
            return Err(MatrixError::EmptyAxisName);
        }
        if self.axes.iter().any(|a| a.name() == axis.name()) {
            return Err(MatrixError::DuplicateAxis(axis.name().to_string()));
        }
        self.axes.push(axis);
        Ok(())
    }

    /// Axes in declaration order
    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Number of cases in the full product, or `None` on overflow
    pub fn case_count(&self) -> Option<usize> {
        self.axes
            .iter()
            .try_fold(1usize, |acc, axis| acc.checked_mul(axis.len()))
    }

    /// Lazily expand the Cartesian product
    pub fn expand(&self) -> Expansion<'_> {
        Expansion::new(&self.axes, self.case_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_axis_rejected() {
        let err = Matrix::new()
            .axis("server_version", ["dev"])
            .unwrap()
            .axis("server_version", ["latest"])
            .unwrap_err();
        assert_eq!(err, MatrixError::DuplicateAxis("server_version".to_string()));
    }

    #[test]
    fn test_empty_axis_name_rejected() {
        let mut m = Matrix::new();
        assert_eq!(m.push(Axis::new("", ["x"])), Err(MatrixError::EmptyAxisName));
    }

    #[test]
    fn test_case_count() {
        let m = Matrix::new()
            .axis("a", ["1", "2", "3"])
            .unwrap()
            .axis("b", ["x", "y"])
            .unwrap();
        assert_eq!(m.case_count(), Some(6));
        assert_eq!(Matrix::new().case_count(), Some(1));

        let empty = Matrix::new().axis("a", Vec::<String>::new()).unwrap();
        assert_eq!(empty.case_count(), Some(0));
    }

    #[test]
    fn test_case_count_overflow() {
        let big: Vec<String> = (0..1 << 16).map(|i| i.to_string()).collect();
        let mut m = Matrix::new();
        for i in 0..4 {
            m.push(Axis::new(format!("axis{}", i), big.clone())).unwrap();
        }
        assert_eq!(m.case_count(), None);
    }
}
