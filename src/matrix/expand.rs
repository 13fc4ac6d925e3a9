//! Lazy Cartesian product over matrix axes

use std::iter::FusedIterator;

use super::axis::Axis;
use super::case::{Assignment, TestCase};

/// Iterator over the cases of a matrix
///
/// Holds one index per axis and advances them like an odometer, last axis
/// fastest. Only the case being returned is materialized.
#[derive(Debug, Clone)]
pub struct Expansion<'a> {
    axes: &'a [Axis],
    indices: Vec<usize>,
    next_ordinal: usize,
    total: Option<usize>,
    done: bool,
}

impl<'a> Expansion<'a> {
    pub(crate) fn new(axes: &'a [Axis], total: Option<usize>) -> Self {
        Self {
            axes,
            indices: vec![0; axes.len()],
            next_ordinal: 0,
            total,
            done: axes.iter().any(Axis::is_empty),
        }
    }

    fn current(&self) -> TestCase {
        let assignments = self
            .axes
            .iter()
            .zip(&self.indices)
            .map(|(axis, &i)| Assignment {
                axis: axis.name().to_string(),
                value: axis.values()[i].clone(),
            })
            .collect();
        TestCase {
            ordinal: self.next_ordinal,
            assignments,
        }
    }

    fn advance(&mut self) {
        for pos in (0..self.axes.len()).rev() {
            self.indices[pos] += 1;
            if self.indices[pos] < self.axes[pos].len() {
                return;
            }
            self.indices[pos] = 0;
        }
        // Every axis wrapped (or there are no axes): product exhausted
        self.done = true;
    }
}

impl Iterator for Expansion<'_> {
    type Item = TestCase;

    fn next(&mut self) -> Option<TestCase> {
        if self.done {
            return None;
        }
        let case = self.current();
        self.next_ordinal += 1;
        self.advance();
        Some(case)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        match self.total {
            Some(total) => {
                let remaining = total - self.next_ordinal;
                (remaining, Some(remaining))
            }
            None => (usize::MAX, None),
        }
    }
}

impl FusedIterator for Expansion<'_> {}
