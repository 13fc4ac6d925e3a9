//! Version matrix declaration and expansion
//!
//! A [`Matrix`] is an ordered list of named axes. [`Matrix::expand`] walks the
//! Cartesian product lazily, in axis declaration order and then value order,
//! so a caller that stops early never pays for the rest of the product.

pub mod axis;
pub mod case;
pub mod error;
pub mod expand;

pub use axis::{Axis, Matrix};
pub use case::{Assignment, TestCase};
pub use error::{MatrixError, MatrixResult};
pub use expand::Expansion;
