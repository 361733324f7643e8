//! Built-in kernels.

use super::builder::NestBuilder;
use super::expr::Range;
use super::fragment::{Fragment, Reduction};
use crate::utils::errors::IrError;
use std::fmt;

/// Kernels that can be built without an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    Matmul,
    Scale,
    Stencil,
}

impl Kernel {
    pub fn build(self, size: i64) -> Result<Fragment, IrError> {
        match self {
            Kernel::Matmul => matmul(size),
            Kernel::Scale => scale(size),
            Kernel::Stencil => stencil(size),
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kernel::Matmul => write!(f, "matmul"),
            Kernel::Scale => write!(f, "scale"),
            Kernel::Stencil => write!(f, "stencil"),
        }
    }
}

/// `C[i, j] += A[i, k] * B[k, j]` as levels `[i, j]` and `[k]`.
pub fn matmul(n: i64) -> Result<Fragment, IrError> {
    NestBuilder::new("matmul")
        .array("A", vec![n, n])
        .array("B", vec![n, n])
        .array("C", vec![n, n])
        .level(&[("i", Range::span(0, n)), ("j", Range::span(0, n))])
        .level(&[("k", Range::span(0, n))])
        .read("A", "a", "i, k")
        .read("B", "b", "k, j")
        .write("C", "c", "i, j", Some(Reduction::Sum))
        .tasklet("mult", "c = a * b")
        .build()
}

/// `B[i] = alpha * A[i]`.
pub fn scale(n: i64) -> Result<Fragment, IrError> {
    NestBuilder::new("scale")
        .scalar("alpha")
        .array("A", vec![n])
        .array("B", vec![n])
        .level(&[("i", Range::span(0, n))])
        .read("alpha", "s", "")
        .read("A", "a", "i")
        .write("B", "b", "i", None)
        .tasklet("scale", "b = s * a")
        .build()
}

/// Three-point stencil along the rows of an `n x n` grid.
pub fn stencil(n: i64) -> Result<Fragment, IrError> {
    NestBuilder::new("stencil")
        .array("A", vec![n, n])
        .array("B", vec![n, n])
        .level(&[("i", Range::span(0, n)), ("j", Range::span(1, n - 1))])
        .read("A", "w", "i, j - 1")
        .read("A", "c", "i, j")
        .read("A", "e", "i, j + 1")
        .write("B", "b", "i, j", None)
        .tasklet("avg", "b = (w + c + e) / 3")
        .build()
}
