//! Error types for balancing and eigen-extraction.

use thiserror::Error;

/// Result type alias using [`EigenError`].
pub type Result<T> = std::result::Result<T, EigenError>;

/// Errors raised while balancing a matrix or extracting its eigenpairs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EigenError {
    /// A matrix (or right-hand side) did not have the required shape.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    Shape {
        /// Expected `(rows, cols)`
        expected: (usize, usize),
        /// Actual `(rows, cols)`
        got: (usize, usize),
    },

    /// A triangular solve hit a zero (or negligible) pivot.
    #[error("Matrix is singular: negligible pivot at diagonal index {index}")]
    SingularMatrix {
        /// Diagonal index of the offending pivot
        index: usize,
    },

    /// Balancing encountered a value it cannot work with.
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// An accessor was called before the decomposition ran.
    #[error("Illegal state: {0}")]
    IllegalState(&'static str),

    /// The input matrix contains NaN or infinite entries.
    #[error("Matrix contains non-finite entries")]
    NonFinite,

    /// The iterative Schur reduction ran out of its iteration budget.
    #[error("Schur decomposition failed to converge in {iterations} iterations")]
    NoConvergence {
        /// Number of iterations performed
        iterations: usize,
    },
}

impl EigenError {
    pub(crate) fn not_square(rows: usize, cols: usize) -> Self {
        let n = rows.max(cols);
        EigenError::Shape {
            expected: (n, n),
            got: (rows, cols),
        }
    }
}

/// Fails with [`EigenError::Shape`] unless the dimensions describe a square matrix.
pub(crate) fn ensure_square(shape: (usize, usize)) -> Result<()> {
    if shape.0 == shape.1 {
        Ok(())
    } else {
        Err(EigenError::not_square(shape.0, shape.1))
    }
}
