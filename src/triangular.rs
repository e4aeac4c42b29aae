//! Forward and back substitution for triangular systems.

use nalgebra::{DMatrix, DVector};

use crate::error::{EigenError, Result};
use crate::scalar::{Scalar, EPS};

/// Solves `U·x = b` (upper triangular) or `L·x = b` (lower triangular).
///
/// Only the relevant triangle of the factor is read. Scratch space is
/// allocated per call, so one solver may be shared freely.
#[derive(Clone, Copy, Debug)]
pub struct TriangularSolver {
    check_singular: bool,
}

impl Default for TriangularSolver {
    fn default() -> Self {
        Self {
            check_singular: true,
        }
    }
}

impl TriangularSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// When disabled, zero pivots are not reported and produce non-finite
    /// entries in the solution instead.
    pub fn check_singular(mut self, check_singular: bool) -> Self {
        self.check_singular = check_singular;
        self
    }

    fn check_factor<T: Scalar>(&self, factor: &DMatrix<T>, rhs_rows: usize) -> Result<()> {
        let n = factor.nrows();
        if !factor.is_square() {
            return Err(EigenError::not_square(n, factor.ncols()));
        }
        if rhs_rows != n {
            return Err(EigenError::Shape {
                expected: (n, 1),
                got: (rhs_rows, 1),
            });
        }
        if !self.check_singular || n == 0 {
            return Ok(());
        }

        let max_pivot = (0..n)
            .map(|i| factor[(i, i)].modulus())
            .fold(0.0, f64::max);
        let tol = n as f64 * EPS * max_pivot;
        for i in 0..n {
            let pivot = factor[(i, i)].modulus();
            if pivot == 0.0 || pivot <= tol {
                return Err(EigenError::SingularMatrix { index: i });
            }
        }
        Ok(())
    }

    /// Solves `U·x = b` for upper triangular `U`.
    pub fn solve_upper<T: Scalar>(&self, u: &DMatrix<T>, b: &DVector<T>) -> Result<DVector<T>> {
        self.check_factor(u, b.len())?;
        let mut x = b.clone();
        back_substitute(u, x.as_mut_slice());
        Ok(x)
    }

    /// Solves `U·X = B` for upper triangular `U`, column by column.
    pub fn solve_upper_matrix<T: Scalar>(
        &self,
        u: &DMatrix<T>,
        b: &DMatrix<T>,
    ) -> Result<DMatrix<T>> {
        self.check_factor(u, b.nrows())?;
        let mut x = b.clone();
        for mut col in x.column_iter_mut() {
            back_substitute(u, col.as_mut_slice());
        }
        Ok(x)
    }

    /// Solves `L·x = b` for lower triangular `L`.
    pub fn solve_lower<T: Scalar>(&self, l: &DMatrix<T>, b: &DVector<T>) -> Result<DVector<T>> {
        self.check_factor(l, b.len())?;
        let mut x = b.clone();
        forward_substitute(l, x.as_mut_slice());
        Ok(x)
    }

    /// Solves `L·X = B` for lower triangular `L`, column by column.
    pub fn solve_lower_matrix<T: Scalar>(
        &self,
        l: &DMatrix<T>,
        b: &DMatrix<T>,
    ) -> Result<DMatrix<T>> {
        self.check_factor(l, b.nrows())?;
        let mut x = b.clone();
        for mut col in x.column_iter_mut() {
            forward_substitute(l, col.as_mut_slice());
        }
        Ok(x)
    }
}

/// Overwrites `x` (holding `b`) with the solution of `U·x = b`.
fn back_substitute<T: Scalar>(u: &DMatrix<T>, x: &mut [T]) {
    let n = x.len();
    for i in (0..n).rev() {
        let mut sum = x[i];
        for k in (i + 1)..n {
            sum -= u[(i, k)] * x[k];
        }
        x[i] = sum / u[(i, i)];
    }
}

/// Overwrites `x` (holding `b`) with the solution of `L·x = b`.
fn forward_substitute<T: Scalar>(l: &DMatrix<T>, x: &mut [T]) {
    let n = x.len();
    for i in 0..n {
        let mut sum = x[i];
        for k in 0..i {
            sum -= l[(i, k)] * x[k];
        }
        x[i] = sum / l[(i, i)];
    }
}
