//! Eigenvalues and eigenvectors from a Schur decomposition `A = U·T·U⁻¹`.
//!
//! ```
//! use balanced_eigen::{Eigen, SchurConfig};
//! use nalgebra::DMatrix;
//!
//! let a = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, -1.0, 0.0]);
//! let pairs = Eigen::new(SchurConfig::default().seed(0)).eigenpairs(&a)?;
//! for (lambda, v) in pairs.values.iter().zip(pairs.vectors.column_iter()) {
//!     assert!((lambda.im.abs() - 1.0).abs() < 1e-12);
//!     assert!((v.norm() - 1.0).abs() < 1e-12);
//! }
//! # Ok::<(), balanced_eigen::EigenError>(())
//! ```

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::error::{ensure_square, EigenError, Result};
use crate::scalar::{is_self_adjoint, to_complex_matrix, Scalar, EPS, SAFE_MIN};
use crate::schur::{SchurConfig, SchurScalar};
use crate::triangular::TriangularSolver;

/// Eigenvalues and matching unit eigenvectors, one column per eigenvalue.
#[derive(Clone, Debug, PartialEq)]
pub struct EigenPairs {
    pub values: DVector<Complex64>,
    pub vectors: DMatrix<Complex64>,
}

/// Eigenvalues on the diagonal of the Schur factor `t`, in diagonal order.
///
/// A 2×2 diagonal block whose sub-diagonal entry is not negligible next to
/// `ε·(|tₘₘ| + |tₘ₊₁ₘ₊₁|)` contributes both of its eigenvalues.
pub fn eigenvalues_of_schur<T: Scalar>(t: &DMatrix<T>) -> Result<DVector<Complex64>> {
    ensure_square(t.shape())?;
    let n = t.nrows();
    let mut values = Vec::with_capacity(n);

    let mut m = 0;
    while m < n {
        let deflated = m == n - 1
            || t[(m + 1, m)].modulus() <= EPS * (t[(m, m)].modulus() + t[(m + 1, m + 1)].modulus());
        if deflated {
            values.push(t[(m, m)].to_complex());
            m += 1;
        } else {
            values.extend(T::eigenvalues_2x2(
                t[(m, m)],
                t[(m, m + 1)],
                t[(m + 1, m)],
                t[(m + 1, m + 1)],
            ));
            m += 2;
        }
    }
    Ok(DVector::from_vec(values))
}

/// Unit eigenvectors of the upper triangular `t`, column `j` belonging to `t[(j, j)]`.
///
/// Column `j` solves `(T[..j, ..j] − λⱼ·I)·v = −T[..j, j]` and is completed
/// with a trailing one. Pivots below `max(ε·max|tᵢⱼ|, f64::MIN_POSITIVE)` are
/// raised to that value, so repeated eigenvalues give finite (if nearly
/// parallel) vectors instead of an error.
pub fn eigenvectors_of_triangular<T: Scalar>(t: &DMatrix<T>) -> Result<DMatrix<T>> {
    puffin::profile_function!();
    ensure_square(t.shape())?;
    let n = t.nrows();
    let mut q = DMatrix::zeros(n, n);
    if n == 0 {
        return Ok(q);
    }

    let t_max = t.iter().map(|x| x.modulus()).fold(0.0, f64::max);
    let smin = (EPS * t_max).max(SAFE_MIN);
    let solver = TriangularSolver::new().check_singular(false);
    let mut perturbed = 0;

    q[(0, 0)] = T::one();
    for j in 1..n {
        let lambda = t[(j, j)];
        let mut s = DMatrix::from_fn(j, j, |r, c| if r <= c { t[(r, c)] } else { T::zero() });
        for i in 0..j {
            s[(i, i)] -= lambda;
            if s[(i, i)].modulus() < smin {
                s[(i, i)] = T::from_real(smin);
                perturbed += 1;
            }
        }
        let rhs = DVector::from_fn(j, |i, _| -t[(i, j)]);
        let v = solver.solve_upper(&s, &rhs)?;

        let mut column = q.column_mut(j);
        column.rows_mut(0, j).copy_from(&v);
        column[j] = T::one();
        column.normalize_mut();
    }

    if perturbed > 0 {
        log::debug!("raised {perturbed} negligible pivots to {smin:e} while solving for eigenvectors");
    }
    Ok(q)
}

/// Unit eigenvectors of `A = U·T·U⁻¹` from its Schur factors, `t` upper triangular.
///
/// Columns are normalized after the change of basis since `U` carries the
/// balancing scale and is not orthogonal in general.
pub fn eigenvectors_of_schur<T: Scalar>(t: &DMatrix<T>, u: &DMatrix<T>) -> Result<DMatrix<T>> {
    ensure_square(t.shape())?;
    if u.shape() != t.shape() {
        return Err(EigenError::Shape {
            expected: t.shape(),
            got: u.shape(),
        });
    }
    let q = eigenvectors_of_triangular(t)?;
    let mut vectors = u * q;
    for mut column in vectors.column_iter_mut() {
        column.normalize_mut();
    }
    Ok(vectors)
}

/// Eigen-decomposition of general square matrices.
///
/// Self-adjoint input (compared exactly) is diagonalized directly and its
/// orthonormal Schur basis returned as the eigenvectors. Anything else is
/// balanced, reduced to Schur form and run through the extractor.
#[derive(Clone, Debug, Default)]
pub struct Eigen {
    config: SchurConfig,
}

impl Eigen {
    pub fn new(config: SchurConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchurConfig {
        &self.config
    }

    /// Eigenvalues of `a`.
    ///
    /// For real non-symmetric input, complex conjugate pairs appear next to
    /// each other with the positive imaginary part first. Self-adjoint input
    /// yields real eigenvalues in ascending order.
    pub fn eigenvalues<T: SchurScalar>(&self, a: &DMatrix<T>) -> Result<DVector<Complex64>> {
        puffin::profile_function!();
        self.config.validate(a)?;
        if is_self_adjoint(a) {
            let (values, _) = T::self_adjoint_eigen(a, &self.config)?;
            return Ok(values.map(|x| Complex64::new(x, 0.0)));
        }
        let t = T::schur_factor(a, &self.config)?;
        eigenvalues_of_schur(&t)
    }

    /// Unit eigenvectors of `a`, one column per eigenvalue.
    pub fn eigenvectors<T: SchurScalar>(&self, a: &DMatrix<T>) -> Result<DMatrix<Complex64>> {
        Ok(self.eigenpairs(a)?.vectors)
    }

    /// Eigenvalues and eigenvectors of `a` from a single Schur decomposition.
    pub fn eigenpairs<T: SchurScalar>(&self, a: &DMatrix<T>) -> Result<EigenPairs> {
        puffin::profile_function!();
        self.config.validate(a)?;
        if is_self_adjoint(a) {
            let (values, u) = T::self_adjoint_eigen(a, &self.config)?;
            return Ok(EigenPairs {
                values: values.map(|x| Complex64::new(x, 0.0)),
                vectors: to_complex_matrix(&u),
            });
        }

        let (t, u) = T::complex_schur(a, &self.config)?;
        let values = eigenvalues_of_schur(&t)?;
        let vectors = eigenvectors_of_schur(&t, &u)?;
        Ok(EigenPairs { values, vectors })
    }
}

/// Eigenvalues of `a` with the default configuration.
pub fn eigenvalues<T: SchurScalar>(a: &DMatrix<T>) -> Result<DVector<Complex64>> {
    Eigen::default().eigenvalues(a)
}

/// Unit eigenvectors of `a` with the default configuration.
pub fn eigenvectors<T: SchurScalar>(a: &DMatrix<T>) -> Result<DMatrix<Complex64>> {
    Eigen::default().eigenvectors(a)
}

/// Eigenvalues and unit eigenvectors of `a` with the default configuration.
pub fn eigenpairs<T: SchurScalar>(a: &DMatrix<T>) -> Result<EigenPairs> {
    Eigen::default().eigenpairs(a)
}
