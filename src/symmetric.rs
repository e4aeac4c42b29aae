// This code is based on EigenvalueDecomposition.java from the library Jama which is release to public domain.
// The tridiagonalization and QL iteration are derived from the Algol procedures tred2 and tql2 by
// Bowdler, Martin, Reinsch, and Wilkinson, Handbook for Auto. Comp., Vol.ii-Linear Algebra.

//! Eigen-decomposition of self-adjoint matrices.
//!
//! For symmetric `A` the Schur form is diagonal, `A = V·diag(λ)·Vᵀ` with
//! orthogonal `V`, so there is nothing left for the eigen-extractor to solve.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use num_complex::Complex64;

use crate::error::{EigenError, Result};
use crate::scalar::EPS;
use crate::schur::SchurConfig;

/// Eigenvalues (ascending) and orthonormal eigenvectors of a real symmetric matrix.
#[derive(Clone, Debug)]
pub struct SymmetricSchur {
    d: DVector<f64>,
    v: DMatrix<f64>,
}

impl SymmetricSchur {
    /// Decomposes the symmetric matrix `a`.
    pub fn new(a: &DMatrix<f64>, config: &SchurConfig) -> Result<Self> {
        puffin::profile_function!();
        config.validate(a)?;

        let n = a.nrows();
        let mut v = a.clone();
        let mut d = DVector::zeros(n);
        let mut e = DVector::zeros(n);
        if n == 0 {
            return Ok(Self { d, v });
        }

        tridiagonalize(&mut v, &mut d, &mut e);
        let iterations = diagonalize(&mut v, &mut d, &mut e, config.max_iterations(n))?;
        log::debug!("symmetric {n}x{n} matrix diagonalized in {iterations} QL iterations");
        Ok(Self { d, v })
    }

    pub fn eigenvalues(&self) -> &DVector<f64> {
        &self.d
    }

    pub fn eigenvectors(&self) -> &DMatrix<f64> {
        &self.v
    }

    /// The Schur factor `T = diag(λ)`.
    pub fn t(&self) -> DMatrix<f64> {
        DMatrix::from_diagonal(&self.d)
    }

    /// The orthogonal Schur basis, identical to the eigenvectors.
    pub fn u(&self) -> &DMatrix<f64> {
        &self.v
    }

    pub fn unpack(self) -> (DVector<f64>, DMatrix<f64>) {
        (self.d, self.v)
    }
}

/// Eigenvalues (ascending) and orthonormal eigenvectors of a Hermitian matrix.
pub(crate) fn hermitian_eigen(
    a: &DMatrix<Complex64>,
    config: &SchurConfig,
) -> Result<(DVector<f64>, DMatrix<Complex64>)> {
    puffin::profile_function!();
    config.validate(a)?;

    let n = a.nrows();
    if n == 0 {
        return Ok((DVector::zeros(0), DMatrix::zeros(0, 0)));
    }
    let max_iterations = config.nalgebra_iterations(n)?;
    let eig = SymmetricEigen::try_new(a.clone(), EPS, max_iterations).ok_or(
        EigenError::NoConvergence {
            iterations: max_iterations,
        },
    )?;

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| eig.eigenvalues[i].total_cmp(&eig.eigenvalues[j]));
    let values = DVector::from_fn(n, |i, _| eig.eigenvalues[order[i]]);
    let vectors = DMatrix::from_fn(n, n, |i, j| eig.eigenvectors[(i, order[j])]);
    Ok((values, vectors))
}

/// Householder reduction to tridiagonal form.
///
/// On return `d` holds the diagonal, `e[1..]` the sub-diagonal and `v` the
/// accumulated orthogonal transform.
fn tridiagonalize(v: &mut DMatrix<f64>, d: &mut DVector<f64>, e: &mut DVector<f64>) {
    let n = v.nrows();

    for j in 0..n {
        d[j] = v[(n - 1, j)];
    }

    for i in (1..n).rev() {
        // Scale to avoid under/overflow.
        let mut h = 0.0;
        let scale: f64 = (0..i).map(|k| d[k].abs()).sum();

        if scale == 0.0 {
            e[i] = d[i - 1];
            for j in 0..i {
                d[j] = v[(i - 1, j)];
                v[(i, j)] = 0.0;
                v[(j, i)] = 0.0;
            }
        } else {
            // Generate Householder vector.
            for k in 0..i {
                d[k] /= scale;
                h += d[k] * d[k];
            }
            let mut f = d[i - 1];
            let mut g = h.sqrt();
            if f > 0.0 {
                g = -g;
            }
            e[i] = scale * g;
            h -= f * g;
            d[i - 1] = f - g;
            for j in 0..i {
                e[j] = 0.0;
            }

            // Apply similarity transformation to remaining columns.
            for j in 0..i {
                f = d[j];
                v[(j, i)] = f;
                g = e[j] + v[(j, j)] * f;
                for k in (j + 1)..i {
                    g += v[(k, j)] * d[k];
                    e[k] += v[(k, j)] * f;
                }
                e[j] = g;
            }
            f = 0.0;
            for j in 0..i {
                e[j] /= h;
                f += e[j] * d[j];
            }
            let hh = f / (h + h);
            for j in 0..i {
                e[j] -= hh * d[j];
            }
            for j in 0..i {
                f = d[j];
                g = e[j];
                for k in j..i {
                    v[(k, j)] -= f * e[k] + g * d[k];
                }
                d[j] = v[(i - 1, j)];
                v[(i, j)] = 0.0;
            }
        }
        d[i] = h;
    }

    // Accumulate transformations.
    for i in 0..(n - 1) {
        v[(n - 1, i)] = v[(i, i)];
        v[(i, i)] = 1.0;
        let h = d[i + 1];
        if h != 0.0 {
            for k in 0..=i {
                d[k] = v[(k, i + 1)] / h;
            }
            for j in 0..=i {
                let mut g = 0.0;
                for k in 0..=i {
                    g += v[(k, i + 1)] * v[(k, j)];
                }
                for k in 0..=i {
                    v[(k, j)] -= g * d[k];
                }
            }
        }
        for k in 0..=i {
            v[(k, i + 1)] = 0.0;
        }
    }
    for j in 0..n {
        d[j] = v[(n - 1, j)];
        v[(n - 1, j)] = 0.0;
    }
    v[(n - 1, n - 1)] = 1.0;
    e[0] = 0.0;
}

/// Implicit QL iteration on the tridiagonal matrix from [`tridiagonalize`],
/// followed by an ascending sort. Returns the number of iterations.
fn diagonalize(
    v: &mut DMatrix<f64>,
    d: &mut DVector<f64>,
    e: &mut DVector<f64>,
    max_iterations: usize,
) -> Result<usize> {
    let n = v.nrows();

    for i in 1..n {
        e[i - 1] = e[i];
    }
    e[n - 1] = 0.0;

    let mut f = 0.0;
    let mut tst1: f64 = 0.0;
    let mut total = 0;
    for l in 0..n {
        // Find small subdiagonal element.
        tst1 = tst1.max(d[l].abs() + e[l].abs());
        let mut m = l;
        while m < n - 1 && e[m].abs() > EPS * tst1 {
            m += 1;
        }

        // If m == l, d[l] is an eigenvalue, otherwise iterate.
        if m > l {
            loop {
                if total >= max_iterations {
                    log::warn!("QL iteration did not converge within {max_iterations} steps");
                    return Err(EigenError::NoConvergence { iterations: total });
                }
                total += 1;

                // Compute implicit shift.
                let mut g = d[l];
                let mut p = (d[l + 1] - g) / (2.0 * e[l]);
                let mut r = p.hypot(1.0);
                if p < 0.0 {
                    r = -r;
                }
                d[l] = e[l] / (p + r);
                d[l + 1] = e[l] * (p + r);
                let dl1 = d[l + 1];
                let mut h = g - d[l];
                for i in (l + 2)..n {
                    d[i] -= h;
                }
                f += h;

                // Implicit QL transformation.
                p = d[m];
                let mut c = 1.0;
                let mut c2 = c;
                let mut c3 = c;
                let el1 = e[l + 1];
                let mut s = 0.0;
                let mut s2 = 0.0;
                for i in (l..m).rev() {
                    c3 = c2;
                    c2 = c;
                    s2 = s;
                    g = c * e[i];
                    h = c * p;
                    r = p.hypot(e[i]);
                    e[i + 1] = s * r;
                    s = e[i] / r;
                    c = p / r;
                    p = c * d[i] - s * g;
                    d[i + 1] = h + s * (c * g + s * d[i]);

                    // Accumulate transformation.
                    for k in 0..n {
                        h = v[(k, i + 1)];
                        v[(k, i + 1)] = s * v[(k, i)] + c * h;
                        v[(k, i)] = c * v[(k, i)] - s * h;
                    }
                }
                p = -s * s2 * c3 * el1 * e[l] / dl1;
                e[l] = s * p;
                d[l] = c * p;

                // Check for convergence.
                if e[l].abs() <= EPS * tst1 {
                    break;
                }
            }
        }
        d[l] += f;
        e[l] = 0.0;
    }

    // Sort eigenvalues and corresponding vectors.
    for i in 0..(n - 1) {
        let mut k = i;
        let mut p = d[i];
        for j in (i + 1)..n {
            if d[j] < p {
                k = j;
                p = d[j];
            }
        }
        if k != i {
            d[k] = d[i];
            d[i] = p;
            v.swap_columns(i, k);
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn diagonalizes_symmetric_matrix() {
        let a = DMatrix::from_row_slice(
            4,
            4,
            &[
                4.0, 1.0, -2.0, 2.0, //
                1.0, 2.0, 0.0, 1.0, //
                -2.0, 0.0, 3.0, -2.0, //
                2.0, 1.0, -2.0, -1.0,
            ],
        );
        let schur = SymmetricSchur::new(&a, &SchurConfig::default()).unwrap();
        let (d, v) = (schur.eigenvalues(), schur.u());

        assert!(d.as_slice().windows(2).all(|w| w[0] <= w[1]));
        assert_relative_eq!(v.transpose() * v, DMatrix::identity(4, 4), epsilon = 1e-13);
        assert_relative_eq!(v * schur.t() * v.transpose(), a, epsilon = 1e-12);
        assert_relative_eq!(d.sum(), a.trace(), epsilon = 1e-12);
    }

    #[test]
    fn known_eigenvalues() {
        // Tridiagonal [-1, 2, -1] stencil: λ_k = 2 - 2·cos(kπ/(n+1)).
        let n = 6;
        let a = DMatrix::from_fn(n, n, |i, j| match i.abs_diff(j) {
            0 => 2.0,
            1 => -1.0,
            _ => 0.0,
        });
        let schur = SymmetricSchur::new(&a, &SchurConfig::default()).unwrap();
        for (k, lambda) in schur.eigenvalues().iter().enumerate() {
            let theta = (k + 1) as f64 * std::f64::consts::PI / (n + 1) as f64;
            assert_relative_eq!(*lambda, 2.0 - 2.0 * theta.cos(), epsilon = 1e-13);
        }
    }

    #[test]
    fn one_by_one_and_empty() {
        let a = DMatrix::from_element(1, 1, -3.5);
        let (d, v) = SymmetricSchur::new(&a, &SchurConfig::default()).unwrap().unpack();
        assert_eq!(d[0], -3.5);
        assert_eq!(v[(0, 0)], 1.0);

        let empty = DMatrix::<f64>::zeros(0, 0);
        let (d, v) = SymmetricSchur::new(&empty, &SchurConfig::default()).unwrap().unpack();
        assert_eq!(d.len(), 0);
        assert_eq!(v.shape(), (0, 0));
    }

    #[test]
    fn hermitian_matrix() {
        let c = |re: f64, im: f64| Complex64::new(re, im);
        let a = DMatrix::from_row_slice(
            3,
            3,
            &[
                c(2.0, 0.0), c(1.0, -1.0), c(0.0, 0.5), //
                c(1.0, 1.0), c(3.0, 0.0), c(-1.0, 0.0), //
                c(0.0, -0.5), c(-1.0, 0.0), c(1.0, 0.0),
            ],
        );
        let (d, v) = hermitian_eigen(&a, &SchurConfig::default()).unwrap();
        assert!(d.as_slice().windows(2).all(|w| w[0] <= w[1]));
        assert!((v.adjoint() * &v - DMatrix::identity(3, 3)).norm() < 1e-12);

        let d = d.map(|x| c(x, 0.0));
        assert!((&a * &v - &v * DMatrix::from_diagonal(&d)).norm() < 1e-12);
    }

    #[test]
    fn hermitian_iteration_budget_is_enforced() {
        let a = DMatrix::from_row_slice(
            2,
            2,
            &[
                Complex64::new(1.0, 0.0),
                Complex64::new(0.0, 2.0),
                Complex64::new(0.0, -2.0),
                Complex64::new(-1.0, 0.0),
            ],
        );
        let config = SchurConfig::default().max_iteration_factor(0);
        assert_eq!(
            hermitian_eigen(&a, &config).unwrap_err(),
            EigenError::NoConvergence { iterations: 0 }
        );
    }
}
