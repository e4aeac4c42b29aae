//! Integration tests for balancing and eigen-extraction
//!
//! Tests verify:
//! - Balancing is a similarity: eigenvalues survive and `P·D·B·D⁻¹·Pᵀ ≈ A`
//! - Eigenpairs satisfy `A·v ≈ λ·v` with unit-norm `v`
//! - Symmetric input yields an orthonormal eigenvector matrix
//! - Known spectra: cyclic permutation, rotation blocks, a dense 3×3
//! - Complex input, seeded reproducibility and defective matrices

use anyhow::Result;
use approx::assert_relative_eq;
use balanced_eigen::{
    eigenpairs, eigenvalues, eigenvectors, BalanceConfig, Balancer, Complex64, Eigen,
    SchurConfig,
};
use nalgebra::DMatrix;
use rand::{rngs::StdRng, Rng, SeedableRng};

// ============================================================================
// Helper Functions
// ============================================================================

fn random_matrix(rng: &mut StdRng, n: usize) -> DMatrix<f64> {
    DMatrix::from_fn(n, n, |_, _| rng.gen_range(-1.0..1.0))
}

/// Badly scaled: entry (i, j) is multiplied by 10^(2(j - i)).
fn graded_matrix(rng: &mut StdRng, n: usize) -> DMatrix<f64> {
    DMatrix::from_fn(n, n, |i, j| {
        rng.gen_range(-1.0..1.0) * 10f64.powi(2 * (j as i32 - i as i32))
    })
}

/// Matches every expected value to a distinct actual value within `tol`.
fn assert_same_spectrum(actual: &[Complex64], expected: &[Complex64], tol: f64, msg: &str) {
    assert_eq!(actual.len(), expected.len(), "{}: length mismatch", msg);
    let mut used = vec![false; actual.len()];
    for e in expected {
        let best = actual
            .iter()
            .enumerate()
            .filter(|(i, _)| !used[*i])
            .min_by(|(_, a), (_, b)| (*a - e).norm().total_cmp(&(*b - e).norm()));
        match best {
            Some((i, a)) if (a - e).norm() <= tol * e.norm().max(1.0) => used[i] = true,
            _ => panic!("{}: no eigenvalue close to {} in {:?}", msg, e, actual),
        }
    }
}

fn assert_eigenpairs(a: &DMatrix<Complex64>, values: &[Complex64], vectors: &DMatrix<Complex64>) {
    let scale = a.norm().max(1.0);
    for (j, lambda) in values.iter().enumerate() {
        let v = vectors.column(j).into_owned();
        let residual = (a * &v - &v * *lambda).norm() / scale;
        assert!(residual < 1e-8, "eigenpair {}: residual {} for {}", j, residual, lambda);
        assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-10);
    }
}

fn to_complex(a: &DMatrix<f64>) -> DMatrix<Complex64> {
    a.map(|x| Complex64::new(x, 0.0))
}

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

// ============================================================================
// Balancing
// ============================================================================

#[test]
fn test_balancing_preserves_eigenvalues() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(0xba1a);
    let eigen = Eigen::new(SchurConfig::default().seed(1));
    for n in [3, 5, 8] {
        let a = graded_matrix(&mut rng, n);
        let mut balancer = Balancer::new(BalanceConfig::default());
        balancer.decompose_copy(&a)?;

        let unbalanced = Eigen::new(
            SchurConfig::default()
                .seed(1)
                .balance(BalanceConfig::default().permute(false).scale(false)),
        );
        let expected = eigen.eigenvalues(&a)?;
        let actual = unbalanced.eigenvalues(balancer.b()?)?;
        assert_same_spectrum(actual.as_slice(), expected.as_slice(), 1e-8, "balanced");
    }
    Ok(())
}

#[test]
fn test_balancing_reconstruction_identity() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(7);
    for n in [1, 2, 6, 10] {
        let mut a = graded_matrix(&mut rng, n);
        // Isolate something for the permutation to find.
        if n > 2 {
            for j in 0..n {
                if j != 1 {
                    a[(1, j)] = 0.0;
                }
            }
        }
        let mut balancer = Balancer::new(BalanceConfig::default());
        balancer.decompose_copy(&a)?;

        let p = balancer.p()?;
        let d = balancer.d(true)?;
        let d_inv = d.map(|x| if x == 0.0 { 0.0 } else { 1.0 / x });
        let rebuilt = &p * &d * balancer.b()? * &d_inv * p.transpose();
        assert_relative_eq!(rebuilt, a, max_relative = 1e-12, epsilon = 1e-12);
    }
    Ok(())
}

#[test]
fn test_balancing_is_idempotent() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(3);
    let a = graded_matrix(&mut rng, 6);

    let mut first = Balancer::new(BalanceConfig::default());
    first.decompose_copy(&a)?;
    let b = first.b()?.clone();

    let mut second = Balancer::new(BalanceConfig::default());
    second.decompose_copy(&b)?;
    assert_eq!(second.i_low()?, first.i_low()?);
    assert_eq!(second.i_high()?, first.i_high()?);
    assert_relative_eq!(second.b()?, &b, max_relative = 1e-12);
    Ok(())
}

// ============================================================================
// Eigenpairs
// ============================================================================

#[test]
fn test_random_eigenpairs() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(42);
    let eigen = Eigen::new(SchurConfig::default().seed(42));
    for n in [1, 2, 3, 7, 12] {
        let a = random_matrix(&mut rng, n);
        let pairs = eigen.eigenpairs(&a)?;
        assert_eq!(pairs.values.len(), n);
        assert_eq!(pairs.vectors.shape(), (n, n));
        assert_eigenpairs(&to_complex(&a), pairs.values.as_slice(), &pairs.vectors);

        let values = eigen.eigenvalues(&a)?;
        assert_same_spectrum(values.as_slice(), pairs.values.as_slice(), 1e-8, "values");
    }
    Ok(())
}

#[test]
fn test_graded_eigenpairs() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(5);
    let a = graded_matrix(&mut rng, 6);
    let pairs = Eigen::new(SchurConfig::default().seed(5)).eigenpairs(&a)?;
    let a = to_complex(&a);
    for (j, lambda) in pairs.values.iter().enumerate() {
        let v = pairs.vectors.column(j).into_owned();
        let residual = (&a * &v - &v * *lambda).norm();
        assert!(residual <= 1e-8 * a.norm(), "eigenpair {}: residual {}", j, residual);
    }
    Ok(())
}

#[test]
fn test_symmetric_eigenvectors_are_orthonormal() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(9);
    let r = random_matrix(&mut rng, 6);
    let a = &r + r.transpose();

    let q = eigenvectors(&a)?;
    assert!((q.adjoint() * &q - DMatrix::identity(6, 6)).norm() < 1e-12);

    let values = eigenvalues(&a)?;
    assert!(values.iter().all(|x| x.im == 0.0));
    assert!(values.as_slice().windows(2).all(|w| w[0].re <= w[1].re));
    assert_relative_eq!(values.iter().map(|x| x.re).sum::<f64>(), a.trace(), epsilon = 1e-12);
    Ok(())
}

#[test]
fn test_cyclic_permutation() -> Result<()> {
    let a = DMatrix::from_row_slice(
        4,
        4,
        &[
            0.0, 0.0, 0.0, 1.0, //
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0,
        ],
    );
    let pairs = Eigen::new(SchurConfig::default().seed(2)).eigenpairs(&a)?;
    assert_same_spectrum(
        pairs.values.as_slice(),
        &[c(1.0, 0.0), c(-1.0, 0.0), c(0.0, 1.0), c(0.0, -1.0)],
        1e-10,
        "cyclic",
    );
    assert_eigenpairs(&to_complex(&a), pairs.values.as_slice(), &pairs.vectors);
    Ok(())
}

#[test]
fn test_dense_3x3_spectrum() -> Result<()> {
    let a = DMatrix::from_row_slice(
        3,
        3,
        &[
            0.4864, 0.85113, 0.96095, //
            0.87509, 0.41948, 0.73852, //
            0.47208, 0.79501, 0.41394,
        ],
    );
    let values = eigenvalues(&a)?;
    assert_same_spectrum(
        values.as_slice(),
        &[
            c(1.9923303019116854, 0.0),
            c(-0.33625515095584285, 0.1421926601554734),
            c(-0.33625515095584285, -0.1421926601554734),
        ],
        1e-12,
        "dense 3x3",
    );

    // Conjugate pairs are adjacent, positive imaginary part first.
    let k = values.iter().position(|x| x.im != 0.0).expect("complex pair");
    assert!(values[k].im > 0.0);
    assert_relative_eq!(values[k + 1].im, -values[k].im, epsilon = 1e-14);
    Ok(())
}

#[test]
fn test_rotation_block_with_isolated_eigenvalue() -> Result<()> {
    let a = DMatrix::from_row_slice(3, 3, &[2.0, -3.0, 0.0, 3.0, 2.0, 0.0, 0.0, 0.0, 4.0]);
    let pairs = eigenpairs(&a)?;
    assert_same_spectrum(
        pairs.values.as_slice(),
        &[c(2.0, 3.0), c(2.0, -3.0), c(4.0, 0.0)],
        1e-13,
        "rotation block",
    );
    assert_eigenpairs(&to_complex(&a), pairs.values.as_slice(), &pairs.vectors);
    Ok(())
}

#[test]
fn test_complex_input() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(17);
    let n = 5;
    let a = DMatrix::from_fn(n, n, |_, _| c(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)));
    let pairs = eigenpairs(&a)?;
    assert_eigenpairs(&a, pairs.values.as_slice(), &pairs.vectors);

    let trace: Complex64 = pairs.values.iter().sum();
    assert!((trace - a.trace()).norm() < 1e-10);
    Ok(())
}

#[test]
fn test_hermitian_input() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(23);
    let n = 4;
    let r = DMatrix::from_fn(n, n, |_, _| c(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)));
    let a = &r + r.adjoint();

    let pairs = eigenpairs(&a)?;
    assert!(pairs.values.iter().all(|x| x.im == 0.0));
    let q = &pairs.vectors;
    assert!((q.adjoint() * q - DMatrix::identity(n, n)).norm() < 1e-12);
    assert_eigenpairs(&a, pairs.values.as_slice(), q);
    Ok(())
}

#[test]
fn test_seeded_runs_are_reproducible() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(99);
    let a = random_matrix(&mut rng, 9);
    let config = SchurConfig::default().seed(1234).exceptional_threshold(3);

    let first = Eigen::new(config).eigenpairs(&a)?;
    let second = Eigen::new(config).eigenpairs(&a)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_defective_matrix_still_returns() -> Result<()> {
    // Single Jordan block: λ = 3 with a one dimensional eigenspace.
    let a = DMatrix::from_row_slice(3, 3, &[3.0, 1.0, 0.0, 0.0, 3.0, 1.0, 0.0, 0.0, 3.0]);
    let pairs = eigenpairs(&a)?;
    assert!(pairs.vectors.iter().all(|x| x.is_finite()));
    for v in pairs.vectors.column_iter() {
        assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-10);
    }
    for lambda in pairs.values.iter() {
        assert!((lambda - c(3.0, 0.0)).norm() < 1e-12);
    }
    Ok(())
}

#[test]
fn test_rejects_bad_input() {
    let rect = DMatrix::<f64>::zeros(3, 2);
    assert!(matches!(
        eigenvalues(&rect),
        Err(balanced_eigen::EigenError::Shape { .. })
    ));

    let mut a = DMatrix::<f64>::identity(3, 3);
    a[(0, 2)] = f64::NAN;
    assert_eq!(
        eigenpairs(&a).unwrap_err(),
        balanced_eigen::EigenError::NonFinite
    );
}
