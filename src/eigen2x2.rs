//! Closed-form eigenvalues of 2×2 blocks.
//!
//! Both variants scale the block by its largest entry magnitude first, so the
//! intermediate quantities stay `O(1)` no matter how large or small the
//! entries are.

use nalgebra::DMatrix;
use num_complex::Complex64;

use crate::error::{EigenError, Result};
use crate::scalar::Scalar;

/// Eigenvalues of the real block `[[a11, a12], [a21, a22]]`.
///
/// A first rotation makes the diagonal of the block equal. If the rotated
/// off-diagonal entries have the same sign, a second rotation triangularizes
/// the block and the two real roots are returned `b11 − c·s·(b12 + b21)`
/// first; otherwise the roots are the conjugate pair `b11 ± i·√(−b12·b21)`,
/// returned `+` first.
pub fn real_eigenvalues_2x2(a11: f64, a12: f64, a21: f64, a22: f64) -> [Complex64; 2] {
    let max_abs = a11.abs().max(a12.abs()).max(a21.abs()).max(a22.abs());
    if max_abs == 0.0 {
        return [Complex64::new(0.0, 0.0); 2];
    }

    let a11 = a11 / max_abs;
    let a12 = a12 / max_abs;
    let a21 = a21 / max_abs;
    let a22 = a22 / max_abs;

    let (c, s) = if a12 + a21 == 0.0 {
        let r = std::f64::consts::FRAC_1_SQRT_2;
        (r, r)
    } else {
        let t_hat = (a11 - a22) / (a12 + a21);
        let t = t_hat / (1.0 + (1.0 + t_hat * t_hat).sqrt());
        let c = 1.0 / (1.0 + t * t).sqrt();
        (c, c * t)
    };

    let c2 = c * c;
    let s2 = s * s;
    let cs = c * s;
    let b11 = c2 * a11 + s2 * a22 - cs * (a12 + a21);
    let b12 = c2 * a12 - s2 * a21 + cs * (a11 - a22);
    let b21 = c2 * a21 - s2 * a12 + cs * (a11 - a22);

    if b21 * b12 >= 0.0 {
        let (c, s) = if b12 == 0.0 {
            (0.0, 1.0)
        } else {
            ((b12 / (b12 + b21)).sqrt(), (b21 / (b12 + b21)).sqrt())
        };
        let offset = c * s * (b12 + b21);
        [
            Complex64::new((b11 - offset) * max_abs, 0.0),
            Complex64::new((b11 + offset) * max_abs, 0.0),
        ]
    } else {
        let im = (-b21 * b12).sqrt();
        [
            Complex64::new(b11 * max_abs, im * max_abs),
            Complex64::new(b11 * max_abs, -im * max_abs),
        ]
    }
}

/// Eigenvalues of the complex block `[[a11, a12], [a21, a22]]`.
///
/// Roots of `λ² − tr·λ + det = 0`, returned as `tr/2 + √(tr²/4 − det)` then
/// `tr/2 − √(tr²/4 − det)`.
pub fn complex_eigenvalues_2x2(
    a11: Complex64,
    a12: Complex64,
    a21: Complex64,
    a22: Complex64,
) -> [Complex64; 2] {
    let max_abs = a11.norm().max(a12.norm()).max(a21.norm()).max(a22.norm());
    if max_abs == 0.0 {
        return [Complex64::new(0.0, 0.0); 2];
    }

    let a11 = a11 / max_abs;
    let a12 = a12 / max_abs;
    let a21 = a21 / max_abs;
    let a22 = a22 / max_abs;

    let half_trace = (a11 + a22) / 2.0;
    let det = a11 * a22 - a12 * a21;
    let root = (half_trace * half_trace - det).sqrt();

    [
        (half_trace + root) * max_abs,
        (half_trace - root) * max_abs,
    ]
}

/// Eigenvalues of a 2×2 matrix.
pub fn eigenvalues_2x2_matrix<T: Scalar>(m: &DMatrix<T>) -> Result<[Complex64; 2]> {
    if m.shape() != (2, 2) {
        return Err(EigenError::Shape {
            expected: (2, 2),
            got: m.shape(),
        });
    }
    Ok(T::eigenvalues_2x2(
        m[(0, 0)],
        m[(0, 1)],
        m[(1, 0)],
        m[(1, 1)],
    ))
}
