//! Element types the balancing and eigen-extraction code is written against.

use nalgebra::{ComplexField, DMatrix};
use num_complex::Complex64;

use crate::eigen2x2;

/// Machine epsilon of `f64`.
pub const EPS: f64 = f64::EPSILON;

/// Smallest positive normal `f64`.
pub const SAFE_MIN: f64 = f64::MIN_POSITIVE;

/// A real or complex matrix entry.
///
/// Everything numeric comes from [`ComplexField`] (magnitude, scaling by a
/// real factor, conjugation); this trait only adds what differs between the
/// real and complex instantiations.
pub trait Scalar: ComplexField<RealField = f64> + Copy {
    /// Widens the value to a complex number.
    fn to_complex(self) -> Complex64;

    /// Eigenvalues of the 2×2 block `[[a11, a12], [a21, a22]]`.
    fn eigenvalues_2x2(a11: Self, a12: Self, a21: Self, a22: Self) -> [Complex64; 2];
}

impl Scalar for f64 {
    #[inline]
    fn to_complex(self) -> Complex64 {
        Complex64::new(self, 0.0)
    }

    fn eigenvalues_2x2(a11: f64, a12: f64, a21: f64, a22: f64) -> [Complex64; 2] {
        eigen2x2::real_eigenvalues_2x2(a11, a12, a21, a22)
    }
}

impl Scalar for Complex64 {
    #[inline]
    fn to_complex(self) -> Complex64 {
        self
    }

    fn eigenvalues_2x2(
        a11: Complex64,
        a12: Complex64,
        a21: Complex64,
        a22: Complex64,
    ) -> [Complex64; 2] {
        eigen2x2::complex_eigenvalues_2x2(a11, a12, a21, a22)
    }
}

/// `true` if `m` equals its own conjugate transpose, compared exactly.
pub fn is_self_adjoint<T: Scalar>(m: &DMatrix<T>) -> bool {
    if !m.is_square() {
        return false;
    }
    let n = m.nrows();
    for j in 0..n {
        for i in j..n {
            if m[(i, j)] != m[(j, i)].conjugate() {
                return false;
            }
        }
    }
    true
}

/// `true` if every entry of `m` is finite.
pub fn is_finite<T: Scalar>(m: &DMatrix<T>) -> bool {
    m.iter().all(|x| x.is_finite())
}

/// Widens every entry of `m` to a complex number.
pub fn to_complex_matrix<T: Scalar>(m: &DMatrix<T>) -> DMatrix<Complex64> {
    m.map(|x| x.to_complex())
}
