//! Schur decompositions `A = U·T·U⁻¹` feeding the eigen-extractor.
//!
//! The input is balanced first, so `U` is the product of the balancing
//! transform and an orthogonal (or unitary) factor. It is only orthogonal
//! when balancing did nothing.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::balance::{balance_in_place, BalanceConfig, BalanceRecord};
use crate::eigen2x2::complex_eigenvalues_2x2;
use crate::error::{ensure_square, EigenError, Result};
use crate::hessenberg::reduce_to_hessenberg;
use crate::scalar::{is_finite, to_complex_matrix, Scalar, EPS};
use crate::symmetric::{hermitian_eigen, SymmetricSchur};

/// Settings shared by all Schur decompositions.
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchurConfig {
    /// The iteration budget is `n * max_iteration_factor`.
    pub max_iteration_factor: usize,
    /// Iterations without deflation before an exceptional shift. Zero disables them.
    pub exceptional_threshold: usize,
    /// Seed for the jitter of exceptional shifts. `None` seeds from entropy.
    pub seed: Option<u64>,
    pub balance: BalanceConfig,
    /// Reject input with NaN or infinite entries up front.
    pub check_finite: bool,
}

impl Default for SchurConfig {
    fn default() -> Self {
        Self {
            max_iteration_factor: 50,
            exceptional_threshold: 10,
            seed: None,
            balance: BalanceConfig::default(),
            check_finite: true,
        }
    }
}

impl SchurConfig {
    pub fn max_iteration_factor(mut self, max_iteration_factor: usize) -> Self {
        self.max_iteration_factor = max_iteration_factor;
        self
    }

    pub fn exceptional_threshold(mut self, exceptional_threshold: usize) -> Self {
        self.exceptional_threshold = exceptional_threshold;
        self
    }

    pub fn seed(mut self, seed: impl Into<Option<u64>>) -> Self {
        self.seed = seed.into();
        self
    }

    pub fn balance(mut self, balance: BalanceConfig) -> Self {
        self.balance = balance;
        self
    }

    pub fn check_finite(mut self, check_finite: bool) -> Self {
        self.check_finite = check_finite;
        self
    }

    pub(crate) fn max_iterations(&self, n: usize) -> usize {
        n * self.max_iteration_factor
    }

    /// Budget handed to nalgebra's iterative solvers, which treat zero as
    /// unbounded. An empty budget fails here instead.
    pub(crate) fn nalgebra_iterations(&self, n: usize) -> Result<usize> {
        match self.max_iterations(n) {
            0 => Err(EigenError::NoConvergence { iterations: 0 }),
            budget => Ok(budget),
        }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    pub(crate) fn validate<T: Scalar>(&self, a: &DMatrix<T>) -> Result<()> {
        ensure_square(a.shape())?;
        if self.check_finite && !is_finite(a) {
            return Err(EigenError::NonFinite);
        }
        Ok(())
    }
}

/// Real Schur decomposition: `T` is quasi-upper-triangular with 1×1 blocks
/// for real eigenvalues and 2×2 blocks for complex conjugate pairs.
#[derive(Clone, Debug)]
pub struct RealSchur {
    t: DMatrix<f64>,
    u: Option<DMatrix<f64>>,
    record: BalanceRecord,
    iterations: usize,
}

impl RealSchur {
    /// Decomposes `a`. With `compute_u` unset only `T` is formed.
    pub fn new(a: &DMatrix<f64>, config: &SchurConfig, compute_u: bool) -> Result<Self> {
        puffin::profile_function!();
        config.validate(a)?;

        let n = a.nrows();
        let mut t = a.clone();
        let record = balance_in_place(&mut t, config.balance.permute, config.balance.scale)?;
        let (low, high) = (record.i_low(), record.i_high());

        let mut v = reduce_to_hessenberg(&mut t, low..high, compute_u);
        let iterations = if high > low {
            let mut rng = config.rng();
            francis_qr(&mut t, v.as_mut(), low, high - 1, config, &mut rng)?
        } else {
            0
        };
        let u = v.map(|v| record.apply_left_transform(&v)).transpose()?;

        log::debug!("real Schur form of {n}x{n} matrix after {iterations} QR iterations");
        Ok(Self {
            t,
            u,
            record,
            iterations,
        })
    }

    /// The quasi-upper-triangular factor.
    pub fn t(&self) -> &DMatrix<f64> {
        &self.t
    }

    /// The basis `U`, if it was computed.
    pub fn u(&self) -> Option<&DMatrix<f64>> {
        self.u.as_ref()
    }

    /// The balancing folded into `U`.
    pub fn balance_record(&self) -> &BalanceRecord {
        &self.record
    }

    /// Number of QR sweeps performed.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn unpack(self) -> (DMatrix<f64>, Option<DMatrix<f64>>) {
        (self.t, self.u)
    }

    /// Converts to a complex Schur decomposition with upper triangular `T`.
    ///
    /// Each 2×2 block is triangularized by a complex Givens rotation, which
    /// is applied to `U` as well. The eigenvalue with positive imaginary part
    /// of each pair ends up first on the diagonal.
    pub fn to_complex_schur(&self) -> (DMatrix<Complex64>, Option<DMatrix<Complex64>>) {
        let mut t = to_complex_matrix(&self.t);
        let mut u = self.u.as_ref().map(to_complex_matrix);
        triangularize_blocks(&mut t, u.as_mut());
        (t, u)
    }
}

/// Complex Schur decomposition with upper triangular `T`.
#[derive(Clone, Debug)]
pub struct ComplexSchur {
    t: DMatrix<Complex64>,
    u: Option<DMatrix<Complex64>>,
    record: BalanceRecord,
}

impl ComplexSchur {
    pub fn new(a: &DMatrix<Complex64>, config: &SchurConfig, compute_u: bool) -> Result<Self> {
        puffin::profile_function!();
        config.validate(a)?;

        let n = a.nrows();
        let mut b = a.clone();
        let record = balance_in_place(&mut b, config.balance.permute, config.balance.scale)?;
        if n == 0 {
            return Ok(Self {
                t: b,
                u: compute_u.then(|| DMatrix::zeros(0, 0)),
                record,
            });
        }

        let max_iterations = config.nalgebra_iterations(n)?;
        let (q, mut t) = {
            puffin::profile_scope!("qr");
            nalgebra::linalg::Schur::try_new(b, EPS, max_iterations)
                .ok_or(EigenError::NoConvergence {
                    iterations: max_iterations,
                })?
                .unpack()
        };
        let mut u = compute_u.then_some(q);
        triangularize_blocks(&mut t, u.as_mut());
        let u = u.map(|u| record.apply_left_transform(&u)).transpose()?;

        log::debug!("complex Schur form of {n}x{n} matrix");
        Ok(Self { t, u, record })
    }

    pub fn t(&self) -> &DMatrix<Complex64> {
        &self.t
    }

    pub fn u(&self) -> Option<&DMatrix<Complex64>> {
        self.u.as_ref()
    }

    pub fn balance_record(&self) -> &BalanceRecord {
        &self.record
    }

    pub fn unpack(self) -> (DMatrix<Complex64>, Option<DMatrix<Complex64>>) {
        (self.t, self.u)
    }
}

/// Element types the Schur decompositions are implemented for.
pub trait SchurScalar: Scalar {
    /// The Schur factor `T` of `a`: quasi-upper-triangular for real input,
    /// upper triangular for complex input.
    fn schur_factor(a: &DMatrix<Self>, config: &SchurConfig) -> Result<DMatrix<Self>>;

    /// Upper triangular `T` and basis `U` with `a·U = U·T`.
    fn complex_schur(
        a: &DMatrix<Self>,
        config: &SchurConfig,
    ) -> Result<(DMatrix<Complex64>, DMatrix<Complex64>)>;

    /// Ascending eigenvalues and orthonormal eigenvectors of a self-adjoint `a`.
    fn self_adjoint_eigen(
        a: &DMatrix<Self>,
        config: &SchurConfig,
    ) -> Result<(DVector<f64>, DMatrix<Self>)>;
}

fn require_u<T>(u: Option<DMatrix<T>>) -> Result<DMatrix<T>> {
    u.ok_or(EigenError::IllegalState("Schur basis U was not accumulated"))
}

impl SchurScalar for f64 {
    fn schur_factor(a: &DMatrix<f64>, config: &SchurConfig) -> Result<DMatrix<f64>> {
        Ok(RealSchur::new(a, config, false)?.unpack().0)
    }

    fn complex_schur(
        a: &DMatrix<f64>,
        config: &SchurConfig,
    ) -> Result<(DMatrix<Complex64>, DMatrix<Complex64>)> {
        let (t, u) = RealSchur::new(a, config, true)?.to_complex_schur();
        Ok((t, require_u(u)?))
    }

    fn self_adjoint_eigen(
        a: &DMatrix<f64>,
        config: &SchurConfig,
    ) -> Result<(DVector<f64>, DMatrix<f64>)> {
        Ok(SymmetricSchur::new(a, config)?.unpack())
    }
}

impl SchurScalar for Complex64 {
    fn schur_factor(a: &DMatrix<Complex64>, config: &SchurConfig) -> Result<DMatrix<Complex64>> {
        Ok(ComplexSchur::new(a, config, false)?.unpack().0)
    }

    fn complex_schur(
        a: &DMatrix<Complex64>,
        config: &SchurConfig,
    ) -> Result<(DMatrix<Complex64>, DMatrix<Complex64>)> {
        let (t, u) = ComplexSchur::new(a, config, true)?.unpack();
        Ok((t, require_u(u)?))
    }

    fn self_adjoint_eigen(
        a: &DMatrix<Complex64>,
        config: &SchurConfig,
    ) -> Result<(DVector<f64>, DMatrix<Complex64>)> {
        hermitian_eigen(a, config)
    }
}

/// Rotates every 2×2 block left on the diagonal of `t` to upper triangular
/// form and applies the same rotations to `u`.
///
/// Sub-diagonal entries below `ε·(|tₘₘ| + |tₘ₊₁ₘ₊₁|)` are set to zero.
pub(crate) fn triangularize_blocks(
    t: &mut DMatrix<Complex64>,
    mut u: Option<&mut DMatrix<Complex64>>,
) {
    let n = t.nrows();
    let zero = Complex64::new(0.0, 0.0);
    for m in 0..n.saturating_sub(1) {
        let sub = t[(m + 1, m)];
        if sub.norm() <= EPS * (t[(m, m)].norm() + t[(m + 1, m + 1)].norm()) {
            t[(m + 1, m)] = zero;
            continue;
        }

        let [l0, l1] = complex_eigenvalues_2x2(t[(m, m)], t[(m, m + 1)], sub, t[(m + 1, m + 1)]);
        let mu = if l0.im >= l1.im { l0 } else { l1 };

        // (mu - t22, t21) spans the eigenvector of the block for mu.
        let x0 = mu - t[(m + 1, m + 1)];
        let r = x0.norm().hypot(sub.norm());
        let (c, s) = (x0 / r, sub / r);

        for j in m..n {
            let (a, b) = (t[(m, j)], t[(m + 1, j)]);
            t[(m, j)] = c.conj() * a + s.conj() * b;
            t[(m + 1, j)] = c * b - s * a;
        }
        for i in 0..=(m + 1) {
            let (a, b) = (t[(i, m)], t[(i, m + 1)]);
            t[(i, m)] = c * a + s * b;
            t[(i, m + 1)] = c.conj() * b - s.conj() * a;
        }
        if let Some(u) = u.as_deref_mut() {
            for i in 0..n {
                let (a, b) = (u[(i, m)], u[(i, m + 1)]);
                u[(i, m)] = c * a + s * b;
                u[(i, m + 1)] = c.conj() * b - s.conj() * a;
            }
        }
        t[(m + 1, m)] = zero;
    }
}

/// Random factor close to one for the `k`-th exceptional shift.
fn shift_jitter(rng: &mut StdRng, k: usize) -> f64 {
    let p = 1.0 - 0.1_f64.powi(k.min(16) as i32);
    p + 2.0 * (1.0 - p) * (rng.gen::<f64>() - 0.5)
}

/// Francis double shift QR on the Hessenberg rows/columns `low..=high` of `h`,
/// accumulating the transformations into `v`. Returns the number of sweeps.
///
/// Derived from the Algol procedure hqr2 by Martin and Wilkinson, Handbook
/// for Auto. Comp., Vol.ii-Linear Algebra, by way of the Jama library.
fn francis_qr(
    h: &mut DMatrix<f64>,
    mut v: Option<&mut DMatrix<f64>>,
    low: usize,
    high: usize,
    config: &SchurConfig,
    rng: &mut StdRng,
) -> Result<usize> {
    puffin::profile_function!();
    let nn = h.nrows();
    let max_iterations = config.max_iterations(nn);

    let mut norm = 0.0;
    for i in 0..nn {
        for j in i.saturating_sub(1)..nn {
            norm += h[(i, j)].abs();
        }
    }

    let mut n = high;
    let mut exshift = 0.0;
    let mut p: f64;
    let mut q: f64;
    let mut r: f64;
    let mut s: f64;
    let mut z: f64;
    let mut w: f64;
    let mut x: f64;
    let mut y: f64;
    let mut iter = 0;
    let mut total = 0;
    let mut exceptional = 0;

    loop {
        // Look for single small sub-diagonal element.
        let mut l = n;
        while l > low {
            s = h[(l - 1, l - 1)].abs() + h[(l, l)].abs();
            if s == 0.0 {
                s = norm;
            }
            if h[(l, l - 1)].abs() <= EPS * s {
                h[(l, l - 1)] = 0.0;
                break;
            }
            l -= 1;
        }

        if l == n {
            // One root found.
            h[(n, n)] += exshift;
            iter = 0;
            if n == low {
                break;
            }
            n -= 1;
        } else if l + 1 == n {
            // Two roots found.
            w = h[(n, n - 1)] * h[(n - 1, n)];
            p = (h[(n - 1, n - 1)] - h[(n, n)]) / 2.0;
            q = p * p + w;
            z = q.abs().sqrt();
            h[(n, n)] += exshift;
            h[(n - 1, n - 1)] += exshift;

            if q >= 0.0 {
                // Real pair: rotate the block to triangular form.
                z = if p >= 0.0 { p + z } else { p - z };
                x = h[(n, n - 1)];
                s = x.abs() + z.abs();
                p = x / s;
                q = z / s;
                r = (p * p + q * q).sqrt();
                p /= r;
                q /= r;

                for j in (n - 1)..nn {
                    z = h[(n - 1, j)];
                    h[(n - 1, j)] = q * z + p * h[(n, j)];
                    h[(n, j)] = q * h[(n, j)] - p * z;
                }
                for i in 0..=n {
                    z = h[(i, n - 1)];
                    h[(i, n - 1)] = q * z + p * h[(i, n)];
                    h[(i, n)] = q * h[(i, n)] - p * z;
                }
                if let Some(v) = v.as_deref_mut() {
                    for i in low..=high {
                        z = v[(i, n - 1)];
                        v[(i, n - 1)] = q * z + p * v[(i, n)];
                        v[(i, n)] = q * v[(i, n)] - p * z;
                    }
                }
                h[(n, n - 1)] = 0.0;
            }

            iter = 0;
            if n < low + 2 {
                break;
            }
            n -= 2;
        } else {
            if total >= max_iterations {
                log::warn!("QR iteration did not converge within {max_iterations} sweeps");
                return Err(EigenError::NoConvergence { iterations: total });
            }

            // Form shift.
            x = h[(n, n)];
            y = h[(n - 1, n - 1)];
            w = h[(n, n - 1)] * h[(n - 1, n)];

            if config.exceptional_threshold > 0
                && iter > 0
                && iter % config.exceptional_threshold == 0
            {
                exceptional += 1;
                if exceptional % 2 == 1 {
                    // Wilkinson's ad hoc shift, jittered.
                    exshift += x;
                    for i in low..=n {
                        h[(i, i)] -= x;
                    }
                    s = h[(n, n - 1)].abs() + h[(n - 1, n - 2)].abs();
                    let jitter = shift_jitter(rng, exceptional);
                    x = 0.75 * s * jitter;
                    y = x;
                    w = -0.4375 * s * s * jitter * jitter;
                } else {
                    // MATLAB's ad hoc shift.
                    s = (y - x) / 2.0;
                    s = s * s + w;
                    if s > 0.0 {
                        s = s.sqrt();
                        if y < x {
                            s = -s;
                        }
                        s = x - w / ((y - x) / 2.0 + s);
                        for i in low..=n {
                            h[(i, i)] -= s;
                        }
                        exshift += s;
                        x = 0.964;
                        y = x;
                        w = x;
                    }
                }
                log::debug!("exceptional shift #{exceptional} at row {n} after {iter} sweeps");
            }

            iter += 1;
            total += 1;

            // Look for two consecutive small sub-diagonal elements.
            let mut m = n - 2;
            loop {
                z = h[(m, m)];
                r = x - z;
                s = y - z;
                p = (r * s - w) / h[(m + 1, m)] + h[(m, m + 1)];
                q = h[(m + 1, m + 1)] - z - r - s;
                r = h[(m + 2, m + 1)];
                s = p.abs() + q.abs() + r.abs();
                p /= s;
                q /= s;
                r /= s;
                if m == l {
                    break;
                }
                if h[(m, m - 1)].abs() * (q.abs() + r.abs())
                    < EPS
                        * (p.abs()
                            * (h[(m - 1, m - 1)].abs() + z.abs() + h[(m + 1, m + 1)].abs()))
                {
                    break;
                }
                m -= 1;
            }

            for i in (m + 2)..=n {
                h[(i, i - 2)] = 0.0;
                if i > m + 2 {
                    h[(i, i - 3)] = 0.0;
                }
            }

            // Double QR step involving rows l..=n and columns m..=n.
            for k in m..n {
                let notlast = k != n - 1;
                if k != m {
                    p = h[(k, k - 1)];
                    q = h[(k + 1, k - 1)];
                    r = if notlast { h[(k + 2, k - 1)] } else { 0.0 };
                    x = p.abs() + q.abs() + r.abs();
                    if x == 0.0 {
                        continue;
                    }
                    p /= x;
                    q /= x;
                    r /= x;
                }

                s = (p * p + q * q + r * r).sqrt();
                if p < 0.0 {
                    s = -s;
                }
                if s == 0.0 {
                    continue;
                }

                if k != m {
                    h[(k, k - 1)] = -s * x;
                } else if l != m {
                    h[(k, k - 1)] = -h[(k, k - 1)];
                }
                p += s;
                x = p / s;
                y = q / s;
                z = r / s;
                q /= p;
                r /= p;

                // Row modification.
                for j in k..nn {
                    p = h[(k, j)] + q * h[(k + 1, j)];
                    if notlast {
                        p += r * h[(k + 2, j)];
                        h[(k + 2, j)] -= p * z;
                    }
                    h[(k, j)] -= p * x;
                    h[(k + 1, j)] -= p * y;
                }

                // Column modification.
                for i in 0..=n.min(k + 3) {
                    p = x * h[(i, k)] + y * h[(i, k + 1)];
                    if notlast {
                        p += z * h[(i, k + 2)];
                        h[(i, k + 2)] -= p * r;
                    }
                    h[(i, k)] -= p;
                    h[(i, k + 1)] -= p * q;
                }

                // Accumulate transformations.
                if let Some(v) = v.as_deref_mut() {
                    for i in low..=high {
                        p = x * v[(i, k)] + y * v[(i, k + 1)];
                        if notlast {
                            p += z * v[(i, k + 2)];
                            v[(i, k + 2)] -= p * r;
                        }
                        v[(i, k)] -= p;
                        v[(i, k + 1)] -= p * q;
                    }
                }
            }
        }
    }

    // Bulge fill from the sweeps before each deflation is at rounding level.
    for j in 0..nn {
        for i in (j + 2)..nn {
            h[(i, j)] = 0.0;
        }
    }

    log::debug!("{exceptional} exceptional shifts in {total} QR sweeps");
    Ok(total)
}
