//! Balancing: a permutation and diagonal scaling similarity transform that
//! isolates trivially known eigenvalues and evens out row/column norms before
//! an eigenvalue computation.
//!
//! Balancing computes `B = D⁻¹·Pᵀ·A·P·D`, where `P` is a permutation and `D`
//! a diagonal matrix of powers of two. The permutation moves rows and columns
//! that decouple from the rest of the matrix to the bottom and top, leaving an
//! active block `B[i_low..i_high, i_low..i_high]`. Every diagonal entry of `B`
//! outside of that block is an eigenvalue of `A`.
//!
//! Permutations and scalings are packed into a single array, see
//! [`BalanceRecord`].

use std::ops::Range;

use nalgebra::DMatrix;

use crate::error::{ensure_square, EigenError, Result};
use crate::scalar::{Scalar, EPS, SAFE_MIN};

/// Minimum relative improvement of `‖col‖ + ‖row‖` for a scaling to be applied.
const FACTOR: f64 = 0.95;

/// Scaling factors are powers of this base so they are exact in floating point.
const RADIX: f64 = 2.0;

const SAFE_MIN_1: f64 = SAFE_MIN / (EPS * 2.0);
const SAFE_MAX_1: f64 = 1.0 / SAFE_MIN_1;
const SAFE_MIN_2: f64 = SAFE_MIN_1 * RADIX;
const SAFE_MAX_2: f64 = 1.0 / SAFE_MIN_2;

/// Which parts of balancing to perform.
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BalanceConfig {
    /// Isolate eigenvalues by permuting rows and columns.
    pub permute: bool,
    /// Scale the active block so row and column norms are comparable.
    pub scale: bool,
    /// Balance the caller's matrix instead of a private copy.
    pub in_place: bool,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            permute: true,
            scale: true,
            in_place: false,
        }
    }
}

impl BalanceConfig {
    pub fn permute(mut self, permute: bool) -> Self {
        self.permute = permute;
        self
    }

    pub fn scale(mut self, scale: bool) -> Self {
        self.scale = scale;
        self
    }

    pub fn in_place(mut self, in_place: bool) -> Self {
        self.in_place = in_place;
        self
    }
}

/// Bookkeeping of one balancing: the active block bounds and the packed
/// permutation/scaling array.
///
/// `scale_perm[..i_low]` and `scale_perm[i_high..]` hold the index each
/// position was swapped with, `scale_perm[i_low..i_high]` holds the diagonal
/// of `D`.
#[derive(Clone, Debug, PartialEq)]
pub struct BalanceRecord {
    i_low: usize,
    i_high: usize,
    scale_perm: Vec<f64>,
}

impl BalanceRecord {
    /// Record of a balancing that did nothing.
    pub fn identity(n: usize) -> Self {
        Self {
            i_low: 0,
            i_high: n,
            scale_perm: vec![1.0; n],
        }
    }

    /// Dimension of the balanced matrix.
    pub fn size(&self) -> usize {
        self.scale_perm.len()
    }

    /// First row/column of the active block.
    pub fn i_low(&self) -> usize {
        self.i_low
    }

    /// One past the last row/column of the active block.
    pub fn i_high(&self) -> usize {
        self.i_high
    }

    pub fn scale_perm(&self) -> &[f64] {
        &self.scale_perm
    }

    /// The swaps `(position, target)` in the order they were applied.
    fn swaps(&self) -> impl DoubleEndedIterator<Item = (usize, usize)> + '_ {
        let n = self.size();
        (self.i_high..n)
            .rev()
            .chain(0..self.i_low)
            .map(move |k| (k, self.scale_perm[k] as usize))
            .filter(|(k, target)| k != target)
    }

    /// The permutation matrix `P`.
    pub fn p(&self) -> DMatrix<f64> {
        let mut p = DMatrix::identity(self.size(), self.size());
        for (k, target) in self.swaps() {
            p.swap_columns(k, target);
        }
        p
    }

    /// The scaling matrix `D`.
    ///
    /// With `full` set this is the `n×n` diagonal matrix, otherwise the
    /// `1×n` row of its diagonal entries.
    pub fn d(&self, full: bool) -> DMatrix<f64> {
        let n = self.size();
        let diag = |i: usize| {
            if (self.i_low..self.i_high).contains(&i) {
                self.scale_perm[i]
            } else {
                1.0
            }
        };
        if full {
            DMatrix::from_fn(n, n, |i, j| if i == j { diag(i) } else { 0.0 })
        } else {
            DMatrix::from_fn(1, n, |_, j| diag(j))
        }
    }

    /// The full balancing transform `P·D`, so that `B = (P·D)⁻¹·A·(P·D)`.
    pub fn transform(&self) -> DMatrix<f64> {
        self.p() * self.d(true)
    }

    /// Computes `P·D·M`.
    pub fn apply_left_transform<T: Scalar>(&self, m: &DMatrix<T>) -> Result<DMatrix<T>> {
        if m.nrows() != self.size() {
            return Err(EigenError::Shape {
                expected: (self.size(), m.ncols()),
                got: m.shape(),
            });
        }
        let mut out = m.clone();
        for i in self.i_low..self.i_high {
            let s = self.scale_perm[i];
            for j in 0..out.ncols() {
                out[(i, j)] = out[(i, j)].scale(s);
            }
        }
        for (k, target) in self.swaps().rev() {
            out.swap_rows(k, target);
        }
        Ok(out)
    }

    /// Computes `M·D⁻¹·P⁻¹`.
    pub fn apply_right_transform<T: Scalar>(&self, m: &DMatrix<T>) -> Result<DMatrix<T>> {
        if m.ncols() != self.size() {
            return Err(EigenError::Shape {
                expected: (m.nrows(), self.size()),
                got: m.shape(),
            });
        }
        let mut out = m.clone();
        for j in self.i_low..self.i_high {
            let s = 1.0 / self.scale_perm[j];
            for i in 0..out.nrows() {
                out[(i, j)] = out[(i, j)].scale(s);
            }
        }
        for (k, target) in self.swaps().rev() {
            out.swap_columns(k, target);
        }
        Ok(out)
    }
}

/// Balances `a` in place and returns the record needed to undo it.
pub fn balance_in_place<T: Scalar>(
    a: &mut DMatrix<T>,
    permute: bool,
    scale: bool,
) -> Result<BalanceRecord> {
    puffin::profile_function!();
    ensure_square(a.shape())?;

    let n = a.nrows();
    let mut record = BalanceRecord::identity(n);

    if permute {
        puffin::profile_scope!("permute");
        isolate_eigenvalues(a, &mut record);
    }

    if scale && record.i_low != record.i_high {
        puffin::profile_scope!("scale");
        if let Err(err) = scale_active_block(a, &mut record) {
            // Permutations and power-of-two scalings invert exactly.
            *a = record.apply_right_transform(&record.apply_left_transform(a)?)?;
            return Err(err);
        }
    }

    log::debug!(
        "balanced {n}x{n} matrix, active block [{}, {})",
        record.i_low,
        record.i_high
    );
    Ok(record)
}

fn swap_row_col<T: Scalar>(a: &mut DMatrix<T>, i: usize, j: usize) {
    a.swap_rows(i, j);
    a.swap_columns(i, j);
}

/// Pushes rows with no off-diagonal entries in the active columns to the
/// bottom, then columns with no off-diagonal entries in the active rows to
/// the top.
fn isolate_eigenvalues<T: Scalar>(a: &mut DMatrix<T>, record: &mut BalanceRecord) {
    'rows: loop {
        let high = record.i_high;
        for i in (0..high).rev() {
            if (0..high).all(|j| j == i || a[(i, j)].is_zero()) {
                record.scale_perm[high - 1] = i as f64;
                if i != high - 1 {
                    swap_row_col(a, i, high - 1);
                }
                record.i_high -= 1;
                if record.i_high == 0 {
                    record.i_low = 0;
                    return;
                }
                continue 'rows;
            }
        }
        break;
    }

    'cols: loop {
        let (low, high) = (record.i_low, record.i_high);
        for j in low..high {
            if (low..high).all(|i| i == j || a[(i, j)].is_zero()) {
                record.scale_perm[low] = j as f64;
                if j != low {
                    swap_row_col(a, j, low);
                }
                record.i_low += 1;
                continue 'cols;
            }
        }
        break;
    }
}

/// 2-norm of the entries, accumulated with a running scale so that it
/// neither overflows nor underflows.
fn norm2<T: Scalar>(values: impl Iterator<Item = T>) -> f64 {
    let mut scale = 0.0_f64;
    let mut ssq = 1.0_f64;
    for v in values {
        let a = v.modulus();
        if a != 0.0 {
            if scale < a {
                ssq = 1.0 + ssq * (scale / a) * (scale / a);
                scale = a;
            } else {
                ssq += (a / scale) * (a / scale);
            }
        }
    }
    scale * ssq.sqrt()
}

fn max_abs<T: Scalar>(values: impl Iterator<Item = T>) -> f64 {
    values.fold(0.0, |acc: f64, v| {
        let a = v.modulus();
        if a.is_nan() || a > acc {
            a
        } else {
            acc
        }
    })
}

fn column<'m, T: Scalar>(
    a: &'m DMatrix<T>,
    j: usize,
    rows: Range<usize>,
) -> impl Iterator<Item = T> + 'm {
    rows.map(move |i| a[(i, j)])
}

fn row<'m, T: Scalar>(
    a: &'m DMatrix<T>,
    i: usize,
    cols: Range<usize>,
) -> impl Iterator<Item = T> + 'm {
    cols.map(move |j| a[(i, j)])
}

/// Repeatedly rescales row/column pairs of the active block by powers of two
/// until no pass improves any pair.
fn scale_active_block<T: Scalar>(a: &mut DMatrix<T>, record: &mut BalanceRecord) -> Result<()> {
    let n = a.nrows();
    let (low, high) = (record.i_low, record.i_high);
    let mut passes = 0usize;

    let mut converged = false;
    while !converged {
        converged = true;
        passes += 1;

        for i in low..high {
            let mut c = norm2(column(a, i, low..high));
            let mut r = norm2(row(a, i, low..high));
            let mut ca = max_abs(column(a, i, 0..high));
            let mut ra = max_abs(row(a, i, low..n));

            if c == 0.0 || r == 0.0 {
                continue;
            }
            if (c + ca + r + ra).is_nan() {
                return Err(EigenError::Numerical(format!(
                    "NaN encountered while balancing row/column {i}"
                )));
            }

            let s = c + r;
            let mut f = 1.0_f64;

            // Scale the column up and the row down.
            let mut g = r / RADIX;
            while c < g && f.max(c).max(ca) < SAFE_MAX_2 && r.min(g).min(ra) > SAFE_MIN_2 {
                f *= RADIX;
                c *= RADIX;
                ca *= RADIX;
                r /= RADIX;
                g /= RADIX;
                ra /= RADIX;
            }

            // Scale the column down and the row up.
            g = c / RADIX;
            while g >= r && r.max(ra) < SAFE_MAX_2 && f.min(c).min(g).min(ca) > SAFE_MIN_2 {
                f /= RADIX;
                c /= RADIX;
                g /= RADIX;
                ca /= RADIX;
                r *= RADIX;
                ra *= RADIX;
            }

            if c + r >= FACTOR * s {
                continue;
            }
            let current = record.scale_perm[i];
            if f < 1.0 && current < 1.0 && f * current <= SAFE_MIN_1 {
                continue;
            }
            if f > 1.0 && current > 1.0 && current >= SAFE_MAX_1 / f {
                continue;
            }

            log::trace!("scaling row/column {i} by {f}");
            record.scale_perm[i] = current * f;
            converged = false;

            let f_inv = 1.0 / f;
            for j in low..n {
                a[(i, j)] = a[(i, j)].scale(f_inv);
            }
            for k in 0..high {
                a[(k, i)] = a[(k, i)].scale(f);
            }
        }
    }

    log::debug!("scaling converged after {passes} passes");
    Ok(())
}

enum Workspace<'a, T: Scalar> {
    Borrowed(&'a mut DMatrix<T>),
    Owned(DMatrix<T>),
}

impl<'a, T: Scalar> Workspace<'a, T> {
    fn matrix(&self) -> &DMatrix<T> {
        match self {
            Workspace::Borrowed(m) => m,
            Workspace::Owned(m) => m,
        }
    }

    fn matrix_mut(&mut self) -> &mut DMatrix<T> {
        match self {
            Workspace::Borrowed(m) => m,
            Workspace::Owned(m) => m,
        }
    }
}

struct Balanced<'a, T: Scalar> {
    matrix: Workspace<'a, T>,
    record: BalanceRecord,
}

/// Balances square matrices and keeps the last result around for inspection.
///
/// ```
/// use balanced_eigen::{BalanceConfig, Balancer};
/// use nalgebra::DMatrix;
///
/// let a = DMatrix::from_row_slice(2, 2, &[1.0, 1024.0, 1.0 / 1024.0, 1.0]);
/// let mut balancer = Balancer::new(BalanceConfig::default());
/// balancer.decompose_copy(&a)?;
/// assert!(balancer.b()?.norm() < a.norm() / 100.0);
/// # Ok::<(), balanced_eigen::EigenError>(())
/// ```
pub struct Balancer<'a, T: Scalar> {
    config: BalanceConfig,
    state: Option<Balanced<'a, T>>,
}

impl<'a, T: Scalar> Balancer<'a, T> {
    pub fn new(config: BalanceConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    pub fn config(&self) -> &BalanceConfig {
        &self.config
    }

    /// Balances `src`.
    ///
    /// With [`BalanceConfig::in_place`] set, `src` itself is overwritten with
    /// the balanced matrix; otherwise a copy is balanced and `src` is left
    /// untouched. Either way `src` stays borrowed for as long as the balancer
    /// lives; use [`Balancer::decompose_copy`] to balance without holding on
    /// to it. If balancing fails, `src` is restored to its original entries.
    pub fn decompose(&mut self, src: &'a mut DMatrix<T>) -> Result<&mut Self> {
        let workspace = if self.config.in_place {
            Workspace::Borrowed(src)
        } else {
            Workspace::Owned(src.clone())
        };
        self.run(workspace)
    }

    /// Balances a private copy of `src`, whatever the `in_place` setting.
    pub fn decompose_copy(&mut self, src: &DMatrix<T>) -> Result<&mut Self> {
        self.run(Workspace::Owned(src.clone()))
    }

    fn run(&mut self, mut matrix: Workspace<'a, T>) -> Result<&mut Self> {
        self.state = None;
        let record = balance_in_place(
            matrix.matrix_mut(),
            self.config.permute,
            self.config.scale,
        )?;
        self.state = Some(Balanced { matrix, record });
        Ok(self)
    }

    fn balanced(&self) -> Result<&Balanced<'a, T>> {
        self.state.as_ref().ok_or(EigenError::IllegalState(
            "no matrix has been balanced yet, call decompose first",
        ))
    }

    /// The balanced matrix `B`.
    pub fn b(&self) -> Result<&DMatrix<T>> {
        Ok(self.balanced()?.matrix.matrix())
    }

    /// The active block `B[i_low..i_high, i_low..i_high]`.
    pub fn b_sub_matrix(&self) -> Result<DMatrix<T>> {
        let state = self.balanced()?;
        let (low, high) = (state.record.i_low, state.record.i_high);
        let b = state.matrix.matrix();
        Ok(DMatrix::from_fn(high - low, high - low, |i, j| {
            b[(low + i, low + j)]
        }))
    }

    pub fn record(&self) -> Result<&BalanceRecord> {
        Ok(&self.balanced()?.record)
    }

    pub fn i_low(&self) -> Result<usize> {
        Ok(self.record()?.i_low)
    }

    pub fn i_high(&self) -> Result<usize> {
        Ok(self.record()?.i_high)
    }

    pub fn scale_perm(&self) -> Result<&[f64]> {
        Ok(self.record()?.scale_perm())
    }

    pub fn p(&self) -> Result<DMatrix<f64>> {
        Ok(self.record()?.p())
    }

    pub fn d(&self, full: bool) -> Result<DMatrix<f64>> {
        Ok(self.record()?.d(full))
    }

    /// The combined transform `P·D`.
    pub fn transform(&self) -> Result<DMatrix<f64>> {
        Ok(self.record()?.transform())
    }

    pub fn apply_left_transform(&self, m: &DMatrix<T>) -> Result<DMatrix<T>> {
        self.record()?.apply_left_transform(m)
    }

    pub fn apply_right_transform(&self, m: &DMatrix<T>) -> Result<DMatrix<T>> {
        self.record()?.apply_right_transform(m)
    }
}
