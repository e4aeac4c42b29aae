// Derived from the Algol procedures orthes and ortran by Martin and Wilkinson,
// Handbook for Auto. Comp., Vol.ii-Linear Algebra, by way of the public domain
// Jama library.

use std::ops::Range;

use nalgebra::{DMatrix, DVector};

/// Reduces the `active` rows and columns of `h` to upper Hessenberg form with
/// Householder similarity transforms.
///
/// `h` must already be upper triangular outside of `active`, which is how
/// balancing leaves it. On return every entry below the sub-diagonal is
/// exactly zero. With `accumulate` set, the orthogonal `V` with
/// `A = V·H·Vᵀ` is returned.
pub(crate) fn reduce_to_hessenberg(
    h: &mut DMatrix<f64>,
    active: Range<usize>,
    accumulate: bool,
) -> Option<DMatrix<f64>> {
    puffin::profile_function!();
    let n = h.nrows();
    let mut v = accumulate.then(|| DMatrix::identity(n, n));
    if active.len() < 3 {
        return v;
    }

    let low = active.start;
    let high = active.end - 1;
    let mut ort = DVector::zeros(n);

    for m in (low + 1)..high {
        // Scale column.
        let scale: f64 = (m..=high).map(|i| h[(i, m - 1)].abs()).sum();
        if scale == 0.0 {
            continue;
        }

        // Compute Householder transformation.
        let mut hh = 0.0;
        for i in (m..=high).rev() {
            ort[i] = h[(i, m - 1)] / scale;
            hh += ort[i] * ort[i];
        }
        let mut g = hh.sqrt();
        if ort[m] > 0.0 {
            g = -g;
        }
        hh -= ort[m] * g;
        ort[m] -= g;

        // H = (I - u·uᵀ/h)·H·(I - u·uᵀ/h)
        for j in m..n {
            let mut f = 0.0;
            for i in (m..=high).rev() {
                f += ort[i] * h[(i, j)];
            }
            f /= hh;
            for i in m..=high {
                h[(i, j)] -= f * ort[i];
            }
        }
        for i in 0..=high {
            let mut f = 0.0;
            for j in (m..=high).rev() {
                f += ort[j] * h[(i, j)];
            }
            f /= hh;
            for j in m..=high {
                h[(i, j)] -= f * ort[j];
            }
        }
        ort[m] *= scale;
        h[(m, m - 1)] = scale * g;
    }

    if let Some(v) = v.as_mut() {
        // Accumulate transformations.
        for m in ((low + 1)..high).rev() {
            if h[(m, m - 1)] == 0.0 {
                continue;
            }
            for i in (m + 1)..=high {
                ort[i] = h[(i, m - 1)];
            }
            for j in m..=high {
                let mut g = 0.0;
                for i in m..=high {
                    g += ort[i] * v[(i, j)];
                }
                // Double division avoids possible underflow.
                g = (g / ort[m]) / h[(m, m - 1)];
                for i in m..=high {
                    v[(i, j)] += g * ort[i];
                }
            }
        }
    }

    // The Householder vectors were kept below the sub-diagonal.
    for j in 0..n {
        for i in (j + 2)..n {
            h[(i, j)] = 0.0;
        }
    }
    v
}
