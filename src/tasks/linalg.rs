//! Dense linear algebra helpers for the RLS solvers

use ndarray::{Array1, Array2};

/// Cholesky factorization of a symmetric positive-definite matrix.
/// Returns the lower-triangular factor L with A = L * L^T, or None if the
/// matrix is not positive definite.
pub fn cholesky_factor(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    if n != a.ncols() {
        return None;
    }

    let mut l = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Some(l)
}

fn solve_with_factor(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();

    // Forward substitution: L * y = b
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T * x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    x
}

/// Solve A X = B for symmetric positive-definite A and multi-column B
/// via a single Cholesky factorization. Falls back to Gauss-Jordan if A is
/// near-singular.
pub fn solve_spd(a: &Array2<f64>, b: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.nrows() {
        return None;
    }

    if let Some(l) = cholesky_factor(a) {
        let mut x = Array2::zeros((n, b.ncols()));
        for (j, col) in b.columns().into_iter().enumerate() {
            let solved = solve_with_factor(&l, &col.to_owned());
            x.column_mut(j).assign(&solved);
        }
        return Some(x);
    }

    // Not positive definite as given; invert the long way
    matrix_inverse(a).map(|inv| inv.dot(b))
}

/// Inverse of a symmetric positive-definite matrix, Cholesky first with a
/// Gauss-Jordan fallback
pub fn spd_inverse(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let identity = Array2::eye(n);
    solve_spd(a, &identity)
}

/// Matrix inversion via Gauss-Jordan elimination with partial pivoting
pub fn matrix_inverse(m: &Array2<f64>) -> Option<Array2<f64>> {
    let n = m.nrows();
    if n != m.ncols() {
        return None;
    }

    // Augmented matrix [M | I]
    let mut aug = Array2::zeros((n, 2 * n));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = m[[i, j]];
        }
        aug[[i, n + i]] = 1.0;
    }

    for col in 0..n {
        let mut max_row = col;
        for row in col + 1..n {
            if aug[[row, col]].abs() > aug[[max_row, col]].abs() {
                max_row = row;
            }
        }
        if max_row != col {
            for j in 0..2 * n {
                let tmp = aug[[col, j]];
                aug[[col, j]] = aug[[max_row, j]];
                aug[[max_row, j]] = tmp;
            }
        }
        if aug[[col, col]].abs() < 1e-12 {
            return None;
        }
        let pivot = aug[[col, col]];
        for j in 0..2 * n {
            aug[[col, j]] /= pivot;
        }
        for row in 0..n {
            if row != col {
                let factor = aug[[row, col]];
                for j in 0..2 * n {
                    aug[[row, j]] -= factor * aug[[col, j]];
                }
            }
        }
    }

    let mut inv = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            inv[[i, j]] = aug[[i, n + j]];
        }
    }
    Some(inv)
}

/// Log-spaced grid of `count` values from `lo` to `hi` inclusive
pub fn logspace(lo: f64, hi: f64, count: usize) -> Vec<f64> {
    assert!(lo > 0.0 && hi > 0.0 && count > 0);
    if count == 1 {
        return vec![hi];
    }
    let (log_lo, log_hi) = (lo.ln(), hi.ln());
    let step = (log_hi - log_lo) / (count - 1) as f64;
    (0..count)
        .map(|i| (log_lo + step * i as f64).exp())
        .collect()
}
