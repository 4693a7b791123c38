//! Small dense linear algebra on row-major `n x n` slices.
//! Design matrices here have a handful of columns, so plain loops are enough.

use ndarray::Array2;

/// Cholesky factor `L` of a symmetric matrix. Non-positive pivots are
/// replaced by a tiny epsilon so nearly singular systems still solve.
fn cholesky(a: &[f64], n: usize) -> Vec<f64> {
    let mut l = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                l[i * n + j] = if sum <= 0.0 { 1e-12_f64.sqrt() } else { sum.sqrt() };
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }
    l
}

/// Solve `A x = b` for symmetric positive (semi-)definite `A`
pub fn solve_symmetric(a: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let l = cholesky(a, n);

    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * n + j] * y[j];
        }
        y[i] = sum / l[i * n + i];
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j * n + i] * x[j];
        }
        x[i] = sum / l[i * n + i];
    }
    x
}

pub fn invert_symmetric(a: &[f64], n: usize) -> Vec<f64> {
    let mut inverse = vec![0.0; n * n];
    for i in 0..n {
        let mut e = vec![0.0; n];
        e[i] = 1.0;
        let col = solve_symmetric(a, &e, n);
        for j in 0..n {
            inverse[j * n + i] = col[j];
        }
    }
    inverse
}

/// `log det(A)` for symmetric positive definite `A`; NaN if it is not
pub fn log_det_symmetric(a: &[f64], n: usize) -> f64 {
    let mut l = vec![0.0; n * n];
    let mut log_det = 0.0;
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                if sum <= 0.0 {
                    return f64::NAN;
                }
                l[i * n + j] = sum.sqrt();
                log_det += sum.ln();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }
    log_det
}

/// `X' diag(w) X` as a row-major `p x p` matrix
pub fn weighted_gram(design: &Array2<f64>, weights: &[f64]) -> Vec<f64> {
    let p = design.ncols();
    let mut xtwx = vec![0.0; p * p];
    for (i, &w) in weights.iter().enumerate() {
        for j in 0..p {
            let xij = w * design[[i, j]];
            for k in 0..p {
                xtwx[j * p + k] += xij * design[[i, k]];
            }
        }
    }
    xtwx
}

/// Numerical rank by Gaussian elimination with partial pivoting
pub fn rank(matrix: &Array2<f64>) -> usize {
    let mut m = matrix.to_owned();
    let (nrow, ncol) = m.dim();
    let scale = m.iter().fold(0.0_f64, |acc, &x| acc.max(x.abs())).max(1.0);
    let tol = nrow.max(ncol) as f64 * f64::EPSILON * scale * 16.0;

    let mut rank = 0;
    for col in 0..ncol {
        if rank == nrow {
            break;
        }
        let pivot = (rank..nrow)
            .max_by(|&a, &b| m[[a, col]].abs().total_cmp(&m[[b, col]].abs()))
            .unwrap_or(rank);
        if m[[pivot, col]].abs() <= tol {
            continue;
        }
        for k in 0..ncol {
            m.swap([rank, k], [pivot, k]);
        }
        for row in (rank + 1)..nrow {
            let factor = m[[row, col]] / m[[rank, col]];
            for k in col..ncol {
                m[[row, k]] -= factor * m[[rank, k]];
            }
        }
        rank += 1;
    }
    rank
}
