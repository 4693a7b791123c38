//! GLM fitting using Iteratively Reweighted Least Squares (IRLS)

use ndarray::{Array2, ArrayView1};

use super::linalg::{invert_symmetric, solve_symmetric, weighted_gram};
use super::negative_binomial::{nb_log_density, nb_mean, nb_weight, MAX_BETA, MIN_MU};

/// Configurable parameters for GLM fitting
#[derive(Debug, Clone)]
pub struct GlmFitParams {
    /// Maximum IRLS iterations
    pub maxit: usize,
    /// Relative deviance change that counts as converged
    pub beta_tol: f64,
    /// Ridge penalty added to the diagonal of X'WX
    pub ridge: f64,
}

impl Default for GlmFitParams {
    fn default() -> Self {
        let ln2 = std::f64::consts::LN_2;
        Self {
            maxit: 100,
            beta_tol: 1e-8,
            ridge: 1e-6 / (ln2 * ln2),
        }
    }
}

/// Per-gene result of a negative binomial GLM fit
#[derive(Debug, Clone)]
pub struct GlmFitResult {
    /// Coefficients on the natural log scale
    pub coefficients: Vec<f64>,
    pub standard_errors: Vec<f64>,
    pub hat_diagonals: Vec<f64>,
    pub mu: Vec<f64>,
    pub log_likelihood: f64,
    pub converged: bool,
}

impl GlmFitResult {
    /// Result for a gene that cannot be fit (all-zero counts or no dispersion)
    pub fn unfitted(n_samples: usize, n_coefs: usize) -> Self {
        Self {
            coefficients: vec![f64::NAN; n_coefs],
            standard_errors: vec![f64::NAN; n_coefs],
            hat_diagonals: vec![f64::NAN; n_samples],
            mu: vec![0.0; n_samples],
            log_likelihood: f64::NAN,
            converged: false,
        }
    }
}

fn linear_predictor(design: &Array2<f64>, beta: &[f64], i: usize) -> f64 {
    beta.iter().enumerate().map(|(j, &b)| design[[i, j]] * b).sum()
}

/// Fit one gene: `counts ~ NB(size_factors * exp(X beta), alpha)`
pub fn fit_single_gene(
    counts: ArrayView1<f64>,
    design: &Array2<f64>,
    size_factors: &[f64],
    alpha: f64,
    params: &GlmFitParams,
) -> GlmFitResult {
    let n_samples = counts.len();
    let n_coefs = design.ncols();

    if counts.iter().all(|&c| c == 0.0) || !alpha.is_finite() || alpha <= 0.0 {
        return GlmFitResult::unfitted(n_samples, n_coefs);
    }

    // Start from OLS on log(normalized + 0.1)
    let log_counts: Vec<f64> = counts
        .iter()
        .zip(size_factors)
        .map(|(&c, &s)| (c / s + 0.1).ln())
        .collect();
    let ones = vec![1.0; n_samples];
    let xtx = weighted_gram(design, &ones);
    let xty: Vec<f64> = (0..n_coefs)
        .map(|j| (0..n_samples).map(|i| design[[i, j]] * log_counts[i]).sum())
        .collect();
    let mut beta = solve_symmetric(&xtx, &xty, n_coefs);
    if beta.iter().any(|b| !b.is_finite()) {
        let mean = log_counts.iter().sum::<f64>() / n_samples as f64;
        beta = vec![0.0; n_coefs];
        beta[0] = mean;
    }

    let mut converged = false;
    let mut dev_old = 0.0_f64;
    let mut mu = vec![0.0; n_samples];
    let mut weights = vec![0.0; n_samples];
    let mut z = vec![0.0; n_samples];

    for iter in 0..params.maxit {
        for i in 0..n_samples {
            let m = nb_mean(linear_predictor(design, &beta, i), size_factors[i]).max(MIN_MU);
            mu[i] = m;
            weights[i] = nb_weight(m, alpha);
            z[i] = (m / size_factors[i]).ln() + (counts[i] - m) / m;
        }

        let mut xtwx = weighted_gram(design, &weights);
        for j in 0..n_coefs {
            xtwx[j * n_coefs + j] += params.ridge;
        }
        let xtwz: Vec<f64> = (0..n_coefs)
            .map(|j| (0..n_samples).map(|i| weights[i] * design[[i, j]] * z[i]).sum())
            .collect();
        let next = solve_symmetric(&xtwx, &xtwz, n_coefs);

        if next.iter().any(|b| !b.is_finite() || b.abs() > MAX_BETA) {
            log::debug!("IRLS stopped at iteration {}: coefficient out of range", iter);
            break;
        }
        beta = next;

        let dev: f64 = (0..n_samples)
            .map(|i| {
                let m = nb_mean(linear_predictor(design, &beta, i), size_factors[i]).max(MIN_MU);
                -2.0 * nb_log_density(counts[i], m, alpha)
            })
            .sum();

        let change = (dev - dev_old).abs() / (dev.abs() + 0.1);
        if change.is_nan() {
            break;
        }
        if iter > 0 && change < params.beta_tol {
            converged = true;
            break;
        }
        dev_old = dev;
    }

    for i in 0..n_samples {
        let m = nb_mean(linear_predictor(design, &beta, i), size_factors[i]).max(MIN_MU);
        mu[i] = m;
        weights[i] = nb_weight(m, alpha);
    }
    let log_likelihood = (0..n_samples).map(|i| nb_log_density(counts[i], mu[i], alpha)).sum();
    let (standard_errors, hat_diagonals) = standard_errors_and_hat(design, &weights, params.ridge);

    GlmFitResult {
        coefficients: beta,
        standard_errors,
        hat_diagonals,
        mu,
        log_likelihood,
        converged,
    }
}

/// Sandwich covariance `(X'WX + R)^-1 X'WX (X'WX + R)^-1` and hat diagonals
fn standard_errors_and_hat(design: &Array2<f64>, weights: &[f64], ridge: f64) -> (Vec<f64>, Vec<f64>) {
    let n_samples = design.nrows();
    let p = design.ncols();

    let xtwx = weighted_gram(design, weights);
    let mut ridged = xtwx.clone();
    for j in 0..p {
        ridged[j * p + j] += ridge;
    }
    let inv = invert_symmetric(&ridged, p);

    let hat_diagonals = (0..n_samples)
        .map(|i| {
            let mut h = 0.0;
            for j in 0..p {
                for k in 0..p {
                    h += design[[i, j]] * inv[j * p + k] * design[[i, k]];
                }
            }
            weights[i] * h
        })
        .collect();

    let standard_errors = (0..p)
        .map(|j| {
            let mut var = 0.0;
            for a in 0..p {
                for b in 0..p {
                    var += inv[j * p + a] * xtwx[a * p + b] * inv[b * p + j];
                }
            }
            if var > 0.0 {
                var.sqrt()
            } else {
                f64::NAN
            }
        })
        .collect();

    (standard_errors, hat_diagonals)
}
