//! Dispersion estimation for negative binomial models

mod gene_wise;
mod map;
mod trend;

pub use gene_wise::{estimate_dispersion_gene, moments_disp_estimate, GeneDispersion};
pub use map::{estimate_prior_variance, fit_map_dispersion, is_dispersion_outlier};
pub use trend::{fit_dispersion_trend, DispersionTrend};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::glm::linalg::{log_det_symmetric, weighted_gram};
use crate::glm::nb_log_density;

/// Configurable parameters for dispersion estimation
#[derive(Debug, Clone)]
pub struct DispersionParams {
    /// Lower bound of every dispersion estimate
    pub min_disp: f64,
    /// Golden-section stopping width on the log-dispersion scale
    pub disp_tol: f64,
    /// Points in the coarse log-dispersion grid
    pub grid_size: usize,
    /// Maximum golden-section iterations
    pub maxit: usize,
    /// Genes more than this many SDs above the trend keep their gene-wise estimate
    pub outlier_sd: f64,
}

impl Default for DispersionParams {
    fn default() -> Self {
        Self {
            min_disp: 1e-8,
            disp_tol: 1e-6,
            grid_size: 20,
            maxit: 100,
            outlier_sd: 2.0,
        }
    }
}

impl DispersionParams {
    /// Upper bound of every dispersion estimate: `max(n_samples, 10)`
    pub fn max_disp(&self, n_samples: usize) -> f64 {
        (n_samples as f64).max(10.0)
    }
}

/// Log-normal prior on the dispersion, centred on the fitted trend.
/// Fixed after the first fit so refitting reuses it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DispersionPrior {
    pub prior_var: f64,
    /// Variance of log gene-wise estimates around the trend
    pub var_log_disp_ests: f64,
}

/// Cox-Reid adjusted NB log likelihood of one gene as a function of
/// `log_alpha`, with an optional normal prior `(log_trend, prior_var)` on
/// `log_alpha`. `mu` is held fixed.
pub(crate) fn log_posterior(
    counts: &[f64],
    design: &Array2<f64>,
    mu: &[f64],
    log_alpha: f64,
    prior: Option<(f64, f64)>,
) -> f64 {
    let alpha = log_alpha.exp();

    let log_lik: f64 = counts
        .iter()
        .zip(mu)
        .map(|(&y, &m)| nb_log_density(y, m.max(1e-10), alpha))
        .sum();

    let weights: Vec<f64> = mu.iter().map(|&m| 1.0 / (1.0 / m.max(1e-10) + alpha)).collect();
    let log_det = log_det_symmetric(&weighted_gram(design, &weights), design.ncols());
    let cox_reid = if log_det.is_finite() { -0.5 * log_det } else { 0.0 };

    let log_prior = match prior {
        Some((log_trend, prior_var)) => -(log_alpha - log_trend).powi(2) / (2.0 * prior_var),
        None => 0.0,
    };

    log_lik + cox_reid + log_prior
}

/// Maximize `objective` over `[lower, upper]`: a coarse grid locates the
/// basin, golden-section search refines it.
pub(crate) fn maximize_log_alpha<F>(objective: F, lower: f64, upper: f64, params: &DispersionParams) -> f64
where
    F: Fn(f64) -> f64,
{
    let n_grid = params.grid_size.max(3);
    let delta = (upper - lower) / (n_grid - 1) as f64;

    let mut best = lower;
    let mut best_value = f64::NEG_INFINITY;
    for k in 0..n_grid {
        let x = lower + k as f64 * delta;
        let value = objective(x);
        if value > best_value {
            best = x;
            best_value = value;
        }
    }

    let inv_phi = (5.0_f64.sqrt() - 1.0) / 2.0;
    let mut a = (best - delta).max(lower);
    let mut b = (best + delta).min(upper);
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let mut fc = objective(c);
    let mut fd = objective(d);

    for _ in 0..params.maxit {
        if (b - a).abs() < params.disp_tol {
            break;
        }
        if fc > fd {
            b = d;
            d = c;
            fd = fc;
            c = b - inv_phi * (b - a);
            fc = objective(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + inv_phi * (b - a);
            fd = objective(d);
        }
    }

    let refined = (a + b) / 2.0;
    if objective(refined) >= best_value {
        refined
    } else {
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_maximize_finds_parabola_peak() {
        let params = DispersionParams::default();
        let peak = maximize_log_alpha(|x| -(x - 1.3).powi(2), -5.0, 5.0, &params);
        assert!((peak - 1.3).abs() < 1e-5);

        // Peak outside the interval clamps to the bound
        let edge = maximize_log_alpha(|x| x, -5.0, 2.0, &params);
        assert!((edge - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_prior_pulls_towards_trend() {
        let design = array![[1.0], [1.0], [1.0], [1.0]];
        let counts = [10.0, 30.0, 12.0, 40.0];
        let mu = [23.0; 4];
        let params = DispersionParams::default();
        let (lo, hi) = (params.min_disp.ln(), params.max_disp(4).ln());

        let free = maximize_log_alpha(|x| log_posterior(&counts, &design, &mu, x, None), lo, hi, &params);
        let trend = (0.01_f64).ln();
        let shrunk =
            maximize_log_alpha(|x| log_posterior(&counts, &design, &mu, x, Some((trend, 0.25))), lo, hi, &params);
        assert!(shrunk < free);
        assert!(shrunk > trend);
    }
}
