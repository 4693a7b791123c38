//! Maximum a posteriori dispersion shrinkage towards the trend

use ndarray::{Array2, ArrayView1};

use super::{log_posterior, maximize_log_alpha, DispersionParams, DispersionPrior};
use crate::stats::{mad_squared, trigamma};

/// Width of the log-normal prior.
///
/// `varLogDispEsts` is the squared MAD of `log(gene) - log(trend)` over genes
/// above `100 * min_disp`. The prior variance subtracts the sampling variance
/// expected from `m - p` residual degrees of freedom and is floored at 0.25.
pub fn estimate_prior_variance(
    gene_dispersions: &[f64],
    trended_dispersions: &[f64],
    n_samples: usize,
    n_coefs: usize,
    min_disp: f64,
) -> DispersionPrior {
    let log_residuals: Vec<f64> = gene_dispersions
        .iter()
        .zip(trended_dispersions)
        .filter(|(&g, &t)| g.is_finite() && t.is_finite() && g >= 100.0 * min_disp && t > 0.0)
        .map(|(&g, &t)| g.ln() - t.ln())
        .collect();

    if log_residuals.len() < 3 {
        return DispersionPrior {
            prior_var: 0.25,
            var_log_disp_ests: 0.25,
        };
    }

    let var_log_disp_ests = mad_squared(&log_residuals);
    let prior_var = if n_samples > n_coefs {
        let expected = trigamma((n_samples - n_coefs) as f64 / 2.0);
        (var_log_disp_ests - expected).max(0.25)
    } else {
        0.25
    };

    log::debug!(
        "Prior var: n_samples={}, n_coefs={}, varLogDispEsts={:.4}, dispPriorVar={:.4}",
        n_samples,
        n_coefs,
        var_log_disp_ests,
        prior_var
    );

    DispersionPrior {
        prior_var,
        var_log_disp_ests,
    }
}

/// MAP dispersion for one gene at the means from the gene-wise step
pub fn fit_map_dispersion(
    counts: ArrayView1<f64>,
    design: &Array2<f64>,
    mu: &[f64],
    gene_disp: f64,
    trend_disp: f64,
    prior_var: f64,
    params: &DispersionParams,
) -> f64 {
    if !gene_disp.is_finite() {
        return f64::NAN;
    }
    let max_disp = params.max_disp(counts.len());
    if !(trend_disp > 0.0 && trend_disp.is_finite()) {
        return gene_disp.clamp(params.min_disp, max_disp);
    }

    let counts = counts.to_vec();
    let prior = Some((trend_disp.ln(), prior_var));
    let log_alpha = maximize_log_alpha(
        |x| log_posterior(&counts, design, mu, x, prior),
        params.min_disp.ln(),
        max_disp.ln(),
        params,
    );
    log_alpha.exp().clamp(params.min_disp, max_disp)
}

/// Upper outliers sit more than `outlier_sd` standard deviations of
/// `varLogDispEsts` above the trend. They keep their gene-wise estimate.
pub fn is_dispersion_outlier(gene_disp: f64, trend_disp: f64, prior: &DispersionPrior, outlier_sd: f64) -> bool {
    gene_disp.is_finite()
        && trend_disp.is_finite()
        && gene_disp > 0.0
        && trend_disp > 0.0
        && gene_disp.ln() - trend_disp.ln() > outlier_sd * prior.var_log_disp_ests.sqrt()
}
