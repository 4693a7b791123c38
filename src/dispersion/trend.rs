//! Dispersion trend fitting

use serde::{Deserialize, Serialize};

use crate::error::{DeseqError, Result};

/// Fitted dispersion-mean relationship
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DispersionTrend {
    /// `asympt_disp + extra_pois / mean`
    Parametric { asympt_disp: f64, extra_pois: f64 },
    /// One value for every gene, used when the parametric fit fails
    Mean(f64),
}

impl DispersionTrend {
    /// Trended dispersion at a given mean of normalized counts
    pub fn evaluate(&self, mean: f64) -> f64 {
        match *self {
            DispersionTrend::Parametric { asympt_disp, extra_pois } => {
                if mean > 0.0 {
                    asympt_disp + extra_pois / mean
                } else {
                    asympt_disp
                }
            }
            DispersionTrend::Mean(value) => value,
        }
    }
}

/// Fit the trend of gene-wise dispersions against base means.
///
/// Non-finite dispersions (all-zero genes) are ignored. When the gamma fit
/// fails the trend is the mean of the usable dispersions, or `min_disp` if
/// there are none.
pub fn fit_dispersion_trend(means: &[f64], dispersions: &[f64], min_disp: f64) -> DispersionTrend {
    let valid: Vec<(f64, f64)> = means
        .iter()
        .zip(dispersions)
        .filter(|(&m, &d)| m > 0.0 && d.is_finite() && d > 100.0 * min_disp)
        .map(|(&m, &d)| (m, d))
        .collect();

    match fit_parametric(&valid) {
        Ok((asympt_disp, extra_pois)) => {
            log::debug!("Parametric trend: asymptDisp={:.6}, extraPois={:.6}", asympt_disp, extra_pois);
            DispersionTrend::Parametric { asympt_disp, extra_pois }
        }
        Err(e) => {
            let usable: Vec<f64> = dispersions
                .iter()
                .copied()
                .filter(|&d| d.is_finite() && d > 10.0 * min_disp)
                .collect();
            let mean = if usable.is_empty() {
                min_disp
            } else {
                usable.iter().sum::<f64>() / usable.len() as f64
            };
            log::info!("{}; using the mean dispersion {:.6} as trend", e, mean);
            DispersionTrend::Mean(mean)
        }
    }
}

/// Iterated gamma GLM on `disp ~ a0 + a1 / mean`, dropping points whose
/// residual `disp / fitted` falls outside (1e-4, 15) at each round
fn fit_parametric(data: &[(f64, f64)]) -> Result<(f64, f64)> {
    if data.len() < 3 {
        return Err(DeseqError::TrendFittingFailed {
            reason: "Not enough valid data points for trend fitting".to_string(),
        });
    }

    let mut coefs = (0.1_f64, 1.0_f64);
    for iter in 0..11 {
        let old = coefs;
        let good: Vec<(f64, f64)> = data
            .iter()
            .filter(|&&(mean, disp)| {
                let fitted = coefs.0 + coefs.1 / mean;
                fitted > 0.0 && disp / fitted > 1e-4 && disp / fitted < 15.0
            })
            .copied()
            .collect();

        if good.len() < 3 {
            return Err(DeseqError::TrendFittingFailed {
                reason: "Not enough good residuals for parametric fit".to_string(),
            });
        }

        let (new_coefs, glm_converged) = fit_gamma_identity(&good, coefs);
        coefs = new_coefs;
        log::debug!("Parametric fit iter {}: {} genes, a0={:.6}, a1={:.6}", iter + 1, good.len(), coefs.0, coefs.1);

        if coefs.0 <= 0.0 || coefs.1 <= 0.0 {
            return Err(DeseqError::TrendFittingFailed {
                reason: format!(
                    "parametric dispersion fit failed: coefficients not positive (a0={:.4}, a1={:.4})",
                    coefs.0, coefs.1
                ),
            });
        }

        let log_change = (coefs.0 / old.0).ln().powi(2) + (coefs.1 / old.1).ln().powi(2);
        if log_change < 1e-6 && glm_converged {
            return Ok(coefs);
        }
    }

    Err(DeseqError::TrendFittingFailed {
        reason: "dispersion fit did not converge".to_string(),
    })
}

fn gamma_deviance(data: &[(f64, f64)], a0: f64, a1: f64) -> f64 {
    data.iter()
        .map(|&(mean, disp)| {
            let mu = (a0 + a1 / mean).max(1e-8);
            2.0 * (-(disp / mu).ln() + (disp - mu) / mu)
        })
        .sum()
}

/// Gamma family, identity link, predictor `1 / mean`
fn fit_gamma_identity(data: &[(f64, f64)], start: (f64, f64)) -> ((f64, f64), bool) {
    let (mut a0, mut a1) = start;
    let mut dev_old = gamma_deviance(data, a0, a1);

    for _ in 0..25 {
        let (mut sw, mut swx, mut swz, mut swxx, mut swxz) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for &(mean, disp) in data {
            let x = 1.0 / mean;
            let mu = (a0 + a1 * x).max(1e-8);
            let w = 1.0 / (mu * mu);
            sw += w;
            swx += w * x;
            swz += w * disp;
            swxx += w * x * x;
            swxz += w * x * disp;
        }

        let det = sw * swxx - swx * swx;
        if det.abs() < 1e-10 {
            return ((a0, a1), false);
        }
        a0 = (swxx * swz - swx * swxz) / det;
        a1 = (sw * swxz - swx * swz) / det;

        let dev = gamma_deviance(data, a0, a1);
        if (dev_old - dev).abs() / (0.1 + dev.abs()) < 1e-8 {
            return ((a0, a1), true);
        }
        dev_old = dev;
    }

    ((a0, a1), false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parametric_trend_recovers_coefficients() {
        let means: Vec<f64> = (1..=60).map(|i| 2.0 * i as f64).collect();
        // Scatter around 0.05 + 2/mean
        let dispersions: Vec<f64> = means
            .iter()
            .enumerate()
            .map(|(i, &m)| (0.05 + 2.0 / m) * if i % 2 == 0 { 1.1 } else { 0.9 })
            .collect();

        match fit_dispersion_trend(&means, &dispersions, 1e-8) {
            DispersionTrend::Parametric { asympt_disp, extra_pois } => {
                assert!((asympt_disp - 0.05).abs() < 0.02);
                assert!((extra_pois - 2.0).abs() < 0.5);
            }
            other => panic!("expected parametric trend, got {:?}", other),
        }
    }

    #[test]
    fn test_few_genes_fall_back_to_mean() {
        let trend = fit_dispersion_trend(&[10.0, 20.0, 0.0], &[0.2, 0.4, f64::NAN], 1e-8);
        match trend {
            DispersionTrend::Mean(v) => assert!((v - 0.3).abs() < 1e-12),
            other => panic!("expected mean trend, got {:?}", other),
        }
        assert_eq!(trend.evaluate(1000.0), trend.evaluate(1.0));
    }
}
