//! Cook's distance outlier detection and count replacement
//!
//! Cook's distance measures the influence of each observation on the fitted
//! model: `PearsonResSq / p * H / (1 - H)^2`, with the Pearson residual taken
//! under a robust method-of-moments dispersion.

use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView1};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::stats::trimmed_mean;

/// Configurable parameters for outlier handling
#[derive(Debug, Clone)]
pub struct CooksParams {
    /// F distribution quantile used as the default cutoff
    pub cutoff_quantile: f64,
    /// Only samples whose design cell has at least this many replicates
    /// get their outlier counts replaced
    pub min_replicates_for_replace: usize,
    /// Floor of the robust dispersion
    pub min_disp: f64,
    /// Trim ratio of the replacement mean
    pub replace_trim: f64,
}

impl Default for CooksParams {
    fn default() -> Self {
        Self {
            cutoff_quantile: 0.99,
            min_replicates_for_replace: 7,
            min_disp: 0.04,
            replace_trim: 0.2,
        }
    }
}

/// Sample indices of each design cell, in cell order
pub fn group_cells(cells: &[usize]) -> BTreeMap<usize, Vec<usize>> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (sample, &cell) in cells.iter().enumerate() {
        groups.entry(cell).or_default().push(sample);
    }
    groups
}

/// Scaled trimmed mean of squared deviations from the trimmed mean
fn trimmed_variance(values: &[f64]) -> f64 {
    let (trim, scale) = match values.len() {
        0..=3 => (1.0 / 3.0, 2.04),
        4..=23 => (1.0 / 4.0, 1.86),
        _ => (1.0 / 8.0, 1.51),
    };
    let center = trimmed_mean(values, trim);
    let squared: Vec<f64> = values.iter().map(|&v| (v - center).powi(2)).collect();
    scale * trimmed_mean(&squared, trim)
}

/// Robust method-of-moments dispersion of one gene's normalized counts.
///
/// The variance is the largest trimmed variance over cells with three or
/// more samples; without such cells it is taken over all samples with the
/// 1/8 trim.
pub fn robust_disp_gene(normalized: ArrayView1<f64>, cells: &BTreeMap<usize, Vec<usize>>, min_disp: f64) -> f64 {
    let large: Vec<&Vec<usize>> = cells.values().filter(|s| s.len() >= 3).collect();

    let variance = if large.is_empty() {
        let values = normalized.to_vec();
        let center = trimmed_mean(&values, 1.0 / 8.0);
        let squared: Vec<f64> = values.iter().map(|&v| (v - center).powi(2)).collect();
        1.51 * trimmed_mean(&squared, 1.0 / 8.0)
    } else {
        large
            .iter()
            .map(|samples| {
                let values: Vec<f64> = samples.iter().map(|&j| normalized[j]).collect();
                trimmed_variance(&values)
            })
            .fold(0.0_f64, f64::max)
    };

    let mean = normalized.mean().unwrap_or(0.0);
    if mean > 0.0 {
        ((variance - mean) / (mean * mean)).max(min_disp)
    } else {
        min_disp
    }
}

/// Cook's distances of one gene across samples. NaN where the hat value is
/// unusable (including unfitted genes).
pub fn cooks_distance_gene(
    counts: ArrayView1<f64>,
    mu: ArrayView1<f64>,
    hat_diagonals: ArrayView1<f64>,
    alpha: f64,
    n_coefs: usize,
) -> Vec<f64> {
    counts
        .iter()
        .zip(mu.iter())
        .zip(hat_diagonals.iter())
        .map(|((&y, &m), &h)| {
            let v = m + alpha * m * m;
            let pearson_sq = if v > 0.0 { (y - m).powi(2) / v } else { 0.0 };
            if h.is_finite() && h < 1.0 && pearson_sq.is_finite() {
                pearson_sq / n_coefs as f64 * h / (1.0 - h).powi(2)
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// `F(p, m - p)` quantile; infinite when there are no residual degrees of freedom
pub fn default_cooks_cutoff(n_samples: usize, n_coefs: usize, quantile: f64) -> f64 {
    if n_samples <= n_coefs {
        return f64::INFINITY;
    }
    match FisherSnedecor::new(n_coefs as f64, (n_samples - n_coefs) as f64) {
        Ok(f_dist) => f_dist.inverse_cdf(quantile),
        Err(_) => f64::INFINITY,
    }
}

/// Largest finite Cook's distance per gene
pub fn max_cooks_per_gene(cooks: &Array2<f64>) -> Vec<f64> {
    cooks
        .rows()
        .into_iter()
        .map(|row| row.iter().filter(|c| c.is_finite()).fold(0.0_f64, |acc, &c| acc.max(c)))
        .collect()
}

/// Replace outlier counts in samples from well-replicated cells.
///
/// An outlier count becomes `floor(trimmed_mean(normalized) * size_factor)`,
/// the trimmed mean taken over all samples. Returns the new counts and the
/// genes in which at least one count was replaced.
pub fn replace_outliers(
    counts: &Array2<f64>,
    normalized: &Array2<f64>,
    size_factors: &[f64],
    cooks: &Array2<f64>,
    cutoff: f64,
    cells: &BTreeMap<usize, Vec<usize>>,
    params: &CooksParams,
) -> (Array2<f64>, Vec<usize>) {
    let n_samples = counts.ncols();
    let mut replaceable = vec![false; n_samples];
    for samples in cells.values() {
        if samples.len() >= params.min_replicates_for_replace {
            for &j in samples {
                replaceable[j] = true;
            }
        }
    }

    let mut replaced = counts.clone();
    let mut flagged = Vec::new();
    if !replaceable.iter().any(|&r| r) {
        return (replaced, flagged);
    }

    for (i, row) in cooks.rows().into_iter().enumerate() {
        let outliers: Vec<usize> = (0..n_samples)
            .filter(|&j| replaceable[j] && row[j].is_finite() && row[j] > cutoff)
            .collect();
        if outliers.is_empty() {
            continue;
        }
        let trimmed = trimmed_mean(&normalized.row(i).to_vec(), params.replace_trim);
        for j in outliers {
            replaced[[i, j]] = (trimmed * size_factors[j]).floor();
        }
        flagged.push(i);
    }

    (replaced, flagged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_default_cutoff_matches_f_quantile() {
        // qf(0.99, 2, 4) = 18.0
        let cutoff = default_cooks_cutoff(6, 2, 0.99);
        assert!((cutoff - 18.0).abs() < 1e-4);
        assert!(default_cooks_cutoff(2, 2, 0.99).is_infinite());
    }

    #[test]
    fn test_robust_disp_floor() {
        let cells = group_cells(&[0, 0, 0, 1, 1, 1]);
        let flat = array![10.0, 10.0, 10.0, 20.0, 20.0, 20.0];
        assert_eq!(robust_disp_gene(flat.view(), &cells, 0.04), 0.04);

        let noisy = array![1.0, 50.0, 200.0, 20.0, 400.0, 5.0];
        assert!(robust_disp_gene(noisy.view(), &cells, 0.04) > 0.04);
    }

    #[test]
    fn test_cooks_distance_flags_influential_sample() {
        let counts = array![10.0, 12.0, 11.0, 90.0];
        let mu = array![30.0, 30.0, 30.0, 30.0];
        let hat = array![0.25, 0.25, 0.25, 0.25];
        let cooks = cooks_distance_gene(counts.view(), mu.view(), hat.view(), 0.1, 1);
        let max = cooks.iter().cloned().fold(0.0_f64, f64::max);
        assert_eq!(cooks[3], max);

        let unfitted = array![f64::NAN, f64::NAN, f64::NAN, f64::NAN];
        assert!(cooks_distance_gene(counts.view(), mu.view(), unfitted.view(), 0.1, 1)
            .iter()
            .all(|c| c.is_nan()));
    }

    #[test]
    fn test_replacement_needs_seven_replicates() {
        let counts = Array2::from_shape_fn((1, 8), |(_, j)| if j == 7 { 1000.0 } else { 100.0 });
        let normalized = counts.clone();
        let mut cooks = Array2::zeros((1, 8));
        cooks[[0, 7]] = 50.0;
        let sf = vec![1.0; 8];

        let small = group_cells(&[0, 0, 0, 0, 1, 1, 1, 1]);
        let params = CooksParams::default();
        let (same, flagged) = replace_outliers(&counts, &normalized, &sf, &cooks, 10.0, &small, &params);
        assert!(flagged.is_empty());
        assert_eq!(same, counts);

        let one_cell = group_cells(&[0; 8]);
        let (fixed, flagged) =
            replace_outliers(&counts, &normalized, &sf, &cooks, 10.0, &one_cell, &CooksParams::default());
        assert_eq!(flagged, vec![0]);
        // trim 0.2 of 8 drops one value each end: mean of six 100s
        assert_eq!(fixed[[0, 7]], 100.0);
        assert_eq!(fixed[[0, 0]], 100.0);
    }
}
