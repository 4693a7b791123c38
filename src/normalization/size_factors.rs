//! Size factor estimation using the median of ratios method

use ndarray::{Array1, ArrayView2, Axis};

use crate::error::{DeseqError, Result};
use crate::stats::median;

/// Method for size factor estimation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeFactorMethod {
    /// Standard median of ratios; only genes without zeros form the reference
    Ratio,
    /// Geometric means over positive counts, for matrices where every gene has a zero
    PosCounts,
}

/// Estimate one size factor per sample.
///
/// `Ratio` falls back to `PosCounts` when no gene is expressed in every sample.
pub fn estimate_size_factors(counts: ArrayView2<f64>, method: SizeFactorMethod) -> Result<Array1<f64>> {
    let (n_genes, n_samples) = counts.dim();
    if n_genes == 0 || n_samples == 0 {
        return Err(DeseqError::SizeFactorFailed {
            reason: "Count matrix is empty".to_string(),
        });
    }

    let result = match method {
        SizeFactorMethod::Ratio => median_of_ratios(counts, false),
        SizeFactorMethod::PosCounts => median_of_ratios(counts, true),
    };

    match result {
        Err(DeseqError::SizeFactorFailed { reason }) if method == SizeFactorMethod::Ratio => {
            log::warn!("{}; using positive-count geometric means instead", reason);
            median_of_ratios(counts, true)
        }
        other => other,
    }
}

fn median_of_ratios(counts: ArrayView2<f64>, poscounts: bool) -> Result<Array1<f64>> {
    let n_samples = counts.ncols();

    // Reference: per-gene geometric mean (divided by the total sample count
    // for poscounts, so zeros pull the reference down)
    let reference: Vec<(usize, f64)> = counts
        .axis_iter(Axis(0))
        .enumerate()
        .filter_map(|(i, row)| {
            if poscounts {
                let log_sum: f64 = row.iter().filter(|&&x| x > 0.0).map(|&x| x.ln()).sum();
                row.iter().any(|&x| x > 0.0).then(|| (i, (log_sum / n_samples as f64).exp()))
            } else if row.iter().all(|&x| x > 0.0) {
                let log_sum: f64 = row.iter().map(|&x| x.ln()).sum();
                Some((i, (log_sum / n_samples as f64).exp()))
            } else {
                None
            }
        })
        .collect();

    if reference.is_empty() {
        return Err(DeseqError::SizeFactorFailed {
            reason: "No genes with all non-zero counts found".to_string(),
        });
    }

    let mut size_factors = Array1::zeros(n_samples);
    for j in 0..n_samples {
        let ratios: Vec<f64> = reference
            .iter()
            .filter(|&&(i, _)| counts[[i, j]] > 0.0)
            .map(|&(i, geo_mean)| counts[[i, j]] / geo_mean)
            .collect();

        size_factors[j] = if ratios.is_empty() {
            if !poscounts {
                return Err(DeseqError::SizeFactorFailed {
                    reason: format!("No valid ratios for sample {}", j),
                });
            }
            1.0
        } else {
            median(&ratios)
        };
    }

    if poscounts {
        // Stabilize: geometric mean of the size factors is one
        let log_mean = size_factors.iter().map(|&x: &f64| x.ln()).sum::<f64>() / n_samples as f64;
        let center = log_mean.exp();
        size_factors.mapv_inplace(|x| x / center);
    }

    if size_factors.iter().any(|&x| x <= 0.0 || !x.is_finite()) {
        return Err(DeseqError::SizeFactorFailed {
            reason: "Invalid size factors computed".to_string(),
        });
    }

    Ok(size_factors)
}

/// Counts divided by the size factor of their sample
pub fn normalized_counts(counts: ArrayView2<f64>, size_factors: &Array1<f64>) -> ndarray::Array2<f64> {
    let mut normalized = counts.to_owned();
    for (mut col, &sf) in normalized.axis_iter_mut(Axis(1)).zip(size_factors.iter()) {
        col.mapv_inplace(|x| x / sf);
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_size_factors_track_sequencing_depth() {
        let counts = array![
            [100.0, 200.0, 80.0, 160.0],
            [500.0, 1000.0, 400.0, 800.0],
            [50.0, 100.0, 40.0, 80.0],
            [200.0, 400.0, 160.0, 320.0]
        ];
        let sf = estimate_size_factors(counts.view(), SizeFactorMethod::Ratio).unwrap();
        assert_eq!(sf.len(), 4);
        assert!(sf.iter().all(|&x| x > 0.0));
        assert!((sf[1] / sf[0] - 2.0).abs() < 1e-9);

        let norm = normalized_counts(counts.view(), &sf);
        let row: Vec<f64> = norm.row(0).to_vec();
        assert!(row.iter().all(|&v| (v - row[0]).abs() / row[0] < 0.3));
    }

    #[test]
    fn test_ratio_falls_back_to_poscounts() {
        // Every gene has a zero somewhere
        let counts = array![[0.0, 10.0, 20.0], [10.0, 0.0, 20.0], [10.0, 20.0, 0.0]];
        let sf = estimate_size_factors(counts.view(), SizeFactorMethod::Ratio).unwrap();
        assert!(sf.iter().all(|&x| x.is_finite() && x > 0.0));
        let log_mean: f64 = sf.iter().map(|x| x.ln()).sum::<f64>() / 3.0;
        assert!(log_mean.abs() < 1e-12);
    }
}
