//! Statistical utility functions shared across the engine stages

use std::cmp::Ordering;

fn sort_finite(values: &mut [f64]) {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
}

/// Median of a slice (NaN for an empty slice)
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sort_finite(&mut sorted);
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Squared median absolute deviation, scaled for consistency with the
/// normal distribution (constant 1.4826)
pub fn mad_squared(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let center = median(values);
    let deviations: Vec<f64> = values.iter().map(|&x| (x - center).abs()).collect();
    let mad = median(&deviations) * 1.4826;
    mad * mad
}

/// Mean after dropping `floor(n * trim_ratio)` values from each end
pub fn trimmed_mean(values: &[f64], trim_ratio: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sort_finite(&mut sorted);
    let n = sorted.len();
    let k = (n as f64 * trim_ratio).floor() as usize;
    let kept = if k * 2 >= n { &sorted[..] } else { &sorted[k..n - k] };
    kept.iter().sum::<f64>() / kept.len() as f64
}

/// Unbiased sample variance
pub fn variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    values.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
}

/// Trigamma function (derivative of digamma)
pub fn trigamma(x: f64) -> f64 {
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).powi(2) - trigamma(1.0 - x);
    }

    let mut shift = 0.0;
    let mut z = x;
    while z < 10.0 {
        shift += 1.0 / (z * z);
        z += 1.0;
    }

    let z2 = z * z;
    let z3 = z2 * z;
    shift + 1.0 / z + 0.5 / z2 + 1.0 / (6.0 * z3) - 1.0 / (30.0 * z3 * z2) + 1.0 / (42.0 * z3 * z3 * z)
        - 1.0 / (30.0 * z3 * z3 * z3)
}
