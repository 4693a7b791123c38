//! Negative binomial density and IRLS helpers

use statrs::function::gamma::ln_gamma;

/// Lower bound on fitted means during IRLS
pub const MIN_MU: f64 = 0.5;

/// IRLS stops when any |beta| exceeds this (natural log scale)
pub const MAX_BETA: f64 = 30.0;

/// Linear predictors are clamped to avoid `exp` overflow
const MAX_ETA: f64 = 700.0;

/// mu = size_factor * exp(eta)
pub fn nb_mean(eta: f64, size_factor: f64) -> f64 {
    size_factor * eta.clamp(-MAX_ETA, MAX_ETA).exp()
}

/// Var(Y) = mu + alpha * mu^2
pub fn nb_variance(mu: f64, alpha: f64) -> f64 {
    mu + alpha * mu * mu
}

/// IRLS working weight mu / (1 + alpha * mu)
pub fn nb_weight(mu: f64, alpha: f64) -> f64 {
    mu / (1.0 + alpha * mu)
}

/// Log density of `y` under NB(mean = mu, dispersion = alpha)
pub fn nb_log_density(y: f64, mu: f64, alpha: f64) -> f64 {
    if mu <= 0.0 || alpha <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let size = 1.0 / alpha;
    let log_p = (size / (size + mu)).ln();
    let log_q = (mu / (size + mu)).ln();
    let density = ln_gamma(y + size) - ln_gamma(size) - ln_gamma(y + 1.0) + size * log_p;
    if y > 0.0 {
        density + y * log_q
    } else {
        density
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nb_mean_and_weight() {
        assert!((nb_mean(2.0, 1.0) - 2.0_f64.exp()).abs() < 1e-10);
        assert!((nb_weight(10.0, 0.1) - 5.0).abs() < 1e-12);
        assert!((nb_variance(10.0, 0.1) - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_density_approaches_poisson() {
        // Poisson(5) at 5: exp(-5) 5^5 / 5!
        let poisson = (-5.0 + 5.0 * 5.0_f64.ln()) - 120.0_f64.ln();
        assert!((nb_log_density(5.0, 5.0, 1e-7) - poisson).abs() < 1e-4);
        assert_eq!(nb_log_density(1.0, 0.0, 0.1), f64::NEG_INFINITY);
    }
}
