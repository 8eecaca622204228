//! Negative binomial distribution utilities

use statrs::function::gamma::ln_gamma;

/// Floor on fitted means before weights are computed
pub const MIN_MU: f64 = 0.5;

/// A coefficient beyond this magnitude (natural log scale) marks a diverging fit
pub const MAX_BETA: f64 = 30.0;

/// Clamp on the linear predictor to keep `exp` finite
pub const MAX_ETA: f64 = 700.0;

/// mu = size_factor * exp(eta)
pub fn nb_mean(eta: f64, size_factor: f64) -> f64 {
    size_factor * eta.clamp(-MAX_ETA, MAX_ETA).exp()
}

/// Log-probability of count `y` under NB(mean `mu`, dispersion `alpha`)
pub fn nb_log_likelihood(y: f64, mu: f64, alpha: f64) -> f64 {
    if mu <= 0.0 || alpha <= 0.0 {
        return f64::NEG_INFINITY;
    }

    let size = 1.0 / alpha;
    let prob = size / (size + mu);

    ln_gamma(y + size) - ln_gamma(size) - ln_gamma(y + 1.0) + size * prob.ln() + y * (1.0 - prob).ln()
}

/// IRLS weight for the log link: W = mu / (1 + alpha * mu)
pub fn nb_weight(mu: f64, alpha: f64) -> f64 {
    mu / (1.0 + alpha * mu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nb_mean() {
        assert!((nb_mean(2.0, 1.5) - 1.5 * 2.0_f64.exp()).abs() < 1e-10);
        assert!(nb_mean(1e6, 1.0).is_finite());
    }

    #[test]
    fn test_nb_log_likelihood_poisson_limit() {
        // Poisson(5) at 5: 5 ln 5 - 5 - ln 120
        let poisson = 5.0 * 5.0_f64.ln() - 5.0 - 120.0_f64.ln();
        let ll = nb_log_likelihood(5.0, 5.0, 1e-7);
        assert!((ll - poisson).abs() < 1e-4);
    }

    #[test]
    fn test_nb_weight() {
        assert!((nb_weight(10.0, 0.1) - 5.0).abs() < 1e-10);
    }
}
