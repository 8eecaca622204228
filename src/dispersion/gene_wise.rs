//! Gene-wise dispersion estimation using Cox-Reid adjusted profile likelihood
//!
//! Each gene is modelled with a single condition-free mean: the expected count
//! in sample j is `s_j * baseMean`, where `baseMean` is the mean of the
//! gene's normalized counts. The dispersion is the maximizer of the
//! negative binomial log-likelihood of the raw counts under those means.

use statrs::function::gamma::ln_gamma;

use super::{maximize_log_alpha, DispersionParams, MEAN_FLOOR};
use crate::stats::mean_and_variance;

/// Per-gene inputs shared by the gene-wise and MAP objectives
#[derive(Debug, Clone)]
pub(crate) struct GeneModel<'a> {
    pub counts: &'a [f64],
    pub mu: Vec<f64>,
}

impl<'a> GeneModel<'a> {
    /// Intercept-only expected counts for one gene
    pub fn new(counts: &'a [f64], size_factors: &[f64]) -> (Self, f64) {
        let normalized: Vec<f64> = counts.iter().zip(size_factors).map(|(&c, &s)| c / s).collect();
        let (base_mean, _) = mean_and_variance(&normalized);
        let floored = base_mean.max(MEAN_FLOOR);
        let mu = size_factors.iter().map(|&s| s * floored).collect();
        (Self { counts, mu }, base_mean)
    }

    /// Cox-Reid adjusted NB log-likelihood at `log_alpha`.
    ///
    /// With an intercept-only design X'WX is the scalar sum of the working
    /// weights `1 / (1/mu + alpha)`.
    pub fn log_likelihood(&self, log_alpha: f64) -> f64 {
        let alpha = log_alpha.exp();
        let alpha_inv = 1.0 / alpha;
        let lg_alpha_inv = ln_gamma(alpha_inv);

        let mut ll = 0.0;
        let mut info = 0.0;
        for (&y, &mu) in self.counts.iter().zip(&self.mu) {
            ll += ln_gamma(y + alpha_inv) - lg_alpha_inv;
            ll -= y * (mu + alpha_inv).ln();
            ll -= alpha_inv * (1.0 + mu * alpha).ln();
            info += 1.0 / (1.0 / mu + alpha);
        }

        let cr_term = if info > 0.0 { -0.5 * info.ln() } else { 0.0 };
        ll + cr_term
    }
}

/// Method-of-moments dispersion: (var - xim * mean) / mean^2,
/// where `xim` is the mean of the inverse size factors
pub(crate) fn moments_dispersion(normalized: &[f64], xim: f64) -> f64 {
    let (mean, var) = mean_and_variance(normalized);
    if mean > MEAN_FLOOR {
        (var - xim * mean) / (mean * mean)
    } else {
        f64::INFINITY
    }
}

/// Estimate one gene's dispersion.
/// Returns `(dispersion, base_mean)`; the dispersion is NaN when the
/// likelihood is not finite anywhere on the search interval.
pub fn estimate_gene_dispersion(
    counts: &[f64],
    size_factors: &[f64],
    params: &DispersionParams,
) -> (f64, f64) {
    let n_samples = counts.len();
    let (model, base_mean) = GeneModel::new(counts, size_factors);

    if counts.iter().all(|&c| c == 0.0) {
        return (f64::NAN, base_mean);
    }

    let min_disp = params.min_disp;
    let max_disp = params.max_disp(n_samples);

    let xim = size_factors.iter().map(|&s| 1.0 / s).sum::<f64>() / n_samples as f64;
    let normalized: Vec<f64> = counts.iter().zip(size_factors).map(|(&c, &s)| c / s).collect();
    let moments = moments_dispersion(&normalized, xim).clamp(min_disp, max_disp);

    let log_alpha = maximize_log_alpha(
        |la| model.log_likelihood(la),
        min_disp.ln(),
        max_disp.ln(),
        Some(moments.ln()),
        params,
    );

    match log_alpha {
        Some(la) => (la.exp().clamp(min_disp, max_disp), base_mean),
        None => (f64::NAN, base_mean),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poisson_like_gene_hits_lower_bound() {
        // Identical normalized counts: no extra-Poisson variation
        let counts = [100.0, 100.0, 100.0, 100.0, 100.0, 100.0];
        let sf = [1.0; 6];
        let (disp, mean) = estimate_gene_dispersion(&counts, &sf, &DispersionParams::default());
        assert!((mean - 100.0).abs() < 1e-12);
        assert!(disp < 1e-4, "expected near-zero dispersion, got {}", disp);
    }

    #[test]
    fn test_overdispersed_gene_near_moments() {
        let counts = [20.0, 180.0, 50.0, 300.0, 90.0, 10.0, 250.0, 40.0];
        let sf = [1.0; 8];
        let (disp, _) = estimate_gene_dispersion(&counts, &sf, &DispersionParams::default());
        let moments = moments_dispersion(&counts, 1.0);
        assert!(disp > 0.1, "dispersion {} should be large", disp);
        assert!((disp.ln() - moments.ln()).abs() < 1.0, "mle {} vs moments {}", disp, moments);
    }

    #[test]
    fn test_all_zero_gene_is_nan() {
        let (disp, _) = estimate_gene_dispersion(&[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0], &DispersionParams::default());
        assert!(disp.is_nan());
    }

    #[test]
    fn test_log_likelihood_is_finite() {
        let counts = [5.0, 8.0, 3.0];
        let (model, _) = GeneModel::new(&counts, &[0.8, 1.0, 1.2]);
        assert!(model.log_likelihood(-2.0).is_finite());
        assert!(model.log_likelihood(2.0).is_finite());
    }
}
