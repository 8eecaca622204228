//! MAP (maximum a posteriori) dispersion estimation
//!
//! Empirical Bayes shrinkage: the gene-wise likelihood is combined with a
//! normal prior on log dispersion centred at the trend.

use serde::{Deserialize, Serialize};

use super::gene_wise::GeneModel;
use super::{maximize_log_alpha, DispersionParams};
use crate::stats::{mad_squared, trigamma};

/// Lower bound on the prior variance of log dispersion
const MIN_PRIOR_VAR: f64 = 0.25;

/// Width of the shrinkage prior and the residual spread it was derived from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorVariance {
    /// Variance of the normal prior on log dispersion
    pub prior_var: f64,
    /// MAD^2 of log(gene-wise) - log(trend); also sets the outlier threshold
    pub var_log_disp_ests: f64,
}

/// Estimate the prior variance for dispersion shrinkage.
///
/// prior_var = max(MAD^2(log gene - log trend) - trigamma((m - p) / 2), 0.25),
/// over genes whose gene-wise estimate is at least `100 * min_disp`.
pub fn estimate_prior_variance(
    gene_dispersions: &[f64],
    trended_dispersions: &[f64],
    n_samples: usize,
    n_coef: usize,
    params: &DispersionParams,
) -> PriorVariance {
    let threshold = 100.0 * params.min_disp;

    let log_residuals: Vec<f64> = gene_dispersions
        .iter()
        .zip(trended_dispersions.iter())
        .filter(|(&g, &t)| g >= threshold && t > 0.0 && g.is_finite() && t.is_finite())
        .map(|(&g, &t)| g.ln() - t.ln())
        .collect();

    if log_residuals.len() < 3 {
        return PriorVariance {
            prior_var: MIN_PRIOR_VAR,
            var_log_disp_ests: MIN_PRIOR_VAR,
        };
    }

    let var_log_disp_ests = mad_squared(&log_residuals);

    // No residual degrees of freedom: trigamma is undefined
    if n_samples <= n_coef {
        return PriorVariance {
            prior_var: MIN_PRIOR_VAR,
            var_log_disp_ests,
        };
    }

    let df = (n_samples - n_coef) as f64;
    let prior_var = (var_log_disp_ests - trigamma(df / 2.0)).max(MIN_PRIOR_VAR);

    log::debug!(
        "Prior variance: {} residuals, df={}, MAD^2={:.4}, prior={:.4}",
        log_residuals.len(),
        df,
        var_log_disp_ests,
        prior_var
    );

    PriorVariance {
        prior_var,
        var_log_disp_ests,
    }
}

/// Posterior mode of one gene's dispersion given its trended value.
/// Returns the trended value when the posterior cannot be evaluated.
pub fn fit_map_dispersion(
    counts: &[f64],
    size_factors: &[f64],
    trend_disp: f64,
    prior_var: f64,
    params: &DispersionParams,
) -> f64 {
    let min_disp = params.min_disp;
    let max_disp = params.max_disp(counts.len());
    if !(trend_disp.is_finite() && trend_disp > 0.0) {
        return f64::NAN;
    }
    let log_trend = trend_disp.ln();

    let (model, _) = GeneModel::new(counts, size_factors);
    let log_posterior = |log_alpha: f64| {
        let prior = -0.5 * (log_alpha - log_trend).powi(2) / prior_var;
        model.log_likelihood(log_alpha) + prior
    };

    match maximize_log_alpha(log_posterior, min_disp.ln(), max_disp.ln(), Some(log_trend), params) {
        Some(la) => la.exp().clamp(min_disp, max_disp),
        None => trend_disp.clamp(min_disp, max_disp),
    }
}
