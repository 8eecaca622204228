//! Dispersion trend fitting

use serde::{Deserialize, Serialize};

use super::{DispersionParams, MEAN_FLOOR};
use crate::error::{DgeError, Result};
use crate::stats::trimmed_mean;

/// Method for fitting the dispersion-mean trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendFitMethod {
    /// Parametric fit: dispersion = a0 + a1/mean, falling back to `Mean` on failure
    Parametric,
    /// Trimmed mean of the gene-wise dispersions (no trend)
    Mean,
}

/// The fitted dispersion-mean relationship
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TrendFit {
    Parametric { asymptotic: f64, extra_poisson: f64 },
    Mean { value: f64 },
}

impl TrendFit {
    /// Trended dispersion at a given mean of normalized counts
    pub fn predict(&self, mean: f64) -> f64 {
        match *self {
            TrendFit::Parametric {
                asymptotic,
                extra_poisson,
            } => asymptotic + extra_poisson / mean.max(MEAN_FLOOR),
            TrendFit::Mean { value } => value,
        }
    }

    /// `(asymptotic, extra_poisson)` when the parametric fit succeeded
    pub fn coefficients(&self) -> Option<(f64, f64)> {
        match *self {
            TrendFit::Parametric {
                asymptotic,
                extra_poisson,
            } => Some((asymptotic, extra_poisson)),
            TrendFit::Mean { .. } => None,
        }
    }
}

/// Fit a trend to the gene-wise dispersions as a function of mean expression.
///
/// Only genes with a finite gene-wise estimate above `100 * min_disp` take part.
pub fn fit_dispersion_trend(means: &[f64], dispersions: &[f64], params: &DispersionParams) -> TrendFit {
    let usable: Vec<(f64, f64)> = means
        .iter()
        .zip(dispersions.iter())
        .filter(|(&m, &d)| m > 0.0 && d.is_finite() && d >= 100.0 * params.min_disp)
        .map(|(&m, &d)| (m.max(MEAN_FLOOR), d))
        .collect();

    if params.trend == TrendFitMethod::Parametric {
        match fit_parametric_trend(&usable) {
            Ok((a0, a1)) => {
                log::info!("Parametric dispersion trend: asymptotic {:.5}, extra-Poisson {:.5}", a0, a1);
                return TrendFit::Parametric {
                    asymptotic: a0,
                    extra_poisson: a1,
                };
            }
            Err(e) => log::info!("{}; using the mean dispersion instead", e),
        }
    }

    let value = mean_dispersion(&usable, dispersions, params.min_disp);
    log::info!("Mean dispersion trend: {:.5}", value);
    TrendFit::Mean { value }
}

/// Trimmed mean of the usable estimates; when there are none, the mean of
/// whatever is finite, and `min_disp` as the last resort
fn mean_dispersion(usable: &[(f64, f64)], all: &[f64], min_disp: f64) -> f64 {
    if !usable.is_empty() {
        let values: Vec<f64> = usable.iter().map(|&(_, d)| d).collect();
        return trimmed_mean(&values, 0.001);
    }
    let finite: Vec<f64> = all.iter().copied().filter(|d| d.is_finite()).collect();
    log::warn!("No gene-wise dispersion above the floor; trend is not informative");
    if finite.is_empty() {
        min_disp
    } else {
        (finite.iter().sum::<f64>() / finite.len() as f64).max(min_disp)
    }
}

/// Parametric fit with iterative residual filtering.
/// Returns (asymptotic, extra_poisson).
fn fit_parametric_trend(data: &[(f64, f64)]) -> Result<(f64, f64)> {
    if data.len() < 3 {
        return Err(trend_failure("fewer than 3 genes usable for the parametric trend"));
    }

    let mut coefs = (0.1_f64, 1.0_f64);
    let max_iter = 10;
    let tol = 1e-6;

    for iter in 0..max_iter {
        let old_coefs = coefs;

        // Drop genes whose residual ratio lies outside (1e-4, 15)
        let good_data: Vec<(f64, f64)> = data
            .iter()
            .filter(|&&(mean, disp)| {
                let fitted = coefs.0 + coefs.1 / mean;
                if fitted <= 0.0 {
                    return false;
                }
                let residual = disp / fitted;
                residual > 1e-4 && residual < 15.0
            })
            .copied()
            .collect();

        if good_data.len() < 3 {
            return Err(trend_failure("fewer than 3 genes left after residual filtering"));
        }

        let (new_coefs, glm_converged) = fit_gamma_identity(&good_data, coefs);
        coefs = new_coefs;

        log::debug!(
            "Trend iteration {}: {} genes, a0={:.6}, a1={:.6}, converged={}",
            iter + 1,
            good_data.len(),
            coefs.0,
            coefs.1,
            glm_converged
        );

        if !(coefs.0 > 0.0 && coefs.1 > 0.0) {
            return Err(trend_failure(&format!(
                "non-positive trend coefficients (a0={:.4}, a1={:.4})",
                coefs.0, coefs.1
            )));
        }

        let log_change = (coefs.0 / old_coefs.0).ln().powi(2) + (coefs.1 / old_coefs.1).ln().powi(2);
        if log_change < tol && glm_converged {
            return Ok(coefs);
        }
    }

    Err(trend_failure("parametric trend did not converge"))
}

fn trend_failure(reason: &str) -> DgeError {
    DgeError::insufficient("dispersion trend", reason)
}

/// Gamma-family IRLS with identity link: disp ~ a0 + a1 * (1/mean).
/// Returns ((a0, a1), converged).
fn fit_gamma_identity(data: &[(f64, f64)], start: (f64, f64)) -> ((f64, f64), bool) {
    let (mut a0, mut a1) = start;
    let max_iter = 25;
    let tol = 1e-8;

    let deviance = |a0: f64, a1: f64| -> f64 {
        data.iter()
            .map(|&(mean, disp)| {
                let mu = (a0 + a1 / mean).max(1e-8);
                2.0 * (-(disp / mu).ln() + (disp - mu) / mu)
            })
            .sum()
    };

    let mut dev_old = deviance(a0, a1);

    for _ in 0..max_iter {
        let mut sum_w = 0.0;
        let mut sum_wx = 0.0;
        let mut sum_wz = 0.0;
        let mut sum_wxx = 0.0;
        let mut sum_wxz = 0.0;

        for &(mean, disp) in data {
            let x = 1.0 / mean;
            let mu = (a0 + a1 * x).max(1e-8);
            // Gamma variance is mu^2; identity link makes the working response the data
            let w = 1.0 / (mu * mu);
            sum_w += w;
            sum_wx += w * x;
            sum_wz += w * disp;
            sum_wxx += w * x * x;
            sum_wxz += w * x * disp;
        }

        let det = sum_w * sum_wxx - sum_wx * sum_wx;
        if det.abs() < 1e-10 {
            return ((a0, a1), false);
        }

        a0 = (sum_wxx * sum_wz - sum_wx * sum_wxz) / det;
        a1 = (sum_w * sum_wxz - sum_wx * sum_wz) / det;

        let dev = deviance(a0, a1);
        if (dev_old - dev).abs() / (0.1 + dev.abs()) < tol {
            return ((a0, a1), true);
        }
        dev_old = dev;
    }

    ((a0, a1), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_parametric_recovers_exact_trend() {
        let means: Vec<f64> = (1..=50).map(|i| i as f64 * 10.0).collect();
        let disps: Vec<f64> = means.iter().map(|&m| 0.05 + 2.0 / m).collect();
        let fit = fit_dispersion_trend(&means, &disps, &DispersionParams::default());
        let (a0, a1) = fit.coefficients().expect("parametric fit");
        assert!((a0 - 0.05).abs() < 1e-4, "a0 = {}", a0);
        assert!((a1 - 2.0).abs() < 1e-3, "a1 = {}", a1);
        assert!((fit.predict(100.0) - 0.07).abs() < 1e-4);
    }

    #[test]
    fn test_parametric_ignores_outlier_genes() {
        let mut means: Vec<f64> = (1..=50).map(|i| i as f64 * 20.0).collect();
        let mut disps: Vec<f64> = means.iter().map(|&m| 0.05 + 2.0 / m).collect();
        for i in 0..5 {
            means.push(200.0 + 100.0 * i as f64);
            disps.push(5.0);
        }
        match fit_dispersion_trend(&means, &disps, &DispersionParams::default()) {
            TrendFit::Parametric {
                asymptotic,
                extra_poisson,
            } => {
                assert_abs_diff_eq!(asymptotic, 0.05, epsilon = 0.01);
                assert_abs_diff_eq!(extra_poisson, 2.0, epsilon = 0.1);
            }
            other => panic!("expected parametric trend, got {:?}", other),
        }
    }

    #[test]
    fn test_too_few_genes_falls_back_to_mean() {
        let fit = fit_dispersion_trend(&[10.0, 20.0], &[0.2, 0.4], &DispersionParams::default());
        match fit {
            TrendFit::Mean { value } => assert!((value - 0.3).abs() < 1e-12),
            other => panic!("expected mean trend, got {:?}", other),
        }
        assert!(fit.coefficients().is_none());
    }

    #[test]
    fn test_mean_method_ignores_floor_estimates() {
        let params = DispersionParams {
            trend: TrendFitMethod::Mean,
            ..Default::default()
        };
        let fit = fit_dispersion_trend(&[5.0, 50.0, 500.0], &[1e-8, 0.1, 0.3], &params);
        match fit {
            TrendFit::Mean { value } => assert!((value - 0.2).abs() < 1e-12),
            other => panic!("expected mean trend, got {:?}", other),
        }
    }

    #[test]
    fn test_decreasing_with_mean_is_required() {
        // Dispersion rising with mean gives a negative extra-Poisson term
        let means: Vec<f64> = (1..=30).map(|i| i as f64 * 5.0).collect();
        let disps: Vec<f64> = means.iter().map(|&m| 0.5 - 10.0 / m.max(25.0)).collect();
        let fit = fit_dispersion_trend(&means, &disps, &DispersionParams::default());
        assert!(matches!(fit, TrendFit::Mean { .. }));
    }
}
