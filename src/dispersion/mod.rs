//! Dispersion estimation for negative binomial models

mod gene_wise;
mod map;
mod trend;

pub use gene_wise::estimate_gene_dispersion;
pub use map::{estimate_prior_variance, fit_map_dispersion, PriorVariance};
pub use trend::{fit_dispersion_trend, TrendFit, TrendFitMethod};

use ndarray::Array1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::data::DgeDataSet;
use crate::error::{DgeError, Result};
use crate::stats::golden_section_max;

/// Floor applied to per-gene means before they enter a likelihood
pub(crate) const MEAN_FLOOR: f64 = 1e-10;

/// Number of points in the coarse log-dispersion grid
const GRID_POINTS: usize = 20;

/// Configurable parameters for dispersion estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispersionParams {
    /// Minimum dispersion value
    pub min_disp: f64,
    /// Width of the final log-dispersion bracket
    pub disp_tol: f64,
    /// Maximum golden-section iterations per gene
    pub maxit: usize,
    /// Outlier SD threshold for MAP shrinkage
    pub outlier_sd: f64,
    /// How the dispersion-mean trend is fitted
    pub trend: TrendFitMethod,
}

impl Default for DispersionParams {
    fn default() -> Self {
        Self {
            min_disp: 1e-8,
            disp_tol: 1e-6,
            maxit: 100,
            outlier_sd: 2.0,
            trend: TrendFitMethod::Parametric,
        }
    }
}

impl DispersionParams {
    /// Upper end of the search interval: max(10, n_samples)
    pub fn max_disp(&self, n_samples: usize) -> f64 {
        (n_samples as f64).max(10.0)
    }
}

/// Per-gene dispersion estimates produced by [`estimate_dispersions`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispersionTable {
    /// Mean of normalized counts per gene
    pub base_means: Array1<f64>,
    /// Maximum-likelihood estimates
    pub gene_wise: Array1<f64>,
    /// Trend evaluated at each gene's mean
    pub trended: Array1<f64>,
    /// Shrunk estimates used for testing
    pub final_dispersions: Array1<f64>,
    /// Genes that kept their gene-wise estimate
    pub outliers: Vec<bool>,
    pub trend: TrendFit,
    pub prior: PriorVariance,
}

impl DispersionTable {
    pub fn len(&self) -> usize {
        self.final_dispersions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.final_dispersions.is_empty()
    }

    pub fn n_outliers(&self) -> usize {
        self.outliers.iter().filter(|&&o| o).count()
    }
}

/// Estimate gene-wise, trended and final dispersions and store them on the dataset
pub fn estimate_dispersions(
    dds: &mut DgeDataSet,
    params: &DispersionParams,
    cancel: &CancelToken,
) -> Result<()> {
    let size_factors = dds
        .size_factors()
        .ok_or_else(|| DgeError::InvalidInput {
            reason: "size factors must be estimated before dispersions".to_string(),
        })?
        .as_slice()
        .to_vec();

    let n_samples = dds.n_samples();
    if n_samples < 2 {
        return Err(DgeError::insufficient(
            "dispersion",
            "at least two samples are required",
        ));
    }

    let counts = dds.counts().counts();
    let n_genes = counts.nrows();

    // Step 1: gene-wise MLE
    log::info!("Estimating gene-wise dispersions for {} genes", n_genes);
    let gene_results: Vec<(f64, f64)> = (0..n_genes)
        .into_par_iter()
        .map(|i| {
            cancel.check("dispersion")?;
            let row = counts.row(i).to_vec();
            Ok(estimate_gene_dispersion(&row, &size_factors, params))
        })
        .collect::<Result<Vec<_>>>()?;

    let gene_wise: Array1<f64> = gene_results.iter().map(|&(d, _)| d).collect();
    let base_means: Array1<f64> = gene_results.iter().map(|&(_, m)| m).collect();

    let n_non_finite = gene_wise.iter().filter(|d| !d.is_finite()).count();
    if n_non_finite > 0 {
        log::warn!("{} genes have a non-finite gene-wise dispersion", n_non_finite);
    }

    // Step 2: trend
    let trend = fit_dispersion_trend(
        base_means.as_slice().unwrap_or(&[]),
        gene_wise.as_slice().unwrap_or(&[]),
        params,
    );
    let trended: Array1<f64> = base_means.iter().map(|&m| trend.predict(m)).collect();

    // Step 3: MAP shrinkage toward the trend
    let prior = estimate_prior_variance(
        gene_wise.as_slice().unwrap_or(&[]),
        trended.as_slice().unwrap_or(&[]),
        n_samples,
        1,
        params,
    );
    log::debug!(
        "Dispersion prior variance {:.4} (residual MAD^2 {:.4})",
        prior.prior_var,
        prior.var_log_disp_ests
    );

    let map_dispersions: Vec<f64> = (0..n_genes)
        .into_par_iter()
        .map(|i| {
            cancel.check("dispersion")?;
            let row = counts.row(i).to_vec();
            Ok(fit_map_dispersion(
                &row,
                &size_factors,
                trended[i],
                prior.prior_var,
                params,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    let outlier_threshold = params.outlier_sd * prior.var_log_disp_ests.sqrt();
    let outliers: Vec<bool> = gene_wise
        .iter()
        .zip(trended.iter())
        .map(|(&g, &t)| {
            g.is_finite() && t.is_finite() && g > 0.0 && t > 0.0 && g.ln() - t.ln() > outlier_threshold
        })
        .collect();

    let final_dispersions: Array1<f64> = (0..n_genes)
        .map(|i| if outliers[i] { gene_wise[i] } else { map_dispersions[i] })
        .collect();

    let table = DispersionTable {
        base_means,
        gene_wise,
        trended,
        final_dispersions,
        outliers,
        trend,
        prior,
    };
    log::info!(
        "Dispersions estimated: {} genes, {} kept their gene-wise value (threshold {:.3})",
        table.len(),
        table.n_outliers(),
        outlier_threshold
    );

    dds.set_dispersions(table)
}

/// Maximize a log-dispersion objective over `[lo, hi]`.
///
/// A coarse grid (plus the optional `start` point) locates the best region,
/// then golden-section search refines within one grid step on either side.
/// Returns `None` when the objective is not finite at any grid point.
pub(crate) fn maximize_log_alpha<F>(
    f: F,
    lo: f64,
    hi: f64,
    start: Option<f64>,
    params: &DispersionParams,
) -> Option<f64>
where
    F: Fn(f64) -> f64,
{
    let step = (hi - lo) / (GRID_POINTS - 1) as f64;
    let mut candidates: Vec<f64> = (0..GRID_POINTS).map(|k| lo + step * k as f64).collect();
    if let Some(s) = start.filter(|s| s.is_finite() && *s >= lo && *s <= hi) {
        candidates.push(s);
    }

    let (best_x, best_f) = candidates
        .iter()
        .map(|&x| (x, f(x)))
        .filter(|(_, v)| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, (x, v)| match acc {
            Some((_, bv)) if bv >= v => acc,
            _ => Some((x, v)),
        })?;

    let a = (best_x - step).max(lo);
    let b = (best_x + step).min(hi);
    let refined = golden_section_max(&f, a, b, params.disp_tol, params.maxit);
    let refined_f = f(refined);

    if refined_f.is_finite() && refined_f >= best_f {
        Some(refined)
    } else {
        Some(best_x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CountMatrix, DesignTable};
    use crate::normalization::{estimate_size_factors, SizeFactorParams};
    use ndarray::Array2;

    fn simulated_dataset() -> DgeDataSet {
        // Deterministic overdispersed counts at a range of means
        let n_genes = 40;
        let n_samples = 8;
        let noise = [0.6, 1.3, 0.9, 1.5, 0.7, 1.1, 1.4, 0.5];
        let counts = Array2::from_shape_fn((n_genes, n_samples), |(i, j)| {
            let mean = 20.0 + 15.0 * i as f64;
            let jitter = noise[(i + j) % n_samples];
            (mean * jitter).round()
        });
        let genes = (0..n_genes).map(|i| format!("g{}", i)).collect();
        let samples: Vec<String> = (0..n_samples).map(|j| format!("s{}", j)).collect();
        let conditions = (0..n_samples)
            .map(|j| if j < 4 { "A".to_string() } else { "B".to_string() })
            .collect();
        let cm = CountMatrix::new(counts, genes, samples.clone()).unwrap();
        let design = DesignTable::new(samples, conditions, Some("A")).unwrap();
        let mut dds = DgeDataSet::new(cm, design).unwrap();
        estimate_size_factors(&mut dds, &SizeFactorParams::default()).unwrap();
        dds
    }

    #[test]
    fn test_estimate_dispersions_fills_table() {
        let mut dds = simulated_dataset();
        estimate_dispersions(&mut dds, &DispersionParams::default(), &CancelToken::new()).unwrap();
        let table = dds.dispersions().unwrap();
        assert_eq!(table.len(), 40);
        assert!(table.final_dispersions.iter().all(|d| d.is_finite() && *d > 0.0));
        assert!(table.trended.iter().all(|d| d.is_finite() && *d > 0.0));
        assert!(table.prior.prior_var >= 0.25);
    }

    #[test]
    fn test_cancelled_estimation() {
        let mut dds = simulated_dataset();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = estimate_dispersions(&mut dds, &DispersionParams::default(), &cancel).unwrap_err();
        assert!(matches!(err, DgeError::Cancelled { .. }));
        assert!(!dds.has_dispersions());
    }

    #[test]
    fn test_requires_size_factors() {
        let counts = ndarray::array![[10.0, 20.0, 30.0], [5.0, 6.0, 7.0]];
        let samples: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let cm = CountMatrix::new(counts, vec!["x".into(), "y".into()], samples.clone()).unwrap();
        let design = DesignTable::new(
            samples,
            vec!["c".into(), "t".into(), "t".into()],
            Some("c"),
        )
        .unwrap();
        let mut dds = DgeDataSet::new(cm, design).unwrap();
        assert!(estimate_dispersions(&mut dds, &DispersionParams::default(), &CancelToken::new()).is_err());
    }

    #[test]
    fn test_maximize_log_alpha_interior_peak() {
        let params = DispersionParams::default();
        let x = maximize_log_alpha(|x| -(x + 1.7).powi(2), -18.0, 2.3, None, &params).unwrap();
        assert!((x + 1.7).abs() < 1e-4);
    }

    #[test]
    fn test_maximize_log_alpha_all_nan() {
        let params = DispersionParams::default();
        assert!(maximize_log_alpha(|_| f64::NAN, -1.0, 1.0, None, &params).is_none());
    }
}
