//! Size factor estimation using the median of ratios method

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::data::DgeDataSet;
use crate::error::{DgeError, Result};
use crate::stats::median;

/// Parameters for size factor estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeFactorParams {
    /// Minimum number of genes with non-zero counts in every sample.
    /// Below this the estimator falls back to unit size factors.
    pub min_genes: usize,
}

impl Default for SizeFactorParams {
    fn default() -> Self {
        Self { min_genes: 1 }
    }
}

/// One positive scale factor per sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeFactors {
    values: Array1<f64>,
    /// Set when too few genes were usable and every factor defaulted to 1
    fallback: bool,
    /// Number of genes that contributed a ratio
    n_reference_genes: usize,
}

impl SizeFactors {
    /// Wrap externally supplied factors; all must be positive and finite
    pub fn from_values(values: Array1<f64>) -> Result<Self> {
        if values.iter().any(|&s| s <= 0.0 || !s.is_finite()) {
            return Err(DgeError::InvalidInput {
                reason: "size factors must be positive and finite".to_string(),
            });
        }
        Ok(Self {
            values,
            fallback: false,
            n_reference_genes: 0,
        })
    }

    fn unit(n_samples: usize, n_reference_genes: usize) -> Self {
        Self {
            values: Array1::ones(n_samples),
            fallback: true,
            n_reference_genes,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn as_slice(&self) -> &[f64] {
        self.values.as_slice().unwrap_or(&[])
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn n_reference_genes(&self) -> usize {
        self.n_reference_genes
    }

    /// Divide each sample column by its factor
    pub fn normalize(&self, counts: ArrayView2<f64>) -> Array2<f64> {
        let mut out = counts.to_owned();
        for (mut col, &s) in out.axis_iter_mut(Axis(1)).zip(self.values.iter()) {
            col.mapv_inplace(|x| x / s);
        }
        out
    }
}

/// Estimate size factors for a dataset and store them on it
pub fn estimate_size_factors(dds: &mut DgeDataSet, params: &SizeFactorParams) -> Result<()> {
    let size_factors = median_of_ratios(dds.counts().counts(), params)?;
    if size_factors.is_fallback() {
        log::warn!(
            "Only {} genes have non-zero counts in every sample (need {}); using unit size factors",
            size_factors.n_reference_genes(),
            params.min_genes
        );
    } else {
        log::info!(
            "Size factors from {} reference genes: {:?}",
            size_factors.n_reference_genes(),
            size_factors.as_slice()
        );
    }
    dds.set_size_factors(size_factors)
}

/// Standard median of ratios method
pub fn median_of_ratios(counts: ArrayView2<f64>, params: &SizeFactorParams) -> Result<SizeFactors> {
    let (n_genes, n_samples) = counts.dim();

    if n_genes == 0 || n_samples == 0 {
        return Err(DgeError::InvalidCountMatrix {
            reason: "count matrix is empty".to_string(),
        });
    }

    // Log geometric mean per gene; genes with a zero anywhere are skipped
    let reference: Vec<(usize, f64)> = counts
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, row)| row.iter().all(|&x| x > 0.0))
        .map(|(i, row)| (i, row.iter().map(|&x| x.ln()).sum::<f64>() / n_samples as f64))
        .collect();

    if reference.len() < params.min_genes.max(1) {
        return Ok(SizeFactors::unit(n_samples, reference.len()));
    }

    let mut values = Array1::zeros(n_samples);
    for j in 0..n_samples {
        let mut log_ratios: Vec<f64> = reference
            .iter()
            .map(|&(i, log_geo)| counts[[i, j]].ln() - log_geo)
            .collect();
        values[j] = median(&mut log_ratios).exp();
    }

    if values.iter().any(|&x: &f64| x <= 0.0 || !x.is_finite()) {
        return Ok(SizeFactors::unit(n_samples, reference.len()));
    }

    Ok(SizeFactors {
        values,
        fallback: false,
        n_reference_genes: reference.len(),
    })
}
