//! Principal component analysis of samples over a gene set
//!
//! Genes are the variables and samples the observations. Each gene is
//! centred and scaled to unit variance; sample coordinates come from the
//! symmetric eigendecomposition of the sample Gram matrix.

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{DgeError, Result};

/// Parameters for PCA
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaParams {
    /// Number of leading components to report (capped at the number of samples)
    pub n_components: usize,
}

impl Default for PcaParams {
    fn default() -> Self {
        Self { n_components: 2 }
    }
}

/// Sample coordinates on the leading principal components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcaResult {
    pub sample_ids: Vec<String>,
    /// samples x components
    pub coordinates: Array2<f64>,
    /// Fraction of total variance per reported component
    pub explained_variance_ratio: Vec<f64>,
    /// Genes left after dropping those without variance
    pub n_genes_used: usize,
}

impl PcaResult {
    pub fn n_components(&self) -> usize {
        self.coordinates.ncols()
    }
}

/// PCA of `data` (genes x samples)
pub fn pca(data: ArrayView2<f64>, sample_ids: &[String], params: &PcaParams) -> Result<PcaResult> {
    let (n_genes, n_samples) = data.dim();
    if sample_ids.len() != n_samples {
        return Err(DgeError::DimensionMismatch {
            expected: format!("{} sample ids", n_samples),
            got: format!("{} sample ids", sample_ids.len()),
        });
    }
    if n_samples < 2 {
        return Err(DgeError::insufficient("pca", "at least two samples are required"));
    }

    // Standardized rows of the genes that vary
    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(n_genes);
    for row in data.rows() {
        let mean = row.sum() / n_samples as f64;
        let var = row.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n_samples - 1) as f64;
        if var > 0.0 && var.is_finite() {
            let sd = var.sqrt();
            rows.push(row.iter().map(|&x| (x - mean) / sd).collect());
        }
    }
    if rows.is_empty() {
        return Err(DgeError::insufficient(
            "pca",
            format!("none of the {} genes vary across samples", n_genes),
        ));
    }

    let mut gram = Array2::<f64>::zeros((n_samples, n_samples));
    for row in &rows {
        for a in 0..n_samples {
            for b in a..n_samples {
                gram[[a, b]] += row[a] * row[b];
            }
        }
    }
    for a in 0..n_samples {
        for b in 0..a {
            gram[[a, b]] = gram[[b, a]];
        }
    }

    let (eigenvalues, eigenvectors) = symmetric_eigen(&gram);
    let mut order: Vec<usize> = (0..n_samples).collect();
    order.sort_by(|&a, &b| eigenvalues[b].total_cmp(&eigenvalues[a]));

    let total: f64 = eigenvalues.iter().map(|&l| l.max(0.0)).sum();
    let n_components = params.n_components.clamp(1, n_samples);

    let mut coordinates = Array2::<f64>::zeros((n_samples, n_components));
    let mut explained_variance_ratio = Vec::with_capacity(n_components);
    for (c, &k) in order.iter().take(n_components).enumerate() {
        let lambda = eigenvalues[k].max(0.0);
        let scale = lambda.sqrt();

        // Fix the sign so the largest loading is positive
        let pivot = (0..n_samples)
            .max_by(|&a, &b| eigenvectors[[a, k]].abs().total_cmp(&eigenvectors[[b, k]].abs()))
            .unwrap_or(0);
        let sign = if eigenvectors[[pivot, k]] < 0.0 { -1.0 } else { 1.0 };

        for s in 0..n_samples {
            coordinates[[s, c]] = sign * eigenvectors[[s, k]] * scale;
        }
        explained_variance_ratio.push(if total > 0.0 { lambda / total } else { 0.0 });
    }

    log::info!(
        "PCA over {} genes: explained variance {:?}",
        rows.len(),
        explained_variance_ratio
    );

    Ok(PcaResult {
        sample_ids: sample_ids.to_vec(),
        coordinates,
        explained_variance_ratio,
        n_genes_used: rows.len(),
    })
}

/// Eigendecomposition of a symmetric matrix.
/// Returns the eigenvalues and a matrix whose columns are the eigenvectors.
fn symmetric_eigen(a: &Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let n = a.nrows();
    let matrix = DMatrix::from_fn(n, n, |i, j| a[[i, j]]);
    let eigen = SymmetricEigen::new(matrix);
    let vectors = Array2::from_shape_fn((n, n), |(i, j)| eigen.eigenvectors[(i, j)]);
    (eigen.eigenvalues.iter().copied().collect(), vectors)
}
