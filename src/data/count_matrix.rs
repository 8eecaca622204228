//! Count matrix representation for RNA-seq data

use std::collections::HashSet;

use ndarray::{Array2, ArrayView2, Axis};

use crate::error::{DgeError, Result};

/// Reject duplicated identifiers along one axis of the matrix
fn ensure_unique(ids: &[String], what: &str) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(DgeError::InvalidCountMatrix {
                reason: format!("duplicate {} identifier '{}'", what, id),
            });
        }
    }
    Ok(())
}

/// A count matrix of RNA-seq read counts.
/// Rows are genes, columns are samples.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    /// Raw count data (genes x samples)
    counts: Array2<f64>,
    /// Gene identifiers
    gene_ids: Vec<String>,
    /// Sample identifiers
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new count matrix from raw data
    pub fn new(counts: Array2<f64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (n_genes, n_samples) = counts.dim();

        if gene_ids.len() != n_genes {
            return Err(DgeError::DimensionMismatch {
                expected: format!("{} gene IDs", n_genes),
                got: format!("{} gene IDs", gene_ids.len()),
            });
        }

        if sample_ids.len() != n_samples {
            return Err(DgeError::DimensionMismatch {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }

        if counts.iter().any(|&x| x < 0.0 || !x.is_finite()) {
            return Err(DgeError::InvalidCountMatrix {
                reason: "counts must be non-negative finite values".to_string(),
            });
        }

        if counts.iter().any(|&x| x != x.round()) {
            log::warn!("Some count values are not integers; the negative binomial model assumes integer counts");
        }

        ensure_unique(&gene_ids, "gene")?;
        ensure_unique(&sample_ids, "sample")?;

        Ok(Self {
            counts,
            gene_ids,
            sample_ids,
        })
    }

    pub fn n_genes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    /// Get the raw counts as a view
    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get gene index by ID
    pub fn gene_index(&self, gene_id: &str) -> Option<usize> {
        self.gene_ids.iter().position(|id| id == gene_id)
    }

    /// Sum of counts per gene across all samples
    pub fn row_totals(&self) -> Vec<f64> {
        self.counts.axis_iter(Axis(0)).map(|row| row.sum()).collect()
    }

    /// Keep genes whose total count across samples is strictly above `min_total`.
    /// Returns the filtered matrix and the number of genes removed.
    pub fn filter_by_total(&self, min_total: f64) -> Result<(Self, usize)> {
        let keep: Vec<usize> = self
            .row_totals()
            .iter()
            .enumerate()
            .filter(|(_, &total)| total > min_total)
            .map(|(i, _)| i)
            .collect();

        if keep.is_empty() {
            return Err(DgeError::insufficient(
                "count filtering",
                format!("no genes with total count above {}", min_total),
            ));
        }

        let removed = self.n_genes() - keep.len();
        Ok((self.subset_genes(&keep)?, removed))
    }

    /// Subset to specific genes
    pub fn subset_genes(&self, gene_indices: &[usize]) -> Result<Self> {
        let new_counts = self.counts.select(Axis(0), gene_indices);
        let new_gene_ids = gene_indices.iter().map(|&i| self.gene_ids[i].clone()).collect();
        Self::new(new_counts, new_gene_ids, self.sample_ids.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn test_count_matrix_creation() {
        let counts = array![[10.0, 20.0, 30.0], [5.0, 15.0, 25.0]];
        let matrix = CountMatrix::new(counts, ids("gene", 2), ids("s", 3)).unwrap();
        assert_eq!(matrix.n_genes(), 2);
        assert_eq!(matrix.n_samples(), 3);
    }

    #[test]
    fn test_negative_counts_rejected() {
        let counts = array![[10.0, -5.0], [5.0, 15.0]];
        let result = CountMatrix::new(counts, ids("gene", 2), ids("s", 2));
        assert!(matches!(result, Err(DgeError::InvalidCountMatrix { .. })));
    }

    #[test]
    fn test_duplicate_gene_rejected() {
        let counts = array![[1.0, 2.0], [3.0, 4.0]];
        let genes = vec!["g".to_string(), "g".to_string()];
        assert!(CountMatrix::new(counts, genes, ids("s", 2)).is_err());
    }

    #[test]
    fn test_row_totals_and_lookup() {
        let counts = array![[10.0, 20.0], [5.0, 15.0]];
        let matrix = CountMatrix::new(counts, ids("gene", 2), ids("s", 2)).unwrap();
        assert_eq!(matrix.row_totals(), vec![30.0, 20.0]);
        assert_eq!(matrix.gene_index("gene2"), Some(1));
        assert_eq!(matrix.gene_index("gene3"), None);
    }

    #[test]
    fn test_filter_by_total_is_strict() {
        let counts = array![[5.0, 5.0], [6.0, 5.0], [0.0, 0.0]];
        let matrix = CountMatrix::new(counts, ids("gene", 3), ids("s", 2)).unwrap();
        let (filtered, removed) = matrix.filter_by_total(10.0).unwrap();
        assert_eq!(filtered.gene_ids(), &["gene2".to_string()]);
        assert_eq!(removed, 2);
    }
}
