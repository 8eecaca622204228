//! Hierarchical clustering of expression profiles with silhouette-based
//! selection of the number of clusters

mod distance;
mod linkage;
mod silhouette;

pub use distance::{correlation_distance, pearson};
pub use linkage::{average_linkage, Merge, MergeTree};
pub use silhouette::{mean_silhouette, silhouette_widths, SilhouetteScore};

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::{DgeError, Result};

/// Range of cluster counts considered by the silhouette scan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterParams {
    /// Smallest k scanned; values below 2 are raised to 2
    pub min_k: usize,
    /// Largest k scanned, capped at the number of genes
    pub max_k: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self { min_k: 2, max_k: 20 }
    }
}

/// Final flat clustering of the genes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub gene_ids: Vec<String>,
    /// 1-based cluster label per gene, parallel to `gene_ids`
    pub labels: Vec<usize>,
    pub k: usize,
    pub mean_silhouette: f64,
    pub silhouette_scan: Vec<SilhouetteScore>,
}

impl ClusterAssignment {
    pub fn label_of(&self, gene_id: &str) -> Option<usize> {
        self.gene_ids.iter().position(|g| g == gene_id).map(|i| self.labels[i])
    }

    /// Gene ids in cluster `label`, in gene order
    pub fn members(&self, label: usize) -> Vec<&str> {
        self.gene_ids
            .iter()
            .zip(&self.labels)
            .filter(|(_, &l)| l == label)
            .map(|(g, _)| g.as_str())
            .collect()
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k];
        for &l in &self.labels {
            sizes[l - 1] += 1;
        }
        sizes
    }
}

/// Distance matrix, merge tree and silhouette scan for one gene set.
/// Immutable once built; the scan is computed exactly once.
#[derive(Debug, Clone)]
pub struct ClusterModel {
    gene_ids: Vec<String>,
    distances: Array2<f64>,
    tree: MergeTree,
    scan: Vec<SilhouetteScore>,
    best_k: usize,
}

impl ClusterModel {
    /// Build the model from an expression matrix (genes x samples)
    pub fn fit(
        data: ArrayView2<f64>,
        gene_ids: &[String],
        params: &ClusterParams,
        cancel: &CancelToken,
    ) -> Result<Self> {
        let n = data.nrows();
        if gene_ids.len() != n {
            return Err(DgeError::DimensionMismatch {
                expected: format!("{} gene ids", n),
                got: format!("{} gene ids", gene_ids.len()),
            });
        }
        if n < 2 {
            return Err(DgeError::insufficient(
                "clustering",
                format!("{} gene(s); at least 2 are needed", n),
            ));
        }

        cancel.check("clustering")?;
        let distances = correlation_distance(data);
        let tree = average_linkage(&distances);
        cancel.check("clustering")?;

        let lo = params.min_k.max(2);
        let hi = params.max_k.min(n);
        if lo > hi {
            return Err(DgeError::insufficient(
                "clustering",
                format!("{} genes cannot fill the cluster range {}..={}", n, lo, params.max_k),
            ));
        }

        let scan: Vec<SilhouetteScore> = (lo..=hi)
            .into_par_iter()
            .map(|k| {
                cancel.check("clustering")?;
                let labels = tree.cut(k)?;
                Ok(SilhouetteScore {
                    k,
                    mean_width: mean_silhouette(&distances, &labels, k),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // Strict comparison keeps the smallest k on ties
        let mut best = scan[0];
        for score in &scan[1..] {
            if score.mean_width > best.mean_width {
                best = *score;
            }
        }

        log::info!(
            "Clustered {} genes: k = {} (mean silhouette {:.3}, scanned k = {}..={})",
            n,
            best.k,
            best.mean_width,
            lo,
            hi
        );
        for score in &scan {
            log::debug!("  k = {}: mean silhouette {:.4}", score.k, score.mean_width);
        }

        Ok(Self {
            gene_ids: gene_ids.to_vec(),
            distances,
            tree,
            scan,
            best_k: best.k,
        })
    }

    pub fn n_genes(&self) -> usize {
        self.gene_ids.len()
    }

    pub fn distances(&self) -> &Array2<f64> {
        &self.distances
    }

    pub fn tree(&self) -> &MergeTree {
        &self.tree
    }

    pub fn silhouette_scan(&self) -> &[SilhouetteScore] {
        &self.scan
    }

    pub fn best_k(&self) -> usize {
        self.best_k
    }

    /// Labels for any 1 <= k <= n
    pub fn cut(&self, k: usize) -> Result<Vec<usize>> {
        self.tree.cut(k)
    }

    /// Assignment at the selected k
    pub fn assignment(&self) -> Result<ClusterAssignment> {
        let labels = self.cut(self.best_k)?;
        let mean_width = self
            .scan
            .iter()
            .find(|s| s.k == self.best_k)
            .map_or(0.0, |s| s.mean_width);
        Ok(ClusterAssignment {
            gene_ids: self.gene_ids.clone(),
            labels,
            k: self.best_k,
            mean_silhouette: mean_width,
            silhouette_scan: self.scan.clone(),
        })
    }
}

/// Cluster genes and return the assignment at the silhouette-optimal k
pub fn cluster_genes(
    data: ArrayView2<f64>,
    gene_ids: &[String],
    params: &ClusterParams,
    cancel: &CancelToken,
) -> Result<ClusterAssignment> {
    ClusterModel::fit(data, gene_ids, params, cancel)?.assignment()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("g{}", i)).collect()
    }

    fn anti_correlated_blocks() -> Array2<f64> {
        // Rows 0-3 rise across samples, rows 4-7 fall; power-of-two scales
        // keep the standardized rows bit-identical within a block
        Array2::from_shape_fn((8, 6), |(i, j)| {
            let scale = 2.0_f64.powi((i % 4) as i32);
            if i < 4 {
                scale * (j as f64 + 1.0)
            } else {
                scale * (6.0 - j as f64)
            }
        })
    }

    #[test]
    fn test_two_blocks_give_k2() {
        let data = anti_correlated_blocks();
        let assignment =
            cluster_genes(data.view(), &ids(8), &ClusterParams::default(), &CancelToken::new()).unwrap();
        assert_eq!(assignment.k, 2);
        assert_eq!(assignment.labels, vec![1, 1, 1, 1, 2, 2, 2, 2]);
        assert!((assignment.mean_silhouette - 1.0).abs() < 1e-9);
        assert_eq!(assignment.silhouette_scan.len(), 7);
        assert_eq!(assignment.cluster_sizes(), vec![4, 4]);
        assert_eq!(assignment.label_of("g5"), Some(2));
        assert_eq!(assignment.members(1), vec!["g0", "g1", "g2", "g3"]);
    }

    #[test]
    fn test_cut_extremes_on_model() {
        let data = anti_correlated_blocks();
        let model = ClusterModel::fit(data.view(), &ids(8), &ClusterParams::default(), &CancelToken::new()).unwrap();
        assert_eq!(model.cut(8).unwrap(), (1..=8).collect::<Vec<_>>());
        assert_eq!(model.cut(1).unwrap(), vec![1; 8]);
        assert_eq!(model.best_k(), 2);
    }

    #[test]
    fn test_fewer_than_two_genes() {
        let data = Array2::from_elem((1, 4), 3.0);
        let err = cluster_genes(data.view(), &ids(1), &ClusterParams::default(), &CancelToken::new())
            .unwrap_err();
        match err {
            DgeError::InsufficientData { stage, .. } => assert_eq!(stage, "clustering"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_two_genes_scan_single_k() {
        let data = ndarray::array![[1.0, 2.0, 3.0], [3.0, 2.0, 1.0]];
        let assignment =
            cluster_genes(data.view(), &ids(2), &ClusterParams::default(), &CancelToken::new()).unwrap();
        assert_eq!(assignment.k, 2);
        assert_eq!(assignment.labels, vec![1, 2]);
    }

    #[test]
    fn test_min_k_above_gene_count() {
        let data = anti_correlated_blocks();
        let params = ClusterParams { min_k: 9, max_k: 20 };
        let err = cluster_genes(data.view(), &ids(8), &params, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, DgeError::InsufficientData { ref stage, .. } if stage == "clustering"));
    }

    #[test]
    fn test_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let data = anti_correlated_blocks();
        let err = cluster_genes(data.view(), &ids(8), &ClusterParams::default(), &cancel).unwrap_err();
        assert!(matches!(err, DgeError::Cancelled { .. }));
    }
}
