//! Silhouette widths for flat clusterings

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Mean silhouette width of one candidate cluster count
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SilhouetteScore {
    pub k: usize,
    pub mean_width: f64,
}

/// Silhouette width of every item given 1-based `labels` with `k` distinct values.
///
/// s(i) = (b - a) / max(a, b) where a is the mean distance to the rest of the
/// item's own cluster and b the smallest mean distance to another cluster.
/// Items in singleton clusters score 0, as does every item when k = 1.
pub fn silhouette_widths(dist: &Array2<f64>, labels: &[usize], k: usize) -> Vec<f64> {
    let n = labels.len();
    if k < 2 {
        return vec![0.0; n];
    }

    let mut cluster_sizes = vec![0usize; k + 1];
    for &l in labels {
        cluster_sizes[l] += 1;
    }

    (0..n)
        .map(|i| {
            let own = labels[i];
            if cluster_sizes[own] <= 1 {
                return 0.0;
            }

            let mut sums = vec![0.0; k + 1];
            for j in 0..n {
                if j != i {
                    sums[labels[j]] += dist[[i, j]];
                }
            }

            let a = sums[own] / (cluster_sizes[own] - 1) as f64;
            let b = (1..=k)
                .filter(|&c| c != own && cluster_sizes[c] > 0)
                .map(|c| sums[c] / cluster_sizes[c] as f64)
                .fold(f64::INFINITY, f64::min);

            let denom = a.max(b);
            if denom > 0.0 && denom.is_finite() {
                (b - a) / denom
            } else {
                0.0
            }
        })
        .collect()
}

/// Average silhouette width over all items
pub fn mean_silhouette(dist: &Array2<f64>, labels: &[usize], k: usize) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let widths = silhouette_widths(dist, labels, k);
    widths.iter().sum::<f64>() / widths.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn two_pairs() -> Array2<f64> {
        let pos = [0.0_f64, 1.0, 5.0, 6.0];
        Array2::from_shape_fn((4, 4), |(i, j)| (pos[i] - pos[j]).abs())
    }

    #[test]
    fn test_known_widths() {
        let widths = silhouette_widths(&two_pairs(), &[1, 1, 2, 2], 2);
        // Item 0: a = 1, b = (5 + 6) / 2 = 5.5
        assert_abs_diff_eq!(widths[0], 4.5 / 5.5, epsilon = 1e-12);
        // Item 1: a = 1, b = (4 + 5) / 2 = 4.5
        assert_abs_diff_eq!(widths[1], 3.5 / 4.5, epsilon = 1e-12);
    }

    #[test]
    fn test_singletons_and_single_cluster_score_zero() {
        let d = two_pairs();
        assert_eq!(mean_silhouette(&d, &[1, 2, 3, 4], 4), 0.0);
        assert_eq!(mean_silhouette(&d, &[1, 1, 1, 1], 1), 0.0);
        let widths = silhouette_widths(&d, &[1, 1, 2, 3], 3);
        assert_eq!(widths[2], 0.0);
        assert_eq!(widths[3], 0.0);
    }

    #[test]
    fn test_good_partition_beats_bad() {
        let d = two_pairs();
        assert!(mean_silhouette(&d, &[1, 1, 2, 2], 2) > mean_silhouette(&d, &[1, 2, 1, 2], 2));
    }
}
