//! Average-linkage agglomerative clustering

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{DgeError, Result};

/// One agglomeration step.
/// Node ids below `n_leaves` are leaves; merge `m` creates node `n_leaves + m`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub height: f64,
    pub size: usize,
}

/// The n - 1 merges of an agglomerative clustering, in merge order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeTree {
    n_leaves: usize,
    merges: Vec<Merge>,
}

impl MergeTree {
    pub fn n_leaves(&self) -> usize {
        self.n_leaves
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Flat clustering into `k` groups (1 <= k <= n_leaves).
    ///
    /// Labels run 1..=k in order of first appearance along leaf order.
    pub fn cut(&self, k: usize) -> Result<Vec<usize>> {
        let n = self.n_leaves;
        if k == 0 || k > n {
            return Err(DgeError::InvalidInput {
                reason: format!("cannot cut a tree of {} leaves into {} clusters", n, k),
            });
        }

        // Applying the first n - k merges leaves exactly k components
        let mut parent: Vec<usize> = (0..2 * n).collect();
        for (m, merge) in self.merges.iter().take(n - k).enumerate() {
            let node = n + m;
            parent[merge.left] = node;
            parent[merge.right] = node;
        }

        let root = |mut x: usize| {
            while parent[x] != x {
                x = parent[x];
            }
            x
        };

        let mut label_of_root: Vec<usize> = vec![0; 2 * n];
        let mut next_label = 1;
        let mut labels = Vec::with_capacity(n);
        for leaf in 0..n {
            let r = root(leaf);
            if label_of_root[r] == 0 {
                label_of_root[r] = next_label;
                next_label += 1;
            }
            labels.push(label_of_root[r]);
        }
        Ok(labels)
    }
}

/// Average linkage (UPGMA) over a symmetric distance matrix.
///
/// Cluster distances are updated with the Lance-Williams formula
/// d(a+b, k) = (|a| d(a, k) + |b| d(b, k)) / (|a| + |b|). Each active
/// cluster caches its nearest neighbour; ties resolve to the lowest index.
pub fn average_linkage(dist: &Array2<f64>) -> MergeTree {
    let n = dist.nrows();
    let mut d = dist.clone();
    let mut active = vec![true; n];
    let mut size = vec![1usize; n];
    let mut node_id: Vec<usize> = (0..n).collect();
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    let nearest = |d: &Array2<f64>, active: &[bool], i: usize| -> (usize, f64) {
        let mut best = (usize::MAX, f64::INFINITY);
        for j in 0..active.len() {
            if j != i && active[j] && d[[i, j]] < best.1 {
                best = (j, d[[i, j]]);
            }
        }
        best
    };

    let mut nn: Vec<(usize, f64)> = (0..n).map(|i| nearest(&d, &active, i)).collect();

    for step in 0..n.saturating_sub(1) {
        let mut a = usize::MAX;
        let mut best = f64::INFINITY;
        for i in 0..n {
            if active[i] && nn[i].1 < best {
                best = nn[i].1;
                a = i;
            }
        }
        if a == usize::MAX {
            // Only non-finite distances remain; merge the first two active clusters
            let mut it = (0..n).filter(|&i| active[i]);
            a = it.next().unwrap_or(0);
            nn[a] = (it.next().unwrap_or(a), f64::INFINITY);
        }
        let b = nn[a].0;
        let (a, b) = (a.min(b), a.max(b));
        let height = d[[a, b]];

        merges.push(Merge {
            left: node_id[a].min(node_id[b]),
            right: node_id[a].max(node_id[b]),
            height,
            size: size[a] + size[b],
        });

        let (wa, wb) = (size[a] as f64, size[b] as f64);
        for k in 0..n {
            if active[k] && k != a && k != b {
                let updated = (wa * d[[a, k]] + wb * d[[b, k]]) / (wa + wb);
                d[[a, k]] = updated;
                d[[k, a]] = updated;
            }
        }
        active[b] = false;
        size[a] += size[b];
        node_id[a] = n + step;

        for k in 0..n {
            if !active[k] {
                continue;
            }
            if k == a || nn[k].0 == a || nn[k].0 == b {
                nn[k] = nearest(&d, &active, k);
            } else if d[[k, a]] < nn[k].1 {
                nn[k] = (a, d[[k, a]]);
            }
        }
    }

    MergeTree { n_leaves: n, merges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn line_distances() -> Array2<f64> {
        // Points at 0, 1, 5, 6 on a line
        let pos = [0.0_f64, 1.0, 5.0, 6.0];
        Array2::from_shape_fn((4, 4), |(i, j)| (pos[i] - pos[j]).abs())
    }

    #[test]
    fn test_merge_heights_follow_average_linkage() {
        let tree = average_linkage(&line_distances());
        let merges = tree.merges();
        assert_eq!(merges.len(), 3);
        assert_eq!((merges[0].left, merges[0].right), (0, 1));
        assert_eq!(merges[0].height, 1.0);
        assert_eq!((merges[1].left, merges[1].right), (2, 3));
        // Mean of |0-5|, |0-6|, |1-5|, |1-6|
        assert!((merges[2].height - 5.0).abs() < 1e-12);
        assert_eq!(merges[2].size, 4);
        assert_eq!((merges[2].left, merges[2].right), (4, 5));
    }

    #[test]
    fn test_cut_extremes() {
        let tree = average_linkage(&line_distances());
        assert_eq!(tree.cut(4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(tree.cut(1).unwrap(), vec![1, 1, 1, 1]);
        assert_eq!(tree.cut(2).unwrap(), vec![1, 1, 2, 2]);
        assert!(tree.cut(0).is_err());
        assert!(tree.cut(5).is_err());
    }

    #[test]
    fn test_labels_by_first_appearance() {
        // Leaves 0 and 3 close, 1 and 2 close
        let d = array![
            [0.0, 0.9, 0.8, 0.1],
            [0.9, 0.0, 0.2, 0.9],
            [0.8, 0.2, 0.0, 0.8],
            [0.1, 0.9, 0.8, 0.0]
        ];
        let tree = average_linkage(&d);
        assert_eq!(tree.cut(2).unwrap(), vec![1, 2, 2, 1]);
    }

    #[test]
    fn test_single_leaf() {
        let tree = average_linkage(&Array2::zeros((1, 1)));
        assert!(tree.merges().is_empty());
        assert_eq!(tree.cut(1).unwrap(), vec![1]);
    }
}
