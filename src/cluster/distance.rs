//! Correlation distance between expression profiles

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

/// Centre a row and scale it to unit norm.
/// `None` for rows without variance, whose correlation is undefined.
fn standardize(row: ArrayView1<f64>) -> Option<Vec<f64>> {
    let n = row.len();
    if n < 2 {
        return None;
    }
    let mean = row.sum() / n as f64;
    let centred: Vec<f64> = row.iter().map(|&x| x - mean).collect();
    let norm = centred.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm <= f64::EPSILON * mean.abs().max(1.0) * n as f64 {
        return None;
    }
    Some(centred.into_iter().map(|x| x / norm).collect())
}

/// Pearson correlation of two rows; `None` if either has zero variance
pub fn pearson(x: ArrayView1<f64>, y: ArrayView1<f64>) -> Option<f64> {
    let a = standardize(x)?;
    let b = standardize(y)?;
    Some(a.iter().zip(&b).map(|(p, q)| p * q).sum())
}

/// Pairwise `1 - r` distance between the rows of `data`, clamped to [0, 2].
///
/// Zero-variance rows sit at distance 1 from every other row and 0 from themselves.
pub fn correlation_distance(data: ArrayView2<f64>) -> Array2<f64> {
    let n = data.nrows();
    let rows: Vec<Option<Vec<f64>>> = data.axis_iter(Axis(0)).map(standardize).collect();

    let upper: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            ((i + 1)..n)
                .map(|j| match (&rows[i], &rows[j]) {
                    (Some(a), Some(b)) => {
                        let r: f64 = a.iter().zip(b).map(|(p, q)| p * q).sum();
                        (1.0 - r).clamp(0.0, 2.0)
                    }
                    _ => 1.0,
                })
                .collect()
        })
        .collect();

    let mut dist = Array2::zeros((n, n));
    for (i, row) in upper.into_iter().enumerate() {
        for (offset, d) in row.into_iter().enumerate() {
            let j = i + 1 + offset;
            dist[[i, j]] = d;
            dist[[j, i]] = d;
        }
    }
    dist
}
