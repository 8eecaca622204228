//! Benjamini-Hochberg false discovery rate correction

use crate::stats::cmp_nan_last;

/// Apply Benjamini-Hochberg correction.
///
/// Missing p-values are excluded from the number of tests and stay missing.
/// Adjusted values are `p * m / rank` with a running minimum taken from the
/// largest rank down, capped at 1.
pub fn benjamini_hochberg(pvalues: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut present: Vec<(usize, f64)> = pvalues
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.filter(|v| v.is_finite()).map(|v| (i, v)))
        .collect();

    let mut padj = vec![None; pvalues.len()];
    let m = present.len();
    if m == 0 {
        return padj;
    }

    present.sort_by(|a, b| cmp_nan_last(&a.1, &b.1));

    let mut cummin = f64::INFINITY;
    for (rank, &(i, p)) in present.iter().enumerate().rev() {
        let adj = (p * m as f64 / (rank + 1) as f64).min(1.0);
        cummin = cummin.min(adj);
        padj[i] = Some(cummin);
    }

    padj
}
