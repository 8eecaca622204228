//! P-value calculation from test statistics

use statrs::distribution::{ContinuousCDF, Normal};

/// Two-sided p-value from a z-statistic: 2 * Phi(-|z|).
/// `None` when the statistic is not finite.
pub fn calculate_pvalue(z: f64) -> Option<f64> {
    if !z.is_finite() {
        return None;
    }
    let normal = Normal::new(0.0, 1.0).ok()?;
    Some((2.0 * normal.cdf(-z.abs())).min(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pvalue_symmetric() {
        let p1 = calculate_pvalue(2.0).unwrap();
        let p2 = calculate_pvalue(-2.0).unwrap();
        assert!((p1 - p2).abs() < 1e-12);
        assert!((p1 - 0.0455).abs() < 1e-4);
    }

    #[test]
    fn test_pvalue_zero_and_range() {
        assert!((calculate_pvalue(0.0).unwrap() - 1.0).abs() < 1e-12);
        for z in [-3.0, -1.0, 1.0, 3.0, 40.0] {
            let p = calculate_pvalue(z).unwrap();
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn test_pvalue_non_finite() {
        assert!(calculate_pvalue(f64::NAN).is_none());
        assert!(calculate_pvalue(f64::INFINITY).is_none());
    }
}
