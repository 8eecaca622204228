//! Statistical utility functions shared across modules

use std::cmp::Ordering;

/// Consistency constant making the MAD an estimator of the normal standard deviation
const MAD_SCALE: f64 = 1.4826;

/// Total order on floats with NaN sorted last
pub fn cmp_nan_last(a: &f64, b: &f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
    }
}

/// Median of a slice (sorts in place). Returns NaN for an empty slice.
pub fn median(values: &mut [f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    values.sort_by(cmp_nan_last);
    if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    }
}

/// Squared median absolute deviation, scaled for normal consistency
pub fn mad_squared(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut v = values.to_vec();
    let center = median(&mut v);
    let mut abs_devs: Vec<f64> = values.iter().map(|&x| (x - center).abs()).collect();
    let mad = median(&mut abs_devs) * MAD_SCALE;
    mad * mad
}

/// Mean after dropping `trim` of the observations from each end
pub fn trimmed_mean(values: &[f64], trim: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut v = values.to_vec();
    v.sort_by(cmp_nan_last);
    let n = v.len();
    let cut = ((n as f64) * trim).floor() as usize;
    let kept = if 2 * cut < n { &v[cut..n - cut] } else { &v[..] };
    kept.iter().sum::<f64>() / kept.len() as f64
}

/// Sample mean and unbiased variance
pub fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let mean = values.iter().sum::<f64>() / n;
    let var = if values.len() > 1 {
        values.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)
    } else {
        0.0
    };
    (mean, var)
}

/// Trigamma function (derivative of digamma)
pub fn trigamma(x: f64) -> f64 {
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).powi(2) - trigamma(1.0 - x);
    }

    if x >= 8.0 {
        let x2 = x * x;
        return 1.0 / x + 0.5 / x2 + 1.0 / (6.0 * x2 * x) - 1.0 / (30.0 * x2 * x2 * x)
            + 1.0 / (42.0 * x2 * x2 * x2 * x);
    }

    let mut result = 0.0;
    let mut z = x;
    while z < 8.0 {
        result += 1.0 / (z * z);
        z += 1.0;
    }
    result + trigamma(z)
}

/// Maximize a unimodal function on `[lo, hi]` by golden-section search.
/// Returns the argmax once the bracket is narrower than `tol` or after `maxit` steps.
pub fn golden_section_max<F>(f: F, lo: f64, hi: f64, tol: f64, maxit: usize) -> f64
where
    F: Fn(f64) -> f64,
{
    let inv_phi = (5.0_f64.sqrt() - 1.0) / 2.0;
    let (mut a, mut b) = (lo, hi);
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);

    for _ in 0..maxit {
        if (b - a).abs() < tol {
            break;
        }
        if fc > fd || fd.is_nan() {
            b = d;
            d = c;
            fd = fc;
            c = b - inv_phi * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + inv_phi * (b - a);
            fd = f(d);
        }
    }

    (a + b) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), 2.5);
        assert!(median(&mut []).is_nan());
    }

    #[test]
    fn test_mad_squared_of_symmetric_values() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        // median 3, abs devs [2,1,0,1,2] -> median 1
        let expected = MAD_SCALE * MAD_SCALE;
        assert!((mad_squared(&values) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_trimmed_mean_drops_extremes() {
        let values = [1.0, 2.0, 3.0, 4.0, 100.0];
        assert!((trimmed_mean(&values, 0.2) - 3.0).abs() < 1e-12);
        assert!((trimmed_mean(&values, 0.0) - 22.0).abs() < 1e-12);
    }

    #[test]
    fn test_trigamma() {
        // trigamma(1) = pi^2 / 6
        let expected = std::f64::consts::PI.powi(2) / 6.0;
        assert!((trigamma(1.0) - expected).abs() < 1e-8);
        // trigamma(x + 1) = trigamma(x) - 1/x^2
        assert!((trigamma(3.5) - (trigamma(2.5) - 1.0 / 6.25)).abs() < 1e-10);
    }

    #[test]
    fn test_golden_section_finds_parabola_peak() {
        let x = golden_section_max(|x| -(x - 1.3).powi(2), -5.0, 5.0, 1e-9, 200);
        assert!((x - 1.3).abs() < 1e-6);
    }
}
