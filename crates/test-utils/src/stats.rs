//! Goodness-of-fit helpers.

/// Upper 0.1% critical values of the chi-square distribution, indexed by
/// degrees of freedom minus one.
const CHI_SQUARE_999: [f64; 10] = [
    10.828, 13.816, 16.266, 18.467, 20.515, 22.458, 24.322, 26.124, 27.877, 29.588,
];

/// Pearson's chi-square statistic for observed vs expected counts.
///
/// Buckets with an expected count of zero are skipped.
pub fn chi_square_statistic(observed: &[f64], expected: &[f64]) -> f64 {
    assert_eq!(observed.len(), expected.len(), "bucket count mismatch");
    observed
        .iter()
        .zip(expected)
        .filter(|(_, e)| **e > 0.0)
        .map(|(o, e)| (o - e).powi(2) / e)
        .sum()
}

/// 99.9% critical value for `df` degrees of freedom (1..=10).
pub fn chi_square_critical_999(df: usize) -> Option<f64> {
    df.checked_sub(1).and_then(|i| CHI_SQUARE_999.get(i).copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_fit_is_zero() {
        let e = [30.0, 20.0, 10.0];
        assert_eq!(chi_square_statistic(&e, &e), 0.0);
    }

    #[test]
    fn test_known_statistic() {
        // (10-20)^2/20 + (30-20)^2/20 = 10
        let stat = chi_square_statistic(&[10.0, 30.0], &[20.0, 20.0]);
        crate::assert_approx_eq!(stat, 10.0, 1e-12);
    }

    #[test]
    fn test_critical_values() {
        assert_eq!(chi_square_critical_999(5), Some(20.515));
        assert_eq!(chi_square_critical_999(0), None);
        assert_eq!(chi_square_critical_999(11), None);
    }
}
