//! Small numeric helpers

/// Arithmetic mean; `None` for an empty slice
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Nearest-rank percentile: the sorted sample at index `floor(n * q)`
///
/// `q` is clamped to `[0, 1]`; NaN samples sort last.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let idx = ((sorted.len() as f64) * q.clamp(0.0, 1.0)).floor() as usize;
    Some(sorted[idx.min(sorted.len() - 1)])
}

/// Round to three decimals
#[inline]
#[must_use]
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_empty_is_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[100.0, 200.0]), Some(150.0));
    }

    #[test]
    fn p95_uses_floor_index() {
        let values: Vec<f64> = (1..=20).map(f64::from).collect();
        // floor(20 * 0.95) = 19 -> the largest value
        assert_eq!(percentile(&values, 0.95), Some(20.0));

        let ten: Vec<f64> = (1..=10).map(f64::from).collect();
        // floor(10 * 0.95) = 9
        assert_eq!(percentile(&ten, 0.95), Some(10.0));
        assert_eq!(percentile(&ten, 0.5), Some(6.0));
        assert_eq!(percentile(&[], 0.95), None);
    }

    #[test]
    fn rounding() {
        assert_eq!(round3(0.123_456), 0.123);
        assert_eq!(round3(2.0 / 3.0), 0.667);
    }
}
