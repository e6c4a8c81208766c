//! Single-pole IIR smoothing of the stitched concentration series.

use num_traits::Float;

/// Exponentially smooths `series` with coefficient `alpha`.
///
/// `filtered[0] = series[0]`, then
/// `filtered[n] = alpha * series[n] + (1 - alpha) * filtered[n - 1]`.
/// The caller replaces missing values with zero before filtering; the
/// resulting transients around data gaps are part of the method, not
/// smoothed away here.
///
/// # Examples
///
/// ```
/// use baseline_cal::filter::exponential_smoothing;
///
/// let smoothed = exponential_smoothing(&[1.0, 3.0, 3.0], 0.5);
/// assert_eq!(smoothed, vec![1.0, 2.0, 2.5]);
/// ```
#[must_use]
pub fn exponential_smoothing<F: Float>(series: &[F], alpha: F) -> Vec<F> {
    let Some(&first) = series.first() else {
        return Vec::new();
    };
    let mut filtered = Vec::with_capacity(series.len());
    let mut previous = first;
    filtered.push(first);
    for &raw in &series[1..] {
        previous = alpha * raw + (F::one() - alpha) * previous;
        filtered.push(previous);
    }
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn an_empty_series_stays_empty() {
        assert!(exponential_smoothing::<f64>(&[], 0.2).is_empty());
    }

    #[test]
    fn a_constant_series_is_a_fixed_point() {
        let smoothed = exponential_smoothing(&[4.0; 8], 0.2);
        assert_eq!(smoothed, vec![4.0; 8]);
    }

    #[test]
    fn a_step_decays_towards_the_new_level() {
        let smoothed = exponential_smoothing(&[0.0, 1.0, 1.0, 1.0], 0.2);
        approx::assert_relative_eq!(smoothed[1], 0.2);
        approx::assert_relative_eq!(smoothed[2], 0.36);
        approx::assert_relative_eq!(smoothed[3], 0.488);
    }

    proptest! {
        #[test]
        fn length_is_preserved_and_the_first_sample_passes_through(
            values in proptest::collection::vec(-1e6..1e6f64, 1..128),
            alpha in 0.01..=1.0f64,
        ) {
            let smoothed = exponential_smoothing(&values, alpha);
            prop_assert_eq!(smoothed.len(), values.len());
            prop_assert_eq!(smoothed[0], values[0]);
        }

        #[test]
        fn unit_alpha_is_the_identity(
            values in proptest::collection::vec(-1e6..1e6f64, 1..128),
        ) {
            prop_assert_eq!(exponential_smoothing(&values, 1.0), values);
        }
    }
}
