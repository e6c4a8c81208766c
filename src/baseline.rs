//! Lower-envelope baseline estimation.
//!
//! Electrochemical working electrodes and metal-oxide resistances drift with
//! ambient conditions; over a window of a day or so the slowly varying floor
//! of the raw signal tracks that drift. The envelope extracted here is the
//! per-sample minimum over a symmetric rolling window, later regressed
//! against a covariate channel to obtain a smooth baseline proxy.

use ndarray::{s, Array1, ArrayView1};
use num_traits::Float;

/// Extracts the lower envelope of `signal`.
///
/// The envelope at `n` is the minimum of the window `[n - delta, n + delta]`
/// clamped to the array bounds. Missing values are ignored; a window with no
/// finite sample yields a missing marker.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use baseline_cal::baseline::lower_envelope;
///
/// let signal = array![100.0, 102.0, 98.0, 101.0, 99.0];
/// let envelope = lower_envelope(signal.view(), 1);
/// assert_eq!(envelope, array![100.0, 98.0, 98.0, 98.0, 99.0]);
/// ```
#[must_use]
pub fn lower_envelope<F: Float>(signal: ArrayView1<'_, F>, delta: usize) -> Array1<F> {
    let len = signal.len();
    (0..len)
        .map(|n| {
            let lo = n.saturating_sub(delta);
            let hi = usize::min(len - 1, n + delta);
            // Float::min ignores a NaN on either side.
            signal.slice(s![lo..=hi]).fold(F::nan(), |low, &value| low.min(value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;
    use proptest::prelude::*;

    #[test]
    fn a_wide_window_collapses_to_the_global_minimum() {
        let signal = array![4.0, 2.0, 9.0, 7.0];
        assert_eq!(
            lower_envelope(signal.view(), 10),
            array![2.0, 2.0, 2.0, 2.0]
        );
    }

    #[test]
    fn missing_values_are_skipped() {
        let signal = array![f64::NAN, 5.0, 7.0];
        assert_eq!(lower_envelope(signal.view(), 1), array![5.0, 5.0, 5.0]);
    }

    #[test]
    fn an_all_missing_window_stays_missing() {
        let signal = array![f64::NAN, f64::NAN];
        let envelope = lower_envelope(signal.view(), 1);
        assert!(envelope.iter().all(|value| value.is_nan()));
    }

    #[test]
    fn an_empty_signal_yields_an_empty_envelope() {
        let signal = Array1::<f64>::zeros(0);
        assert!(lower_envelope(signal.view(), 3).is_empty());
    }

    proptest! {
        #[test]
        fn the_envelope_never_exceeds_the_signal(
            values in proptest::collection::vec(-1e3..1e3f64, 1..64),
            delta in 1_usize..8,
        ) {
            let signal = Array1::from(values);
            let envelope = lower_envelope(signal.view(), delta);
            for (low, raw) in envelope.iter().zip(signal.iter()) {
                prop_assert!(low <= raw);
            }
        }
    }
}
