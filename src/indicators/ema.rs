// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_0      = close_0
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The recursion is seeded with the first close and runs over the whole series.
// Values before index `period - 1` are reported as undefined because they
// rest on fewer closes than the period.
// =============================================================================

/// Raw EMA recursion over `values`, one output per input, seeded with
/// `values[0]`.
///
/// Returns an empty `Vec` when the input is empty or the period is zero.
pub fn ema_recursion(values: &[f64], period: usize) -> Vec<f64> {
    let Some(&seed) = values.first() else {
        return Vec::new();
    };
    if period == 0 {
        return Vec::new();
    }

    let multiplier = 2.0 / (period + 1) as f64;

    let mut result = Vec::with_capacity(values.len());
    let mut prev_ema = seed;
    result.push(prev_ema);
    for &value in &values[1..] {
        prev_ema = value * multiplier + prev_ema * (1.0 - multiplier);
        result.push(prev_ema);
    }
    result
}

/// Compute the EMA series for the given `closes` slice and look-back `period`.
///
/// The output is aligned with `closes`. Element `i` is `None` for
/// `i < period - 1` and whenever the recursion produced a non-finite value.
///
/// # Edge cases
/// - `period == 0` => all `None`
/// - `closes.len() < period` => all `None`
pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 || closes.len() < period {
        return vec![None; closes.len()];
    }

    ema_recursion(closes, period)
        .into_iter()
        .enumerate()
        .map(|(i, v)| (i + 1 >= period && v.is_finite()).then_some(v))
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    // ---- ema_recursion ---------------------------------------------------

    #[test]
    fn recursion_empty_input() {
        assert!(ema_recursion(&[], 5).is_empty());
    }

    #[test]
    fn recursion_seeds_with_first_value() {
        let out = ema_recursion(&[10.0, 20.0], 3);
        // multiplier = 0.5
        assert!((out[0] - 10.0).abs() < 1e-12);
        assert!((out[1] - 15.0).abs() < 1e-12);
    }

    #[test]
    fn recursion_known_values() {
        let closes: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let ema = ema_recursion(&closes, 5);
        assert_eq!(ema.len(), 10);

        let mult = 2.0 / 6.0;
        let mut expected = 1.0;
        for (i, &c) in closes.iter().enumerate().skip(1) {
            expected = c * mult + expected * (1.0 - mult);
            assert!(
                (ema[i] - expected).abs() < 1e-10,
                "index {i}: got {}, expected {expected}",
                ema[i]
            );
        }
    }

    // ---- calculate_ema ---------------------------------------------------

    #[test]
    fn ema_period_zero() {
        assert_eq!(calculate_ema(&[1.0, 2.0, 3.0], 0), vec![None, None, None]);
    }

    #[test]
    fn ema_insufficient_data() {
        assert!(calculate_ema(&[1.0, 2.0], 5).iter().all(Option::is_none));
    }

    #[test]
    fn ema_undefined_before_window() {
        let closes: Vec<f64> = (1..=60).map(|x| x as f64).collect();
        let ema = calculate_ema(&closes, 50);
        assert_eq!(ema.len(), 60);
        assert!(ema[..49].iter().all(Option::is_none));
        assert!(ema[49..].iter().all(Option::is_some));
    }

    #[test]
    fn ema_flat_series_is_flat() {
        let ema = calculate_ema(&[100.0; 30], 10);
        for v in ema.into_iter().flatten() {
            assert!((v - 100.0).abs() < 1e-10);
        }
    }

    #[test]
    fn ema_lags_rising_series() {
        let closes: Vec<f64> = (1..=200).map(|x| x as f64).collect();
        let last = calculate_ema(&closes, 50)[199].unwrap();
        assert!(last < 200.0);
        assert!(last > 150.0);
    }

    #[test]
    fn ema_non_finite_is_undefined() {
        let ema = calculate_ema(&[1.0, 2.0, f64::NAN, 4.0], 2);
        assert_eq!(ema[0], None);
        assert!(ema[1].is_some());
        assert_eq!(ema[2], None);
        assert_eq!(ema[3], None);
    }
}
