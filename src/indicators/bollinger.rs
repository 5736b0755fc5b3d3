// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ). σ is the population standard deviation over
// the same window as the SMA.

/// Bands for one close.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Calculate Bollinger Bands for every close.
///
/// Element `i` is `Some` once `period` closes ending at `i` are available
/// (`i >= period - 1`), and `None` before that or when the window holds a
/// non-finite close.
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> Vec<Option<Bands>> {
    let mut result = vec![None; closes.len()];
    if period == 0 || closes.len() < period {
        return result;
    }

    let period_f = period as f64;
    for (start, window) in closes.windows(period).enumerate() {
        let middle = window.iter().sum::<f64>() / period_f;
        let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period_f;
        let std_dev = variance.sqrt();

        if !middle.is_finite() || !std_dev.is_finite() {
            continue;
        }

        result[start + period - 1] = Some(Bands {
            upper: middle + num_std * std_dev,
            middle,
            lower: middle - num_std * std_dev,
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bollinger_basic() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let series = calculate_bollinger(&closes, 20, 2.0);
        assert!(series[..19].iter().all(Option::is_none));
        let bb = series[19].unwrap();
        assert!((bb.middle - 10.5).abs() < 1e-10);
        // Population variance of 1..=20 is (20^2 - 1) / 12.
        let sigma = (399.0_f64 / 12.0).sqrt();
        assert!((bb.upper - (10.5 + 2.0 * sigma)).abs() < 1e-10);
        assert!((bb.lower - (10.5 - 2.0 * sigma)).abs() < 1e-10);
    }

    #[test]
    fn bollinger_insufficient_data() {
        let closes = vec![1.0, 2.0, 3.0];
        let bands = calculate_bollinger(&closes, 20, 2.0);
        assert!(bands.iter().all(Option::is_none));
    }

    #[test]
    fn bollinger_flat() {
        let series = calculate_bollinger(&[100.0; 25], 20, 2.0);
        for bb in series.into_iter().flatten() {
            assert!((bb.upper - bb.lower).abs() < 1e-10);
            assert!((bb.middle - 100.0).abs() < 1e-10);
        }
    }

    #[test]
    fn bollinger_rolls_forward() {
        let mut closes = vec![10.0; 20];
        closes.push(30.0);
        let series = calculate_bollinger(&closes, 20, 2.0);
        let last = series[20].unwrap();
        assert!((last.middle - 11.0).abs() < 1e-10);
        // Variance = (19 * 1 + 19^2) / 20 = 19.
        assert!((last.upper - (11.0 + 2.0 * 19.0_f64.sqrt())).abs() < 1e-10);
    }
}
