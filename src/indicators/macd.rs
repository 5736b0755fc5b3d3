// =============================================================================
// MACD (Moving Average Convergence Divergence)
// =============================================================================
//
//   line      = EMA_fast(close) - EMA_slow(close)
//   signal    = EMA_signal(line)
//   histogram = line - signal
//
// The signal EMA runs over the raw line recursion from the first close, so it
// is only reported once the line itself is defined and the signal window has
// filled behind it: from index `slow + signal - 2`.
// =============================================================================

use super::ema::ema_recursion;

/// MACD components aligned with the input closes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacdSeries {
    pub line: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let n = closes.len();
    if fast == 0 || slow == 0 || signal == 0 || n == 0 {
        return MacdSeries {
            line: vec![None; n],
            signal: vec![None; n],
            histogram: vec![None; n],
        };
    }

    let ema_fast = ema_recursion(closes, fast);
    let ema_slow = ema_recursion(closes, slow);
    let raw_line: Vec<f64> = ema_fast.iter().zip(&ema_slow).map(|(f, s)| f - s).collect();
    let raw_signal = ema_recursion(&raw_line, signal);

    let line_from = fast.max(slow) - 1;
    let signal_from = line_from + signal - 1;

    let mut out = MacdSeries::default();
    for i in 0..n {
        let line = defined(raw_line[i], i >= line_from);
        let sig = defined(raw_signal[i], i >= signal_from);
        out.line.push(line);
        out.signal.push(sig);
        out.histogram.push(line.zip(sig).map(|(l, s)| l - s));
    }
    out
}

fn defined(value: f64, warmed_up: bool) -> Option<f64> {
    (warmed_up && value.is_finite()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_starts_match_windows() {
        let closes: Vec<f64> = (0..60).map(|x| 100.0 + (x as f64 * 0.3).sin()).collect();
        let macd = calculate_macd(&closes, 12, 26, 9);
        assert_eq!(macd.line.len(), 60);
        assert!(macd.line[24].is_none());
        assert!(macd.line[25].is_some());
        assert!(macd.signal[32].is_none());
        assert!(macd.signal[33].is_some());
        assert!(macd.histogram[32].is_none());
        assert!(macd.histogram[33].is_some());
    }

    #[test]
    fn histogram_is_line_minus_signal() {
        let closes: Vec<f64> = (0..80)
            .map(|x| 50.0 + (x as f64 * 0.2).cos() * 5.0)
            .collect();
        let macd = calculate_macd(&closes, 12, 26, 9);
        for i in 33..80 {
            let line = macd.line[i].unwrap();
            let signal = macd.signal[i].unwrap();
            let histogram = macd.histogram[i].unwrap();
            assert!((histogram - (line - signal)).abs() < 1e-12);
        }
    }

    #[test]
    fn rising_series_is_bullish() {
        let closes: Vec<f64> = (1..=201).map(|x| x as f64).collect();
        let macd = calculate_macd(&closes, 12, 26, 9);
        let line = macd.line[200].unwrap();
        let signal = macd.signal[200].unwrap();
        assert!(line > 0.0);
        assert!(line > signal);
    }

    #[test]
    fn flat_series_is_zero() {
        let macd = calculate_macd(&[42.0; 50], 12, 26, 9);
        assert!(macd.line[49].unwrap().abs() < 1e-12);
        assert!(macd.histogram[49].unwrap().abs() < 1e-12);
    }

    #[test]
    fn empty_input() {
        assert_eq!(calculate_macd(&[], 12, 26, 9), MacdSeries::default());
    }
}
