// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the technical indicators used by
// the analysis pipeline. Every series is computed over the whole input at once
// and returned aligned with it; positions whose window is not yet satisfied
// hold `None`.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;

use crate::market_data::IndicatorValues;

pub const RSI_PERIOD: usize = 14;
pub const EMA_FAST: usize = 50;
pub const EMA_SLOW: usize = 200;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BB_PERIOD: usize = 20;
pub const BB_STD: f64 = 2.0;

/// Every indicator for every close, in input order.
pub fn compute(closes: &[f64]) -> Vec<IndicatorValues> {
    let rsi = rsi::calculate_rsi(closes, RSI_PERIOD);
    let ema_50 = ema::calculate_ema(closes, EMA_FAST);
    let ema_200 = ema::calculate_ema(closes, EMA_SLOW);
    let macd = macd::calculate_macd(closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL);
    let bands = bollinger::calculate_bollinger(closes, BB_PERIOD, BB_STD);

    (0..closes.len())
        .map(|i| IndicatorValues {
            rsi: rsi[i],
            ema_50: ema_50[i],
            ema_200: ema_200[i],
            macd: macd.line[i],
            macd_signal: macd.signal[i],
            macd_histogram: macd.histogram[i],
            bb_upper: bands[i].map(|b| b.upper),
            bb_middle: bands[i].map(|b| b.middle),
            bb_lower: bands[i].map(|b| b.lower),
        })
        .collect()
}
