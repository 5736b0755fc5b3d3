// =============================================================================
// Candle patterns - doji and two-bar engulfing
// =============================================================================

use crate::market_data::{Candle, PatternFlags};

/// Body-to-range ratio below which a candle counts as a doji.
pub const DOJI_THRESHOLD: f64 = 0.1;

/// 1 when the candle's body is under 10% of its range, else 0. A candle with
/// no range (`high == low`) is never a doji.
pub fn doji(candle: &Candle) -> i8 {
    let range = candle.range();
    if range == 0.0 {
        return 0;
    }
    i8::from(candle.body().abs() / range < DOJI_THRESHOLD)
}

/// +1 for a bullish engulfing of `prev` by `cur`, -1 for bearish, else 0.
pub fn engulfing(prev: &Candle, cur: &Candle) -> i8 {
    let prev_body = prev.body();
    let cur_body = cur.body();

    if prev_body < 0.0 && cur_body > 0.0 && cur.open <= prev.close && cur.close >= prev.open {
        return 1;
    }
    if prev_body > 0.0 && cur_body < 0.0 && cur.open >= prev.close && cur.close <= prev.open {
        return -1;
    }
    0
}

/// Flags for every candle, each computed from that candle and its predecessor
/// only. The first candle has no predecessor and carries no flags.
pub fn detect(candles: &[Candle]) -> Vec<PatternFlags> {
    let mut flags = vec![PatternFlags::default(); candles.len()];
    for (i, pair) in candles.windows(2).enumerate() {
        flags[i + 1] = PatternFlags {
            doji: doji(&pair[1]),
            engulfing: engulfing(&pair[0], &pair[1]),
        };
    }
    flags
}
