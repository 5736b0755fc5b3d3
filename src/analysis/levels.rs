// =============================================================================
// Support / resistance levels from local extrema
// =============================================================================
//
// A bar is a local maximum when its high is >= every high within `order` bars
// on either side, and a local minimum when its low is <= every low in that
// window. Windows are clipped at both ends of the series, so edge bars compare
// against the neighbours that exist.
//
// Resistances are maxima strictly above the last close, supports minima
// strictly below it. Each side keeps the three levels nearest the price,
// reported in ascending order.

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;

/// Half-width of the extrema window.
pub const EXTREMA_ORDER: usize = 20;
/// Levels kept per side.
pub const MAX_LEVELS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Levels {
    pub supports: Vec<f64>,
    pub resistances: Vec<f64>,
}

pub fn find_levels(candles: &[Candle]) -> Levels {
    let Some(last) = candles.last() else {
        return Levels::default();
    };
    let price = last.close;

    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();

    let mut resistances: Vec<f64> = local_extrema(&highs, EXTREMA_ORDER, |x, y| x >= y)
        .into_iter()
        .map(|i| highs[i])
        .filter(|&h| h > price)
        .collect();
    let mut supports: Vec<f64> = local_extrema(&lows, EXTREMA_ORDER, |x, y| x <= y)
        .into_iter()
        .map(|i| lows[i])
        .filter(|&l| l < price)
        .collect();

    resistances.sort_by(f64::total_cmp);
    resistances.dedup();
    resistances.truncate(MAX_LEVELS);

    supports.sort_by(f64::total_cmp);
    supports.dedup();
    let skip = supports.len().saturating_sub(MAX_LEVELS);
    supports.drain(..skip);

    Levels {
        supports,
        resistances,
    }
}

/// Indices `i` where `cmp(values[i], values[j])` holds for every `j` within
/// `order` positions of `i`.
fn local_extrema(values: &[f64], order: usize, cmp: impl Fn(f64, f64) -> bool) -> Vec<usize> {
    let n = values.len();
    (0..n)
        .filter(|&i| {
            let lo = i.saturating_sub(order);
            let hi = (i + order).min(n.saturating_sub(1));
            (lo..=hi).all(|j| j == i || cmp(values[i], values[j]))
        })
        .collect()
}
