// =============================================================================
// Analysis pipeline
// =============================================================================
//
// cache -> indicators -> patterns -> levels -> setup text -> report
//
// Everything after the cache read is synchronous and recomputed per request;
// nothing derived here is persisted.

pub mod levels;
pub mod patterns;
pub mod setup;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::indicators;
use crate::market_data::{AnnotatedCandle, Candle, CandleCache, MarketStats, ReferenceStore};
use crate::types::Timeframe;

use levels::find_levels;
use setup::generate_setup;

/// Indicators and patterns are only computed from this many candles up.
pub const MIN_CANDLES: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candles: Vec<AnnotatedCandle>,
    pub price: f64,
    pub change_24h_pct: f64,
    pub supports: Vec<f64>,
    pub resistances: Vec<f64>,
    pub setup_text: String,
    pub market: Option<MarketStats>,
}

impl AnalysisReport {
    /// Keep only the newest `n` annotated candles.
    pub fn truncate_candles(&mut self, n: usize) {
        let skip = self.candles.len().saturating_sub(n);
        self.candles.drain(..skip);
    }
}

/// Annotate a candle sequence with indicators and pattern flags.
///
/// Shorter sequences than [`MIN_CANDLES`] come back unannotated.
pub fn annotate(candles: &[Candle]) -> Vec<AnnotatedCandle> {
    if candles.len() < MIN_CANDLES {
        return candles.iter().cloned().map(AnnotatedCandle::bare).collect();
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let values = indicators::compute(&closes);
    let flags = patterns::detect(candles);

    candles
        .iter()
        .cloned()
        .zip(values)
        .zip(flags)
        .map(|((candle, indicators), patterns)| AnnotatedCandle {
            candle,
            indicators,
            patterns,
        })
        .collect()
}

/// Percent change of the last close against the close `lookback` bars
/// earlier. Zero when the sequence is too short or the reference is zero.
pub fn change_pct(candles: &[Candle], lookback: usize) -> f64 {
    let n = candles.len();
    if n <= lookback {
        return 0.0;
    }
    let price = candles[n - 1].close;
    let prev = candles[n - 1 - lookback].close;
    if prev == 0.0 {
        return 0.0;
    }
    (price - prev) / prev * 100.0
}

/// Base ticker of a pair: `"BTC/USDT"` becomes `"BTC"`.
pub fn base_asset(symbol: &str) -> &str {
    symbol.split('/').next().unwrap_or(symbol)
}

/// Full analysis for `(symbol, timeframe)`. `None` when no bars exist.
pub async fn analyze(
    cache: &CandleCache,
    reference: &dyn ReferenceStore,
    symbol: &str,
    timeframe: Timeframe,
) -> Option<AnalysisReport> {
    let candles = cache.get(symbol, timeframe).await;
    let last = candles.last()?;
    let price = last.close;

    let annotated = annotate(&candles);
    let setup_text = generate_setup(&annotated);
    let levels = find_levels(&candles);
    let change_24h_pct = change_pct(&candles, timeframe.day_lookback());

    let market = match reference.market_stats_by_symbol(base_asset(symbol)).await {
        Ok(row) => row,
        Err(e) => {
            warn!(symbol, error = %e, "reference lookup failed");
            None
        }
    };

    debug!(
        symbol,
        %timeframe,
        bars = candles.len(),
        supports = levels.supports.len(),
        resistances = levels.resistances.len(),
        "analysis complete"
    );

    Some(AnalysisReport {
        symbol: symbol.to_string(),
        timeframe,
        candles: annotated,
        price,
        change_24h_pct,
        supports: levels.supports,
        resistances: levels.resistances,
        setup_text,
        market,
    })
}
