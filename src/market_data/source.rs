//! Remote OHLCV source abstraction.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::market_data::Candle;
use crate::types::Timeframe;

/// A paginated, rate-limited provider of historical bars.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Fetch up to `limit` bars for `(symbol, timeframe)` whose open time is
    /// at or after `start_ms`, oldest first.
    async fn fetch_page(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start_ms: i64,
        limit: u32,
    ) -> Result<Vec<Candle>>;

    /// Minimum pause the source requires between consecutive requests.
    fn rate_limit_interval(&self) -> Duration;
}
