// =============================================================================
// Binance REST API Client - public market data
// =============================================================================
//
// Only unsigned endpoints are used: historical bars come from
// `GET /api/v3/klines`. Every response feeds the rate-limit tracker so the
// cache's pagination loop can pace itself.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::binance::RateLimitTracker;
use crate::market_data::{Candle, CandleSource};
use crate::types::Timeframe;

/// Production spot REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";
/// Spacing between consecutive public requests.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(50);
/// Largest page `GET /api/v3/klines` will return.
pub const MAX_KLINES_LIMIT: u32 = 1000;

/// Binance REST API client for public market data.
#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    client: reqwest::Client,
    rate_limit: Arc<RateLimitTracker>,
}

impl BinanceClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create a new `BinanceClient` against `base_url`, spacing requests at
    /// least `min_interval` apart.
    pub fn new(base_url: impl Into<String>, min_interval: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;

        debug!(base_url = %base_url, "BinanceClient initialised");

        Ok(Self {
            base_url,
            client,
            rate_limit: Arc::new(RateLimitTracker::new(min_interval)),
        })
    }

    /// Exchange symbol for a pair: `"BTC/USDT"` becomes `"BTCUSDT"`.
    pub fn exchange_symbol(symbol: &str) -> String {
        symbol.replace('/', "").to_uppercase()
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// GET /api/v3/klines (public - no signature required).
    ///
    /// Array indices of each returned row:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
    ///   [6] closeTime, ... (the rest is ignored)
    #[instrument(skip(self), name = "binance::get_klines")]
    pub async fn get_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start_time: i64,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let exchange_symbol = Self::exchange_symbol(symbol);
        let limit = limit.clamp(1, MAX_KLINES_LIMIT);

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("symbol", exchange_symbol.as_str()),
                ("interval", timeframe.as_str()),
                ("startTime", &start_time.to_string()),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await
            .context("GET /api/v3/klines request failed")?;

        self.rate_limit.update_from_headers(resp.headers());

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse klines response")?;

        if !status.is_success() {
            anyhow::bail!("Binance GET /api/v3/klines returned {}: {}", status, body);
        }

        let candles = parse_klines(symbol, timeframe, &body)?;
        debug!(symbol, %timeframe, start_time, count = candles.len(), "klines fetched");
        Ok(candles)
    }
}

#[async_trait]
impl CandleSource for BinanceClient {
    async fn fetch_page(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start_ms: i64,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        self.get_klines(symbol, timeframe, start_ms, limit).await
    }

    fn rate_limit_interval(&self) -> Duration {
        self.rate_limit
            .next_pause(chrono::Utc::now().timestamp_millis())
    }
}

// -----------------------------------------------------------------------------
// Response parsing
// -----------------------------------------------------------------------------

/// Parse Binance's array-of-arrays kline payload into candles tagged with the
/// caller's `symbol` (not the exchange spelling).
fn parse_klines(
    symbol: &str,
    timeframe: Timeframe,
    body: &serde_json::Value,
) -> Result<Vec<Candle>> {
    let raw = body.as_array().context("klines response is not an array")?;

    let mut candles = Vec::with_capacity(raw.len());
    for entry in raw {
        let arr = entry.as_array().context("kline entry is not an array")?;

        if arr.len() < 6 {
            warn!("skipping malformed kline entry with {} elements", arr.len());
            continue;
        }

        let timestamp = arr[0]
            .as_i64()
            .context("kline open time is not an integer")?;
        candles.push(Candle::new(
            symbol,
            timeframe,
            timestamp,
            parse_str_f64(&arr[1])?,
            parse_str_f64(&arr[2])?,
            parse_str_f64(&arr[3])?,
            parse_str_f64(&arr[4])?,
            parse_str_f64(&arr[5])?,
        ));
    }
    Ok(candles)
}

/// Parse a JSON value that may be either a string or a number into `f64`.
fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .with_context(|| format!("failed to parse '{s}' as f64"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        anyhow::bail!("expected string or number, got: {val}")
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}
