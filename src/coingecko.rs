// =============================================================================
// CoinGecko client - reference market statistics
// =============================================================================
//
// Pulls the ranked `/coins/markets` snapshot (at most 100 coins per call) and
// upserts it into the reference table. Runs on its own schedule; the candle
// cache never touches this data and the analysis pipeline only reads it.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info, instrument, warn};

use crate::market_data::{MarketStats, ReferenceStore};

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";
/// Largest page the markets endpoint serves.
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    base_url: String,
    client: reqwest::Client,
}

impl CoinGeckoClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// GET /coins/markets - one page of coins ordered by market cap.
    #[instrument(skip(self), name = "coingecko::fetch_markets")]
    pub async fn fetch_markets(&self, page: u32, per_page: u32) -> Result<Vec<MarketStats>> {
        let url = format!("{}/coins/markets", self.base_url);
        let per_page = per_page.clamp(1, MAX_PER_PAGE);

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("vs_currency", "usd"),
                ("order", "market_cap_desc"),
                ("per_page", &per_page.to_string()),
                ("page", &page.to_string()),
                ("sparkline", "false"),
                ("price_change_percentage", "24h,7d,30d"),
            ])
            .send()
            .await
            .context("GET /coins/markets request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse markets response")?;

        if !status.is_success() {
            anyhow::bail!("CoinGecko GET /coins/markets returned {}: {}", status, body);
        }

        let stats = parse_markets(&body, chrono::Utc::now().timestamp_millis())?;
        debug!(count = stats.len(), "market snapshot fetched");
        Ok(stats)
    }
}

/// Parse a markets snapshot, stamping every row with `now_ms`. Entries that do
/// not deserialise are skipped with a warning.
fn parse_markets(body: &serde_json::Value, now_ms: i64) -> Result<Vec<MarketStats>> {
    let raw = body
        .as_array()
        .context("markets response is not a JSON array")?;

    let mut out = Vec::with_capacity(raw.len());
    for entry in raw {
        match serde_json::from_value::<MarketStats>(entry.clone()) {
            Ok(mut stats) => {
                stats.symbol = stats.symbol.to_uppercase();
                stats.timestamp = now_ms;
                out.push(stats);
            }
            Err(e) => {
                let id = entry
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                warn!(coin_id = id, error = %e, "skipping malformed market entry");
            }
        }
    }
    Ok(out)
}

/// Fetch the top-100 snapshot once and upsert it. Returns rows written.
pub async fn refresh_market_stats(
    client: &CoinGeckoClient,
    store: &dyn ReferenceStore,
) -> Result<u64> {
    let stats = client.fetch_markets(1, MAX_PER_PAGE).await?;
    if stats.is_empty() {
        warn!("market snapshot was empty, nothing stored");
        return Ok(0);
    }
    let written = store
        .upsert_market_stats(&stats)
        .await
        .context("failed to store market snapshot")?;
    info!(coins = stats.len(), "reference market data refreshed");
    Ok(written)
}

/// Refresh the reference table every `every`, forever. Failures are logged and
/// retried on the next tick.
pub async fn run_refresh_loop(
    client: CoinGeckoClient,
    store: Arc<dyn ReferenceStore>,
    every: Duration,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(e) = refresh_market_stats(&client, store.as_ref()).await {
            error!(error = %e, "reference refresh failed");
        }
    }
}
