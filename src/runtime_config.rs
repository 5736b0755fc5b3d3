// =============================================================================
// Runtime Configuration - service settings with atomic save
// =============================================================================
//
// Every tunable of the chartist service lives here: where the cache database
// sits, where the API listens, how the candle cache paginates and decides
// freshness, and how often reference market data is refreshed.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry a serde default so that adding new fields never
// breaks loading an older config file.
//
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::binance::client::{
    DEFAULT_BASE_URL as BINANCE_BASE_URL, DEFAULT_MIN_INTERVAL, MAX_KLINES_LIMIT,
};
use crate::coingecko::DEFAULT_BASE_URL as COINGECKO_BASE_URL;
use crate::market_data::CacheSettings;
use crate::types::Timeframe;

/// Default location of the config file, relative to the working directory.
pub const CONFIG_PATH: &str = "chartist_config.json";

pub const ENV_DB_PATH: &str = "CHARTIST_DB_PATH";
pub const ENV_BIND_ADDR: &str = "CHARTIST_BIND_ADDR";
pub const ENV_QUOTE_ASSET: &str = "CHARTIST_QUOTE_ASSET";

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_db_path() -> String {
    "data/chartist.db".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_page_limit() -> u32 {
    1000
}

fn default_freshness_ratio() -> f64 {
    0.95
}

fn default_stale_periods() -> i64 {
    2
}

fn default_exchange_base_url() -> String {
    BINANCE_BASE_URL.to_string()
}

fn default_min_request_interval_ms() -> u64 {
    DEFAULT_MIN_INTERVAL.as_millis() as u64
}

fn default_reference_refresh_secs() -> u64 {
    300
}

fn default_coingecko_base_url() -> String {
    COINGECKO_BASE_URL.to_string()
}

fn default_analysis_tail() -> usize {
    200
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the chartist service.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Storage & API -------------------------------------------------------

    /// SQLite database file backing the candle cache and reference data.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Address the HTTP API binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Timeframe used when a request does not name one.
    #[serde(default)]
    pub default_timeframe: Timeframe,

    /// Quote asset appended to bare tickers (`BTC` -> `BTC/USDT`).
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,

    /// Annotated candles returned per analysis response.
    #[serde(default = "default_analysis_tail")]
    pub analysis_tail: usize,

    // --- Candle cache --------------------------------------------------------

    /// Bars requested per remote page, at most the exchange's 1000.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    /// Fraction of the required history the cache must hold to skip a refetch.
    #[serde(default = "default_freshness_ratio")]
    pub freshness_ratio: f64,

    /// Newest cached bar must be younger than this many bar durations.
    #[serde(default = "default_stale_periods")]
    pub stale_periods: i64,

    // --- Remote sources -----------------------------------------------------

    /// Exchange REST endpoint for historical bars.
    #[serde(default = "default_exchange_base_url")]
    pub exchange_base_url: String,

    /// Minimum spacing between consecutive exchange requests.
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,

    /// Periodically refresh the reference market statistics.
    #[serde(default = "default_true")]
    pub reference_refresh_enabled: bool,

    #[serde(default = "default_reference_refresh_secs")]
    pub reference_refresh_secs: u64,

    #[serde(default = "default_coingecko_base_url")]
    pub coingecko_base_url: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind_addr: default_bind_addr(),
            default_timeframe: Timeframe::default(),
            quote_asset: default_quote_asset(),
            analysis_tail: default_analysis_tail(),
            page_limit: default_page_limit(),
            freshness_ratio: default_freshness_ratio(),
            stale_periods: default_stale_periods(),
            exchange_base_url: default_exchange_base_url(),
            min_request_interval_ms: default_min_request_interval_ms(),
            reference_refresh_enabled: true,
            reference_refresh_secs: default_reference_refresh_secs(),
            coingecko_base_url: default_coingecko_base_url(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            db_path = %config.db_path,
            default_timeframe = %config.default_timeframe,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply `CHARTIST_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| {
            let value = lookup(key)?;
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        };

        if let Some(path) = get(ENV_DB_PATH) {
            self.db_path = path;
        }
        if let Some(addr) = get(ENV_BIND_ADDR) {
            self.bind_addr = addr;
        }
        if let Some(quote) = get(ENV_QUOTE_ASSET) {
            self.quote_asset = quote.to_uppercase();
        }
    }

    /// Cache tunables, with out-of-range values replaced by their defaults.
    pub fn cache_settings(&self) -> CacheSettings {
        let defaults = CacheSettings::default();

        // A page longer than the exchange serves would read every full page
        // as the last one.
        let page_limit = if self.page_limit == 0 {
            warn!("page_limit must be positive, using default");
            defaults.page_limit
        } else if self.page_limit > MAX_KLINES_LIMIT {
            warn!(
                value = self.page_limit,
                max = MAX_KLINES_LIMIT,
                "page_limit above exchange maximum, clamping"
            );
            MAX_KLINES_LIMIT
        } else {
            self.page_limit
        };
        let freshness_ratio = if self.freshness_ratio.is_finite() && self.freshness_ratio > 0.0 {
            self.freshness_ratio
        } else {
            warn!(
                value = self.freshness_ratio,
                "invalid freshness_ratio, using default"
            );
            defaults.freshness_ratio
        };
        let stale_periods = if self.stale_periods > 0 {
            self.stale_periods
        } else {
            warn!(
                value = self.stale_periods,
                "invalid stale_periods, using default"
            );
            defaults.stale_periods
        };

        CacheSettings {
            page_limit,
            freshness_ratio,
            stale_periods,
        }
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn reference_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.reference_refresh_secs.max(1))
    }
}
