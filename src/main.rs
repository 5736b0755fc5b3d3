// =============================================================================
// Chartist - Main Entry Point
// =============================================================================
//
// Opens the candle cache database, wires the exchange client into the cache,
// starts the reference-data refresh job and serves the analysis API until
// Ctrl+C.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod analysis;
mod api;
mod app_state;
mod binance;
mod coingecko;
mod indicators;
mod market_data;
mod runtime_config;
mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::binance::BinanceClient;
use crate::coingecko::CoinGeckoClient;
use crate::market_data::{CandleCache, CandleStore, SqliteStore};
use crate::runtime_config::{RuntimeConfig, CONFIG_PATH};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Chartist starting up");

    let mut config = if Path::new(CONFIG_PATH).exists() {
        RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            RuntimeConfig::default()
        })
    } else {
        let config = RuntimeConfig::default();
        if let Err(e) = config.save(CONFIG_PATH) {
            warn!(error = %e, "Failed to write default config");
        }
        config
    };
    config.apply_env_overrides();

    info!(
        db_path = %config.db_path,
        bind_addr = %config.bind_addr,
        default_timeframe = %config.default_timeframe,
        quote_asset = %config.quote_asset,
        "Configuration ready"
    );

    // ── 2. Storage ───────────────────────────────────────────────────────
    let store = Arc::new(SqliteStore::new(&config.db_path).await?);
    store
        .initialize()
        .await
        .context("failed to initialise store schema")?;

    // ── 3. Exchange client & candle cache ────────────────────────────────
    let binance_client = BinanceClient::new(
        config.exchange_base_url.clone(),
        config.min_request_interval(),
    )?;
    let cache = Arc::new(CandleCache::new(
        store.clone(),
        Arc::new(binance_client),
        config.cache_settings(),
    ));

    // ── 4. Shared state ──────────────────────────────────────────────────
    let state = Arc::new(AppState::new(config.clone(), cache, store.clone()));

    // ── 5. Reference market data refresh ─────────────────────────────────
    if config.reference_refresh_enabled {
        let client = CoinGeckoClient::new(config.coingecko_base_url.clone())?;
        let every = config.reference_refresh_interval();
        info!(
            every_secs = every.as_secs(),
            "Reference refresh loop starting"
        );
        tokio::spawn(coingecko::run_refresh_loop(client, store.clone(), every));
    } else {
        info!("Reference refresh disabled");
    }

    // ── 6. API server ────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind API server to {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "API server listening");

    let app = api::rest::router(state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 7. Shutdown ──────────────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received - stopping");

    info!("Chartist shut down complete.");
    Ok(())
}
