// =============================================================================
// REST API Endpoints - Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/` and are public and read-only:
//
//   GET /api/v1/health               liveness + counters
//   GET /api/v1/analysis?symbol=..   full technical analysis for a pair
//   GET /api/v1/market/:coin_id      reference market statistics
//
// CORS is configured permissively.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::analysis;
use crate::app_state::{AppState, ErrorRecord};
use crate::market_data::ReferenceStore;
use crate::types::Timeframe;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/analysis", get(analysis_handler))
        .route("/api/v1/market/:coin_id", get(market))
        .layer(cors)
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, Json(body)).into_response()
}

/// Normalise a user-supplied symbol: a bare ticker gets the quote asset
/// appended (`btc` -> `BTC/USDT`), a full pair is only uppercased.
pub fn normalize_symbol(raw: &str, quote: &str) -> String {
    let symbol = raw.trim().to_uppercase();
    if symbol.contains('/') {
        symbol
    } else {
        format!("{symbol}/{}", quote.to_uppercase())
    }
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    analyses_served: u64,
    recent_errors: Vec<ErrorRecord>,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot();
    Json(HealthResponse {
        status: "ok",
        uptime_secs: snapshot.uptime_secs,
        analyses_served: snapshot.analyses_served,
        recent_errors: snapshot.recent_errors,
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Analysis
// =============================================================================

#[derive(Debug, Deserialize)]
struct AnalysisQuery {
    symbol: String,
    timeframe: Option<String>,
    tail: Option<usize>,
}

async fn analysis_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AnalysisQuery>,
) -> Response {
    let (quote, default_tf, default_tail) = {
        let cfg = state.runtime_config.read();
        (
            cfg.quote_asset.clone(),
            cfg.default_timeframe,
            cfg.analysis_tail,
        )
    };

    if q.symbol.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "symbol is required");
    }
    let symbol = normalize_symbol(&q.symbol, &quote);

    let timeframe = match q.timeframe.as_deref().map(str::parse::<Timeframe>) {
        None => default_tf,
        Some(Ok(tf)) => tf,
        Some(Err(e)) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let reference = state.reference.as_ref();
    match analysis::analyze(&state.cache, reference, &symbol, timeframe).await {
        Some(mut report) => {
            report.truncate_candles(q.tail.unwrap_or(default_tail));
            let served = state.record_analysis();
            info!(symbol = %symbol, %timeframe, served, "analysis served");
            Json(report).into_response()
        }
        None => {
            warn!(symbol = %symbol, %timeframe, "no data for analysis request");
            let message = format!("No data found for {symbol}");
            error_response(StatusCode::NOT_FOUND, message)
        }
    }
}

// =============================================================================
// Reference market statistics
// =============================================================================

async fn market(State(state): State<Arc<AppState>>, Path(coin_id): Path<String>) -> Response {
    match state.reference.market_stats(&coin_id).await {
        Ok(Some(stats)) => Json(stats).into_response(),
        Ok(None) => {
            let message = format!("No market data for {coin_id}");
            error_response(StatusCode::NOT_FOUND, message)
        }
        Err(e) => {
            warn!(coin_id = %coin_id, error = %e, "market stats lookup failed");
            state.push_error(format!("market stats lookup failed for {coin_id}: {e}"));
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::market_data::{
        CacheSettings, Candle, CandleCache, CandleSource, CandleStore, MarketStats, SqliteStore,
    };
    use crate::runtime_config::RuntimeConfig;

    /// Serves a rising series for `BTC/USDT` and nothing for anything else.
    struct BtcOnly;

    #[async_trait]
    impl CandleSource for BtcOnly {
        async fn fetch_page(
            &self,
            symbol: &str,
            timeframe: Timeframe,
            start_ms: i64,
            _limit: u32,
        ) -> Result<Vec<Candle>> {
            if symbol != "BTC/USDT" {
                return Ok(Vec::new());
            }
            let step = timeframe.duration_ms();
            Ok((0..120)
                .map(|i| {
                    let close = 100.0 + i as f64;
                    let ts = start_ms + i * step;
                    Candle::new(
                        symbol,
                        timeframe,
                        ts,
                        close,
                        close + 1.0,
                        close - 1.0,
                        close,
                        1.0,
                    )
                })
                .collect())
        }

        fn rate_limit_interval(&self) -> Duration {
            Duration::ZERO
        }
    }

    async fn app() -> Router {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        store.initialize().await.unwrap();
        let mut btc = MarketStats::new("bitcoin", "BTC", "Bitcoin");
        btc.market_cap_rank = Some(1);
        store.upsert_market_stats(&[btc]).await.unwrap();

        let cache = Arc::new(CandleCache::new(
            store.clone(),
            Arc::new(BtcOnly),
            CacheSettings::default(),
        ));
        let state = Arc::new(AppState::new(RuntimeConfig::default(), cache, store));
        router(state)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[test]
    fn bare_ticker_gets_quote() {
        assert_eq!(normalize_symbol("btc", "USDT"), "BTC/USDT");
        assert_eq!(normalize_symbol(" eth/btc ", "USDT"), "ETH/BTC");
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = get_json(app().await, "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["analyses_served"], 0);
    }

    #[tokio::test]
    async fn analysis_for_bare_ticker() {
        let uri = "/api/v1/analysis?symbol=btc&timeframe=1h&tail=10";
        let (status, body) = get_json(app().await, uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "BTC/USDT");
        assert_eq!(body["timeframe"], "1h");
        assert_eq!(body["candles"].as_array().unwrap().len(), 10);
        assert_eq!(body["price"], 219.0);
        assert_eq!(body["market"]["coin_id"], "bitcoin");
        let setup = body["setup_text"].as_str().unwrap();
        assert!(setup.contains("MACD Bullish Cross"));
    }

    #[tokio::test]
    async fn analysis_without_data_is_404() {
        let (status, body) = get_json(app().await, "/api/v1/analysis?symbol=NOPE").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No data found for NOPE/USDT");
    }

    #[tokio::test]
    async fn unknown_timeframe_is_400() {
        let uri = "/api/v1/analysis?symbol=BTC&timeframe=3h";
        let (status, body) = get_json(app().await, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("3h"));
    }

    #[tokio::test]
    async fn market_lookup() {
        let (status, body) = get_json(app().await, "/api/v1/market/bitcoin").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "BTC");

        let (status, _) = get_json(app().await, "/api/v1/market/dogecoin").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
