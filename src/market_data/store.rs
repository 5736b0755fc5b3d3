// =============================================================================
// Persistent store - SQLite via sqlx
// =============================================================================
//
// Two logical tables:
//   ohlcv         - bars keyed by (symbol, timeframe, timestamp)
//   market_stats  - reference statistics keyed by coin_id
//
// Every batch write runs inside a single transaction so a concurrent reader
// sees either none or all of it. Upserts overwrite payload columns only.
// =============================================================================

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    sqlite::{
        SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
    },
    Pool, QueryBuilder, Row, Sqlite,
};
use tracing::{debug, info};

use crate::market_data::{Candle, MarketStats};
use crate::types::Timeframe;

/// 8 bound columns per bar; 3000 rows keeps us well under SQLite's 32k
/// parameter limit.
const CANDLE_CHUNK: usize = 3000;
/// 25 bound columns per row.
const STATS_CHUNK: usize = 1000;

#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Create tables if they do not exist. Safe to call repeatedly.
    async fn initialize(&self) -> Result<()>;

    /// Merge-upsert a batch of bars. Returns the number of rows written.
    async fn write(&self, candles: &[Candle]) -> Result<u64>;

    /// Bars for `(symbol, timeframe)` with `timestamp >= since`, ascending.
    async fn query(&self, symbol: &str, timeframe: Timeframe, since: i64) -> Result<Vec<Candle>>;
}

#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn upsert_market_stats(&self, rows: &[MarketStats]) -> Result<u64>;

    async fn market_stats(&self, coin_id: &str) -> Result<Option<MarketStats>>;

    /// Best-ranked row whose ticker matches `symbol` (case-insensitive).
    async fn market_stats_by_symbol(&self, symbol: &str) -> Result<Option<MarketStats>>;
}

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }

        let connection_options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connection_options)
            .await
            .with_context(|| format!("failed to open sqlite database at {db_path}"))?;

        info!(path = db_path, "sqlite store opened");
        Ok(Self { pool })
    }

    /// Private in-memory database. A single long-lived connection, since every
    /// new in-memory connection would see an empty database.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let connection_options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connection_options)
            .await
            .context("failed to open in-memory sqlite database")?;
        Ok(Self { pool })
    }
}

fn candle_from_row(row: &SqliteRow, symbol: &str, timeframe: Timeframe) -> Result<Candle> {
    Ok(Candle {
        symbol: symbol.to_string(),
        timeframe,
        timestamp: row.try_get("timestamp")?,
        open: row.try_get("open")?,
        high: row.try_get("high")?,
        low: row.try_get("low")?,
        close: row.try_get("close")?,
        volume: row.try_get("volume")?,
    })
}

fn stats_from_row(row: &SqliteRow) -> Result<MarketStats> {
    Ok(MarketStats {
        coin_id: row.try_get("coin_id")?,
        symbol: row.try_get("symbol")?,
        name: row.try_get("name")?,
        current_price: row.try_get("current_price")?,
        market_cap: row.try_get("market_cap")?,
        market_cap_rank: row.try_get("market_cap_rank")?,
        fully_diluted_valuation: row.try_get("fully_diluted_valuation")?,
        total_volume: row.try_get("total_volume")?,
        high_24h: row.try_get("high_24h")?,
        low_24h: row.try_get("low_24h")?,
        price_change_24h: row.try_get("price_change_24h")?,
        price_change_percentage_24h: row.try_get("price_change_percentage_24h")?,
        price_change_percentage_7d: row.try_get("price_change_percentage_7d")?,
        price_change_percentage_30d: row.try_get("price_change_percentage_30d")?,
        circulating_supply: row.try_get("circulating_supply")?,
        total_supply: row.try_get("total_supply")?,
        max_supply: row.try_get("max_supply")?,
        ath: row.try_get("ath")?,
        ath_change_percentage: row.try_get("ath_change_percentage")?,
        ath_date: row.try_get("ath_date")?,
        atl: row.try_get("atl")?,
        atl_change_percentage: row.try_get("atl_change_percentage")?,
        atl_date: row.try_get("atl_date")?,
        last_updated: row.try_get("last_updated")?,
        timestamp: row.try_get("timestamp")?,
    })
}

#[async_trait]
impl CandleStore for SqliteStore {
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ohlcv (
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (symbol, timeframe, timestamp)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create ohlcv table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS market_stats (
                coin_id TEXT PRIMARY KEY NOT NULL,
                symbol TEXT NOT NULL,
                name TEXT NOT NULL,
                current_price REAL,
                market_cap REAL,
                market_cap_rank INTEGER,
                fully_diluted_valuation REAL,
                total_volume REAL,
                high_24h REAL,
                low_24h REAL,
                price_change_24h REAL,
                price_change_percentage_24h REAL,
                price_change_percentage_7d REAL,
                price_change_percentage_30d REAL,
                circulating_supply REAL,
                total_supply REAL,
                max_supply REAL,
                ath REAL,
                ath_change_percentage REAL,
                ath_date TEXT,
                atl REAL,
                atl_change_percentage REAL,
                atl_date TEXT,
                last_updated TEXT,
                timestamp INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create market_stats table")?;

        debug!("store schema ready");
        Ok(())
    }

    async fn write(&self, candles: &[Candle]) -> Result<u64> {
        if candles.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin ohlcv write")?;
        let mut written = 0u64;

        for chunk in candles.chunks(CANDLE_CHUNK) {
            let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO ohlcv (symbol, timeframe, timestamp, open, high, low, close, volume) ",
            );

            query_builder.push_values(chunk, |mut b, c| {
                b.push_bind(c.symbol.as_str())
                    .push_bind(c.timeframe.as_str())
                    .push_bind(c.timestamp)
                    .push_bind(c.open)
                    .push_bind(c.high)
                    .push_bind(c.low)
                    .push_bind(c.close)
                    .push_bind(c.volume);
            });

            query_builder.push(
                " ON CONFLICT(symbol, timeframe, timestamp) DO UPDATE SET \
                 open = excluded.open, \
                 high = excluded.high, \
                 low = excluded.low, \
                 close = excluded.close, \
                 volume = excluded.volume",
            );

            let result = query_builder
                .build()
                .execute(&mut *tx)
                .await
                .context("ohlcv upsert failed")?;
            written += result.rows_affected();
        }

        tx.commit().await.context("failed to commit ohlcv write")?;
        debug!(rows = written, "ohlcv batch committed");
        Ok(written)
    }

    async fn query(&self, symbol: &str, timeframe: Timeframe, since: i64) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, open, high, low, close, volume
            FROM ohlcv
            WHERE symbol = ? AND timeframe = ? AND timestamp >= ?
            ORDER BY timestamp ASC
            "#,
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("ohlcv query failed for {symbol}@{timeframe}"))?;

        rows.iter()
            .map(|row| candle_from_row(row, symbol, timeframe))
            .collect()
    }
}

#[async_trait]
impl ReferenceStore for SqliteStore {
    async fn upsert_market_stats(&self, rows: &[MarketStats]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin market_stats write")?;
        let mut written = 0u64;

        for chunk in rows.chunks(STATS_CHUNK) {
            let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO market_stats (coin_id, symbol, name, current_price, market_cap, \
                 market_cap_rank, fully_diluted_valuation, total_volume, high_24h, low_24h, \
                 price_change_24h, price_change_percentage_24h, price_change_percentage_7d, \
                 price_change_percentage_30d, circulating_supply, total_supply, max_supply, \
                 ath, ath_change_percentage, ath_date, atl, atl_change_percentage, atl_date, \
                 last_updated, timestamp) ",
            );

            query_builder.push_values(chunk, |mut b, s| {
                b.push_bind(s.coin_id.as_str())
                    .push_bind(s.symbol.as_str())
                    .push_bind(s.name.as_str())
                    .push_bind(s.current_price)
                    .push_bind(s.market_cap)
                    .push_bind(s.market_cap_rank)
                    .push_bind(s.fully_diluted_valuation)
                    .push_bind(s.total_volume)
                    .push_bind(s.high_24h)
                    .push_bind(s.low_24h)
                    .push_bind(s.price_change_24h)
                    .push_bind(s.price_change_percentage_24h)
                    .push_bind(s.price_change_percentage_7d)
                    .push_bind(s.price_change_percentage_30d)
                    .push_bind(s.circulating_supply)
                    .push_bind(s.total_supply)
                    .push_bind(s.max_supply)
                    .push_bind(s.ath)
                    .push_bind(s.ath_change_percentage)
                    .push_bind(s.ath_date.as_deref())
                    .push_bind(s.atl)
                    .push_bind(s.atl_change_percentage)
                    .push_bind(s.atl_date.as_deref())
                    .push_bind(s.last_updated.as_deref())
                    .push_bind(s.timestamp);
            });

            query_builder.push(
                " ON CONFLICT(coin_id) DO UPDATE SET \
                 symbol = excluded.symbol, \
                 name = excluded.name, \
                 current_price = excluded.current_price, \
                 market_cap = excluded.market_cap, \
                 market_cap_rank = excluded.market_cap_rank, \
                 fully_diluted_valuation = excluded.fully_diluted_valuation, \
                 total_volume = excluded.total_volume, \
                 high_24h = excluded.high_24h, \
                 low_24h = excluded.low_24h, \
                 price_change_24h = excluded.price_change_24h, \
                 price_change_percentage_24h = excluded.price_change_percentage_24h, \
                 price_change_percentage_7d = excluded.price_change_percentage_7d, \
                 price_change_percentage_30d = excluded.price_change_percentage_30d, \
                 circulating_supply = excluded.circulating_supply, \
                 total_supply = excluded.total_supply, \
                 max_supply = excluded.max_supply, \
                 ath = excluded.ath, \
                 ath_change_percentage = excluded.ath_change_percentage, \
                 ath_date = excluded.ath_date, \
                 atl = excluded.atl, \
                 atl_change_percentage = excluded.atl_change_percentage, \
                 atl_date = excluded.atl_date, \
                 last_updated = excluded.last_updated, \
                 timestamp = excluded.timestamp",
            );

            let result = query_builder
                .build()
                .execute(&mut *tx)
                .await
                .context("market_stats upsert failed")?;
            written += result.rows_affected();
        }

        tx.commit()
            .await
            .context("failed to commit market_stats write")?;
        Ok(written)
    }

    async fn market_stats(&self, coin_id: &str) -> Result<Option<MarketStats>> {
        let row = sqlx::query("SELECT * FROM market_stats WHERE coin_id = ?")
            .bind(coin_id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("market_stats lookup failed for {coin_id}"))?;

        row.as_ref().map(stats_from_row).transpose()
    }

    async fn market_stats_by_symbol(&self, symbol: &str) -> Result<Option<MarketStats>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM market_stats
            WHERE UPPER(symbol) = UPPER(?)
            ORDER BY market_cap_rank IS NULL, market_cap_rank ASC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("market_stats lookup failed for symbol {symbol}"))?;

        row.as_ref().map(stats_from_row).transpose()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
