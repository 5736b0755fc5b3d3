// =============================================================================
// Candle Cache - freshness check, paginated refetch, merge-write
// =============================================================================
//
// A request for (symbol, timeframe) first reads the store over the window the
// timeframe needs. When that slice is both long enough and recent enough it is
// returned as-is. Otherwise the whole window is refetched from the remote
// source page by page, merged into the store, and the fetched bars are
// returned.
//
// Storage faults never fail a request: a failed read counts as an empty cache,
// a failed write still returns what was fetched. A source error ends
// pagination early and keeps the pages gathered so far.
// =============================================================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::market_data::{Candle, CandleKey, CandleSource, CandleStore};
use crate::types::Timeframe;

/// Tunables for the freshness decision and pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Bars requested per remote page.
    pub page_limit: u32,
    /// Fraction of `required_count` the cached slice must reach.
    pub freshness_ratio: f64,
    /// The newest cached bar must be younger than this many bar durations.
    pub stale_periods: i64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            page_limit: 1000,
            freshness_ratio: 0.95,
            stale_periods: 2,
        }
    }
}

/// Why a refetch stopped paginating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchStop {
    /// The source returned no bars.
    EmptyPage,
    /// The source returned fewer bars than requested.
    ShortPage,
    /// The next page would start at or after `now`.
    ReachedNow,
    /// The source failed; earlier pages were kept.
    Failed(String),
}

/// Outcome of one refetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchSummary {
    pub pages: usize,
    pub bars: usize,
    pub stop: FetchStop,
}

pub struct CandleCache {
    store: Arc<dyn CandleStore>,
    source: Arc<dyn CandleSource>,
    settings: CacheSettings,
}

impl CandleCache {
    pub fn new(
        store: Arc<dyn CandleStore>,
        source: Arc<dyn CandleSource>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            store,
            source,
            settings,
        }
    }

    /// Bars for `(symbol, timeframe)` covering the timeframe's required
    /// window, ascending by timestamp. Empty when nothing is available.
    pub async fn get(&self, symbol: &str, timeframe: Timeframe) -> Vec<Candle> {
        self.get_at(symbol, timeframe, chrono::Utc::now().timestamp_millis())
            .await
    }

    /// Same as [`get`](Self::get) with an explicit clock.
    pub async fn get_at(&self, symbol: &str, timeframe: Timeframe, now_ms: i64) -> Vec<Candle> {
        let required = timeframe.required_count();
        let since = now_ms - required as i64 * timeframe.duration_ms();
        let key = CandleKey::new(symbol, timeframe);

        let cached = match self.store.query(symbol, timeframe, since).await {
            Ok(bars) => bars,
            Err(e) => {
                warn!(series = %key, error = %e, "cache read failed, treating as empty");
                Vec::new()
            }
        };

        if self.is_fresh(&cached, timeframe, now_ms) {
            debug!(series = %key, bars = cached.len(), "cache hit");
            return cached;
        }

        debug!(
            series = %key,
            cached = cached.len(),
            required,
            "cache stale or short, refetching"
        );
        let (fetched, _summary) = self.refresh(symbol, timeframe, since, now_ms).await;
        fetched
    }

    /// Whether a cached slice can be served without a remote call.
    pub fn is_fresh(&self, cached: &[Candle], timeframe: Timeframe, now_ms: i64) -> bool {
        let Some(last) = cached.last() else {
            return false;
        };
        let required = timeframe.required_count() as f64;
        let enough = cached.len() as f64 >= self.settings.freshness_ratio * required;
        let max_age = self.settings.stale_periods * timeframe.duration_ms();
        let recent = now_ms - last.timestamp < max_age;
        enough && recent
    }

    /// Refetch `[since, now)` from the source, merge the result into the store
    /// and return the fetched bars together with how pagination ended.
    pub async fn refresh(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: i64,
        now_ms: i64,
    ) -> (Vec<Candle>, FetchSummary) {
        let key = CandleKey::new(symbol, timeframe);
        let (fetched, summary) = self.paginate(symbol, timeframe, since, now_ms).await;

        match &summary.stop {
            FetchStop::Failed(reason) => warn!(
                series = %key,
                pages = summary.pages,
                bars = summary.bars,
                reason = %reason,
                "refetch truncated by source error"
            ),
            stop => info!(
                series = %key,
                pages = summary.pages,
                bars = summary.bars,
                stop = ?stop,
                "refetch complete"
            ),
        }

        if !fetched.is_empty() {
            if let Err(e) = self.store.write(&fetched).await {
                warn!(series = %key, error = %e, "cache write failed, serving fetched bars anyway");
            }
        }

        (fetched, summary)
    }

    async fn paginate(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: i64,
        now_ms: i64,
    ) -> (Vec<Candle>, FetchSummary) {
        let limit = self.settings.page_limit;
        let mut all: Vec<Candle> = Vec::new();
        let mut pages = 0usize;
        let mut cursor = since;

        let stop = loop {
            if cursor >= now_ms {
                break FetchStop::ReachedNow;
            }

            let page = match self.source.fetch_page(symbol, timeframe, cursor, limit).await {
                Ok(page) => page,
                Err(e) => break FetchStop::Failed(format!("{e:#}")),
            };

            let Some(last) = page.last() else {
                break FetchStop::EmptyPage;
            };

            pages += 1;
            cursor = last.timestamp + 1;
            let short = page.len() < limit as usize;
            all.extend(page);

            tokio::time::sleep(self.source.rate_limit_interval()).await;

            if short {
                break FetchStop::ShortPage;
            }
        };

        let summary = FetchSummary {
            pages,
            bars: all.len(),
            stop,
        };
        (all, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::market_data::SqliteStore;

    const NOW: i64 = 1_700_000_000_000;

    /// Source that replays a fixed script of pages and records each request's
    /// start time.
    struct ScriptedSource {
        pages: Mutex<VecDeque<Result<Vec<Candle>>>>,
        starts: Mutex<Vec<i64>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Result<Vec<Candle>>>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages.into()),
                starts: Mutex::new(Vec::new()),
            })
        }

        fn starts(&self) -> Vec<i64> {
            self.starts.lock().clone()
        }
    }

    #[async_trait]
    impl CandleSource for ScriptedSource {
        async fn fetch_page(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
            start_ms: i64,
            _limit: u32,
        ) -> Result<Vec<Candle>> {
            self.starts.lock().push(start_ms);
            let next = self.pages.lock().pop_front();
            next.unwrap_or_else(|| Ok(Vec::new()))
        }

        fn rate_limit_interval(&self) -> Duration {
            Duration::ZERO
        }
    }

    /// `n` consecutive bars starting at `start`.
    fn run(tf: Timeframe, start: i64, n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let ts = start + i as i64 * tf.duration_ms();
                Candle::new("BTC/USDT", tf, ts, 100.0, 101.0, 99.0, 100.5, 1.0)
            })
            .collect()
    }

    async fn store() -> Arc<SqliteStore> {
        let store = SqliteStore::in_memory().await.unwrap();
        store.initialize().await.unwrap();
        Arc::new(store)
    }

    fn small_pages() -> CacheSettings {
        CacheSettings {
            page_limit: 10,
            ..CacheSettings::default()
        }
    }

    #[tokio::test]
    async fn full_recent_cache_skips_remote() {
        let tf = Timeframe::Month1;
        let store = store().await;
        // Exactly required_count bars, the newest at now - 1.
        let n = tf.required_count();
        let first = NOW - 1 - (n as i64 - 1) * tf.duration_ms();
        store.write(&run(tf, first, n)).await.unwrap();

        let source = ScriptedSource::new(vec![]);
        let cache = CandleCache::new(store, source.clone(), small_pages());

        let got = cache.get_at("BTC/USDT", tf, NOW).await;
        assert_eq!(got.len(), n);
        assert!(source.starts().is_empty());
    }

    #[tokio::test]
    async fn stale_cache_refetches_from_window_start() {
        let tf = Timeframe::Month1;
        let store = store().await;
        let n = tf.required_count();
        let last = NOW - 3 * tf.duration_ms();
        let first = last - (n as i64 - 1) * tf.duration_ms();
        store.write(&run(tf, first, n)).await.unwrap();

        let source = ScriptedSource::new(vec![Ok(Vec::new())]);
        let cache = CandleCache::new(store, source.clone(), small_pages());

        let got = cache.get_at("BTC/USDT", tf, NOW).await;
        let since = NOW - n as i64 * tf.duration_ms();
        assert_eq!(source.starts(), vec![since]);
        // The fetched sequence is returned, not the stale cache.
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn short_history_refetches_even_when_recent() {
        let tf = Timeframe::H1;
        let store = store().await;
        let recent = run(tf, NOW - tf.duration_ms(), 1);
        store.write(&recent).await.unwrap();

        let source = ScriptedSource::new(vec![Ok(Vec::new())]);
        let cache = CandleCache::new(store, source.clone(), small_pages());
        cache.get_at("BTC/USDT", tf, NOW).await;
        assert_eq!(source.starts().len(), 1);
    }

    #[tokio::test]
    async fn pages_continue_after_last_timestamp() {
        let tf = Timeframe::H4;
        let store = store().await;
        let since = NOW - tf.required_count() as i64 * tf.duration_ms();
        let page1 = run(tf, since, 10);
        let page2_start = page1[9].timestamp + tf.duration_ms();
        let page2 = run(tf, page2_start, 4);

        let source = ScriptedSource::new(vec![Ok(page1.clone()), Ok(page2)]);
        let cache = CandleCache::new(store.clone(), source.clone(), small_pages());

        let (got, summary) = cache.refresh("BTC/USDT", tf, since, NOW).await;
        assert_eq!(source.starts(), vec![since, page1[9].timestamp + 1]);
        assert_eq!(got.len(), 14);
        assert_eq!(
            summary,
            FetchSummary {
                pages: 2,
                bars: 14,
                stop: FetchStop::ShortPage
            }
        );

        let stored = store.query("BTC/USDT", tf, since).await.unwrap();
        assert_eq!(stored, got);
    }

    #[tokio::test]
    async fn source_error_keeps_earlier_pages() {
        let tf = Timeframe::H4;
        let store = store().await;
        let since = NOW - 100 * tf.duration_ms();
        let page1 = run(tf, since, 10);

        let source = ScriptedSource::new(vec![
            Ok(page1.clone()),
            Err(anyhow::anyhow!("connection reset")),
        ]);
        let cache = CandleCache::new(store.clone(), source, small_pages());

        let (got, summary) = cache.refresh("BTC/USDT", tf, since, NOW).await;
        assert_eq!(got, page1);
        assert_eq!(summary.pages, 1);
        let FetchStop::Failed(reason) = &summary.stop else {
            panic!("expected a failed stop, got {:?}", summary.stop);
        };
        assert!(reason.contains("connection reset"));
        assert_eq!(store.query("BTC/USDT", tf, since).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn pagination_stops_at_now() {
        let tf = Timeframe::H1;
        let store = store().await;
        // A full page whose newest bar is exactly `now`.
        let since = NOW - 9 * tf.duration_ms();
        let page = run(tf, since, 10);
        assert_eq!(page[9].timestamp, NOW);

        let source = ScriptedSource::new(vec![Ok(page)]);
        let cache = CandleCache::new(store, source.clone(), small_pages());

        let (_, summary) = cache.refresh("BTC/USDT", tf, since, NOW).await;
        assert_eq!(summary.stop, FetchStop::ReachedNow);
        assert_eq!(source.starts().len(), 1);
    }

    #[tokio::test]
    async fn empty_source_yields_empty_sequence() {
        let store = store().await;
        let source = ScriptedSource::new(vec![]);
        let cache = CandleCache::new(store, source, CacheSettings::default());
        let got = cache.get_at("NOPE/USDT", Timeframe::D1, NOW).await;
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn freshness_needs_both_length_and_recency() {
        let tf = Timeframe::Month1;
        let cache = CandleCache::new(
            store().await,
            ScriptedSource::new(vec![]),
            CacheSettings::default(),
        );

        // 95% of the 500-bar window is enough.
        let just_enough = run(tf, NOW - 475 * tf.duration_ms(), 475);
        assert!(cache.is_fresh(&just_enough, tf, NOW));
        let too_few = run(tf, NOW - 474 * tf.duration_ms(), 474);
        assert!(!cache.is_fresh(&too_few, tf, NOW));

        // Newest bar exactly two periods old is stale.
        assert!(!cache.is_fresh(&just_enough, tf, NOW + tf.duration_ms()));
        assert!(!cache.is_fresh(&[], tf, NOW));
    }
}
