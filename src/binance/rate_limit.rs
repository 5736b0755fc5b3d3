// =============================================================================
// Rate-Limit Tracker - paces public Binance REST calls
// =============================================================================
//
// Binance enforces a request-weight budget of 6000 per minute per IP on the
// spot REST API and reports the running total in `X-MBX-USED-WEIGHT-1M`.
// We hard-cap ourselves well below that. Independently of the weight budget,
// consecutive kline pages are spaced by a fixed minimum interval.
//
// The tracker keeps an atomic counter so any task may query it lock-free.
// =============================================================================

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

/// Weight at which we stop paging until the next minute window.
const WEIGHT_HARD_LIMIT: u32 = 5000;
/// Soft warning threshold.
const WEIGHT_WARN_THRESHOLD: u32 = 4000;

/// Thread-safe rate-limit tracker backed by an atomic counter.
pub struct RateLimitTracker {
    used_weight_1m: AtomicU32,
    min_interval: Duration,
}

impl RateLimitTracker {
    /// Create a tracker that spaces requests at least `min_interval` apart.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            used_weight_1m: AtomicU32::new(0),
            min_interval,
        }
    }

    /// Update the weight counter from the HTTP response headers returned by
    /// Binance.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        let Some(w) = headers
            .get("X-MBX-USED-WEIGHT-1M")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u32>().ok())
        else {
            return;
        };

        let prev = self.used_weight_1m.swap(w, Ordering::Relaxed);
        if w >= WEIGHT_WARN_THRESHOLD && prev < WEIGHT_WARN_THRESHOLD {
            warn!(
                used_weight = w,
                hard_limit = WEIGHT_HARD_LIMIT,
                "rate-limit weight crossed warning threshold"
            );
        }
        debug!(used_weight_1m = w, "rate-limit weight updated from header");
    }

    /// Pause to observe before the next request.
    ///
    /// Normally the fixed minimum interval. Once the weight budget is close to
    /// exhausted, the pause stretches to the start of the next minute window,
    /// when Binance resets the counter.
    pub fn next_pause(&self, now_ms: i64) -> Duration {
        let used = self.used_weight_1m.load(Ordering::Relaxed);
        if used < WEIGHT_HARD_LIMIT {
            return self.min_interval;
        }

        let into_minute = now_ms.rem_euclid(60_000) as u64;
        let until_reset = Duration::from_millis(60_000 - into_minute) + Duration::from_millis(100);
        warn!(
            used_weight = used,
            wait_ms = until_reset.as_millis() as u64,
            "rate-limit weight saturated - waiting for next minute window"
        );
        until_reset.max(self.min_interval)
    }
}

impl std::fmt::Debug for RateLimitTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = self.used_weight_1m.load(Ordering::Relaxed);
        f.debug_struct("RateLimitTracker")
            .field("used_weight_1m", &used)
            .field("min_interval", &self.min_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    fn headers(weight: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        let value = HeaderValue::from_str(weight).unwrap();
        h.insert("X-MBX-USED-WEIGHT-1M", value);
        h
    }

    #[test]
    fn pause_is_min_interval_below_limit() {
        let t = RateLimitTracker::new(Duration::from_millis(50));
        t.update_from_headers(&headers("120"));
        assert_eq!(t.next_pause(1_700_000_000_000), Duration::from_millis(50));
        assert_eq!(t.used_weight_1m.load(Ordering::Relaxed), 120);
    }

    #[test]
    fn saturated_weight_waits_for_next_minute() {
        let t = RateLimitTracker::new(Duration::from_millis(50));
        t.update_from_headers(&headers("5400"));
        // 45 s into the minute => 15 s + 100 ms buffer.
        let now = 1_700_000_040_000 - 1_700_000_040_000 % 60_000 + 45_000;
        assert_eq!(t.next_pause(now), Duration::from_millis(15_100));

        // A fresh window reports a low weight again.
        t.update_from_headers(&headers("3"));
        assert_eq!(t.next_pause(now), Duration::from_millis(50));
    }

    #[test]
    fn garbage_header_is_ignored() {
        let t = RateLimitTracker::new(Duration::ZERO);
        t.update_from_headers(&headers("lots"));
        assert_eq!(t.used_weight_1m.load(Ordering::Relaxed), 0);
    }
}
