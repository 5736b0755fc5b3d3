// =============================================================================
// Central Application State - chartist service
// =============================================================================
//
// Ties the candle cache, the reference store and the runtime configuration
// together for the API handlers.
//
// Thread safety:
//   - Atomic counters for lock-free request accounting.
//   - parking_lot::RwLock for the mutable shared collections.
//   - Arc wrappers for the cache and store, which manage their own
//     concurrency.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::market_data::{CandleCache, ReferenceStore};
use crate::runtime_config::RuntimeConfig;

// =============================================================================
// Error Record
// =============================================================================

/// A recorded error event, surfaced through the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

// =============================================================================
// AppState
// =============================================================================

/// Shared state handed to every API handler via `Arc<AppState>`.
pub struct AppState {
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    pub cache: Arc<CandleCache>,
    pub reference: Arc<dyn ReferenceStore>,

    /// Analyses that produced a report.
    pub analyses_served: AtomicU64,
    pub recent_errors: RwLock<Vec<ErrorRecord>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: RuntimeConfig,
        cache: Arc<CandleCache>,
        reference: Arc<dyn ReferenceStore>,
    ) -> Self {
        Self {
            runtime_config: Arc::new(RwLock::new(config)),
            cache,
            reference,
            analyses_served: AtomicU64::new(0),
            recent_errors: RwLock::new(Vec::new()),
            start_time: Instant::now(),
        }
    }

    pub fn record_analysis(&self) -> u64 {
        self.analyses_served.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record an error message. Oldest entries are evicted past
    /// [`MAX_RECENT_ERRORS`].
    pub fn push_error(&self, msg: String) {
        let record = ErrorRecord {
            message: msg,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            analyses_served: self.analyses_served.load(Ordering::Relaxed),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub uptime_secs: u64,
    pub analyses_served: u64,
    pub recent_errors: Vec<ErrorRecord>,
}
