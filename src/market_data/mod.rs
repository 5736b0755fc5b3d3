pub mod cache;
pub mod candle;
pub mod reference;
pub mod source;
pub mod store;

// Re-export the core types for convenient access (e.g. `use crate::market_data::Candle`).
pub use cache::{CacheSettings, CandleCache};
pub use candle::{AnnotatedCandle, Candle, CandleKey, IndicatorValues, PatternFlags};
pub use reference::MarketStats;
pub use source::CandleSource;
pub use store::{CandleStore, ReferenceStore, SqliteStore};
