// =============================================================================
// Shared types used across the chartist service
// =============================================================================

use serde::{Deserialize, Serialize};

const MS_IN_MIN: i64 = 60 * 1000;
const MS_IN_H: i64 = 60 * MS_IN_MIN;
const MS_IN_D: i64 = 24 * MS_IN_H;

/// Candle history kept per timeframe when the timeframe has no explicit entry.
const DEFAULT_REQUIRED_COUNT: usize = 1000;

/// Fixed bar duration a candle series is sampled at.
///
/// Serialised as the exchange shorthand (`"15m"`, `"4h"`, `"1M"`). Minutes use
/// a lowercase `m`, months an uppercase `M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
    #[serde(rename = "1M")]
    Month1,
}

impl Default for Timeframe {
    fn default() -> Self {
        Self::H4
    }
}

impl Timeframe {
    pub const ALL: [Timeframe; 8] = [
        Self::M1,
        Self::M5,
        Self::M15,
        Self::H1,
        Self::H4,
        Self::D1,
        Self::W1,
        Self::Month1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
            Self::W1 => "1w",
            Self::Month1 => "1M",
        }
    }

    /// Duration of one bar in milliseconds. A month is a flat 30 days.
    pub fn duration_ms(self) -> i64 {
        match self {
            Self::M1 => MS_IN_MIN,
            Self::M5 => 5 * MS_IN_MIN,
            Self::M15 => 15 * MS_IN_MIN,
            Self::H1 => MS_IN_H,
            Self::H4 => 4 * MS_IN_H,
            Self::D1 => MS_IN_D,
            Self::W1 => 7 * MS_IN_D,
            Self::Month1 => 30 * MS_IN_D,
        }
    }

    /// Number of bars the cache tries to hold for this timeframe.
    pub fn required_count(self) -> usize {
        match self {
            Self::M15 => 10_000,
            Self::H1 | Self::H4 => 5_000,
            Self::D1 => 2_000,
            Self::W1 => 1_000,
            Self::Month1 => 500,
            Self::M1 | Self::M5 => DEFAULT_REQUIRED_COUNT,
        }
    }

    /// How many bars back the "24h ago" reference close sits.
    ///
    /// Only 15m, 1h and 4h look back a full day; every other timeframe
    /// compares against the previous bar.
    pub fn day_lookback(self) -> usize {
        match self {
            Self::M15 => 96,
            Self::H1 => 24,
            Self::H4 => 6,
            _ => 1,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a timeframe string is not one of the supported shorthands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeframeParseError(pub String);

impl std::fmt::Display for TimeframeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unsupported timeframe: {:?}", self.0)
    }
}

impl std::error::Error for TimeframeParseError {}

impl std::str::FromStr for Timeframe {
    type Err = TimeframeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|tf| tf.as_str() == s.trim())
            .ok_or_else(|| TimeframeParseError(s.to_string()))
    }
}
