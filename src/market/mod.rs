// =============================================================================
// Market data — bars, the source contract, and the in-memory bar buffer
// =============================================================================

mod bar_buffer;

pub use bar_buffer::BarBuffer;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLCV bar.  Timestamps are UTC milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Composite key that identifies a unique bar series.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct BarKey {
    pub symbol: String,
    pub interval: String,
}

impl BarKey {
    pub fn new(symbol: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            interval: interval.into(),
        }
    }
}

impl std::fmt::Display for BarKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.interval)
    }
}

/// Millisecond duration of one bar for the given interval string
/// (e.g. "1m", "5m", "1h", "4h", "1d").  Unknown intervals yield `None`.
pub fn interval_ms(interval: &str) -> Option<i64> {
    let (num, unit) = interval.split_at(interval.len().checked_sub(1)?);
    let n: i64 = num.parse().ok()?;
    let unit_ms = match unit {
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => return None,
    };
    Some(n * unit_ms)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced by a market data source.  Both cause the current
/// decision loop to be skipped, never aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketDataError {
    /// No bars exist for the requested series/range.
    NotFound { key: String },
    /// The returned range is malformed (unordered, gapped, or bad interval).
    Validation { reason: String },
}

impl std::fmt::Display for MarketDataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { key } => write!(f, "no bars for {key}"),
            Self::Validation { reason } => write!(f, "bar validation failed: {reason}"),
        }
    }
}

impl std::error::Error for MarketDataError {}

// ---------------------------------------------------------------------------
// Source contract
// ---------------------------------------------------------------------------

/// Narrow contract through which the decision core reads market data.
///
/// Implementations must return bars ordered by `open_time` with no gaps
/// inside the queried range.
pub trait MarketDataSource: Send + Sync {
    fn get_bars(
        &self,
        symbol: &str,
        interval: &str,
        since: i64,
        until: i64,
    ) -> Result<Vec<Bar>, MarketDataError>;
}

/// Verify that `bars` are strictly ordered and contiguous for `interval`.
pub fn validate_bars(bars: &[Bar], interval: &str) -> Result<(), MarketDataError> {
    let step = interval_ms(interval).ok_or_else(|| MarketDataError::Validation {
        reason: format!("unknown interval {interval}"),
    })?;

    for pair in bars.windows(2) {
        let gap = pair[1].open_time - pair[0].open_time;
        if gap != step {
            return Err(MarketDataError::Validation {
                reason: format!(
                    "gap of {gap}ms between bars at {} and {} (expected {step}ms)",
                    pair[0].open_time, pair[1].open_time
                ),
            });
        }
    }
    Ok(())
}

/// Static source wrapping pre-loaded series.  Used by tests and replays.
pub struct StaticBarSource {
    series: HashMap<BarKey, Vec<Bar>>,
}

impl StaticBarSource {
    pub fn new() -> Self {
        Self {
            series: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: BarKey, bars: Vec<Bar>) {
        self.series.insert(key, bars);
    }
}

impl Default for StaticBarSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketDataSource for StaticBarSource {
    fn get_bars(
        &self,
        symbol: &str,
        interval: &str,
        since: i64,
        until: i64,
    ) -> Result<Vec<Bar>, MarketDataError> {
        let key = BarKey::new(symbol, interval);
        let bars = self
            .series
            .get(&key)
            .ok_or_else(|| MarketDataError::NotFound {
                key: key.to_string(),
            })?;

        let slice: Vec<Bar> = bars
            .iter()
            .filter(|b| b.open_time >= since && b.open_time <= until)
            .cloned()
            .collect();

        if slice.is_empty() {
            return Err(MarketDataError::NotFound {
                key: key.to_string(),
            });
        }

        validate_bars(&slice, interval)?;
        Ok(slice)
    }
}

#[cfg(test)]
pub(crate) fn test_bar(open_time: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        open_time,
        close_time: open_time + 299_999,
        open,
        high,
        low,
        close,
        volume: 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_parsing() {
        assert_eq!(interval_ms("1m"), Some(60_000));
        assert_eq!(interval_ms("5m"), Some(300_000));
        assert_eq!(interval_ms("1h"), Some(3_600_000));
        assert_eq!(interval_ms("1d"), Some(86_400_000));
        assert_eq!(interval_ms("x"), None);
        assert_eq!(interval_ms(""), None);
    }

    #[test]
    fn contiguous_bars_validate() {
        let bars: Vec<Bar> = (0..5)
            .map(|i| test_bar(i * 300_000, 100.0, 101.0, 99.0, 100.5))
            .collect();
        assert!(validate_bars(&bars, "5m").is_ok());
    }

    #[test]
    fn gapped_bars_fail_validation() {
        let mut bars: Vec<Bar> = (0..5)
            .map(|i| test_bar(i * 300_000, 100.0, 101.0, 99.0, 100.5))
            .collect();
        bars.remove(2);
        let err = validate_bars(&bars, "5m").unwrap_err();
        assert!(matches!(err, MarketDataError::Validation { .. }));
    }

    #[test]
    fn static_source_filters_range() {
        let mut src = StaticBarSource::new();
        let bars: Vec<Bar> = (0..10)
            .map(|i| test_bar(i * 300_000, 100.0, 101.0, 99.0, 100.5))
            .collect();
        src.insert(BarKey::new("BTCUSDT", "5m"), bars);

        let got = src.get_bars("BTCUSDT", "5m", 300_000, 1_200_000).unwrap();
        assert_eq!(got.len(), 4);
        assert_eq!(got[0].open_time, 300_000);

        let missing = src.get_bars("ETHUSDT", "5m", 0, 1_000_000);
        assert!(matches!(missing, Err(MarketDataError::NotFound { .. })));
    }
}
