// =============================================================================
// BarBuffer — thread-safe ring buffer per (symbol, interval)
// =============================================================================
//
// Stores the most recent closed bars per series.  Readers get cloned slices
// so the decision loop and the shadow runner always observe an immutable
// snapshot, whatever the ingestion side is doing concurrently.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use tracing::debug;

use super::{validate_bars, Bar, BarKey, MarketDataError, MarketDataSource};

/// Ring buffer retaining at most `max_bars` closed bars per series.
pub struct BarBuffer {
    buffers: RwLock<HashMap<BarKey, VecDeque<Bar>>>,
    max_bars: usize,
}

impl BarBuffer {
    pub fn new(max_bars: usize) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            max_bars,
        }
    }

    /// Append a closed bar.  A bar whose `open_time` does not advance past
    /// the newest stored bar replaces it (late correction), otherwise it is
    /// pushed and the ring trimmed.
    pub fn push(&self, key: BarKey, bar: Bar) {
        let mut map = self.buffers.write();
        let ring = map
            .entry(key)
            .or_insert_with(|| VecDeque::with_capacity(self.max_bars + 1));

        match ring.back() {
            Some(last) if last.open_time == bar.open_time => {
                ring.pop_back();
                ring.push_back(bar);
            }
            Some(last) if last.open_time > bar.open_time => {
                debug!(open_time = bar.open_time, "stale bar dropped");
            }
            _ => {
                ring.push_back(bar);
                while ring.len() > self.max_bars {
                    ring.pop_front();
                }
            }
        }
    }

    /// Most recent `count` bars for the series, oldest first.
    pub fn recent(&self, key: &BarKey, count: usize) -> Vec<Bar> {
        let map = self.buffers.read();
        match map.get(key) {
            Some(ring) => {
                let skip = ring.len().saturating_sub(count);
                ring.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Close price of the newest bar in the series, if any.
    pub fn last_price(&self, key: &BarKey) -> Option<f64> {
        let map = self.buffers.read();
        map.get(key).and_then(|ring| ring.back()).map(|b| b.close)
    }

    /// Open time of the newest bar in the series, if any.
    pub fn last_open_time(&self, key: &BarKey) -> Option<i64> {
        let map = self.buffers.read();
        map.get(key)
            .and_then(|ring| ring.back())
            .map(|b| b.open_time)
    }

    pub fn len(&self, key: &BarKey) -> usize {
        self.buffers.read().get(key).map_or(0, |r| r.len())
    }

    pub fn is_empty(&self, key: &BarKey) -> bool {
        self.len(key) == 0
    }
}

impl MarketDataSource for BarBuffer {
    fn get_bars(
        &self,
        symbol: &str,
        interval: &str,
        since: i64,
        until: i64,
    ) -> Result<Vec<Bar>, MarketDataError> {
        let key = BarKey::new(symbol, interval);
        let map = self.buffers.read();
        let ring = map.get(&key).ok_or_else(|| MarketDataError::NotFound {
            key: key.to_string(),
        })?;

        let slice: Vec<Bar> = ring
            .iter()
            .filter(|b| b.open_time >= since && b.open_time <= until)
            .cloned()
            .collect();
        drop(map);

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
mod tests {
    use super::super::test_bar;
    use super::*;

    fn key() -> BarKey {
        BarKey::new("BTCUSDT", "5m")
    }

    #[test]
    fn push_and_recent() {
        let buf = BarBuffer::new(100);
        for i in 0..10 {
            buf.push(key(), test_bar(i * 300_000, 100.0, 101.0, 99.0, 100.5));
        }
        assert_eq!(buf.len(&key()), 10);

        let last3 = buf.recent(&key(), 3);
        assert_eq!(last3.len(), 3);
        assert_eq!(last3[0].open_time, 7 * 300_000);
        assert_eq!(last3[2].open_time, 9 * 300_000);
    }

    #[test]
    fn ring_trims_to_capacity() {
        let buf = BarBuffer::new(5);
        for i in 0..20 {
            buf.push(key(), test_bar(i * 300_000, 100.0, 101.0, 99.0, 100.5));
        }
        assert_eq!(buf.len(&key()), 5);
        let bars = buf.recent(&key(), 10);
        assert_eq!(bars[0].open_time, 15 * 300_000);
    }

    #[test]
    fn same_open_time_replaces() {
        let buf = BarBuffer::new(10);
        buf.push(key(), test_bar(0, 100.0, 101.0, 99.0, 100.5));
        buf.push(key(), test_bar(0, 100.0, 102.0, 99.0, 101.5));
        assert_eq!(buf.len(&key()), 1);
        assert!((buf.last_price(&key()).unwrap() - 101.5).abs() < 1e-9);
    }

    #[test]
    fn stale_bar_is_dropped() {
        let buf = BarBuffer::new(10);
        buf.push(key(), test_bar(600_000, 100.0, 101.0, 99.0, 100.5));
        buf.push(key(), test_bar(300_000, 100.0, 101.0, 99.0, 100.5));
        assert_eq!(buf.len(&key()), 1);
        assert_eq!(buf.last_open_time(&key()), Some(600_000));
    }

    #[test]
    fn source_contract_detects_gaps() {
        let buf = BarBuffer::new(100);
        buf.push(key(), test_bar(0, 100.0, 101.0, 99.0, 100.5));
        buf.push(key(), test_bar(300_000, 100.0, 101.0, 99.0, 100.5));
        // skip one bar
        buf.push(key(), test_bar(900_000, 100.0, 101.0, 99.0, 100.5));

        let res = buf.get_bars("BTCUSDT", "5m", 0, 900_000);
        assert!(matches!(res, Err(MarketDataError::Validation { .. })));
    }

    #[test]
    fn source_contract_returns_ordered_range() {
        let buf = BarBuffer::new(100);
        for i in 0..10 {
            buf.push(key(), test_bar(i * 300_000, 100.0, 101.0, 99.0, 100.5));
        }
        let bars = buf.get_bars("BTCUSDT", "5m", 300_000, 1_500_000).unwrap();
        assert_eq!(bars.len(), 5);
        assert!(bars.windows(2).all(|w| w[0].open_time < w[1].open_time));
    }
}
