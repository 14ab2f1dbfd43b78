// =============================================================================
// Shadow Recorder — hypothetical execution of non-activated strategies
// =============================================================================
//
// Shadow witnesses see the same immutable bar slice as the live panel, but
// their claims land here: recorded with the contemporaneous price, resolved
// against the market a fixed horizon later, and rolled into the win rate the
// promotion check reads.  Nothing in this module can reach the aggregator.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::witness::Claim;
use crate::types::Direction;

/// Entries retained per strategy.
const MAX_ENTRIES: usize = 500;

/// One recorded hypothetical claim.
#[derive(Debug, Clone, Serialize)]
pub struct ShadowEntry {
    pub claim: Claim,
    /// Market price when the claim was recorded.
    pub mark_price: f64,
    pub recorded_at: i64,
    /// Set when the horizon passes: did the market move the claim's way?
    pub outcome: Option<bool>,
}

/// Rolling shadow performance for one strategy.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ShadowPerformance {
    pub win_rate: f64,
    pub sample_count: u64,
}

pub struct ShadowRecorder {
    logs: RwLock<HashMap<String, VecDeque<ShadowEntry>>>,
    /// How long after recording an entry is scored, in milliseconds.
    horizon_ms: i64,
}

impl ShadowRecorder {
    pub fn new(horizon_ms: i64) -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            horizon_ms,
        }
    }

    /// Record a hypothetical claim at the current market price.  Expired
    /// claims are dropped — the validity window binds shadows exactly as it
    /// binds live claims.
    pub fn record(&self, claim: Claim, mark_price: f64, now_ms: i64) {
        if claim.is_expired(now_ms) {
            debug!(strategy = %claim.strategy_id, "expired shadow claim dropped");
            return;
        }
        if !claim.direction.is_directional() {
            return;
        }

        let mut logs = self.logs.write();
        let ring = logs.entry(claim.strategy_id.clone()).or_default();
        ring.push_back(ShadowEntry {
            mark_price,
            recorded_at: now_ms,
            outcome: None,
            claim,
        });
        while ring.len() > MAX_ENTRIES {
            ring.pop_front();
        }
    }

    /// Score every entry whose horizon has passed against `current_price`.
    pub fn resolve(&self, current_price: f64, now_ms: i64) {
        let mut logs = self.logs.write();
        for (strategy_id, ring) in logs.iter_mut() {
            for entry in ring.iter_mut() {
                if entry.outcome.is_some() || now_ms - entry.recorded_at < self.horizon_ms {
                    continue;
                }
                let win = match entry.claim.direction {
                    Direction::Long => current_price > entry.mark_price,
                    Direction::Short => current_price < entry.mark_price,
                    Direction::Neutral => continue,
                };
                entry.outcome = Some(win);
                debug!(strategy = %strategy_id, win, "shadow entry resolved");
            }
        }
    }

    /// Rolling performance over resolved entries.
    pub fn performance(&self, strategy_id: &str) -> ShadowPerformance {
        let logs = self.logs.read();
        let (wins, samples) = logs
            .get(strategy_id)
            .map(|ring| {
                ring.iter().fold((0u64, 0u64), |(w, n), e| match e.outcome {
                    Some(true) => (w + 1, n + 1),
                    Some(false) => (w, n + 1),
                    None => (w, n),
                })
            })
            .unwrap_or((0, 0));

        ShadowPerformance {
            win_rate: if samples > 0 {
                wins as f64 / samples as f64
            } else {
                0.0
            },
            sample_count: samples,
        }
    }

    /// Recent entries for one strategy, oldest first.
    pub fn log(&self, strategy_id: &str) -> Vec<ShadowEntry> {
        self.logs
            .read()
            .get(strategy_id)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn forget(&self, strategy_id: &str) {
        self.logs.write().remove(strategy_id);
    }
}
