// =============================================================================
// Weight Manager — base × health × learning, clamped on every write
// =============================================================================
//
// The aggregator consults effective weights; operators own the base weight,
// the health grade drives the health factor, and the external learner owns
// the learning factor through a clamped, drift-limited setter.
//
// The health factor is pulled from the health manager at read time — there is
// no push path, so a grade change is visible on the very next `get_weight`.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::audit::{AuditLog, AuditStream};
use crate::config::WeightClamps;
use crate::health::HealthManager;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Weight snapshot for one witness.
#[derive(Debug, Clone, Serialize)]
pub struct Weight {
    pub base: f64,
    pub health_factor: f64,
    pub learning_factor: f64,
}

impl Weight {
    pub fn effective(&self) -> f64 {
        self.base * self.health_factor * self.learning_factor
    }
}

#[derive(Debug, Clone)]
struct WeightEntry {
    base: f64,
    learning: f64,
    /// UTC date and learning value at the first write of that day; bounds
    /// the cumulative drift any number of setter calls may achieve.
    learning_anchor: Option<(String, f64)>,
}

impl Default for WeightEntry {
    fn default() -> Self {
        Self {
            base: 1.0,
            learning: 1.0,
            learning_anchor: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct WeightManager {
    entries: RwLock<HashMap<String, WeightEntry>>,
    clamps: WeightClamps,
    health: Arc<HealthManager>,
    audit: Arc<AuditLog>,
}

impl WeightManager {
    pub fn new(clamps: WeightClamps, health: Arc<HealthManager>, audit: Arc<AuditLog>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clamps,
            health,
            audit,
        }
    }

    /// Current weight for `id`, with the health factor refreshed from the
    /// health manager's grade at this read.
    pub fn get_weight(&self, id: &str) -> Weight {
        let (base, learning) = {
            let entries = self.entries.read();
            let entry = entries.get(id).cloned().unwrap_or_default();
            (entry.base, entry.learning)
        };

        let health_factor = self
            .health
            .health(id)
            .weight_scalar
            .clamp(self.clamps.health_min, self.clamps.health_max);

        Weight {
            base,
            health_factor,
            learning_factor: learning,
        }
    }

    /// Set the operator base weight, clamped to its range.
    pub fn set_base_weight(&self, id: &str, value: f64) {
        let applied = value.clamp(self.clamps.base_min, self.clamps.base_max);
        {
            let mut entries = self.entries.write();
            entries.entry(id.to_string()).or_default().base = applied;
        }

        info!(witness = id, requested = value, applied, "base weight set");
        self.audit.record(
            AuditStream::Weights,
            "weight_manager",
            id,
            json!({ "field": "base", "requested": value, "applied": applied }),
        );
    }

    /// Set the learning factor, clamped to its range and limited to the
    /// daily drift budget measured from the first write of the UTC day.
    pub fn set_learning_factor(&self, id: &str, value: f64) {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let clamped = value.clamp(self.clamps.learning_min, self.clamps.learning_max);

        let applied = {
            let mut entries = self.entries.write();
            let entry = entries.entry(id.to_string()).or_default();

            let anchor = match &entry.learning_anchor {
                Some((date, anchor)) if *date == today => *anchor,
                _ => {
                    entry.learning_anchor = Some((today.clone(), entry.learning));
                    entry.learning
                }
            };

            let lo = (anchor - self.clamps.learning_daily_drift).max(self.clamps.learning_min);
            let hi = (anchor + self.clamps.learning_daily_drift).min(self.clamps.learning_max);
            let applied = clamped.clamp(lo, hi);
            entry.learning = applied;
            applied
        };

        debug!(witness = id, requested = value, applied, "learning factor set");
        self.audit.record(
            AuditStream::Weights,
            "weight_manager",
            id,
            json!({ "field": "learning", "requested": value, "applied": applied }),
        );
    }

    /// Effective weights for the given ids — one consistent snapshot used
    /// for the whole of an aggregation pass.
    pub fn snapshot(&self, ids: &[String]) -> HashMap<String, f64> {
        ids.iter()
            .map(|id| (id.clone(), self.get_weight(id).effective()))
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::Grade;

    fn manager() -> (WeightManager, Arc<HealthManager>) {
        let health = Arc::new(HealthManager::new());
        let mgr = WeightManager::new(
            WeightClamps::default(),
            Arc::clone(&health),
            AuditLog::in_memory(),
        );
        (mgr, health)
    }

    #[test]
    fn defaults_are_neutral() {
        let (mgr, _) = manager();
        let w = mgr.get_weight("w");
        assert!((w.base - 1.0).abs() < f64::EPSILON);
        assert!((w.health_factor - 1.0).abs() < f64::EPSILON);
        assert!((w.learning_factor - 1.0).abs() < f64::EPSILON);
        assert!((w.effective() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn base_weight_clamps_both_ends() {
        let (mgr, _) = manager();
        mgr.set_base_weight("w", 5.0);
        assert!((mgr.get_weight("w").base - 2.0).abs() < f64::EPSILON);
        mgr.set_base_weight("w", 0.1);
        assert!((mgr.get_weight("w").base - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn health_factor_is_pulled_at_read_time() {
        let (mgr, health) = manager();

        // 60% over 40 samples → grade A.
        for _ in 0..24 {
            health.record_outcome("w", true);
        }
        for _ in 0..16 {
            health.record_outcome("w", false);
        }
        assert_eq!(health.health("w").grade, Grade::A);
        assert!((mgr.get_weight("w").health_factor - 1.2).abs() < f64::EPSILON);
        assert!((mgr.get_weight("w").effective() - 1.2).abs() < 1e-12);

        // Losses drag the grade to C; no setter is called anywhere.
        for _ in 0..12 {
            health.record_outcome("w", false);
        }
        assert_eq!(health.health("w").grade, Grade::C);
        assert!((mgr.get_weight("w").health_factor - 0.7).abs() < f64::EPSILON);
        assert!((mgr.get_weight("w").effective() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn effective_weight_is_the_exact_product() {
        let (mgr, health) = manager();
        mgr.set_base_weight("w", 1.5);
        mgr.set_learning_factor("w", 1.04);
        for _ in 0..24 {
            health.record_outcome("w", true);
        }
        for _ in 0..16 {
            health.record_outcome("w", false);
        }

        let w = mgr.get_weight("w");
        assert!((w.effective() - w.base * w.health_factor * w.learning_factor).abs() < 1e-15);
        // Bounds hold for any combination of in-range factors.
        assert!(w.effective() >= 0.5 * 0.5 * 0.8);
        assert!(w.effective() <= 2.0 * 1.2 * 1.2);
    }

    #[test]
    fn learning_drift_is_cumulative_within_a_day() {
        let (mgr, _) = manager();

        // Anchor is 1.0; a single large step is capped at +0.05.
        mgr.set_learning_factor("w", 1.2);
        assert!((mgr.get_weight("w").learning_factor - 1.05).abs() < 1e-12);

        // A second step the same day cannot stack another +0.05.
        mgr.set_learning_factor("w", 1.2);
        assert!((mgr.get_weight("w").learning_factor - 1.05).abs() < 1e-12);

        // Moving back down is bounded by the same anchor window.
        mgr.set_learning_factor("w", 0.8);
        assert!((mgr.get_weight("w").learning_factor - 0.95).abs() < 1e-12);
    }

    #[test]
    fn learning_clamps_to_range_before_drift() {
        let (mgr, _) = manager();
        mgr.set_learning_factor("w", 3.0);
        let lf = mgr.get_weight("w").learning_factor;
        assert!(lf <= 1.05 + 1e-12);
        assert!(lf >= 0.8);
    }

    #[test]
    fn weight_writes_emit_audit_records() {
        let health = Arc::new(HealthManager::new());
        let audit = AuditLog::in_memory();
        let mgr = WeightManager::new(WeightClamps::default(), health, Arc::clone(&audit));

        mgr.set_base_weight("w", 1.5);
        mgr.set_learning_factor("w", 1.02);

        let records = audit.recent(AuditStream::Weights);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload["field"], "base");
        assert_eq!(records[1].payload["field"], "learning");
    }

    #[test]
    fn snapshot_covers_requested_ids() {
        let (mgr, _) = manager();
        mgr.set_base_weight("a", 2.0);
        let snap = mgr.snapshot(&["a".to_string(), "b".to_string()]);
        assert!((snap["a"] - 2.0).abs() < f64::EPSILON);
        assert!((snap["b"] - 1.0).abs() < f64::EPSILON);
    }
}
