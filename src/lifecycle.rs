// =============================================================================
// Strategy Lifecycle — NEW → TESTING → SHADOW → ACTIVE ↔ DEGRADED → RETIRED
// =============================================================================
//
// Automatic transitions run in the sweep; promotions that change what can
// influence real money (SHADOW→ACTIVE, auxiliary→core) require an operator
// call and hard evidence.  Veto witnesses bypass this subsystem entirely.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::audit::{AuditLog, AuditStream};
use crate::health::{Grade, HealthManager};
use crate::shadow::ShadowRecorder;
use crate::types::{LifecycleStatus, Tier};
use crate::witness::{RegistryError, Witness, WitnessPanel};

/// Shadow/validation win rate required before a strategy advances.
pub const PROMOTION_WIN_RATE: f64 = 0.51;
/// Samples backing that win rate.
pub const PROMOTION_SAMPLES: u64 = 100;
/// Time a DEGRADED strategy gets to recover before retirement.
const RETIRE_AFTER_MS: i64 = 30 * 24 * 3_600_000;
/// Continuous grade-A time required for promotion to the core tier.
const CORE_PROMOTION_GRADE_A_MS: i64 = 30 * 24 * 3_600_000;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Out-of-sample validation metrics reported for a TESTING strategy.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ValidationStats {
    pub win_rate: f64,
    pub sample_count: u64,
}

/// One automatic status change performed by a sweep.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    pub witness_id: String,
    pub from: LifecycleStatus,
    pub to: LifecycleStatus,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub enum LifecycleError {
    Registry(RegistryError),
    /// The requested promotion is not backed by enough evidence.
    NotEligible { witness_id: String, reason: String },
}

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registry(e) => write!(f, "{e}"),
            Self::NotEligible { witness_id, reason } => {
                write!(f, "{witness_id} not eligible: {reason}")
            }
        }
    }
}

impl std::error::Error for LifecycleError {}

impl From<RegistryError> for LifecycleError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct LifecycleManager {
    panel: Arc<WitnessPanel>,
    health: Arc<HealthManager>,
    shadow: Arc<ShadowRecorder>,
    audit: Arc<AuditLog>,
    validations: RwLock<HashMap<String, ValidationStats>>,
}

impl LifecycleManager {
    pub fn new(
        panel: Arc<WitnessPanel>,
        health: Arc<HealthManager>,
        shadow: Arc<ShadowRecorder>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            panel,
            health,
            shadow,
            audit,
            validations: RwLock::new(HashMap::new()),
        }
    }

    /// Register a discovered hypothesis and move it straight to TESTING.
    pub fn admit_hypothesis(
        &self,
        witness: Arc<dyn Witness>,
        tier: Tier,
    ) -> Result<(), LifecycleError> {
        let id = witness.id().to_string();
        self.panel.register(witness, tier)?;
        self.panel
            .set_status(&id, LifecycleStatus::Testing, "hypothesis admitted")?;
        self.emit(&id, LifecycleStatus::New, LifecycleStatus::Testing, "hypothesis admitted");
        Ok(())
    }

    /// Report out-of-sample validation metrics for a TESTING strategy.
    pub fn submit_validation(&self, witness_id: &str, stats: ValidationStats) {
        self.validations
            .write()
            .insert(witness_id.to_string(), stats);
    }

    // -------------------------------------------------------------------------
    // Automatic sweep
    // -------------------------------------------------------------------------

    /// Apply every automatic transition that is due.  Returns the changes
    /// made, already audited.
    pub fn sweep(&self, now_ms: i64) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();

        for (id, record) in self.panel.all_records() {
            if record.tier == Tier::Veto {
                continue;
            }

            let health = self.health.health(&id);

            // Track the uninterrupted grade-A streak for core promotion.
            let streak_update: Option<Option<i64>> = match (health.grade, record.grade_a_since) {
                (Grade::A, None) => Some(Some(now_ms)),
                (Grade::A, Some(_)) => None,
                (_, Some(_)) => Some(None),
                (_, None) => None,
            };
            if let Some(value) = streak_update {
                let _ = self.panel.update_record(&id, |r| r.grade_a_since = value);
            }

            match record.status {
                LifecycleStatus::Testing => {
                    let validated = self
                        .validations
                        .read()
                        .get(&id)
                        .map(|v| {
                            v.win_rate >= PROMOTION_WIN_RATE && v.sample_count >= PROMOTION_SAMPLES
                        })
                        .unwrap_or(false);
                    if validated {
                        self.apply(
                            &mut events,
                            &id,
                            record.status,
                            LifecycleStatus::Shadow,
                            "validation passed",
                        );
                    }
                }
                LifecycleStatus::Active => {
                    if health.grade > Grade::C && health.sample_count > 0 {
                        self.apply(
                            &mut events,
                            &id,
                            record.status,
                            LifecycleStatus::Degraded,
                            &format!("health grade fell to {}", health.grade),
                        );
                    }
                }
                LifecycleStatus::Degraded => {
                    if health.grade <= Grade::B {
                        self.apply(
                            &mut events,
                            &id,
                            record.status,
                            LifecycleStatus::Active,
                            &format!("health grade recovered to {}", health.grade),
                        );
                    } else if record
                        .degraded_since
                        .map(|since| now_ms - since >= RETIRE_AFTER_MS)
                        .unwrap_or(false)
                    {
                        self.apply(
                            &mut events,
                            &id,
                            record.status,
                            LifecycleStatus::Retired,
                            "no recovery within the degraded window",
                        );
                    }
                }
                _ => {}
            }
        }

        events
    }

    // -------------------------------------------------------------------------
    // Manual promotions
    // -------------------------------------------------------------------------

    /// Operator-approved SHADOW → ACTIVE.  The strategy activates at the
    /// auxiliary tier regardless of how it was registered.
    pub fn promote_to_active(&self, witness_id: &str, actor: &str) -> Result<(), LifecycleError> {
        let record = self
            .panel
            .record(witness_id)
            .ok_or_else(|| RegistryError::UnknownWitness(witness_id.to_string()))?;

        if record.status != LifecycleStatus::Shadow {
            return Err(LifecycleError::NotEligible {
                witness_id: witness_id.to_string(),
                reason: format!("status is {}, not SHADOW", record.status),
            });
        }

        let perf = self.shadow.performance(witness_id);
        if perf.sample_count < PROMOTION_SAMPLES || perf.win_rate < PROMOTION_WIN_RATE {
            return Err(LifecycleError::NotEligible {
                witness_id: witness_id.to_string(),
                reason: format!(
                    "shadow record {:.0}% over {} samples is below the promotion bar",
                    perf.win_rate * 100.0,
                    perf.sample_count
                ),
            });
        }

        if record.tier == Tier::Core {
            self.panel.set_tier(witness_id, Tier::Auxiliary)?;
        }
        self.panel
            .set_status(witness_id, LifecycleStatus::Active, "promotion approved")?;

        info!(witness = witness_id, actor, "shadow strategy promoted to active");
        self.emit(
            witness_id,
            LifecycleStatus::Shadow,
            LifecycleStatus::Active,
            &format!("promotion approved by {actor}"),
        );
        Ok(())
    }

    /// Operator-approved auxiliary → core tier move.  Requires an unbroken
    /// grade-A streak over the full qualification window.
    pub fn promote_to_core(
        &self,
        witness_id: &str,
        actor: &str,
        now_ms: i64,
    ) -> Result<(), LifecycleError> {
        let record = self
            .panel
            .record(witness_id)
            .ok_or_else(|| RegistryError::UnknownWitness(witness_id.to_string()))?;

        if record.tier != Tier::Auxiliary || record.status != LifecycleStatus::Active {
            return Err(LifecycleError::NotEligible {
                witness_id: witness_id.to_string(),
                reason: "only ACTIVE auxiliary strategies qualify".to_string(),
            });
        }

        let qualified = record
            .grade_a_since
            .map(|since| now_ms - since >= CORE_PROMOTION_GRADE_A_MS)
            .unwrap_or(false);
        if !qualified {
            return Err(LifecycleError::NotEligible {
                witness_id: witness_id.to_string(),
                reason: "grade-A streak shorter than the qualification window".to_string(),
            });
        }

        self.panel.set_tier(witness_id, Tier::Core)?;
        info!(witness = witness_id, actor, "auxiliary strategy promoted to core tier");
        self.audit.record(
            AuditStream::Lifecycle,
            "lifecycle",
            witness_id,
            json!({ "witness_id": witness_id, "change": "tier", "to": "T1", "actor": actor }),
        );
        Ok(())
    }

    /// Manual retirement.
    pub fn retire(&self, witness_id: &str, reason: &str) -> Result<(), LifecycleError> {
        let record = self
            .panel
            .record(witness_id)
            .ok_or_else(|| RegistryError::UnknownWitness(witness_id.to_string()))?;
        self.panel
            .set_status(witness_id, LifecycleStatus::Retired, reason)?;
        self.emit(witness_id, record.status, LifecycleStatus::Retired, reason);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn apply(
        &self,
        events: &mut Vec<LifecycleEvent>,
        id: &str,
        from: LifecycleStatus,
        to: LifecycleStatus,
        reason: &str,
    ) {
        match self.panel.set_status(id, to, reason) {
            Ok(()) => {
                info!(witness = id, %from, %to, reason, "lifecycle transition");
                self.emit(id, from, to, reason);
                events.push(LifecycleEvent {
                    witness_id: id.to_string(),
                    from,
                    to,
                    reason: reason.to_string(),
                });
            }
            Err(e) => warn!(witness = id, error = %e, "lifecycle transition refused"),
        }
    }

    fn emit(&self, id: &str, from: LifecycleStatus, to: LifecycleStatus, reason: &str) {
        self.audit.record(
            AuditStream::Lifecycle,
            "lifecycle",
            id,
            json!({
                "witness_id": id,
                "from": from.to_string(),
                "to": to.to_string(),
                "reason": reason,
            }),
        );
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{now_ms, ClaimType, Direction};
    use crate::witness::{Claim, WitnessError};
    use crate::market::Bar;

    struct StubWitness {
        id: String,
    }

    impl Witness for StubWitness {
        fn id(&self) -> &str {
            &self.id
        }

        fn generate_claim(&self, _bars: &[Bar]) -> Result<Option<Claim>, WitnessError> {
            Ok(Some(Claim::new(
                self.id.clone(),
                ClaimType::MarketEligible,
                0.7,
                300,
                Direction::Long,
                now_ms(),
            )))
        }
    }

    fn stub(id: &str) -> Arc<dyn Witness> {
        Arc::new(StubWitness { id: id.to_string() })
    }

    struct Fixture {
        panel: Arc<WitnessPanel>,
        health: Arc<HealthManager>,
        shadow: Arc<ShadowRecorder>,
        lifecycle: LifecycleManager,
    }

    fn fixture() -> Fixture {
        let panel = Arc::new(WitnessPanel::new());
        let health = Arc::new(HealthManager::new());
        let shadow = Arc::new(ShadowRecorder::new(3_600_000));
        let lifecycle = LifecycleManager::new(
            Arc::clone(&panel),
            Arc::clone(&health),
            Arc::clone(&shadow),
            AuditLog::in_memory(),
        );
        Fixture {
            panel,
            health,
            shadow,
            lifecycle,
        }
    }

    fn feed_health(health: &HealthManager, id: &str, wins: u64, losses: u64) {
        for _ in 0..wins {
            health.record_outcome(id, true);
        }
        for _ in 0..losses {
            health.record_outcome(id, false);
        }
    }

    #[test]
    fn hypothesis_starts_in_testing() {
        let f = fixture();
        f.lifecycle.admit_hypothesis(stub("h1"), Tier::Auxiliary).unwrap();
        assert_eq!(
            f.panel.record("h1").unwrap().status,
            LifecycleStatus::Testing
        );
    }

    #[test]
    fn validated_testing_strategy_enters_shadow() {
        let f = fixture();
        f.lifecycle.admit_hypothesis(stub("h1"), Tier::Auxiliary).unwrap();

        // Thin validation keeps it in TESTING.
        f.lifecycle.submit_validation(
            "h1",
            ValidationStats {
                win_rate: 0.6,
                sample_count: 50,
            },
        );
        assert!(f.lifecycle.sweep(now_ms()).is_empty());

        f.lifecycle.submit_validation(
            "h1",
            ValidationStats {
                win_rate: 0.53,
                sample_count: 150,
            },
        );
        let events = f.lifecycle.sweep(now_ms());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].to, LifecycleStatus::Shadow);
        assert_eq!(f.panel.record("h1").unwrap().status, LifecycleStatus::Shadow);
    }

    #[test]
    fn active_strategy_degrades_below_grade_c() {
        let f = fixture();
        f.panel.register(stub("w"), Tier::Auxiliary).unwrap();
        f.panel.set_status("w", LifecycleStatus::Active, "test").unwrap();

        feed_health(&f.health, "w", 12, 20); // 37.5% → D
        let events = f.lifecycle.sweep(now_ms());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].to, LifecycleStatus::Degraded);
    }

    #[test]
    fn degraded_strategy_recovers_at_grade_b() {
        let f = fixture();
        f.panel.register(stub("w"), Tier::Auxiliary).unwrap();
        f.panel.set_status("w", LifecycleStatus::Degraded, "test").unwrap();

        feed_health(&f.health, "w", 30, 20); // 60% → A over 50 samples
        let events = f.lifecycle.sweep(now_ms());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].to, LifecycleStatus::Active);
    }

    #[test]
    fn degraded_strategy_retires_after_the_window() {
        let f = fixture();
        f.panel.register(stub("w"), Tier::Auxiliary).unwrap();
        f.panel.set_status("w", LifecycleStatus::Degraded, "test").unwrap();
        feed_health(&f.health, "w", 10, 30); // stays D

        // Inside the window: nothing.
        assert!(f.lifecycle.sweep(now_ms()).is_empty());

        // Pretend the degradation started 31 days ago.
        f.panel
            .update_record("w", |r| {
                r.degraded_since = Some(now_ms() - 31 * 24 * 3_600_000)
            })
            .unwrap();
        let events = f.lifecycle.sweep(now_ms());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].to, LifecycleStatus::Retired);

        // Absorbing: nothing further happens to it.
        assert!(f.lifecycle.sweep(now_ms()).is_empty());
    }

    #[test]
    fn shadow_promotion_needs_evidence_and_approval() {
        let f = fixture();
        f.panel.register(stub("s"), Tier::Auxiliary).unwrap();
        f.panel.set_status("s", LifecycleStatus::Shadow, "test").unwrap();

        // No shadow record yet: refused.
        assert!(matches!(
            f.lifecycle.promote_to_active("s", "operator"),
            Err(LifecycleError::NotEligible { .. })
        ));

        // Build a winning shadow record past the bar.
        let base = now_ms() - 10 * 3_600_000;
        for i in 0..120 {
            let ts = base + i * 1_000;
            f.shadow.record(
                Claim::new("s", ClaimType::MarketEligible, 0.7, 600, Direction::Long, ts),
                100.0,
                ts,
            );
        }
        f.shadow.resolve(110.0, now_ms());

        f.lifecycle.promote_to_active("s", "operator").unwrap();
        assert_eq!(f.panel.record("s").unwrap().status, LifecycleStatus::Active);
    }

    #[test]
    fn shadow_promotion_lands_at_auxiliary_tier() {
        let f = fixture();
        f.panel.register(stub("s"), Tier::Core).unwrap();
        f.panel.set_status("s", LifecycleStatus::Shadow, "test").unwrap();

        let base = now_ms() - 10 * 3_600_000;
        for i in 0..120 {
            let ts = base + i * 1_000;
            f.shadow.record(
                Claim::new("s", ClaimType::MarketEligible, 0.7, 600, Direction::Long, ts),
                100.0,
                ts,
            );
        }
        f.shadow.resolve(110.0, now_ms());

        f.lifecycle.promote_to_active("s", "operator").unwrap();
        let record = f.panel.record("s").unwrap();
        assert_eq!(record.tier, Tier::Auxiliary);
        assert_eq!(record.status, LifecycleStatus::Active);
    }

    #[test]
    fn core_promotion_requires_a_long_grade_a_streak() {
        let f = fixture();
        f.panel.register(stub("w"), Tier::Auxiliary).unwrap();
        f.panel.set_status("w", LifecycleStatus::Active, "test").unwrap();
        feed_health(&f.health, "w", 30, 18); // 62.5% → A

        // Sweep stamps the streak start as now; too fresh to qualify.
        f.lifecycle.sweep(now_ms());
        assert!(matches!(
            f.lifecycle.promote_to_core("w", "operator", now_ms()),
            Err(LifecycleError::NotEligible { .. })
        ));

        // Backdate the streak past the qualification window.
        f.panel
            .update_record("w", |r| {
                r.grade_a_since = Some(now_ms() - 31 * 24 * 3_600_000)
            })
            .unwrap();
        f.lifecycle.promote_to_core("w", "operator", now_ms()).unwrap();
        assert_eq!(f.panel.record("w").unwrap().tier, Tier::Core);
    }

    #[test]
    fn grade_slip_resets_the_streak() {
        let f = fixture();
        f.panel.register(stub("w"), Tier::Auxiliary).unwrap();
        f.panel.set_status("w", LifecycleStatus::Active, "test").unwrap();
        feed_health(&f.health, "w", 30, 18); // A
        f.lifecycle.sweep(now_ms());
        assert!(f.panel.record("w").unwrap().grade_a_since.is_some());

        feed_health(&f.health, "w", 0, 20); // drops out of A
        f.lifecycle.sweep(now_ms());
        assert!(f.panel.record("w").unwrap().grade_a_since.is_none());
    }

    #[test]
    fn veto_witnesses_bypass_the_sweep() {
        let f = fixture();
        f.panel.register(stub("guard"), Tier::Veto).unwrap();
        feed_health(&f.health, "guard", 0, 60); // terrible record
        let events = f.lifecycle.sweep(now_ms());
        assert!(events.is_empty());
        assert_eq!(
            f.panel.record("guard").unwrap().status,
            LifecycleStatus::Active
        );
    }
}
