// =============================================================================
// Risk Engine — five domain checkers behind one approve/deny verdict
// =============================================================================
//
// Every checker runs on every evaluation; the verdict carries the maximum
// severity any of them reported.  A RISK_LOCKED level from any domain denies
// the decision and forces the system-wide lock.  Thresholds are operator
// property: the engine reads them, nothing in the engine writes them.
// =============================================================================

mod checks;
mod context;

pub use checks::{
    AccountSurvivalChecker, BehaviorChecker, ExecutionIntegrityChecker, RegimeChecker,
    SystemChecker,
};
pub use context::{AccountTracker, LoopRiskInputs, RiskContext, TradeRecord};

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::RiskThresholds;

// ---------------------------------------------------------------------------
// Levels and results
// ---------------------------------------------------------------------------

/// Severity ladder.  Ordering matters: verdict aggregation takes the max.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskLevel {
    Normal,
    Warning,
    Cooldown,
    RiskLocked,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Warning => write!(f, "WARNING"),
            Self::Cooldown => write!(f, "COOLDOWN"),
            Self::RiskLocked => write!(f, "RISK_LOCKED"),
        }
    }
}

/// The five risk domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskDomain {
    AccountSurvival,
    ExecutionIntegrity,
    Regime,
    Behavior,
    System,
}

impl std::fmt::Display for RiskDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccountSurvival => write!(f, "ACCOUNT_SURVIVAL"),
            Self::ExecutionIntegrity => write!(f, "EXECUTION_INTEGRITY"),
            Self::Regime => write!(f, "REGIME"),
            Self::Behavior => write!(f, "BEHAVIOR"),
            Self::System => write!(f, "SYSTEM"),
        }
    }
}

/// Verdict from a single domain checker.
#[derive(Debug, Clone, Serialize)]
pub struct DomainCheck {
    pub domain: RiskDomain,
    pub approved: bool,
    pub level: RiskLevel,
    pub reason: Option<String>,
}

impl DomainCheck {
    pub fn pass(domain: RiskDomain) -> Self {
        Self {
            domain,
            approved: true,
            level: RiskLevel::Normal,
            reason: None,
        }
    }

    pub fn warn(domain: RiskDomain, reason: impl Into<String>) -> Self {
        Self {
            domain,
            approved: true,
            level: RiskLevel::Warning,
            reason: Some(reason.into()),
        }
    }

    pub fn deny(domain: RiskDomain, level: RiskLevel, reason: impl Into<String>) -> Self {
        Self {
            domain,
            approved: false,
            level,
            reason: Some(reason.into()),
        }
    }
}

/// Unified verdict across all domains.
#[derive(Debug, Clone, Serialize)]
pub struct RiskCheckResult {
    pub approved: bool,
    pub level: RiskLevel,
    pub reason: Option<String>,
    pub domains: Vec<DomainCheck>,
}

impl RiskCheckResult {
    pub fn forces_lock(&self) -> bool {
        self.level == RiskLevel::RiskLocked
    }
}

// ---------------------------------------------------------------------------
// Checker contract and engine
// ---------------------------------------------------------------------------

/// A single risk domain: a value with one `check` entry point, composed into
/// the engine as a list.
pub trait RiskChecker: Send + Sync {
    fn domain(&self) -> RiskDomain;
    fn check(&self, ctx: &RiskContext) -> DomainCheck;
}

pub struct RiskEngine {
    checkers: Vec<Box<dyn RiskChecker>>,
    thresholds: Arc<RiskThresholds>,
}

impl RiskEngine {
    /// Engine with the standard five domains.
    pub fn new(thresholds: RiskThresholds) -> Self {
        let thresholds = Arc::new(thresholds);
        let checkers: Vec<Box<dyn RiskChecker>> = vec![
            Box::new(AccountSurvivalChecker::new(Arc::clone(&thresholds))),
            Box::new(ExecutionIntegrityChecker::new(Arc::clone(&thresholds))),
            Box::new(RegimeChecker::new(Arc::clone(&thresholds))),
            Box::new(BehaviorChecker::new(Arc::clone(&thresholds))),
            Box::new(SystemChecker::new(Arc::clone(&thresholds))),
        ];
        Self {
            checkers,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    /// Run every checker against one read-only context snapshot and fold the
    /// results to the maximum severity.
    pub fn evaluate(&self, ctx: &RiskContext) -> RiskCheckResult {
        let domains: Vec<DomainCheck> = self.checkers.iter().map(|c| c.check(ctx)).collect();

        let level = domains
            .iter()
            .map(|d| d.level)
            .max()
            .unwrap_or(RiskLevel::Normal);
        let approved = domains.iter().all(|d| d.approved);
        let reason = domains
            .iter()
            .filter(|d| !d.approved || d.level > RiskLevel::Normal)
            .max_by_key(|d| d.level)
            .and_then(|d| d.reason.clone());

        if !approved {
            warn!(%level, reason = reason.as_deref().unwrap_or("-"), "risk check denied");
        } else {
            debug!(%level, "risk check approved");
        }

        RiskCheckResult {
            approved,
            level,
            reason,
            domains,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;

    fn healthy_ctx() -> RiskContext {
        let mut ctx = RiskContext::neutral(10_000.0);
        ctx.current_drawdown = 0.02;
        ctx.daily_pnl_pct = 0.01;
        ctx.weekly_pnl_pct = 0.02;
        ctx.open_position_fraction = 0.05;
        ctx.proposed_position_fraction = 0.02;
        ctx.leverage = 2.0;
        ctx.proposed_direction = Direction::Long;
        ctx.trades_last_hour = 1;
        ctx.data_age_ms = 10_000;
        ctx
    }

    #[test]
    fn healthy_context_approves_normal() {
        let engine = RiskEngine::new(RiskThresholds::default());
        let verdict = engine.evaluate(&healthy_ctx());
        assert!(verdict.approved);
        assert_eq!(verdict.level, RiskLevel::Normal);
        assert_eq!(verdict.domains.len(), 5);
    }

    #[test]
    fn verdict_takes_max_severity() {
        let engine = RiskEngine::new(RiskThresholds::default());
        let mut ctx = healthy_ctx();
        ctx.consecutive_losses = 3; // behavior cooldown
        ctx.current_drawdown = 0.25; // account lock
        let verdict = engine.evaluate(&ctx);
        assert!(!verdict.approved);
        assert_eq!(verdict.level, RiskLevel::RiskLocked);
        assert!(verdict.forces_lock());
    }

    #[test]
    fn drawdown_breach_locks() {
        let engine = RiskEngine::new(RiskThresholds::default());
        let mut ctx = healthy_ctx();
        ctx.current_drawdown = 0.21;
        let verdict = engine.evaluate(&ctx);
        assert!(!verdict.approved);
        assert_eq!(verdict.level, RiskLevel::RiskLocked);
    }

    #[test]
    fn daily_loss_breach_cools_down() {
        let engine = RiskEngine::new(RiskThresholds::default());
        let mut ctx = healthy_ctx();
        ctx.daily_pnl_pct = -0.035;
        let verdict = engine.evaluate(&ctx);
        assert!(!verdict.approved);
        assert_eq!(verdict.level, RiskLevel::Cooldown);
    }

    #[test]
    fn weekly_loss_breach_locks() {
        let engine = RiskEngine::new(RiskThresholds::default());
        let mut ctx = healthy_ctx();
        ctx.weekly_pnl_pct = -0.12;
        let verdict = engine.evaluate(&ctx);
        assert!(!verdict.approved);
        assert_eq!(verdict.level, RiskLevel::RiskLocked);
    }

    #[test]
    fn oversized_position_denies() {
        let engine = RiskEngine::new(RiskThresholds::default());
        let mut ctx = healthy_ctx();
        ctx.proposed_position_fraction = 0.06;
        let verdict = engine.evaluate(&ctx);
        assert!(!verdict.approved);

        let mut ctx = healthy_ctx();
        ctx.open_position_fraction = 0.29;
        ctx.proposed_position_fraction = 0.03;
        let verdict = engine.evaluate(&ctx);
        assert!(!verdict.approved);
    }

    #[test]
    fn excess_leverage_denies() {
        let engine = RiskEngine::new(RiskThresholds::default());
        let mut ctx = healthy_ctx();
        ctx.leverage = 7.5;
        let verdict = engine.evaluate(&ctx);
        assert!(!verdict.approved);
    }

    #[test]
    fn consecutive_losses_cool_down() {
        let engine = RiskEngine::new(RiskThresholds::default());
        let mut ctx = healthy_ctx();
        ctx.consecutive_losses = 3;
        let verdict = engine.evaluate(&ctx);
        assert!(!verdict.approved);
        assert_eq!(verdict.level, RiskLevel::Cooldown);
    }

    #[test]
    fn stale_data_denies_via_system_domain() {
        let engine = RiskEngine::new(RiskThresholds::default());
        let mut ctx = healthy_ctx();
        ctx.data_age_ms = 2_000_000;
        let verdict = engine.evaluate(&ctx);
        assert!(!verdict.approved);
        let system = verdict
            .domains
            .iter()
            .find(|d| d.domain == RiskDomain::System)
            .unwrap();
        assert!(!system.approved);
    }

    #[test]
    fn approaching_limits_warns_but_approves() {
        let engine = RiskEngine::new(RiskThresholds::default());
        let mut ctx = healthy_ctx();
        ctx.current_drawdown = 0.17; // > 80% of the 0.20 limit
        let verdict = engine.evaluate(&ctx);
        assert!(verdict.approved);
        assert_eq!(verdict.level, RiskLevel::Warning);
    }
}
