// =============================================================================
// Domain checkers — account survival, execution integrity, regime, behavior,
// system
// =============================================================================
//
// Each checker is a value over the shared threshold table with a single
// `check` entry point.  Denials carry the level the state machine should act
// on: Warning refuses without side effects, Cooldown imposes a pause,
// RiskLocked forces the global lock.
// =============================================================================

use std::sync::Arc;

use crate::config::RiskThresholds;
use crate::health::Grade;

use super::{DomainCheck, RiskChecker, RiskContext, RiskDomain, RiskLevel};

/// Fraction of a hard limit at which checkers start warning.
const WARN_FRACTION: f64 = 0.8;
/// Trades within one hour before the behavior checker calls overtrading.
const MAX_TRADES_PER_HOUR: u32 = 6;
/// Consecutive order timeouts tolerated before execution integrity denies.
const MAX_CONSECUTIVE_TIMEOUTS: u32 = 3;
/// Recent order rejects tolerated before execution integrity denies.
const MAX_RECENT_REJECTS: u32 = 3;

// ---------------------------------------------------------------------------
// Account survival
// ---------------------------------------------------------------------------

/// Capital preservation: drawdown, daily/weekly loss, position caps, leverage.
pub struct AccountSurvivalChecker {
    thresholds: Arc<RiskThresholds>,
}

impl AccountSurvivalChecker {
    pub fn new(thresholds: Arc<RiskThresholds>) -> Self {
        Self { thresholds }
    }
}

impl RiskChecker for AccountSurvivalChecker {
    fn domain(&self) -> RiskDomain {
        RiskDomain::AccountSurvival
    }

    fn check(&self, ctx: &RiskContext) -> DomainCheck {
        let t = &self.thresholds;
        let domain = self.domain();

        if ctx.current_drawdown >= t.max_drawdown {
            return DomainCheck::deny(
                domain,
                RiskLevel::RiskLocked,
                format!(
                    "drawdown {:.1}% breached the {:.1}% limit",
                    ctx.current_drawdown * 100.0,
                    t.max_drawdown * 100.0
                ),
            );
        }

        if -ctx.weekly_pnl_pct >= t.weekly_max_loss {
            return DomainCheck::deny(
                domain,
                RiskLevel::RiskLocked,
                format!(
                    "weekly loss {:.1}% breached the {:.1}% limit",
                    -ctx.weekly_pnl_pct * 100.0,
                    t.weekly_max_loss * 100.0
                ),
            );
        }

        if -ctx.daily_pnl_pct >= t.daily_max_loss {
            return DomainCheck::deny(
                domain,
                RiskLevel::Cooldown,
                format!(
                    "daily loss {:.1}% breached the {:.1}% limit",
                    -ctx.daily_pnl_pct * 100.0,
                    t.daily_max_loss * 100.0
                ),
            );
        }

        if ctx.proposed_position_fraction > t.max_single_position {
            return DomainCheck::deny(
                domain,
                RiskLevel::Warning,
                format!(
                    "proposed position {:.1}% exceeds the {:.1}% single-position cap",
                    ctx.proposed_position_fraction * 100.0,
                    t.max_single_position * 100.0
                ),
            );
        }

        if ctx.open_position_fraction + ctx.proposed_position_fraction > t.max_total_position {
            return DomainCheck::deny(
                domain,
                RiskLevel::Warning,
                format!(
                    "total exposure would reach {:.1}% against the {:.1}% cap",
                    (ctx.open_position_fraction + ctx.proposed_position_fraction) * 100.0,
                    t.max_total_position * 100.0
                ),
            );
        }

        if ctx.leverage > t.max_leverage {
            return DomainCheck::deny(
                domain,
                RiskLevel::Warning,
                format!("leverage {:.1}x exceeds the {:.1}x cap", ctx.leverage, t.max_leverage),
            );
        }

        if ctx.current_drawdown >= t.max_drawdown * WARN_FRACTION {
            return DomainCheck::warn(
                domain,
                format!("drawdown {:.1}% approaching the limit", ctx.current_drawdown * 100.0),
            );
        }

        DomainCheck::pass(domain)
    }
}

// ---------------------------------------------------------------------------
// Execution integrity
// ---------------------------------------------------------------------------

/// Exchange-side health: timeout streaks and reject streaks.
pub struct ExecutionIntegrityChecker {
    #[allow(dead_code)]
    thresholds: Arc<RiskThresholds>,
}

impl ExecutionIntegrityChecker {
    pub fn new(thresholds: Arc<RiskThresholds>) -> Self {
        Self { thresholds }
    }
}

impl RiskChecker for ExecutionIntegrityChecker {
    fn domain(&self) -> RiskDomain {
        RiskDomain::ExecutionIntegrity
    }

    fn check(&self, ctx: &RiskContext) -> DomainCheck {
        let domain = self.domain();

        if ctx.consecutive_timeouts >= MAX_CONSECUTIVE_TIMEOUTS {
            return DomainCheck::deny(
                domain,
                RiskLevel::Cooldown,
                format!("{} consecutive order timeouts", ctx.consecutive_timeouts),
            );
        }

        if ctx.recent_rejects >= MAX_RECENT_REJECTS {
            return DomainCheck::deny(
                domain,
                RiskLevel::Cooldown,
                format!("{} recent order rejects", ctx.recent_rejects),
            );
        }

        if ctx.consecutive_timeouts > 0 {
            return DomainCheck::warn(
                domain,
                format!("{} consecutive order timeouts", ctx.consecutive_timeouts),
            );
        }

        DomainCheck::pass(domain)
    }
}

// ---------------------------------------------------------------------------
// Regime
// ---------------------------------------------------------------------------

/// Market-mode sanity: no flip-flopping against an open position, and a weak
/// dominant witness only warns, it never trades at full conviction silently.
pub struct RegimeChecker {
    #[allow(dead_code)]
    thresholds: Arc<RiskThresholds>,
}

impl RegimeChecker {
    pub fn new(thresholds: Arc<RiskThresholds>) -> Self {
        Self { thresholds }
    }
}

impl RiskChecker for RegimeChecker {
    fn domain(&self) -> RiskDomain {
        RiskDomain::Regime
    }

    fn check(&self, ctx: &RiskContext) -> DomainCheck {
        let domain = self.domain();

        if ctx.position_direction.is_directional()
            && ctx.proposed_direction.is_directional()
            && ctx.proposed_direction == ctx.position_direction.opposite()
        {
            return DomainCheck::deny(
                domain,
                RiskLevel::Cooldown,
                format!(
                    "proposed {} against an open {} position",
                    ctx.proposed_direction, ctx.position_direction
                ),
            );
        }

        if let Some(id) = &ctx.proposed_strategy_id {
            if let Some(health) = ctx.witness_health.get(id) {
                if health.grade >= Grade::C && health.sample_count > 0 {
                    return DomainCheck::warn(
                        domain,
                        format!("dominant witness {id} is graded {}", health.grade),
                    );
                }
            }
        }

        DomainCheck::pass(domain)
    }
}

// ---------------------------------------------------------------------------
// Behavior
// ---------------------------------------------------------------------------

/// Discipline: loss streaks, overtrading, and externally imposed cooldowns.
pub struct BehaviorChecker {
    thresholds: Arc<RiskThresholds>,
}

impl BehaviorChecker {
    pub fn new(thresholds: Arc<RiskThresholds>) -> Self {
        Self { thresholds }
    }
}

impl RiskChecker for BehaviorChecker {
    fn domain(&self) -> RiskDomain {
        RiskDomain::Behavior
    }

    fn check(&self, ctx: &RiskContext) -> DomainCheck {
        let domain = self.domain();

        if ctx.cooldown_remaining_secs > 0 {
            return DomainCheck::deny(
                domain,
                RiskLevel::Cooldown,
                format!("trading cooldown active for {}s", ctx.cooldown_remaining_secs),
            );
        }

        if ctx.consecutive_losses >= self.thresholds.consecutive_loss_limit {
            return DomainCheck::deny(
                domain,
                RiskLevel::Cooldown,
                format!("{} consecutive losses", ctx.consecutive_losses),
            );
        }

        if ctx.trades_last_hour > MAX_TRADES_PER_HOUR {
            return DomainCheck::deny(
                domain,
                RiskLevel::Cooldown,
                format!("{} trades in the last hour", ctx.trades_last_hour),
            );
        }

        DomainCheck::pass(domain)
    }
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// Platform health: stale data and degenerate account states.
pub struct SystemChecker {
    thresholds: Arc<RiskThresholds>,
}

impl SystemChecker {
    pub fn new(thresholds: Arc<RiskThresholds>) -> Self {
        Self { thresholds }
    }
}

impl RiskChecker for SystemChecker {
    fn domain(&self) -> RiskDomain {
        RiskDomain::System
    }

    fn check(&self, ctx: &RiskContext) -> DomainCheck {
        let domain = self.domain();

        if ctx.equity <= 0.0 {
            return DomainCheck::deny(domain, RiskLevel::RiskLocked, "equity exhausted");
        }

        if ctx.data_age_ms > self.thresholds.max_data_age_ms {
            return DomainCheck::deny(
                domain,
                RiskLevel::Cooldown,
                format!(
                    "market data is {}s old (limit {}s)",
                    ctx.data_age_ms / 1_000,
                    self.thresholds.max_data_age_ms / 1_000
                ),
            );
        }

        DomainCheck::pass(domain)
    }
}
