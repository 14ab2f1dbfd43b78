// =============================================================================
// Decision Loop — bars → claims → aggregation → risk → state → fan-out
// =============================================================================
//
// One loop is strictly sequential: claims are observed before aggregation,
// aggregation before risk, risk before the state transition, the transition
// before the user fan-out.  Loops never overlap; the fan-out inside a loop
// is the only parallel section.  Loop-level data errors skip the loop,
// state-machine rejections abort it, and both leave the engine ready for the
// next bar.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregator::ResolutionReason;
use crate::witness::Witness;
use crate::app_state::EngineState;
use crate::audit::AuditStream;
use crate::executor::TradeDecision;
use crate::market::{interval_ms, BarKey, MarketDataSource};
use crate::risk::{LoopRiskInputs, RiskLevel};
use crate::state_machine::SystemState;
use crate::types::{now_ms, LifecycleStatus, Tier};
use crate::witness::{builtin_witnesses, EventWitness};

/// Bars handed to the panel each loop.
const LOOKBACK_BARS: usize = 60;

/// What one pass of the loop did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The machine is not in OBSERVING; nothing to decide.
    NotReady(SystemState),
    /// Market data missing or failed validation; loop skipped.
    SkippedData,
    /// The claim set did not resolve into a tradeable decision.
    NotTradeable(ResolutionReason),
    /// Risk denied below lock severity; no transition happened.
    RiskDenied(RiskLevel),
    /// Risk forced the global lock.
    Locked,
    /// A state transition was rejected; the loop aborted.
    Aborted,
    /// The decision was broadcast.
    Executed { decision_id: String, users: usize },
}

/// Register the stock witness panel and activate it.
pub fn register_builtin_panel(state: &Arc<EngineState>) {
    for (witness, tier) in builtin_witnesses() {
        let id = witness.id().to_string();
        let witness: Arc<EventWitness> = Arc::new(witness);
        match state.panel.register(witness, tier) {
            Ok(()) => {
                if tier != Tier::Veto {
                    let _ = state
                        .panel
                        .set_status(&id, LifecycleStatus::Active, "stock panel activation");
                }
            }
            Err(e) => warn!(witness = %id, error = %e, "builtin witness registration failed"),
        }
    }
    info!(
        core = state.panel.list_by_tier(Tier::Core).len(),
        auxiliary = state.panel.list_by_tier(Tier::Auxiliary).len(),
        veto = state.panel.list_by_tier(Tier::Veto).len(),
        "witness panel registered"
    );
}

/// Run one decision loop.
pub async fn run_once(state: &Arc<EngineState>) -> LoopOutcome {
    let seq = state.next_loop_seq();
    let correlation_id = format!("loop-{seq}-{}", Uuid::new_v4());

    let (symbol, interval, budget_ms, deadline_ms, cooldown_secs) = {
        let cfg = state.config.read();
        (
            cfg.symbol.clone(),
            cfg.interval.clone(),
            cfg.witness_budget_ms,
            cfg.decision_deadline_ms,
            cfg.risk.normal_cooldown_secs,
        )
    };
    let bar_ms = interval_ms(&interval).unwrap_or(300_000);
    let now = now_ms();
    let key = BarKey::new(&symbol, &interval);

    // ── 1. Timers and matured positions ──────────────────────────────────
    state.machine.tick(&correlation_id);
    if let Some(price) = state.bars.last_price(&key) {
        state.settle_decisions_older_than(cooldown_secs, price);
    }

    let current = state.machine.current();
    if current != SystemState::Observing {
        return LoopOutcome::NotReady(current);
    }

    // ── 2. Market data ───────────────────────────────────────────────────
    let since = now - (LOOKBACK_BARS as i64 + 1) * bar_ms;
    let bars = match state.bars.get_bars(&symbol, &interval, since, now) {
        Ok(bars) => bars,
        Err(e) => {
            debug!(error = %e, "loop skipped: no usable bars");
            return LoopOutcome::SkippedData;
        }
    };
    let last_bar = match bars.last() {
        Some(bar) => bar.clone(),
        None => return LoopOutcome::SkippedData,
    };
    let data_age_ms = (now - last_bar.close_time).max(0);

    // ── 3. Claims ────────────────────────────────────────────────────────
    let collected = state
        .panel
        .collect(&bars, Duration::from_millis(budget_ms));
    if collected.errors > 0 || collected.skipped_budget > 0 {
        debug!(
            errors = collected.errors,
            skipped = collected.skipped_budget,
            "panel collection degraded"
        );
    }
    for claim in collected.shadow {
        state.shadow.record(claim, last_bar.close, now);
    }

    // ── 4. Aggregation against a stable weight snapshot ──────────────────
    let ids: Vec<String> = collected
        .active
        .iter()
        .map(|rc| rc.claim.strategy_id.clone())
        .collect();
    let weights = state.weights.snapshot(&ids);
    let result = state.aggregator.aggregate(&collected.active, &weights, now);

    state.audit.record(
        AuditStream::Decisions,
        "engine",
        &correlation_id,
        json!({
            "event": "aggregated",
            "resolution": result.resolution_reason.to_string(),
            "direction": result.dominant_direction.to_string(),
            "total_confidence": result.total_confidence,
            "veto_strategy_id": result.veto_strategy_id,
            "dominant_strategy_id": result.dominant_strategy_id,
        }),
    );

    if !result.is_tradeable {
        return LoopOutcome::NotTradeable(result.resolution_reason);
    }

    // ── 5. Risk gate ─────────────────────────────────────────────────────
    let ctx = state.account.context(LoopRiskInputs {
        proposed_direction: Some(result.dominant_direction),
        proposed_strategy_id: result.dominant_strategy_id.clone(),
        data_age_ms,
        witness_health: state.health.all(),
        cooldown_remaining_secs: state.machine.cooldown_remaining_secs(),
        ..Default::default()
    });
    let verdict = state.risk.evaluate(&ctx);

    if !verdict.approved || verdict.level > RiskLevel::Normal {
        state.audit.record(
            AuditStream::RiskEvents,
            "risk_engine",
            &correlation_id,
            json!({
                "approved": verdict.approved,
                "level": verdict.level.to_string(),
                "reason": verdict.reason,
            }),
        );
    }

    if verdict.forces_lock() {
        let reason = verdict.reason.as_deref().unwrap_or("risk lock");
        state.machine.force_risk_lock(reason, &correlation_id);
        return LoopOutcome::Locked;
    }
    if !verdict.approved {
        return LoopOutcome::RiskDenied(verdict.level);
    }

    // ── 6. State transitions ─────────────────────────────────────────────
    if state
        .machine
        .transition(
            SystemState::Eligible,
            "aggregated tradeable and risk approved",
            "engine",
            &correlation_id,
        )
        .is_err()
    {
        return LoopOutcome::Aborted;
    }
    state.machine.set_regime(result.regime);
    if state
        .machine
        .transition(
            SystemState::ActiveTrading,
            "execution authorized",
            "engine",
            &correlation_id,
        )
        .is_err()
    {
        return LoopOutcome::Aborted;
    }

    // ── 7. Fan-out ───────────────────────────────────────────────────────
    let decision = TradeDecision {
        decision_id: correlation_id.clone(),
        symbol: symbol.clone(),
        direction: result.dominant_direction,
        confidence: result.total_confidence,
        regime: result.regime,
        reference_price: last_bar.close,
    };

    info!(
        decision = %decision.decision_id,
        direction = %decision.direction,
        confidence = decision.confidence,
        regime = %decision.regime,
        "decision authorized; broadcasting to users"
    );

    let results = state
        .executor
        .fan_out(&decision, Duration::from_millis(deadline_ms), None)
        .await;

    state.open_decision(
        &decision.decision_id,
        &decision.symbol,
        decision.direction,
        decision.reference_price,
        result.contributors.clone(),
        &results,
    );

    // ── 8. Settle into cooldown ──────────────────────────────────────────
    let _ = state.machine.settle_into_cooldown(
        cooldown_secs,
        "execution settled",
        "engine",
        &correlation_id,
    );

    LoopOutcome::Executed {
        decision_id: decision.decision_id,
        users: results.len(),
    }
}

/// One pass of the shadow evaluation loop: score every matured entry.
pub fn shadow_tick(state: &Arc<EngineState>) {
    let (symbol, interval) = {
        let cfg = state.config.read();
        (cfg.symbol.clone(), cfg.interval.clone())
    };
    if let Some(price) = state.bars.last_price(&BarKey::new(&symbol, &interval)) {
        state.shadow.resolve(price, now_ms());
    }
}
