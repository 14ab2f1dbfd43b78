// =============================================================================
// Engine State — the owned component graph of the decision core
// =============================================================================
//
// One value ties the subsystems together: the panel owns witnesses, the
// weight manager owns the weight table, the state machine owns the trading
// posture, the executor owns the user map.  Everything is constructed once
// here and passed by reference; nothing re-creates a manager mid-flight.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::aggregator::Aggregator;
use crate::audit::{AuditLog, AuditStream};
use crate::config::EngineConfig;
use crate::executor::{ExecutionResult, UserExecutor};
use crate::health::{HealthManager, HealthUpdate};
use crate::lifecycle::LifecycleManager;
use crate::market::BarBuffer;
use crate::risk::{AccountTracker, RiskEngine, TradeRecord};
use crate::shadow::ShadowRecorder;
use crate::state_machine::StateMachine;
use crate::types::{now_ms, Direction};
use crate::weights::WeightManager;
use crate::witness::WitnessPanel;

/// Closed bars retained per series.
const BAR_CAPACITY: usize = 500;

/// A decision whose position is still open, kept for outcome attribution.
#[derive(Debug, Clone, Serialize)]
pub struct OpenDecision {
    pub decision_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    /// Witnesses that argued for this direction; outcomes land on them.
    pub contributors: Vec<String>,
    /// Filled notional per user.
    pub user_notionals: Vec<(String, f64)>,
    pub opened_at_ms: i64,
}

/// Central component graph shared across all engine tasks via `Arc`.
pub struct EngineState {
    pub config: RwLock<EngineConfig>,
    pub bars: Arc<BarBuffer>,
    pub panel: Arc<WitnessPanel>,
    pub health: Arc<HealthManager>,
    pub weights: Arc<WeightManager>,
    pub aggregator: Aggregator,
    pub risk: Arc<RiskEngine>,
    pub machine: Arc<StateMachine>,
    pub executor: Arc<UserExecutor>,
    pub shadow: Arc<ShadowRecorder>,
    pub lifecycle: Arc<LifecycleManager>,
    pub audit: Arc<AuditLog>,
    pub account: Arc<AccountTracker>,
    open_decisions: RwLock<HashMap<String, OpenDecision>>,
    pub loop_seq: AtomicU64,
}

impl EngineState {
    /// Build the full component graph from configuration.
    pub fn new(config: EngineConfig, audit: Arc<AuditLog>) -> Arc<Self> {
        let starting_equity: f64 = config
            .users
            .iter()
            .map(|u| u.equity)
            .sum::<f64>()
            .max(1_000.0);

        let bar_ms = crate::market::interval_ms(&config.interval).unwrap_or(300_000);

        let panel = Arc::new(WitnessPanel::new());
        let health = Arc::new(HealthManager::new());
        let weights = Arc::new(WeightManager::new(
            config.weight_clamps.clone(),
            Arc::clone(&health),
            Arc::clone(&audit),
        ));
        let aggregator = Aggregator::new(config.tier2_base_factor, config.confidence_threshold);
        let risk = Arc::new(RiskEngine::new(config.risk.clone()));
        let machine = Arc::new(StateMachine::new(Arc::clone(&audit)));
        let executor = Arc::new(UserExecutor::new(Arc::clone(&risk), Arc::clone(&audit)));
        let shadow = Arc::new(ShadowRecorder::new(
            config.shadow_horizon_bars as i64 * bar_ms,
        ));
        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&panel),
            Arc::clone(&health),
            Arc::clone(&shadow),
            Arc::clone(&audit),
        ));

        Arc::new(Self {
            config: RwLock::new(config),
            bars: Arc::new(BarBuffer::new(BAR_CAPACITY)),
            panel,
            health,
            weights,
            aggregator,
            risk,
            machine,
            executor,
            shadow,
            lifecycle,
            audit,
            account: Arc::new(AccountTracker::new(starting_equity)),
            open_decisions: RwLock::new(HashMap::new()),
            loop_seq: AtomicU64::new(0),
        })
    }

    pub fn next_loop_seq(&self) -> u64 {
        self.loop_seq.fetch_add(1, Ordering::SeqCst)
    }

    // -------------------------------------------------------------------------
    // Decision journal
    // -------------------------------------------------------------------------

    /// Journal a freshly executed decision for later outcome attribution.
    pub fn open_decision(
        &self,
        decision_id: &str,
        symbol: &str,
        direction: Direction,
        entry_price: f64,
        contributors: Vec<String>,
        results: &[ExecutionResult],
    ) {
        let user_notionals: Vec<(String, f64)> = results
            .iter()
            .filter(|r| r.executed_quantity > 0.0)
            .map(|r| (r.user_id.clone(), r.executed_quantity * r.executed_price))
            .collect();

        if user_notionals.is_empty() {
            return;
        }

        self.open_decisions.write().insert(
            decision_id.to_string(),
            OpenDecision {
                decision_id: decision_id.to_string(),
                symbol: symbol.to_string(),
                direction,
                entry_price,
                contributors,
                user_notionals,
                opened_at_ms: now_ms(),
            },
        );
    }

    pub fn open_decision_count(&self) -> usize {
        self.open_decisions.read().len()
    }

    /// Settle every journaled decision older than `min_age_secs` against
    /// `current_price`: per-user P&L, account counters, and witness health
    /// attribution (with auto-mute when a witness's record collapses).
    pub fn settle_decisions_older_than(&self, min_age_secs: u64, current_price: f64) {
        let due: Vec<OpenDecision> = {
            let mut open = self.open_decisions.write();
            let cutoff = now_ms() - (min_age_secs as i64) * 1_000;
            let ids: Vec<String> = open
                .values()
                .filter(|d| d.opened_at_ms <= cutoff)
                .map(|d| d.decision_id.clone())
                .collect();
            ids.into_iter().filter_map(|id| open.remove(&id)).collect()
        };

        for decision in due {
            if decision.entry_price <= 0.0 || current_price <= 0.0 {
                continue;
            }
            let move_pct = (current_price - decision.entry_price) / decision.entry_price;
            let signed_move = match decision.direction {
                Direction::Long => move_pct,
                Direction::Short => -move_pct,
                Direction::Neutral => continue,
            };
            let win = signed_move > 0.0;

            let mut total_pnl = 0.0;
            for (user_id, notional) in &decision.user_notionals {
                let pnl = signed_move * notional;
                total_pnl += pnl;
                self.executor
                    .record_trade_close(user_id, pnl, &decision.decision_id);
            }

            self.account.record_trade(TradeRecord {
                symbol: decision.symbol.clone(),
                direction: decision.direction,
                pnl: total_pnl,
                timestamp_ms: now_ms(),
            });

            for contributor in &decision.contributors {
                if self.health.record_outcome(contributor, win) == HealthUpdate::AutoMute {
                    warn!(witness = %contributor, "auto-muting witness after sustained losses");
                    let _ = self
                        .panel
                        .set_muted(contributor, true, "health grade collapsed");
                }
            }

            info!(
                decision = %decision.decision_id,
                win,
                total_pnl,
                users = decision.user_notionals.len(),
                "decision settled"
            );
            self.audit.record(
                AuditStream::Decisions,
                "engine",
                &decision.decision_id,
                json!({
                    "event": "settled",
                    "win": win,
                    "total_pnl": total_pnl,
                    "exit_price": current_price,
                }),
            );
        }
    }
}
