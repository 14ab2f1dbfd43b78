// =============================================================================
// Per-User Executor — broadcast one authorized decision to isolated users
// =============================================================================
//
// The executor owns the user context map.  A fan-out moves each eligible
// context out of the map, into its own task, and back when the task settles,
// so exactly one task ever touches a user's credentials and risk state.
// Failure of one user never reaches another: every failure lands on that
// user's result flags and risk state only.
//
// Idempotency: order ids are derived from (decision, user); a replay returns
// the cached result without a second exchange call.
// =============================================================================

mod sizing;
mod user;

pub use sizing::{size_order, SizedOrder};
pub use user::{UserContext, UserRiskState, UserStatus};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditLog, AuditStream};
use crate::exchange::{ExchangeError, OrderRequest};
use crate::risk::{RiskContext, RiskEngine, RiskLevel};
use crate::types::{now_ms, Direction, ExecutionFlag, OrderStatus, TradeRegime};

/// Order timeouts tolerated before a user is locked.
const TIMEOUT_LOCK_STREAK: u32 = 3;

// ---------------------------------------------------------------------------
// Decision and result types
// ---------------------------------------------------------------------------

/// The abstract decision the state machine authorized, broadcast unchanged
/// to every eligible user.
#[derive(Debug, Clone, Serialize)]
pub struct TradeDecision {
    pub decision_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub confidence: f64,
    /// Advisory regime; users may not override the decision with it.
    pub regime: TradeRegime,
    pub reference_price: f64,
}

/// Immutable record of one user's execution attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub user_id: String,
    pub order_id: String,
    pub status: OrderStatus,
    pub executed_quantity: f64,
    pub executed_price: f64,
    /// Fractional distance between fill and reference price.
    pub slippage: f64,
    pub commission: f64,
    pub flags: Vec<ExecutionFlag>,
    pub timestamp: i64,
}

impl ExecutionResult {
    fn empty(user_id: &str, order_id: &str, status: OrderStatus) -> Self {
        Self {
            user_id: user_id.to_string(),
            order_id: order_id.to_string(),
            status,
            executed_quantity: 0.0,
            executed_price: 0.0,
            slippage: 0.0,
            commission: 0.0,
            flags: Vec::new(),
            timestamp: now_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

enum UserSlot {
    Available(Box<UserContext>),
    /// Moved into a fan-out task; back on settle.
    InFlight,
}

pub struct UserExecutor {
    users: Mutex<HashMap<String, UserSlot>>,
    /// Idempotency cache keyed by (user_id, order_id).
    completed: RwLock<HashMap<(String, String), ExecutionResult>>,
    risk: Arc<RiskEngine>,
    audit: Arc<AuditLog>,
}

impl UserExecutor {
    pub fn new(risk: Arc<RiskEngine>, audit: Arc<AuditLog>) -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            completed: RwLock::new(HashMap::new()),
            risk,
            audit,
        }
    }

    // -------------------------------------------------------------------------
    // User lifecycle
    // -------------------------------------------------------------------------

    /// Activate a user context.  Replaces any suspended context under the
    /// same id.
    pub fn activate(&self, ctx: UserContext) {
        let user_id = ctx.user_id.clone();
        self.users
            .lock()
            .insert(user_id.clone(), UserSlot::Available(Box::new(ctx)));
        info!(user = %user_id, "user context activated");
    }

    /// Suspend and destroy a user context (credentials are zeroed on drop).
    /// Returns false when the user is unknown or currently in flight.
    pub fn suspend(&self, user_id: &str) -> bool {
        let mut users = self.users.lock();
        match users.get(user_id) {
            Some(UserSlot::Available(_)) => {
                users.remove(user_id);
                info!(user = user_id, "user context suspended and destroyed");
                true
            }
            Some(UserSlot::InFlight) => {
                warn!(user = user_id, "suspend refused: execution in flight");
                false
            }
            None => false,
        }
    }

    pub fn user_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.users.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of one user's risk state (None while in flight or unknown).
    pub fn risk_state(&self, user_id: &str) -> Option<UserRiskState> {
        match self.users.lock().get(user_id) {
            Some(UserSlot::Available(ctx)) => Some(ctx.risk.clone()),
            _ => None,
        }
    }

    /// Record a settled close for one user and audit the profit stream.
    pub fn record_trade_close(&self, user_id: &str, pnl: f64, correlation_id: &str) -> bool {
        let mut users = self.users.lock();
        let Some(UserSlot::Available(ctx)) = users.get_mut(user_id) else {
            return false;
        };

        ctx.risk.daily_pnl += pnl;
        ctx.equity += pnl;
        if pnl < 0.0 {
            ctx.risk.consecutive_losses += 1;
        } else {
            ctx.risk.consecutive_losses = 0;
        }
        let equity = ctx.equity;
        drop(users);

        self.audit.record(
            AuditStream::UserProfits,
            "executor",
            correlation_id,
            json!({ "user_id": user_id, "pnl": pnl, "equity": equity }),
        );
        true
    }

    // -------------------------------------------------------------------------
    // Fan-out
    // -------------------------------------------------------------------------

    /// Broadcast `decision` to every eligible user and execute in parallel.
    ///
    /// Each task gets its own deadline; `cancel` (when supplied) abandons
    /// in-flight exchange calls while still writing their audit records.
    /// Results come back sorted by user id.
    pub async fn fan_out(
        &self,
        decision: &TradeDecision,
        deadline: Duration,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Vec<ExecutionResult> {
        // Keep a sender alive for the no-cancellation case so the watch
        // channel never closes underneath the tasks.
        let (_guard_tx, guard_rx) = watch::channel(false);
        let cancel_rx = cancel.unwrap_or(guard_rx);

        let mut results: Vec<ExecutionResult> = Vec::new();
        let mut handles = Vec::new();

        {
            let mut users = self.users.lock();
            let ids: Vec<String> = {
                let mut ids: Vec<String> = users.keys().cloned().collect();
                ids.sort();
                ids
            };

            for user_id in ids {
                let order_id = format!("{}:{}", decision.decision_id, user_id);

                // Idempotent replay: same user, same order id — return the
                // prior result, no exchange call.  The replay marker lets
                // callers tell the copy from the original.
                if let Some(prior) = self.completed.read().get(&(user_id.clone(), order_id.clone()))
                {
                    debug!(user = %user_id, order_id = %order_id, "duplicate submission replayed");
                    let mut replay = prior.clone();
                    if !replay.flags.contains(&ExecutionFlag::DuplicateReplay) {
                        replay.flags.push(ExecutionFlag::DuplicateReplay);
                    }
                    results.push(replay);
                    continue;
                }

                let Some(UserSlot::Available(ctx)) = users.get(&user_id) else {
                    continue;
                };

                // Eligibility filter; checks short-circuit in this order.
                if ctx.status != UserStatus::Active {
                    debug!(user = %user_id, "skipped: not active");
                    continue;
                }
                if !ctx.credentials.is_valid() {
                    debug!(user = %user_id, "skipped: invalid credentials");
                    continue;
                }
                if ctx.risk.is_locked {
                    debug!(user = %user_id, "skipped: user risk-locked");
                    continue;
                }
                if ctx.max_position_pct > ctx.subscription.max_position_fraction() {
                    debug!(
                        user = %user_id,
                        "skipped: subscription does not permit the implied position fraction"
                    );
                    continue;
                }

                // Transfer ownership of the context into the task.
                let Some(UserSlot::Available(ctx)) =
                    users.insert(user_id.clone(), UserSlot::InFlight)
                else {
                    unreachable!("slot verified available above");
                };

                let task = execute_for_user(
                    ctx,
                    order_id,
                    decision.clone(),
                    deadline,
                    cancel_rx.clone(),
                    Arc::clone(&self.risk),
                    Arc::clone(&self.audit),
                );
                handles.push(tokio::spawn(task));
            }
        }

        // Per-task deadlines bound this join.
        let settled = join_all(handles).await;

        let mut users = self.users.lock();
        for joined in settled {
            match joined {
                Ok((ctx, result)) => {
                    let user_id = ctx.user_id.clone();
                    users.insert(user_id.clone(), UserSlot::Available(ctx));
                    self.completed
                        .write()
                        .insert((user_id, result.order_id.clone()), result.clone());
                    results.push(result);
                }
                Err(e) => {
                    // A panicked task lost its context; drop the slot rather
                    // than leave a permanently in-flight user.
                    error!(error = %e, "fan-out task failed to settle");
                }
            }
        }
        users.retain(|_, slot| !matches!(slot, UserSlot::InFlight));
        drop(users);

        results.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        results
    }
}

// ---------------------------------------------------------------------------
// Per-user execution task
// ---------------------------------------------------------------------------

/// Resolves when the cancel signal fires; pends forever if the channel
/// closes without firing.
async fn wait_cancel(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn execute_for_user(
    mut ctx: Box<UserContext>,
    order_id: String,
    decision: TradeDecision,
    deadline: Duration,
    cancel: watch::Receiver<bool>,
    risk: Arc<RiskEngine>,
    audit: Arc<AuditLog>,
) -> (Box<UserContext>, ExecutionResult) {
    let user_id = ctx.user_id.clone();
    let correlation_id = decision.decision_id.clone();

    let sized = size_order(
        ctx.equity,
        ctx.max_position_pct,
        ctx.subscription,
        ctx.leverage,
        decision.reference_price,
    );

    let mut result = if sized.quantity <= 0.0 {
        ExecutionResult::empty(&user_id, &order_id, OrderStatus::Skipped)
    } else {
        // User-scoped risk check with the same checker set as the global gate.
        let mut rctx = RiskContext::neutral(ctx.equity);
        rctx.proposed_position_fraction = ctx.max_position_pct.min(
            ctx.subscription.max_position_fraction(),
        );
        rctx.leverage = ctx.leverage;
        rctx.proposed_direction = decision.direction;
        rctx.consecutive_losses = ctx.risk.consecutive_losses;
        rctx.consecutive_timeouts = ctx.risk.consecutive_timeouts;
        rctx.recent_rejects = ctx.risk.recent_rejects;
        rctx.daily_pnl_pct = if ctx.equity > 0.0 {
            ctx.risk.daily_pnl / ctx.equity
        } else {
            0.0
        };

        let verdict = risk.evaluate(&rctx);
        if !verdict.approved {
            let mut result = ExecutionResult::empty(&user_id, &order_id, OrderStatus::Skipped);
            result.flags.push(ExecutionFlag::UserRiskDenied);
            match verdict.level {
                RiskLevel::Cooldown => result.flags.push(ExecutionFlag::CooldownTriggered),
                RiskLevel::RiskLocked => {
                    ctx.risk.is_locked = true;
                    result.flags.push(ExecutionFlag::RiskLockedTriggered);
                }
                _ => {}
            }
            warn!(
                user = %user_id,
                level = %verdict.level,
                reason = verdict.reason.as_deref().unwrap_or("-"),
                "user risk check denied execution"
            );
            result
        } else {
            let request = OrderRequest {
                order_id: order_id.clone(),
                symbol: decision.symbol.clone(),
                direction: decision.direction,
                quantity: sized.quantity,
                price: None,
            };

            audit.record(
                AuditStream::Orders,
                "executor",
                &correlation_id,
                json!({
                    "user_id": user_id,
                    "order_id": order_id,
                    "symbol": request.symbol,
                    "direction": request.direction,
                    "quantity": request.quantity,
                }),
            );

            tokio::select! {
                _ = wait_cancel(cancel) => {
                    let mut result =
                        ExecutionResult::empty(&user_id, &order_id, OrderStatus::Canceled);
                    result.flags.push(ExecutionFlag::Canceled);
                    info!(user = %user_id, order_id = %order_id, "execution canceled");
                    result
                }
                outcome = tokio::time::timeout(deadline, ctx.client.place_order(&request)) => {
                    settle_exchange_outcome(&mut ctx, &user_id, &order_id, &decision, outcome)
                }
            }
        }
    };

    result.timestamp = now_ms();

    // The audit record is written for every outcome, cancellation included.
    audit.record(
        AuditStream::Executions,
        "executor",
        &correlation_id,
        json!({
            "user_id": result.user_id,
            "order_id": result.order_id,
            "status": result.status.to_string(),
            "executed_quantity": result.executed_quantity,
            "executed_price": result.executed_price,
            "slippage": result.slippage,
            "commission": result.commission,
            "flags": result.flags.iter().map(|f| f.to_string()).collect::<Vec<_>>(),
        }),
    );

    (ctx, result)
}

fn settle_exchange_outcome(
    ctx: &mut UserContext,
    user_id: &str,
    order_id: &str,
    decision: &TradeDecision,
    outcome: Result<
        Result<crate::exchange::ExchangeOrderResult, ExchangeError>,
        tokio::time::error::Elapsed,
    >,
) -> ExecutionResult {
    match outcome {
        Ok(Ok(fill)) => {
            ctx.risk.consecutive_timeouts = 0;
            ctx.risk.recent_rejects = 0;

            let slippage = if decision.reference_price > 0.0 {
                (fill.executed_price - decision.reference_price).abs() / decision.reference_price
            } else {
                0.0
            };

            info!(
                user = user_id,
                order_id,
                price = fill.executed_price,
                quantity = fill.executed_quantity,
                "order filled"
            );

            ExecutionResult {
                user_id: user_id.to_string(),
                order_id: order_id.to_string(),
                status: fill.status,
                executed_quantity: fill.executed_quantity,
                executed_price: fill.executed_price,
                slippage,
                commission: fill.commission,
                flags: Vec::new(),
                timestamp: now_ms(),
            }
        }
        Ok(Err(ExchangeError::Timeout)) | Err(_) => {
            ctx.risk.consecutive_timeouts += 1;
            let mut result = ExecutionResult::empty(user_id, order_id, OrderStatus::TimedOut);
            result.flags.push(ExecutionFlag::Timeout);
            if ctx.risk.consecutive_timeouts >= TIMEOUT_LOCK_STREAK {
                ctx.risk.is_locked = true;
                result.flags.push(ExecutionFlag::RiskLockedTriggered);
                warn!(
                    user = user_id,
                    streak = ctx.risk.consecutive_timeouts,
                    "user locked after repeated order timeouts"
                );
            }
            result
        }
        Ok(Err(e)) => {
            ctx.risk.recent_rejects += 1;
            warn!(user = user_id, order_id, error = %e, "order failed");
            ExecutionResult::empty(user_id, order_id, OrderStatus::Rejected)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskThresholds;
    use crate::credentials::ApiCredentials;
    use crate::exchange::{FailMode, PaperClient};
    use crate::types::SubscriptionTier;

    fn executor() -> (UserExecutor, Arc<AuditLog>) {
        let audit = AuditLog::in_memory();
        let exec = UserExecutor::new(
            Arc::new(RiskEngine::new(RiskThresholds::default())),
            Arc::clone(&audit),
        );
        (exec, audit)
    }

    fn user(id: &str, client: Arc<PaperClient>) -> UserContext {
        UserContext::new(
            id,
            ApiCredentials::new("k", "s"),
            client,
            1.0,
            0.01,
            SubscriptionTier::Pro,
            10_000.0,
        )
    }

    fn decision(id: &str) -> TradeDecision {
        TradeDecision {
            decision_id: id.to_string(),
            symbol: "BTCUSDT".to_string(),
            direction: Direction::Long,
            confidence: 0.75,
            regime: TradeRegime::RangeStructureBreak,
            reference_price: 50_000.0,
        }
    }

    fn deadline() -> Duration {
        Duration::from_millis(500)
    }

    #[tokio::test]
    async fn broadcast_fills_every_eligible_user() {
        let (exec, _) = executor();
        let client = Arc::new(PaperClient::new(50_000.0));
        for id in ["alice", "bob", "carol"] {
            exec.activate(user(id, Arc::clone(&client)));
        }

        let results = exec.fan_out(&decision("d1"), deadline(), None).await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.status == OrderStatus::Filled));
        assert_eq!(results[0].user_id, "alice");
        assert_eq!(results[2].user_id, "carol");
        // Contexts are back in the map.
        assert_eq!(exec.user_ids().len(), 3);
    }

    #[tokio::test]
    async fn one_user_failure_never_touches_the_others() {
        let (exec, _) = executor();
        let good = Arc::new(PaperClient::new(50_000.0));
        let bad = Arc::new(PaperClient::new(50_000.0));
        bad.set_fail_mode(FailMode::Reject);

        exec.activate(user("alice", Arc::clone(&good)));
        exec.activate(user("bob", Arc::clone(&bad)));
        exec.activate(user("carol", Arc::clone(&good)));

        let results = exec.fan_out(&decision("d1"), deadline(), None).await;
        let by_user: HashMap<&str, &ExecutionResult> =
            results.iter().map(|r| (r.user_id.as_str(), r)).collect();

        assert_eq!(by_user["alice"].status, OrderStatus::Filled);
        assert_eq!(by_user["bob"].status, OrderStatus::Rejected);
        assert_eq!(by_user["carol"].status, OrderStatus::Filled);

        // Only the failing user's risk state moved.
        assert_eq!(exec.risk_state("alice").unwrap().recent_rejects, 0);
        assert_eq!(exec.risk_state("bob").unwrap().recent_rejects, 1);
        assert_eq!(exec.risk_state("carol").unwrap().recent_rejects, 0);
        assert!(!exec.risk_state("alice").unwrap().is_locked);
        assert!(!exec.risk_state("carol").unwrap().is_locked);
    }

    #[tokio::test]
    async fn duplicate_submission_is_a_no_op_replay() {
        let (exec, _) = executor();
        let client = Arc::new(PaperClient::new(50_000.0));
        exec.activate(user("alice", Arc::clone(&client)));

        let first = exec.fan_out(&decision("d1"), deadline(), None).await;
        assert_eq!(first[0].status, OrderStatus::Filled);

        // If the executor called the exchange again this would reject.
        client.set_fail_mode(FailMode::Reject);
        let replay = exec.fan_out(&decision("d1"), deadline(), None).await;
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0].status, OrderStatus::Filled);
        assert_eq!(replay[0].order_id, first[0].order_id);
        assert!((replay[0].executed_price - first[0].executed_price).abs() < 1e-12);

        // The copy is marked as a replay; the original was not.
        assert!(!first[0].flags.contains(&ExecutionFlag::DuplicateReplay));
        assert!(replay[0].flags.contains(&ExecutionFlag::DuplicateReplay));

        // A third submission replays the cached original, not the replay.
        let again = exec.fan_out(&decision("d1"), deadline(), None).await;
        assert_eq!(
            again[0]
                .flags
                .iter()
                .filter(|f| **f == ExecutionFlag::DuplicateReplay)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn timeouts_escalate_to_a_user_lock() {
        let (exec, _) = executor();
        let client = Arc::new(PaperClient::new(50_000.0));
        client.set_fail_mode(FailMode::Hang);
        exec.activate(user("alice", Arc::clone(&client)));

        let short = Duration::from_millis(30);
        for i in 0..3 {
            let results = exec
                .fan_out(&decision(&format!("d{i}")), short, None)
                .await;
            assert_eq!(results[0].status, OrderStatus::TimedOut);
            assert!(results[0].flags.contains(&ExecutionFlag::Timeout));
        }

        let state = exec.risk_state("alice").unwrap();
        assert_eq!(state.consecutive_timeouts, 3);
        assert!(state.is_locked);

        // A locked user is filtered out of the next fan-out entirely.
        client.set_fail_mode(FailMode::None);
        let results = exec.fan_out(&decision("d9"), deadline(), None).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn cancellation_abandons_in_flight_calls_but_audits_them() {
        let (exec, audit) = executor();
        let client = Arc::new(PaperClient::new(50_000.0));
        client.set_fail_mode(FailMode::Hang);
        exec.activate(user("alice", Arc::clone(&client)));

        let (tx, rx) = watch::channel(false);
        let decision = decision("d1");
        let fan = exec.fan_out(&decision, Duration::from_secs(30), Some(rx));
        tokio::pin!(fan);

        // Let the task reach the exchange call, then cancel.
        tokio::select! {
            _ = &mut fan => panic!("fan-out settled before cancellation"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
        tx.send(true).unwrap();
        let results = fan.await;

        assert_eq!(results[0].status, OrderStatus::Canceled);
        assert!(results[0].flags.contains(&ExecutionFlag::Canceled));

        let executions = audit.recent(AuditStream::Executions);
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].payload["status"], "CANCELED");
    }

    #[tokio::test]
    async fn ineligible_users_are_filtered_in_order() {
        let (exec, _) = executor();
        let client = Arc::new(PaperClient::new(50_000.0));

        let mut suspended = user("suspended", Arc::clone(&client));
        suspended.status = UserStatus::Suspended;
        exec.activate(suspended);

        let mut bad_creds = user("bad-creds", Arc::clone(&client));
        bad_creds.credentials = ApiCredentials::new("", "");
        exec.activate(bad_creds);

        let mut locked = user("locked", Arc::clone(&client));
        locked.risk.is_locked = true;
        exec.activate(locked);

        let mut over_cap = user("over-cap", Arc::clone(&client));
        over_cap.subscription = SubscriptionTier::Basic;
        over_cap.max_position_pct = 0.04; // Basic permits 1%
        exec.activate(over_cap);

        exec.activate(user("ok", Arc::clone(&client)));

        let results = exec.fan_out(&decision("d1"), deadline(), None).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].user_id, "ok");
    }

    #[tokio::test]
    async fn user_risk_denial_flags_cooldown() {
        let (exec, _) = executor();
        let client = Arc::new(PaperClient::new(50_000.0));

        let mut streaky = user("streaky", Arc::clone(&client));
        streaky.risk.consecutive_losses = 3;
        exec.activate(streaky);

        let results = exec.fan_out(&decision("d1"), deadline(), None).await;
        assert_eq!(results[0].status, OrderStatus::Skipped);
        assert!(results[0].flags.contains(&ExecutionFlag::UserRiskDenied));
        assert!(results[0].flags.contains(&ExecutionFlag::CooldownTriggered));
    }

    #[tokio::test]
    async fn suspension_destroys_idle_contexts_only() {
        let (exec, _) = executor();
        let client = Arc::new(PaperClient::new(50_000.0));
        exec.activate(user("alice", Arc::clone(&client)));

        assert!(exec.suspend("alice"));
        assert!(!exec.suspend("alice"));
        assert!(exec.user_ids().is_empty());
    }

    #[tokio::test]
    async fn trade_close_updates_one_user_and_audits_profit() {
        let (exec, audit) = executor();
        let client = Arc::new(PaperClient::new(50_000.0));
        exec.activate(user("alice", Arc::clone(&client)));
        exec.activate(user("bob", Arc::clone(&client)));

        assert!(exec.record_trade_close("alice", -120.0, "d1"));
        let alice = exec.risk_state("alice").unwrap();
        assert_eq!(alice.consecutive_losses, 1);
        assert!((alice.daily_pnl + 120.0).abs() < 1e-9);

        let bob = exec.risk_state("bob").unwrap();
        assert_eq!(bob.consecutive_losses, 0);
        assert!(bob.daily_pnl.abs() < 1e-12);

        let profits = audit.recent(AuditStream::UserProfits);
        assert_eq!(profits.len(), 1);
        assert_eq!(profits[0].payload["user_id"], "alice");
    }
}
