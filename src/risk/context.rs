// =============================================================================
// Risk context — one read-only snapshot shared by all domain checkers
// =============================================================================
//
// The account tracker accumulates settled trade results (equity, drawdown,
// daily/weekly P&L, loss streaks) and stamps out immutable `RiskContext`
// snapshots.  Daily and weekly counters reset automatically when the UTC
// date or ISO week rolls over.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::health::WitnessHealth;
use crate::types::{now_ms, Direction};

/// Settled trades retained for checker inspection.
const MAX_RECENT_TRADES: usize = 100;

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// One settled trade.
#[derive(Debug, Clone, Serialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub direction: Direction,
    pub pnl: f64,
    pub timestamp_ms: i64,
}

/// Read-only snapshot handed to every risk checker in one evaluation.
#[derive(Debug, Clone)]
pub struct RiskContext {
    pub equity: f64,
    /// Fractional drawdown from peak equity.
    pub current_drawdown: f64,
    /// Today's P&L as a fraction of equity (negative = loss).
    pub daily_pnl_pct: f64,
    /// This ISO week's P&L as a fraction of equity.
    pub weekly_pnl_pct: f64,
    pub consecutive_losses: u32,
    /// Currently deployed capital as a fraction of equity.
    pub open_position_fraction: f64,
    /// Fraction the decision under evaluation would deploy.
    pub proposed_position_fraction: f64,
    pub leverage: f64,
    pub position_direction: Direction,
    pub proposed_direction: Direction,
    /// Strategy carrying the decision under evaluation, if any.
    pub proposed_strategy_id: Option<String>,
    pub trades_last_hour: u32,
    pub consecutive_timeouts: u32,
    pub recent_rejects: u32,
    /// Age of the newest bar backing the decision.
    pub data_age_ms: i64,
    /// Seconds left of an externally imposed trading cooldown.
    pub cooldown_remaining_secs: u64,
    pub recent_trades: Vec<TradeRecord>,
    pub witness_health: HashMap<String, WitnessHealth>,
}

impl RiskContext {
    /// A quiet snapshot with nothing at stake; tests and warmup loops start
    /// from here and override what they need.
    pub fn neutral(equity: f64) -> Self {
        Self {
            equity,
            current_drawdown: 0.0,
            daily_pnl_pct: 0.0,
            weekly_pnl_pct: 0.0,
            consecutive_losses: 0,
            open_position_fraction: 0.0,
            proposed_position_fraction: 0.0,
            leverage: 1.0,
            position_direction: Direction::Neutral,
            proposed_direction: Direction::Neutral,
            proposed_strategy_id: None,
            trades_last_hour: 0,
            consecutive_timeouts: 0,
            recent_rejects: 0,
            data_age_ms: 0,
            cooldown_remaining_secs: 0,
            recent_trades: Vec::new(),
            witness_health: HashMap::new(),
        }
    }
}

/// Loop-scoped inputs merged into the tracker's account view when building a
/// context.
#[derive(Debug, Clone, Default)]
pub struct LoopRiskInputs {
    pub open_position_fraction: f64,
    pub proposed_position_fraction: f64,
    pub leverage: f64,
    pub position_direction: Option<Direction>,
    pub proposed_direction: Option<Direction>,
    pub proposed_strategy_id: Option<String>,
    pub consecutive_timeouts: u32,
    pub recent_rejects: u32,
    pub data_age_ms: i64,
    pub cooldown_remaining_secs: u64,
    pub witness_health: HashMap<String, WitnessHealth>,
}

// ---------------------------------------------------------------------------
// Account tracker
// ---------------------------------------------------------------------------

struct TrackerInner {
    equity: f64,
    peak_equity: f64,
    daily_pnl: f64,
    weekly_pnl: f64,
    consecutive_losses: u32,
    current_date: String,
    current_week: String,
    trade_times_ms: VecDeque<i64>,
    recent: VecDeque<TradeRecord>,
}

/// Accumulates settled trade results into the account view every risk
/// evaluation reads.
pub struct AccountTracker {
    state: RwLock<TrackerInner>,
}

impl AccountTracker {
    pub fn new(starting_equity: f64) -> Self {
        Self {
            state: RwLock::new(TrackerInner {
                equity: starting_equity,
                peak_equity: starting_equity,
                daily_pnl: 0.0,
                weekly_pnl: 0.0,
                consecutive_losses: 0,
                current_date: Utc::now().format("%Y-%m-%d").to_string(),
                current_week: Utc::now().format("%G-W%V").to_string(),
                trade_times_ms: VecDeque::new(),
                recent: VecDeque::new(),
            }),
        }
    }

    /// Record one settled trade and roll all counters.
    pub fn record_trade(&self, record: TradeRecord) {
        self.maybe_roll_over();
        let mut s = self.state.write();

        s.equity += record.pnl;
        s.daily_pnl += record.pnl;
        s.weekly_pnl += record.pnl;
        if s.equity > s.peak_equity {
            s.peak_equity = s.equity;
        }

        if record.pnl < 0.0 {
            s.consecutive_losses += 1;
        } else {
            s.consecutive_losses = 0;
        }

        s.trade_times_ms.push_back(record.timestamp_ms);
        while s.trade_times_ms.len() > MAX_RECENT_TRADES {
            s.trade_times_ms.pop_front();
        }
        s.recent.push_back(record);
        while s.recent.len() > MAX_RECENT_TRADES {
            s.recent.pop_front();
        }

        debug!(
            equity = s.equity,
            daily_pnl = s.daily_pnl,
            weekly_pnl = s.weekly_pnl,
            consecutive_losses = s.consecutive_losses,
            "trade recorded"
        );
    }

    pub fn equity(&self) -> f64 {
        self.state.read().equity
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.state.read().consecutive_losses
    }

    /// Build a context snapshot from the account view plus loop inputs.
    pub fn context(&self, inputs: LoopRiskInputs) -> RiskContext {
        self.maybe_roll_over();
        let s = self.state.read();

        let drawdown = if s.peak_equity > 0.0 {
            ((s.peak_equity - s.equity) / s.peak_equity).max(0.0)
        } else {
            0.0
        };
        let daily_pct = if s.equity > 0.0 { s.daily_pnl / s.equity } else { 0.0 };
        let weekly_pct = if s.equity > 0.0 { s.weekly_pnl / s.equity } else { 0.0 };

        let hour_ago = now_ms() - 3_600_000;
        let trades_last_hour = s.trade_times_ms.iter().filter(|&&t| t >= hour_ago).count() as u32;

        RiskContext {
            equity: s.equity,
            current_drawdown: drawdown,
            daily_pnl_pct: daily_pct,
            weekly_pnl_pct: weekly_pct,
            consecutive_losses: s.consecutive_losses,
            open_position_fraction: inputs.open_position_fraction,
            proposed_position_fraction: inputs.proposed_position_fraction,
            leverage: inputs.leverage,
            position_direction: inputs.position_direction.unwrap_or(Direction::Neutral),
            proposed_direction: inputs.proposed_direction.unwrap_or(Direction::Neutral),
            proposed_strategy_id: inputs.proposed_strategy_id,
            trades_last_hour,
            consecutive_timeouts: inputs.consecutive_timeouts,
            recent_rejects: inputs.recent_rejects,
            data_age_ms: inputs.data_age_ms,
            cooldown_remaining_secs: inputs.cooldown_remaining_secs,
            recent_trades: s.recent.iter().cloned().collect(),
            witness_health: inputs.witness_health,
        }
    }

    /// Reset daily/weekly counters when the UTC date or ISO week changes.
    fn maybe_roll_over(&self) {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let week = Utc::now().format("%G-W%V").to_string();
        {
            let s = self.state.read();
            if s.current_date == today && s.current_week == week {
                return;
            }
        }
        let mut s = self.state.write();
        // Re-check under the write lock; another thread may have rolled.
        if s.current_date != today {
            info!(old = %s.current_date, new = %today, "daily risk counters reset");
            s.daily_pnl = 0.0;
            s.current_date = today;
        }
        if s.current_week != week {
            info!(old = %s.current_week, new = %week, "weekly risk counters reset");
            s.weekly_pnl = 0.0;
            s.current_week = week;
        }
    }
}
