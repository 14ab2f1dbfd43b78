// =============================================================================
// Trading State Machine — the single authority permitting execution
// =============================================================================
//
// One process-wide state, one mutex, one permitted-transition table.  Every
// attempt — allowed or rejected — produces an audit record carrying (from,
// to, reason, actor, timestamp), so the full trading posture history can be
// replayed from the transition stream alone.
// =============================================================================

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::audit::{AuditLog, AuditStream};
use crate::types::{now_ms, TradeRegime};

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Process-wide trading posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SystemState {
    SystemInit,
    Observing,
    Eligible,
    ActiveTrading,
    Cooldown,
    RiskLocked,
    Recovery,
}

impl std::fmt::Display for SystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SystemInit => write!(f, "SYSTEM_INIT"),
            Self::Observing => write!(f, "OBSERVING"),
            Self::Eligible => write!(f, "ELIGIBLE"),
            Self::ActiveTrading => write!(f, "ACTIVE_TRADING"),
            Self::Cooldown => write!(f, "COOLDOWN"),
            Self::RiskLocked => write!(f, "RISK_LOCKED"),
            Self::Recovery => write!(f, "RECOVERY"),
        }
    }
}

/// The complete permitted transition set.
fn permitted(from: SystemState, to: SystemState) -> bool {
    use SystemState::*;
    matches!(
        (from, to),
        (SystemInit, Observing)
            | (Observing, Eligible)
            | (Eligible, ActiveTrading)
            | (ActiveTrading, Cooldown)
            | (Cooldown, Observing)
            | (_, RiskLocked)
            | (RiskLocked, Recovery)
            | (Recovery, Observing)
    )
}

// ---------------------------------------------------------------------------
// Records and errors
// ---------------------------------------------------------------------------

/// Persisted for every accepted transition.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionRecord {
    pub from: SystemState,
    pub to: SystemState,
    pub reason: String,
    pub actor: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    InvalidTransition { from: SystemState, to: SystemState },
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTransition { from, to } => {
                write!(f, "transition {from} -> {to} is not permitted")
            }
        }
    }
}

impl std::error::Error for StateError {}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

struct MachineInner {
    state: SystemState,
    entered_at_ms: i64,
    cooldown_until_ms: i64,
    regime: TradeRegime,
}

pub struct StateMachine {
    inner: Mutex<MachineInner>,
    audit: Arc<AuditLog>,
}

impl StateMachine {
    pub fn new(audit: Arc<AuditLog>) -> Self {
        Self {
            inner: Mutex::new(MachineInner {
                state: SystemState::SystemInit,
                entered_at_ms: now_ms(),
                cooldown_until_ms: 0,
                regime: TradeRegime::NoRegime,
            }),
            audit,
        }
    }

    pub fn current(&self) -> SystemState {
        self.inner.lock().state
    }

    /// Attempt a transition.  All attempts serialize behind the machine's
    /// mutex; a rejected attempt leaves the state untouched and writes an
    /// audit record naming the violation.
    pub fn transition(
        &self,
        to: SystemState,
        reason: &str,
        actor: &str,
        correlation_id: &str,
    ) -> Result<TransitionRecord, StateError> {
        let mut inner = self.inner.lock();
        let from = inner.state;

        if !permitted(from, to) {
            warn!(%from, %to, reason, actor, "state transition rejected");
            self.audit.record(
                AuditStream::StateTransitions,
                "state_machine",
                correlation_id,
                json!({
                    "from": from.to_string(),
                    "to": to.to_string(),
                    "accepted": false,
                    "reason": "INVALID_TRANSITION",
                    "requested_reason": reason,
                    "actor": actor,
                }),
            );
            return Err(StateError::InvalidTransition { from, to });
        }

        inner.state = to;
        inner.entered_at_ms = now_ms();
        if to != SystemState::Cooldown {
            inner.cooldown_until_ms = 0;
        }
        drop(inner);

        let record = TransitionRecord {
            from,
            to,
            reason: reason.to_string(),
            actor: actor.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        };

        info!(%from, %to, reason, actor, "state transition");
        self.audit.record(
            AuditStream::StateTransitions,
            "state_machine",
            correlation_id,
            json!({
                "from": record.from.to_string(),
                "to": record.to.to_string(),
                "accepted": true,
                "reason": record.reason,
                "actor": record.actor,
            }),
        );

        Ok(record)
    }

    /// Enter COOLDOWN with a timer; the machine returns to OBSERVING on the
    /// first `tick` after expiry.
    pub fn settle_into_cooldown(
        &self,
        duration_secs: u64,
        reason: &str,
        actor: &str,
        correlation_id: &str,
    ) -> Result<TransitionRecord, StateError> {
        let record = self.transition(SystemState::Cooldown, reason, actor, correlation_id)?;
        self.inner.lock().cooldown_until_ms = now_ms() + (duration_secs as i64) * 1_000;
        Ok(record)
    }

    /// Force the global lock from any state.
    pub fn force_risk_lock(&self, reason: &str, correlation_id: &str) {
        if self.current() == SystemState::RiskLocked {
            return;
        }
        // Permitted from every state; the Err arm is unreachable.
        let _ = self.transition(SystemState::RiskLocked, reason, "risk_engine", correlation_id);
    }

    /// Operator-approved unlock: RISK_LOCKED -> RECOVERY.
    pub fn approve_recovery(
        &self,
        reason: &str,
        actor: &str,
        correlation_id: &str,
    ) -> Result<TransitionRecord, StateError> {
        self.transition(SystemState::Recovery, reason, actor, correlation_id)
    }

    /// Timer maintenance: expire an elapsed cooldown, finish recovery.
    pub fn tick(&self, correlation_id: &str) {
        let (state, expired) = {
            let inner = self.inner.lock();
            (
                inner.state,
                inner.cooldown_until_ms > 0 && now_ms() >= inner.cooldown_until_ms,
            )
        };

        if state == SystemState::Cooldown && expired {
            let _ = self.transition(
                SystemState::Observing,
                "cooldown timer expired",
                "state_machine",
                correlation_id,
            );
        }
    }

    /// Seconds of cooldown left, zero outside COOLDOWN.
    pub fn cooldown_remaining_secs(&self) -> u64 {
        let inner = self.inner.lock();
        if inner.state != SystemState::Cooldown {
            return 0;
        }
        ((inner.cooldown_until_ms - now_ms()).max(0) / 1_000) as u64
    }

    /// Advisory market regime derived from the dominant core claim.
    pub fn set_regime(&self, regime: TradeRegime) {
        self.inner.lock().regime = regime;
    }

    pub fn current_regime(&self) -> TradeRegime {
        self.inner.lock().regime
    }

    /// Milliseconds spent in the current state.
    pub fn time_in_state_ms(&self) -> i64 {
        now_ms() - self.inner.lock().entered_at_ms
    }
}
