// =============================================================================
// User contexts — per-user credentials, risk state, and exchange client
// =============================================================================
//
// A `UserContext` is owned by exactly one task at a time: it rests in the
// executor's map between decisions and is moved wholesale into a fan-out task
// for the duration of one execution.  Credentials are zeroed when the context
// is dropped (suspension, removal, shutdown).
// =============================================================================

use std::sync::Arc;

use serde::Serialize;

use crate::credentials::ApiCredentials;
use crate::exchange::ExchangeClient;
use crate::types::SubscriptionTier;

/// Activation state of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UserStatus {
    Active,
    Suspended,
}

/// Per-user risk state, independent of every other user.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserRiskState {
    pub is_locked: bool,
    pub consecutive_timeouts: u32,
    pub recent_rejects: u32,
    pub consecutive_losses: u32,
    pub daily_pnl: f64,
}

/// Isolated per-user execution bundle.
pub struct UserContext {
    pub user_id: String,
    /// Decrypted, memory-only; zeroed when the context drops.
    pub credentials: ApiCredentials,
    pub risk: UserRiskState,
    pub client: Arc<dyn ExchangeClient>,
    pub leverage: f64,
    /// Position size per decision as a fraction of the user's equity.
    pub max_position_pct: f64,
    pub subscription: SubscriptionTier,
    pub status: UserStatus,
    pub equity: f64,
}

impl UserContext {
    pub fn new(
        user_id: impl Into<String>,
        credentials: ApiCredentials,
        client: Arc<dyn ExchangeClient>,
        leverage: f64,
        max_position_pct: f64,
        subscription: SubscriptionTier,
        equity: f64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            credentials,
            risk: UserRiskState::default(),
            client,
            leverage,
            max_position_pct,
            subscription,
            status: UserStatus::Active,
            equity,
        }
    }
}

impl std::fmt::Debug for UserContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserContext")
            .field("user_id", &self.user_id)
            .field("status", &self.status)
            .field("risk", &self.risk)
            .field("leverage", &self.leverage)
            .field("max_position_pct", &self.max_position_pct)
            .field("subscription", &self.subscription)
            .field("equity", &self.equity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PaperClient;

    #[test]
    fn debug_never_exposes_credentials() {
        let ctx = UserContext::new(
            "alice",
            ApiCredentials::new("key-visible", "secret-visible"),
            Arc::new(PaperClient::new(100.0)),
            2.0,
            0.02,
            SubscriptionTier::Plus,
            5_000.0,
        );
        let rendered = format!("{ctx:?}");
        assert!(!rendered.contains("key-visible"));
        assert!(!rendered.contains("secret-visible"));
    }

    #[test]
    fn fresh_context_is_active_and_unlocked() {
        let ctx = UserContext::new(
            "bob",
            ApiCredentials::new("k", "s"),
            Arc::new(PaperClient::new(100.0)),
            1.0,
            0.01,
            SubscriptionTier::Basic,
            1_000.0,
        );
        assert_eq!(ctx.status, UserStatus::Active);
        assert!(!ctx.risk.is_locked);
        assert_eq!(ctx.risk.consecutive_timeouts, 0);
    }
}
