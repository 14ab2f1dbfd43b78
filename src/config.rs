// =============================================================================
// Engine Configuration — hot-reloadable settings with atomic save
// =============================================================================
//
// Every tunable parameter of the decision core lives here.  All fields carry
// `#[serde(default)]` so that adding new fields never breaks loading an older
// config file.  Persistence uses an atomic tmp + rename pattern to prevent
// corruption on crash.
//
// Risk thresholds are operator-owned hard floors.  Nothing in the engine may
// widen them at runtime; the learner only ever touches per-witness learning
// factors, and those through their own clamped setter.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::SubscriptionTier;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_interval() -> String {
    "5m".to_string()
}

fn default_tier2_base_factor() -> f64 {
    0.1
}

fn default_confidence_threshold() -> f64 {
    0.6
}

fn default_loop_interval_secs() -> u64 {
    5
}

fn default_witness_budget_ms() -> u64 {
    250
}

fn default_decision_deadline_ms() -> u64 {
    5_000
}

fn default_shadow_horizon_bars() -> usize {
    12
}

fn default_audit_dir() -> String {
    "audit".to_string()
}

// =============================================================================
// Weight clamps
// =============================================================================

/// Clamp ranges for the three weight components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightClamps {
    pub base_min: f64,
    pub base_max: f64,
    pub health_min: f64,
    pub health_max: f64,
    pub learning_min: f64,
    pub learning_max: f64,
    /// Maximum cumulative change of a learning factor within one UTC day.
    pub learning_daily_drift: f64,
}

impl Default for WeightClamps {
    fn default() -> Self {
        Self {
            base_min: 0.5,
            base_max: 2.0,
            health_min: 0.5,
            health_max: 1.2,
            learning_min: 0.8,
            learning_max: 1.2,
            learning_daily_drift: 0.05,
        }
    }
}

// =============================================================================
// Risk thresholds
// =============================================================================

/// Operator-owned risk limits.  Hard floors: the engine treats these as the
/// widest permitted values and never relaxes them at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// Maximum drawdown from peak equity before the engine locks.
    pub max_drawdown: f64,
    /// Maximum daily loss as a fraction of equity.
    pub daily_max_loss: f64,
    /// Maximum weekly loss as a fraction of equity.
    pub weekly_max_loss: f64,
    /// Consecutive losses before the behavior checker forces a cooldown.
    pub consecutive_loss_limit: u32,
    /// Maximum single position as a fraction of equity.
    pub max_single_position: f64,
    /// Maximum total position as a fraction of equity.
    pub max_total_position: f64,
    /// Maximum leverage any user context may run.
    pub max_leverage: f64,
    /// Cooldown after a settled execution (seconds).
    pub normal_cooldown_secs: u64,
    /// Cooldown after a stop-loss exit (seconds).
    pub stop_loss_cooldown_secs: u64,
    /// Cooldown after hitting the consecutive-loss limit (seconds).
    pub consecutive_loss_cooldown_secs: u64,
    /// Oldest acceptable bar age before the system checker denies (ms).
    pub max_data_age_ms: i64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            max_drawdown: 0.20,
            daily_max_loss: 0.03,
            weekly_max_loss: 0.10,
            consecutive_loss_limit: 3,
            max_single_position: 0.05,
            max_total_position: 0.30,
            max_leverage: 5.0,
            normal_cooldown_secs: 600,
            stop_loss_cooldown_secs: 1_200,
            consecutive_loss_cooldown_secs: 3_600,
            max_data_age_ms: 900_000,
        }
    }
}

// =============================================================================
// User profiles
// =============================================================================

/// Per-user execution profile as stored in configuration.
///
/// `encrypted_credentials` is the AES-256-GCM envelope produced by
/// [`crate::credentials::CredentialCipher::encrypt`]; the plaintext never
/// appears in this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub encrypted_credentials: String,
    #[serde(default = "default_leverage")]
    pub leverage: f64,
    /// Position size as a fraction of the user's equity.
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: f64,
    #[serde(default)]
    pub subscription: SubscriptionTier,
    #[serde(default = "default_user_equity")]
    pub equity: f64,
}

fn default_leverage() -> f64 {
    1.0
}

fn default_max_position_pct() -> f64 {
    0.01
}

fn default_user_equity() -> f64 {
    1_000.0
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level configuration for the Quorum engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // --- Market ---------------------------------------------------------------

    /// Symbol the decision loop evaluates.
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Bar interval driving the loop.
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Seconds between decision loops.
    #[serde(default = "default_loop_interval_secs")]
    pub loop_interval_secs: u64,

    // --- Aggregation ----------------------------------------------------------

    /// Scaling factor applied to every supporting/opposing claim's effective
    /// weight during aggregation.
    #[serde(default = "default_tier2_base_factor")]
    pub tier2_base_factor: f64,

    /// Minimum total confidence for a tradeable decision.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    // --- Weights --------------------------------------------------------------

    #[serde(default)]
    pub weight_clamps: WeightClamps,

    // --- Risk -----------------------------------------------------------------

    #[serde(default)]
    pub risk: RiskThresholds,

    // --- Timing ---------------------------------------------------------------

    /// Per-loop time budget for collecting claims from the panel (ms).
    #[serde(default = "default_witness_budget_ms")]
    pub witness_budget_ms: u64,

    /// Deadline for the whole per-user fan-out of one decision (ms).
    #[serde(default = "default_decision_deadline_ms")]
    pub decision_deadline_ms: u64,

    /// Bars a shadow claim waits before its hypothetical outcome is scored.
    #[serde(default = "default_shadow_horizon_bars")]
    pub shadow_horizon_bars: usize,

    // --- Persistence ----------------------------------------------------------

    /// Directory for the append-only audit streams.
    #[serde(default = "default_audit_dir")]
    pub audit_dir: String,

    // --- Users ----------------------------------------------------------------

    /// Users to activate at startup.
    #[serde(default)]
    pub users: Vec<UserProfile>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            interval: default_interval(),
            loop_interval_secs: default_loop_interval_secs(),
            tier2_base_factor: default_tier2_base_factor(),
            confidence_threshold: default_confidence_threshold(),
            weight_clamps: WeightClamps::default(),
            risk: RiskThresholds::default(),
            witness_budget_ms: default_witness_budget_ms(),
            decision_deadline_ms: default_decision_deadline_ms(),
            shadow_horizon_bars: default_shadow_horizon_bars(),
            audit_dir: default_audit_dir(),
            users: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol,
            users = config.users.len(),
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration using an atomic write (tmp + rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise engine config")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_operator_floors() {
        let cfg = EngineConfig::default();
        assert!((cfg.tier2_base_factor - 0.1).abs() < f64::EPSILON);
        assert!((cfg.confidence_threshold - 0.6).abs() < f64::EPSILON);
        assert!((cfg.risk.max_drawdown - 0.20).abs() < f64::EPSILON);
        assert!((cfg.risk.daily_max_loss - 0.03).abs() < f64::EPSILON);
        assert!((cfg.risk.weekly_max_loss - 0.10).abs() < f64::EPSILON);
        assert_eq!(cfg.risk.consecutive_loss_limit, 3);
        assert!((cfg.risk.max_single_position - 0.05).abs() < f64::EPSILON);
        assert!((cfg.risk.max_total_position - 0.30).abs() < f64::EPSILON);
        assert!((cfg.risk.max_leverage - 5.0).abs() < f64::EPSILON);
        assert_eq!(cfg.risk.normal_cooldown_secs, 600);
        assert_eq!(cfg.risk.stop_loss_cooldown_secs, 1_200);
        assert_eq!(cfg.risk.consecutive_loss_cooldown_secs, 3_600);
    }

    #[test]
    fn weight_clamp_defaults() {
        let clamps = WeightClamps::default();
        assert!((clamps.base_min - 0.5).abs() < f64::EPSILON);
        assert!((clamps.base_max - 2.0).abs() < f64::EPSILON);
        assert!((clamps.health_min - 0.5).abs() < f64::EPSILON);
        assert!((clamps.health_max - 1.2).abs() < f64::EPSILON);
        assert!((clamps.learning_min - 0.8).abs() < f64::EPSILON);
        assert!((clamps.learning_max - 1.2).abs() < f64::EPSILON);
        assert!((clamps.learning_daily_drift - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.symbol, "BTCUSDT");
        assert_eq!(cfg.interval, "5m");
        assert!(cfg.users.is_empty());
        assert_eq!(cfg.risk.consecutive_loss_limit, 3);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "symbol": "ETHUSDT", "confidence_threshold": 0.7 }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbol, "ETHUSDT");
        assert!((cfg.confidence_threshold - 0.7).abs() < f64::EPSILON);
        assert!((cfg.tier2_base_factor - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn user_profile_defaults() {
        let json = r#"{ "user_id": "u1", "encrypted_credentials": "abc" }"#;
        let profile: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.user_id, "u1");
        assert!((profile.leverage - 1.0).abs() < f64::EPSILON);
        assert!((profile.max_position_pct - 0.01).abs() < f64::EPSILON);
        assert_eq!(profile.subscription, SubscriptionTier::Basic);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.symbol, cfg2.symbol);
        assert_eq!(cfg.risk.normal_cooldown_secs, cfg2.risk.normal_cooldown_secs);
    }
}
