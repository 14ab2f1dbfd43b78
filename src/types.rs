// =============================================================================
// Shared types used across the Quorum trading engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Directional stance carried by a claim or an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    /// No directional opinion (regime-support claims, flat positions).
    Neutral,
}

impl Direction {
    /// The opposite stance. Neutral has no opposite and maps to itself.
    pub fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
            Self::Neutral => Self::Neutral,
        }
    }

    pub fn is_directional(self) -> bool {
        !matches!(self, Self::Neutral)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Witness role in the panel.
///
/// Core witnesses can carry a decision on their own, auxiliary witnesses
/// support or oppose it, and veto witnesses can only block execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Core,
    Auxiliary,
    Veto,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Core => write!(f, "T1"),
            Self::Auxiliary => write!(f, "T2"),
            Self::Veto => write!(f, "T3"),
        }
    }
}

/// Lifecycle status of a registered witness.
///
/// Only `Active` witnesses influence trading. `Shadow` witnesses generate
/// claims that are recorded for evaluation but excluded from aggregation.
/// `Retired` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleStatus {
    New,
    Testing,
    Shadow,
    Active,
    Degraded,
    Retired,
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Testing => write!(f, "TESTING"),
            Self::Shadow => write!(f, "SHADOW"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Degraded => write!(f, "DEGRADED"),
            Self::Retired => write!(f, "RETIRED"),
        }
    }
}

/// Kind of assertion a claim makes about the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimType {
    MarketEligible,
    MarketNotEligible,
    RegimeMatched,
    RegimeConflict,
    ExecutionVeto,
}

impl std::fmt::Display for ClaimType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarketEligible => write!(f, "MARKET_ELIGIBLE"),
            Self::MarketNotEligible => write!(f, "MARKET_NOT_ELIGIBLE"),
            Self::RegimeMatched => write!(f, "REGIME_MATCHED"),
            Self::RegimeConflict => write!(f, "REGIME_CONFLICT"),
            Self::ExecutionVeto => write!(f, "EXECUTION_VETO"),
        }
    }
}

/// Qualitative market mode exposed to the executor as advisory context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeRegime {
    VolatilityExpansion,
    RangeStructureBreak,
    LiquiditySweep,
    NoRegime,
}

impl Default for TradeRegime {
    fn default() -> Self {
        Self::NoRegime
    }
}

impl std::fmt::Display for TradeRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VolatilityExpansion => write!(f, "VOLATILITY_EXPANSION"),
            Self::RangeStructureBreak => write!(f, "RANGE_STRUCTURE_BREAK"),
            Self::LiquiditySweep => write!(f, "LIQUIDITY_SWEEP"),
            Self::NoRegime => write!(f, "NO_REGIME"),
        }
    }
}

impl std::str::FromStr for TradeRegime {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VOLATILITY_EXPANSION" => Ok(Self::VolatilityExpansion),
            "RANGE_STRUCTURE_BREAK" => Ok(Self::RangeStructureBreak),
            "LIQUIDITY_SWEEP" => Ok(Self::LiquiditySweep),
            "NO_REGIME" => Ok(Self::NoRegime),
            _ => Err(()),
        }
    }
}

/// Subscription tier of a user; caps the position fraction a broadcast
/// decision may imply for that user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionTier {
    Basic,
    Plus,
    Pro,
}

impl SubscriptionTier {
    /// Maximum position fraction of equity this tier permits.
    pub fn max_position_fraction(self) -> f64 {
        match self {
            Self::Basic => 0.01,
            Self::Plus => 0.03,
            Self::Pro => 0.05,
        }
    }
}

impl Default for SubscriptionTier {
    fn default() -> Self {
        Self::Basic
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "Basic"),
            Self::Plus => write!(f, "Plus"),
            Self::Pro => write!(f, "Pro"),
        }
    }
}

/// Status of an execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Filled,
    PartiallyFilled,
    /// Accepted by the exchange but not (yet) executed, e.g. a resting
    /// limit order.
    Pending,
    Rejected,
    TimedOut,
    Canceled,
    Skipped,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Filled => write!(f, "FILLED"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Pending => write!(f, "PENDING"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::TimedOut => write!(f, "TIMED_OUT"),
            Self::Canceled => write!(f, "CANCELED"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Symbolic markers attached to an execution result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionFlag {
    RiskLockedTriggered,
    CooldownTriggered,
    Timeout,
    Canceled,
    DuplicateReplay,
    UserRiskDenied,
}

impl std::fmt::Display for ExecutionFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RiskLockedTriggered => write!(f, "RISK_LOCKED_TRIGGERED"),
            Self::CooldownTriggered => write!(f, "COOLDOWN_TRIGGERED"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Canceled => write!(f, "CANCELED"),
            Self::DuplicateReplay => write!(f, "DUPLICATE_REPLAY"),
            Self::UserRiskDenied => write!(f, "USER_RISK_DENIED"),
        }
    }
}

/// Current UNIX timestamp in UTC milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
