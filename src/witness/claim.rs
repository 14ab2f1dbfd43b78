// =============================================================================
// Claim — an immutable, time-bounded assertion about market state
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{ClaimType, Direction, Tier};

/// A single claim emitted by a witness.
///
/// Claims are immutable once built and carry their own expiry: a claim whose
/// `timestamp + validity_window` has passed is ignored by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub strategy_id: String,
    pub claim_type: ClaimType,
    /// Strength of the assertion in [0, 1].
    pub confidence: f64,
    /// Seconds the claim stays valid after `timestamp`.
    pub validity_window_secs: i64,
    pub direction: Direction,
    /// Free-form execution hints (e.g. "max_spread_bps" => "5").
    #[serde(default)]
    pub constraints: HashMap<String, String>,
    /// UTC milliseconds when the claim was produced.
    pub timestamp: i64,
}

impl Claim {
    pub fn new(
        strategy_id: impl Into<String>,
        claim_type: ClaimType,
        confidence: f64,
        validity_window_secs: i64,
        direction: Direction,
        timestamp: i64,
    ) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            claim_type,
            confidence: confidence.clamp(0.0, 1.0),
            validity_window_secs,
            direction,
            constraints: HashMap::new(),
            timestamp,
        }
    }

    pub fn with_constraint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.constraints.insert(key.into(), value.into());
        self
    }

    /// True when the validity window has passed at `now_ms`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.timestamp + self.validity_window_secs * 1_000 < now_ms
    }

    /// Field-level sanity: confidence in range, window non-negative.
    pub fn is_well_formed(&self) -> bool {
        (0.0..=1.0).contains(&self.confidence)
            && self.validity_window_secs >= 0
            && !self.strategy_id.is_empty()
    }
}

/// Whether a claim type is permitted for a witness of the given tier.
///
/// Veto witnesses may only veto.  Core witnesses assert market eligibility or
/// regime match.  Auxiliary witnesses emit regime-support variants only.
pub fn claim_type_permitted(tier: Tier, claim_type: ClaimType) -> bool {
    match tier {
        Tier::Veto => matches!(claim_type, ClaimType::ExecutionVeto),
        Tier::Core => matches!(
            claim_type,
            ClaimType::MarketEligible | ClaimType::RegimeMatched
        ),
        Tier::Auxiliary => matches!(
            claim_type,
            ClaimType::RegimeMatched | ClaimType::RegimeConflict | ClaimType::MarketNotEligible
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(confidence: f64, window_secs: i64, ts: i64) -> Claim {
        Claim::new(
            "w1",
            ClaimType::MarketEligible,
            confidence,
            window_secs,
            Direction::Long,
            ts,
        )
    }

    #[test]
    fn expiry_honours_validity_window() {
        let c = claim(0.8, 60, 1_000_000);
        assert!(!c.is_expired(1_000_000 + 59_999));
        assert!(!c.is_expired(1_000_000 + 60_000));
        assert!(c.is_expired(1_000_000 + 60_001));
    }

    #[test]
    fn confidence_is_clamped_on_build() {
        assert!((claim(1.7, 60, 0).confidence - 1.0).abs() < f64::EPSILON);
        assert!(claim(-0.3, 60, 0).confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn tier_claim_type_matrix() {
        assert!(claim_type_permitted(Tier::Core, ClaimType::MarketEligible));
        assert!(claim_type_permitted(Tier::Core, ClaimType::RegimeMatched));
        assert!(!claim_type_permitted(Tier::Core, ClaimType::ExecutionVeto));

        assert!(claim_type_permitted(Tier::Auxiliary, ClaimType::RegimeMatched));
        assert!(claim_type_permitted(Tier::Auxiliary, ClaimType::RegimeConflict));
        assert!(!claim_type_permitted(Tier::Auxiliary, ClaimType::MarketEligible));

        assert!(claim_type_permitted(Tier::Veto, ClaimType::ExecutionVeto));
        assert!(!claim_type_permitted(Tier::Veto, ClaimType::MarketEligible));
        assert!(!claim_type_permitted(Tier::Veto, ClaimType::RegimeConflict));
    }

    #[test]
    fn constraints_attach() {
        let c = claim(0.5, 60, 0).with_constraint("max_spread_bps", "5");
        assert_eq!(c.constraints.get("max_spread_bps").unwrap(), "5");
    }
}
