// =============================================================================
// Aggregator — resolves a claim set into one tradeable decision or a refusal
// =============================================================================
//
// Resolution order is fixed: expiry filter, veto short-circuit, dominant
// core-claim selection, conflict refusal, weighted accumulation, ceiling
// clamp, threshold.  Opposition is deliberately weighted at half the support
// rate so weak disagreement dampens a strong signal without cancelling it,
// and the 0.95 ceiling means no claim set is ever treated as certainty.
// =============================================================================

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::debug;

use crate::types::{ClaimType, Direction, Tier, TradeRegime};
use crate::witness::{RoutedClaim, REGIME_CONSTRAINT};

/// Hard ceiling on total confidence.
const CONFIDENCE_CEILING: f64 = 0.95;
/// Opposing claims count at half their supporting rate.
const OPPOSITION_DAMPING: f64 = 0.5;
/// Two disagreeing core claims within this relative band refuse the loop.
const CONFLICT_BAND: f64 = 0.10;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Why the aggregation resolved the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolutionReason {
    Vetoed,
    AllExpired,
    NoDirectionalClaims,
    RegimeUnclear,
    BelowThreshold,
    Tradeable,
}

impl std::fmt::Display for ResolutionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vetoed => write!(f, "VETOED"),
            Self::AllExpired => write!(f, "ALL_EXPIRED"),
            Self::NoDirectionalClaims => write!(f, "NO_DIRECTIONAL_CLAIMS"),
            Self::RegimeUnclear => write!(f, "REGIME_UNCLEAR"),
            Self::BelowThreshold => write!(f, "BELOW_THRESHOLD"),
            Self::Tradeable => write!(f, "TRADEABLE"),
        }
    }
}

/// Outcome of one aggregation pass.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedResult {
    pub dominant_direction: Direction,
    pub total_confidence: f64,
    pub is_tradeable: bool,
    pub veto_strategy_id: Option<String>,
    pub resolution_reason: ResolutionReason,
    pub dominant_strategy_id: Option<String>,
    /// Witnesses that argued for the dominant direction (dominant included);
    /// settled outcomes are attributed to these.
    pub contributors: Vec<String>,
    /// Advisory regime derived from the dominant core claim.
    pub regime: TradeRegime,
}

impl AggregatedResult {
    fn refusal(reason: ResolutionReason) -> Self {
        Self {
            dominant_direction: Direction::Neutral,
            total_confidence: 0.0,
            is_tradeable: false,
            veto_strategy_id: None,
            resolution_reason: reason,
            dominant_strategy_id: None,
            contributors: Vec::new(),
            regime: TradeRegime::NoRegime,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

pub struct Aggregator {
    /// Scaling applied to every supporting/opposing claim's effective weight.
    tier2_base_factor: f64,
    /// Minimum total confidence for a tradeable result.
    confidence_threshold: f64,
    expired_claims: AtomicU64,
}

impl Aggregator {
    pub fn new(tier2_base_factor: f64, confidence_threshold: f64) -> Self {
        Self {
            tier2_base_factor,
            confidence_threshold,
            expired_claims: AtomicU64::new(0),
        }
    }

    /// Claims dropped for expiry since startup.
    pub fn expired_count(&self) -> u64 {
        self.expired_claims.load(Ordering::Relaxed)
    }

    /// Resolve `claims` against a stable weight snapshot.
    pub fn aggregate(
        &self,
        claims: &[RoutedClaim],
        weights: &HashMap<String, f64>,
        now_ms: i64,
    ) -> AggregatedResult {
        // ── 1. Drop expired claims ───────────────────────────────────────
        let had_claims = !claims.is_empty();
        let live: Vec<&RoutedClaim> = claims
            .iter()
            .filter(|rc| {
                let expired = rc.claim.is_expired(now_ms);
                if expired {
                    self.expired_claims.fetch_add(1, Ordering::Relaxed);
                }
                !expired
            })
            .collect();

        if live.is_empty() {
            return AggregatedResult::refusal(if had_claims {
                ResolutionReason::AllExpired
            } else {
                ResolutionReason::NoDirectionalClaims
            });
        }

        // ── 2. Veto short-circuit ────────────────────────────────────────
        if let Some(veto) = live
            .iter()
            .find(|rc| rc.tier == Tier::Veto && rc.claim.claim_type == ClaimType::ExecutionVeto)
        {
            debug!(witness = %veto.claim.strategy_id, "aggregation vetoed");
            let mut result = AggregatedResult::refusal(ResolutionReason::Vetoed);
            result.veto_strategy_id = Some(veto.claim.strategy_id.clone());
            return result;
        }

        // ── 3. Dominant core claim ───────────────────────────────────────
        let mut core: Vec<&RoutedClaim> = live
            .iter()
            .filter(|rc| rc.tier == Tier::Core && rc.claim.direction.is_directional())
            .copied()
            .collect();
        if core.is_empty() {
            return AggregatedResult::refusal(ResolutionReason::NoDirectionalClaims);
        }
        // Highest confidence wins; equal confidence resolves to the
        // lexicographically smaller witness id so reruns are reproducible.
        core.sort_by(|a, b| {
            b.claim
                .confidence
                .partial_cmp(&a.claim.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.claim.strategy_id.cmp(&b.claim.strategy_id))
        });
        let dominant = core[0];
        let dominant_dir = dominant.claim.direction;

        // ── 4. Conflict refusal ──────────────────────────────────────────
        // Two eligible core claims pulling in opposite directions at nearly
        // equal conviction is not a signal, it is noise.
        if dominant.claim.claim_type == ClaimType::MarketEligible {
            for other in core.iter().skip(1) {
                if other.claim.direction == dominant_dir.opposite()
                    && other.claim.claim_type == ClaimType::MarketEligible
                {
                    let hi = dominant.claim.confidence.max(other.claim.confidence);
                    if hi > 0.0
                        && (dominant.claim.confidence - other.claim.confidence).abs() / hi
                            <= CONFLICT_BAND
                    {
                        debug!(
                            dominant = %dominant.claim.strategy_id,
                            opposing = %other.claim.strategy_id,
                            "aggregation refused: opposing core claims too close"
                        );
                        return AggregatedResult::refusal(ResolutionReason::RegimeUnclear);
                    }
                }
            }
        }

        // ── 5.–6. Weighted accumulation ──────────────────────────────────
        let mut total = dominant.claim.confidence;
        let mut contributors = vec![dominant.claim.strategy_id.clone()];

        for rc in live.iter() {
            if std::ptr::eq(*rc, dominant) {
                continue;
            }
            let claim = &rc.claim;
            if !claim.direction.is_directional() {
                continue;
            }

            let effective = weights.get(&claim.strategy_id).copied().unwrap_or(1.0);
            let factor = effective * self.tier2_base_factor;

            if claim.direction == dominant_dir {
                total += claim.confidence * factor;
                contributors.push(claim.strategy_id.clone());
            } else {
                total -= claim.confidence * factor * OPPOSITION_DAMPING;
            }
        }

        // ── 7.–8. Ceiling clamp and threshold ────────────────────────────
        let total = total.clamp(0.0, CONFIDENCE_CEILING);
        let is_tradeable = total >= self.confidence_threshold;

        let regime = dominant
            .claim
            .constraints
            .get(REGIME_CONSTRAINT)
            .and_then(|s| TradeRegime::from_str(s).ok())
            .unwrap_or_default();

        AggregatedResult {
            dominant_direction: dominant_dir,
            total_confidence: total,
            is_tradeable,
            veto_strategy_id: None,
            resolution_reason: if is_tradeable {
                ResolutionReason::Tradeable
            } else {
                ResolutionReason::BelowThreshold
            },
            dominant_strategy_id: Some(dominant.claim.strategy_id.clone()),
            contributors,
            regime,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::witness::Claim;

    const NOW: i64 = 1_700_000_000_000;

    fn routed(
        id: &str,
        tier: Tier,
        claim_type: ClaimType,
        direction: Direction,
        confidence: f64,
    ) -> RoutedClaim {
        RoutedClaim {
            claim: Claim::new(id, claim_type, confidence, 300, direction, NOW),
            tier,
        }
    }

    fn unit_weights(ids: &[&str]) -> HashMap<String, f64> {
        ids.iter().map(|id| (id.to_string(), 1.0)).collect()
    }

    fn aggregator() -> Aggregator {
        Aggregator::new(0.1, 0.6)
    }

    #[test]
    fn veto_short_circuits_everything() {
        let claims = vec![
            routed("t1", Tier::Core, ClaimType::MarketEligible, Direction::Long, 0.9),
            routed("t2", Tier::Auxiliary, ClaimType::RegimeMatched, Direction::Long, 0.8),
            routed("guard", Tier::Veto, ClaimType::ExecutionVeto, Direction::Neutral, 0.9),
        ];
        let result = aggregator().aggregate(&claims, &unit_weights(&["t1", "t2", "guard"]), NOW);
        assert!(!result.is_tradeable);
        assert_eq!(result.veto_strategy_id.as_deref(), Some("guard"));
        assert_eq!(result.resolution_reason, ResolutionReason::Vetoed);
    }

    #[test]
    fn weighted_agreement_adds_support() {
        let claims = vec![
            routed("t1", Tier::Core, ClaimType::MarketEligible, Direction::Long, 0.7),
            routed("t2", Tier::Auxiliary, ClaimType::RegimeMatched, Direction::Long, 0.5),
        ];
        let result = aggregator().aggregate(&claims, &unit_weights(&["t1", "t2"]), NOW);
        // 0.7 + 0.5 × 1.0 × 0.1 = 0.75
        assert!((result.total_confidence - 0.75).abs() < 1e-12);
        assert!(result.is_tradeable);
        assert_eq!(result.dominant_direction, Direction::Long);
        assert_eq!(result.contributors, vec!["t1".to_string(), "t2".to_string()]);
    }

    #[test]
    fn opposition_subtracts_at_half_rate() {
        let claims = vec![
            routed("t1", Tier::Core, ClaimType::MarketEligible, Direction::Long, 0.7),
            routed("t2", Tier::Auxiliary, ClaimType::RegimeConflict, Direction::Short, 0.6),
        ];
        let result = aggregator().aggregate(&claims, &unit_weights(&["t1", "t2"]), NOW);
        // 0.7 − 0.6 × 1.0 × 0.1 × 0.5 = 0.67
        assert!((result.total_confidence - 0.67).abs() < 1e-12);
        assert!(result.is_tradeable);
        assert_eq!(result.dominant_direction, Direction::Long);
    }

    #[test]
    fn expired_claims_are_invisible() {
        let mut stale = routed("t1", Tier::Core, ClaimType::MarketEligible, Direction::Long, 0.9);
        stale.claim.timestamp = NOW - 400_000; // 300s window passed
        let agg = aggregator();
        let result = agg.aggregate(&[stale], &unit_weights(&["t1"]), NOW);
        assert!(!result.is_tradeable);
        assert_eq!(result.resolution_reason, ResolutionReason::AllExpired);
        assert_eq!(agg.expired_count(), 1);
    }

    #[test]
    fn near_equal_opposing_core_claims_refuse() {
        let claims = vec![
            routed("a", Tier::Core, ClaimType::MarketEligible, Direction::Long, 0.70),
            routed("b", Tier::Core, ClaimType::MarketEligible, Direction::Short, 0.66),
        ];
        let result = aggregator().aggregate(&claims, &unit_weights(&["a", "b"]), NOW);
        assert!(!result.is_tradeable);
        assert_eq!(result.resolution_reason, ResolutionReason::RegimeUnclear);
    }

    #[test]
    fn equal_opposing_core_claims_refuse() {
        let claims = vec![
            routed("a", Tier::Core, ClaimType::MarketEligible, Direction::Long, 0.7),
            routed("b", Tier::Core, ClaimType::MarketEligible, Direction::Short, 0.7),
        ];
        let result = aggregator().aggregate(&claims, &unit_weights(&["a", "b"]), NOW);
        assert_eq!(result.resolution_reason, ResolutionReason::RegimeUnclear);
    }

    #[test]
    fn clearly_separated_opposing_claims_resolve() {
        let claims = vec![
            routed("a", Tier::Core, ClaimType::MarketEligible, Direction::Long, 0.9),
            routed("b", Tier::Core, ClaimType::MarketEligible, Direction::Short, 0.5),
        ];
        let result = aggregator().aggregate(&claims, &unit_weights(&["a", "b"]), NOW);
        // 0.9 − 0.5 × 1.0 × 0.1 × 0.5 = 0.875
        assert!((result.total_confidence - 0.875).abs() < 1e-12);
        assert!(result.is_tradeable);
        assert_eq!(result.dominant_strategy_id.as_deref(), Some("a"));
    }

    #[test]
    fn tie_breaks_lexicographically() {
        let claims = vec![
            routed("zeta", Tier::Core, ClaimType::RegimeMatched, Direction::Long, 0.8),
            routed("alpha", Tier::Core, ClaimType::RegimeMatched, Direction::Long, 0.8),
        ];
        let result = aggregator().aggregate(&claims, &unit_weights(&["zeta", "alpha"]), NOW);
        assert_eq!(result.dominant_strategy_id.as_deref(), Some("alpha"));
    }

    #[test]
    fn ceiling_holds_under_heavy_agreement() {
        let mut claims = vec![routed(
            "t1",
            Tier::Core,
            ClaimType::MarketEligible,
            Direction::Long,
            0.94,
        )];
        for i in 0..20 {
            claims.push(routed(
                &format!("aux{i}"),
                Tier::Auxiliary,
                ClaimType::RegimeMatched,
                Direction::Long,
                1.0,
            ));
        }
        let weights: HashMap<String, f64> =
            claims.iter().map(|c| (c.claim.strategy_id.clone(), 2.88)).collect();
        let result = aggregator().aggregate(&claims, &weights, NOW);
        assert!(result.total_confidence <= 0.95 + 1e-12);
        assert!(result.is_tradeable);
    }

    #[test]
    fn floor_holds_under_heavy_opposition() {
        let mut claims = vec![routed(
            "t1",
            Tier::Core,
            ClaimType::MarketEligible,
            Direction::Long,
            0.6,
        )];
        for i in 0..30 {
            claims.push(routed(
                &format!("aux{i}"),
                Tier::Auxiliary,
                ClaimType::RegimeConflict,
                Direction::Short,
                1.0,
            ));
        }
        let weights: HashMap<String, f64> =
            claims.iter().map(|c| (c.claim.strategy_id.clone(), 2.0)).collect();
        let result = aggregator().aggregate(&claims, &weights, NOW);
        assert!(result.total_confidence >= 0.0);
        assert!(!result.is_tradeable);
        assert_eq!(result.resolution_reason, ResolutionReason::BelowThreshold);
    }

    #[test]
    fn neutral_direction_claims_are_skipped() {
        let claims = vec![
            routed("t1", Tier::Core, ClaimType::MarketEligible, Direction::Long, 0.7),
            routed("flat", Tier::Auxiliary, ClaimType::RegimeMatched, Direction::Neutral, 0.9),
        ];
        let result = aggregator().aggregate(&claims, &unit_weights(&["t1", "flat"]), NOW);
        assert!((result.total_confidence - 0.7).abs() < 1e-12);
    }

    #[test]
    fn empty_claim_set_refuses() {
        let result = aggregator().aggregate(&[], &HashMap::new(), NOW);
        assert!(!result.is_tradeable);
        assert_eq!(result.resolution_reason, ResolutionReason::NoDirectionalClaims);
    }
}
