// =============================================================================
// Event witnesses — declarative strategy definitions over bar features
// =============================================================================
//
// One concrete witness type covers the whole panel: an `EventWitness` holds a
// declarative `EventDefinition` (a set of AND-combined predicates over
// `BarFeatures` plus tier/direction/claim metadata).  The registry stores
// instances, never generated types, so a discovered hypothesis becomes a new
// definition value rather than new code.
// =============================================================================

use serde::{Deserialize, Serialize};

use super::claim::Claim;
use super::features::BarFeatures;
use super::{Witness, WitnessError};
use crate::market::Bar;
use crate::types::{ClaimType, Direction, Tier, TradeRegime};

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

/// A single condition over the computed bar features.  A predicate whose
/// underlying feature is unavailable evaluates to false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BarPredicate {
    RsiBelow(f64),
    RsiAbove(f64),
    EmaFastAboveSlow,
    EmaFastBelowSlow,
    /// Current ATR divided by the prior window's ATR exceeds the threshold.
    AtrRatioAbove(f64),
    /// Close breaks above the rolling high of the prior window.
    BreakAboveRollingHigh,
    /// Close breaks below the rolling low of the prior window.
    BreakBelowRollingLow,
    /// Newest bar volume exceeds the window mean by the given multiple.
    VolumeRatioAbove(f64),
    /// Low pierced the rolling low but the close recovered above it.
    SweepBelowAndReclaim,
    /// High pierced the rolling high but the close fell back under it.
    SweepAboveAndReject,
}

impl BarPredicate {
    pub fn evaluate(&self, f: &BarFeatures) -> bool {
        match self {
            Self::RsiBelow(limit) => f.rsi.map_or(false, |v| v < *limit),
            Self::RsiAbove(limit) => f.rsi.map_or(false, |v| v > *limit),
            Self::EmaFastAboveSlow => match (f.ema_fast, f.ema_slow) {
                (Some(fast), Some(slow)) => fast > slow,
                _ => false,
            },
            Self::EmaFastBelowSlow => match (f.ema_fast, f.ema_slow) {
                (Some(fast), Some(slow)) => fast < slow,
                _ => false,
            },
            Self::AtrRatioAbove(limit) => f.atr_ratio.map_or(false, |v| v > *limit),
            Self::BreakAboveRollingHigh => f.rolling_high.map_or(false, |h| f.close > h),
            Self::BreakBelowRollingLow => f.rolling_low.map_or(false, |l| f.close < l),
            Self::VolumeRatioAbove(limit) => f.volume_ratio.map_or(false, |v| v > *limit),
            Self::SweepBelowAndReclaim => {
                f.rolling_low.map_or(false, |l| f.low < l && f.close > l)
            }
            Self::SweepAboveAndReject => {
                f.rolling_high.map_or(false, |h| f.high > h && f.close < h)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Event definition
// ---------------------------------------------------------------------------

/// Declarative description of the market event a witness watches for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDefinition {
    pub id: String,
    /// All predicates must hold for a claim to be emitted.
    pub predicates: Vec<BarPredicate>,
    pub claim_type: ClaimType,
    pub direction: Direction,
    /// Baseline confidence when the event fires.
    pub confidence: f64,
    pub validity_window_secs: i64,
    /// Qualitative regime this event characterises; carried on the claim as
    /// an advisory constraint.
    pub regime: TradeRegime,
    /// Minimum bars needed before the event can be evaluated.
    pub min_bars: usize,
}

/// Constraint key under which a claim carries its event's regime.
pub const REGIME_CONSTRAINT: &str = "regime";

// ---------------------------------------------------------------------------
// Event witness
// ---------------------------------------------------------------------------

/// The single concrete witness implementation backing the panel.
pub struct EventWitness {
    definition: EventDefinition,
}

impl EventWitness {
    pub fn new(definition: EventDefinition) -> Self {
        Self { definition }
    }

    pub fn definition(&self) -> &EventDefinition {
        &self.definition
    }
}

impl Witness for EventWitness {
    fn id(&self) -> &str {
        &self.definition.id
    }

    fn generate_claim(&self, bars: &[Bar]) -> Result<Option<Claim>, WitnessError> {
        if bars.len() < self.definition.min_bars {
            return Ok(None);
        }

        let features = BarFeatures::compute(bars).ok_or(WitnessError::InsufficientData {
            needed: self.definition.min_bars,
            got: bars.len(),
        })?;

        if !features.close.is_finite() {
            return Err(WitnessError::FeatureFailure(
                "non-finite close price".to_string(),
            ));
        }

        if !self
            .definition
            .predicates
            .iter()
            .all(|p| p.evaluate(&features))
        {
            return Ok(None);
        }

        // A volume surge lends extra conviction, capped well below certainty.
        let boost = features
            .volume_ratio
            .filter(|&vr| vr > 2.0)
            .map_or(0.0, |vr| ((vr - 2.0) * 0.05).min(0.1));

        let timestamp = bars.last().map(|b| b.close_time).unwrap_or_default();

        let claim = Claim::new(
            self.definition.id.clone(),
            self.definition.claim_type,
            (self.definition.confidence + boost).min(1.0),
            self.definition.validity_window_secs,
            self.definition.direction,
            timestamp,
        )
        .with_constraint(REGIME_CONSTRAINT, self.definition.regime.to_string());

        Ok(Some(claim))
    }
}

// ---------------------------------------------------------------------------
// Built-in panel
// ---------------------------------------------------------------------------

/// The stock panel registered at startup: core breakout and volatility
/// witnesses, auxiliary regime support, and a veto guard against runaway
/// volatility.
pub fn builtin_witnesses() -> Vec<(EventWitness, Tier)> {
    let defs: Vec<(EventDefinition, Tier)> = vec![
        (
            EventDefinition {
                id: "breakout-long".to_string(),
                predicates: vec![
                    BarPredicate::BreakAboveRollingHigh,
                    BarPredicate::VolumeRatioAbove(1.5),
                ],
                claim_type: ClaimType::MarketEligible,
                direction: Direction::Long,
                confidence: 0.70,
                validity_window_secs: 300,
                regime: TradeRegime::RangeStructureBreak,
                min_bars: 30,
            },
            Tier::Core,
        ),
        (
            EventDefinition {
                id: "breakout-short".to_string(),
                predicates: vec![
                    BarPredicate::BreakBelowRollingLow,
                    BarPredicate::VolumeRatioAbove(1.5),
                ],
                claim_type: ClaimType::MarketEligible,
                direction: Direction::Short,
                confidence: 0.70,
                validity_window_secs: 300,
                regime: TradeRegime::RangeStructureBreak,
                min_bars: 30,
            },
            Tier::Core,
        ),
        (
            EventDefinition {
                id: "vol-expansion-long".to_string(),
                predicates: vec![
                    BarPredicate::AtrRatioAbove(1.3),
                    BarPredicate::EmaFastAboveSlow,
                ],
                claim_type: ClaimType::MarketEligible,
                direction: Direction::Long,
                confidence: 0.65,
                validity_window_secs: 300,
                regime: TradeRegime::VolatilityExpansion,
                min_bars: 30,
            },
            Tier::Core,
        ),
        (
            EventDefinition {
                id: "vol-expansion-short".to_string(),
                predicates: vec![
                    BarPredicate::AtrRatioAbove(1.3),
                    BarPredicate::EmaFastBelowSlow,
                ],
                claim_type: ClaimType::MarketEligible,
                direction: Direction::Short,
                confidence: 0.65,
                validity_window_secs: 300,
                regime: TradeRegime::VolatilityExpansion,
                min_bars: 30,
            },
            Tier::Core,
        ),
        (
            EventDefinition {
                id: "sweep-reclaim-long".to_string(),
                predicates: vec![
                    BarPredicate::SweepBelowAndReclaim,
                    BarPredicate::VolumeRatioAbove(1.2),
                ],
                claim_type: ClaimType::MarketEligible,
                direction: Direction::Long,
                confidence: 0.60,
                validity_window_secs: 300,
                regime: TradeRegime::LiquiditySweep,
                min_bars: 30,
            },
            Tier::Core,
        ),
        (
            EventDefinition {
                id: "trend-support-long".to_string(),
                predicates: vec![BarPredicate::EmaFastAboveSlow],
                claim_type: ClaimType::RegimeMatched,
                direction: Direction::Long,
                confidence: 0.50,
                validity_window_secs: 300,
                regime: TradeRegime::NoRegime,
                min_bars: 25,
            },
            Tier::Auxiliary,
        ),
        (
            EventDefinition {
                id: "trend-support-short".to_string(),
                predicates: vec![BarPredicate::EmaFastBelowSlow],
                claim_type: ClaimType::RegimeMatched,
                direction: Direction::Short,
                confidence: 0.50,
                validity_window_secs: 300,
                regime: TradeRegime::NoRegime,
                min_bars: 25,
            },
            Tier::Auxiliary,
        ),
        (
            EventDefinition {
                id: "momentum-exhaustion".to_string(),
                predicates: vec![BarPredicate::RsiAbove(75.0)],
                claim_type: ClaimType::RegimeConflict,
                direction: Direction::Short,
                confidence: 0.55,
                validity_window_secs: 300,
                regime: TradeRegime::NoRegime,
                min_bars: 20,
            },
            Tier::Auxiliary,
        ),
        (
            EventDefinition {
                id: "volatility-guard".to_string(),
                predicates: vec![BarPredicate::AtrRatioAbove(2.5)],
                claim_type: ClaimType::ExecutionVeto,
                direction: Direction::Neutral,
                confidence: 0.90,
                validity_window_secs: 300,
                regime: TradeRegime::NoRegime,
                min_bars: 30,
            },
            Tier::Veto,
        ),
    ];

    defs.into_iter()
        .map(|(def, tier)| (EventWitness::new(def), tier))
        .collect()
}
