// =============================================================================
// Witness Health — rolling outcome tracking, grading, auto-mute
// =============================================================================
//
// Every settled trade outcome is attributed back to the witnesses that argued
// for it.  Health grades feed the weight manager (pulled at read time, never
// pushed) and the lifecycle manager's degrade/recover rules.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Grades
// ---------------------------------------------------------------------------

/// Health grade of a witness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

impl Grade {
    /// Multiplier the weight manager applies for this grade.
    pub fn weight_scalar(self) -> f64 {
        match self {
            Self::A => 1.2,
            Self::B => 1.0,
            Self::C => 0.7,
            Self::D => 0.5,
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
            Self::D => write!(f, "D"),
        }
    }
}

/// Win-rate cutoffs for each grade.  Below `MIN_GRADED_SAMPLES` outcomes the
/// grade is capped at B: thin evidence never earns the A boost.
const GRADE_A_WIN_RATE: f64 = 0.58;
const GRADE_B_WIN_RATE: f64 = 0.52;
const GRADE_C_WIN_RATE: f64 = 0.45;
const MIN_GRADED_SAMPLES: u64 = 30;

/// Sample size at which a grade-D witness is auto-muted.
const AUTO_MUTE_SAMPLES: u64 = 50;

/// Health snapshot for one witness.
#[derive(Debug, Clone, Serialize)]
pub struct WitnessHealth {
    pub win_rate: f64,
    pub sample_count: u64,
    pub grade: Grade,
    pub weight_scalar: f64,
}

impl WitnessHealth {
    fn from_counts(wins: u64, samples: u64) -> Self {
        let win_rate = if samples > 0 {
            wins as f64 / samples as f64
        } else {
            0.5
        };
        let grade = grade_for(win_rate, samples);
        Self {
            win_rate,
            sample_count: samples,
            grade,
            weight_scalar: grade.weight_scalar(),
        }
    }
}

fn grade_for(win_rate: f64, samples: u64) -> Grade {
    let raw = if win_rate >= GRADE_A_WIN_RATE {
        Grade::A
    } else if win_rate >= GRADE_B_WIN_RATE {
        Grade::B
    } else if win_rate >= GRADE_C_WIN_RATE {
        Grade::C
    } else {
        Grade::D
    };

    if samples < MIN_GRADED_SAMPLES && raw == Grade::A {
        Grade::B
    } else {
        raw
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
struct Counts {
    wins: u64,
    samples: u64,
}

/// Outcome of recording a trade result for one witness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthUpdate {
    Recorded,
    /// The witness crossed the auto-mute threshold with this sample.
    AutoMute,
}

/// Tracks win/loss counts per witness and derives grades on demand.
pub struct HealthManager {
    counts: RwLock<HashMap<String, Counts>>,
}

impl HealthManager {
    pub fn new() -> Self {
        Self {
            counts: RwLock::new(HashMap::new()),
        }
    }

    /// Record one settled outcome for `id`.  Returns `AutoMute` exactly when
    /// this sample takes the witness to grade D with enough evidence.
    pub fn record_outcome(&self, id: &str, win: bool) -> HealthUpdate {
        let mut counts = self.counts.write();
        let entry = counts.entry(id.to_string()).or_default();
        entry.samples += 1;
        if win {
            entry.wins += 1;
        }

        let health = WitnessHealth::from_counts(entry.wins, entry.samples);
        debug!(
            witness = id,
            win,
            win_rate = health.win_rate,
            samples = health.sample_count,
            grade = %health.grade,
            "outcome recorded"
        );

        if health.grade == Grade::D && health.sample_count >= AUTO_MUTE_SAMPLES {
            warn!(
                witness = id,
                win_rate = health.win_rate,
                samples = health.sample_count,
                "witness crossed the auto-mute threshold"
            );
            HealthUpdate::AutoMute
        } else {
            HealthUpdate::Recorded
        }
    }

    /// Current health snapshot for `id`.  Unknown witnesses get a neutral
    /// grade-B snapshot with zero samples.
    pub fn health(&self, id: &str) -> WitnessHealth {
        let counts = self.counts.read();
        match counts.get(id) {
            Some(c) => WitnessHealth::from_counts(c.wins, c.samples),
            None => WitnessHealth {
                win_rate: 0.5,
                sample_count: 0,
                grade: Grade::B,
                weight_scalar: Grade::B.weight_scalar(),
            },
        }
    }

    /// Snapshot of every tracked witness.
    pub fn all(&self) -> HashMap<String, WitnessHealth> {
        let counts = self.counts.read();
        counts
            .iter()
            .map(|(id, c)| (id.clone(), WitnessHealth::from_counts(c.wins, c.samples)))
            .collect()
    }

    /// Drop all history for a witness (used on unregister/retire).
    pub fn forget(&self, id: &str) {
        self.counts.write().remove(id);
    }
}

impl Default for HealthManager {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn feed(mgr: &HealthManager, id: &str, wins: u64, losses: u64) -> HealthUpdate {
        let mut last = HealthUpdate::Recorded;
        for _ in 0..wins {
            last = mgr.record_outcome(id, true);
        }
        for _ in 0..losses {
            last = mgr.record_outcome(id, false);
        }
        last
    }

    #[test]
    fn unknown_witness_gets_neutral_grade() {
        let mgr = HealthManager::new();
        let h = mgr.health("nobody");
        assert_eq!(h.grade, Grade::B);
        assert_eq!(h.sample_count, 0);
        assert!((h.weight_scalar - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn grade_scalar_mapping() {
        assert!((Grade::A.weight_scalar() - 1.2).abs() < f64::EPSILON);
        assert!((Grade::B.weight_scalar() - 1.0).abs() < f64::EPSILON);
        assert!((Grade::C.weight_scalar() - 0.7).abs() < f64::EPSILON);
        assert!((Grade::D.weight_scalar() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn strong_record_earns_grade_a() {
        let mgr = HealthManager::new();
        feed(&mgr, "w", 24, 16); // 60% over 40 samples
        let h = mgr.health("w");
        assert_eq!(h.grade, Grade::A);
        assert!((h.win_rate - 0.6).abs() < 1e-9);
    }

    #[test]
    fn thin_evidence_caps_at_grade_b() {
        let mgr = HealthManager::new();
        feed(&mgr, "w", 9, 1); // 90% but only 10 samples
        assert_eq!(mgr.health("w").grade, Grade::B);
    }

    #[test]
    fn grade_degrades_as_losses_accumulate() {
        let mgr = HealthManager::new();
        feed(&mgr, "w", 24, 16); // A at 60%
        assert_eq!(mgr.health("w").grade, Grade::A);

        feed(&mgr, "w", 0, 12); // 24/52 ≈ 46% → C
        assert_eq!(mgr.health("w").grade, Grade::C);
    }

    #[test]
    fn auto_mute_requires_grade_d_and_samples() {
        let mgr = HealthManager::new();

        // 40% over 30 samples: grade D but short of the evidence bar.
        let update = feed(&mgr, "early", 12, 18);
        assert_eq!(mgr.health("early").grade, Grade::D);
        assert_eq!(update, HealthUpdate::Recorded);

        // 40% over 50 samples: auto-mute fires.
        let update = feed(&mgr, "late", 20, 30);
        assert_eq!(update, HealthUpdate::AutoMute);
    }

    #[test]
    fn forget_resets_history() {
        let mgr = HealthManager::new();
        feed(&mgr, "w", 10, 40);
        mgr.forget("w");
        assert_eq!(mgr.health("w").sample_count, 0);
        assert_eq!(mgr.health("w").grade, Grade::B);
    }
}
