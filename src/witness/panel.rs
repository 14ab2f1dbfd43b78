// =============================================================================
// Witness Panel — registry, routing, and per-loop claim collection
// =============================================================================
//
// The panel owns every registered witness instance plus its runtime record
// (tier, lifecycle status, mute flag, error counters).  Claim collection is
// budget-bounded and failure-isolated: one witness erroring or overrunning
// never stalls the loop for the rest of the panel.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use super::claim::{claim_type_permitted, Claim};
use super::{Capability, RegistryError, Witness};
use crate::market::Bar;
use crate::types::{now_ms, LifecycleStatus, Tier};

// ---------------------------------------------------------------------------
// Runtime record
// ---------------------------------------------------------------------------

/// Per-witness runtime record maintained by the panel.
#[derive(Debug, Clone, Serialize)]
pub struct WitnessRecord {
    pub tier: Tier,
    pub status: LifecycleStatus,
    /// Suppresses claim emission without changing lifecycle status.
    pub muted: bool,
    pub error_count: u64,
    pub invalid_claims: u64,
    pub registered_at: i64,
    pub status_changed_at: i64,
    /// Set when the witness entered DEGRADED; cleared on recovery.
    pub degraded_since: Option<i64>,
    /// Start of the current uninterrupted grade-A streak, if any.
    pub grade_a_since: Option<i64>,
}

/// A claim routed to the aggregator, tagged with its witness's tier.
#[derive(Debug, Clone)]
pub struct RoutedClaim {
    pub claim: Claim,
    pub tier: Tier,
}

/// Result of one collection pass over the panel.
#[derive(Debug, Default)]
pub struct CollectedClaims {
    /// Claims from ACTIVE witnesses, bound for the aggregator.
    pub active: Vec<RoutedClaim>,
    /// Claims from SHADOW witnesses, bound for the shadow recorder only.
    pub shadow: Vec<Claim>,
    pub errors: u32,
    pub invalid: u32,
    /// Witnesses skipped because the loop budget ran out.
    pub skipped_budget: u32,
}

// ---------------------------------------------------------------------------
// Panel
// ---------------------------------------------------------------------------

pub struct WitnessPanel {
    witnesses: RwLock<HashMap<String, Arc<dyn Witness>>>,
    records: RwLock<HashMap<String, WitnessRecord>>,
}

impl WitnessPanel {
    pub fn new() -> Self {
        Self {
            witnesses: RwLock::new(HashMap::new()),
            records: RwLock::new(HashMap::new()),
        }
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Register a witness at the given tier.
    ///
    /// A witness declaring any capability beyond claim emission is rejected
    /// here — the ordering, account, and sizing surfaces simply do not exist
    /// for witnesses, and a declaration to the contrary is a contract breach.
    ///
    /// Veto witnesses bypass the lifecycle subsystem and activate
    /// immediately; everything else starts at NEW.
    pub fn register(&self, witness: Arc<dyn Witness>, tier: Tier) -> Result<(), RegistryError> {
        let id = witness.id().to_string();

        for cap in witness.declared_capabilities() {
            if !matches!(cap, Capability::EmitClaims) {
                return Err(RegistryError::ArchitectureViolation {
                    witness_id: id,
                    capability: *cap,
                });
            }
        }

        let mut witnesses = self.witnesses.write();
        let mut records = self.records.write();
        if witnesses.contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }

        let now = now_ms();
        let status = if tier == Tier::Veto {
            LifecycleStatus::Active
        } else {
            LifecycleStatus::New
        };

        records.insert(
            id.clone(),
            WitnessRecord {
                tier,
                status,
                muted: false,
                error_count: 0,
                invalid_claims: 0,
                registered_at: now,
                status_changed_at: now,
                degraded_since: None,
                grade_a_since: None,
            },
        );
        witnesses.insert(id.clone(), witness);

        debug!(witness = %id, %tier, %status, "witness registered");
        Ok(())
    }

    pub fn unregister(&self, id: &str) -> Result<(), RegistryError> {
        let mut witnesses = self.witnesses.write();
        let mut records = self.records.write();
        if witnesses.remove(id).is_none() {
            return Err(RegistryError::UnknownWitness(id.to_string()));
        }
        records.remove(id);
        debug!(witness = id, "witness unregistered");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Ids of witnesses at `tier`, sorted for deterministic iteration.
    pub fn list_by_tier(&self, tier: Tier) -> Vec<String> {
        let records = self.records.read();
        let mut ids: Vec<String> = records
            .iter()
            .filter(|(_, r)| r.tier == tier)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn record(&self, id: &str) -> Option<WitnessRecord> {
        self.records.read().get(id).cloned()
    }

    pub fn all_records(&self) -> Vec<(String, WitnessRecord)> {
        let records = self.records.read();
        let mut out: Vec<(String, WitnessRecord)> =
            records.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.read().contains_key(id)
    }

    // -------------------------------------------------------------------------
    // Status / tier / mute management
    // -------------------------------------------------------------------------

    /// Change a witness's lifecycle status.  RETIRED is absorbing, and veto
    /// witnesses keep the ACTIVE status they were registered with.
    pub fn set_status(
        &self,
        id: &str,
        status: LifecycleStatus,
        reason: &str,
    ) -> Result<(), RegistryError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownWitness(id.to_string()))?;

        if record.status == LifecycleStatus::Retired {
            return Err(RegistryError::StatusChangeDenied {
                witness_id: id.to_string(),
                reason: "RETIRED is terminal".to_string(),
            });
        }
        if record.tier == Tier::Veto && status != LifecycleStatus::Active {
            return Err(RegistryError::StatusChangeDenied {
                witness_id: id.to_string(),
                reason: "veto witnesses stay ACTIVE".to_string(),
            });
        }

        let now = now_ms();
        let from = record.status;
        record.status = status;
        record.status_changed_at = now;
        record.degraded_since = if status == LifecycleStatus::Degraded {
            record.degraded_since.or(Some(now))
        } else {
            None
        };

        debug!(witness = id, %from, to = %status, reason, "witness status changed");
        Ok(())
    }

    /// Move a witness between the core and auxiliary tiers.  The veto tier
    /// is closed in both directions after registration.
    pub fn set_tier(&self, id: &str, tier: Tier) -> Result<(), RegistryError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownWitness(id.to_string()))?;

        if record.tier == Tier::Veto {
            return Err(RegistryError::TierChangeDenied {
                witness_id: id.to_string(),
                reason: "veto witnesses keep their tier".to_string(),
            });
        }
        if tier == Tier::Veto {
            return Err(RegistryError::TierChangeDenied {
                witness_id: id.to_string(),
                reason: "the veto tier is fixed at registration".to_string(),
            });
        }

        let from = record.tier;
        record.tier = tier;
        debug!(witness = id, %from, to = %tier, "witness tier changed");
        Ok(())
    }

    /// Suppress or restore claim emission without touching lifecycle status.
    pub fn set_muted(&self, id: &str, muted: bool, reason: &str) -> Result<(), RegistryError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownWitness(id.to_string()))?;
        record.muted = muted;
        debug!(witness = id, muted, reason, "witness mute flag changed");
        Ok(())
    }

    /// Internal mutation hook for the lifecycle manager.
    pub(crate) fn update_record<F>(&self, id: &str, f: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut WitnessRecord),
    {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownWitness(id.to_string()))?;
        f(record);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Claim collection
    // -------------------------------------------------------------------------

    /// Run every eligible witness against the bar slice, within `budget`.
    ///
    /// Witnesses are visited in id order for determinism.  A witness error
    /// is logged and counted, never propagated.  Once the budget is spent the
    /// remaining witnesses are skipped and counted.
    pub fn collect(&self, bars: &[Bar], budget: Duration) -> CollectedClaims {
        // Snapshot under the read lock, then release it before running
        // witness code so a slow witness cannot hold up registration.
        let snapshot: Vec<(String, Arc<dyn Witness>, Tier, LifecycleStatus, bool)> = {
            let witnesses = self.witnesses.read();
            let records = self.records.read();
            let mut list: Vec<_> = witnesses
                .iter()
                .filter_map(|(id, w)| {
                    records.get(id).map(|r| {
                        (id.clone(), Arc::clone(w), r.tier, r.status, r.muted)
                    })
                })
                .collect();
            list.sort_by(|a, b| a.0.cmp(&b.0));
            list
        };

        let started = Instant::now();
        let mut out = CollectedClaims::default();

        for (id, witness, tier, status, muted) in snapshot {
            if started.elapsed() > budget {
                out.skipped_budget += 1;
                continue;
            }

            let routable = match status {
                LifecycleStatus::Active => !muted,
                LifecycleStatus::Shadow => true,
                _ => false,
            };
            if !routable {
                continue;
            }

            let claim = match witness.generate_claim(bars) {
                Ok(Some(claim)) => claim,
                Ok(None) => continue,
                Err(e) => {
                    warn!(witness = %id, error = %e, "witness failed; continuing with panel");
                    out.errors += 1;
                    let mut records = self.records.write();
                    if let Some(r) = records.get_mut(&id) {
                        r.error_count += 1;
                    }
                    continue;
                }
            };

            if !claim.is_well_formed() || !claim_type_permitted(tier, claim.claim_type) {
                debug!(
                    witness = %id,
                    claim_type = %claim.claim_type,
                    %tier,
                    "claim dropped: not permitted for tier or malformed"
                );
                out.invalid += 1;
                let mut records = self.records.write();
                if let Some(r) = records.get_mut(&id) {
                    r.invalid_claims += 1;
                }
                continue;
            }

            match status {
                LifecycleStatus::Shadow => out.shadow.push(claim),
                _ => out.active.push(RoutedClaim { claim, tier }),
            }
        }

        out
    }
}

impl Default for WitnessPanel {
    fn default() -> Self {
        Self::new()
    }
}
