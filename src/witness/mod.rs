// =============================================================================
// Witness subsystem — claims, the witness contract, and the panel registry
// =============================================================================
//
// A witness is a registered strategy component that observes market bars and
// emits at most one claim per loop.  Witnesses are architecturally incapable
// of placing orders, reading account state, or sizing positions: the contract
// simply does not expose those primitives, and a witness that declares any of
// those capabilities is rejected at registration time.
// =============================================================================

mod claim;
mod event;
mod features;
mod panel;

pub use claim::{claim_type_permitted, Claim};
pub use event::{builtin_witnesses, BarPredicate, EventDefinition, EventWitness, REGIME_CONSTRAINT};
pub use features::BarFeatures;
pub use panel::{CollectedClaims, RoutedClaim, WitnessPanel, WitnessRecord};

use crate::market::Bar;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Capabilities a witness may declare.  Only `EmitClaims` is permitted; the
/// other variants exist so that a non-conforming implementation is named and
/// rejected at registration, not discovered at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    EmitClaims,
    PlaceOrders,
    ReadAccountState,
    SizePositions,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmitClaims => write!(f, "EMIT_CLAIMS"),
            Self::PlaceOrders => write!(f, "PLACE_ORDERS"),
            Self::ReadAccountState => write!(f, "READ_ACCOUNT_STATE"),
            Self::SizePositions => write!(f, "SIZE_POSITIONS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure inside a single witness.  Contained by the panel: logged, counted,
/// and the loop continues with the remaining witnesses.
#[derive(Debug, Clone)]
pub enum WitnessError {
    /// Not enough bars to evaluate the event definition.
    InsufficientData { needed: usize, got: usize },
    /// A feature computation produced a non-finite value.
    FeatureFailure(String),
}

impl std::fmt::Display for WitnessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientData { needed, got } => {
                write!(f, "insufficient bars: needed {needed}, got {got}")
            }
            Self::FeatureFailure(reason) => write!(f, "feature computation failed: {reason}"),
        }
    }
}

impl std::error::Error for WitnessError {}

/// Registry-level failures.
#[derive(Debug, Clone)]
pub enum RegistryError {
    /// The witness declared a capability outside the claim-emission contract.
    ArchitectureViolation {
        witness_id: String,
        capability: Capability,
    },
    DuplicateId(String),
    UnknownWitness(String),
    /// Veto witnesses keep the tier they were registered with, and no
    /// witness may be moved into the veto tier after registration.
    TierChangeDenied { witness_id: String, reason: String },
    /// The requested status change is not legal for this witness.
    StatusChangeDenied { witness_id: String, reason: String },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ArchitectureViolation {
                witness_id,
                capability,
            } => write!(
                f,
                "witness {witness_id} declares forbidden capability {capability}"
            ),
            Self::DuplicateId(id) => write!(f, "witness id {id} already registered"),
            Self::UnknownWitness(id) => write!(f, "unknown witness {id}"),
            Self::TierChangeDenied { witness_id, reason } => {
                write!(f, "tier change denied for {witness_id}: {reason}")
            }
            Self::StatusChangeDenied { witness_id, reason } => {
                write!(f, "status change denied for {witness_id}: {reason}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

// ---------------------------------------------------------------------------
// The witness contract
// ---------------------------------------------------------------------------

/// The narrow contract every strategy component implements.
///
/// `generate_claim` receives a read-only bar slice and returns at most one
/// claim.  There is deliberately no way to reach the exchange, the account,
/// or the sizing logic from here.
pub trait Witness: Send + Sync {
    fn id(&self) -> &str;

    /// Capabilities this implementation claims to need.  Anything beyond
    /// `EmitClaims` fails registration.
    fn declared_capabilities(&self) -> &[Capability] {
        &[Capability::EmitClaims]
    }

    fn generate_claim(&self, bars: &[Bar]) -> Result<Option<Claim>, WitnessError>;
}
