// =============================================================================
// Exchange layer — the abstract client contract and its implementations
// =============================================================================
//
// The decision core only ever sees this contract.  Network problems surface
// as typed failures; nothing in the exchange layer panics or throws across
// the boundary.
// =============================================================================

mod paper;
mod rest;

pub use paper::{FailMode, PaperClient};
pub use rest::SignedRestClient;

use async_trait::async_trait;
use serde::Serialize;

use crate::types::{Direction, OrderStatus};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// An order as the decision core expresses it.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    /// Caller-generated id; the idempotency key on the exchange side.
    pub order_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub quantity: f64,
    /// Limit price; `None` places a market order.
    pub price: Option<f64>,
}

/// What the exchange reports back for one order.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeOrderResult {
    pub order_id: String,
    pub status: OrderStatus,
    pub executed_quantity: f64,
    pub executed_price: f64,
    pub commission: f64,
}

/// Current position for one symbol.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub symbol: String,
    pub direction: Direction,
    pub quantity: f64,
    pub entry_price: f64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Typed exchange failures.
#[derive(Debug, Clone)]
pub enum ExchangeError {
    /// The exchange refused the order.
    Rejected { code: i64, message: String },
    /// The request exceeded its deadline.
    Timeout,
    /// Transport-level failure (connect, TLS, DNS).
    Transport(String),
    /// The response could not be interpreted.
    InvalidResponse(String),
}

impl std::fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected { code, message } => write!(f, "order rejected ({code}): {message}"),
            Self::Timeout => write!(f, "exchange request timed out"),
            Self::Transport(reason) => write!(f, "exchange transport failure: {reason}"),
            Self::InvalidResponse(reason) => write!(f, "unreadable exchange response: {reason}"),
        }
    }
}

impl std::error::Error for ExchangeError {}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Narrow per-user exchange contract.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn place_order(&self, order: &OrderRequest) -> Result<ExchangeOrderResult, ExchangeError>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<bool, ExchangeError>;

    async fn get_position(&self, symbol: &str) -> Result<Position, ExchangeError>;
}
