// =============================================================================
// Paper exchange client — deterministic in-process fills
// =============================================================================
//
// Fills at the configured mark price plus a fixed slippage, tracks positions
// per symbol, and can be switched into failure modes (reject every order, or
// hang past any reasonable deadline) to exercise the executor's isolation
// and timeout paths.
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::types::{Direction, OrderStatus};

use super::{ExchangeClient, ExchangeError, ExchangeOrderResult, OrderRequest, Position};

/// Slippage applied to every paper fill, in basis points.
const SLIPPAGE_BPS: f64 = 2.0;
/// Commission charged on the filled notional.
const COMMISSION_RATE: f64 = 0.001;
/// How long a hanging client sleeps; far past any executor deadline.
const HANG_DURATION: Duration = Duration::from_secs(3_600);

/// Failure behaviour of the paper client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    None,
    /// Every order comes back rejected.
    Reject,
    /// Every order hangs until the caller's deadline fires.
    Hang,
}

pub struct PaperClient {
    mark_price: RwLock<f64>,
    fail_mode: RwLock<FailMode>,
    positions: RwLock<HashMap<String, Position>>,
}

impl PaperClient {
    pub fn new(mark_price: f64) -> Self {
        Self {
            mark_price: RwLock::new(mark_price),
            fail_mode: RwLock::new(FailMode::None),
            positions: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_mark_price(&self, price: f64) {
        *self.mark_price.write() = price;
    }

    pub fn set_fail_mode(&self, mode: FailMode) {
        *self.fail_mode.write() = mode;
    }
}

#[async_trait]
impl ExchangeClient for PaperClient {
    async fn place_order(&self, order: &OrderRequest) -> Result<ExchangeOrderResult, ExchangeError> {
        let fail_mode = *self.fail_mode.read();
        match fail_mode {
            FailMode::Reject => {
                return Err(ExchangeError::Rejected {
                    code: -2010,
                    message: "paper client configured to reject".to_string(),
                });
            }
            FailMode::Hang => {
                tokio::time::sleep(HANG_DURATION).await;
                return Err(ExchangeError::Timeout);
            }
            FailMode::None => {}
        }

        let mark = *self.mark_price.read();
        let slip = mark * SLIPPAGE_BPS / 10_000.0;
        let executed_price = match order.direction {
            Direction::Long => mark + slip,
            Direction::Short => mark - slip,
            Direction::Neutral => {
                return Err(ExchangeError::Rejected {
                    code: -1,
                    message: "order without direction".to_string(),
                })
            }
        };

        let commission = executed_price * order.quantity * COMMISSION_RATE;

        self.positions.write().insert(
            order.symbol.clone(),
            Position {
                symbol: order.symbol.clone(),
                direction: order.direction,
                quantity: order.quantity,
                entry_price: executed_price,
            },
        );

        debug!(
            order_id = %order.order_id,
            symbol = %order.symbol,
            executed_price,
            quantity = order.quantity,
            "paper fill"
        );

        Ok(ExchangeOrderResult {
            order_id: order.order_id.clone(),
            status: OrderStatus::Filled,
            executed_quantity: order.quantity,
            executed_price,
            commission,
        })
    }

    async fn cancel_order(&self, _symbol: &str, _order_id: &str) -> Result<bool, ExchangeError> {
        // Paper fills are immediate; there is never a resting order.
        Ok(false)
    }

    async fn get_position(&self, symbol: &str) -> Result<Position, ExchangeError> {
        Ok(self
            .positions
            .read()
            .get(symbol)
            .cloned()
            .unwrap_or(Position {
                symbol: symbol.to_string(),
                direction: Direction::Neutral,
                quantity: 0.0,
                entry_price: 0.0,
            }))
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: &str, direction: Direction) -> OrderRequest {
        OrderRequest {
            order_id: id.to_string(),
            symbol: "BTCUSDT".to_string(),
            direction,
            quantity: 0.5,
            price: None,
        }
    }

    #[tokio::test]
    async fn fills_with_slippage_and_commission() {
        let client = PaperClient::new(50_000.0);
        let result = client.place_order(&order("o1", Direction::Long)).await.unwrap();

        assert_eq!(result.status, OrderStatus::Filled);
        assert!((result.executed_quantity - 0.5).abs() < 1e-12);
        assert!(result.executed_price > 50_000.0);
        assert!(result.commission > 0.0);

        let pos = client.get_position("BTCUSDT").await.unwrap();
        assert_eq!(pos.direction, Direction::Long);
        assert!((pos.quantity - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn short_fills_below_mark() {
        let client = PaperClient::new(50_000.0);
        let result = client.place_order(&order("o1", Direction::Short)).await.unwrap();
        assert!(result.executed_price < 50_000.0);
    }

    #[tokio::test]
    async fn reject_mode_returns_typed_rejection() {
        let client = PaperClient::new(50_000.0);
        client.set_fail_mode(FailMode::Reject);
        let err = client.place_order(&order("o1", Direction::Long)).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Rejected { code: -2010, .. }));
    }

    #[tokio::test]
    async fn hang_mode_exceeds_caller_deadlines() {
        let client = PaperClient::new(50_000.0);
        client.set_fail_mode(FailMode::Hang);
        let order = order("o1", Direction::Long);
        let fut = client.place_order(&order);
        let outcome = tokio::time::timeout(Duration::from_millis(50), fut).await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn flat_symbol_reports_neutral_position() {
        let client = PaperClient::new(50_000.0);
        let pos = client.get_position("ETHUSDT").await.unwrap();
        assert_eq!(pos.direction, Direction::Neutral);
        assert!(pos.quantity.abs() < 1e-12);
    }
}
