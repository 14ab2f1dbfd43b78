// =============================================================================
// Order sizing — a pure function of user state and the abstract decision
// =============================================================================

use serde::Serialize;

use crate::types::SubscriptionTier;

/// A sized order for one user.
#[derive(Debug, Clone, Serialize)]
pub struct SizedOrder {
    pub quantity: f64,
    pub notional: f64,
    /// Fraction of the user's equity this order deploys (leverage included).
    pub position_fraction: f64,
}

/// Size one user's order for a broadcast decision.
///
/// Deliberately pure: the inputs are copied user fields plus the decision's
/// reference price, and nothing global is read or written.  The effective
/// fraction is the user's own cap bounded by the subscription tier's cap.
pub fn size_order(
    equity: f64,
    max_position_pct: f64,
    subscription: SubscriptionTier,
    leverage: f64,
    reference_price: f64,
) -> SizedOrder {
    if equity <= 0.0 || reference_price <= 0.0 || max_position_pct <= 0.0 {
        return SizedOrder {
            quantity: 0.0,
            notional: 0.0,
            position_fraction: 0.0,
        };
    }

    let fraction = max_position_pct.min(subscription.max_position_fraction());
    let notional = equity * fraction * leverage.max(1.0);
    let quantity = notional / reference_price;

    SizedOrder {
        quantity,
        notional,
        position_fraction: fraction * leverage.max(1.0),
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_sizing_uses_user_cap() {
        let sized = size_order(10_000.0, 0.02, SubscriptionTier::Pro, 1.0, 100.0);
        assert!((sized.notional - 200.0).abs() < 1e-9);
        assert!((sized.quantity - 2.0).abs() < 1e-9);
        assert!((sized.position_fraction - 0.02).abs() < 1e-12);
    }

    #[test]
    fn subscription_tier_caps_the_fraction() {
        // User asks for 5% but Basic allows only 1%.
        let sized = size_order(10_000.0, 0.05, SubscriptionTier::Basic, 1.0, 100.0);
        assert!((sized.notional - 100.0).abs() < 1e-9);
        assert!((sized.position_fraction - 0.01).abs() < 1e-12);
    }

    #[test]
    fn leverage_scales_notional_and_fraction() {
        let sized = size_order(10_000.0, 0.02, SubscriptionTier::Pro, 3.0, 100.0);
        assert!((sized.notional - 600.0).abs() < 1e-9);
        assert!((sized.position_fraction - 0.06).abs() < 1e-12);
    }

    #[test]
    fn degenerate_inputs_size_to_zero() {
        assert!(size_order(0.0, 0.02, SubscriptionTier::Pro, 1.0, 100.0).quantity == 0.0);
        assert!(size_order(1_000.0, 0.02, SubscriptionTier::Pro, 1.0, 0.0).quantity == 0.0);
        assert!(size_order(1_000.0, 0.0, SubscriptionTier::Pro, 1.0, 100.0).quantity == 0.0);
    }

    #[test]
    fn sub_unit_leverage_is_floored_to_one() {
        let sized = size_order(10_000.0, 0.02, SubscriptionTier::Pro, 0.5, 100.0);
        assert!((sized.notional - 200.0).abs() < 1e-9);
    }
}
