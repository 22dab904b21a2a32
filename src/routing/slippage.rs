use rust_decimal::Decimal;
use serde::Serialize;

use crate::ledger::amount::to_decimal;

/// Difference between what a route promised and what actually landed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealizedSlippage {
    /// Amount the route estimated
    pub expected_amount: Decimal,
    /// Amount observed on the destination ledger
    pub received_amount: Decimal,
    pub slippage_amount: Decimal,
    /// Slippage percentage; negative when more arrived than estimated
    pub slippage_pct: Decimal,
    pub is_acceptable: bool,
}

impl RealizedSlippage {
    /// `max_slippage` is a fraction (0.005 = 0.5%). Returns `None` when an
    /// amount cannot be represented as a `Decimal`.
    pub fn calculate(
        expected_units: u128,
        received_units: u128,
        decimals: u8,
        max_slippage: Decimal,
    ) -> Option<Self> {
        let expected_amount = to_decimal(expected_units, decimals)?;
        let received_amount = to_decimal(received_units, decimals)?;

        let slippage_amount = expected_amount - received_amount;

        let slippage_pct = if expected_amount.is_zero() {
            Decimal::ZERO
        } else {
            (slippage_amount / expected_amount) * Decimal::from(100)
        };

        let is_acceptable = slippage_pct <= max_slippage * Decimal::from(100);

        Some(Self {
            expected_amount,
            received_amount,
            slippage_amount,
            slippage_pct,
            is_acceptable,
        })
    }

    /// Format for display
    pub fn to_display_string(&self) -> String {
        format!(
            "Expected: {} | Received: {} | Slippage: {:.2}%",
            self.expected_amount, self.received_amount, self.slippage_pct
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_slippage_within_tolerance() {
        let slippage = RealizedSlippage::calculate(98_500_000, 98_000_000, 6, dec!(0.01)).unwrap();

        assert_eq!(slippage.expected_amount, dec!(98.5));
        assert_eq!(slippage.received_amount, dec!(98));
        assert_eq!(slippage.slippage_amount, dec!(0.5));
        assert!(slippage.slippage_pct > dec!(0.50) && slippage.slippage_pct < dec!(0.51));
        assert!(slippage.is_acceptable);
    }

    #[test]
    fn test_slippage_beyond_tolerance() {
        let slippage = RealizedSlippage::calculate(100_000_000, 98_000_000, 6, dec!(0.005)).unwrap();

        assert_eq!(slippage.slippage_pct, dec!(2));
        assert!(!slippage.is_acceptable);
        assert!(slippage.to_display_string().contains("2.00%"));
    }

    #[test]
    fn test_positive_surprise_is_acceptable() {
        let slippage = RealizedSlippage::calculate(100, 110, 0, dec!(0.005)).unwrap();

        assert_eq!(slippage.slippage_pct, dec!(-10));
        assert!(slippage.is_acceptable);
    }
}
