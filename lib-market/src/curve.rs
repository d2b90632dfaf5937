//! Linear Curve Pricing
//!
//! `price(s) = base_price + price_increment * s`, where `s` counts curve
//! units already issued. The cost of `Δ` units starting at `s` is the
//! discrete integral
//!
//! ```text
//!   Δ * base_price + price_increment * (Δ * s + Δ * (Δ - 1) / 2)
//! ```
//!
//! and sell proceeds evaluate the same sum over `[s - Δ, s)`, so buying and
//! then selling the same units is exactly reversible before fees.

use serde::{Deserialize, Serialize};

use crate::fixed_point::{self, MathError};

/// Default curve trading fee: 1%
pub const DEFAULT_TRADING_FEE_BPS: u16 = 100;

/// Default creator share of the trading fee: half
pub const DEFAULT_CREATOR_FEE_SHARE_BPS: u16 = 5_000;

/// Upper bound accepted for the trading fee (10%)
pub const MAX_TRADING_FEE_BPS: u16 = 1_000;

/// Linear price function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearCurve {
    pub base_price: u128,
    pub price_increment: u128,
}

impl LinearCurve {
    pub fn new(base_price: u128, price_increment: u128) -> Self {
        Self {
            base_price,
            price_increment,
        }
    }

    /// Marginal price of the next unit at `supply`.
    pub fn price_at(&self, supply: u128) -> Result<u128, MathError> {
        fixed_point::add(
            self.base_price,
            fixed_point::mul(self.price_increment, supply)?,
        )
    }

    /// Cost of `amount` units issued starting at `start`.
    pub fn integral(&self, start: u128, amount: u128) -> Result<u128, MathError> {
        if amount == 0 {
            return Ok(0);
        }

        // Δ(Δ-1)/2 without overflowing: halve whichever factor is even
        let triangle = if amount % 2 == 0 {
            fixed_point::mul(amount / 2, amount - 1)?
        } else {
            fixed_point::mul(amount, (amount - 1) / 2)?
        };

        let base_part = fixed_point::mul(amount, self.base_price)?;
        let slope_units = fixed_point::add(fixed_point::mul(amount, start)?, triangle)?;
        let slope_part = fixed_point::mul(self.price_increment, slope_units)?;
        fixed_point::add(base_part, slope_part)
    }

    /// Reserve the curve alone requires to back `supply` issued units.
    pub fn cost_to(&self, supply: u128) -> Result<u128, MathError> {
        self.integral(0, supply)
    }
}

/// Curve trading fee and its treasury/creator split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Fee on the base amount of every curve trade
    pub trading_fee_bps: u16,
    /// Creator's portion of each fee; the treasury receives the rest
    pub creator_share_bps: u16,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            trading_fee_bps: DEFAULT_TRADING_FEE_BPS,
            creator_share_bps: DEFAULT_CREATOR_FEE_SHARE_BPS,
        }
    }
}

impl FeeSchedule {
    pub fn fee_on(&self, base_amount: u128) -> Result<u128, MathError> {
        fixed_point::bps_of(base_amount, self.trading_fee_bps)
    }

    /// Split a fee into `(treasury, creator)`. The two always sum to `fee`.
    pub fn split(&self, fee: u128) -> Result<(u128, u128), MathError> {
        let creator = fixed_point::bps_of(fee, self.creator_share_bps)?;
        Ok((fee - creator, creator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_point::WAD;

    const MILLI: u128 = WAD / 1_000;

    #[test]
    fn test_price_is_linear() {
        let curve = LinearCurve::new(MILLI, MILLI);
        assert_eq!(curve.price_at(0).unwrap(), MILLI);
        assert_eq!(curve.price_at(9).unwrap(), 10 * MILLI);
    }

    #[test]
    fn test_first_unit_costs_base_price() {
        let curve = LinearCurve::new(MILLI, MILLI);
        assert_eq!(curve.integral(0, 1).unwrap(), MILLI);
    }

    #[test]
    fn test_integral_matches_sum_of_prices() {
        let curve = LinearCurve::new(7, 3);
        let summed: u128 = (5..5 + 11).map(|s| curve.price_at(s).unwrap()).sum();
        assert_eq!(curve.integral(5, 11).unwrap(), summed);
    }

    #[test]
    fn test_integral_is_additive() {
        let curve = LinearCurve::new(100, 13);
        let whole = curve.integral(0, 30).unwrap();
        let parts = curve.integral(0, 12).unwrap() + curve.integral(12, 18).unwrap();
        assert_eq!(whole, parts);
    }

    #[test]
    fn test_integral_overflow_reported() {
        let curve = LinearCurve::new(u128::MAX / 2, 1);
        assert_eq!(curve.integral(0, 3), Err(MathError::Overflow));
    }

    #[test]
    fn test_fee_split_sums_to_fee() {
        let fees = FeeSchedule {
            trading_fee_bps: 100,
            creator_share_bps: 3_333,
        };
        let (treasury, creator) = fees.split(1_001).unwrap();
        assert_eq!(treasury + creator, 1_001);
        assert_eq!(creator, 333);
    }

    #[test]
    fn test_one_percent_fee_rounds_down() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.fee_on(MILLI).unwrap(), MILLI / 100);
        assert_eq!(fees.fee_on(99).unwrap(), 0);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_price_non_decreasing(
                base in 0u128..=1_000_000_000_000u128,
                inc in 0u128..=1_000_000_000u128,
                supply in 0u128..=1_000_000_000u128,
            ) {
                let curve = LinearCurve::new(base, inc);
                prop_assert!(curve.price_at(supply + 1).unwrap() >= curve.price_at(supply).unwrap());
            }

            #[test]
            fn prop_integral_equals_cost_difference(
                base in 1u128..=1_000_000u128,
                inc in 0u128..=1_000u128,
                start in 0u128..=100_000u128,
                amount in 0u128..=100_000u128,
            ) {
                let curve = LinearCurve::new(base, inc);
                let diff = curve.cost_to(start + amount).unwrap() - curve.cost_to(start).unwrap();
                prop_assert_eq!(curve.integral(start, amount).unwrap(), diff);
            }
        }
    }
}
