//! Shared identifiers and parameter types

use serde::{Deserialize, Serialize};

use crate::errors::{MarketError, MarketResult};

/// Account identity (already authenticated by the execution environment)
pub type Address = [u8; 32];

/// Identifier of a launched royalty-bearing asset
pub type AssetId = [u8; 32];

/// The zero address. Liquidity minted here is permanently locked.
pub const ZERO_ADDRESS: Address = [0u8; 32];

/// Short hex prefix used in log fields.
pub fn short_id(id: &[u8; 32]) -> String {
    hex::encode(&id[..8])
}

/// Caller and clock for a single state-changing call.
///
/// The host guarantees each call is atomic and totally ordered; `now` is the
/// timestamp (seconds) the host assigns to that call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxContext {
    pub caller: Address,
    pub now: u64,
}

impl TxContext {
    pub fn new(caller: Address, now: u64) -> Self {
        Self { caller, now }
    }

    /// Fails with `DeadlineExpired` once `now` is past `deadline`.
    pub fn require_before(&self, deadline: u64) -> MarketResult<()> {
        if self.now > deadline {
            return Err(MarketError::DeadlineExpired {
                deadline,
                now: self.now,
            });
        }
        Ok(())
    }
}

/// Per-asset curve configuration supplied at launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveParams {
    /// Price of the first unit, in base-currency atomic units (18 decimals)
    pub base_price: u128,
    /// Price added per unit of supply already issued
    pub price_increment: u128,
    /// Curve units issued per locked RT unit
    pub wrap_per_unit: u128,
    /// Market cap (base atomic units) at which the market graduates
    pub graduation_threshold: u128,
}

impl CurveParams {
    pub fn validate(&self) -> MarketResult<()> {
        if self.base_price == 0 {
            return Err(MarketError::InvalidParameters(
                "base_price must be non-zero".to_string(),
            ));
        }
        if self.wrap_per_unit == 0 {
            return Err(MarketError::InvalidParameters(
                "wrap_per_unit must be non-zero".to_string(),
            ));
        }
        if self.graduation_threshold == 0 {
            return Err(MarketError::InvalidParameters(
                "graduation_threshold must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_inclusive() {
        let ctx = TxContext::new([1u8; 32], 100);
        assert!(ctx.require_before(100).is_ok());
        assert!(matches!(
            ctx.require_before(99),
            Err(MarketError::DeadlineExpired { deadline: 99, now: 100 })
        ));
    }

    #[test]
    fn test_curve_params_validation() {
        let params = CurveParams {
            base_price: 1,
            price_increment: 0,
            wrap_per_unit: 1,
            graduation_threshold: 1,
        };
        assert!(params.validate().is_ok());
        assert!(CurveParams { wrap_per_unit: 0, ..params }.validate().is_err());
        assert!(CurveParams { base_price: 0, ..params }.validate().is_err());
        assert!(CurveParams { graduation_threshold: 0, ..params }.validate().is_err());
    }
}
