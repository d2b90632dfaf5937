//! Graduation Engine
//!
//! Moves a market from curve pricing to pool pricing once its market cap
//! reaches the graduation threshold.
//!
//! ```text
//!   ┌───────────────┐   market_cap >= threshold   ┌───────────┐
//!   │ NotGraduated  │ ──────────────────────────▶ │ Graduated │
//!   └───────────────┘        (irreversible)       └───────────┘
//! ```
//!
//! The pool is seeded with the dex reserve converted to curve units on the
//! A side and the curve's base reserve on the B side. The pool is built and
//! funded off to the side first; the market is only frozen after seeding
//! succeeded, so a failed migration changes nothing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::MarketResult;
use crate::fixed_point;
use crate::market::{Market, MigrationRecord};
use crate::pool::ConstantProductPool;
use crate::types::{Address, AssetId, TxContext, ZERO_ADDRESS};

/// Graduation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraduationConfig {
    /// Receives the seed liquidity shares. The zero address locks them.
    pub liquidity_recipient: Address,
}

impl Default for GraduationConfig {
    fn default() -> Self {
        Self {
            liquidity_recipient: ZERO_ADDRESS,
        }
    }
}

/// Owns every graduated pool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraduationEngine {
    config: GraduationConfig,
    pools: HashMap<AssetId, ConstantProductPool>,
}

impl GraduationEngine {
    pub fn new(config: GraduationConfig) -> Self {
        Self {
            config,
            pools: HashMap::new(),
        }
    }

    pub fn config(&self) -> &GraduationConfig {
        &self.config
    }

    /// Graduate `market` if it has crossed its threshold.
    ///
    /// Returns the migration record only when this call performed the
    /// migration. Already-graduated or below-threshold markets yield
    /// `Ok(None)`, so repeated checks never migrate twice.
    pub fn check_and_migrate(
        &mut self,
        market: &mut Market,
        now: u64,
    ) -> MarketResult<Option<MigrationRecord>> {
        if market.graduated || self.pools.contains_key(&market.asset_id) {
            return Ok(None);
        }
        if !market.graduation_ready() {
            return Ok(None);
        }

        let pool = self.seed_pool(market, now)?;
        let record = MigrationRecord {
            pool_address: *pool.address(),
            total_liquidity: pool.total_liquidity_supply(),
            timestamp: now,
        };

        market.mark_graduated(record);
        self.pools.insert(market.asset_id, pool);
        Ok(Some(record))
    }

    fn seed_pool(&self, market: &Market, now: u64) -> MarketResult<ConstantProductPool> {
        let amount_a = fixed_point::mul(market.dex_reserve, market.wrap_per_unit)?;
        let amount_b = market.reserve_balance;

        let mut pool = ConstantProductPool::new(market.asset_id, now);
        pool.deposit(true, amount_a)?;
        pool.deposit(false, amount_b)?;

        let ctx = TxContext::new(*pool.address(), now);
        pool.mint(&ctx, self.config.liquidity_recipient, now)?;
        Ok(pool)
    }

    pub fn pool(&self, asset_id: &AssetId) -> Option<&ConstantProductPool> {
        self.pools.get(asset_id)
    }

    pub fn pool_mut(&mut self, asset_id: &AssetId) -> Option<&mut ConstantProductPool> {
        self.pools.get_mut(asset_id)
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }
}
