//! Launch Registry
//!
//! Creates one market per asset from a locked RT amount and keeps the index
//! of every market ever launched.
//!
//! Locked RT is split 75% curve / 20% dex reserve / 5% creator reserve by
//! floor division, with the rounding remainder assigned to the curve so the
//! three shares always add back up to the lock amount.
//!
//! Prefunded launches go through [`LaunchRegistry::deposit`] and
//! [`LaunchRegistry::launch_from_deposit`]. Deposits are keyed by depositor
//! and asset, so nobody can launch against funds someone else prefunded.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::errors::{MarketError, MarketResult};
use crate::fixed_point::{self, mul_div};
use crate::market::Market;
use crate::types::{Address, AssetId, CurveParams, TxContext};

/// Percentage of locked RT kept for the pool at graduation
pub const DEX_RESERVE_PERCENT: u128 = 20;

/// Percentage of locked RT reserved for the creator
pub const CREATOR_RESERVE_PERCENT: u128 = 5;

/// Smallest lock for which every share is non-zero
pub const MIN_LOCK_AMOUNT: u128 = 20;

/// 75/20/5 split of a lock amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSplit {
    pub total_locked: u128,
    pub curve_allocation: u128,
    pub dex_reserve: u128,
    pub creator_reserve: u128,
}

impl LaunchSplit {
    pub fn from_lock(lock_amount: u128) -> MarketResult<Self> {
        if lock_amount < MIN_LOCK_AMOUNT {
            return Err(MarketError::InvalidParameters(format!(
                "lock amount {} below minimum {}",
                lock_amount, MIN_LOCK_AMOUNT
            )));
        }

        let dex_reserve = mul_div(lock_amount, DEX_RESERVE_PERCENT, 100)?;
        let creator_reserve = mul_div(lock_amount, CREATOR_RESERVE_PERCENT, 100)?;
        // Remainder, including rounding dust, goes to the curve
        let curve_allocation = lock_amount - dex_reserve - creator_reserve;

        Ok(Self {
            total_locked: lock_amount,
            curve_allocation,
            dex_reserve,
            creator_reserve,
        })
    }
}

/// Registry counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_launched: u64,
    pub active: u64,
    pub graduated: u64,
    pub open_deposits: u64,
}

/// Launch Registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaunchRegistry {
    /// All markets by asset
    markets: HashMap<AssetId, Market>,
    /// Assets in launch order
    launch_order: Vec<AssetId>,
    /// Prefunded RT per depositor, per asset
    deposits: BTreeMap<Address, BTreeMap<AssetId, u128>>,
}

impl LaunchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch a market for `asset_id` with `ctx.caller` as creator.
    pub fn launch(
        &mut self,
        ctx: &TxContext,
        asset_id: AssetId,
        lock_amount: u128,
        params: &CurveParams,
    ) -> MarketResult<&Market> {
        let market = self.prepare_market(ctx, asset_id, lock_amount, params)?;
        Ok(self.insert_market(market))
    }

    /// Record RT prefunded by `ctx.caller` for a later launch of `asset_id`.
    ///
    /// Returns the caller's new deposit balance for that asset.
    pub fn deposit(&mut self, ctx: &TxContext, asset_id: AssetId, amount: u128) -> MarketResult<u128> {
        if amount == 0 {
            return Err(MarketError::ZeroAmount);
        }
        let current = self.deposit_of(&ctx.caller, &asset_id);
        let updated = fixed_point::add(current, amount)?;
        self.deposits
            .entry(ctx.caller)
            .or_default()
            .insert(asset_id, updated);
        Ok(updated)
    }

    /// Return unused prefunding to the caller. Returns the remaining balance.
    pub fn withdraw_deposit(
        &mut self,
        ctx: &TxContext,
        asset_id: AssetId,
        amount: u128,
    ) -> MarketResult<u128> {
        if amount == 0 {
            return Err(MarketError::ZeroAmount);
        }
        let available = self.deposit_of(&ctx.caller, &asset_id);
        if available < amount {
            return Err(MarketError::InsufficientDeposit {
                available,
                requested: amount,
            });
        }
        let remaining = available - amount;
        self.set_deposit(ctx.caller, asset_id, remaining);
        Ok(remaining)
    }

    /// Launch using the caller's own prior deposit.
    ///
    /// Only `Deposit[caller][asset_id]` is consulted; balances prefunded by
    /// other accounts are never usable here.
    pub fn launch_from_deposit(
        &mut self,
        ctx: &TxContext,
        asset_id: AssetId,
        amount: u128,
        params: &CurveParams,
    ) -> MarketResult<&Market> {
        if self.markets.contains_key(&asset_id) {
            return Err(MarketError::AlreadyLaunched(asset_id));
        }

        let available = self.deposit_of(&ctx.caller, &asset_id);
        if available < amount {
            return Err(MarketError::InsufficientDeposit {
                available,
                requested: amount,
            });
        }

        let market = self.prepare_market(ctx, asset_id, amount, params)?;
        self.set_deposit(ctx.caller, asset_id, available - amount);
        Ok(self.insert_market(market))
    }

    pub fn deposit_of(&self, depositor: &Address, asset_id: &AssetId) -> u128 {
        self.deposits
            .get(depositor)
            .and_then(|by_asset| by_asset.get(asset_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn get(&self, asset_id: &AssetId) -> Option<&Market> {
        self.markets.get(asset_id)
    }

    pub fn get_mut(&mut self, asset_id: &AssetId) -> Option<&mut Market> {
        self.markets.get_mut(asset_id)
    }

    pub fn contains(&self, asset_id: &AssetId) -> bool {
        self.markets.contains_key(asset_id)
    }

    /// Active markets in launch order
    pub fn active_markets(&self) -> Vec<AssetId> {
        self.launch_order
            .iter()
            .filter(|id| self.markets.get(*id).map(|m| m.is_active).unwrap_or(false))
            .copied()
            .collect()
    }

    /// Active markets whose market cap has reached their threshold
    pub fn ready_to_graduate(&self) -> Vec<AssetId> {
        self.launch_order
            .iter()
            .filter(|id| {
                self.markets
                    .get(*id)
                    .map(|m| m.graduation_ready())
                    .unwrap_or(false)
            })
            .copied()
            .collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &Market> {
        self.launch_order.iter().filter_map(|id| self.markets.get(id))
    }

    pub fn stats(&self) -> RegistryStats {
        let graduated = self.markets.values().filter(|m| m.graduated).count() as u64;
        let active = self.markets.values().filter(|m| m.is_active).count() as u64;
        let open_deposits = self
            .deposits
            .values()
            .map(|by_asset| by_asset.len() as u64)
            .sum();

        RegistryStats {
            total_launched: self.markets.len() as u64,
            active,
            graduated,
            open_deposits,
        }
    }

    fn prepare_market(
        &self,
        ctx: &TxContext,
        asset_id: AssetId,
        lock_amount: u128,
        params: &CurveParams,
    ) -> MarketResult<Market> {
        if self.markets.contains_key(&asset_id) {
            return Err(MarketError::AlreadyLaunched(asset_id));
        }
        params.validate()?;
        let split = LaunchSplit::from_lock(lock_amount)?;
        Market::new(asset_id, ctx.caller, params, split, ctx.now)
    }

    fn insert_market(&mut self, market: Market) -> &Market {
        let asset_id = market.asset_id;
        self.launch_order.push(asset_id);
        self.markets.entry(asset_id).or_insert(market)
    }

    fn set_deposit(&mut self, depositor: Address, asset_id: AssetId, amount: u128) {
        if amount == 0 {
            if let Some(by_asset) = self.deposits.get_mut(&depositor) {
                by_asset.remove(&asset_id);
                if by_asset.is_empty() {
                    self.deposits.remove(&depositor);
                }
            }
        } else {
            self.deposits
                .entry(depositor)
                .or_default()
                .insert(asset_id, amount);
        }
    }
}
