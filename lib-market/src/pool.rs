//! Constant Product Pool
//!
//! Post-graduation AMM pairing curve units (token A) with the base currency
//! (token B). Pricing follows `x * y = k` with a 0.3% fee that stays in the
//! reserves.
//!
//! # Invariants
//!
//! ## Reserve conservation
//! After any swap `reserve_a * reserve_b` is at least its pre-swap value.
//!
//! ## Exit always open
//! `burn` works in both `Active` and `Paused`. Pausing only freezes swaps
//! and new liquidity.
//!
//! ## Single writer
//! Every mutating entry point holds the `locked` guard for its whole body,
//! and every reserve write happens before the receipt describing outgoing
//! transfers is handed back to the host.
//!
//! ## Custody
//! The pool tracks reserves and LP shares only. Token movement is settled
//! by the host: `deposit` and `swap` assume `amount_in` has already been
//! transferred in, and receipts name what the host must pay out. Curve-era
//! unit holdings stay on the graduated market's ledger and are not
//! consulted here.
//!
//! ## TWAP
//! `cumulative_price_a/b` only grow. Each update adds the price that held
//! since the previous sync, scaled by [`PRICE_SCALE`], times elapsed seconds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::access::{AccessControl, Capability};
use crate::errors::{MarketError, MarketResult};
use crate::fixed_point::{self, mul_div, sqrt_product, U256, WAD};
use crate::types::{Address, AssetId, TxContext, ZERO_ADDRESS};

/// Liquidity permanently locked at the zero address on the first mint
pub const MINIMUM_LIQUIDITY: u128 = 1_000;

/// Input retained after the 0.3% fee, per mille
pub const SWAP_FEE_NUMERATOR: u128 = 997;
pub const SWAP_FEE_DENOMINATOR: u128 = 1_000;

/// Fixed-point scale of spot and cumulative prices
pub const PRICE_SCALE: u128 = WAD;

/// Domain separator for pool address derivation
pub const POOL_ADDRESS_DOMAIN: &[u8] = b"LAUNCHPAD_CP_POOL_V1";

/// Deterministic pool address for a graduated asset
pub fn derive_pool_address(asset_id: &AssetId) -> Address {
    let mut hasher = blake3::Hasher::new();
    hasher.update(POOL_ADDRESS_DOMAIN);
    hasher.update(asset_id);
    *hasher.finalize().as_bytes()
}

/// `amount_in * 997 * reserve_out / (reserve_in * 1000 + amount_in * 997)`
pub fn get_amount_out(amount_in: u128, reserve_in: u128, reserve_out: u128) -> MarketResult<u128> {
    if amount_in == 0 {
        return Err(MarketError::ZeroAmount);
    }
    if reserve_in == 0 || reserve_out == 0 {
        return Err(MarketError::InsufficientLiquidity);
    }
    let amount_in_with_fee = fixed_point::mul(amount_in, SWAP_FEE_NUMERATOR)?;
    let denominator = fixed_point::add(
        fixed_point::mul(reserve_in, SWAP_FEE_DENOMINATOR)?,
        amount_in_with_fee,
    )?;
    Ok(mul_div(amount_in_with_fee, reserve_out, denominator)?)
}

/// Trading gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolStatus {
    Active,
    Paused,
}

impl std::fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolStatus::Active => write!(f, "Active"),
            PoolStatus::Paused => write!(f, "Paused"),
        }
    }
}

/// Result of a swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapReceipt {
    pub token_in_is_a: bool,
    pub amount_in: u128,
    /// Paid out to the caller
    pub amount_out: u128,
    pub new_reserve_a: u128,
    pub new_reserve_b: u128,
}

/// Result of a mint or burn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityReceipt {
    pub amount_a: u128,
    pub amount_b: u128,
    pub liquidity: u128,
    pub to: Address,
}

/// Cumulative price reading at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: u64,
    pub cumulative_price_a: u128,
    pub cumulative_price_b: u128,
}

/// Constant product pool for one graduated asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantProductPool {
    // === Identity ===
    address: Address,
    asset_id: AssetId,
    created_at: u64,

    // === Reserves ===
    reserve_a: u128,
    reserve_b: u128,
    /// Tokens held, including deposits not yet minted against
    balance_a: u128,
    balance_b: u128,

    // === Liquidity shares ===
    total_liquidity_supply: u128,
    lp_balances: BTreeMap<Address, u128>,

    // === TWAP ===
    cumulative_price_a: u128,
    cumulative_price_b: u128,
    last_sync_timestamp: u64,

    // === Gates ===
    status: PoolStatus,
    locked: bool,
}

impl ConstantProductPool {
    /// Create an empty pool. Liquidity arrives through `deposit` + `mint`.
    pub fn new(asset_id: AssetId, created_at: u64) -> Self {
        Self {
            address: derive_pool_address(&asset_id),
            asset_id,
            created_at,
            reserve_a: 0,
            reserve_b: 0,
            balance_a: 0,
            balance_b: 0,
            total_liquidity_supply: 0,
            lp_balances: BTreeMap::new(),
            cumulative_price_a: 0,
            cumulative_price_b: 0,
            last_sync_timestamp: created_at,
            status: PoolStatus::Active,
            locked: false,
        }
    }

    // ------------------------------------------------------------------------
    // Guard
    // ------------------------------------------------------------------------

    fn enter(&mut self) -> MarketResult<()> {
        if self.locked {
            return Err(MarketError::Reentrancy);
        }
        self.locked = true;
        Ok(())
    }

    fn exit(&mut self) {
        self.locked = false;
    }

    fn guarded<T>(&mut self, op: impl FnOnce(&mut Self) -> MarketResult<T>) -> MarketResult<T> {
        self.enter()?;
        let result = op(self);
        self.exit();
        result
    }

    fn require_active(&self) -> MarketResult<()> {
        if self.status == PoolStatus::Paused {
            return Err(MarketError::Paused);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Mutating entry points
    // ------------------------------------------------------------------------

    /// Credit tokens transferred into the pool ahead of a `mint`.
    pub fn deposit(&mut self, token_is_a: bool, amount: u128) -> MarketResult<()> {
        self.guarded(|pool| {
            if amount == 0 {
                return Err(MarketError::ZeroAmount);
            }
            if token_is_a {
                pool.balance_a = fixed_point::add(pool.balance_a, amount)?;
            } else {
                pool.balance_b = fixed_point::add(pool.balance_b, amount)?;
            }
            Ok(())
        })
    }

    /// Mint liquidity shares to `to` for everything deposited since the
    /// last sync.
    ///
    /// The first mint receives `sqrt(a * b) - MINIMUM_LIQUIDITY`, with
    /// `MINIMUM_LIQUIDITY` locked at the zero address. Later mints receive
    /// the smaller of the two proportional shares.
    pub fn mint(&mut self, ctx: &TxContext, to: Address, deadline: u64) -> MarketResult<LiquidityReceipt> {
        self.guarded(|pool| {
            pool.require_active()?;
            ctx.require_before(deadline)?;

            let amount_a = pool.balance_a - pool.reserve_a;
            let amount_b = pool.balance_b - pool.reserve_b;
            if amount_a == 0 || amount_b == 0 {
                return Err(MarketError::ZeroAmount);
            }

            let first_mint = pool.total_liquidity_supply == 0;
            let liquidity = if first_mint {
                let root = sqrt_product(amount_a, amount_b);
                if root <= MINIMUM_LIQUIDITY {
                    return Err(MarketError::InsufficientLiquidity);
                }
                root - MINIMUM_LIQUIDITY
            } else {
                let share_a = mul_div(amount_a, pool.total_liquidity_supply, pool.reserve_a)?;
                let share_b = mul_div(amount_b, pool.total_liquidity_supply, pool.reserve_b)?;
                share_a.min(share_b)
            };
            if liquidity == 0 {
                return Err(MarketError::InsufficientLiquidity);
            }

            let minted_total = if first_mint {
                fixed_point::add(liquidity, MINIMUM_LIQUIDITY)?
            } else {
                liquidity
            };
            let new_total = fixed_point::add(pool.total_liquidity_supply, minted_total)?;

            // Individual holdings never exceed the total, so these cannot overflow
            pool.total_liquidity_supply = new_total;
            if first_mint {
                *pool.lp_balances.entry(ZERO_ADDRESS).or_insert(0) += MINIMUM_LIQUIDITY;
            }
            *pool.lp_balances.entry(to).or_insert(0) += liquidity;
            pool.update(pool.balance_a, pool.balance_b, ctx.now);

            Ok(LiquidityReceipt {
                amount_a,
                amount_b,
                liquidity,
                to,
            })
        })
    }

    /// Burn `liquidity` of the caller's shares and pay the proportional
    /// reserves to `to`. Allowed while paused.
    pub fn burn(
        &mut self,
        ctx: &TxContext,
        liquidity: u128,
        to: Address,
        deadline: u64,
    ) -> MarketResult<LiquidityReceipt> {
        self.guarded(|pool| {
            ctx.require_before(deadline)?;
            if liquidity == 0 {
                return Err(MarketError::ZeroAmount);
            }

            let held = pool.liquidity_of(&ctx.caller);
            if held < liquidity {
                return Err(MarketError::InsufficientBalance {
                    balance: held,
                    requested: liquidity,
                });
            }

            let total = pool.total_liquidity_supply;
            let amount_a = mul_div(liquidity, pool.balance_a, total)?;
            let amount_b = mul_div(liquidity, pool.balance_b, total)?;
            if amount_a == 0 || amount_b == 0 {
                return Err(MarketError::InsufficientLiquidity);
            }

            let new_balance_a = pool.balance_a - amount_a;
            let new_balance_b = pool.balance_b - amount_b;

            if held == liquidity {
                pool.lp_balances.remove(&ctx.caller);
            } else {
                pool.lp_balances.insert(ctx.caller, held - liquidity);
            }
            pool.total_liquidity_supply = total - liquidity;
            pool.balance_a = new_balance_a;
            pool.balance_b = new_balance_b;
            pool.update(new_balance_a, new_balance_b, ctx.now);

            Ok(LiquidityReceipt {
                amount_a,
                amount_b,
                liquidity,
                to,
            })
        })
    }

    /// Swap `amount_in` of one side for at least `min_amount_out` of the other.
    pub fn swap(
        &mut self,
        ctx: &TxContext,
        amount_in: u128,
        token_in_is_a: bool,
        min_amount_out: u128,
        deadline: u64,
    ) -> MarketResult<SwapReceipt> {
        self.guarded(|pool| {
            pool.require_active()?;
            ctx.require_before(deadline)?;

            let (reserve_in, reserve_out) = if token_in_is_a {
                (pool.reserve_a, pool.reserve_b)
            } else {
                (pool.reserve_b, pool.reserve_a)
            };
            let amount_out = get_amount_out(amount_in, reserve_in, reserve_out)?;

            if amount_out < min_amount_out {
                return Err(MarketError::SlippageExceeded {
                    limit: min_amount_out,
                    actual: amount_out,
                });
            }
            if amount_out == 0 || amount_out >= reserve_out {
                return Err(MarketError::InsufficientLiquidity);
            }

            let (new_balance_a, new_balance_b) = if token_in_is_a {
                (
                    fixed_point::add(pool.balance_a, amount_in)?,
                    pool.balance_b - amount_out,
                )
            } else {
                (
                    pool.balance_a - amount_out,
                    fixed_point::add(pool.balance_b, amount_in)?,
                )
            };

            let old_k = U256::from(pool.reserve_a) * U256::from(pool.reserve_b);
            let new_k = U256::from(new_balance_a) * U256::from(new_balance_b);
            if new_k < old_k {
                return Err(MarketError::KInvariantViolation);
            }

            pool.balance_a = new_balance_a;
            pool.balance_b = new_balance_b;
            pool.update(new_balance_a, new_balance_b, ctx.now);

            Ok(SwapReceipt {
                token_in_is_a,
                amount_in,
                amount_out,
                new_reserve_a: pool.reserve_a,
                new_reserve_b: pool.reserve_b,
            })
        })
    }

    /// Freeze swaps and new liquidity. Returns `false` if already paused.
    pub fn pause(&mut self, caller: &Address, acl: &AccessControl) -> MarketResult<bool> {
        acl.require(caller, Capability::Pause)?;
        self.guarded(|pool| {
            let changed = pool.status != PoolStatus::Paused;
            pool.status = PoolStatus::Paused;
            Ok(changed)
        })
    }

    /// Reopen trading. Returns `false` if already active.
    pub fn unpause(&mut self, caller: &Address, acl: &AccessControl) -> MarketResult<bool> {
        acl.require(caller, Capability::Pause)?;
        self.guarded(|pool| {
            let changed = pool.status != PoolStatus::Active;
            pool.status = PoolStatus::Active;
            Ok(changed)
        })
    }

    /// Accumulate TWAP with the reserves that held since the last sync, then
    /// adopt the new balances as reserves.
    fn update(&mut self, balance_a: u128, balance_b: u128, now: u64) {
        let elapsed = now.saturating_sub(self.last_sync_timestamp);
        if elapsed > 0 && self.reserve_a > 0 && self.reserve_b > 0 {
            let (price_a, price_b) = self.spot_prices_unchecked();
            self.cumulative_price_a = self
                .cumulative_price_a
                .saturating_add(price_a.saturating_mul(elapsed as u128));
            self.cumulative_price_b = self
                .cumulative_price_b
                .saturating_add(price_b.saturating_mul(elapsed as u128));
        }
        self.reserve_a = balance_a;
        self.reserve_b = balance_b;
        self.last_sync_timestamp = self.last_sync_timestamp.max(now);
    }

    fn spot_prices_unchecked(&self) -> (u128, u128) {
        let price_a = mul_div(self.reserve_b, PRICE_SCALE, self.reserve_a).unwrap_or(u128::MAX);
        let price_b = mul_div(self.reserve_a, PRICE_SCALE, self.reserve_b).unwrap_or(u128::MAX);
        (price_a, price_b)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn asset_id(&self) -> &AssetId {
        &self.asset_id
    }

    pub fn reserves(&self) -> (u128, u128) {
        (self.reserve_a, self.reserve_b)
    }

    pub fn total_liquidity_supply(&self) -> u128 {
        self.total_liquidity_supply
    }

    pub fn liquidity_of(&self, owner: &Address) -> u128 {
        self.lp_balances.get(owner).copied().unwrap_or(0)
    }

    pub fn status(&self) -> PoolStatus {
        self.status
    }

    pub fn is_paused(&self) -> bool {
        self.status == PoolStatus::Paused
    }

    /// `(price of A in B, price of B in A)`, scaled by [`PRICE_SCALE`].
    pub fn spot_prices(&self) -> MarketResult<(u128, u128)> {
        if self.reserve_a == 0 || self.reserve_b == 0 {
            return Err(MarketError::InsufficientLiquidity);
        }
        Ok((
            mul_div(self.reserve_b, PRICE_SCALE, self.reserve_a)?,
            mul_div(self.reserve_a, PRICE_SCALE, self.reserve_b)?,
        ))
    }

    /// Output a swap would produce right now, without executing it.
    pub fn quote_swap(&self, amount_in: u128, token_in_is_a: bool) -> MarketResult<u128> {
        if token_in_is_a {
            get_amount_out(amount_in, self.reserve_a, self.reserve_b)
        } else {
            get_amount_out(amount_in, self.reserve_b, self.reserve_a)
        }
    }

    /// Cumulative prices as they would read at `now` if synced.
    pub fn observe(&self, now: u64) -> Observation {
        let mut observation = Observation {
            timestamp: now.max(self.last_sync_timestamp),
            cumulative_price_a: self.cumulative_price_a,
            cumulative_price_b: self.cumulative_price_b,
        };
        let elapsed = now.saturating_sub(self.last_sync_timestamp);
        if elapsed > 0 && self.reserve_a > 0 && self.reserve_b > 0 {
            let (price_a, price_b) = self.spot_prices_unchecked();
            observation.cumulative_price_a = observation
                .cumulative_price_a
                .saturating_add(price_a.saturating_mul(elapsed as u128));
            observation.cumulative_price_b = observation
                .cumulative_price_b
                .saturating_add(price_b.saturating_mul(elapsed as u128));
        }
        observation
    }

    pub fn state(&self) -> PoolView {
        PoolView {
            address: self.address,
            asset_id: self.asset_id,
            reserve_a: self.reserve_a,
            reserve_b: self.reserve_b,
            total_liquidity_supply: self.total_liquidity_supply,
            cumulative_price_a: self.cumulative_price_a,
            cumulative_price_b: self.cumulative_price_b,
            last_sync_timestamp: self.last_sync_timestamp,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// Time-weighted average prices between two observations.
pub fn twap(earlier: &Observation, later: &Observation) -> MarketResult<(u128, u128)> {
    let elapsed = later.timestamp.saturating_sub(earlier.timestamp);
    if elapsed == 0 {
        return Err(MarketError::InvalidParameters(
            "observations must be at different times".to_string(),
        ));
    }
    let delta_a = later
        .cumulative_price_a
        .checked_sub(earlier.cumulative_price_a)
        .ok_or(MarketError::Overflow)?;
    let delta_b = later
        .cumulative_price_b
        .checked_sub(earlier.cumulative_price_b)
        .ok_or(MarketError::Overflow)?;
    Ok((delta_a / elapsed as u128, delta_b / elapsed as u128))
}

/// Read-only snapshot returned by the pool read API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolView {
    pub address: Address,
    pub asset_id: AssetId,
    pub reserve_a: u128,
    pub reserve_b: u128,
    pub total_liquidity_supply: u128,
    pub cumulative_price_a: u128,
    pub cumulative_price_b: u128,
    pub last_sync_timestamp: u64,
    pub status: PoolStatus,
    pub created_at: u64,
}
