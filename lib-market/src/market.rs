//! Bonding Curve Market
//!
//! One market per launched asset. The market prices curve units on a
//! [`LinearCurve`], holds the base-currency reserve backing them, and
//! freezes permanently once it graduates into a pool.
//!
//! # Invariants
//! - `total_locked == curve_allocation + dex_reserve + creator_reserve`
//! - `current_supply <= curve_capacity` and only grows while active
//! - `graduated` implies `!is_active`, forever
//! - `reserve_balance >= curve.cost_to(current_supply)`; anything above that
//!   is injected revenue (the surplus) and is carried pro rata per unit
//!
//! # Surplus
//! Harvested revenue raises the reserve without minting. Buyers pay
//! `ceil(surplus * Δ / s)` on top of the curve integral and sellers receive
//! `floor(surplus * Δ / s)`, so the surplus per unit never drops and a
//! round trip can never extract value from existing holders.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::curve::{FeeSchedule, LinearCurve};
use crate::errors::{MarketError, MarketResult};
use crate::fixed_point::{self, mul_div, mul_div_up};
use crate::launch::LaunchSplit;
use crate::types::{Address, AssetId, CurveParams, TxContext};

/// Pool seeded at graduation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub pool_address: Address,
    pub total_liquidity: u128,
    pub timestamp: u64,
}

/// Priced buy, before any state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyQuote {
    pub amount: u128,
    /// Curve integral over `[s, s + Δ)`
    pub curve_cost: u128,
    /// Share of injected surplus bought along with the units
    pub surplus_premium: u128,
    /// `curve_cost + surplus_premium`; added to the reserve
    pub base_cost: u128,
    pub fee: u128,
    pub total_cost: u128,
}

/// Priced sell, before any state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellQuote {
    pub amount: u128,
    pub curve_proceeds: u128,
    pub surplus_share: u128,
    /// `curve_proceeds + surplus_share`; removed from the reserve
    pub base_proceeds: u128,
    pub fee: u128,
    /// `base_proceeds - fee`, paid to the seller
    pub payout: u128,
}

/// Outcome of an executed curve trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeReceipt {
    pub is_buy: bool,
    pub amount: u128,
    /// Base moved between trader and market, fee included
    pub amount_base: u128,
    pub fee: u128,
    pub treasury_fee: u128,
    pub creator_fee: u128,
    pub new_supply: u128,
    pub new_reserve: u128,
}

/// Bonding curve market for one locked asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    // === Identity ===
    pub asset_id: AssetId,
    pub creator: Address,
    pub launched_at: u64,

    // === Curve parameters ===
    pub base_price: u128,
    pub price_increment: u128,
    pub wrap_per_unit: u128,
    pub graduation_threshold: u128,

    // === Locked RT split ===
    pub total_locked: u128,
    pub curve_allocation: u128,
    pub dex_reserve: u128,
    pub creator_reserve: u128,
    /// Units the curve may issue: `curve_allocation * wrap_per_unit`
    pub curve_capacity: u128,

    // === Mutable curve state ===
    pub current_supply: u128,
    pub reserve_balance: u128,
    pub is_active: bool,
    pub graduated: bool,

    // === Fees ===
    pub accrued_treasury_fees: u128,
    pub accrued_creator_fees: u128,
    pub creator_reserve_claimed: bool,

    /// Curve units held per trader. Frozen at graduation; the host moves
    /// units into and out of the pool.
    holdings: BTreeMap<Address, u128>,

    /// Set once at graduation
    pub migration: Option<MigrationRecord>,
}

impl Market {
    /// Create an active market. Parameters and split are validated by the
    /// launch registry.
    pub fn new(
        asset_id: AssetId,
        creator: Address,
        params: &CurveParams,
        split: LaunchSplit,
        launched_at: u64,
    ) -> MarketResult<Self> {
        let curve_capacity = fixed_point::mul(split.curve_allocation, params.wrap_per_unit)?;

        Ok(Self {
            asset_id,
            creator,
            launched_at,
            base_price: params.base_price,
            price_increment: params.price_increment,
            wrap_per_unit: params.wrap_per_unit,
            graduation_threshold: params.graduation_threshold,
            total_locked: split.total_locked,
            curve_allocation: split.curve_allocation,
            dex_reserve: split.dex_reserve,
            creator_reserve: split.creator_reserve,
            curve_capacity,
            current_supply: 0,
            reserve_balance: 0,
            is_active: true,
            graduated: false,
            accrued_treasury_fees: 0,
            accrued_creator_fees: 0,
            creator_reserve_claimed: false,
            holdings: BTreeMap::new(),
            migration: None,
        })
    }

    pub fn curve(&self) -> LinearCurve {
        LinearCurve::new(self.base_price, self.price_increment)
    }

    pub fn require_active(&self) -> MarketResult<()> {
        if !self.is_active || self.graduated {
            return Err(MarketError::InactiveMarket(self.asset_id));
        }
        Ok(())
    }

    pub fn balance_of(&self, holder: &Address) -> u128 {
        self.holdings.get(holder).copied().unwrap_or(0)
    }

    pub fn holders(&self) -> impl Iterator<Item = (&Address, &u128)> {
        self.holdings.iter()
    }

    /// Reserve in excess of what the curve integral requires.
    pub fn surplus(&self) -> MarketResult<u128> {
        let required = self.curve().cost_to(self.current_supply)?;
        Ok(self.reserve_balance.saturating_sub(required))
    }

    /// Marginal curve price plus surplus carried per unit.
    pub fn current_price(&self) -> MarketResult<u128> {
        let marginal = self.curve().price_at(self.current_supply)?;
        if self.current_supply == 0 {
            return Ok(marginal);
        }
        let per_unit_surplus = self.surplus()? / self.current_supply;
        Ok(fixed_point::add(marginal, per_unit_surplus)?)
    }

    pub fn market_cap(&self) -> MarketResult<u128> {
        Ok(fixed_point::mul(self.current_price()?, self.current_supply)?)
    }

    /// Whether market cap has reached the graduation threshold.
    ///
    /// A market cap too large to represent has certainly crossed it.
    pub fn graduation_ready(&self) -> bool {
        if !self.is_active || self.graduated {
            return false;
        }
        match self.market_cap() {
            Ok(cap) => cap >= self.graduation_threshold,
            Err(MarketError::Overflow) => true,
            Err(_) => false,
        }
    }

    pub fn quote_buy(&self, amount: u128, fees: &FeeSchedule) -> MarketResult<BuyQuote> {
        self.require_active()?;
        if amount == 0 {
            return Err(MarketError::ZeroAmount);
        }

        let s = self.current_supply;
        let requested_supply = fixed_point::add(s, amount)?;
        if requested_supply > self.curve_capacity {
            return Err(MarketError::CapacityExceeded {
                capacity: self.curve_capacity,
                requested_supply,
            });
        }

        let curve_cost = self.curve().integral(s, amount)?;
        let surplus_premium = if s == 0 {
            0
        } else {
            mul_div_up(self.surplus()?, amount, s)?
        };
        let base_cost = fixed_point::add(curve_cost, surplus_premium)?;
        let fee = fees.fee_on(base_cost)?;
        let total_cost = fixed_point::add(base_cost, fee)?;

        Ok(BuyQuote {
            amount,
            curve_cost,
            surplus_premium,
            base_cost,
            fee,
            total_cost,
        })
    }

    pub fn quote_sell(&self, amount: u128, fees: &FeeSchedule) -> MarketResult<SellQuote> {
        self.require_active()?;
        if amount == 0 {
            return Err(MarketError::ZeroAmount);
        }

        let s = self.current_supply;
        if amount > s {
            return Err(MarketError::InsufficientBalance {
                balance: s,
                requested: amount,
            });
        }

        let curve_proceeds = self.curve().integral(s - amount, amount)?;
        let surplus_share = mul_div(self.surplus()?, amount, s)?;
        let base_proceeds = fixed_point::add(curve_proceeds, surplus_share)?;

        if self.reserve_balance < base_proceeds {
            return Err(MarketError::InsufficientReserve {
                reserve: self.reserve_balance,
                required: base_proceeds,
            });
        }

        let fee = fees.fee_on(base_proceeds)?;
        Ok(SellQuote {
            amount,
            curve_proceeds,
            surplus_share,
            base_proceeds,
            fee,
            payout: base_proceeds - fee,
        })
    }

    /// Buy `amount` units for `ctx.caller`, paying at most `max_spend`.
    pub fn execute_buy(
        &mut self,
        ctx: &TxContext,
        amount: u128,
        max_spend: u128,
        deadline: u64,
        fees: &FeeSchedule,
    ) -> MarketResult<TradeReceipt> {
        self.require_active()?;
        ctx.require_before(deadline)?;
        let quote = self.quote_buy(amount, fees)?;

        if quote.total_cost > max_spend {
            return Err(MarketError::SlippageExceeded {
                limit: max_spend,
                actual: quote.total_cost,
            });
        }

        let (treasury_fee, creator_fee) = fees.split(quote.fee)?;

        // Compute every new value before writing any of them
        let new_supply = fixed_point::add(self.current_supply, amount)?;
        let new_reserve = fixed_point::add(self.reserve_balance, quote.base_cost)?;
        let new_treasury = fixed_point::add(self.accrued_treasury_fees, treasury_fee)?;
        let new_creator = fixed_point::add(self.accrued_creator_fees, creator_fee)?;
        let new_holding = fixed_point::add(self.balance_of(&ctx.caller), amount)?;

        self.current_supply = new_supply;
        self.reserve_balance = new_reserve;
        self.accrued_treasury_fees = new_treasury;
        self.accrued_creator_fees = new_creator;
        self.holdings.insert(ctx.caller, new_holding);

        Ok(TradeReceipt {
            is_buy: true,
            amount,
            amount_base: quote.total_cost,
            fee: quote.fee,
            treasury_fee,
            creator_fee,
            new_supply,
            new_reserve,
        })
    }

    /// Sell `amount` of the caller's units, receiving at least `min_return`.
    pub fn execute_sell(
        &mut self,
        ctx: &TxContext,
        amount: u128,
        min_return: u128,
        deadline: u64,
        fees: &FeeSchedule,
    ) -> MarketResult<TradeReceipt> {
        self.require_active()?;
        ctx.require_before(deadline)?;
        let quote = self.quote_sell(amount, fees)?;

        let held = self.balance_of(&ctx.caller);
        if held < amount {
            return Err(MarketError::InsufficientBalance {
                balance: held,
                requested: amount,
            });
        }

        if quote.payout < min_return {
            return Err(MarketError::SlippageExceeded {
                limit: min_return,
                actual: quote.payout,
            });
        }

        let (treasury_fee, creator_fee) = fees.split(quote.fee)?;

        let new_supply = self.current_supply - amount;
        let new_reserve = self.reserve_balance - quote.base_proceeds;
        let new_treasury = fixed_point::add(self.accrued_treasury_fees, treasury_fee)?;
        let new_creator = fixed_point::add(self.accrued_creator_fees, creator_fee)?;

        self.current_supply = new_supply;
        self.reserve_balance = new_reserve;
        self.accrued_treasury_fees = new_treasury;
        self.accrued_creator_fees = new_creator;
        if held == amount {
            self.holdings.remove(&ctx.caller);
        } else {
            self.holdings.insert(ctx.caller, held - amount);
        }

        Ok(TradeReceipt {
            is_buy: false,
            amount,
            amount_base: quote.payout,
            fee: quote.fee,
            treasury_fee,
            creator_fee,
            new_supply,
            new_reserve,
        })
    }

    /// Add harvested revenue to the reserve. Supply is untouched.
    ///
    /// Returns the new reserve balance.
    pub fn inject_revenue(&mut self, amount: u128) -> MarketResult<u128> {
        self.require_active()?;
        if amount == 0 {
            return Err(MarketError::ZeroAmount);
        }
        if self.current_supply == 0 {
            return Err(MarketError::EmptySupply);
        }

        let new_reserve = fixed_point::add(self.reserve_balance, amount)?;
        self.reserve_balance = new_reserve;
        Ok(new_reserve)
    }

    /// Freeze the market after its pool has been seeded.
    pub(crate) fn mark_graduated(&mut self, record: MigrationRecord) {
        self.is_active = false;
        self.graduated = true;
        self.migration = Some(record);
    }

    pub(crate) fn take_treasury_fees(&mut self) -> u128 {
        std::mem::take(&mut self.accrued_treasury_fees)
    }

    pub(crate) fn take_creator_fees(&mut self, caller: &Address) -> MarketResult<u128> {
        self.require_creator(caller)?;
        Ok(std::mem::take(&mut self.accrued_creator_fees))
    }

    /// Release the 5% creator reserve once the market has graduated.
    pub(crate) fn claim_creator_reserve(&mut self, caller: &Address) -> MarketResult<u128> {
        self.require_creator(caller)?;
        if !self.graduated {
            return Err(MarketError::CreatorReserveLocked(self.asset_id));
        }
        if self.creator_reserve_claimed {
            return Err(MarketError::AlreadyClaimed);
        }
        self.creator_reserve_claimed = true;
        Ok(self.creator_reserve)
    }

    fn require_creator(&self, caller: &Address) -> MarketResult<()> {
        if caller != &self.creator {
            return Err(MarketError::Unauthorized(
                "only the market creator".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read-only snapshot returned by the market read API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketView {
    pub asset_id: AssetId,
    pub creator: Address,
    pub base_price: u128,
    pub price_increment: u128,
    pub wrap_per_unit: u128,
    pub current_supply: u128,
    pub curve_capacity: u128,
    pub reserve_balance: u128,
    pub surplus: u128,
    pub total_locked: u128,
    pub curve_allocation: u128,
    pub dex_reserve: u128,
    pub creator_reserve: u128,
    pub current_price: u128,
    pub market_cap: u128,
    pub graduation_threshold: u128,
    pub is_active: bool,
    pub graduated: bool,
    pub migration: Option<MigrationRecord>,
}

impl Market {
    pub fn view(&self) -> MarketResult<MarketView> {
        Ok(MarketView {
            asset_id: self.asset_id,
            creator: self.creator,
            base_price: self.base_price,
            price_increment: self.price_increment,
            wrap_per_unit: self.wrap_per_unit,
            current_supply: self.current_supply,
            curve_capacity: self.curve_capacity,
            reserve_balance: self.reserve_balance,
            surplus: self.surplus()?,
            total_locked: self.total_locked,
            curve_allocation: self.curve_allocation,
            dex_reserve: self.dex_reserve,
            creator_reserve: self.creator_reserve,
            current_price: self.current_price()?,
            market_cap: self.market_cap()?,
            graduation_threshold: self.graduation_threshold,
            is_active: self.is_active,
            graduated: self.graduated,
            migration: self.migration,
        })
    }
}
