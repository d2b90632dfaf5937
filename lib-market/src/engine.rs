//! Market Engine
//!
//! Single-writer facade over the launch registry, graduation engine, access
//! control and timelock. Every state-changing operation takes `&mut self`,
//! so a host that shares the engine behind one lock gets the total order
//! the settlement logic assumes. Events are pushed to the configured
//! [`EventIndexer`] only after the state change has committed.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::access::{AccessControl, Capability};
use crate::curve::{FeeSchedule, MAX_TRADING_FEE_BPS};
use crate::errors::{MarketError, MarketResult};
use crate::events::{EventIndexer, InMemoryEventIndexer, MarketEvent};
use crate::fixed_point::BPS_DENOMINATOR;
use crate::graduation::{GraduationConfig, GraduationEngine};
use crate::launch::{LaunchRegistry, RegistryStats};
use crate::market::{BuyQuote, Market, MarketView, MigrationRecord, SellQuote, TradeReceipt};
use crate::pool::{ConstantProductPool, LiquidityReceipt, PoolView, SwapReceipt};
use crate::timelock::{Timelock, TimelockedAction};
use crate::types::{short_id, Address, AssetId, CurveParams, TxContext};

/// Default delay for timelocked parameter changes: 2 days
pub const DEFAULT_TIMELOCK_DELAY_SECS: u64 = 2 * 24 * 60 * 60;

/// Engine construction parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Initial holder of every capability
    pub admin: Address,
    /// Recipient of the treasury fee share
    pub treasury: Address,
    pub fees: FeeSchedule,
    pub timelock_delay_secs: u64,
    pub graduation: GraduationConfig,
}

impl EngineConfig {
    pub fn new(admin: Address, treasury: Address) -> Self {
        Self {
            admin,
            treasury,
            fees: FeeSchedule::default(),
            timelock_delay_secs: DEFAULT_TIMELOCK_DELAY_SECS,
            graduation: GraduationConfig::default(),
        }
    }
}

/// Launch markets, their pools, and the admin surface around them
pub struct MarketEngine {
    registry: LaunchRegistry,
    graduation: GraduationEngine,
    access: AccessControl,
    timelock: Timelock,
    fees: FeeSchedule,
    treasury: Address,
    indexer: Box<dyn EventIndexer>,
}

impl std::fmt::Debug for MarketEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketEngine")
            .field("markets", &self.registry.stats())
            .field("pools", &self.graduation.pool_count())
            .field("fees", &self.fees)
            .field("pending_actions", &self.timelock.len())
            .field("events", &self.indexer.event_count())
            .finish()
    }
}

impl MarketEngine {
    /// Engine with an in-memory event feed
    pub fn new(config: EngineConfig) -> Self {
        Self::with_indexer(config, Box::new(InMemoryEventIndexer::new()))
    }

    pub fn with_indexer(config: EngineConfig, indexer: Box<dyn EventIndexer>) -> Self {
        Self {
            registry: LaunchRegistry::new(),
            graduation: GraduationEngine::new(config.graduation),
            access: AccessControl::with_admin(config.admin),
            timelock: Timelock::new(config.timelock_delay_secs),
            fees: config.fees,
            treasury: config.treasury,
            indexer,
        }
    }

    fn emit(&mut self, event: MarketEvent) {
        let event_type = event.event_type();
        if let Err(e) = self.indexer.index_event(event) {
            error!(event_type, "Failed to index event: {}", e);
        }
    }

    fn market(&self, asset_id: &AssetId) -> MarketResult<&Market> {
        self.registry
            .get(asset_id)
            .ok_or(MarketError::UnknownMarket(*asset_id))
    }

    fn market_mut(&mut self, asset_id: &AssetId) -> MarketResult<&mut Market> {
        self.registry
            .get_mut(asset_id)
            .ok_or(MarketError::UnknownMarket(*asset_id))
    }

    fn pool_mut(&mut self, asset_id: &AssetId) -> MarketResult<&mut ConstantProductPool> {
        self.graduation
            .pool_mut(asset_id)
            .ok_or(MarketError::UnknownPool(*asset_id))
    }

    // ========================================================================
    // Launch
    // ========================================================================

    pub fn launch(
        &mut self,
        ctx: &TxContext,
        asset_id: AssetId,
        lock_amount: u128,
        params: &CurveParams,
    ) -> MarketResult<MarketView> {
        let view = self.registry.launch(ctx, asset_id, lock_amount, params)?.view()?;
        self.on_launched(&view, ctx.now);
        Ok(view)
    }

    pub fn deposit(&mut self, ctx: &TxContext, asset_id: AssetId, amount: u128) -> MarketResult<u128> {
        let balance = self.registry.deposit(ctx, asset_id, amount)?;
        self.emit(MarketEvent::Deposited {
            asset_id,
            depositor: ctx.caller,
            amount,
            timestamp: ctx.now,
        });
        Ok(balance)
    }

    pub fn withdraw_deposit(
        &mut self,
        ctx: &TxContext,
        asset_id: AssetId,
        amount: u128,
    ) -> MarketResult<u128> {
        let remaining = self.registry.withdraw_deposit(ctx, asset_id, amount)?;
        self.emit(MarketEvent::DepositWithdrawn {
            asset_id,
            depositor: ctx.caller,
            amount,
            timestamp: ctx.now,
        });
        Ok(remaining)
    }

    pub fn launch_from_deposit(
        &mut self,
        ctx: &TxContext,
        asset_id: AssetId,
        amount: u128,
        params: &CurveParams,
    ) -> MarketResult<MarketView> {
        let view = self
            .registry
            .launch_from_deposit(ctx, asset_id, amount, params)?
            .view()?;
        self.on_launched(&view, ctx.now);
        Ok(view)
    }

    pub fn deposit_of(&self, depositor: &Address, asset_id: &AssetId) -> u128 {
        self.registry.deposit_of(depositor, asset_id)
    }

    fn on_launched(&mut self, view: &MarketView, now: u64) {
        info!(
            asset = %short_id(&view.asset_id),
            creator = %short_id(&view.creator),
            total_locked = view.total_locked,
            curve_capacity = view.curve_capacity,
            "Market launched"
        );
        self.emit(MarketEvent::Launched {
            asset_id: view.asset_id,
            creator: view.creator,
            total_locked: view.total_locked,
            curve_allocation: view.curve_allocation,
            dex_reserve: view.dex_reserve,
            creator_reserve: view.creator_reserve,
            timestamp: now,
        });
    }

    // ========================================================================
    // Curve trading
    // ========================================================================

    pub fn quote_buy(&self, asset_id: &AssetId, amount: u128) -> MarketResult<BuyQuote> {
        self.market(asset_id)?.quote_buy(amount, &self.fees)
    }

    pub fn quote_sell(&self, asset_id: &AssetId, amount: u128) -> MarketResult<SellQuote> {
        self.market(asset_id)?.quote_sell(amount, &self.fees)
    }

    pub fn execute_buy(
        &mut self,
        ctx: &TxContext,
        asset_id: &AssetId,
        amount: u128,
        max_spend: u128,
        deadline: u64,
    ) -> MarketResult<TradeReceipt> {
        let fees = self.fees;
        let receipt = self
            .market_mut(asset_id)?
            .execute_buy(ctx, amount, max_spend, deadline, &fees)?;

        debug!(
            asset = %short_id(asset_id),
            trader = %short_id(&ctx.caller),
            amount,
            total_cost = receipt.amount_base,
            new_supply = receipt.new_supply,
            "Curve buy"
        );
        self.emit_trade(ctx, asset_id, &receipt);
        self.try_graduate(asset_id, ctx.now);
        Ok(receipt)
    }

    pub fn execute_sell(
        &mut self,
        ctx: &TxContext,
        asset_id: &AssetId,
        amount: u128,
        min_return: u128,
        deadline: u64,
    ) -> MarketResult<TradeReceipt> {
        let fees = self.fees;
        let receipt = self
            .market_mut(asset_id)?
            .execute_sell(ctx, amount, min_return, deadline, &fees)?;

        debug!(
            asset = %short_id(asset_id),
            trader = %short_id(&ctx.caller),
            amount,
            payout = receipt.amount_base,
            new_supply = receipt.new_supply,
            "Curve sell"
        );
        self.emit_trade(ctx, asset_id, &receipt);
        Ok(receipt)
    }

    fn emit_trade(&mut self, ctx: &TxContext, asset_id: &AssetId, receipt: &TradeReceipt) {
        self.emit(MarketEvent::Traded {
            asset_id: *asset_id,
            trader: ctx.caller,
            is_buy: receipt.is_buy,
            amount_base: receipt.amount_base,
            amount_asset: receipt.amount,
            fee: receipt.fee,
            timestamp: ctx.now,
        });
    }

    // ========================================================================
    // Revenue injection
    // ========================================================================

    /// Ok when `inject_revenue` from `ctx.caller` would currently be
    /// accepted for `asset_id`. Checks the same gates in the same order.
    pub fn check_injectable(&self, ctx: &TxContext, asset_id: &AssetId) -> MarketResult<()> {
        self.access.require(&ctx.caller, Capability::Harvest)?;
        let market = self.market(asset_id)?;
        market.require_active()?;
        if market.current_supply == 0 {
            return Err(MarketError::EmptySupply);
        }
        Ok(())
    }

    /// Add harvested revenue to a market's reserve. Requires `Harvest`.
    pub fn inject_revenue(
        &mut self,
        ctx: &TxContext,
        asset_id: &AssetId,
        amount: u128,
    ) -> MarketResult<u128> {
        self.access.require(&ctx.caller, Capability::Harvest)?;
        let new_reserve = self.market_mut(asset_id)?.inject_revenue(amount)?;

        info!(
            asset = %short_id(asset_id),
            amount,
            new_reserve,
            "Revenue injected"
        );
        self.emit(MarketEvent::RevenueInjected {
            asset_id: *asset_id,
            amount,
            new_reserve,
            timestamp: ctx.now,
        });
        self.try_graduate(asset_id, ctx.now);
        Ok(new_reserve)
    }

    // ========================================================================
    // Graduation
    // ========================================================================

    /// Run the crossing check explicitly. Idempotent.
    pub fn check_and_migrate(
        &mut self,
        asset_id: &AssetId,
        now: u64,
    ) -> MarketResult<Option<MigrationRecord>> {
        let market = self
            .registry
            .get_mut(asset_id)
            .ok_or(MarketError::UnknownMarket(*asset_id))?;
        let migrated = self.graduation.check_and_migrate(market, now)?;

        if let Some(record) = migrated {
            info!(
                asset = %short_id(asset_id),
                pool = %short_id(&record.pool_address),
                total_liquidity = record.total_liquidity,
                "Market graduated"
            );
            self.emit(MarketEvent::Graduated {
                asset_id: *asset_id,
                pool_address: record.pool_address,
                total_liquidity: record.total_liquidity,
                timestamp: record.timestamp,
            });
        }
        Ok(migrated)
    }

    /// Graduation triggered as a side effect. A failed migration never
    /// undoes the call that triggered it; the next check retries.
    fn try_graduate(&mut self, asset_id: &AssetId, now: u64) {
        if let Err(e) = self.check_and_migrate(asset_id, now) {
            warn!(
                asset = %short_id(asset_id),
                "Graduation deferred: {}", e
            );
        }
    }

    // ========================================================================
    // Pool operations
    // ========================================================================

    pub fn swap(
        &mut self,
        ctx: &TxContext,
        asset_id: &AssetId,
        amount_in: u128,
        token_in_is_a: bool,
        min_amount_out: u128,
        deadline: u64,
    ) -> MarketResult<SwapReceipt> {
        let receipt = self.pool_mut(asset_id)?.swap(
            ctx,
            amount_in,
            token_in_is_a,
            min_amount_out,
            deadline,
        )?;
        self.emit(MarketEvent::Swapped {
            asset_id: *asset_id,
            trader: ctx.caller,
            token_in_is_a,
            amount_in,
            amount_out: receipt.amount_out,
            timestamp: ctx.now,
        });
        Ok(receipt)
    }

    /// Deposit both sides and mint shares to `to` as one call.
    pub fn add_liquidity(
        &mut self,
        ctx: &TxContext,
        asset_id: &AssetId,
        amount_a: u128,
        amount_b: u128,
        to: Address,
        deadline: u64,
    ) -> MarketResult<LiquidityReceipt> {
        let pool = self.pool_mut(asset_id)?;

        // Work on a copy so a failed mint cannot strand the deposits
        let mut staged = pool.clone();
        staged.deposit(true, amount_a)?;
        staged.deposit(false, amount_b)?;
        let receipt = staged.mint(ctx, to, deadline)?;
        *pool = staged;

        self.emit(MarketEvent::LiquidityMinted {
            asset_id: *asset_id,
            to,
            amount_a: receipt.amount_a,
            amount_b: receipt.amount_b,
            liquidity: receipt.liquidity,
            timestamp: ctx.now,
        });
        Ok(receipt)
    }

    /// Burn the caller's shares. Works while the pool is paused.
    pub fn remove_liquidity(
        &mut self,
        ctx: &TxContext,
        asset_id: &AssetId,
        liquidity: u128,
        to: Address,
        deadline: u64,
    ) -> MarketResult<LiquidityReceipt> {
        let receipt = self
            .pool_mut(asset_id)?
            .burn(ctx, liquidity, to, deadline)?;
        self.emit(MarketEvent::LiquidityBurned {
            asset_id: *asset_id,
            owner: ctx.caller,
            to,
            amount_a: receipt.amount_a,
            amount_b: receipt.amount_b,
            liquidity,
            timestamp: ctx.now,
        });
        Ok(receipt)
    }

    pub fn pause_pool(&mut self, ctx: &TxContext, asset_id: &AssetId) -> MarketResult<()> {
        let Self {
            graduation, access, ..
        } = self;
        let changed = graduation
            .pool_mut(asset_id)
            .ok_or(MarketError::UnknownPool(*asset_id))?
            .pause(&ctx.caller, access)?;

        if changed {
            warn!(asset = %short_id(asset_id), by = %short_id(&ctx.caller), "Pool paused");
            self.emit(MarketEvent::PoolPaused {
                asset_id: *asset_id,
                by: ctx.caller,
                timestamp: ctx.now,
            });
        }
        Ok(())
    }

    pub fn unpause_pool(&mut self, ctx: &TxContext, asset_id: &AssetId) -> MarketResult<()> {
        let Self {
            graduation, access, ..
        } = self;
        let changed = graduation
            .pool_mut(asset_id)
            .ok_or(MarketError::UnknownPool(*asset_id))?
            .unpause(&ctx.caller, access)?;

        if changed {
            info!(asset = %short_id(asset_id), by = %short_id(&ctx.caller), "Pool unpaused");
            self.emit(MarketEvent::PoolUnpaused {
                asset_id: *asset_id,
                by: ctx.caller,
                timestamp: ctx.now,
            });
        }
        Ok(())
    }

    // ========================================================================
    // Fees and reserves
    // ========================================================================

    /// Pay out a market's accrued treasury fees. Requires `Treasury`.
    pub fn collect_treasury_fees(&mut self, ctx: &TxContext, asset_id: &AssetId) -> MarketResult<u128> {
        self.access.require(&ctx.caller, Capability::Treasury)?;
        let amount = self.market_mut(asset_id)?.take_treasury_fees();
        let recipient = self.treasury;
        if amount > 0 {
            self.emit(MarketEvent::FeesCollected {
                asset_id: *asset_id,
                recipient,
                amount,
                timestamp: ctx.now,
            });
        }
        Ok(amount)
    }

    /// Pay out the creator's accrued fee share. Creator only.
    pub fn claim_creator_fees(&mut self, ctx: &TxContext, asset_id: &AssetId) -> MarketResult<u128> {
        let amount = self.market_mut(asset_id)?.take_creator_fees(&ctx.caller)?;
        if amount > 0 {
            self.emit(MarketEvent::FeesCollected {
                asset_id: *asset_id,
                recipient: ctx.caller,
                amount,
                timestamp: ctx.now,
            });
        }
        Ok(amount)
    }

    /// Release the creator's RT reserve after graduation. Creator only, once.
    pub fn claim_creator_reserve(&mut self, ctx: &TxContext, asset_id: &AssetId) -> MarketResult<u128> {
        let amount = self.market_mut(asset_id)?.claim_creator_reserve(&ctx.caller)?;
        info!(asset = %short_id(asset_id), amount, "Creator reserve released");
        Ok(amount)
    }

    // ========================================================================
    // Access control and timelock
    // ========================================================================

    pub fn grant(&mut self, ctx: &TxContext, grantee: Address, capability: Capability) -> MarketResult<()> {
        self.access.grant(&ctx.caller, grantee, capability)?;
        info!(grantee = %short_id(&grantee), %capability, "Capability granted");
        Ok(())
    }

    pub fn revoke(&mut self, ctx: &TxContext, grantee: &Address, capability: Capability) -> MarketResult<()> {
        self.access.revoke(&ctx.caller, grantee, capability)?;
        info!(grantee = %short_id(grantee), %capability, "Capability revoked");
        Ok(())
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    /// Queue a parameter change. Requires `Admin`.
    pub fn schedule_action(
        &mut self,
        ctx: &TxContext,
        action: TimelockedAction,
        execute_after: u64,
    ) -> MarketResult<[u8; 32]> {
        self.access.require(&ctx.caller, Capability::Admin)?;
        self.validate_action(&action)?;
        let id = self.timelock.schedule(action, ctx.now, execute_after)?;
        info!(action_id = %hex::encode(id), execute_after, "Timelocked action scheduled");
        Ok(id)
    }

    /// Apply a queued change once its delay has passed. Requires `Admin`.
    pub fn execute_action(&mut self, ctx: &TxContext, action_id: &[u8; 32]) -> MarketResult<()> {
        self.access.require(&ctx.caller, Capability::Admin)?;

        let action = self
            .timelock
            .get(action_id)
            .map(|scheduled| scheduled.action.clone())
            .ok_or_else(|| MarketError::UnknownAction(hex::encode(action_id)))?;
        // Conditions may have changed since scheduling
        self.validate_action(&action)?;
        let scheduled = self.timelock.take_ready(action_id, ctx.now)?;

        self.apply_action(scheduled.action, ctx.now);
        Ok(())
    }

    pub fn cancel_action(&mut self, ctx: &TxContext, action_id: &[u8; 32]) -> MarketResult<()> {
        self.access.require(&ctx.caller, Capability::Admin)?;
        self.timelock.cancel(action_id)?;
        info!(action_id = %hex::encode(action_id), "Timelocked action cancelled");
        Ok(())
    }

    pub fn timelock(&self) -> &Timelock {
        &self.timelock
    }

    fn validate_action(&self, action: &TimelockedAction) -> MarketResult<()> {
        match action {
            TimelockedAction::SetTradingFee { fee_bps } => {
                if *fee_bps > MAX_TRADING_FEE_BPS {
                    return Err(MarketError::InvalidParameters(format!(
                        "trading fee {} bps exceeds maximum {}",
                        fee_bps, MAX_TRADING_FEE_BPS
                    )));
                }
            }
            TimelockedAction::SetCreatorFeeShare { share_bps } => {
                if *share_bps as u128 > BPS_DENOMINATOR {
                    return Err(MarketError::InvalidParameters(format!(
                        "creator share {} bps exceeds 100%",
                        share_bps
                    )));
                }
            }
            TimelockedAction::SetTreasury { .. } | TimelockedAction::SetMinDelay { .. } => {}
            TimelockedAction::SetGraduationThreshold { asset_id, threshold } => {
                if *threshold == 0 {
                    return Err(MarketError::InvalidParameters(
                        "graduation threshold must be non-zero".to_string(),
                    ));
                }
                self.market(asset_id)?.require_active()?;
            }
        }
        Ok(())
    }

    fn apply_action(&mut self, action: TimelockedAction, now: u64) {
        let (asset_id, parameter, old_value, new_value) = match action {
            TimelockedAction::SetTradingFee { fee_bps } => {
                let old = self.fees.trading_fee_bps;
                self.fees.trading_fee_bps = fee_bps;
                (None, "trading_fee_bps", old.to_string(), fee_bps.to_string())
            }
            TimelockedAction::SetCreatorFeeShare { share_bps } => {
                let old = self.fees.creator_share_bps;
                self.fees.creator_share_bps = share_bps;
                (None, "creator_share_bps", old.to_string(), share_bps.to_string())
            }
            TimelockedAction::SetTreasury { treasury } => {
                let old = std::mem::replace(&mut self.treasury, treasury);
                (None, "treasury", hex::encode(old), hex::encode(treasury))
            }
            TimelockedAction::SetMinDelay { seconds } => {
                let old = self.timelock.min_delay();
                self.timelock.set_min_delay(seconds);
                (None, "timelock_delay_secs", old.to_string(), seconds.to_string())
            }
            TimelockedAction::SetGraduationThreshold { asset_id, threshold } => {
                // Existence was checked by validate_action
                let old = match self.registry.get_mut(&asset_id) {
                    Some(market) => std::mem::replace(&mut market.graduation_threshold, threshold),
                    None => return,
                };
                (
                    Some(asset_id),
                    "graduation_threshold",
                    old.to_string(),
                    threshold.to_string(),
                )
            }
        };

        info!(parameter, %old_value, %new_value, "Timelocked action executed");
        self.emit(MarketEvent::ParameterChanged {
            asset_id,
            parameter: parameter.to_string(),
            old_value,
            new_value,
            timestamp: now,
        });

        if let Some(asset_id) = asset_id {
            self.try_graduate(&asset_id, now);
        }
    }

    // ========================================================================
    // Read API
    // ========================================================================

    pub fn get_market(&self, asset_id: &AssetId) -> MarketResult<MarketView> {
        self.market(asset_id)?.view()
    }

    pub fn get_pool(&self, asset_id: &AssetId) -> MarketResult<PoolView> {
        self.graduation
            .pool(asset_id)
            .map(|pool| pool.state())
            .ok_or(MarketError::UnknownPool(*asset_id))
    }

    pub fn pool(&self, asset_id: &AssetId) -> Option<&ConstantProductPool> {
        self.graduation.pool(asset_id)
    }

    pub fn current_price(&self, asset_id: &AssetId) -> MarketResult<u128> {
        self.market(asset_id)?.current_price()
    }

    pub fn market_cap(&self, asset_id: &AssetId) -> MarketResult<u128> {
        self.market(asset_id)?.market_cap()
    }

    pub fn balance_of(&self, asset_id: &AssetId, holder: &Address) -> MarketResult<u128> {
        Ok(self.market(asset_id)?.balance_of(holder))
    }

    pub fn active_markets(&self) -> Vec<AssetId> {
        self.registry.active_markets()
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    pub fn treasury(&self) -> &Address {
        &self.treasury
    }

    pub fn events(&self) -> &dyn EventIndexer {
        self.indexer.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_point::WAD;

    const ADMIN: Address = [1u8; 32];
    const TREASURY: Address = [2u8; 32];
    const CREATOR: Address = [3u8; 32];
    const TRADER: Address = [4u8; 32];
    const ASSET: AssetId = [5u8; 32];

    fn params(threshold: u128) -> CurveParams {
        CurveParams {
            base_price: WAD / 1_000,
            price_increment: WAD / 1_000,
            wrap_per_unit: 1_000,
            graduation_threshold: threshold,
        }
    }

    fn engine_with_market(threshold: u128) -> MarketEngine {
        let mut engine = MarketEngine::new(EngineConfig {
            timelock_delay_secs: 100,
            ..EngineConfig::new(ADMIN, TREASURY)
        });
        engine
            .launch(&TxContext::new(CREATOR, 0), ASSET, 1_000, &params(threshold))
            .unwrap();
        engine
    }

    #[test]
    fn test_buy_emits_trade_event() {
        let mut engine = engine_with_market(1_000 * WAD);
        engine
            .execute_buy(&TxContext::new(TRADER, 10), &ASSET, 5, u128::MAX, 10)
            .unwrap();

        let trades = engine.events().asset_events_by_type(&ASSET, "traded");
        assert_eq!(trades.len(), 1);
        assert!(matches!(
            trades[0],
            MarketEvent::Traded { is_buy: true, amount_asset: 5, .. }
        ));
    }

    #[test]
    fn test_unknown_market() {
        let engine = engine_with_market(WAD);
        assert_eq!(
            engine.quote_buy(&[0xAA; 32], 1),
            Err(MarketError::UnknownMarket([0xAA; 32]))
        );
    }

    #[test]
    fn test_inject_requires_harvest_capability() {
        let mut engine = engine_with_market(1_000 * WAD);
        engine
            .execute_buy(&TxContext::new(TRADER, 10), &ASSET, 5, u128::MAX, 10)
            .unwrap();
        let err = engine
            .inject_revenue(&TxContext::new(TRADER, 11), &ASSET, 1_000)
            .unwrap_err();
        assert!(matches!(err, MarketError::Unauthorized(_)));
        assert!(engine
            .inject_revenue(&TxContext::new(ADMIN, 11), &ASSET, 1_000)
            .is_ok());
    }

    #[test]
    fn test_check_injectable_matches_inject_gates() {
        let mut engine = engine_with_market(1_000 * WAD);

        // No supply yet
        assert_eq!(
            engine.check_injectable(&TxContext::new(ADMIN, 5), &ASSET),
            Err(MarketError::EmptySupply)
        );

        engine
            .execute_buy(&TxContext::new(TRADER, 10), &ASSET, 5, u128::MAX, 10)
            .unwrap();
        assert!(matches!(
            engine.check_injectable(&TxContext::new(TRADER, 11), &ASSET),
            Err(MarketError::Unauthorized(_))
        ));
        assert_eq!(
            engine.check_injectable(&TxContext::new(ADMIN, 11), &[0xAA; 32]),
            Err(MarketError::UnknownMarket([0xAA; 32]))
        );
        assert!(engine
            .check_injectable(&TxContext::new(ADMIN, 11), &ASSET)
            .is_ok());
    }

    #[test]
    fn test_graduated_market_rejects_expired_trades_as_inactive() {
        let mut engine = engine_with_market(WAD);
        engine
            .execute_buy(&TxContext::new(TRADER, 10), &ASSET, 100, u128::MAX, 10)
            .unwrap();
        assert!(engine.get_market(&ASSET).unwrap().graduated);

        let late = TxContext::new(TRADER, 50);
        assert_eq!(
            engine.execute_buy(&late, &ASSET, 1, u128::MAX, 40),
            Err(MarketError::InactiveMarket(ASSET))
        );
        assert_eq!(
            engine.execute_sell(&late, &ASSET, 1, 0, 40),
            Err(MarketError::InactiveMarket(ASSET))
        );
    }

    #[test]
    fn test_pool_swaps_leave_curve_holdings_untouched() {
        let mut engine = engine_with_market(WAD);
        engine
            .execute_buy(&TxContext::new(TRADER, 10), &ASSET, 100, u128::MAX, 10)
            .unwrap();
        assert_eq!(engine.balance_of(&ASSET, &TRADER).unwrap(), 100);

        // Units held from the curve era are settled by the host, not the pool
        let receipt = engine
            .swap(&TxContext::new(TRADER, 20), &ASSET, 50_000, true, 1, 20)
            .unwrap();
        assert!(receipt.amount_out > 0);
        assert_eq!(engine.balance_of(&ASSET, &TRADER).unwrap(), 100);
    }

    #[test]
    fn test_buy_across_threshold_graduates_once() {
        let mut engine = engine_with_market(WAD);
        engine
            .execute_buy(&TxContext::new(TRADER, 10), &ASSET, 100, u128::MAX, 10)
            .unwrap();

        let view = engine.get_market(&ASSET).unwrap();
        assert!(view.graduated);
        assert!(engine.get_pool(&ASSET).is_ok());

        assert_eq!(engine.check_and_migrate(&ASSET, 11).unwrap(), None);
        assert_eq!(
            engine.events().asset_events_by_type(&ASSET, "graduated").len(),
            1
        );
    }

    #[test]
    fn test_timelocked_fee_change() {
        let mut engine = engine_with_market(WAD);
        let admin = TxContext::new(ADMIN, 1_000);

        let id = engine
            .schedule_action(&admin, TimelockedAction::SetTradingFee { fee_bps: 50 }, 1_100)
            .unwrap();
        assert!(matches!(
            engine.execute_action(&admin, &id),
            Err(MarketError::TimelockNotReady { .. })
        ));
        engine
            .execute_action(&TxContext::new(ADMIN, 1_100), &id)
            .unwrap();
        assert_eq!(engine.fees().trading_fee_bps, 50);
    }

    #[test]
    fn test_schedule_requires_admin() {
        let mut engine = engine_with_market(WAD);
        let err = engine
            .schedule_action(
                &TxContext::new(TRADER, 0),
                TimelockedAction::SetTreasury { treasury: TRADER },
                1_000,
            )
            .unwrap_err();
        assert!(matches!(err, MarketError::Unauthorized(_)));
    }

    #[test]
    fn test_excessive_fee_rejected_at_schedule() {
        let mut engine = engine_with_market(WAD);
        let err = engine
            .schedule_action(
                &TxContext::new(ADMIN, 0),
                TimelockedAction::SetTradingFee { fee_bps: 5_000 },
                1_000,
            )
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidParameters(_)));
    }

    #[test]
    fn test_lowered_threshold_graduates_on_execute() {
        let mut engine = engine_with_market(1_000 * WAD);
        engine
            .execute_buy(&TxContext::new(TRADER, 10), &ASSET, 100, u128::MAX, 10)
            .unwrap();
        assert!(!engine.get_market(&ASSET).unwrap().graduated);

        let id = engine
            .schedule_action(
                &TxContext::new(ADMIN, 20),
                TimelockedAction::SetGraduationThreshold {
                    asset_id: ASSET,
                    threshold: WAD,
                },
                200,
            )
            .unwrap();
        engine.execute_action(&TxContext::new(ADMIN, 200), &id).unwrap();
        assert!(engine.get_market(&ASSET).unwrap().graduated);
    }

    #[test]
    fn test_fee_collection() {
        let mut engine = engine_with_market(1_000 * WAD);
        let receipt = engine
            .execute_buy(&TxContext::new(TRADER, 10), &ASSET, 10, u128::MAX, 10)
            .unwrap();

        let treasury = engine
            .collect_treasury_fees(&TxContext::new(ADMIN, 11), &ASSET)
            .unwrap();
        let creator = engine
            .claim_creator_fees(&TxContext::new(CREATOR, 11), &ASSET)
            .unwrap();
        assert_eq!(treasury + creator, receipt.fee);
        assert_eq!(
            engine
                .collect_treasury_fees(&TxContext::new(ADMIN, 12), &ASSET)
                .unwrap(),
            0
        );
        assert!(engine
            .claim_creator_fees(&TxContext::new(TRADER, 12), &ASSET)
            .is_err());
    }
}
