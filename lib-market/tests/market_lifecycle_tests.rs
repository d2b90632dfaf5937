//! Launch → trade → harvest → graduate → pool, end to end through the engine.

use lib_market::{
    Capability, CurveParams, EngineConfig, EventIndexer, MarketEngine, MarketError, MarketEvent,
    PoolStatus, SledEventIndexer, TimelockedAction, TxContext, WAD, ZERO_ADDRESS,
};

const ADMIN: [u8; 32] = [1u8; 32];
const TREASURY: [u8; 32] = [2u8; 32];
const CREATOR: [u8; 32] = [3u8; 32];
const ALICE: [u8; 32] = [4u8; 32];
const BOB: [u8; 32] = [5u8; 32];
const HARVESTER: [u8; 32] = [6u8; 32];
const LP: [u8; 32] = [7u8; 32];
const ASSET: [u8; 32] = [0xA1; 32];

const MILLI: u128 = WAD / 1_000;

fn params(threshold: u128) -> CurveParams {
    CurveParams {
        base_price: MILLI,
        price_increment: MILLI,
        wrap_per_unit: 1_000,
        graduation_threshold: threshold,
    }
}

fn ctx(caller: [u8; 32], now: u64) -> TxContext {
    TxContext::new(caller, now)
}

fn engine() -> MarketEngine {
    MarketEngine::new(EngineConfig::new(ADMIN, TREASURY))
}

// ============================================================================
// Launch scenarios
// ============================================================================

#[test]
fn test_lock_split_and_first_unit_cost() {
    let mut engine = engine();
    let view = engine
        .launch(&ctx(CREATOR, 0), ASSET, 100, &params(1_000 * WAD))
        .unwrap();

    assert_eq!(view.curve_allocation, 75);
    assert_eq!(view.dex_reserve, 20);
    assert_eq!(view.creator_reserve, 5);
    assert_eq!(view.current_supply, 0);

    // 0.001 base + 1% fee = 0.00101
    let quote = engine.quote_buy(&ASSET, 1).unwrap();
    assert_eq!(quote.base_cost, MILLI);
    assert_eq!(quote.fee, MILLI / 100);
    assert_eq!(quote.total_cost, 1_010_000_000_000_000);
}

#[test]
fn test_launch_from_another_accounts_deposit_fails() {
    let mut engine = engine();
    engine.deposit(&ctx(ALICE, 0), ASSET, 500).unwrap();

    let err = engine
        .launch_from_deposit(&ctx(BOB, 1), ASSET, 500, &params(WAD))
        .unwrap_err();
    assert_eq!(
        err,
        MarketError::InsufficientDeposit {
            available: 0,
            requested: 500
        }
    );
    assert!(engine.get_market(&ASSET).is_err());
    assert_eq!(engine.deposit_of(&ALICE, &ASSET), 500);

    let view = engine
        .launch_from_deposit(&ctx(ALICE, 2), ASSET, 500, &params(WAD))
        .unwrap();
    assert_eq!(view.creator, ALICE);
    assert_eq!(engine.deposit_of(&ALICE, &ASSET), 0);
}

#[test]
fn test_second_launch_rejected() {
    let mut engine = engine();
    engine
        .launch(&ctx(CREATOR, 0), ASSET, 100, &params(WAD))
        .unwrap();
    assert_eq!(
        engine
            .launch(&ctx(ALICE, 1), ASSET, 100, &params(WAD))
            .unwrap_err(),
        MarketError::AlreadyLaunched(ASSET)
    );
}

// ============================================================================
// Full lifecycle
// ============================================================================

#[test]
fn test_full_lifecycle_through_pool() {
    let mut engine = engine();
    engine
        .grant(&ctx(ADMIN, 0), HARVESTER, Capability::Harvest)
        .unwrap();
    engine
        .launch(&ctx(CREATOR, 0), ASSET, 1_000, &params(WAD))
        .unwrap();

    // Curve trading below the threshold
    engine
        .execute_buy(&ctx(ALICE, 10), &ASSET, 20, u128::MAX, 10)
        .unwrap();
    engine
        .execute_buy(&ctx(BOB, 11), &ASSET, 10, u128::MAX, 11)
        .unwrap();
    let price_before = engine.current_price(&ASSET).unwrap();
    assert!(!engine.get_market(&ASSET).unwrap().graduated);

    // Harvested revenue raises price without minting and crosses the threshold
    let view_before = engine.get_market(&ASSET).unwrap();
    engine
        .inject_revenue(&ctx(HARVESTER, 20), &ASSET, WAD / 10)
        .unwrap();
    let view = engine.get_market(&ASSET).unwrap();
    assert_eq!(view.current_supply, view_before.current_supply);
    assert!(view.current_price > price_before);
    assert!(view.graduated);
    assert!(!view.is_active);

    // Curve is frozen
    assert!(matches!(
        engine.execute_buy(&ctx(ALICE, 21), &ASSET, 1, u128::MAX, 21),
        Err(MarketError::InactiveMarket(_))
    ));
    assert!(matches!(
        engine.execute_sell(&ctx(ALICE, 21), &ASSET, 1, 0, 21),
        Err(MarketError::InactiveMarket(_))
    ));
    assert!(matches!(
        engine.inject_revenue(&ctx(HARVESTER, 21), &ASSET, 1),
        Err(MarketError::InactiveMarket(_))
    ));

    // Pool seeded from the dex reserve and the curve reserve
    let pool = engine.get_pool(&ASSET).unwrap();
    assert_eq!(pool.reserve_a, 200 * 1_000);
    assert_eq!(pool.reserve_b, view.reserve_balance);
    assert_eq!(Some(pool.address), view.migration.map(|m| m.pool_address));
    assert_eq!(
        engine.pool(&ASSET).unwrap().liquidity_of(&ZERO_ADDRESS),
        pool.total_liquidity_supply
    );

    // Pool trading
    let swap = engine
        .swap(&ctx(BOB, 30), &ASSET, MILLI, false, 1, 30)
        .unwrap();
    assert!(swap.amount_out > 0);

    // Third-party liquidity, then a pause: exits work, swaps do not
    let pool = engine.get_pool(&ASSET).unwrap();
    let minted = engine
        .add_liquidity(
            &ctx(LP, 40),
            &ASSET,
            pool.reserve_a / 10,
            pool.reserve_b / 10,
            LP,
            40,
        )
        .unwrap();
    assert!(minted.liquidity > 0);

    engine.pause_pool(&ctx(ADMIN, 50), &ASSET).unwrap();
    assert_eq!(engine.get_pool(&ASSET).unwrap().status, PoolStatus::Paused);
    assert_eq!(
        engine
            .swap(&ctx(BOB, 51), &ASSET, MILLI, false, 1, 51)
            .unwrap_err(),
        MarketError::Paused
    );
    let burned = engine
        .remove_liquidity(&ctx(LP, 52), &ASSET, minted.liquidity, LP, 52)
        .unwrap();
    assert!(burned.amount_a > 0 && burned.amount_b > 0);

    engine.unpause_pool(&ctx(ADMIN, 60), &ASSET).unwrap();
    assert!(engine
        .swap(&ctx(BOB, 61), &ASSET, MILLI, false, 1, 61)
        .is_ok());

    // Creator reserve unlocks once
    assert_eq!(
        engine
            .claim_creator_reserve(&ctx(CREATOR, 70), &ASSET)
            .unwrap(),
        50
    );
    assert_eq!(
        engine
            .claim_creator_reserve(&ctx(CREATOR, 71), &ASSET)
            .unwrap_err(),
        MarketError::AlreadyClaimed
    );

    let event_types: Vec<&str> = engine
        .events()
        .asset_events(&ASSET)
        .iter()
        .map(|e| e.event_type())
        .collect();
    assert_eq!(event_types.first(), Some(&"launched"));
    assert_eq!(event_types.iter().filter(|t| **t == "graduated").count(), 1);
    assert!(event_types.contains(&"pool_paused"));
    assert!(event_types.contains(&"liquidity_burned"));
}

#[test]
fn test_pause_requires_capability() {
    let mut engine = engine();
    engine
        .launch(&ctx(CREATOR, 0), ASSET, 1_000, &params(WAD))
        .unwrap();
    engine
        .execute_buy(&ctx(ALICE, 10), &ASSET, 100, u128::MAX, 10)
        .unwrap();
    assert!(engine.get_market(&ASSET).unwrap().graduated);

    assert!(matches!(
        engine.pause_pool(&ctx(ALICE, 11), &ASSET),
        Err(MarketError::Unauthorized(_))
    ));
    engine
        .grant(&ctx(ADMIN, 12), ALICE, Capability::Pause)
        .unwrap();
    engine.pause_pool(&ctx(ALICE, 13), &ASSET).unwrap();
    assert_eq!(engine.get_pool(&ASSET).unwrap().status, PoolStatus::Paused);
}

#[test]
fn test_buy_then_sell_returns_less_than_paid() {
    let mut engine = engine();
    engine
        .launch(&ctx(CREATOR, 0), ASSET, 1_000, &params(1_000 * WAD))
        .unwrap();
    engine
        .execute_buy(&ctx(BOB, 5), &ASSET, 40, u128::MAX, 5)
        .unwrap();

    let bought = engine
        .execute_buy(&ctx(ALICE, 10), &ASSET, 25, u128::MAX, 10)
        .unwrap();
    let sold = engine
        .execute_sell(&ctx(ALICE, 11), &ASSET, 25, 0, 11)
        .unwrap();
    assert!(sold.amount_base < bought.amount_base);
    assert_eq!(engine.balance_of(&ASSET, &ALICE).unwrap(), 0);
}

#[test]
fn test_timelocked_treasury_change_redirects_fees() {
    let mut engine = MarketEngine::new(EngineConfig {
        timelock_delay_secs: 60,
        ..EngineConfig::new(ADMIN, TREASURY)
    });
    engine
        .launch(&ctx(CREATOR, 0), ASSET, 1_000, &params(1_000 * WAD))
        .unwrap();

    let id = engine
        .schedule_action(
            &ctx(ADMIN, 100),
            TimelockedAction::SetTreasury { treasury: BOB },
            160,
        )
        .unwrap();
    engine.execute_action(&ctx(ADMIN, 160), &id).unwrap();
    assert_eq!(engine.treasury(), &BOB);

    engine
        .execute_buy(&ctx(ALICE, 170), &ASSET, 10, u128::MAX, 170)
        .unwrap();
    engine
        .collect_treasury_fees(&ctx(ADMIN, 171), &ASSET)
        .unwrap();

    let collected = engine.events().asset_events_by_type(&ASSET, "fees_collected");
    assert!(matches!(
        collected.as_slice(),
        [MarketEvent::FeesCollected { recipient, .. }] if *recipient == BOB
    ));
}

// ============================================================================
// Persistent event feed
// ============================================================================

#[test]
fn test_engine_events_persist_in_sled() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();

    {
        let indexer = SledEventIndexer::from_db(&db).unwrap();
        let mut engine =
            MarketEngine::with_indexer(EngineConfig::new(ADMIN, TREASURY), Box::new(indexer));
        engine
            .launch(&ctx(CREATOR, 0), ASSET, 1_000, &params(WAD))
            .unwrap();
        engine
            .execute_buy(&ctx(ALICE, 10), &ASSET, 100, u128::MAX, 10)
            .unwrap();
    }

    let reopened = SledEventIndexer::from_db(&db).unwrap();
    assert_eq!(reopened.asset_events_by_type(&ASSET, "launched").len(), 1);
    assert_eq!(reopened.asset_events_by_type(&ASSET, "traded").len(), 1);
    assert_eq!(reopened.asset_events_by_type(&ASSET, "graduated").len(), 1);
    assert!(matches!(
        reopened.latest_event(&ASSET),
        Some(MarketEvent::Graduated { timestamp: 10, .. })
    ));
}
