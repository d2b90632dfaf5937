//! Harvest cycles against a live engine.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};

use lib_market::{AssetId, CurveParams, EngineConfig, MarketEngine, TxContext, WAD};
use market_harvester::{
    load_config, HarvestOrchestrator, HarvestPolicy, HarvestSettings, HarvesterRuntime,
    RoyaltySource, RoyaltySourceError, StaticAsset, StaticRoyaltySource,
};

const ADMIN: [u8; 32] = [1u8; 32];
const CREATOR: [u8; 32] = [3u8; 32];

fn asset(n: u8) -> AssetId {
    [0xA0 + n; 32]
}

fn params() -> CurveParams {
    CurveParams {
        base_price: WAD / 1_000,
        price_increment: WAD / 1_000,
        wrap_per_unit: 1_000,
        graduation_threshold: 1_000_000 * WAD,
    }
}

async fn launch_markets(
    count: u8,
) -> (Arc<RwLock<MarketEngine>>, Arc<StaticRoyaltySource>, Vec<AssetId>) {
    let mut engine = MarketEngine::new(EngineConfig::new(ADMIN, ADMIN));
    let source = Arc::new(StaticRoyaltySource::new());
    let mut assets = Vec::new();

    for n in 1..=count {
        let asset_id = asset(n);
        engine
            .launch(&TxContext::new(CREATOR, 0), asset_id, 1_000, &params())
            .unwrap();
        engine
            .execute_buy(&TxContext::new(CREATOR, 0), &asset_id, 10, u128::MAX, 0)
            .unwrap();
        source
            .insert(
                asset_id,
                StaticAsset {
                    accrual_per_pull: WAD / 100,
                    estimated_cost: 5,
                    ..StaticAsset::default()
                },
            )
            .await;
        assets.push(asset_id);
    }

    (Arc::new(RwLock::new(engine)), source, assets)
}

// ============================================================================
// Partial failure
// ============================================================================

#[tokio::test]
async fn test_one_failed_estimate_does_not_block_batch() {
    let (engine, source, assets) = launch_markets(5).await;
    source
        .fail_estimation(&assets[2], "policy oracle unreachable")
        .await;

    let reserves_before: Vec<u128> = {
        let engine = engine.read().await;
        assets
            .iter()
            .map(|a| engine.get_market(a).unwrap().reserve_balance)
            .collect()
    };

    let orchestrator =
        HarvestOrchestrator::new(engine.clone(), source.clone(), HarvestSettings::new(ADMIN));
    let result = orchestrator.run_once().await;

    assert_eq!(result.processed, 5);
    assert_eq!(result.harvested, 4);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.per_market_errors.len(), 1);
    let reason = &result.per_market_errors[&hex::encode(assets[2])];
    assert!(reason.contains("policy oracle unreachable"));
    assert_eq!(result.total_injected, 4 * (WAD / 100));

    let engine = engine.read().await;
    for (i, asset_id) in assets.iter().enumerate() {
        let reserve = engine.get_market(asset_id).unwrap().reserve_balance;
        if i == 2 {
            assert_eq!(reserve, reserves_before[i]);
        } else {
            assert_eq!(reserve, reserves_before[i] + WAD / 100);
        }
    }
}

#[tokio::test]
async fn test_listing_failure_yields_empty_result() {
    let (engine, source, _) = launch_markets(2).await;
    source.set_unavailable(Some("api down".to_string())).await;

    let orchestrator = HarvestOrchestrator::new(engine, source, HarvestSettings::new(ADMIN));
    let result = orchestrator.run_once().await;
    assert_eq!(result.processed, 0);
    assert!(result.per_market_errors.is_empty());
}

#[tokio::test]
async fn test_graduated_market_drops_out_of_candidates() {
    let (engine, source, assets) = launch_markets(2).await;
    {
        let mut engine = engine.write().await;
        let id = engine
            .schedule_action(
                &TxContext::new(ADMIN, 0),
                lib_market::TimelockedAction::SetGraduationThreshold {
                    asset_id: assets[0],
                    threshold: 1,
                },
                lib_market::DEFAULT_TIMELOCK_DELAY_SECS,
            )
            .unwrap();
        engine
            .execute_action(
                &TxContext::new(ADMIN, lib_market::DEFAULT_TIMELOCK_DELAY_SECS),
                &id,
            )
            .unwrap();
        assert!(engine.get_market(&assets[0]).unwrap().graduated);
    }

    let orchestrator = HarvestOrchestrator::new(engine, source, HarvestSettings::new(ADMIN));
    let result = orchestrator.run_once().await;
    assert_eq!(result.processed, 1);
    assert_eq!(result.harvested, 1);
}

// ============================================================================
// Cancellation
// ============================================================================

/// Delegates to a static source and raises the shutdown flag while pulling
/// one chosen asset.
struct CancellingSource {
    inner: Arc<StaticRoyaltySource>,
    cancel_on: AssetId,
    shutdown: watch::Sender<bool>,
}

#[async_trait]
impl RoyaltySource for CancellingSource {
    async fn list_harvestable_assets(&self) -> Result<Vec<AssetId>, RoyaltySourceError> {
        self.inner.list_harvestable_assets().await
    }

    async fn estimate_cost(&self, asset_id: &AssetId, policy: &str) -> Result<u64, RoyaltySourceError> {
        self.inner.estimate_cost(asset_id, policy).await
    }

    async fn pull_and_convert(
        &self,
        asset_id: &AssetId,
        policy: &HarvestPolicy,
    ) -> Result<u128, RoyaltySourceError> {
        if asset_id == &self.cancel_on {
            let _ = self.shutdown.send(true);
        }
        self.inner.pull_and_convert(asset_id, policy).await
    }

    async fn restore(&self, asset_id: &AssetId, amount: u128) -> Result<(), RoyaltySourceError> {
        self.inner.restore(asset_id, amount).await
    }
}

#[tokio::test]
async fn test_cancel_finishes_in_flight_market() {
    let (engine, inner, assets) = launch_markets(4).await;
    let (shutdown, rx) = watch::channel(false);
    let source = Arc::new(CancellingSource {
        inner,
        cancel_on: assets[1],
        shutdown,
    });

    let orchestrator = HarvestOrchestrator::new(engine, source, HarvestSettings::new(ADMIN));
    let result = orchestrator.run_cycle(&rx).await;

    assert!(result.cancelled);
    assert_eq!(result.processed, 2);
    assert_eq!(result.harvested, 2);
}

// ============================================================================
// Config-driven runtime
// ============================================================================

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_runtime_from_config_file() {
    let harvester = hex::encode([6u8; 32]);
    let doc = format!(
        r#"
        cadence_secs = 60
        cost_ceiling_per_cycle = 100
        harvester_address = "{harvester}"

        [engine]
        admin_address = "{admin}"
        treasury_address = "{admin}"

        [[assets]]
        asset_id = "{a1}"
        policy = "LRP"
        estimated_cost = 10
        accrual_per_pull = "10000000000000000"

        [assets.launch]
        creator = "{creator}"
        lock_amount = 1000
        base_price = "1000000000000000"
        price_increment = "1000000000000000"
        wrap_per_unit = 1000
        graduation_threshold = "1000000000000000000000"
        seed_buy = 10

        [[assets]]
        asset_id = "{a2}"
        estimated_cost = 10
        "#,
        harvester = harvester,
        admin = hex::encode(ADMIN),
        creator = hex::encode(CREATOR),
        a1 = hex::encode(asset(1)),
        a2 = hex::encode(asset(2)),
    );
    let file = write_config(&doc);

    let config = load_config(Some(file.path())).unwrap();
    assert_eq!(config.cadence_secs, 60);
    assert_eq!(config.assets.len(), 2);

    let runtime = HarvesterRuntime::from_config(&config).await.unwrap();
    let policy = runtime.orchestrator.settings().policy_for(&asset(2));
    assert_eq!(policy.policy, "LAP");

    // Only the launched asset is a candidate
    let result = runtime.orchestrator.run_once().await;
    assert_eq!(result.processed, 1);
    assert_eq!(result.harvested, 1);
    assert_eq!(result.cost_spent, 10);

    let engine = runtime.engine.read().await;
    assert_eq!(engine.active_markets(), vec![asset(1)]);
    assert_eq!(
        engine
            .events()
            .asset_events_by_type(&asset(1), "revenue_injected")
            .len(),
        1
    );
}

#[tokio::test]
async fn test_service_runs_first_cycle_immediately() {
    let (engine, source, _) = launch_markets(3).await;
    let orchestrator = Arc::new(HarvestOrchestrator::new(
        engine,
        source,
        HarvestSettings::new(ADMIN),
    ));
    let service = market_harvester::HarvestService::new(
        orchestrator,
        market_harvester::HarvestServiceConfig {
            enabled: true,
            cadence_secs: 3600,
        },
    );

    service.start().await.unwrap();
    for _ in 0..50 {
        if service.cycles_completed().await > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    service.stop().await.unwrap();

    let result = service.last_result().await.unwrap();
    assert_eq!(result.harvested, 3);
}
