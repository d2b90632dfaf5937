//! Harvest Orchestrator
//!
//! One cycle walks every harvestable asset that still has an active market:
//!
//! 1. estimate the cost of injecting (engine-side check, then the source)
//! 2. enforce the per-cycle cost ceiling
//! 3. pull and convert royalties
//! 4. inject them into the market reserve
//!
//! Steps 3 and 4 run under the engine write lock. Royalties pulled but not
//! injected are handed back to the source.
//!
//! Any failure skips that market with a reason and moves on. Nothing in a
//! single market can abort the rest of the batch.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

use lib_market::{short_id, Address, AssetId, MarketEngine, MarketError, TxContext};

use crate::royalty_source::{HarvestPolicy, RoyaltySource};

/// Outcome of one harvest cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestCycleResult {
    pub processed: usize,
    pub harvested: usize,
    pub skipped: usize,
    /// Hex asset id → skip reason
    pub per_market_errors: BTreeMap<String, String>,
    pub total_injected: u128,
    pub cost_spent: u64,
    /// Stopped early by a shutdown signal
    pub cancelled: bool,
}

impl HarvestCycleResult {
    fn skip(&mut self, asset_id: &AssetId, reason: String) {
        debug!(asset = %short_id(asset_id), %reason, "Market skipped");
        self.skipped += 1;
        self.per_market_errors.insert(hex::encode(asset_id), reason);
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestSettings {
    /// Caller used for injections; must hold the Harvest capability
    pub harvester: Address,
    pub cost_ceiling_per_cycle: Option<u64>,
    pub default_policy: String,
    pub policies: HashMap<AssetId, HarvestPolicy>,
}

impl HarvestSettings {
    pub fn new(harvester: Address) -> Self {
        Self {
            harvester,
            cost_ceiling_per_cycle: None,
            default_policy: crate::config::DEFAULT_POLICY.to_string(),
            policies: HashMap::new(),
        }
    }

    pub fn policy_for(&self, asset_id: &AssetId) -> HarvestPolicy {
        self.policies
            .get(asset_id)
            .cloned()
            .unwrap_or_else(|| HarvestPolicy::named(self.default_policy.clone()))
    }
}

pub struct HarvestOrchestrator {
    engine: Arc<RwLock<MarketEngine>>,
    source: Arc<dyn RoyaltySource>,
    settings: HarvestSettings,
}

impl HarvestOrchestrator {
    pub fn new(
        engine: Arc<RwLock<MarketEngine>>,
        source: Arc<dyn RoyaltySource>,
        settings: HarvestSettings,
    ) -> Self {
        Self {
            engine,
            source,
            settings,
        }
    }

    pub fn settings(&self) -> &HarvestSettings {
        &self.settings
    }

    /// Run a cycle with no way to cancel it.
    pub async fn run_once(&self) -> HarvestCycleResult {
        let (_tx, rx) = watch::channel(false);
        self.run_cycle(&rx).await
    }

    /// Run one cycle. `cancel` is checked between markets; the market in
    /// flight always finishes and the partial result is returned.
    pub async fn run_cycle(&self, cancel: &watch::Receiver<bool>) -> HarvestCycleResult {
        let mut result = HarvestCycleResult::default();

        let listed = match self.source.list_harvestable_assets().await {
            Ok(listed) => listed,
            Err(e) => {
                error!("Failed to list harvestable assets: {}", e);
                return result;
            }
        };

        let candidates = {
            let engine = self.engine.read().await;
            let active: HashSet<AssetId> = engine.active_markets().into_iter().collect();
            let mut seen = HashSet::new();
            listed
                .into_iter()
                .filter(|asset_id| active.contains(asset_id) && seen.insert(*asset_id))
                .collect::<Vec<_>>()
        };

        if candidates.is_empty() {
            debug!("No harvestable markets");
            return result;
        }

        for asset_id in &candidates {
            if *cancel.borrow() {
                info!(
                    processed = result.processed,
                    remaining = candidates.len() - result.processed,
                    "Harvest cycle cancelled"
                );
                result.cancelled = true;
                break;
            }

            result.processed += 1;
            self.harvest_market(asset_id, &mut result).await;
        }

        info!(
            processed = result.processed,
            harvested = result.harvested,
            skipped = result.skipped,
            total_injected = result.total_injected,
            cost_spent = result.cost_spent,
            "Harvest cycle complete"
        );
        result
    }

    async fn harvest_market(&self, asset_id: &AssetId, result: &mut HarvestCycleResult) {
        let policy = self.settings.policy_for(asset_id);
        let ctx = TxContext::new(self.settings.harvester, unix_now());

        let cost = match self.estimate(&ctx, asset_id, &policy).await {
            Ok(cost) => cost,
            Err(e) => {
                result.skip(asset_id, e.to_string());
                return;
            }
        };

        if let Some(ceiling) = self.settings.cost_ceiling_per_cycle {
            let projected = result.cost_spent.saturating_add(cost);
            if projected > ceiling {
                result.skip(
                    asset_id,
                    format!(
                        "cost ceiling reached: spent={}, estimate={}, ceiling={}",
                        result.cost_spent, cost, ceiling
                    ),
                );
                return;
            }
        }

        // Held from the pull through the injection so no trade can
        // graduate the market in between
        let mut engine = self.engine.write().await;
        if let Err(e) = engine.check_injectable(&ctx, asset_id) {
            result.skip(asset_id, MarketError::EstimationFailed(e.to_string()).to_string());
            return;
        }

        let pulled = self.source.pull_and_convert(asset_id, &policy).await;
        result.cost_spent = result.cost_spent.saturating_add(cost);
        let amount = match pulled {
            Ok(0) => {
                result.skip(asset_id, "nothing accrued".to_string());
                return;
            }
            Ok(amount) => amount,
            Err(e) => {
                result.skip(asset_id, e.to_string());
                return;
            }
        };

        let injected = engine.inject_revenue(&ctx, asset_id, amount);
        drop(engine);

        match injected {
            Ok(new_reserve) => {
                result.harvested += 1;
                result.total_injected = result.total_injected.saturating_add(amount);
                debug!(asset = %short_id(asset_id), amount, new_reserve, "Market harvested");
            }
            Err(e) => {
                warn!(
                    asset = %short_id(asset_id),
                    amount,
                    "Injection failed, returning royalties to source: {}", e
                );
                if let Err(restore_err) = self.source.restore(asset_id, amount).await {
                    error!(
                        asset = %short_id(asset_id),
                        amount,
                        "Failed to return royalties to source: {}", restore_err
                    );
                }
                result.skip(asset_id, e.to_string());
            }
        }
    }

    async fn estimate(
        &self,
        ctx: &TxContext,
        asset_id: &AssetId,
        policy: &HarvestPolicy,
    ) -> Result<u64, MarketError> {
        self.engine
            .read()
            .await
            .check_injectable(ctx, asset_id)
            .map_err(|e| MarketError::EstimationFailed(e.to_string()))?;

        self.source
            .estimate_cost(asset_id, &policy.policy)
            .await
            .map_err(|e| MarketError::EstimationFailed(e.to_string()))
    }
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
