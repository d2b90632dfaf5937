//! Harvester runtime
//!
//! Builds the shared engine, royalty source and orchestrator from a
//! [`HarvesterConfig`], launching any markets the config declares.

pub mod services;

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use lib_market::{
    short_id, Capability, MarketEngine, SledEventIndexer, TxContext,
};

use crate::config::{parse_id, HarvesterConfig};
use crate::orchestrator::{unix_now, HarvestOrchestrator, HarvestSettings};
use crate::royalty_source::{HarvestPolicy, StaticAsset, StaticRoyaltySource};
use services::{HarvestService, HarvestServiceConfig};

/// Everything a running harvester needs
pub struct HarvesterRuntime {
    pub engine: Arc<RwLock<MarketEngine>>,
    pub source: Arc<StaticRoyaltySource>,
    pub orchestrator: Arc<HarvestOrchestrator>,
    pub cadence_secs: u64,
}

impl HarvesterRuntime {
    pub async fn from_config(config: &HarvesterConfig) -> Result<Self> {
        config.validate()?;

        let engine_config = config.engine_config()?;
        let mut engine = match &config.event_db_path {
            Some(path) => {
                let indexer = SledEventIndexer::open(path)
                    .with_context(|| format!("opening event db at {}", path.display()))?;
                info!("Persisting market events to {}", path.display());
                MarketEngine::with_indexer(engine_config, Box::new(indexer))
            }
            None => MarketEngine::new(engine_config),
        };

        let harvester = config.harvester()?;
        let admin = TxContext::new(engine_config.admin, unix_now());
        if !engine.access().has(&harvester, Capability::Harvest) {
            engine.grant(&admin, harvester, Capability::Harvest)?;
        }

        let source = Arc::new(StaticRoyaltySource::new());
        let mut policies = HashMap::new();

        for entry in &config.assets {
            let asset_id = parse_id("assets.asset_id", &entry.asset_id)?;

            if let Some(launch) = &entry.launch {
                let creator = TxContext::new(parse_id("assets.launch.creator", &launch.creator)?, unix_now());
                engine
                    .launch(&creator, asset_id, launch.lock_amount as u128, &launch.curve_params())
                    .with_context(|| format!("launching {}", short_id(&asset_id)))?;
                if launch.seed_buy > 0 {
                    engine
                        .execute_buy(&creator, &asset_id, launch.seed_buy as u128, u128::MAX, creator.now)
                        .with_context(|| format!("seed buy for {}", short_id(&asset_id)))?;
                }
            }

            policies.insert(
                asset_id,
                HarvestPolicy {
                    policy: entry
                        .policy
                        .clone()
                        .unwrap_or_else(|| config.default_policy.clone()),
                    ancestor_ref: entry.ancestor_ref.clone(),
                    child_refs: entry.child_refs.clone(),
                    policy_refs: entry.policy_refs.clone(),
                    currency_refs: entry.currency_refs.clone(),
                },
            );
            source
                .insert(
                    asset_id,
                    StaticAsset {
                        accrual_per_pull: entry.accrual_per_pull,
                        estimated_cost: entry.estimated_cost,
                        ..StaticAsset::default()
                    },
                )
                .await;
        }

        let settings = HarvestSettings {
            harvester,
            cost_ceiling_per_cycle: config.cost_ceiling_per_cycle,
            default_policy: config.default_policy.clone(),
            policies,
        };

        let engine = Arc::new(RwLock::new(engine));
        let orchestrator = Arc::new(HarvestOrchestrator::new(
            engine.clone(),
            source.clone(),
            settings,
        ));

        info!(
            assets = config.assets.len(),
            harvester = %short_id(&harvester),
            "Harvester runtime ready"
        );
        Ok(Self {
            engine,
            source,
            orchestrator,
            cadence_secs: config.cadence_secs,
        })
    }

    pub fn service(&self) -> HarvestService {
        HarvestService::new(
            self.orchestrator.clone(),
            HarvestServiceConfig {
                enabled: true,
                cadence_secs: self.cadence_secs,
            },
        )
    }
}
