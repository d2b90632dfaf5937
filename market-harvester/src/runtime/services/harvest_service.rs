//! Harvest Service
//!
//! Background task that runs a harvest cycle on a fixed cadence.
//!
//! ## Operation
//! - Ticks every `cadence_secs` (missed ticks are skipped, never bunched)
//! - Each tick runs one [`HarvestOrchestrator::run_cycle`]
//! - `stop` signals shutdown; a cycle in progress finishes its current
//!   market and returns a partial result

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::orchestrator::{HarvestCycleResult, HarvestOrchestrator};

/// Configuration for the harvest service
#[derive(Debug, Clone)]
pub struct HarvestServiceConfig {
    /// Whether scheduled harvesting is enabled
    pub enabled: bool,
    /// Seconds between cycles
    pub cadence_secs: u64,
}

impl Default for HarvestServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cadence_secs: crate::config::DEFAULT_CADENCE_SECS,
        }
    }
}

/// Scheduled royalty harvesting
pub struct HarvestService {
    orchestrator: Arc<HarvestOrchestrator>,
    config: HarvestServiceConfig,
    service_handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
    shutdown_tx: Arc<RwLock<Option<watch::Sender<bool>>>>,
    last_result: Arc<RwLock<Option<HarvestCycleResult>>>,
    cycles_completed: Arc<RwLock<u64>>,
}

impl HarvestService {
    pub fn new(orchestrator: Arc<HarvestOrchestrator>, config: HarvestServiceConfig) -> Self {
        Self {
            orchestrator,
            config,
            service_handle: Arc::new(RwLock::new(None)),
            shutdown_tx: Arc::new(RwLock::new(None)),
            last_result: Arc::new(RwLock::new(None)),
            cycles_completed: Arc::new(RwLock::new(0)),
        }
    }

    pub fn with_defaults(orchestrator: Arc<HarvestOrchestrator>) -> Self {
        Self::new(orchestrator, HarvestServiceConfig::default())
    }

    /// Start the harvest loop
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Harvest service disabled");
            return Ok(());
        }
        if self.config.cadence_secs == 0 {
            return Err(anyhow::anyhow!("Harvest cadence must be greater than zero"));
        }

        if self.service_handle.read().await.is_some() {
            warn!("Harvest service already running");
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let orchestrator = self.orchestrator.clone();
        let last_result = self.last_result.clone();
        let cycles_completed = self.cycles_completed.clone();
        let cadence = Duration::from_secs(self.config.cadence_secs);

        let handle = tokio::spawn(async move {
            Self::harvest_loop(orchestrator, cadence, shutdown_rx, last_result, cycles_completed)
                .await;
        });

        *self.shutdown_tx.write().await = Some(shutdown_tx);
        *self.service_handle.write().await = Some(handle);
        info!(
            "Harvest service started (cadence: {}s)",
            self.config.cadence_secs
        );
        Ok(())
    }

    /// Signal shutdown and wait for the loop to exit
    pub async fn stop(&self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.service_handle.write().await.take() {
            handle.await?;
            info!("Harvest service stopped");
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.service_handle.read().await.is_some()
    }

    /// Result of the most recent cycle
    pub async fn last_result(&self) -> Option<HarvestCycleResult> {
        self.last_result.read().await.clone()
    }

    pub async fn cycles_completed(&self) -> u64 {
        *self.cycles_completed.read().await
    }

    async fn harvest_loop(
        orchestrator: Arc<HarvestOrchestrator>,
        cadence: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
        last_result: Arc<RwLock<Option<HarvestCycleResult>>>,
        cycles_completed: Arc<RwLock<u64>>,
    ) {
        let mut ticker = interval(cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Harvest loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.changed() => {
                    info!("Harvest loop received shutdown signal");
                    break;
                }
            }
            if *shutdown_rx.borrow() {
                break;
            }

            let result = orchestrator.run_cycle(&shutdown_rx).await;
            debug!(
                harvested = result.harvested,
                skipped = result.skipped,
                "Harvest tick finished"
            );
            let cancelled = result.cancelled;
            *last_result.write().await = Some(result);
            *cycles_completed.write().await += 1;

            if cancelled {
                break;
            }
        }

        info!("Harvest loop exited");
    }
}
