//! Market Harvester
//!
//! Periodically pulls accrued royalties for launched assets and injects them
//! into their curve reserves. One market failing never stops the others.

pub mod config;
pub mod royalty_source;
pub mod orchestrator;
pub mod runtime;

pub use config::{load_config, ConfigError, HarvesterConfig};
pub use orchestrator::{HarvestCycleResult, HarvestOrchestrator, HarvestSettings};
pub use royalty_source::{HarvestPolicy, RoyaltySource, RoyaltySourceError, StaticAsset, StaticRoyaltySource};
pub use runtime::services::{HarvestService, HarvestServiceConfig};
pub use runtime::HarvesterRuntime;
