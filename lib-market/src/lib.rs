//! Launch Market Package
//!
//! Bonding-curve launch markets for wrapped revenue assets. A market prices
//! its units on a linear curve until its market cap crosses the graduation
//! threshold, then migrates into a constant-product pool. Harvested revenue
//! can be injected into a market's reserve at any point before graduation.

pub mod fixed_point;
pub mod types;
pub mod errors;
pub mod access;
pub mod timelock;
pub mod events;
pub mod event_indexer;
pub mod curve;
pub mod market;
pub mod launch;
pub mod pool;
pub mod graduation;
pub mod engine;

// Re-export the main surface for convenience
pub use types::{short_id, Address, AssetId, CurveParams, TxContext, ZERO_ADDRESS};
pub use errors::{MarketError, MarketResult};
pub use fixed_point::{MathError, BPS_DENOMINATOR, WAD};
pub use access::{AccessControl, Capability};
pub use timelock::{ScheduledAction, Timelock, TimelockedAction};
pub use events::{EventIndexer, InMemoryEventIndexer, MarketEvent};
pub use event_indexer::SledEventIndexer;
pub use curve::{FeeSchedule, LinearCurve};
pub use market::{BuyQuote, Market, MarketView, MigrationRecord, SellQuote, TradeReceipt};
pub use launch::{LaunchRegistry, LaunchSplit, RegistryStats};
pub use pool::{ConstantProductPool, LiquidityReceipt, Observation, PoolStatus, PoolView, SwapReceipt};
pub use graduation::{GraduationConfig, GraduationEngine};
pub use engine::{EngineConfig, MarketEngine, DEFAULT_TIMELOCK_DELAY_SECS};
