//! Market Events
//!
//! Every state change in launch markets and graduated pools emits an event.
//! These events form the indexer feed that UIs and the subgraph mirror.

use serde::{Deserialize, Serialize};

use crate::errors::MarketResult;
use crate::types::{Address, AssetId};

/// Launch market and pool events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MarketEvent {
    /// Market created from a locked deposit
    Launched {
        asset_id: AssetId,
        creator: Address,
        total_locked: u128,
        curve_allocation: u128,
        dex_reserve: u128,
        creator_reserve: u128,
        timestamp: u64,
    },

    /// RT prefunded for a later launch
    Deposited {
        asset_id: AssetId,
        depositor: Address,
        amount: u128,
        timestamp: u64,
    },

    /// Unused prefunding returned to its depositor
    DepositWithdrawn {
        asset_id: AssetId,
        depositor: Address,
        amount: u128,
        timestamp: u64,
    },

    /// Buy or sell against the bonding curve
    Traded {
        asset_id: AssetId,
        trader: Address,
        is_buy: bool,
        /// Base currency moved (cost paid on buy, payout on sell), fee included
        amount_base: u128,
        /// Curve units minted or burned
        amount_asset: u128,
        /// Trading fee charged
        fee: u128,
        timestamp: u64,
    },

    /// Harvested revenue added to the reserve
    RevenueInjected {
        asset_id: AssetId,
        amount: u128,
        new_reserve: u128,
        timestamp: u64,
    },

    /// Market migrated into a constant-product pool
    Graduated {
        asset_id: AssetId,
        pool_address: Address,
        total_liquidity: u128,
        timestamp: u64,
    },

    /// Swap against a graduated pool
    Swapped {
        asset_id: AssetId,
        trader: Address,
        token_in_is_a: bool,
        amount_in: u128,
        amount_out: u128,
        timestamp: u64,
    },

    /// Liquidity shares minted
    LiquidityMinted {
        asset_id: AssetId,
        to: Address,
        amount_a: u128,
        amount_b: u128,
        liquidity: u128,
        timestamp: u64,
    },

    /// Liquidity shares burned for the underlying reserves
    LiquidityBurned {
        asset_id: AssetId,
        owner: Address,
        to: Address,
        amount_a: u128,
        amount_b: u128,
        liquidity: u128,
        timestamp: u64,
    },

    PoolPaused {
        asset_id: AssetId,
        by: Address,
        timestamp: u64,
    },

    PoolUnpaused {
        asset_id: AssetId,
        by: Address,
        timestamp: u64,
    },

    /// Accrued trading fees paid out
    FeesCollected {
        asset_id: AssetId,
        recipient: Address,
        amount: u128,
        timestamp: u64,
    },

    /// Timelocked parameter change applied
    ParameterChanged {
        /// Market affected, if the parameter is per-asset
        asset_id: Option<AssetId>,
        parameter: String,
        old_value: String,
        new_value: String,
        timestamp: u64,
    },
}

impl MarketEvent {
    /// Asset this event belongs to (`None` for protocol-wide parameter changes)
    pub fn asset_id(&self) -> Option<&AssetId> {
        match self {
            MarketEvent::Launched { asset_id, .. }
            | MarketEvent::Deposited { asset_id, .. }
            | MarketEvent::DepositWithdrawn { asset_id, .. }
            | MarketEvent::Traded { asset_id, .. }
            | MarketEvent::RevenueInjected { asset_id, .. }
            | MarketEvent::Graduated { asset_id, .. }
            | MarketEvent::Swapped { asset_id, .. }
            | MarketEvent::LiquidityMinted { asset_id, .. }
            | MarketEvent::LiquidityBurned { asset_id, .. }
            | MarketEvent::PoolPaused { asset_id, .. }
            | MarketEvent::PoolUnpaused { asset_id, .. }
            | MarketEvent::FeesCollected { asset_id, .. } => Some(asset_id),
            MarketEvent::ParameterChanged { asset_id, .. } => asset_id.as_ref(),
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            MarketEvent::Launched { timestamp, .. }
            | MarketEvent::Deposited { timestamp, .. }
            | MarketEvent::DepositWithdrawn { timestamp, .. }
            | MarketEvent::Traded { timestamp, .. }
            | MarketEvent::RevenueInjected { timestamp, .. }
            | MarketEvent::Graduated { timestamp, .. }
            | MarketEvent::Swapped { timestamp, .. }
            | MarketEvent::LiquidityMinted { timestamp, .. }
            | MarketEvent::LiquidityBurned { timestamp, .. }
            | MarketEvent::PoolPaused { timestamp, .. }
            | MarketEvent::PoolUnpaused { timestamp, .. }
            | MarketEvent::FeesCollected { timestamp, .. }
            | MarketEvent::ParameterChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Get event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            MarketEvent::Launched { .. } => "launched",
            MarketEvent::Deposited { .. } => "deposited",
            MarketEvent::DepositWithdrawn { .. } => "deposit_withdrawn",
            MarketEvent::Traded { .. } => "traded",
            MarketEvent::RevenueInjected { .. } => "revenue_injected",
            MarketEvent::Graduated { .. } => "graduated",
            MarketEvent::Swapped { .. } => "swapped",
            MarketEvent::LiquidityMinted { .. } => "liquidity_minted",
            MarketEvent::LiquidityBurned { .. } => "liquidity_burned",
            MarketEvent::PoolPaused { .. } => "pool_paused",
            MarketEvent::PoolUnpaused { .. } => "pool_unpaused",
            MarketEvent::FeesCollected { .. } => "fees_collected",
            MarketEvent::ParameterChanged { .. } => "parameter_changed",
        }
    }
}

/// Event indexer interface
///
/// The engine pushes every event here in emission order.
pub trait EventIndexer: Send + Sync {
    /// Index a new event
    fn index_event(&mut self, event: MarketEvent) -> MarketResult<()>;

    /// All events for an asset, oldest first
    fn asset_events(&self, asset_id: &AssetId) -> Vec<MarketEvent>;

    /// Events of one type for an asset, oldest first
    fn asset_events_by_type(&self, asset_id: &AssetId, event_type: &str) -> Vec<MarketEvent>;

    /// Events with `start <= timestamp <= end`
    fn events_in_range(&self, start: u64, end: u64) -> Vec<MarketEvent>;

    /// Most recent event for an asset
    fn latest_event(&self, asset_id: &AssetId) -> Option<MarketEvent> {
        self.asset_events(asset_id).pop()
    }

    fn event_count(&self) -> usize;
}

/// In-memory event indexer
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventIndexer {
    events: Vec<MarketEvent>,
}

impl InMemoryEventIndexer {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn events(&self) -> &[MarketEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventIndexer for InMemoryEventIndexer {
    fn index_event(&mut self, event: MarketEvent) -> MarketResult<()> {
        self.events.push(event);
        Ok(())
    }

    fn asset_events(&self, asset_id: &AssetId) -> Vec<MarketEvent> {
        self.events
            .iter()
            .filter(|e| e.asset_id() == Some(asset_id))
            .cloned()
            .collect()
    }

    fn asset_events_by_type(&self, asset_id: &AssetId, event_type: &str) -> Vec<MarketEvent> {
        self.events
            .iter()
            .filter(|e| e.asset_id() == Some(asset_id) && e.event_type() == event_type)
            .cloned()
            .collect()
    }

    fn events_in_range(&self, start: u64, end: u64) -> Vec<MarketEvent> {
        self.events
            .iter()
            .filter(|e| {
                let ts = e.timestamp();
                ts >= start && ts <= end
            })
            .cloned()
            .collect()
    }

    fn event_count(&self) -> usize {
        self.events.len()
    }
}
