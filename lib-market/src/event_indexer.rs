//! Sled-backed Persistent Event Indexer

use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::{MarketError, MarketResult};
use crate::events::{EventIndexer, MarketEvent};
use crate::types::AssetId;

const TREE_EVENTS: &str = "market_events";
const TREE_ASSET_INDEX: &str = "market_events_asset_idx";
const TREE_TIME_INDEX: &str = "market_events_time_idx";
const TREE_TYPE_INDEX: &str = "market_events_type_idx";
const TREE_META: &str = "market_events_meta";
const KEY_COUNTER: &str = "counter";

/// Prefix used for events with no asset (protocol-wide parameter changes)
const GLOBAL_PREFIX: &str = "global";

fn storage_err(e: impl std::fmt::Display) -> MarketError {
    MarketError::Indexer(e.to_string())
}

/// Sled-backed persistent event indexer
///
/// Events are stored once under a zero-padded sequence number; the asset,
/// time and type trees map index keys back to that sequence key so prefix
/// scans come back in emission order.
#[derive(Debug)]
pub struct SledEventIndexer {
    events: sled::Tree,
    asset_index: sled::Tree,
    time_index: sled::Tree,
    type_index: sled::Tree,
    meta: sled::Tree,
    event_counter: AtomicU64,
}

impl SledEventIndexer {
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> MarketResult<Self> {
        let db = sled::open(path).map_err(storage_err)?;
        Self::from_db(&db)
    }

    pub fn from_db(db: &sled::Db) -> MarketResult<Self> {
        let events = db.open_tree(TREE_EVENTS).map_err(storage_err)?;
        let asset_index = db.open_tree(TREE_ASSET_INDEX).map_err(storage_err)?;
        let time_index = db.open_tree(TREE_TIME_INDEX).map_err(storage_err)?;
        let type_index = db.open_tree(TREE_TYPE_INDEX).map_err(storage_err)?;
        let meta = db.open_tree(TREE_META).map_err(storage_err)?;

        let counter = meta
            .get(KEY_COUNTER)
            .map_err(storage_err)?
            .map(|v| {
                let bytes: [u8; 8] = v.as_ref().try_into().unwrap_or([0u8; 8]);
                u64::from_be_bytes(bytes)
            })
            .unwrap_or(0);

        Ok(Self {
            events,
            asset_index,
            time_index,
            type_index,
            meta,
            event_counter: AtomicU64::new(counter),
        })
    }

    fn asset_prefix(asset_id: Option<&AssetId>) -> String {
        asset_id
            .map(hex::encode)
            .unwrap_or_else(|| GLOBAL_PREFIX.to_string())
    }

    fn next_event_key(&self) -> String {
        let seq = self.event_counter.fetch_add(1, Ordering::SeqCst);
        format!("{:020}", seq)
    }

    fn save_counter(&self) -> MarketResult<()> {
        let counter = self.event_counter.load(Ordering::SeqCst);
        self.meta
            .insert(KEY_COUNTER, &counter.to_be_bytes())
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn flush(&self) -> MarketResult<()> {
        for tree in [
            &self.events,
            &self.asset_index,
            &self.time_index,
            &self.type_index,
            &self.meta,
        ] {
            tree.flush().map_err(storage_err)?;
        }
        Ok(())
    }

    fn load(&self, event_key: &[u8]) -> Option<MarketEvent> {
        match self.events.get(event_key) {
            Ok(Some(data)) => match bincode::deserialize::<MarketEvent>(&data) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::error!("Failed to deserialize event: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::error!("Failed to read event: {}", e);
                None
            }
        }
    }

    fn scan_index(&self, tree: &sled::Tree, prefix: &str) -> Vec<MarketEvent> {
        let mut events = Vec::new();
        for result in tree.scan_prefix(prefix.as_bytes()) {
            match result {
                Ok((_, event_key)) => {
                    if let Some(event) = self.load(&event_key) {
                        events.push(event);
                    }
                }
                Err(e) => {
                    tracing::error!("Error reading event index: {}", e);
                }
            }
        }
        events
    }
}

impl EventIndexer for SledEventIndexer {
    fn index_event(&mut self, event: MarketEvent) -> MarketResult<()> {
        let event_key = self.next_event_key();
        let asset = Self::asset_prefix(event.asset_id());
        let event_type = event.event_type();
        let timestamp = event.timestamp();

        let serialized = bincode::serialize(&event).map_err(storage_err)?;
        self.events
            .insert(event_key.as_bytes(), serialized)
            .map_err(storage_err)?;
        self.save_counter()?;

        let asset_idx_key = format!("{}/{}", asset, &event_key);
        if let Err(e) = self
            .asset_index
            .insert(asset_idx_key.as_bytes(), event_key.as_bytes())
        {
            tracing::error!("Failed to update asset index: {}", e);
        }

        let time_idx_key = format!("{:020}/{}", timestamp, &event_key);
        if let Err(e) = self
            .time_index
            .insert(time_idx_key.as_bytes(), event_key.as_bytes())
        {
            tracing::error!("Failed to update time index: {}", e);
        }

        let type_idx_key = format!("{}/{}/{}", event_type, asset, &event_key);
        if let Err(e) = self
            .type_index
            .insert(type_idx_key.as_bytes(), event_key.as_bytes())
        {
            tracing::error!("Failed to update type index: {}", e);
        }

        Ok(())
    }

    fn asset_events(&self, asset_id: &AssetId) -> Vec<MarketEvent> {
        let prefix = format!("{}/", hex::encode(asset_id));
        self.scan_index(&self.asset_index, &prefix)
    }

    fn asset_events_by_type(&self, asset_id: &AssetId, event_type: &str) -> Vec<MarketEvent> {
        let prefix = format!("{}/{}/", event_type, hex::encode(asset_id));
        self.scan_index(&self.type_index, &prefix)
    }

    fn events_in_range(&self, start: u64, end: u64) -> Vec<MarketEvent> {
        let start_key = format!("{:020}/", start);
        // '0' sorts after '/', so this bound includes every key for `end`
        let end_key = format!("{:020}0", end);

        let mut events = Vec::new();
        for result in self.time_index.range(start_key.as_bytes()..end_key.as_bytes()) {
            match result {
                Ok((_, event_key)) => {
                    if let Some(event) = self.load(&event_key) {
                        events.push(event);
                    }
                }
                Err(e) => {
                    tracing::error!("Error reading time index: {}", e);
                }
            }
        }
        events
    }

    fn event_count(&self) -> usize {
        self.events.len()
    }
}
