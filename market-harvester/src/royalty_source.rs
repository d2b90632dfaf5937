//! Royalty Source
//!
//! The external service that knows which assets have accrued royalties and
//! can pull them, converted to the base currency, ready for injection.
//! A per-asset failure must not leave anything half-done on the source side.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use lib_market::{short_id, AssetId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoyaltySourceError {
    #[error("Asset {0} is not known to the royalty source")]
    UnknownAsset(String),

    #[error("{0}")]
    Estimation(String),

    #[error("Royalty pull failed: {0}")]
    Pull(String),

    #[error("Royalty source unavailable: {0}")]
    Unavailable(String),
}

/// Royalty routing for one asset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestPolicy {
    /// Royalty policy identifier
    pub policy: String,
    pub ancestor_ref: Option<String>,
    pub child_refs: Vec<String>,
    pub policy_refs: Vec<String>,
    pub currency_refs: Vec<String>,
}

impl HarvestPolicy {
    pub fn named(policy: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait RoyaltySource: Send + Sync {
    /// Assets with royalties that may be pulled
    async fn list_harvestable_assets(&self) -> Result<Vec<AssetId>, RoyaltySourceError>;

    /// Cost estimate for pulling `asset_id` under `policy`
    async fn estimate_cost(&self, asset_id: &AssetId, policy: &str) -> Result<u64, RoyaltySourceError>;

    /// Pull accrued royalties and convert them to the base currency.
    ///
    /// Returns the converted amount, zero when nothing has accrued.
    async fn pull_and_convert(
        &self,
        asset_id: &AssetId,
        policy: &HarvestPolicy,
    ) -> Result<u128, RoyaltySourceError>;

    /// Hand back royalties that were pulled but could not be credited.
    async fn restore(&self, asset_id: &AssetId, amount: u128) -> Result<(), RoyaltySourceError>;
}

/// One asset tracked by [`StaticRoyaltySource`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticAsset {
    /// Accrued and not yet pulled
    pub pending: u128,
    /// Added on top of `pending` at every pull
    pub accrual_per_pull: u128,
    pub estimated_cost: u64,
    pub estimate_error: Option<String>,
    pub pull_error: Option<String>,
}

/// In-memory royalty source
///
/// Yields configured amounts and can be told to fail for specific assets.
#[derive(Debug, Default)]
pub struct StaticRoyaltySource {
    assets: Mutex<HashMap<AssetId, StaticAsset>>,
    listing_order: Mutex<Vec<AssetId>>,
    unavailable: Mutex<Option<String>>,
}

impl StaticRoyaltySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, asset_id: AssetId, asset: StaticAsset) {
        let mut assets = self.assets.lock().await;
        if assets.insert(asset_id, asset).is_none() {
            self.listing_order.lock().await.push(asset_id);
        }
    }

    /// Add to an asset's pending royalties.
    pub async fn accrue(&self, asset_id: &AssetId, amount: u128) -> Result<u128, RoyaltySourceError> {
        let mut assets = self.assets.lock().await;
        let asset = assets
            .get_mut(asset_id)
            .ok_or_else(|| RoyaltySourceError::UnknownAsset(short_id(asset_id)))?;
        asset.pending = asset.pending.saturating_add(amount);
        Ok(asset.pending)
    }

    pub async fn fail_estimation(&self, asset_id: &AssetId, reason: impl Into<String>) {
        if let Some(asset) = self.assets.lock().await.get_mut(asset_id) {
            asset.estimate_error = Some(reason.into());
        }
    }

    pub async fn fail_pull(&self, asset_id: &AssetId, reason: impl Into<String>) {
        if let Some(asset) = self.assets.lock().await.get_mut(asset_id) {
            asset.pull_error = Some(reason.into());
        }
    }

    /// Make every listing call fail until cleared with `None`.
    pub async fn set_unavailable(&self, reason: Option<String>) {
        *self.unavailable.lock().await = reason;
    }

    pub async fn pending(&self, asset_id: &AssetId) -> Option<u128> {
        self.assets.lock().await.get(asset_id).map(|a| a.pending)
    }
}

#[async_trait]
impl RoyaltySource for StaticRoyaltySource {
    async fn list_harvestable_assets(&self) -> Result<Vec<AssetId>, RoyaltySourceError> {
        if let Some(reason) = self.unavailable.lock().await.clone() {
            return Err(RoyaltySourceError::Unavailable(reason));
        }
        Ok(self.listing_order.lock().await.clone())
    }

    async fn estimate_cost(&self, asset_id: &AssetId, _policy: &str) -> Result<u64, RoyaltySourceError> {
        let assets = self.assets.lock().await;
        let asset = assets
            .get(asset_id)
            .ok_or_else(|| RoyaltySourceError::UnknownAsset(short_id(asset_id)))?;
        match &asset.estimate_error {
            Some(reason) => Err(RoyaltySourceError::Estimation(reason.clone())),
            None => Ok(asset.estimated_cost),
        }
    }

    async fn pull_and_convert(
        &self,
        asset_id: &AssetId,
        _policy: &HarvestPolicy,
    ) -> Result<u128, RoyaltySourceError> {
        let mut assets = self.assets.lock().await;
        let asset = assets
            .get_mut(asset_id)
            .ok_or_else(|| RoyaltySourceError::UnknownAsset(short_id(asset_id)))?;
        if let Some(reason) = &asset.pull_error {
            return Err(RoyaltySourceError::Pull(reason.clone()));
        }
        let pulled = asset.pending.saturating_add(asset.accrual_per_pull);
        asset.pending = 0;
        Ok(pulled)
    }

    async fn restore(&self, asset_id: &AssetId, amount: u128) -> Result<(), RoyaltySourceError> {
        self.accrue(asset_id, amount).await.map(|_| ())
    }
}
