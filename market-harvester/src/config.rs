//! Harvester configuration loader and defaults.
//!
//! ```toml
//! cadence_secs = 300
//! cost_ceiling_per_cycle = 2000000
//! harvester_address = "06060606..."
//! default_policy = "LAP"
//!
//! [engine]
//! admin_address = "01010101..."
//! treasury_address = "02020202..."
//!
//! [[assets]]
//! asset_id = "a1a1a1a1..."
//! policy = "LRP"
//! child_refs = ["child-1"]
//! accrual_per_pull = "50000000000000000"
//!
//! [assets.launch]
//! creator = "03030303..."
//! lock_amount = 1000
//! base_price = "1000000000000000"
//! price_increment = "1000000000000000"
//! wrap_per_unit = 1000
//! graduation_threshold = "1000000000000000000000"
//! seed_buy = 10
//! ```
//!
//! Base-currency amounts may exceed TOML's 64-bit integers, so they are
//! accepted either as integers or as decimal strings.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use lib_market::{
    Address, AssetId, CurveParams, EngineConfig, FeeSchedule, GraduationConfig,
    DEFAULT_TIMELOCK_DELAY_SECS,
};

/// Default config filename
pub const DEFAULT_CONFIG_FILENAME: &str = "harvester.toml";

/// Default harvest cadence: every 5 minutes
pub const DEFAULT_CADENCE_SECS: u64 = 300;

/// Policy used for assets with no explicit policy entry
pub const DEFAULT_POLICY: &str = "LAP";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid {field}: '{value}' is not a 32-byte hex id")]
    InvalidId { field: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level harvester configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvesterConfig {
    /// Seconds between harvest cycles
    pub cadence_secs: u64,
    /// Total estimated cost allowed per cycle; `None` means unbounded
    pub cost_ceiling_per_cycle: Option<u64>,
    /// Account the harvester injects as (needs the Harvest capability)
    pub harvester_address: String,
    /// Persist engine events to a sled database at this path
    pub event_db_path: Option<PathBuf>,
    /// Royalty policy for assets without their own
    pub default_policy: String,
    pub engine: EngineSection,
    pub assets: Vec<AssetEntry>,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            cadence_secs: DEFAULT_CADENCE_SECS,
            cost_ceiling_per_cycle: None,
            harvester_address: hex::encode([0u8; 32]),
            event_db_path: None,
            default_policy: DEFAULT_POLICY.to_string(),
            engine: EngineSection::default(),
            assets: Vec::new(),
        }
    }
}

/// Engine bootstrap for the standalone harvester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub admin_address: String,
    pub treasury_address: String,
    pub trading_fee_bps: u16,
    pub creator_share_bps: u16,
    pub timelock_delay_secs: u64,
    /// Receives seed LP shares at graduation; zero address when unset
    pub liquidity_recipient: Option<String>,
}

impl Default for EngineSection {
    fn default() -> Self {
        let fees = FeeSchedule::default();
        Self {
            admin_address: hex::encode([0u8; 32]),
            treasury_address: hex::encode([0u8; 32]),
            trading_fee_bps: fees.trading_fee_bps,
            creator_share_bps: fees.creator_share_bps,
            timelock_delay_secs: DEFAULT_TIMELOCK_DELAY_SECS,
            liquidity_recipient: None,
        }
    }
}

/// Per-asset royalty policy references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub asset_id: String,
    #[serde(default)]
    pub policy: Option<String>,
    #[serde(default)]
    pub ancestor_ref: Option<String>,
    #[serde(default)]
    pub child_refs: Vec<String>,
    #[serde(default)]
    pub policy_refs: Vec<String>,
    #[serde(default)]
    pub currency_refs: Vec<String>,
    /// Estimated cost reported by the in-memory royalty source
    #[serde(default)]
    pub estimated_cost: u64,
    /// Revenue the in-memory royalty source yields per pull
    #[serde(default, deserialize_with = "amount")]
    pub accrual_per_pull: u128,
    /// Launch this market at startup
    #[serde(default)]
    pub launch: Option<LaunchEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchEntry {
    pub creator: String,
    pub lock_amount: u64,
    #[serde(deserialize_with = "amount")]
    pub base_price: u128,
    #[serde(deserialize_with = "amount")]
    pub price_increment: u128,
    pub wrap_per_unit: u64,
    #[serde(deserialize_with = "amount")]
    pub graduation_threshold: u128,
    /// Units the creator buys at launch so revenue can be injected
    #[serde(default)]
    pub seed_buy: u64,
}

impl LaunchEntry {
    pub fn curve_params(&self) -> CurveParams {
        CurveParams {
            base_price: self.base_price,
            price_increment: self.price_increment,
            wrap_per_unit: self.wrap_per_unit as u128,
            graduation_threshold: self.graduation_threshold,
        }
    }
}

fn amount<'de, D>(deserializer: D) -> Result<u128, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(value) => Ok(value as u128),
        Raw::Str(value) => value
            .replace('_', "")
            .parse::<u128>()
            .map_err(|e| serde::de::Error::custom(format!("invalid amount '{}': {}", value, e))),
    }
}

/// Parse a 32-byte hex identifier from config.
pub fn parse_id(field: &str, value: &str) -> ConfigResult<[u8; 32]> {
    let invalid = || ConfigError::InvalidId {
        field: field.to_string(),
        value: value.to_string(),
    };
    let bytes = hex::decode(value.trim_start_matches("0x")).map_err(|_| invalid())?;
    bytes.try_into().map_err(|_| invalid())
}

impl HarvesterConfig {
    pub fn harvester(&self) -> ConfigResult<Address> {
        parse_id("harvester_address", &self.harvester_address)
    }

    pub fn engine_config(&self) -> ConfigResult<EngineConfig> {
        let liquidity_recipient = match &self.engine.liquidity_recipient {
            Some(value) => parse_id("engine.liquidity_recipient", value)?,
            None => lib_market::ZERO_ADDRESS,
        };
        Ok(EngineConfig {
            admin: parse_id("engine.admin_address", &self.engine.admin_address)?,
            treasury: parse_id("engine.treasury_address", &self.engine.treasury_address)?,
            fees: FeeSchedule {
                trading_fee_bps: self.engine.trading_fee_bps,
                creator_share_bps: self.engine.creator_share_bps,
            },
            timelock_delay_secs: self.engine.timelock_delay_secs,
            graduation: GraduationConfig {
                liquidity_recipient,
            },
        })
    }

    pub fn asset_ids(&self) -> ConfigResult<Vec<AssetId>> {
        self.assets
            .iter()
            .map(|entry| parse_id("assets.asset_id", &entry.asset_id))
            .collect()
    }

    /// Check everything that can be checked without an engine.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.cadence_secs == 0 {
            return Err(ConfigError::Invalid(
                "cadence_secs must be greater than zero".to_string(),
            ));
        }
        if self.default_policy.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_policy must not be empty".to_string(),
            ));
        }
        self.harvester()?;
        self.engine_config()?;

        let mut seen = HashSet::new();
        for entry in &self.assets {
            let asset_id = parse_id("assets.asset_id", &entry.asset_id)?;
            if !seen.insert(asset_id) {
                return Err(ConfigError::Invalid(format!(
                    "asset {} is listed twice",
                    entry.asset_id
                )));
            }
            if let Some(launch) = &entry.launch {
                parse_id("assets.launch.creator", &launch.creator)?;
                launch
                    .curve_params()
                    .validate()
                    .map_err(|e| ConfigError::Invalid(format!("asset {}: {}", entry.asset_id, e)))?;
            }
        }
        Ok(())
    }
}

/// Load and validate config from `path`.
///
/// A missing file is an error only when the path was given explicitly;
/// otherwise defaults are returned.
pub fn load_config(path: Option<&Path>) -> ConfigResult<HarvesterConfig> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));

    if !config_path.exists() {
        if path.is_some() {
            return Err(ConfigError::Invalid(format!(
                "Configuration file not found: {}",
                config_path.display()
            )));
        }
        return Ok(HarvesterConfig::default());
    }

    let contents = fs::read_to_string(&config_path)?;
    let config: HarvesterConfig = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}
