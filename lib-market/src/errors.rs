//! Market Errors
//!
//! Every trading-path error is returned before any state is written, so a
//! failed call leaves markets and pools exactly as they were.

use thiserror::Error;

use crate::fixed_point::MathError;
use crate::types::AssetId;

/// Error during launch, trading, pool or harvest operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    #[error("Market {} is not active", hex::encode(.0))]
    InactiveMarket(AssetId),

    #[error("Asset {} has already been launched", hex::encode(.0))]
    AlreadyLaunched(AssetId),

    #[error("Insufficient deposit: available={available}, requested={requested}")]
    InsufficientDeposit { available: u128, requested: u128 },

    #[error("Insufficient reserve: reserve={reserve}, required={required}")]
    InsufficientReserve { reserve: u128, required: u128 },

    #[error("Slippage exceeded: limit={limit}, actual={actual}")]
    SlippageExceeded { limit: u128, actual: u128 },

    #[error("Deadline expired: deadline={deadline}, now={now}")]
    DeadlineExpired { deadline: u64, now: u64 },

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Pool is paused")]
    Paused,

    #[error("Cost estimation failed: {0}")]
    EstimationFailed(String),

    #[error("Unknown market {}", hex::encode(.0))]
    UnknownMarket(AssetId),

    #[error("No pool for asset {}", hex::encode(.0))]
    UnknownPool(AssetId),

    #[error("Amount must be non-zero")]
    ZeroAmount,

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Insufficient balance: balance={balance}, requested={requested}")]
    InsufficientBalance { balance: u128, requested: u128 },

    #[error("Insufficient liquidity")]
    InsufficientLiquidity,

    #[error("Curve capacity exceeded: capacity={capacity}, requested_supply={requested_supply}")]
    CapacityExceeded { capacity: u128, requested_supply: u128 },

    #[error("Market has no circulating supply")]
    EmptySupply,

    #[error("Reentrant call rejected")]
    Reentrancy,

    #[error("Constant-product invariant violated")]
    KInvariantViolation,

    #[error("Timelocked action not ready: execute_after={execute_after}, now={now}")]
    TimelockNotReady { execute_after: u64, now: u64 },

    #[error("Unknown scheduled action {0}")]
    UnknownAction(String),

    #[error("Action {0} is already scheduled")]
    ActionAlreadyScheduled(String),

    #[error("Creator reserve for {} unlocks at graduation", hex::encode(.0))]
    CreatorReserveLocked(AssetId),

    #[error("Already claimed")]
    AlreadyClaimed,

    #[error("Event indexer error: {0}")]
    Indexer(String),
}

impl From<MathError> for MarketError {
    fn from(err: MathError) -> Self {
        match err {
            MathError::Overflow => MarketError::Overflow,
            MathError::DivisionByZero => {
                MarketError::InvalidParameters("division by zero".to_string())
            }
        }
    }
}

/// Result type for market operations
pub type MarketResult<T> = Result<T, MarketError>;
