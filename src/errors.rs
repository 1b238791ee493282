// src/errors.rs

//! # Centralized Error Handling
//!
//! One typed error enum per subsystem, rolled up into the top-level [`BotError`].
//! Keeping the hierarchy centralized prevents ambiguous string errors from
//! crossing component boundaries and makes the recovery policy for each
//! failure class explicit at the call site.

use ethers::types::{Address, H256};
use thiserror::Error;

/// The top-level error type for the engine process.
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
    #[error("Token registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("Quote error: {0}")]
    Quote(#[from] QuoteError),
    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),
    #[error("Risk error: {0}")]
    Risk(#[from] RiskError),
    #[error("Gas oracle error: {0}")]
    Gas(#[from] GasError),
    #[error("Mempool observer error: {0}")]
    Mempool(#[from] MempoolError),
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
    #[error("System shut down")]
    Shutdown,
}

/// Startup configuration failures. These are fatal-per-process: the engine
/// exits non-zero rather than running with a partial configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid value for {var}: {value} ({reason})")]
    InvalidVar {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("Invalid signer key: {0}")]
    InvalidSigner(String),
}

/// Transport-level JSON-RPC failures.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("All endpoints failed: primary: {primary}; backup: {backup}")]
    AllEndpointsFailed { primary: String, backup: String },
    #[error("Call reverted: {0}")]
    Revert(String),
    #[error("Rate limited (HTTP 429)")]
    RateLimited,
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Token metadata call failed for {token}: {reason}")]
    MetadataCall { token: Address, reason: String },
    #[error("Invalid token decimals {decimals} for {token}")]
    InvalidDecimals { token: Address, decimals: u32 },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Snapshot version mismatch: found {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("Snapshot too old: {age_days} days (max {max_days})")]
    Stale { age_days: u64, max_days: u64 },
    #[error("Snapshot failed structural validation: {0}")]
    Corrupt(String),
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
    #[error("Log decode failed: {0}")]
    Decode(String),
    #[error("Liquidity read failed for pool {pool}: {reason}")]
    LiquidityRead { pool: Address, reason: String },
}

#[derive(Error, Debug)]
pub enum QuoteError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
    #[error("No route on venue {0}")]
    NoRoute(String),
    #[error("Aggregator API error {status}: {body}")]
    Aggregator { status: u16, body: String },
    #[error("Aggregator rate limited")]
    RateLimited,
    #[error("Aggregator request timed out")]
    Timeout,
    #[error("Quote decode failed: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Quote engine failed: {0}")]
    Quote(#[from] QuoteError),
    #[error("Borrow asset {0} has no price")]
    UnpricedBorrowAsset(Address),
}

/// Rejection reasons surfaced by `RiskController::validate`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RiskError {
    #[error("circuit breaker")]
    CircuitBreaker,
    #[error("hourly trade limit reached ({0})")]
    HourlyLimit(u32),
    #[error("pool liquidity below floor")]
    ThinLiquidity,
    #[error("expected profit below 2x gas cost")]
    ProfitBelowGasFloor,
    #[error("drawdown cap reached")]
    DrawdownCap,
}

#[derive(Error, Debug)]
pub enum GasError {
    #[error("No base fee observations yet")]
    NoObservations,
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
}

#[derive(Error, Debug)]
pub enum MempoolError {
    #[error("Subscription connect failed: {0}")]
    Connect(String),
    #[error("Subscription closed: {0}")]
    Closed(String),
    #[error("Calldata decode failed: {0}")]
    Decode(String),
    #[error("Invalid push endpoint: {0}")]
    InvalidEndpoint(String),
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Preflight rejected: {0}")]
    Preflight(String),
    #[error("Simulation reverted: {0}")]
    SimulationRevert(String),
    #[error("Signing failed: {0}")]
    Signing(String),
    #[error("Relay submission failed: {0}")]
    Relay(String),
    #[error("Public submission failed: {0}")]
    Submission(String),
    #[error("Nonce conflict: {0}")]
    NonceConflict(String),
    #[error("No receipt for {0} within the confirmation window")]
    ConfirmationTimeout(H256),
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
    #[error("Trade log write failed: {0}")]
    TradeLog(String),
}
