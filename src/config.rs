// src/config.rs

//! # Environment Configuration
//!
//! The process takes no CLI arguments; every knob comes from environment
//! variables with documented defaults. `Config` is loaded once at startup and
//! handed out as cheap per-component views so each subsystem sees only the
//! fields it needs.

use std::str::FromStr;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;

use crate::errors::ConfigError;

/// Base mainnet.
pub const CHAIN_ID: u64 = 8453;

/// Block-range width for factory log scans.
pub const SCAN_CHUNK_BLOCKS: u64 = 10_000;

/// Maximum snapshot age before a full rescan is forced.
pub const SNAPSHOT_MAX_AGE_DAYS: u64 = 7;

/// Bundle endpoint used when `PRIVATE_RELAY_URL` is not set.
pub const DEFAULT_RELAY_URL: &str = "https://mainnet-relay.base.org";

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url_http: String,
    pub rpc_url_push: Option<String>,
    pub rpc_url_backup: Option<String>,
    pub signer_key: String,
    pub contract_address: Address,
    pub aggregator_api_key: Option<String>,
    pub min_profit_usd: f64,
    pub max_gas_price_gwei: f64,
    pub poll_interval_ms: u64,
    pub slippage_bps: u32,
    pub min_liquidity_usd: f64,
    pub flash_premium_bps: u32,
    pub enable_private_relay: bool,
    pub enable_circuit_breaker: bool,
    pub max_trades_per_hour: u32,
    pub max_drawdown_eth: f64,
    pub private_relay_url: Option<String>,
}

impl Config {
    /// Reads the full configuration from the environment. Any violation is a
    /// startup failure; the process exits non-zero rather than guessing.
    pub fn from_env() -> Result<Self, ConfigError> {
        let rpc_url_http = require("RPC_URL_HTTP")?;
        let signer_key = require("SIGNER_KEY")?;
        // Fail at startup, not at first submission.
        LocalWallet::from_str(signer_key.trim_start_matches("0x"))
            .map_err(|e| ConfigError::InvalidSigner(e.to_string()))?;

        let contract_address = parse_var::<Address>(
            "CONTRACT_ADDRESS",
            &require("CONTRACT_ADDRESS")?,
        )?;

        Ok(Self {
            rpc_url_http,
            rpc_url_push: optional("RPC_URL_PUSH"),
            rpc_url_backup: optional("RPC_URL_BACKUP"),
            signer_key,
            contract_address,
            aggregator_api_key: optional("AGGREGATOR_API_KEY"),
            min_profit_usd: parse_or("MIN_PROFIT_USD", 0.50)?,
            max_gas_price_gwei: parse_or("MAX_GAS_PRICE_GWEI", 0.5)?,
            poll_interval_ms: parse_or("POLL_INTERVAL_MS", 200)?,
            slippage_bps: parse_or("SLIPPAGE_BPS", 30)?,
            min_liquidity_usd: parse_or("MIN_LIQUIDITY_USD", 10_000.0)?,
            flash_premium_bps: parse_or("FLASH_PREMIUM_BPS", 5)?,
            enable_private_relay: parse_or("ENABLE_PRIVATE_RELAY", true)?,
            enable_circuit_breaker: parse_or("ENABLE_CIRCUIT_BREAKER", true)?,
            max_trades_per_hour: parse_or("MAX_TRADES_PER_HOUR", 100)?,
            max_drawdown_eth: parse_or("MAX_DRAWDOWN_ETH", 5.0)?,
            private_relay_url: optional("PRIVATE_RELAY_URL")
                .or_else(|| Some(DEFAULT_RELAY_URL.to_string())),
        })
    }

    /// The execution signer. Validity was checked at load time.
    pub fn signer(&self) -> Result<LocalWallet, ConfigError> {
        let wallet = LocalWallet::from_str(self.signer_key.trim_start_matches("0x"))
            .map_err(|e| ConfigError::InvalidSigner(e.to_string()))?;
        Ok(wallet.with_chain_id(CHAIN_ID))
    }

    pub fn discovery(&self) -> DiscoverySettings {
        DiscoverySettings {
            min_liquidity_usd: self.min_liquidity_usd,
            refresh_batch_size: 20,
            refresh_batch_delay_ms: 200,
            save_every_batches: 5,
        }
    }

    pub fn strategy(&self) -> StrategySettings {
        StrategySettings {
            min_profit_usd: self.min_profit_usd,
            slippage_bps: self.slippage_bps,
            flash_premium_bps: self.flash_premium_bps,
            top_k: 1,
        }
    }

    pub fn risk(&self) -> RiskSettings {
        RiskSettings {
            enable_circuit_breaker: self.enable_circuit_breaker,
            max_trades_per_hour: self.max_trades_per_hour,
            max_drawdown_eth: self.max_drawdown_eth,
            min_pool_liquidity_usd: self.min_liquidity_usd,
        }
    }

    pub fn execution(&self) -> ExecutionSettings {
        ExecutionSettings {
            contract_address: self.contract_address,
            max_gas_price_gwei: self.max_gas_price_gwei,
            enable_private_relay: self.enable_private_relay,
            max_opportunity_age_ms: 5_000,
            min_signer_balance_wei: ethers::utils::parse_ether(0.01)
                .unwrap_or_default(),
            confirmation_wait_ms: 2_000,
            shutdown_drain_ms: 30_000,
        }
    }

    pub fn quotes(&self) -> QuoteSettings {
        QuoteSettings {
            aggregator_api_key: self.aggregator_api_key.clone(),
            concurrency: 10,
            aggregator_timeout_ms: 10_000,
            aggregator_min_interval_ms: 350,
            v2_fee_bps: 30,
        }
    }

    pub fn mempool(&self) -> MempoolSettings {
        MempoolSettings {
            push_url: self.rpc_url_push.clone(),
            connect_timeout_ms: 15_000,
            backoff_initial_ms: 5_000,
            backoff_factor: 1.5,
            backoff_cap_ms: 60_000,
            max_attempts: 10,
            max_attempts_rate_limited: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub min_liquidity_usd: f64,
    pub refresh_batch_size: usize,
    pub refresh_batch_delay_ms: u64,
    pub save_every_batches: usize,
}

#[derive(Debug, Clone)]
pub struct StrategySettings {
    pub min_profit_usd: f64,
    pub slippage_bps: u32,
    pub flash_premium_bps: u32,
    pub top_k: usize,
}

#[derive(Debug, Clone)]
pub struct RiskSettings {
    pub enable_circuit_breaker: bool,
    pub max_trades_per_hour: u32,
    pub max_drawdown_eth: f64,
    pub min_pool_liquidity_usd: f64,
}

#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    pub contract_address: Address,
    pub max_gas_price_gwei: f64,
    pub enable_private_relay: bool,
    pub max_opportunity_age_ms: u64,
    pub min_signer_balance_wei: ethers::types::U256,
    pub confirmation_wait_ms: u64,
    pub shutdown_drain_ms: u64,
}

#[derive(Debug, Clone)]
pub struct QuoteSettings {
    pub aggregator_api_key: Option<String>,
    pub concurrency: usize,
    pub aggregator_timeout_ms: u64,
    pub aggregator_min_interval_ms: u64,
    pub v2_fee_bps: u32,
}

#[derive(Debug, Clone)]
pub struct MempoolSettings {
    pub push_url: Option<String>,
    pub connect_timeout_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_factor: f64,
    pub backoff_cap_ms: u64,
    pub max_attempts: u32,
    pub max_attempts_rate_limited: u32,
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(var)),
    }
}

fn optional(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidVar {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => parse_var(var, &raw),
        _ => Ok(default),
    }
}
