// src/types.rs

//! # Core Type Definitions
//!
//! Single source of truth for the data structures shared across the engine.
//! Centralizing these types keeps the subsystems decoupled and makes the
//! catalog snapshot format explicit in one place.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Sentinel for `amount_in` on legs after the first: the on-chain executor
/// substitutes its running balance of `token_in` at execution time.
pub const USE_BALANCE: U256 = U256::MAX;

/// Current catalog snapshot schema version. Bumped whenever the persisted
/// layout changes; mismatched snapshots trigger a full rescan.
pub const SNAPSHOT_VERSION: u32 = 3;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Converts a raw token amount into whole units as `f64`. Used only for USD
/// estimates, never for wei-level deltas.
pub fn normalize_units(raw: U256, decimals: u8) -> f64 {
    let raw_f = if raw <= U256::from(u128::MAX) {
        raw.as_u128() as f64
    } else {
        raw.to_string().parse::<f64>().unwrap_or(f64::INFINITY)
    };
    let scaled = raw_f / 10f64.powi(decimals as i32);
    if scaled.is_finite() {
        scaled
    } else {
        0.0
    }
}

/// Serde helpers persisting `U256` as base-10 strings, so snapshots stay
/// readable and survive JSON number precision limits.
pub mod serde_u256_dec {
    use ethers::types::U256;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_dec_str(&s).map_err(serde::de::Error::custom)
    }
}

//================================================================================================//
//                                        TOKENS                                                  //
//================================================================================================//

/// Price class a seeded token belongs to. Prices for an entire class derive
/// from the ETH/BTC USD inputs fed to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetClass {
    /// WETH and ETH-pegged liquid staking tokens.
    Eth,
    /// Wrapped BTC variants.
    Btc,
    /// USD stablecoins, fixed 1.0.
    Usd,
    /// EUR stablecoins, fixed 1.08 against USD.
    EurPegged,
    /// No price information; values at zero.
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub price_usd: f64,
    pub class: AssetClass,
}

//================================================================================================//
//                                         POOLS                                                  //
//================================================================================================//

/// Pool families the engine knows how to quote and read liquidity from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VenueKind {
    V2Amm,
    V3Cl,
    StableCl,
    Weighted,
    Aggregator,
}

impl VenueKind {
    /// Default per-swap gas estimate for the venue family.
    pub fn default_gas(&self) -> u64 {
        match self {
            VenueKind::V2Amm => 120_000,
            VenueKind::V3Cl => 150_000,
            VenueKind::StableCl => 160_000,
            VenueKind::Weighted => 250_000,
            VenueKind::Aggregator => 200_000,
        }
    }
}

/// A pool found by the discovery crawler. Owned exclusively by the catalog;
/// everything else reads snapshots. Never deleted, only deactivated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredPool {
    pub venue_id: String,
    pub venue_kind: VenueKind,
    pub pool_address: Address,
    pub token0: Address,
    pub token1: Address,
    pub token0_decimals: u8,
    pub token1_decimals: u8,
    /// Fee in basis points for reserve venues, tick spacing for CL venues.
    pub fee_or_tick_spacing: u32,
    #[serde(with = "serde_u256_dec")]
    pub liquidity: U256,
    #[serde(with = "serde_u256_dec")]
    pub reserve0: U256,
    #[serde(with = "serde_u256_dec")]
    pub reserve1: U256,
    pub liquidity_usd: f64,
    pub last_updated_millis: u64,
    pub is_active: bool,
}

impl DiscoveredPool {
    /// Fresh pool straight from a factory event: inactive, no liquidity yet.
    pub fn new(
        venue_id: String,
        venue_kind: VenueKind,
        pool_address: Address,
        token0: Address,
        token1: Address,
        token0_decimals: u8,
        token1_decimals: u8,
        fee_or_tick_spacing: u32,
    ) -> Self {
        // token0 < token1 is the factories' ordering; enforce it anyway so the
        // pair key is stable regardless of decoder quirks.
        let (token0, token1, token0_decimals, token1_decimals) = if token0 <= token1 {
            (token0, token1, token0_decimals, token1_decimals)
        } else {
            (token1, token0, token1_decimals, token0_decimals)
        };
        Self {
            venue_id,
            venue_kind,
            pool_address,
            token0,
            token1,
            token0_decimals,
            token1_decimals,
            fee_or_tick_spacing,
            liquidity: U256::zero(),
            reserve0: U256::zero(),
            reserve1: U256::zero(),
            liquidity_usd: 0.0,
            last_updated_millis: 0,
            is_active: false,
        }
    }

    pub fn pair_key(&self) -> (Address, Address) {
        (self.token0, self.token1)
    }

    pub fn other_token(&self, token: Address) -> Option<Address> {
        if token == self.token0 {
            Some(self.token1)
        } else if token == self.token1 {
            Some(self.token0)
        } else {
            None
        }
    }
}

/// All pools for one unordered token pair. Rebuilt in full after every
/// liquidity refresh or discovery pass.
#[derive(Debug, Clone)]
pub struct TradePair {
    pub token_a: Address,
    pub token_b: Address,
    pub pools: Vec<DiscoveredPool>,
    pub best_liquidity_usd: f64,
}

/// Minimal pair projection for the persisted snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedPair {
    pub token_a: Address,
    pub token_b: Address,
    pub pool_count: usize,
    pub best_liquidity_usd: f64,
}

/// The on-disk catalog snapshot (`./data/pools.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub version: u32,
    pub timestamp_millis: u64,
    pub last_scan_block: u64,
    pub pools: Vec<DiscoveredPool>,
    pub trade_pairs: Vec<PersistedPair>,
}

//================================================================================================//
//                                        QUOTES                                                  //
//================================================================================================//

#[derive(Debug, Clone)]
pub struct QuoteResult {
    pub venue_id: String,
    pub venue_name: String,
    pub amount_out: U256,
    pub fee_or_tick_spacing: u32,
    pub gas_estimate: u64,
    /// Venue-specific execution payload (aggregator calldata, pool address).
    pub extra_data: Bytes,
}

//================================================================================================//
//                                     OPPORTUNITIES                                              //
//================================================================================================//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    Direct,
    Triangular,
    Lst,
    Stable,
    Aggregator,
    Dynamic,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StrategyKind::Direct => "direct",
            StrategyKind::Triangular => "triangular",
            StrategyKind::Lst => "lst",
            StrategyKind::Stable => "stable",
            StrategyKind::Aggregator => "aggregator",
            StrategyKind::Dynamic => "dynamic",
        };
        f.write_str(s)
    }
}

/// One hop of an opportunity. `amount_in == USE_BALANCE` on legs after the
/// first; the executor contract resolves it from its running balance.
#[derive(Debug, Clone)]
pub struct SwapLeg {
    pub venue_id: String,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub expected_amount_out: U256,
    pub amount_out_min: U256,
    pub fee_or_tick_spacing: u32,
    pub venue_extra_data: Bytes,
}

/// A fully costed closed-loop trade candidate. Owned by the cycle that found
/// it; consumed by the execution pipeline.
#[derive(Debug, Clone)]
pub struct ArbOpportunity {
    pub strategy: StrategyKind,
    pub borrow_asset: Address,
    pub borrow_amount: U256,
    pub legs: SmallVec<[SwapLeg; 3]>,
    pub expected_profit: U256,
    pub profit_bps: u32,
    pub profit_usd: f64,
    pub gas_estimate: u64,
    pub gas_cost_usd: f64,
    pub net_profit_usd: f64,
    /// Thinnest pool crossed, for the risk controller's liquidity floor.
    pub pool_floor_usd: f64,
    pub created_millis: u64,
}

impl ArbOpportunity {
    pub fn age_millis(&self) -> u64 {
        now_millis().saturating_sub(self.created_millis)
    }

    /// Short asset-pair label for trade-record log lines.
    pub fn pair_label(&self) -> String {
        match (self.legs.first(), self.legs.last()) {
            (Some(first), Some(_)) => {
                format!("{:#x}/{:#x}", first.token_in, first.token_out)
            }
            _ => "-".to_string(),
        }
    }
}

//================================================================================================//
//                                     TRADE HISTORY                                              //
//================================================================================================//

/// Outcome of one settled trade, kept in the risk controller's bounded ring.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradeRecord {
    pub finished_millis: u64,
    /// Net profit in wei of the borrow asset; negative on losses.
    pub net_profit: i128,
    /// Gas spent in wei.
    pub gas_cost: u128,
}

impl TradeRecord {
    pub fn is_loss(&self) -> bool {
        self.net_profit < 0
    }
}

//================================================================================================//
//                                     MEMPOOL EVENTS                                             //
//================================================================================================//

/// A pending swap decoded from the public mempool.
#[derive(Debug, Clone)]
pub struct PendingSwap {
    pub tx_hash: H256,
    pub sender: Address,
    pub router: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub amount_out_min: U256,
    pub value_usd: f64,
    pub seen_millis: u64,
}

/// A pool-level Swap/Sync event from a live subscription.
#[derive(Debug, Clone)]
pub struct PoolUpdate {
    pub pool_address: Address,
    pub block_number: u64,
    pub tx_hash: H256,
}

/// Bidding advice derived from mempool heuristics; strictly advisory.
#[derive(Debug, Clone, Copy)]
pub struct MevAdvice {
    pub use_private_relay: bool,
    pub raise_slippage: bool,
    pub recommended_slippage_bps: u32,
    pub use_flashbots: bool,
}

impl Default for MevAdvice {
    fn default() -> Self {
        Self {
            use_private_relay: true,
            raise_slippage: false,
            recommended_slippage_bps: 30,
            use_flashbots: false,
        }
    }
}

//================================================================================================//
//                                      ENGINE STATS                                              //
//================================================================================================//

/// Process-wide counters. Reset only at process start.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub cycles: AtomicU64,
    pub opportunities_found: AtomicU64,
    pub trades_executed: AtomicU64,
    pub trades_succeeded: AtomicU64,
    /// Cumulative net profit in USD cents, signed via two counters.
    pub profit_usd_cents: AtomicU64,
    pub loss_usd_cents: AtomicU64,
    pub total_cycle_millis: AtomicU64,
}

impl EngineStats {
    pub fn record_cycle(&self, elapsed_millis: u64) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.total_cycle_millis
            .fetch_add(elapsed_millis, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, net_usd: f64, succeeded: bool) {
        self.trades_executed.fetch_add(1, Ordering::Relaxed);
        if succeeded {
            self.trades_succeeded.fetch_add(1, Ordering::Relaxed);
        }
        let cents = (net_usd.abs() * 100.0) as u64;
        if net_usd >= 0.0 {
            self.profit_usd_cents.fetch_add(cents, Ordering::Relaxed);
        } else {
            self.loss_usd_cents.fetch_add(cents, Ordering::Relaxed);
        }
    }

    pub fn cumulative_profit_usd(&self) -> f64 {
        let gains = self.profit_usd_cents.load(Ordering::Relaxed) as f64;
        let losses = self.loss_usd_cents.load(Ordering::Relaxed) as f64;
        (gains - losses) / 100.0
    }

    pub fn avg_cycle_millis(&self) -> f64 {
        let cycles = self.cycles.load(Ordering::Relaxed);
        if cycles == 0 {
            return 0.0;
        }
        self.total_cycle_millis.load(Ordering::Relaxed) as f64 / cycles as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_units_handles_common_decimals() {
        assert_eq!(normalize_units(U256::exp10(18), 18), 1.0);
        assert_eq!(normalize_units(U256::from(2_500_000u64), 6), 2.5);
        assert_eq!(normalize_units(U256::zero(), 18), 0.0);
    }

    #[test]
    fn pool_constructor_orders_tokens() {
        let lo = Address::from_low_u64_be(1);
        let hi = Address::from_low_u64_be(2);
        let pool = DiscoveredPool::new(
            "uniswap_v3".into(),
            VenueKind::V3Cl,
            Address::from_low_u64_be(99),
            hi,
            lo,
            6,
            18,
            500,
        );
        assert_eq!(pool.token0, lo);
        assert_eq!(pool.token1, hi);
        assert_eq!(pool.token0_decimals, 18);
        assert_eq!(pool.token1_decimals, 6);
    }

    #[test]
    fn u256_roundtrips_as_decimal_string() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            #[serde(with = "serde_u256_dec")]
            value: U256,
        }
        let w = Wrapper {
            value: U256::from_dec_str("340282366920938463463374607431768211456").unwrap(),
        };
        let json = serde_json::to_string(&w).unwrap();
        assert!(json.contains("\"340282366920938463463374607431768211456\""));
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value, w.value);
    }

    #[test]
    fn engine_stats_profit_is_signed() {
        let stats = EngineStats::default();
        stats.record_outcome(10.0, true);
        stats.record_outcome(-2.5, false);
        assert!((stats.cumulative_profit_usd() - 7.5).abs() < 1e-9);
    }
}
