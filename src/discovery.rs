// src/discovery.rs

//! # Pool Discovery
//!
//! Crawls factory creation events into the catalog and keeps pool liquidity
//! fresh. Each venue has its own event schema; the scanners share the same
//! chunked `eth_getLogs` loop and differ only in the decoder. Partial RPC
//! failure never aborts a scan: a bad chunk is logged at debug and skipped,
//! the next tick covers it again.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ethers::abi::{Abi, Token};
use ethers::types::{Address, Bytes, Filter, Log, H256, U256};
use futures_util::future::join_all;
use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use crate::blockchain::ChainRpc;
use crate::catalog::PoolCatalog;
use crate::config::{DiscoverySettings, SCAN_CHUNK_BLOCKS};
use crate::errors::DiscoveryError;
use crate::tokens::TokenRegistry;
use crate::types::{now_millis, DiscoveredPool, VenueKind};

//================================================================================================//
//                                       VENUE TABLE                                              //
//================================================================================================//

/// How a factory announces new pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryEventKind {
    /// `PoolCreated(token0, token1, fee, tickSpacing, pool)` — fee indexed.
    V3PoolCreated,
    /// `PairCreated(token0, token1, pair, index)` — fee fixed at 30 bp.
    V2PairCreated,
    /// `PoolCreated(token0, token1, stable, pool, index)` — 5 bp if stable.
    StableFlagPoolCreated,
    /// `PoolCreated(token0, token1, tickSpacing, pool)` — tick-spacing CL.
    TickSpacingPoolCreated,
}

#[derive(Debug, Clone)]
pub struct VenueConfig {
    pub venue_id: &'static str,
    pub venue_kind: VenueKind,
    pub event_kind: FactoryEventKind,
    pub factory: &'static str,
    pub quoter: Option<&'static str>,
    pub start_block: u64,
    pub tick_spacings: &'static [u32],
}

/// The Base venue set. Start blocks are each factory's deployment block.
pub static VENUES: &[VenueConfig] = &[
    VenueConfig {
        venue_id: "uniswap_v3",
        venue_kind: VenueKind::V3Cl,
        event_kind: FactoryEventKind::V3PoolCreated,
        factory: "0x33128a8fc17869897dce68ed026d694621f6fdfd",
        quoter: Some("0x3d4e44eb1374240ce5f1b871ab261cd16335b76a"),
        start_block: 1_371_680,
        tick_spacings: &[],
    },
    VenueConfig {
        venue_id: "uniswap_v2",
        venue_kind: VenueKind::V2Amm,
        event_kind: FactoryEventKind::V2PairCreated,
        factory: "0x8909dc15e40173ff4699343b6eb8132c65e18ec6",
        quoter: None,
        start_block: 6_601_915,
        tick_spacings: &[],
    },
    VenueConfig {
        venue_id: "sushiswap",
        venue_kind: VenueKind::V2Amm,
        event_kind: FactoryEventKind::V2PairCreated,
        factory: "0x71524b4f93c58fcbf659783284e38825f0622859",
        quoter: None,
        start_block: 2_631_214,
        tick_spacings: &[],
    },
    VenueConfig {
        venue_id: "baseswap",
        venue_kind: VenueKind::V2Amm,
        event_kind: FactoryEventKind::V2PairCreated,
        factory: "0xfda619b6d20975be80a10332cd39b9a4b0faa8bb",
        quoter: None,
        start_block: 2_059_124,
        tick_spacings: &[],
    },
    VenueConfig {
        venue_id: "aerodrome",
        venue_kind: VenueKind::V2Amm,
        event_kind: FactoryEventKind::StableFlagPoolCreated,
        factory: "0x420dd381b31aef6683db6b902084cb0ffece40da",
        quoter: None,
        start_block: 3_200_559,
        tick_spacings: &[],
    },
    VenueConfig {
        venue_id: "aerodrome_cl",
        venue_kind: VenueKind::StableCl,
        event_kind: FactoryEventKind::TickSpacingPoolCreated,
        factory: "0x5e7bb104d84c7cb9b682aac2f3d509f5f406809a",
        quoter: Some("0x254cf9e1e6e233aa1ac962cb9b05b2cfeaae15b0"),
        start_block: 13_843_704,
        tick_spacings: &[1, 50, 100, 200, 2_000],
    },
];

/// Quoter contract for a CL venue, if it has one.
pub fn quoter_for(venue_id: &str) -> Option<Address> {
    VENUES
        .iter()
        .find(|v| v.venue_id == venue_id)
        .and_then(|v| v.quoter)
        .and_then(|q| Address::from_str(q).ok())
}

/// Tick spacings probed when quoting a CL venue without a known spacing.
pub fn tick_spacings_for(venue_id: &str) -> Vec<u32> {
    VENUES
        .iter()
        .find(|v| v.venue_id == venue_id)
        .map(|v| v.tick_spacings.to_vec())
        .unwrap_or_default()
}

//================================================================================================//
//                                     EVENT DECODING                                             //
//================================================================================================//

static TOPIC_V3_POOL_CREATED: Lazy<H256> = Lazy::new(|| {
    // PoolCreated(address,address,uint24,int24,address)
    H256::from_str("0x783cca1c0412dd0d695e784568c96da2e9c22ff989357a2e8b1d9b2b4e6b7118")
        .expect("topic hash")
});
static TOPIC_V2_PAIR_CREATED: Lazy<H256> = Lazy::new(|| {
    // PairCreated(address,address,address,uint256)
    H256::from_str("0x0d3648bd0f6ba80134a33ba9275ac585d9d315f0ad8355cddefde31afa28d0e9")
        .expect("topic hash")
});
static TOPIC_STABLE_POOL_CREATED: Lazy<H256> = Lazy::new(|| {
    // PoolCreated(address,address,bool,address,uint256)
    H256::from_str("0x2128d88d14c80cb081c1252a5acff7a264671bf199ce226b53788fb26065005e")
        .expect("topic hash")
});
static TOPIC_TICKSPACING_POOL_CREATED: Lazy<H256> = Lazy::new(|| {
    // PoolCreated(address,address,int24,address)
    H256::from_str("0xab0d57f0df537bb25e80245ef7748fa62353808c54d6e528a9dd20887aed9ac2")
        .expect("topic hash")
});

fn topic_for(kind: FactoryEventKind) -> H256 {
    match kind {
        FactoryEventKind::V3PoolCreated => *TOPIC_V3_POOL_CREATED,
        FactoryEventKind::V2PairCreated => *TOPIC_V2_PAIR_CREATED,
        FactoryEventKind::StableFlagPoolCreated => *TOPIC_STABLE_POOL_CREATED,
        FactoryEventKind::TickSpacingPoolCreated => *TOPIC_TICKSPACING_POOL_CREATED,
    }
}

/// Raw creation event fields common to every factory schema.
#[derive(Debug, Clone, Copy)]
struct CreationEvent {
    token0: Address,
    token1: Address,
    pool: Address,
    fee_or_tick_spacing: u32,
}

fn decode_creation_log(kind: FactoryEventKind, log: &Log) -> Result<CreationEvent, DiscoveryError> {
    match kind {
        FactoryEventKind::V3PoolCreated => {
            if log.topics.len() != 4 || log.data.len() < 64 {
                return Err(DiscoveryError::Decode("malformed V3 PoolCreated".into()));
            }
            let fee = U256::from_big_endian(log.topics[3].as_bytes());
            Ok(CreationEvent {
                token0: Address::from(log.topics[1]),
                token1: Address::from(log.topics[2]),
                pool: Address::from_slice(&log.data[44..64]),
                fee_or_tick_spacing: fee.low_u32(),
            })
        }
        FactoryEventKind::V2PairCreated => {
            if log.topics.len() != 3 || log.data.len() < 32 {
                return Err(DiscoveryError::Decode("malformed PairCreated".into()));
            }
            Ok(CreationEvent {
                token0: Address::from(log.topics[1]),
                token1: Address::from(log.topics[2]),
                pool: Address::from_slice(&log.data[12..32]),
                fee_or_tick_spacing: 30,
            })
        }
        FactoryEventKind::StableFlagPoolCreated => {
            if log.topics.len() != 4 || log.data.len() < 32 {
                return Err(DiscoveryError::Decode("malformed stable PoolCreated".into()));
            }
            let stable = !U256::from_big_endian(log.topics[3].as_bytes()).is_zero();
            Ok(CreationEvent {
                token0: Address::from(log.topics[1]),
                token1: Address::from(log.topics[2]),
                pool: Address::from_slice(&log.data[12..32]),
                fee_or_tick_spacing: if stable { 5 } else { 30 },
            })
        }
        FactoryEventKind::TickSpacingPoolCreated => {
            if log.topics.len() != 4 || log.data.len() < 32 {
                return Err(DiscoveryError::Decode(
                    "malformed tick-spacing PoolCreated".into(),
                ));
            }
            let spacing = U256::from_big_endian(log.topics[3].as_bytes());
            Ok(CreationEvent {
                token0: Address::from(log.topics[1]),
                token1: Address::from(log.topics[2]),
                pool: Address::from_slice(&log.data[12..32]),
                fee_or_tick_spacing: spacing.low_u32(),
            })
        }
    }
}

//================================================================================================//
//                                    LIQUIDITY READ ABIS                                         //
//================================================================================================//

static CL_POOL_ABI: Lazy<Abi> = Lazy::new(|| {
    serde_json::from_str(
        r#"[
            {"inputs":[],"name":"slot0","outputs":[{"internalType":"uint160","name":"sqrtPriceX96","type":"uint160"},{"internalType":"int24","name":"tick","type":"int24"}],"stateMutability":"view","type":"function"},
            {"inputs":[],"name":"liquidity","outputs":[{"internalType":"uint128","name":"","type":"uint128"}],"stateMutability":"view","type":"function"}
        ]"#,
    )
    .expect("CL pool ABI must be valid")
});

//================================================================================================//
//                                     DISCOVERY ENGINE                                           //
//================================================================================================//

pub struct PoolDiscovery {
    rpc: Arc<dyn ChainRpc>,
    registry: Arc<TokenRegistry>,
    catalog: Arc<PoolCatalog>,
    settings: DiscoverySettings,
}

impl PoolDiscovery {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        registry: Arc<TokenRegistry>,
        catalog: Arc<PoolCatalog>,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            rpc,
            registry,
            catalog,
            settings,
        }
    }

    /// Scans every factory from its deployment block to the chain head.
    /// Saves the catalog as each venue completes.
    pub async fn full_scan(&self) -> Result<(), DiscoveryError> {
        let head = self.rpc.block_number().await?;
        for venue in VENUES {
            let added = self.scan_venue(venue, venue.start_block, head).await;
            info!(
                target: "pool_discovery",
                venue = venue.venue_id,
                added,
                head,
                "Factory scan complete"
            );
            if let Err(e) = self.catalog.save().await {
                warn!(target: "pool_discovery", error = %e, "Catalog save failed, continuing in memory");
            }
        }
        self.catalog.set_last_scan_block(head);
        Ok(())
    }

    /// Appends pools created since the last scan. Returns whether anything
    /// changed (the caller rebuilds the trade graph on `true`). An empty
    /// block range is a no-op on the catalog.
    pub async fn incremental_scan(&self) -> Result<bool, DiscoveryError> {
        let head = self.rpc.block_number().await?;
        let from = self.catalog.last_scan_block().saturating_add(1);
        if from > head {
            return Ok(false);
        }
        let mut added_total = 0usize;
        for venue in VENUES {
            let from = from.max(venue.start_block);
            if from > head {
                continue;
            }
            added_total += self.scan_venue(venue, from, head).await;
        }
        self.catalog.set_last_scan_block(head);
        if added_total > 0 {
            info!(target: "pool_discovery", added = added_total, head, "Incremental scan found new pools");
        }
        Ok(added_total > 0)
    }

    /// One venue, one block range, chunked. Returns how many pools were
    /// newly inserted. RPC failures cost only their chunk.
    async fn scan_venue(&self, venue: &VenueConfig, from: u64, to: u64) -> usize {
        let Ok(factory) = Address::from_str(venue.factory) else {
            warn!(target: "pool_discovery", venue = venue.venue_id, "Bad factory address in venue table");
            return 0;
        };
        let topic = topic_for(venue.event_kind);
        let mut added = 0usize;
        let mut chunk_start = from;

        while chunk_start <= to {
            let chunk_end = chunk_start
                .saturating_add(SCAN_CHUNK_BLOCKS - 1)
                .min(to);
            let filter = Filter::new()
                .address(factory)
                .topic0(topic)
                .from_block(chunk_start)
                .to_block(chunk_end);

            match self.rpc.get_logs(&filter).await {
                Ok(logs) => {
                    for log in &logs {
                        match self.ingest_log(venue, log).await {
                            Ok(true) => added += 1,
                            Ok(false) => {}
                            Err(e) => {
                                debug!(
                                    target: "pool_discovery",
                                    venue = venue.venue_id,
                                    error = %e,
                                    "Skipping undecodable creation log"
                                );
                            }
                        }
                    }
                }
                Err(e) => {
                    debug!(
                        target: "pool_discovery",
                        venue = venue.venue_id,
                        chunk_start,
                        chunk_end,
                        error = %e,
                        "Chunk scan failed, skipping"
                    );
                }
            }
            chunk_start = chunk_end.saturating_add(1);
        }
        added
    }

    /// Decodes one creation event and inserts the pool. Pools with an
    /// unresolvable token are silently dropped.
    async fn ingest_log(&self, venue: &VenueConfig, log: &Log) -> Result<bool, DiscoveryError> {
        let event = decode_creation_log(venue.event_kind, log)?;
        if event.token0 == event.token1 || event.pool == Address::zero() {
            return Err(DiscoveryError::Decode("degenerate creation event".into()));
        }
        let Some(info0) = self.registry.resolve(event.token0).await else {
            return Ok(false);
        };
        let Some(info1) = self.registry.resolve(event.token1).await else {
            return Ok(false);
        };

        let pool = DiscoveredPool::new(
            venue.venue_id.to_string(),
            venue.venue_kind,
            event.pool,
            event.token0,
            event.token1,
            info0.decimals,
            info1.decimals,
            event.fee_or_tick_spacing,
        );
        Ok(self.catalog.insert(pool))
    }

    //============================================================================================//
    //                                   LIQUIDITY REFRESH                                        //
    //============================================================================================//

    /// Refreshes liquidity for every relevant pool (at least one seeded
    /// token), in bounded batches with an inter-batch cooldown, then applies
    /// the activation invariant. Idempotent against a stable chain head.
    pub async fn refresh_liquidity(&self) -> usize {
        let relevant: Vec<DiscoveredPool> = self
            .catalog
            .iter_all()
            .into_iter()
            .filter(|p| self.registry.is_known(p.token0) || self.registry.is_known(p.token1))
            .collect();

        let mut refreshed = 0usize;
        for (batch_index, batch) in relevant.chunks(self.settings.refresh_batch_size).enumerate() {
            let reads = batch.iter().map(|pool| self.read_pool_liquidity(pool));
            for (pool, result) in batch.iter().zip(join_all(reads).await) {
                match result {
                    Ok(update) => {
                        self.apply_liquidity(pool.pool_address, update);
                        refreshed += 1;
                    }
                    Err(e) => {
                        // Deactivate for this cycle; the next refresh retries.
                        debug!(
                            target: "pool_discovery",
                            pool = %pool.pool_address,
                            error = %e,
                            "Liquidity read failed"
                        );
                        self.catalog.update(pool.pool_address, |p| p.is_active = false);
                    }
                }
            }

            if (batch_index + 1) % self.settings.save_every_batches == 0 {
                if let Err(e) = self.catalog.save().await {
                    warn!(target: "pool_discovery", error = %e, "Periodic catalog save failed");
                }
            }
            tokio::time::sleep(Duration::from_millis(self.settings.refresh_batch_delay_ms)).await;
        }

        if let Err(e) = self.catalog.save().await {
            warn!(target: "pool_discovery", error = %e, "Post-refresh catalog save failed");
        }
        refreshed
    }

    async fn read_pool_liquidity(
        &self,
        pool: &DiscoveredPool,
    ) -> Result<LiquidityUpdate, DiscoveryError> {
        match pool.venue_kind {
            VenueKind::V2Amm | VenueKind::Weighted => {
                let (reserve0, reserve1) =
                    crate::quotes::v2::read_reserves(self.rpc.as_ref(), pool.pool_address)
                        .await
                        .map_err(|e| DiscoveryError::LiquidityRead {
                            pool: pool.pool_address,
                            reason: e.to_string(),
                        })?;
                let usd = self.registry.value_usd(pool.token0, reserve0)
                    + self.registry.value_usd(pool.token1, reserve1);
                Ok(LiquidityUpdate {
                    liquidity: reserve0.saturating_add(reserve1),
                    reserve0,
                    reserve1,
                    liquidity_usd: clamp_finite(usd),
                })
            }
            VenueKind::V3Cl | VenueKind::StableCl => {
                let (liquidity, sqrt_price_x96) = self.read_cl_state(pool.pool_address).await?;
                let usd = estimate_cl_tvl_usd(
                    liquidity,
                    sqrt_price_x96,
                    pool.token0_decimals,
                    pool.token1_decimals,
                    self.registry.price_usd(pool.token0),
                    self.registry.price_usd(pool.token1),
                );
                Ok(LiquidityUpdate {
                    liquidity,
                    reserve0: U256::zero(),
                    reserve1: U256::zero(),
                    liquidity_usd: clamp_finite(usd),
                })
            }
            VenueKind::Aggregator => Ok(LiquidityUpdate {
                liquidity: U256::zero(),
                reserve0: U256::zero(),
                reserve1: U256::zero(),
                liquidity_usd: 0.0,
            }),
        }
    }

    async fn read_cl_state(&self, pool: Address) -> Result<(U256, U256), DiscoveryError> {
        let liquidity_fn = CL_POOL_ABI
            .function("liquidity")
            .map_err(|e| DiscoveryError::Decode(e.to_string()))?;
        let slot0_fn = CL_POOL_ABI
            .function("slot0")
            .map_err(|e| DiscoveryError::Decode(e.to_string()))?;

        let liq_data = liquidity_fn
            .encode_input(&[])
            .map_err(|e| DiscoveryError::Decode(e.to_string()))?;
        let slot0_data = slot0_fn
            .encode_input(&[])
            .map_err(|e| DiscoveryError::Decode(e.to_string()))?;

        let (liq_raw, slot0_raw) = tokio::join!(
            self.rpc.call(pool, Bytes::from(liq_data)),
            self.rpc.call(pool, Bytes::from(slot0_data)),
        );
        let liq_raw = liq_raw.map_err(|e| DiscoveryError::LiquidityRead {
            pool,
            reason: e.to_string(),
        })?;
        let slot0_raw = slot0_raw.map_err(|e| DiscoveryError::LiquidityRead {
            pool,
            reason: e.to_string(),
        })?;

        let liquidity = match liquidity_fn
            .decode_output(liq_raw.as_ref())
            .map_err(|e| DiscoveryError::Decode(e.to_string()))?
            .into_iter()
            .next()
        {
            Some(Token::Uint(v)) => v,
            _ => return Err(DiscoveryError::Decode("liquidity output missing".into())),
        };
        let sqrt_price = match slot0_fn
            .decode_output(slot0_raw.as_ref())
            .map_err(|e| DiscoveryError::Decode(e.to_string()))?
            .into_iter()
            .next()
        {
            Some(Token::Uint(v)) => v,
            _ => return Err(DiscoveryError::Decode("sqrtPriceX96 missing".into())),
        };
        Ok((liquidity, sqrt_price))
    }

    fn apply_liquidity(&self, pool_address: Address, update: LiquidityUpdate) {
        let min_liquidity_usd = self.settings.min_liquidity_usd;
        let registry = &self.registry;
        self.catalog.update(pool_address, |pool| {
            pool.liquidity = update.liquidity;
            pool.reserve0 = update.reserve0;
            pool.reserve1 = update.reserve1;
            pool.liquidity_usd = update.liquidity_usd;
            pool.last_updated_millis = now_millis();
            let known = registry.is_known(pool.token0) || registry.is_known(pool.token1);
            pool.is_active = known && update.liquidity_usd >= min_liquidity_usd;
        });
    }
}

#[derive(Debug, Clone, Copy)]
struct LiquidityUpdate {
    liquidity: U256,
    reserve0: U256,
    reserve1: U256,
    liquidity_usd: f64,
}

fn clamp_finite(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

/// Approximate CL pool TVL: reconstruct per-side token amounts from L and
/// √P (amount1 ≈ L·√P/2⁹⁶, amount0 ≈ L·2⁹⁶/√P), price whichever side has a
/// known USD value and double it. With no priced side, fall back to the
/// crude `liquidity × 1000` estimate so the pool is not silently excluded.
pub fn estimate_cl_tvl_usd(
    liquidity: U256,
    sqrt_price_x96: U256,
    token0_decimals: u8,
    token1_decimals: u8,
    price0_usd: f64,
    price1_usd: f64,
) -> f64 {
    if liquidity.is_zero() {
        return 0.0;
    }
    let l = u256_to_f64(liquidity);
    let sqrt_p = u256_to_f64(sqrt_price_x96) / 2f64.powi(96);

    if sqrt_p > 0.0 && (price0_usd > 0.0 || price1_usd > 0.0) {
        let amount1 = l * sqrt_p / 10f64.powi(token1_decimals as i32);
        let amount0 = l / sqrt_p / 10f64.powi(token0_decimals as i32);
        let usd = if price1_usd > 0.0 {
            amount1 * price1_usd * 2.0
        } else {
            amount0 * price0_usd * 2.0
        };
        return clamp_finite(usd);
    }
    clamp_finite(l * 1000.0)
}

fn u256_to_f64(v: U256) -> f64 {
    if v <= U256::from(u128::MAX) {
        v.as_u128() as f64
    } else {
        v.to_string().parse::<f64>().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_log(topics: Vec<H256>, data: Vec<u8>) -> Log {
        Log {
            topics,
            data: data.into(),
            ..Default::default()
        }
    }

    fn addr_topic(n: u64) -> H256 {
        H256::from(Address::from_low_u64_be(n))
    }

    #[test]
    fn decodes_v3_pool_created() {
        let mut data = vec![0u8; 64];
        // int24 tickSpacing = 60 in word 0, pool address in word 1.
        data[31] = 60;
        data[44..64].copy_from_slice(Address::from_low_u64_be(777).as_bytes());
        let mut fee_topic = [0u8; 32];
        fee_topic[30] = 0x0b;
        fee_topic[31] = 0xb8; // 3000
        let log = make_log(
            vec![
                *TOPIC_V3_POOL_CREATED,
                addr_topic(1),
                addr_topic(2),
                H256::from(fee_topic),
            ],
            data,
        );
        let event = decode_creation_log(FactoryEventKind::V3PoolCreated, &log).unwrap();
        assert_eq!(event.token0, Address::from_low_u64_be(1));
        assert_eq!(event.token1, Address::from_low_u64_be(2));
        assert_eq!(event.pool, Address::from_low_u64_be(777));
        assert_eq!(event.fee_or_tick_spacing, 3000);
    }

    #[test]
    fn decodes_v2_pair_created() {
        let mut data = vec![0u8; 64];
        data[12..32].copy_from_slice(Address::from_low_u64_be(555).as_bytes());
        let log = make_log(
            vec![*TOPIC_V2_PAIR_CREATED, addr_topic(3), addr_topic(4)],
            data,
        );
        let event = decode_creation_log(FactoryEventKind::V2PairCreated, &log).unwrap();
        assert_eq!(event.pool, Address::from_low_u64_be(555));
        assert_eq!(event.fee_or_tick_spacing, 30);
    }

    #[test]
    fn stable_flag_sets_fee() {
        let mut data = vec![0u8; 32];
        data[12..32].copy_from_slice(Address::from_low_u64_be(9).as_bytes());
        let mut stable_topic = [0u8; 32];
        stable_topic[31] = 1;
        let log = make_log(
            vec![
                *TOPIC_STABLE_POOL_CREATED,
                addr_topic(1),
                addr_topic(2),
                H256::from(stable_topic),
            ],
            data.clone(),
        );
        let event = decode_creation_log(FactoryEventKind::StableFlagPoolCreated, &log).unwrap();
        assert_eq!(event.fee_or_tick_spacing, 5);

        let log = make_log(
            vec![
                *TOPIC_STABLE_POOL_CREATED,
                addr_topic(1),
                addr_topic(2),
                H256::zero(),
            ],
            data,
        );
        let event = decode_creation_log(FactoryEventKind::StableFlagPoolCreated, &log).unwrap();
        assert_eq!(event.fee_or_tick_spacing, 30);
    }

    #[test]
    fn malformed_logs_are_rejected() {
        let log = make_log(vec![*TOPIC_V3_POOL_CREATED], vec![]);
        assert!(decode_creation_log(FactoryEventKind::V3PoolCreated, &log).is_err());
    }

    #[test]
    fn cl_tvl_uses_known_side_doubled() {
        // L = 1e18, sqrtP = 2^96 (price 1.0), both sides 18 decimals.
        let tvl = estimate_cl_tvl_usd(
            U256::exp10(18),
            U256::from(2u8).pow(U256::from(96u8)),
            18,
            18,
            0.0,
            2500.0,
        );
        // amount1 = 1.0 unit, × $2500 × 2.
        assert!((tvl - 5000.0).abs() < 1.0);
    }

    #[test]
    fn cl_tvl_falls_back_without_prices() {
        let tvl = estimate_cl_tvl_usd(U256::from(5u64), U256::from(2u8).pow(U256::from(96u8)), 18, 18, 0.0, 0.0);
        assert_eq!(tvl, 5000.0);
    }

    #[test]
    fn venue_table_addresses_parse() {
        for venue in VENUES {
            Address::from_str(venue.factory).expect("factory address");
            if let Some(q) = venue.quoter {
                Address::from_str(q).expect("quoter address");
            }
        }
        assert!(quoter_for("uniswap_v3").is_some());
        assert!(quoter_for("uniswap_v2").is_none());
        assert_eq!(tick_spacings_for("aerodrome_cl").len(), 5);
    }
}
