// tests/test_discovery.rs

//! Discovery against the mock transport: incremental scans are no-ops on an
//! empty range, creation events land in the catalog once, and the liquidity
//! refresher activates pools per the TVL invariant.

mod common;

use std::str::FromStr;
use std::sync::Arc;

use ethers::abi::Token;
use ethers::types::{Address, Bytes, Log, H256, U256};
use tempfile::tempdir;

use basisbot::catalog::PoolCatalog;
use basisbot::config::DiscoverySettings;
use basisbot::discovery::PoolDiscovery;
use basisbot::tokens::{well_known, TokenRegistry};

use common::MockChainRpc;

const PAIR_CREATED_TOPIC: &str =
    "0x0d3648bd0f6ba80134a33ba9275ac585d9d315f0ad8355cddefde31afa28d0e9";

fn settings() -> DiscoverySettings {
    DiscoverySettings {
        min_liquidity_usd: 10_000.0,
        refresh_batch_size: 20,
        refresh_batch_delay_ms: 1,
        save_every_batches: 5,
    }
}

/// A `PairCreated(WETH, USDC, pool, 1)` log as a v2 factory emits it.
fn pair_created_log(pool: Address) -> Log {
    let mut data = vec![0u8; 64];
    data[12..32].copy_from_slice(pool.as_bytes());
    data[63] = 1;
    Log {
        topics: vec![
            H256::from_str(PAIR_CREATED_TOPIC).unwrap(),
            H256::from(*well_known::WETH),
            H256::from(*well_known::USDC),
        ],
        data: data.into(),
        ..Default::default()
    }
}

fn harness(head: u64) -> (Arc<MockChainRpc>, Arc<PoolCatalog>, PoolDiscovery, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let rpc = Arc::new(MockChainRpc::default());
    rpc.block_number
        .store(head, std::sync::atomic::Ordering::Relaxed);
    let registry = Arc::new(TokenRegistry::new(rpc.clone(), 2_500.0, 60_000.0));
    let catalog = Arc::new(PoolCatalog::new(dir.path().join("pools.json")));
    let discovery = PoolDiscovery::new(rpc.clone(), registry, catalog.clone(), settings());
    (rpc, catalog, discovery, dir)
}

#[tokio::test]
async fn empty_range_incremental_scan_is_a_noop() {
    let (_rpc, catalog, discovery, _dir) = harness(14_000_000);
    catalog.set_last_scan_block(14_000_000);

    let changed = discovery.incremental_scan().await.unwrap();
    assert!(!changed);
    assert!(catalog.is_empty());
    assert_eq!(catalog.last_scan_block(), 14_000_000);
}

#[tokio::test]
async fn incremental_scan_appends_new_pools_once() {
    let (rpc, catalog, discovery, _dir) = harness(14_000_000);
    catalog.set_last_scan_block(13_999_999);

    let pool_address = Address::from_low_u64_be(0x9001);
    *rpc.logs.lock().unwrap() = vec![pair_created_log(pool_address)];

    let changed = discovery.incremental_scan().await.unwrap();
    assert!(changed);
    // The same event is served to every venue filter; only the first
    // matching decoder inserts, the rest are idempotent.
    assert_eq!(catalog.len(), 1);

    let pool = catalog.get(pool_address).unwrap();
    assert_eq!(pool.fee_or_tick_spacing, 30);
    assert!(!pool.is_active, "fresh pools start inactive");
    assert_eq!(catalog.last_scan_block(), 14_000_000);

    // Re-running against the same head changes nothing.
    let changed = discovery.incremental_scan().await.unwrap();
    assert!(!changed);
    assert_eq!(catalog.len(), 1);
}

#[tokio::test]
async fn liquidity_refresh_activates_deep_pools() {
    let (rpc, catalog, discovery, _dir) = harness(14_000_000);
    catalog.set_last_scan_block(13_999_999);
    let pool_address = Address::from_low_u64_be(0xF00D);
    *rpc.logs.lock().unwrap() = vec![pair_created_log(pool_address)];
    discovery.incremental_scan().await.unwrap();

    // getReserves → (10 WETH, 25_000 USDC): $50k of liquidity.
    let reserves = Bytes::from(ethers::abi::encode(&[
        Token::Uint(U256::exp10(18) * U256::from(10u64)),
        Token::Uint(U256::from(25_000_000_000u64)),
        Token::Uint(U256::zero()),
    ]));
    *rpc.call_handler.lock().unwrap() = Some(Box::new(move |_to, _data| Ok(reserves.clone())));

    let refreshed = discovery.refresh_liquidity().await;
    assert_eq!(refreshed, 1);

    let pool = catalog.get(pool_address).unwrap();
    assert!(pool.is_active);
    assert!((pool.liquidity_usd - 50_000.0).abs() < 1.0);
    assert_eq!(pool.reserve0, U256::exp10(18) * U256::from(10u64));

    // Idempotent against a stable head.
    discovery.refresh_liquidity().await;
    let again = catalog.get(pool_address).unwrap();
    assert_eq!(again.liquidity_usd, pool.liquidity_usd);
}

#[tokio::test]
async fn failed_liquidity_reads_deactivate_for_the_cycle() {
    let (rpc, catalog, discovery, _dir) = harness(14_000_000);
    catalog.set_last_scan_block(13_999_999);
    let pool_address = Address::from_low_u64_be(0xDEAD);
    *rpc.logs.lock().unwrap() = vec![pair_created_log(pool_address)];
    discovery.incremental_scan().await.unwrap();

    *rpc.call_handler.lock().unwrap() = Some(Box::new(|_to, _data| {
        Err(basisbot::errors::RpcError::Provider("flake".into()))
    }));

    discovery.refresh_liquidity().await;
    let pool = catalog.get(pool_address).unwrap();
    assert!(!pool.is_active);
}
