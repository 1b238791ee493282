// src/catalog.rs

//! # Pool Catalog & Persistence
//!
//! Exclusive owner of every [`DiscoveredPool`]. Discovery and the liquidity
//! refresher write through it; everything else reads snapshots. The catalog
//! persists to a single pretty-printed JSON document written atomically
//! (temp file, fsync, rename) so a crash mid-save never corrupts the
//! snapshot the next boot loads.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use ethers::types::Address;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::SNAPSHOT_MAX_AGE_DAYS;
use crate::errors::PersistenceError;
use crate::types::{now_millis, CatalogSnapshot, DiscoveredPool, PersistedPair, SNAPSHOT_VERSION};

const MILLIS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug)]
pub struct PoolCatalog {
    pools: DashMap<Address, DiscoveredPool>,
    last_scan_block: AtomicU64,
    snapshot_path: PathBuf,
}

impl PoolCatalog {
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            pools: DashMap::new(),
            last_scan_block: AtomicU64::new(0),
            snapshot_path: snapshot_path.into(),
        }
    }

    /// Idempotent insert keyed by pool address. Re-inserting an address keeps
    /// the existing record (liquidity state survives rediscovery).
    pub fn insert(&self, pool: DiscoveredPool) -> bool {
        match self.pools.entry(pool.pool_address) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(pool);
                true
            }
        }
    }

    pub fn get(&self, address: Address) -> Option<DiscoveredPool> {
        self.pools.get(&address).map(|p| p.clone())
    }

    /// Applies `f` to a pool in place. Returns false when absent.
    pub fn update(&self, address: Address, f: impl FnOnce(&mut DiscoveredPool)) -> bool {
        match self.pools.get_mut(&address) {
            Some(mut pool) => {
                f(&mut pool);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Consistent snapshot of the active set, valid for a full engine cycle.
    pub fn iter_active(&self) -> Vec<DiscoveredPool> {
        self.pools
            .iter()
            .filter(|p| p.is_active)
            .map(|p| p.clone())
            .collect()
    }

    pub fn iter_all(&self) -> Vec<DiscoveredPool> {
        self.pools.iter().map(|p| p.clone()).collect()
    }

    pub fn last_scan_block(&self) -> u64 {
        self.last_scan_block.load(Ordering::Acquire)
    }

    pub fn set_last_scan_block(&self, block: u64) {
        self.last_scan_block.fetch_max(block, Ordering::AcqRel);
    }

    /// Writes the snapshot atomically: serialize to `<path>.tmp`, fsync,
    /// rename over the live file. Failures leave memory state untouched and
    /// the previous snapshot intact; the next save retries. The pair
    /// projection is derived from the active set at save time.
    pub async fn save(&self) -> Result<(), PersistenceError> {
        let pools = self.iter_all();
        let snapshot = CatalogSnapshot {
            version: SNAPSHOT_VERSION,
            timestamp_millis: now_millis(),
            last_scan_block: self.last_scan_block(),
            trade_pairs: derive_pairs(&pools),
            pools,
        };
        let body = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = self.snapshot_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = self.snapshot_path.with_extension("json.tmp");
        let mut tmp = tokio::fs::File::create(&tmp_path).await?;
        tmp.write_all(&body).await?;
        tmp.sync_all().await?;
        drop(tmp);
        tokio::fs::rename(&tmp_path, &self.snapshot_path).await?;

        info!(
            target: "pool_catalog",
            pools = snapshot.pools.len(),
            last_scan_block = snapshot.last_scan_block,
            path = %self.snapshot_path.display(),
            "Catalog snapshot saved"
        );
        Ok(())
    }

    /// Restores the snapshot if one exists, is version-compatible, younger
    /// than the freshness TTL and structurally sane. Returns whether a
    /// snapshot was loaded; `false` tells the caller to run a full scan.
    pub async fn load(&self) -> Result<bool, PersistenceError> {
        if !self.snapshot_path.exists() {
            return Ok(false);
        }
        let raw = tokio::fs::read(&self.snapshot_path).await?;
        let snapshot: CatalogSnapshot = serde_json::from_slice(&raw)?;

        if snapshot.version != SNAPSHOT_VERSION {
            warn!(
                target: "pool_catalog",
                found = snapshot.version,
                expected = SNAPSHOT_VERSION,
                "Snapshot version mismatch, forcing full rescan"
            );
            return Err(PersistenceError::VersionMismatch {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let age_millis = now_millis().saturating_sub(snapshot.timestamp_millis);
        let age_days = age_millis / MILLIS_PER_DAY;
        if age_days > SNAPSHOT_MAX_AGE_DAYS {
            warn!(
                target: "pool_catalog",
                age_days,
                "Snapshot too old, forcing full rescan"
            );
            return Err(PersistenceError::Stale {
                age_days,
                max_days: SNAPSHOT_MAX_AGE_DAYS,
            });
        }

        validate_structure(&snapshot)?;

        self.pools.clear();
        for pool in snapshot.pools {
            self.pools.insert(pool.pool_address, pool);
        }
        self.last_scan_block
            .store(snapshot.last_scan_block, Ordering::Release);

        info!(
            target: "pool_catalog",
            pools = self.pools.len(),
            last_scan_block = snapshot.last_scan_block,
            "Catalog snapshot restored"
        );
        Ok(true)
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }
}

fn derive_pairs(pools: &[DiscoveredPool]) -> Vec<PersistedPair> {
    let mut pairs: std::collections::BTreeMap<(Address, Address), PersistedPair> =
        std::collections::BTreeMap::new();
    for pool in pools.iter().filter(|p| p.is_active) {
        let entry = pairs
            .entry(pool.pair_key())
            .or_insert_with(|| PersistedPair {
                token_a: pool.token0,
                token_b: pool.token1,
                pool_count: 0,
                best_liquidity_usd: 0.0,
            });
        entry.pool_count += 1;
        entry.best_liquidity_usd = entry.best_liquidity_usd.max(pool.liquidity_usd);
    }
    pairs.into_values().collect()
}

fn validate_structure(snapshot: &CatalogSnapshot) -> Result<(), PersistenceError> {
    for pool in &snapshot.pools {
        if pool.token0 == pool.token1 {
            return Err(PersistenceError::Corrupt(format!(
                "pool {} has identical tokens",
                pool.pool_address
            )));
        }
        if pool.token0 > pool.token1 {
            return Err(PersistenceError::Corrupt(format!(
                "pool {} tokens out of order",
                pool.pool_address
            )));
        }
        if pool.token0_decimals > 36 || pool.token1_decimals > 36 {
            return Err(PersistenceError::Corrupt(format!(
                "pool {} has implausible decimals",
                pool.pool_address
            )));
        }
    }
    let mut seen = std::collections::HashSet::with_capacity(snapshot.pools.len());
    for pool in &snapshot.pools {
        if !seen.insert(pool.pool_address) {
            return Err(PersistenceError::Corrupt(format!(
                "duplicate pool address {}",
                pool.pool_address
            )));
        }
    }
    Ok(())
}
