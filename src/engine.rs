// src/engine.rs

//! # Engine Orchestration
//!
//! Owns component lifecycles and the main search-execute cycle. Startup
//! restores or rebuilds the catalog, background ticks keep it fresh, and the
//! cycle loop runs one snapshot → search → validate → execute pass per poll
//! interval. Shutdown is cooperative and ordered: stop taking work, drain the
//! pipeline, save the catalog.

use std::sync::Arc;
use std::time::Duration;

use ethers::types::U256;
use eyre::WrapErr;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::blockchain::{ChainRpc, HttpChainRpc};
use crate::catalog::PoolCatalog;
use crate::config::Config;
use crate::discovery::PoolDiscovery;
use crate::errors::BotError;
use crate::execution::ExecutionPipeline;
use crate::gas::GasOracle;
use crate::graph::TradeGraph;
use crate::mempool::MempoolObserver;
use crate::quotes::QuoteEngine;
use crate::risk::RiskController;
use crate::strategy::StrategyEngine;
use crate::tokens::{well_known, TokenRegistry};
use crate::types::{now_millis, EngineStats, PendingSwap};

/// Bootstrap reference prices until the first on-chain refresh lands.
const BOOT_ETH_USD: f64 = 2_500.0;
const BOOT_BTC_USD: f64 = 60_000.0;

/// Catalog maintenance cadence (incremental scan + liquidity refresh).
const DISCOVERY_TICK: Duration = Duration::from_secs(120);
/// Reference-price refresh cadence.
const PRICE_TICK: Duration = Duration::from_secs(30);
/// Chain-head sampling cadence for the gas oracle (Base blocks every ~2 s).
const GAS_TICK: Duration = Duration::from_secs(2);

/// Pool-event subscriptions requested from the observer.
const WATCHED_POOL_LIMIT: usize = 50;

pub struct ArbEngine {
    config: Config,
    rpc: Arc<dyn ChainRpc>,
    registry: Arc<TokenRegistry>,
    catalog: Arc<PoolCatalog>,
    discovery: Arc<PoolDiscovery>,
    quotes: Arc<QuoteEngine>,
    strategy: StrategyEngine,
    risk: Arc<RiskController>,
    gas: Arc<GasOracle>,
    pipeline: Arc<ExecutionPipeline>,
    observer: Arc<MempoolObserver>,
    stats: Arc<EngineStats>,
    cancel: CancellationToken,
}

impl ArbEngine {
    /// Wires every component from configuration. Partial failures here are
    /// startup failures; acquired resources are dropped on the error path.
    pub fn bootstrap(config: Config) -> eyre::Result<Self> {
        let rpc: Arc<dyn ChainRpc> = Arc::new(
            HttpChainRpc::new(&config.rpc_url_http, config.rpc_url_backup.as_deref())
                .wrap_err("failed to construct the JSON-RPC transport")?,
        );

        let registry = Arc::new(TokenRegistry::new(rpc.clone(), BOOT_ETH_USD, BOOT_BTC_USD));
        let catalog = Arc::new(PoolCatalog::new("./data/pools.json"));
        let discovery = Arc::new(PoolDiscovery::new(
            rpc.clone(),
            registry.clone(),
            catalog.clone(),
            config.discovery(),
        ));
        let quotes = Arc::new(QuoteEngine::new(rpc.clone(), config.quotes()));
        let gas = Arc::new(GasOracle::new());
        let risk = Arc::new(RiskController::new(config.risk()));
        let strategy = StrategyEngine::new(
            quotes.clone(),
            registry.clone(),
            gas.clone(),
            config.strategy(),
        );
        let cancel = CancellationToken::new();
        let observer = Arc::new(MempoolObserver::new(
            config.mempool(),
            registry.clone(),
            cancel.child_token(),
        ));
        let signer = config
            .signer()
            .wrap_err("execution signer could not be constructed from SIGNER_KEY")?;
        let pipeline = Arc::new(ExecutionPipeline::new(
            rpc.clone(),
            signer,
            gas.clone(),
            risk.clone(),
            registry.clone(),
            config.execution(),
            config.private_relay_url.clone(),
        ));

        Ok(Self {
            config,
            rpc,
            registry,
            catalog,
            discovery,
            quotes,
            strategy,
            risk,
            gas,
            pipeline,
            observer,
            stats: Arc::new(EngineStats::default()),
            cancel,
        })
    }

    pub fn shutdown_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stats(&self) -> Arc<EngineStats> {
        self.stats.clone()
    }

    /// Runs until the shutdown token fires. Returns only after the ordered
    /// shutdown path completes.
    pub async fn run(&self) -> Result<(), BotError> {
        self.startup().await?;
        self.spawn_background_tasks();

        let mut poll = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = poll.tick() => {
                    let started = now_millis();
                    self.cycle().await;
                    self.stats.record_cycle(now_millis().saturating_sub(started));
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn startup(&self) -> Result<(), BotError> {
        match self.catalog.load().await {
            Ok(true) => {
                info!(
                    target: "engine",
                    pools = self.catalog.len(),
                    "Snapshot restored, running incremental scan"
                );
                if let Err(e) = self.discovery.incremental_scan().await {
                    warn!(target: "engine", error = %e, "Incremental scan failed at startup");
                }
            }
            Ok(false) => {
                info!(target: "engine", "No snapshot found, running full factory scan");
                self.discovery.full_scan().await?;
            }
            Err(e) => {
                warn!(target: "engine", error = %e, "Snapshot rejected, running full factory scan");
                self.discovery.full_scan().await?;
            }
        }

        self.refresh_reference_prices().await;
        let refreshed = self.discovery.refresh_liquidity().await;
        info!(
            target: "engine",
            pools = self.catalog.len(),
            refreshed,
            "Startup discovery complete"
        );

        // Advisory mempool feed; engine runs fine without it.
        let watched: Vec<_> = self
            .catalog
            .iter_active()
            .into_iter()
            .take(WATCHED_POOL_LIMIT)
            .map(|p| p.pool_address)
            .collect();
        self.observer.clone().start(watched);
        self.drain_pending_swaps(self.observer.subscribe_swaps());
        self.drain_pool_updates(self.observer.subscribe_pool_updates());

        Ok(())
    }

    fn spawn_background_tasks(&self) {
        // Catalog maintenance: incremental scan, then liquidity refresh.
        {
            let discovery = self.discovery.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(DISCOVERY_TICK);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tick.tick() => {
                            if let Err(e) = discovery.incremental_scan().await {
                                warn!(target: "engine", error = %e, "Incremental scan failed");
                            }
                            discovery.refresh_liquidity().await;
                        }
                    }
                }
            });
        }

        // Hourly risk budget reset, independent of trade flow.
        {
            let risk = self.risk.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(Duration::from_secs(3_600));
                tick.tick().await; // swallow the immediate first tick
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tick.tick() => risk.tick_hourly().await,
                    }
                }
            });
        }

        // Chain-head sampling for the gas oracle.
        {
            let rpc = self.rpc.clone();
            let gas = self.gas.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(GAS_TICK);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                let mut last_seen = 0u64;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tick.tick() => {
                            let Ok(Some(block)) = rpc.latest_block().await else { continue };
                            let number = block.number.map(|n| n.as_u64()).unwrap_or(0);
                            if number <= last_seen {
                                continue;
                            }
                            last_seen = number;
                            gas.observe_block(
                                block.base_fee_per_gas.unwrap_or_default(),
                                block.gas_used,
                                block.gas_limit,
                            );
                        }
                    }
                }
            });
        }

        // Reference-price refresh from on-chain mid prices.
        {
            let engine_registry = self.registry.clone();
            let quotes = self.quotes.clone();
            let catalog = self.catalog.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(PRICE_TICK);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tick.tick() => {
                            refresh_prices_once(&engine_registry, &quotes, &catalog).await;
                        }
                    }
                }
            });
        }
    }

    /// Keeps the broadcast channel drained so slow cycles never lag the
    /// observer. The events themselves feed the heuristics inside the
    /// observer; here they are only consumed.
    fn drain_pending_swaps(&self, mut rx: broadcast::Receiver<PendingSwap>) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    event = rx.recv() => {
                        match event {
                            Ok(swap) => {
                                debug!(
                                    target: "engine",
                                    tx = %format!("{:#x}", swap.tx_hash),
                                    value_usd = swap.value_usd,
                                    "Pending swap observed"
                                );
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                debug!(target: "engine", dropped = n, "Pending-swap stream lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => return,
                        }
                    }
                }
            }
        });
    }

    fn drain_pool_updates(&self, mut rx: broadcast::Receiver<crate::types::PoolUpdate>) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    event = rx.recv() => {
                        match event {
                            Ok(update) => {
                                debug!(
                                    target: "engine",
                                    pool = %update.pool_address,
                                    block = update.block_number,
                                    "Pool state changed on-chain"
                                );
                            }
                            Err(broadcast::error::RecvError::Lagged(_)) => {}
                            Err(broadcast::error::RecvError::Closed) => return,
                        }
                    }
                }
            }
        });
    }

    /// One engine cycle: snapshot → search → validate → execute → book.
    async fn cycle(&self) {
        let graph = TradeGraph::build(&self.catalog.iter_active());
        if graph.pair_count() == 0 {
            return;
        }

        let candidates = self.strategy.find_opportunities(&graph).await;
        if candidates.is_empty() {
            return;
        }
        self.stats
            .opportunities_found
            .fetch_add(candidates.len() as u64, std::sync::atomic::Ordering::Relaxed);

        for candidate in &candidates {
            match self.risk.validate(candidate, candidate.pool_floor_usd).await {
                Ok(()) => {
                    info!(
                        target: "engine",
                        strategy = %candidate.strategy,
                        pair = %candidate.pair_label(),
                        net_usd = candidate.net_profit_usd,
                        "Executing opportunity"
                    );
                    let outcome = self.pipeline.execute(candidate).await;
                    self.stats
                        .record_outcome(outcome.net_profit_usd, outcome.succeeded());
                    debug!(target: "engine", state = ?outcome.state, "Execution finished");
                }
                Err(reason) => {
                    debug!(
                        target: "engine",
                        strategy = %candidate.strategy,
                        %reason,
                        "Candidate rejected by risk controller"
                    );
                }
            }
        }
    }

    async fn refresh_reference_prices(&self) {
        refresh_prices_once(&self.registry, &self.quotes, &self.catalog).await;
    }

    /// Ordered shutdown per the cooperative-stop contract: the ticks exit on
    /// the token, the pipeline drains its in-flight submission, the catalog
    /// saves last.
    async fn shutdown(&self) {
        info!(target: "engine", "Shutdown requested");
        self.cancel.cancel();
        self.pipeline.drain().await;
        if let Err(e) = self.catalog.save().await {
            error!(target: "engine", error = %e, "Final catalog save failed");
        }
        info!(
            target: "engine",
            cycles = self.stats.cycles.load(std::sync::atomic::Ordering::Relaxed),
            avg_cycle_ms = self.stats.avg_cycle_millis(),
            cumulative_usd = self.stats.cumulative_profit_usd(),
            "Engine stopped"
        );
    }
}

/// Derives fresh ETH/BTC reference prices from live pool quotes against
/// USDC. Falls back to the previous values when no route answers.
async fn refresh_prices_once(
    registry: &Arc<TokenRegistry>,
    quotes: &Arc<QuoteEngine>,
    catalog: &Arc<PoolCatalog>,
) {
    let active = catalog.iter_active();
    let usdc = *well_known::USDC;

    let eth_pools: Vec<_> = active
        .iter()
        .filter(|p| p.pair_key() == ordered_key(*well_known::WETH, usdc))
        .cloned()
        .collect();
    let btc_pools: Vec<_> = active
        .iter()
        .filter(|p| p.pair_key() == ordered_key(*well_known::CBBTC, usdc))
        .cloned()
        .collect();

    let mut eth_usd = registry.eth_usd().await;
    if !eth_pools.is_empty() {
        let out = quotes
            .quotes_for(&eth_pools, *well_known::WETH, usdc, U256::exp10(18))
            .await;
        if let Some(best) = out.first() {
            let mid = crate::types::normalize_units(best.amount_out, 6);
            if mid.is_finite() && mid > 0.0 {
                eth_usd = mid;
            }
        }
    }

    let mut btc_usd = {
        // Reuse the previous BTC price unless a live quote improves on it.
        let info = registry.get(*well_known::CBBTC);
        info.map(|t| t.price_usd).unwrap_or(0.0)
    };
    if !btc_pools.is_empty() {
        let out = quotes
            .quotes_for(&btc_pools, *well_known::CBBTC, usdc, U256::exp10(8))
            .await;
        if let Some(best) = out.first() {
            let mid = crate::types::normalize_units(best.amount_out, 6);
            if mid.is_finite() && mid > 0.0 {
                btc_usd = mid;
            }
        }
    }

    if btc_usd <= 0.0 {
        btc_usd = BOOT_BTC_USD;
    }
    registry.update_prices(eth_usd, btc_usd).await;
}

fn ordered_key(
    a: ethers::types::Address,
    b: ethers::types::Address,
) -> (ethers::types::Address, ethers::types::Address) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
