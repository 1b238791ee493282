// src/quotes/mod.rs

//! # Multi-venue Quote Engine
//!
//! One adapter per pool family behind [`VenueAdapter`]; dispatch is a tagged
//! match on [`VenueKind`], never an inheritance hierarchy. All adapter calls
//! for a request run concurrently under one bounded semaphore, failures stay
//! isolated per adapter, and results come back sorted by descending
//! `amount_out`.

pub mod aggregator;
pub mod stable;
pub mod v2;
pub mod v3;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Address, U256};
use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::blockchain::ChainRpc;
use crate::config::QuoteSettings;
use crate::errors::QuoteError;
use crate::types::{DiscoveredPool, QuoteResult, VenueKind};

pub use aggregator::AggregatorAdapter;
pub use stable::StableClAdapter;
pub use v2::V2Adapter;
pub use v3::V3Adapter;

/// A single venue family's quoting surface. Adapters share pure helpers but
/// no mutable state.
#[async_trait]
pub trait VenueAdapter: Send + Sync + Debug {
    fn venue_name(&self) -> &'static str;

    /// Exact-input quote through one pool. `Ok(None)` means the venue has no
    /// executable route for this request; errors are logged and treated the
    /// same by the engine.
    async fn quote_pool(
        &self,
        pool: &DiscoveredPool,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<Option<QuoteResult>, QuoteError>;
}

pub struct QuoteEngine {
    v2: Arc<V2Adapter>,
    v3: Arc<V3Adapter>,
    stable: Arc<StableClAdapter>,
    aggregator: Option<Arc<AggregatorAdapter>>,
    semaphore: Arc<Semaphore>,
}

impl QuoteEngine {
    pub fn new(rpc: Arc<dyn ChainRpc>, settings: QuoteSettings) -> Self {
        let aggregator = settings
            .aggregator_api_key
            .as_ref()
            .map(|key| Arc::new(AggregatorAdapter::new(key.clone(), &settings)));
        Self {
            v2: Arc::new(V2Adapter::new(rpc.clone(), settings.v2_fee_bps)),
            v3: Arc::new(V3Adapter::new(rpc.clone())),
            stable: Arc::new(StableClAdapter::new(rpc)),
            aggregator,
            semaphore: Arc::new(Semaphore::new(settings.concurrency.max(1))),
        }
    }

    /// Quotes `amount_in` of `token_in` into `token_out` across every pool in
    /// the slice, concurrently and bounded. Pool-less venues (the aggregator)
    /// are not consulted here; see [`QuoteEngine::aggregator_price`].
    pub async fn quotes_for(
        &self,
        pools: &[DiscoveredPool],
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Vec<QuoteResult> {
        let futures = pools.iter().map(|pool| {
            let semaphore = self.semaphore.clone();
            let adapter = self.adapter_for(pool.venue_kind);
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                let adapter = adapter?;
                match adapter
                    .quote_pool(pool, token_in, token_out, amount_in)
                    .await
                {
                    Ok(result) => result,
                    Err(e) => {
                        debug!(
                            target: "quote_engine",
                            venue = adapter.venue_name(),
                            pool = %pool.pool_address,
                            error = %e,
                            "Venue quote failed"
                        );
                        None
                    }
                }
            }
        });

        let mut results: Vec<QuoteResult> = join_all(futures)
            .await
            .into_iter()
            .flatten()
            .filter(|q| !q.amount_out.is_zero())
            .collect();
        results.sort_by(|a, b| b.amount_out.cmp(&a.amount_out));
        results
    }

    /// Indicative aggregator price, no calldata. `None` when the aggregator
    /// is unconfigured, rate limited or timing out.
    pub async fn aggregator_price(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Option<QuoteResult> {
        let aggregator = self.aggregator.as_ref()?;
        match aggregator.price(token_in, token_out, amount_in).await {
            Ok(result) => result,
            Err(e) => {
                warn!(target: "quote_engine", error = %e, "Aggregator price failed");
                None
            }
        }
    }

    /// Firm aggregator quote with execution calldata in `extra_data`.
    pub async fn aggregator_firm_quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Option<QuoteResult> {
        let aggregator = self.aggregator.as_ref()?;
        match aggregator.firm_quote(token_in, token_out, amount_in).await {
            Ok(result) => result,
            Err(e) => {
                warn!(target: "quote_engine", error = %e, "Aggregator firm quote failed");
                None
            }
        }
    }

    pub fn has_aggregator(&self) -> bool {
        self.aggregator.is_some()
    }

    fn adapter_for(&self, kind: VenueKind) -> Option<Arc<dyn VenueAdapter>> {
        match kind {
            VenueKind::V2Amm => Some(self.v2.clone()),
            VenueKind::V3Cl => Some(self.v3.clone()),
            VenueKind::StableCl => Some(self.stable.clone()),
            // Weighted pools are discovered and tracked but not yet quotable.
            VenueKind::Weighted => None,
            VenueKind::Aggregator => None,
        }
    }
}

impl Debug for QuoteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteEngine")
            .field("aggregator", &self.aggregator.is_some())
            .finish()
    }
}
