// src/blockchain.rs

//! # Chain Transport
//!
//! Thin trait over the JSON-RPC surface the engine actually uses. Everything
//! above this layer depends on `Arc<dyn ChainRpc>`, which keeps the venue
//! adapters and the execution pipeline testable against an in-memory mock.
//! The HTTP implementation fails over to the backup endpoint on transport
//! errors; call-level reverts are never retried.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{
    Address, Block, BlockNumber, Bytes, Eip1559TransactionRequest, Filter, Log, TransactionReceipt,
    H256, U256,
};
use tracing::{debug, warn};

use crate::errors::RpcError;

#[async_trait]
pub trait ChainRpc: Send + Sync + Debug {
    async fn block_number(&self) -> Result<u64, RpcError>;

    async fn get_block(&self, number: u64) -> Result<Option<Block<H256>>, RpcError>;

    async fn latest_block(&self) -> Result<Option<Block<H256>>, RpcError>;

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError>;

    /// `eth_call` against the latest state. Reverts surface as
    /// [`RpcError::Revert`] with whatever reason string the node returned.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError>;

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, RpcError>;

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>, RpcError>;

    /// Pending-state transaction count, used to seed the local nonce.
    async fn pending_nonce(&self, address: Address) -> Result<u64, RpcError>;

    async fn balance(&self, address: Address) -> Result<U256, RpcError>;
}

/// HTTP JSON-RPC transport with optional backup failover.
#[derive(Debug, Clone)]
pub struct HttpChainRpc {
    primary: Arc<Provider<Http>>,
    backup: Option<Arc<Provider<Http>>>,
}

impl HttpChainRpc {
    pub fn new(primary_url: &str, backup_url: Option<&str>) -> Result<Self, RpcError> {
        let primary = Provider::<Http>::try_from(primary_url)
            .map_err(|e| RpcError::InvalidUrl(format!("{}: {}", primary_url, e)))?;
        let backup = match backup_url {
            Some(url) => Some(Arc::new(Provider::<Http>::try_from(url).map_err(|e| {
                RpcError::InvalidUrl(format!("{}: {}", url, e))
            })?)),
            None => None,
        };
        Ok(Self {
            primary: Arc::new(primary),
            backup,
        })
    }

    /// Runs `op` against the primary, then the backup on transport failure.
    /// Reverts are returned as-is: a deterministic revert on the backup would
    /// be the same revert.
    async fn with_failover<'a, T, F, Fut>(&'a self, op: F) -> Result<T, RpcError>
    where
        F: Fn(Arc<Provider<Http>>) -> Fut,
        Fut: std::future::Future<Output = Result<T, ethers::providers::ProviderError>> + 'a,
    {
        let primary_err = match op(self.primary.clone()).await {
            Ok(v) => return Ok(v),
            Err(e) => classify(e),
        };
        if let RpcError::Revert(_) = primary_err {
            return Err(primary_err);
        }
        let Some(backup) = self.backup.clone() else {
            return Err(primary_err);
        };
        debug!(target: "chain_rpc", error = %primary_err, "Primary endpoint failed, trying backup");
        match op(backup).await {
            Ok(v) => Ok(v),
            Err(backup_err) => {
                let backup_err = classify(backup_err);
                warn!(target: "chain_rpc", %primary_err, %backup_err, "Both RPC endpoints failed");
                Err(RpcError::AllEndpointsFailed {
                    primary: primary_err.to_string(),
                    backup: backup_err.to_string(),
                })
            }
        }
    }
}

fn classify(err: ethers::providers::ProviderError) -> RpcError {
    let text = err.to_string();
    if text.contains("429") || text.to_lowercase().contains("rate limit") {
        RpcError::RateLimited
    } else if text.contains("revert") || text.contains("execution reverted") {
        RpcError::Revert(text)
    } else {
        RpcError::Provider(text)
    }
}

#[async_trait]
impl ChainRpc for HttpChainRpc {
    async fn block_number(&self) -> Result<u64, RpcError> {
        self.with_failover(|p| async move { p.get_block_number().await })
            .await
            .map(|n| n.as_u64())
    }

    async fn get_block(&self, number: u64) -> Result<Option<Block<H256>>, RpcError> {
        self.with_failover(|p| async move { p.get_block(number).await })
            .await
    }

    async fn latest_block(&self) -> Result<Option<Block<H256>>, RpcError> {
        self.with_failover(|p| async move { p.get_block(BlockNumber::Latest).await })
            .await
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError> {
        self.with_failover(|p| {
            let filter = filter.clone();
            async move { p.get_logs(&filter).await }
        })
        .await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError> {
        self.with_failover(|p| {
            let data = data.clone();
            async move {
                let tx = Eip1559TransactionRequest::new().to(to).data(data);
                p.call(&tx.into(), None).await
            }
        })
        .await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, RpcError> {
        self.with_failover(|p| {
            let raw = raw.clone();
            async move {
                let pending = p.send_raw_transaction(raw).await?;
                Ok(pending.tx_hash())
            }
        })
        .await
    }

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        self.with_failover(|p| async move { p.get_transaction_receipt(hash).await })
            .await
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, RpcError> {
        self.with_failover(|p| async move {
            p.get_transaction_count(address, Some(BlockNumber::Pending.into()))
                .await
        })
        .await
        .map(|n| n.as_u64())
    }

    async fn balance(&self, address: Address) -> Result<U256, RpcError> {
        self.with_failover(|p| async move { p.get_balance(address, None).await })
            .await
    }
}
