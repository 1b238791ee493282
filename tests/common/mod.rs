// tests/common/mod.rs

//! Shared test harness: an in-memory [`ChainRpc`] with programmable
//! responses, so pipeline and strategy behavior can be exercised without a
//! node.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use ethers::types::{
    Address, Block, Bytes, Filter, Log, TransactionReceipt, H256, U256,
};
use basisbot::blockchain::ChainRpc;
use basisbot::errors::RpcError;

pub type CallHandler = Box<dyn Fn(Address, &[u8]) -> Result<Bytes, RpcError> + Send + Sync>;

/// Canned-response chain transport. Fields are primed by each test; every
/// accessor falls back to something harmless so unrelated pipeline steps
/// pass.
pub struct MockChainRpc {
    pub block_number: AtomicU64,
    pub balances: Mutex<HashMap<Address, U256>>,
    /// Popped per `pending_nonce` call; the last value repeats.
    pub pending_nonces: Mutex<VecDeque<u64>>,
    pub nonce_queries: AtomicU64,
    /// Popped per `send_raw_transaction` call; `Err` strings become
    /// provider errors.
    pub send_results: Mutex<VecDeque<Result<H256, String>>>,
    pub receipts: Mutex<HashMap<H256, TransactionReceipt>>,
    pub call_handler: Mutex<Option<CallHandler>>,
    pub logs: Mutex<Vec<Log>>,
}

impl Default for MockChainRpc {
    fn default() -> Self {
        Self {
            block_number: AtomicU64::new(1_000),
            balances: Mutex::new(HashMap::new()),
            pending_nonces: Mutex::new(VecDeque::new()),
            nonce_queries: AtomicU64::new(0),
            send_results: Mutex::new(VecDeque::new()),
            receipts: Mutex::new(HashMap::new()),
            call_handler: Mutex::new(None),
            logs: Mutex::new(Vec::new()),
        }
    }
}

impl MockChainRpc {
    pub fn with_handler(handler: CallHandler) -> Self {
        let mock = Self::default();
        *mock.call_handler.lock().unwrap() = Some(handler);
        mock
    }

    pub fn set_balance(&self, address: Address, wei: U256) {
        self.balances.lock().unwrap().insert(address, wei);
    }

    pub fn push_nonce(&self, nonce: u64) {
        self.pending_nonces.lock().unwrap().push_back(nonce);
    }

    pub fn push_send_result(&self, result: Result<H256, &str>) {
        self.send_results
            .lock()
            .unwrap()
            .push_back(result.map_err(|s| s.to_string()));
    }

    pub fn insert_receipt(&self, hash: H256, status: u64, gas_used: u64, gas_price: u64) {
        let receipt = TransactionReceipt {
            transaction_hash: hash,
            status: Some(status.into()),
            gas_used: Some(U256::from(gas_used)),
            effective_gas_price: Some(U256::from(gas_price)),
            ..Default::default()
        };
        self.receipts.lock().unwrap().insert(hash, receipt);
    }
}

impl std::fmt::Debug for MockChainRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockChainRpc").finish()
    }
}

#[async_trait]
impl ChainRpc for MockChainRpc {
    async fn block_number(&self) -> Result<u64, RpcError> {
        Ok(self.block_number.load(Ordering::Relaxed))
    }

    async fn get_block(&self, _number: u64) -> Result<Option<Block<H256>>, RpcError> {
        Ok(Some(Block::default()))
    }

    async fn latest_block(&self) -> Result<Option<Block<H256>>, RpcError> {
        Ok(Some(Block::default()))
    }

    async fn get_logs(&self, _filter: &Filter) -> Result<Vec<Log>, RpcError> {
        Ok(self.logs.lock().unwrap().clone())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError> {
        let handler = self.call_handler.lock().unwrap();
        match handler.as_ref() {
            Some(handler) => handler(to, data.as_ref()),
            None => Ok(Bytes::new()),
        }
    }

    async fn send_raw_transaction(&self, _raw: Bytes) -> Result<H256, RpcError> {
        let mut results = self.send_results.lock().unwrap();
        match results.pop_front() {
            Some(Ok(hash)) => Ok(hash),
            Some(Err(text)) => Err(RpcError::Provider(text)),
            None => Ok(H256::from_low_u64_be(0xdead)),
        }
    }

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        Ok(self.receipts.lock().unwrap().get(&hash).cloned())
    }

    async fn pending_nonce(&self, _address: Address) -> Result<u64, RpcError> {
        self.nonce_queries.fetch_add(1, Ordering::Relaxed);
        let mut nonces = self.pending_nonces.lock().unwrap();
        if nonces.len() > 1 {
            Ok(nonces.pop_front().expect("nonce queue"))
        } else {
            Ok(nonces.front().copied().unwrap_or(0))
        }
    }

    async fn balance(&self, address: Address) -> Result<U256, RpcError> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&address)
            .copied()
            .unwrap_or_else(|| U256::exp10(18)))
    }
}
