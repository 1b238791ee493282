// src/execution.rs

//! # Execution Pipeline
//!
//! Takes the one approved opportunity per cycle through preflight, static
//! simulation, signing and submission. The private relay is tried first with
//! a one-block inclusion wait; the public mempool is the fallback. The
//! pipeline owns the signer's nonce and enforces a single in-flight
//! submission, which is what keeps nonce management trivial.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use ethers::abi::{Abi, Token};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, Eip1559TransactionRequest, H256, U256,
};
use once_cell::sync::Lazy;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::blockchain::ChainRpc;
use crate::config::{ExecutionSettings, CHAIN_ID};
use crate::errors::{ExecutionError, RpcError};
use crate::gas::GasOracle;
use crate::risk::RiskController;
use crate::tokens::TokenRegistry;
use crate::types::{normalize_units, ArbOpportunity, USE_BALANCE};

static EXECUTOR_ABI: Lazy<Abi> = Lazy::new(|| {
    serde_json::from_str(
        r#"[
            {"inputs":[],"name":"paused","outputs":[{"internalType":"bool","name":"","type":"bool"}],"stateMutability":"view","type":"function"},
            {"inputs":[{"internalType":"address","name":"asset","type":"address"},{"internalType":"uint256","name":"amount","type":"uint256"},{"internalType":"bytes","name":"params","type":"bytes"}],"name":"executeArbitrage","outputs":[],"stateMutability":"nonpayable","type":"function"}
        ]"#,
    )
    .expect("executor ABI must be valid")
});

/// Receipt poll cadence while waiting for inclusion.
const RECEIPT_POLL_MS: u64 = 400;
/// How long the public fallback waits before declaring the attempt stale.
const PUBLIC_WAIT_MS: u64 = 30_000;
/// Low-balance warnings are emitted at most this often.
const BALANCE_WARN_INTERVAL: Duration = Duration::from_secs(300);

/// Terminal pipeline states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecState {
    Confirmed,
    Reverted,
    Stale,
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub state: ExecState,
    pub tx_hash: Option<H256>,
    pub gas_used_wei: u128,
    pub net_profit_usd: f64,
}

impl ExecutionOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == ExecState::Confirmed
    }
}

//================================================================================================//
//                                      NONCE MANAGER                                             //
//================================================================================================//

/// Locally tracked nonce, seeded from the pending count. Writable only by
/// this pipeline.
#[derive(Debug)]
pub struct NonceManager {
    rpc: Arc<dyn ChainRpc>,
    signer: Address,
    next: Mutex<Option<u64>>,
}

impl NonceManager {
    pub fn new(rpc: Arc<dyn ChainRpc>, signer: Address) -> Self {
        Self {
            rpc,
            signer,
            next: Mutex::new(None),
        }
    }

    pub async fn next_nonce(&self) -> Result<u64, ExecutionError> {
        {
            let next = self.next.lock().await;
            if let Some(n) = *next {
                return Ok(n);
            }
        }
        // Query outside the lock; the pipeline is sequential, so a racing
        // double-seed can only agree with itself.
        let seeded = self.rpc.pending_nonce(self.signer).await?;
        let mut next = self.next.lock().await;
        Ok(*next.get_or_insert(seeded))
    }

    pub async fn advance(&self) {
        let mut next = self.next.lock().await;
        if let Some(n) = next.as_mut() {
            *n += 1;
        }
    }

    /// Drops the local view; the next use re-queries the pending count.
    pub async fn reset(&self) {
        let mut next = self.next.lock().await;
        *next = None;
        debug!(target: "execution", "Nonce reset, will reseed from pending count");
    }
}

//================================================================================================//
//                                      RELAY CLIENT                                              //
//================================================================================================//

/// Private relay speaking JSON-RPC `eth_sendBundle`.
#[derive(Debug)]
pub struct RelayClient {
    client: reqwest::Client,
    url: String,
}

impl RelayClient {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            url,
        }
    }

    /// Submits one signed transaction targeting `block_number`.
    pub async fn send_bundle(&self, raw_tx: &Bytes, block_number: u64) -> Result<(), ExecutionError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_sendBundle",
            "params": [{
                "txs": [format!("0x{}", hex::encode(raw_tx))],
                "blockNumber": format!("{:#x}", block_number),
            }],
        });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExecutionError::Relay(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExecutionError::Relay(e.to_string()))?;
        if !status.is_success() {
            return Err(ExecutionError::Relay(format!("{}: {}", status, text)));
        }
        let parsed: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| ExecutionError::Relay(e.to_string()))?;
        if let Some(err) = parsed.get("error") {
            return Err(ExecutionError::Relay(err.to_string()));
        }
        Ok(())
    }
}

//================================================================================================//
//                                      TRADE LOGGER                                              //
//================================================================================================//

/// Append-only trade-record stream, one line per settled trade.
#[derive(Debug)]
pub struct TradeLogger {
    path: std::path::PathBuf,
}

impl TradeLogger {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn append(
        &self,
        opportunity: &ArbOpportunity,
        outcome: &ExecutionOutcome,
    ) -> Result<(), ExecutionError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ExecutionError::TradeLog(e.to_string()))?;
        }
        let line = format!(
            "{} kind={} pair={} expected_usd={:.4} gas_used_wei={} net_usd={:.4} tx={}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            opportunity.strategy,
            opportunity.pair_label(),
            opportunity.profit_usd,
            outcome.gas_used_wei,
            outcome.net_profit_usd,
            outcome
                .tx_hash
                .map(|h| format!("{:#x}", h))
                .unwrap_or_else(|| "-".to_string()),
        );
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| ExecutionError::TradeLog(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| ExecutionError::TradeLog(e.to_string()))?;
        Ok(())
    }
}

//================================================================================================//
//                                       PIPELINE                                                 //
//================================================================================================//

pub struct ExecutionPipeline {
    rpc: Arc<dyn ChainRpc>,
    signer: LocalWallet,
    gas: Arc<GasOracle>,
    risk: Arc<RiskController>,
    registry: Arc<TokenRegistry>,
    settings: ExecutionSettings,
    relay: Option<RelayClient>,
    nonce: NonceManager,
    in_flight: Mutex<bool>,
    trade_log: TradeLogger,
    last_balance_warn: Mutex<Option<std::time::Instant>>,
}

impl ExecutionPipeline {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        signer: LocalWallet,
        gas: Arc<GasOracle>,
        risk: Arc<RiskController>,
        registry: Arc<TokenRegistry>,
        settings: ExecutionSettings,
        relay_url: Option<String>,
    ) -> Self {
        let relay = if settings.enable_private_relay {
            relay_url.map(RelayClient::new)
        } else {
            None
        };
        let signer_address = signer.address();
        Self {
            rpc: rpc.clone(),
            signer,
            gas,
            risk,
            registry,
            settings,
            relay,
            nonce: NonceManager::new(rpc, signer_address),
            in_flight: Mutex::new(false),
            trade_log: TradeLogger::new("./data/trades.log"),
            last_balance_warn: Mutex::new(None),
        }
    }

    /// Runs one opportunity to a terminal state and books the result. Every
    /// terminal path feeds the risk controller and the trade log; no failure
    /// here escapes to the main loop.
    #[instrument(skip(self, opportunity), fields(strategy = %opportunity.strategy, net_usd = opportunity.net_profit_usd))]
    pub async fn execute(&self, opportunity: &ArbOpportunity) -> ExecutionOutcome {
        let outcome = self.run_pipeline(opportunity).await;

        match outcome.state {
            ExecState::Confirmed | ExecState::Reverted => {
                let profit_wei: i128 = if outcome.succeeded() {
                    i128::try_from(opportunity.expected_profit.min(U256::from(u128::MAX)).as_u128())
                        .unwrap_or(i128::MAX)
                } else {
                    -(outcome.gas_used_wei.min(i128::MAX as u128) as i128)
                };
                self.risk.record(profit_wei, outcome.gas_used_wei).await;
                if let Err(e) = self.trade_log.append(opportunity, &outcome).await {
                    warn!(target: "execution", error = %e, "Trade log write failed");
                }
            }
            ExecState::Stale => {
                // Could still land; reset the nonce view so the next cycle
                // reseeds from the chain.
                self.nonce.reset().await;
            }
            ExecState::Rejected(_) => {}
        }
        outcome
    }

    async fn run_pipeline(&self, opportunity: &ArbOpportunity) -> ExecutionOutcome {
        // PREFLIGHT
        if let Err(e) = self.preflight(opportunity).await {
            return rejected(e);
        }

        // ENCODE
        let calldata = match encode_execute_call(opportunity) {
            Ok(c) => c,
            Err(e) => return rejected(e),
        };

        // SIMULATE
        if let Err(e) = self.simulate(&calldata).await {
            return rejected(e);
        }

        // BUILD_TX
        let (raw_tx, tx_hash) = match self.build_and_sign(&calldata, opportunity).await {
            Ok(pair) => pair,
            Err(e) => {
                self.nonce.reset().await;
                return rejected(e);
            }
        };

        {
            let mut in_flight = self.in_flight.lock().await;
            *in_flight = true;
        }
        let outcome = self.submit_and_wait(raw_tx, tx_hash, opportunity).await;
        {
            let mut in_flight = self.in_flight.lock().await;
            *in_flight = false;
        }
        outcome
    }

    async fn preflight(&self, opportunity: &ArbOpportunity) -> Result<(), ExecutionError> {
        if *self.in_flight.lock().await {
            return Err(ExecutionError::Preflight(
                "another submission is in flight".into(),
            ));
        }
        if opportunity.age_millis() > self.settings.max_opportunity_age_ms {
            return Err(ExecutionError::Preflight(format!(
                "opportunity stale ({} ms old)",
                opportunity.age_millis()
            )));
        }

        // Contract paused check fails closed: unreachable means paused.
        match self.executor_paused().await {
            Ok(false) => {}
            Ok(true) => return Err(ExecutionError::Preflight("executor paused".into())),
            Err(e) => {
                return Err(ExecutionError::Preflight(format!(
                    "pause check unreachable: {}",
                    e
                )))
            }
        }

        let gas = self
            .gas
            .current_gas()
            .map_err(|e| ExecutionError::Preflight(format!("gas oracle: {}", e)))?;
        if gas.max_fee_gwei() > self.settings.max_gas_price_gwei {
            return Err(ExecutionError::Preflight(format!(
                "gas {:.4} gwei above cap {:.4}",
                gas.max_fee_gwei(),
                self.settings.max_gas_price_gwei
            )));
        }

        let balance = self.rpc.balance(self.signer.address()).await?;
        if balance < self.settings.min_signer_balance_wei {
            let mut last = self.last_balance_warn.lock().await;
            let due = last
                .map(|at| at.elapsed() >= BALANCE_WARN_INTERVAL)
                .unwrap_or(true);
            if due {
                warn!(
                    target: "execution",
                    balance = %balance,
                    floor = %self.settings.min_signer_balance_wei,
                    "Signer balance below floor"
                );
                *last = Some(std::time::Instant::now());
            }
            return Err(ExecutionError::Preflight("signer balance below floor".into()));
        }
        Ok(())
    }

    async fn executor_paused(&self) -> Result<bool, ExecutionError> {
        let function = EXECUTOR_ABI
            .function("paused")
            .map_err(|e| ExecutionError::Preflight(e.to_string()))?;
        let calldata = function
            .encode_input(&[])
            .map_err(|e| ExecutionError::Preflight(e.to_string()))?;
        let raw = self
            .rpc
            .call(self.settings.contract_address, Bytes::from(calldata))
            .await?;
        match function
            .decode_output(raw.as_ref())
            .map_err(|e| ExecutionError::Preflight(e.to_string()))?
            .into_iter()
            .next()
        {
            Some(Token::Bool(paused)) => Ok(paused),
            _ => Err(ExecutionError::Preflight("bad paused() output".into())),
        }
    }

    async fn simulate(&self, calldata: &Bytes) -> Result<(), ExecutionError> {
        match self
            .rpc
            .call(self.settings.contract_address, calldata.clone())
            .await
        {
            Ok(_) => Ok(()),
            Err(RpcError::Revert(reason)) => Err(ExecutionError::SimulationRevert(reason)),
            Err(e) => Err(e.into()),
        }
    }

    async fn build_and_sign(
        &self,
        calldata: &Bytes,
        opportunity: &ArbOpportunity,
    ) -> Result<(Bytes, H256), ExecutionError> {
        let gas = self
            .gas
            .current_gas()
            .map_err(|e| ExecutionError::Signing(format!("gas oracle: {}", e)))?;
        let nonce = self.nonce.next_nonce().await?;

        let gas_limit = opportunity
            .gas_estimate
            .saturating_mul(12)
            .checked_div(10)
            .unwrap_or(gas.gas_limit)
            .max(gas.gas_limit);

        let request = Eip1559TransactionRequest::new()
            .to(self.settings.contract_address)
            .data(calldata.clone())
            .nonce(nonce)
            .gas(gas_limit)
            .max_fee_per_gas(gas.max_fee)
            .max_priority_fee_per_gas(gas.priority_fee)
            .chain_id(CHAIN_ID);
        let typed: TypedTransaction = request.into();

        let signature = self
            .signer
            .sign_transaction(&typed)
            .await
            .map_err(|e| ExecutionError::Signing(e.to_string()))?;
        let raw = typed.rlp_signed(&signature);
        let hash = H256::from(ethers::utils::keccak256(&raw));
        Ok((raw, hash))
    }

    /// SUBMIT_PRIVATE → WAIT → (fallback) SUBMIT_PUBLIC → WAIT.
    async fn submit_and_wait(
        &self,
        raw_tx: Bytes,
        tx_hash: H256,
        opportunity: &ArbOpportunity,
    ) -> ExecutionOutcome {
        let mut nonce_advanced = false;
        if let Some(relay) = &self.relay {
            let target_block = match self.rpc.block_number().await {
                Ok(n) => n + 1,
                Err(_) => 0,
            };
            if target_block > 0 {
                match relay.send_bundle(&raw_tx, target_block).await {
                    Ok(()) => {
                        info!(target: "execution", tx = %format!("{:#x}", tx_hash), target_block, "Bundle submitted to private relay");
                        self.nonce.advance().await;
                        nonce_advanced = true;
                        if let Some(outcome) = self
                            .wait_for_receipt(tx_hash, self.settings.confirmation_wait_ms, opportunity)
                            .await
                        {
                            return outcome;
                        }
                        debug!(target: "execution", "No private inclusion within one block, falling back to public");
                        // The same signed tx (same nonce) goes public; the
                        // relay copy cannot double-execute.
                    }
                    Err(e) => {
                        warn!(target: "execution", error = %e, "Relay submission failed, falling back to public");
                    }
                }
            }
        }

        match self.rpc.send_raw_transaction(raw_tx.clone()).await {
            Ok(hash) => {
                info!(target: "execution", tx = %format!("{:#x}", hash), "Submitted to public mempool");
                if !nonce_advanced {
                    self.nonce.advance().await;
                }
                match self
                    .wait_for_receipt(hash, PUBLIC_WAIT_MS, opportunity)
                    .await
                {
                    Some(outcome) => outcome,
                    None => ExecutionOutcome {
                        state: ExecState::Stale,
                        tx_hash: Some(hash),
                        gas_used_wei: 0,
                        net_profit_usd: 0.0,
                    },
                }
            }
            Err(e) => {
                let text = e.to_string();
                if text.contains("nonce") || text.contains("already known") {
                    // Either our private copy landed or the nonce view is
                    // stale; reseed and let the next cycle retry.
                    self.nonce.reset().await;
                    ExecutionOutcome {
                        state: ExecState::Stale,
                        tx_hash: Some(tx_hash),
                        gas_used_wei: 0,
                        net_profit_usd: 0.0,
                    }
                } else {
                    rejected(ExecutionError::Submission(text))
                }
            }
        }
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        timeout_ms: u64,
        opportunity: &ArbOpportunity,
    ) -> Option<ExecutionOutcome> {
        let deadline = std::time::Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if let Ok(Some(receipt)) = self.rpc.transaction_receipt(tx_hash).await {
                let gas_used_wei = receipt
                    .gas_used
                    .unwrap_or_default()
                    .saturating_mul(receipt.effective_gas_price.unwrap_or_default())
                    .min(U256::from(u128::MAX))
                    .as_u128();
                let confirmed = receipt.status.map(|s| s.as_u64() == 1).unwrap_or(false);
                let net_profit_usd = if confirmed {
                    opportunity.net_profit_usd
                } else {
                    // A revert costs exactly its gas.
                    -(normalize_units(U256::from(gas_used_wei), 18) * self.registry.eth_usd().await)
                };
                return Some(ExecutionOutcome {
                    state: if confirmed {
                        ExecState::Confirmed
                    } else {
                        ExecState::Reverted
                    },
                    tx_hash: Some(tx_hash),
                    gas_used_wei,
                    net_profit_usd,
                });
            }
            if std::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(RECEIPT_POLL_MS)).await;
        }
    }

    /// Cooperative shutdown: refuse new work upstream, then wait for any
    /// in-flight submission to reach a terminal state.
    pub async fn drain(&self) {
        let deadline =
            std::time::Instant::now() + Duration::from_millis(self.settings.shutdown_drain_ms);
        loop {
            if !*self.in_flight.lock().await {
                return;
            }
            if std::time::Instant::now() >= deadline {
                warn!(target: "execution", "Drain timeout with submission still in flight");
                return;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    pub async fn reset_nonce(&self) {
        self.nonce.reset().await;
    }
}

fn rejected(err: ExecutionError) -> ExecutionOutcome {
    debug!(target: "execution", error = %err, "Opportunity rejected");
    ExecutionOutcome {
        state: ExecState::Rejected(err.to_string()),
        tx_hash: None,
        gas_used_wei: 0,
        net_profit_usd: 0.0,
    }
}

impl std::fmt::Debug for ExecutionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPipeline")
            .field("signer", &self.signer.address())
            .field("relay", &self.relay.is_some())
            .finish()
    }
}

//================================================================================================//
//                                       ENCODING                                                 //
//================================================================================================//

/// Builds the `executeArbitrage(asset, amount, params)` calldata. The params
/// blob is the leg list plus the policy block, ABI-encoded as one opaque
/// `bytes` the contract decodes.
pub fn encode_execute_call(opportunity: &ArbOpportunity) -> Result<Bytes, ExecutionError> {
    if opportunity.legs.is_empty() {
        return Err(ExecutionError::Preflight("no legs".into()));
    }
    let first = &opportunity.legs[0];
    let last = opportunity
        .legs
        .last()
        .ok_or_else(|| ExecutionError::Preflight("no legs".into()))?;
    if first.token_in != opportunity.borrow_asset {
        return Err(ExecutionError::Preflight(
            "first leg must spend the borrow asset".into(),
        ));
    }
    if last.token_out != opportunity.borrow_asset {
        return Err(ExecutionError::Preflight(
            "last leg must return the borrow asset".into(),
        ));
    }

    let leg_tokens: Vec<Token> = opportunity
        .legs
        .iter()
        .map(|leg| {
            Token::Tuple(vec![
                Token::String(leg.venue_id.clone()),
                Token::Address(leg.token_in),
                Token::Address(leg.token_out),
                Token::Uint(leg.amount_in),
                Token::Uint(leg.amount_out_min),
                Token::Bytes(leg.venue_extra_data.to_vec()),
            ])
        })
        .collect();

    // Policy block: minimum profit the contract enforces, and whether legs
    // after the first consume the running balance.
    let use_balance_diff = opportunity.legs.iter().skip(1).all(|l| l.amount_in == USE_BALANCE);
    let params = ethers::abi::encode(&[
        Token::Array(leg_tokens),
        Token::Tuple(vec![
            Token::Uint(opportunity.expected_profit / U256::from(2)),
            Token::Bool(use_balance_diff),
        ]),
    ]);

    let function = EXECUTOR_ABI
        .function("executeArbitrage")
        .map_err(|e| ExecutionError::Preflight(e.to_string()))?;
    let calldata = function
        .encode_input(&[
            Token::Address(opportunity.borrow_asset),
            Token::Uint(opportunity.borrow_amount),
            Token::Bytes(params),
        ])
        .map_err(|e| ExecutionError::Preflight(e.to_string()))?;
    Ok(Bytes::from(calldata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{now_millis, StrategyKind, SwapLeg};
    use smallvec::smallvec;

    fn leg(token_in: Address, token_out: Address, amount_in: U256) -> SwapLeg {
        SwapLeg {
            venue_id: "uniswap_v3".into(),
            token_in,
            token_out,
            amount_in,
            expected_amount_out: U256::exp10(18),
            amount_out_min: U256::exp10(18),
            fee_or_tick_spacing: 500,
            venue_extra_data: Bytes::new(),
        }
    }

    fn opportunity(legs: smallvec::SmallVec<[SwapLeg; 3]>, borrow_asset: Address) -> ArbOpportunity {
        ArbOpportunity {
            strategy: StrategyKind::Direct,
            borrow_asset,
            borrow_amount: U256::exp10(18),
            legs,
            expected_profit: U256::exp10(16),
            profit_bps: 100,
            profit_usd: 25.0,
            gas_estimate: 350_000,
            gas_cost_usd: 0.10,
            net_profit_usd: 24.9,
            pool_floor_usd: 100_000.0,
            created_millis: now_millis(),
        }
    }

    #[test]
    fn encode_rejects_open_loops() {
        let weth = Address::from_low_u64_be(1);
        let usdc = Address::from_low_u64_be(2);
        let dai = Address::from_low_u64_be(3);

        let open = opportunity(
            smallvec![leg(weth, usdc, U256::exp10(18)), leg(usdc, dai, USE_BALANCE)],
            weth,
        );
        assert!(encode_execute_call(&open).is_err());

        let wrong_start = opportunity(
            smallvec![leg(usdc, weth, U256::exp10(18)), leg(weth, usdc, USE_BALANCE)],
            weth,
        );
        assert!(encode_execute_call(&wrong_start).is_err());
    }

    #[test]
    fn encode_produces_executor_calldata() {
        let weth = Address::from_low_u64_be(1);
        let usdc = Address::from_low_u64_be(2);
        let opp = opportunity(
            smallvec![leg(weth, usdc, U256::exp10(18)), leg(usdc, weth, USE_BALANCE)],
            weth,
        );
        let calldata = encode_execute_call(&opp).unwrap();
        let selector = &EXECUTOR_ABI.function("executeArbitrage").unwrap().short_signature();
        assert_eq!(&calldata[0..4], selector);
        assert!(calldata.len() > 4 + 32 * 3);
    }

    #[test]
    fn encode_requires_at_least_one_leg() {
        let weth = Address::from_low_u64_be(1);
        let opp = opportunity(smallvec![], weth);
        assert!(encode_execute_call(&opp).is_err());
    }
}
