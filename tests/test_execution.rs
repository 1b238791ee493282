// tests/test_execution.rs

//! Execution-pipeline scenarios against the mock transport: nonce recovery
//! after a "nonce too low" rejection, preflight age and balance gates.

mod common;

use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use ethers::abi::Token;
use ethers::signers::LocalWallet;
use ethers::types::{Address, Bytes, H256, U256};
use smallvec::smallvec;

use basisbot::config::{ExecutionSettings, RiskSettings};
use basisbot::execution::{ExecState, ExecutionPipeline};
use basisbot::gas::GasOracle;
use basisbot::risk::RiskController;
use basisbot::tokens::{well_known, TokenRegistry};
use basisbot::types::{now_millis, ArbOpportunity, StrategyKind, SwapLeg, USE_BALANCE};

use common::MockChainRpc;

const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

fn contract() -> Address {
    Address::from_low_u64_be(0xC0)
}

fn exec_settings() -> ExecutionSettings {
    ExecutionSettings {
        contract_address: contract(),
        max_gas_price_gwei: 50.0,
        enable_private_relay: false,
        max_opportunity_age_ms: 5_000,
        min_signer_balance_wei: ethers::utils::parse_ether(0.01).unwrap(),
        confirmation_wait_ms: 2_000,
        shutdown_drain_ms: 1_000,
    }
}

fn risk_settings() -> RiskSettings {
    RiskSettings {
        enable_circuit_breaker: true,
        max_trades_per_hour: 100,
        max_drawdown_eth: 5.0,
        min_pool_liquidity_usd: 10_000.0,
    }
}

/// Handler serving the executor contract: `paused()` is false, simulation
/// succeeds.
fn executor_handler() -> common::CallHandler {
    let target = contract();
    Box::new(move |to, data| {
        if to == target && data.len() >= 4 {
            // paused() selector is 0x5c975abb.
            if data[0..4] == [0x5c, 0x97, 0x5a, 0xbb] {
                return Ok(Bytes::from(ethers::abi::encode(&[Token::Bool(false)])));
            }
            return Ok(Bytes::new());
        }
        Ok(Bytes::new())
    })
}

fn two_leg_opportunity(age_ms: u64) -> ArbOpportunity {
    let weth = *well_known::WETH;
    let usdc = *well_known::USDC;
    let borrow = U256::exp10(18) * U256::from(10u64);
    let leg = |token_in, token_out, amount_in| SwapLeg {
        venue_id: "uniswap_v3".into(),
        token_in,
        token_out,
        amount_in,
        expected_amount_out: U256::exp10(18),
        amount_out_min: U256::exp10(18),
        fee_or_tick_spacing: 500,
        venue_extra_data: Bytes::new(),
    };
    ArbOpportunity {
        strategy: StrategyKind::Direct,
        borrow_asset: weth,
        borrow_amount: borrow,
        legs: smallvec![leg(weth, usdc, borrow), leg(usdc, weth, USE_BALANCE)],
        expected_profit: U256::from(15_000_000_000_000_000u128),
        profit_bps: 15,
        profit_usd: 37.5,
        gas_estimate: 400_000,
        gas_cost_usd: 0.10,
        net_profit_usd: 37.4,
        pool_floor_usd: 1_000_000.0,
        created_millis: now_millis().saturating_sub(age_ms),
    }
}

fn pipeline_over(rpc: Arc<MockChainRpc>) -> ExecutionPipeline {
    let wallet = LocalWallet::from_str(TEST_KEY).expect("test key");
    let gas = Arc::new(GasOracle::new());
    gas.observe_block(
        U256::from(1_000_000_000u64), // 1 gwei
        U256::from(15_000_000u64),
        U256::from(30_000_000u64),
    );
    let registry = Arc::new(TokenRegistry::new(rpc.clone(), 2_500.0, 60_000.0));
    ExecutionPipeline::new(
        rpc,
        wallet,
        gas,
        Arc::new(RiskController::new(risk_settings())),
        registry,
        exec_settings(),
        None,
    )
}

#[tokio::test]
async fn nonce_too_low_goes_stale_then_recovers() {
    let rpc = Arc::new(MockChainRpc::with_handler(executor_handler()));
    rpc.push_nonce(42);
    rpc.push_send_result(Err("nonce too low"));

    let pipeline = pipeline_over(rpc.clone());
    let outcome = pipeline.execute(&two_leg_opportunity(0)).await;
    assert_eq!(outcome.state, ExecState::Stale);
    assert_eq!(rpc.nonce_queries.load(Ordering::Relaxed), 1);

    // Chain has moved on: pending count is now 43 and submission lands.
    rpc.pending_nonces.lock().unwrap().clear();
    rpc.push_nonce(43);
    let hash = H256::from_low_u64_be(0xBEEF);
    rpc.push_send_result(Ok(hash));
    rpc.insert_receipt(hash, 1, 380_000, 1_000_000_000);

    let outcome = pipeline.execute(&two_leg_opportunity(0)).await;
    assert_eq!(outcome.state, ExecState::Confirmed);
    assert_eq!(outcome.tx_hash, Some(hash));
    // The stale attempt reset the local nonce, so the pending count was
    // queried again.
    assert_eq!(rpc.nonce_queries.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn reverted_submission_is_recorded_as_a_loss() {
    let rpc = Arc::new(MockChainRpc::with_handler(executor_handler()));
    rpc.push_nonce(7);
    let hash = H256::from_low_u64_be(0xFA11);
    rpc.push_send_result(Ok(hash));
    rpc.insert_receipt(hash, 0, 380_000, 1_000_000_000);

    let pipeline = pipeline_over(rpc);
    let outcome = pipeline.execute(&two_leg_opportunity(0)).await;
    assert_eq!(outcome.state, ExecState::Reverted);
    assert_eq!(outcome.gas_used_wei, 380_000u128 * 1_000_000_000u128);
    assert!(outcome.net_profit_usd < 0.0, "a revert books as a loss");
}

#[tokio::test]
async fn stale_opportunities_are_rejected_in_preflight() {
    let rpc = Arc::new(MockChainRpc::with_handler(executor_handler()));
    rpc.push_nonce(1);
    let pipeline = pipeline_over(rpc.clone());

    let outcome = pipeline.execute(&two_leg_opportunity(6_000)).await;
    match outcome.state {
        ExecState::Rejected(reason) => assert!(reason.contains("stale")),
        other => panic!("expected rejection, got {:?}", other),
    }
    // Rejected before any submission was attempted.
    assert!(rpc.send_results.lock().unwrap().len() == 0);
}

#[tokio::test]
async fn low_signer_balance_is_rejected_in_preflight() {
    let rpc = Arc::new(MockChainRpc::with_handler(executor_handler()));
    rpc.push_nonce(1);
    let wallet = LocalWallet::from_str(TEST_KEY).expect("test key");
    let signer_address = ethers::signers::Signer::address(&wallet);
    rpc.set_balance(signer_address, U256::from(1u64));

    let pipeline = pipeline_over(rpc);
    let outcome = pipeline.execute(&two_leg_opportunity(0)).await;
    match outcome.state {
        ExecState::Rejected(reason) => assert!(reason.contains("balance")),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn gas_above_cap_is_rejected_in_preflight() {
    let rpc = Arc::new(MockChainRpc::with_handler(executor_handler()));
    rpc.push_nonce(1);
    let wallet = LocalWallet::from_str(TEST_KEY).expect("test key");
    let gas = Arc::new(GasOracle::new());
    // 400 gwei base fee, far above the 50 gwei cap.
    gas.observe_block(
        U256::from(400_000_000_000u64),
        U256::from(15_000_000u64),
        U256::from(30_000_000u64),
    );
    let registry = Arc::new(TokenRegistry::new(rpc.clone(), 2_500.0, 60_000.0));
    let pipeline = ExecutionPipeline::new(
        rpc,
        wallet,
        gas,
        Arc::new(RiskController::new(risk_settings())),
        registry,
        exec_settings(),
        None,
    );

    let outcome = pipeline.execute(&two_leg_opportunity(0)).await;
    match outcome.state {
        ExecState::Rejected(reason) => assert!(reason.contains("gas")),
        other => panic!("expected rejection, got {:?}", other),
    }
}
