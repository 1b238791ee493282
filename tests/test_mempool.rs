// tests/test_mempool.rs

//! Pending-swap decoding against the router ABIs and the advisory MEV
//! heuristics.

mod common;

use std::str::FromStr;
use std::sync::Arc;

use ethers::abi::Token;
use ethers::types::{Address, Bytes, Transaction, H256, U256};

use basisbot::mempool::{decode_pending_swap, normalize_push_url};
use basisbot::tokens::{well_known, TokenRegistry};

use common::MockChainRpc;

const UNISWAP_ROUTER: &str = "0x2626664c2603336e57b271c5c0b26f421741e481";

fn registry() -> TokenRegistry {
    TokenRegistry::new(Arc::new(MockChainRpc::default()), 2_500.0, 60_000.0)
}

fn tx_to(router: &str, input: Vec<u8>) -> Transaction {
    Transaction {
        hash: H256::from_low_u64_be(0xAB),
        from: Address::from_low_u64_be(0x5E11E4),
        to: Some(Address::from_str(router).unwrap()),
        input: Bytes::from(input),
        ..Default::default()
    }
}

fn v2_swap_input(amount_in: U256, amount_out_min: U256, path: Vec<Address>) -> Vec<u8> {
    let mut input = vec![0x38, 0xed, 0x17, 0x39];
    input.extend(ethers::abi::encode(&[
        Token::Uint(amount_in),
        Token::Uint(amount_out_min),
        Token::Array(path.into_iter().map(Token::Address).collect()),
        Token::Address(Address::from_low_u64_be(0xCAFE)),
        Token::Uint(U256::from(u64::MAX)),
    ]));
    input
}

fn exact_input_single_input(token_in: Address, token_out: Address, amount_in: U256) -> Vec<u8> {
    let mut input = vec![0x41, 0x4b, 0xf3, 0x89];
    input.extend(ethers::abi::encode(&[Token::Tuple(vec![
        Token::Address(token_in),
        Token::Address(token_out),
        Token::Uint(U256::from(500u64)),
        Token::Address(Address::from_low_u64_be(0xCAFE)),
        Token::Uint(U256::from(u64::MAX)),
        Token::Uint(amount_in),
        Token::Uint(U256::from(1u64)),
        Token::Uint(U256::zero()),
    ])]));
    input
}

#[test]
fn decodes_v2_router_swaps() {
    let registry = registry();
    let amount = U256::exp10(18) * U256::from(4u64);
    let tx = tx_to(
        UNISWAP_ROUTER,
        v2_swap_input(
            amount,
            U256::from(9_900_000_000u64),
            vec![*well_known::WETH, *well_known::USDC],
        ),
    );

    let swap = decode_pending_swap(&tx, &registry).expect("decodable v2 swap");
    assert_eq!(swap.token_in, *well_known::WETH);
    assert_eq!(swap.token_out, *well_known::USDC);
    assert_eq!(swap.amount_in, amount);
    assert_eq!(swap.amount_out_min, U256::from(9_900_000_000u64));
    // 4 WETH at the seeded $2500.
    assert!((swap.value_usd - 10_000.0).abs() < 1e-6);
}

#[test]
fn decodes_v3_exact_input_single() {
    let registry = registry();
    let amount = U256::exp10(18);
    let tx = tx_to(
        UNISWAP_ROUTER,
        exact_input_single_input(*well_known::WETH, *well_known::USDC, amount),
    );

    let swap = decode_pending_swap(&tx, &registry).expect("decodable v3 swap");
    assert_eq!(swap.token_in, *well_known::WETH);
    assert_eq!(swap.token_out, *well_known::USDC);
    assert_eq!(swap.amount_in, amount);
}

#[test]
fn decodes_v3_exact_input_packed_path() {
    let registry = registry();
    // path = WETH ‖ fee(500) ‖ USDC
    let mut path = well_known::WETH.as_bytes().to_vec();
    path.extend_from_slice(&[0x00, 0x01, 0xf4]);
    path.extend_from_slice(well_known::USDC.as_bytes());

    let mut input = vec![0xc0, 0x4b, 0x8d, 0x59];
    input.extend(ethers::abi::encode(&[Token::Tuple(vec![
        Token::Bytes(path),
        Token::Address(Address::from_low_u64_be(0xCAFE)),
        Token::Uint(U256::from(u64::MAX)),
        Token::Uint(U256::exp10(18)),
        Token::Uint(U256::from(1u64)),
    ])]));
    let tx = tx_to(UNISWAP_ROUTER, input);

    let swap = decode_pending_swap(&tx, &registry).expect("decodable path swap");
    assert_eq!(swap.token_in, *well_known::WETH);
    assert_eq!(swap.token_out, *well_known::USDC);
}

#[test]
fn ignores_unknown_routers_and_selectors() {
    let registry = registry();

    let to_unknown = tx_to(
        "0x00000000000000000000000000000000000000aa",
        v2_swap_input(
            U256::exp10(18),
            U256::one(),
            vec![*well_known::WETH, *well_known::USDC],
        ),
    );
    assert!(decode_pending_swap(&to_unknown, &registry).is_none());

    let bad_selector = tx_to(UNISWAP_ROUTER, vec![0xde, 0xad, 0xbe, 0xef, 0x00]);
    assert!(decode_pending_swap(&bad_selector, &registry).is_none());

    let no_calldata = tx_to(UNISWAP_ROUTER, vec![]);
    assert!(decode_pending_swap(&no_calldata, &registry).is_none());
}

#[tokio::test]
async fn large_pending_swaps_raise_recommended_slippage() {
    use basisbot::config::MempoolSettings;
    use basisbot::mempool::MempoolObserver;
    use tokio_util::sync::CancellationToken;

    let settings = MempoolSettings {
        push_url: None,
        connect_timeout_ms: 15_000,
        backoff_initial_ms: 5_000,
        backoff_factor: 1.5,
        backoff_cap_ms: 60_000,
        max_attempts: 10,
        max_attempts_rate_limited: 20,
    };
    let registry = Arc::new(registry());
    let observer = MempoolObserver::new(settings, registry.clone(), CancellationToken::new());
    let heuristics = observer.heuristics();

    let calm = heuristics.advice(30).await;
    assert!(!calm.raise_slippage);
    assert_eq!(calm.recommended_slippage_bps, 30);

    // A 40 WETH pending swap is a $100k move.
    let tx = tx_to(
        UNISWAP_ROUTER,
        v2_swap_input(
            U256::exp10(18) * U256::from(40u64),
            U256::one(),
            vec![*well_known::WETH, *well_known::USDC],
        ),
    );
    let swap = decode_pending_swap(&tx, &registry).unwrap();
    heuristics.observe(&swap).await;

    let hostile = heuristics.advice(30).await;
    assert!(hostile.raise_slippage);
    assert_eq!(hostile.recommended_slippage_bps, 60);
    assert!(hostile.use_private_relay);
}

#[test]
fn push_urls_normalize_to_websocket_schemes() {
    assert_eq!(
        normalize_push_url("https://mainnet.base.org").unwrap(),
        "wss://mainnet.base.org"
    );
    assert!(normalize_push_url("tcp://nope").is_err());
}
