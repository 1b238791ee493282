// src/mempool.rs

//! # Mempool Observer
//!
//! Watches pending transactions over the push endpoint, decodes swaps aimed
//! at known routers and publishes [`PendingSwap`] events; pool-level
//! Swap/Sync subscriptions publish [`PoolUpdate`]s. Everything here is
//! advisory: subscribers consume from broadcast channels, callbacks never run
//! engine logic, and a dead subscription only costs the engine its early
//! warning, never its main loop.

use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ethers::abi::{decode as abi_decode, ParamType, Token};
use ethers::providers::{Middleware, Provider, Ws};
use futures_util::StreamExt;
use ethers::types::{Address, Transaction, H256, U256};
use once_cell::sync::Lazy;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MempoolSettings;
use crate::errors::MempoolError;
use crate::tokens::TokenRegistry;
use crate::types::{now_millis, MevAdvice, PendingSwap, PoolUpdate};

/// Routers whose calldata the observer can decode.
static KNOWN_ROUTERS: Lazy<HashSet<Address>> = Lazy::new(|| {
    [
        // Uniswap SwapRouter02
        "0x2626664c2603336e57b271c5c0b26f421741e481",
        // Aerodrome router
        "0xcf77a3ba9a5ca399b7c97c74d54e5b1beb874e43",
        // BaseSwap router
        "0x327df1e6de05895d2ab08513aadd9313fe505d86",
        // SushiSwap router
        "0x6bded42c6da8fbf0d2ba55b2fa120c5e0c8d7891",
    ]
    .iter()
    .map(|s| Address::from_str(s).expect("router address"))
    .collect()
});

const SEL_SWAP_EXACT_TOKENS: [u8; 4] = [0x38, 0xed, 0x17, 0x39]; // swapExactTokensForTokens
const SEL_SWAP_EXACT_TOKENS_FEE: [u8; 4] = [0x5c, 0x11, 0xd7, 0x95]; // ...SupportingFeeOnTransferTokens
const SEL_EXACT_INPUT_SINGLE: [u8; 4] = [0x41, 0x4b, 0xf3, 0x89]; // exactInputSingle
const SEL_EXACT_INPUT: [u8; 4] = [0xc0, 0x4b, 0x8d, 0x59]; // exactInput

/// Pending-swap value above which the sender is treated as a whale move.
const LARGE_SWAP_USD: f64 = 50_000.0;
/// Senders seen this many times bracketing swaps are flagged as arb bots.
const REPEAT_CALLER_THRESHOLD: u32 = 3;
/// Sliding window of decoded swaps kept for sandwich detection.
const RECENT_WINDOW: usize = 256;

pub struct MempoolObserver {
    settings: MempoolSettings,
    registry: Arc<TokenRegistry>,
    swap_tx: broadcast::Sender<PendingSwap>,
    pool_tx: broadcast::Sender<PoolUpdate>,
    cancel: CancellationToken,
    heuristics: Arc<MevHeuristics>,
    fetch_semaphore: Arc<Semaphore>,
}

impl MempoolObserver {
    pub fn new(
        settings: MempoolSettings,
        registry: Arc<TokenRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        let (swap_tx, _) = broadcast::channel(1_024);
        let (pool_tx, _) = broadcast::channel(1_024);
        Self {
            settings,
            registry,
            swap_tx,
            pool_tx,
            cancel,
            heuristics: Arc::new(MevHeuristics::new()),
            fetch_semaphore: Arc::new(Semaphore::new(16)),
        }
    }

    pub fn subscribe_swaps(&self) -> broadcast::Receiver<PendingSwap> {
        self.swap_tx.subscribe()
    }

    pub fn subscribe_pool_updates(&self) -> broadcast::Receiver<PoolUpdate> {
        self.pool_tx.subscribe()
    }

    pub fn heuristics(&self) -> Arc<MevHeuristics> {
        self.heuristics.clone()
    }

    /// Spawns the observation task. Without a push endpoint this is a no-op;
    /// the engine runs fine without the pending-tx signal.
    pub fn start(self: Arc<Self>, watched_pools: Vec<Address>) {
        let Some(url) = self.settings.push_url.clone() else {
            info!(target: "mempool", "No push endpoint configured, observer disabled");
            return;
        };
        let url = match normalize_push_url(&url) {
            Ok(u) => u,
            Err(e) => {
                warn!(target: "mempool", error = %e, "Bad push endpoint, observer disabled");
                return;
            }
        };
        tokio::spawn(async move {
            self.run(url, watched_pools).await;
        });
    }

    /// Connect-subscribe-drain loop with exponential backoff. Rate-limit
    /// errors raise the attempt cap rather than giving up sooner.
    async fn run(self: Arc<Self>, url: String, watched_pools: Vec<Address>) {
        let mut attempt = 0u32;
        let mut max_attempts = self.settings.max_attempts;
        let mut delay = Duration::from_millis(self.settings.backoff_initial_ms);

        loop {
            if self.cancel.is_cancelled() || attempt >= max_attempts {
                info!(target: "mempool", attempt, "Observer stopped");
                return;
            }

            match self.connect_and_stream(&url, &watched_pools).await {
                Ok(()) => {
                    // Clean termination only happens on shutdown.
                    return;
                }
                Err(e) => {
                    attempt += 1;
                    if is_rate_limited(&e) {
                        max_attempts = self.settings.max_attempts_rate_limited;
                    }
                    warn!(
                        target: "mempool",
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Subscription lost, reconnecting"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => return,
                    }
                    let next = (delay.as_millis() as f64 * self.settings.backoff_factor) as u64;
                    delay = Duration::from_millis(next.min(self.settings.backoff_cap_ms));
                }
            }
        }
    }

    async fn connect_and_stream(
        &self,
        url: &str,
        watched_pools: &[Address],
    ) -> Result<(), MempoolError> {
        let connect = Provider::<Ws>::connect(url);
        let provider = tokio::time::timeout(
            Duration::from_millis(self.settings.connect_timeout_ms),
            connect,
        )
        .await
        .map_err(|_| MempoolError::Connect("connect timeout".into()))?
        .map_err(|e| MempoolError::Connect(e.to_string()))?;
        let provider = Arc::new(provider);
        info!(target: "mempool", url, "Push subscription established");

        let mut pending = provider
            .subscribe_pending_txs()
            .await
            .map_err(|e| MempoolError::Connect(e.to_string()))?;

        // Pool event stream runs beside the pending stream on the same
        // connection.
        if !watched_pools.is_empty() {
            let filter = ethers::types::Filter::new().address(watched_pools.to_vec());
            let provider_logs = provider.clone();
            let pool_tx = self.pool_tx.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                let Ok(mut stream) = provider_logs.subscribe_logs(&filter).await else {
                    warn!(target: "mempool", "Pool log subscription failed");
                    return;
                };
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        log = stream.next() => {
                            let Some(log) = log else { return };
                            let update = PoolUpdate {
                                pool_address: log.address,
                                block_number: log.block_number.map(|b| b.as_u64()).unwrap_or(0),
                                tx_hash: log.transaction_hash.unwrap_or_default(),
                            };
                            let _ = pool_tx.send(update);
                        }
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!(target: "mempool", "Observer shutting down, draining subscription");
                    return Ok(());
                }
                hash = pending.next() => {
                    let Some(hash) = hash else {
                        return Err(MempoolError::Closed("pending-tx stream ended".into()));
                    };
                    self.spawn_decode(provider.clone(), hash);
                }
            }
        }
    }

    /// Hash → full transaction → decode, off the stream task so a slow
    /// `eth_getTransaction` never backs up the subscription.
    fn spawn_decode(&self, provider: Arc<Provider<Ws>>, hash: H256) {
        let semaphore = self.fetch_semaphore.clone();
        let registry = self.registry.clone();
        let swap_tx = self.swap_tx.clone();
        let heuristics = self.heuristics.clone();
        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else { return };
            let Ok(Some(tx)) = provider.get_transaction(hash).await else {
                return;
            };
            let Some(swap) = decode_pending_swap(&tx, &registry) else {
                return;
            };
            heuristics.observe(&swap).await;
            // Dropped sends just mean nobody is listening right now.
            let _ = swap_tx.send(swap);
        });
    }
}

fn is_rate_limited(err: &MempoolError) -> bool {
    err.to_string().contains("429")
}

/// `http(s)` endpoints are accepted and rewritten to their `ws(s)`
/// equivalents.
pub fn normalize_push_url(url: &str) -> Result<String, MempoolError> {
    let url = url.trim();
    if url.starts_with("ws://") || url.starts_with("wss://") {
        Ok(url.to_string())
    } else if let Some(rest) = url.strip_prefix("https://") {
        Ok(format!("wss://{}", rest))
    } else if let Some(rest) = url.strip_prefix("http://") {
        Ok(format!("ws://{}", rest))
    } else {
        Err(MempoolError::InvalidEndpoint(url.to_string()))
    }
}

/// Decodes a pending transaction against the router ABIs in scope. `None`
/// for anything that is not a recognizable swap.
pub fn decode_pending_swap(tx: &Transaction, registry: &TokenRegistry) -> Option<PendingSwap> {
    let to = tx.to?;
    if !KNOWN_ROUTERS.contains(&to) {
        return None;
    }
    let input = tx.input.as_ref();
    if input.len() < 4 {
        return None;
    }
    let selector = [input[0], input[1], input[2], input[3]];
    let payload = &input[4..];

    let (token_in, token_out, amount_in, amount_out_min) = match selector {
        SEL_SWAP_EXACT_TOKENS | SEL_SWAP_EXACT_TOKENS_FEE => {
            let tokens = abi_decode(
                &[
                    ParamType::Uint(256),
                    ParamType::Uint(256),
                    ParamType::Array(Box::new(ParamType::Address)),
                    ParamType::Address,
                    ParamType::Uint(256),
                ],
                payload,
            )
            .ok()?;
            let amount_in = as_uint(tokens.first())?;
            let amount_out_min = as_uint(tokens.get(1))?;
            let path = match tokens.get(2) {
                Some(Token::Array(path)) => path,
                _ => return None,
            };
            let first = as_address(path.first())?;
            let last = as_address(path.last())?;
            (first, last, amount_in, amount_out_min)
        }
        SEL_EXACT_INPUT_SINGLE => {
            let tokens = abi_decode(
                &[ParamType::Tuple(vec![
                    ParamType::Address,
                    ParamType::Address,
                    ParamType::Uint(24),
                    ParamType::Address,
                    ParamType::Uint(256),
                    ParamType::Uint(256),
                    ParamType::Uint(256),
                    ParamType::Uint(160),
                ])],
                payload,
            )
            .ok()?;
            let fields = match tokens.into_iter().next() {
                Some(Token::Tuple(fields)) => fields,
                _ => return None,
            };
            let token_in = as_address(fields.first())?;
            let token_out = as_address(fields.get(1))?;
            let amount_in = as_uint(fields.get(5))?;
            let amount_out_min = as_uint(fields.get(6))?;
            (token_in, token_out, amount_in, amount_out_min)
        }
        SEL_EXACT_INPUT => {
            let tokens = abi_decode(
                &[ParamType::Tuple(vec![
                    ParamType::Bytes,
                    ParamType::Address,
                    ParamType::Uint(256),
                    ParamType::Uint(256),
                    ParamType::Uint(256),
                ])],
                payload,
            )
            .ok()?;
            let fields = match tokens.into_iter().next() {
                Some(Token::Tuple(fields)) => fields,
                _ => return None,
            };
            let path = match fields.first() {
                Some(Token::Bytes(path)) => path.clone(),
                _ => return None,
            };
            // Packed path: token(20) ‖ fee(3) ‖ token(20) ‖ …
            if path.len() < 43 {
                return None;
            }
            let token_in = Address::from_slice(&path[0..20]);
            let token_out = Address::from_slice(&path[path.len() - 20..]);
            let amount_in = as_uint(fields.get(3))?;
            let amount_out_min = as_uint(fields.get(4))?;
            (token_in, token_out, amount_in, amount_out_min)
        }
        _ => return None,
    };

    Some(PendingSwap {
        tx_hash: tx.hash,
        sender: tx.from,
        router: to,
        token_in,
        token_out,
        amount_in,
        amount_out_min,
        value_usd: registry.value_usd(token_in, amount_in),
        seen_millis: now_millis(),
    })
}

fn as_uint(token: Option<&Token>) -> Option<U256> {
    match token {
        Some(Token::Uint(v)) => Some(*v),
        _ => None,
    }
}

fn as_address(token: Option<&Token>) -> Option<Address> {
    match token {
        Some(Token::Address(a)) => Some(*a),
        _ => None,
    }
}

//================================================================================================//
//                                     MEV HEURISTICS                                             //
//================================================================================================//

#[derive(Debug, Default)]
struct HeuristicState {
    recent: VecDeque<PendingSwap>,
    caller_counts: HashMap<Address, u32>,
    large_swap_live: bool,
    sandwich_suspected: bool,
}

/// Pattern detection over the decoded pending stream. The output is a
/// bidding recommendation, nothing more; the execution pipeline stays
/// correct if this is never consulted.
#[derive(Debug)]
pub struct MevHeuristics {
    state: Mutex<HeuristicState>,
}

impl MevHeuristics {
    fn new() -> Self {
        Self {
            state: Mutex::new(HeuristicState::default()),
        }
    }

    pub async fn observe(&self, swap: &PendingSwap) {
        let mut state = self.state.lock().await;

        let count = state.caller_counts.entry(swap.sender).or_insert(0);
        *count += 1;

        state.large_swap_live = swap.value_usd >= LARGE_SWAP_USD
            || state
                .recent
                .iter()
                .rev()
                .take(16)
                .any(|s| s.value_usd >= LARGE_SWAP_USD);

        // Sandwich shape: two pending swaps to the same router with
        // near-identical calldata from a repeat sender that has previously
        // bracketed a large swap.
        state.sandwich_suspected = state.recent.iter().rev().take(32).any(|prior| {
            prior.router == swap.router
                && prior.sender == swap.sender
                && prior.token_in == swap.token_in
                && prior.token_out == swap.token_out
                && near_equal(prior.amount_in, swap.amount_in)
                && state.caller_counts.get(&swap.sender).copied().unwrap_or(0)
                    >= REPEAT_CALLER_THRESHOLD
        });

        if state.recent.len() == RECENT_WINDOW {
            state.recent.pop_front();
        }
        state.recent.push_back(swap.clone());

        if state.sandwich_suspected {
            debug!(
                target: "mempool",
                sender = %swap.sender,
                "Sandwich pattern suspected in pending stream"
            );
        }
    }

    /// Current bidding advice given everything observed so far.
    pub async fn advice(&self, base_slippage_bps: u32) -> MevAdvice {
        let state = self.state.lock().await;
        let hostile = state.sandwich_suspected || state.large_swap_live;
        MevAdvice {
            use_private_relay: true,
            raise_slippage: hostile,
            recommended_slippage_bps: if hostile {
                base_slippage_bps.saturating_mul(2).min(500)
            } else {
                base_slippage_bps
            },
            use_flashbots: state.sandwich_suspected,
        }
    }

    pub async fn repeat_arbitrageurs(&self) -> Vec<Address> {
        let state = self.state.lock().await;
        state
            .caller_counts
            .iter()
            .filter(|(_, c)| **c >= REPEAT_CALLER_THRESHOLD)
            .map(|(a, _)| *a)
            .collect()
    }
}

fn near_equal(a: U256, b: U256) -> bool {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if hi.is_zero() {
        return true;
    }
    // Within 1% of each other.
    hi - lo <= hi / U256::from(100)
}
