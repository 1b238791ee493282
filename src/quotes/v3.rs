// src/quotes/v3.rs

//! Concentrated-liquidity quoting through the venue's QuoterV2-style
//! contract. The quoter is a view-only simulation of the swap path, so one
//! `eth_call` per fee tier is the whole cost.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::{Abi, Token};
use ethers::types::{Address, Bytes, U256};
use once_cell::sync::Lazy;
use tracing::trace;

use crate::blockchain::ChainRpc;
use crate::discovery::quoter_for;
use crate::errors::QuoteError;
use crate::quotes::VenueAdapter;
use crate::types::{DiscoveredPool, QuoteResult};

/// Fee tiers probed when a pool's own tier is unknown.
pub const V3_FEE_TIERS: [u32; 5] = [100, 500, 2_500, 3_000, 10_000];

static QUOTER_ABI: Lazy<Abi> = Lazy::new(|| {
    serde_json::from_str(
        r#"[{"inputs":[{"components":[{"internalType":"address","name":"tokenIn","type":"address"},{"internalType":"address","name":"tokenOut","type":"address"},{"internalType":"uint256","name":"amountIn","type":"uint256"},{"internalType":"uint24","name":"fee","type":"uint24"},{"internalType":"uint160","name":"sqrtPriceLimitX96","type":"uint160"}],"internalType":"struct IQuoterV2.QuoteExactInputSingleParams","name":"params","type":"tuple"}],"name":"quoteExactInputSingle","outputs":[{"internalType":"uint256","name":"amountOut","type":"uint256"},{"internalType":"uint160","name":"sqrtPriceX96After","type":"uint160"},{"internalType":"uint32","name":"initializedTicksCrossed","type":"uint32"},{"internalType":"uint256","name":"gasEstimate","type":"uint256"}],"stateMutability":"nonpayable","type":"function"}]"#,
    )
    .expect("QuoterV2 ABI must be valid")
});

#[derive(Debug)]
pub struct V3Adapter {
    rpc: Arc<dyn ChainRpc>,
}

impl V3Adapter {
    pub fn new(rpc: Arc<dyn ChainRpc>) -> Self {
        Self { rpc }
    }

    async fn quote_tier(
        &self,
        quoter: Address,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        fee: u32,
    ) -> Result<Option<(U256, u64)>, QuoteError> {
        quote_exact_input_single(self.rpc.as_ref(), quoter, token_in, token_out, amount_in, fee)
            .await
    }
}

#[async_trait]
impl VenueAdapter for V3Adapter {
    fn venue_name(&self) -> &'static str {
        "v3-cl"
    }

    async fn quote_pool(
        &self,
        pool: &DiscoveredPool,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<Option<QuoteResult>, QuoteError> {
        if pool.other_token(token_in) != Some(token_out) {
            return Ok(None);
        }
        let Some(quoter) = quoter_for(&pool.venue_id) else {
            return Ok(None);
        };

        // Discovery stamps the pool with its fee tier; probe the standard set
        // only when the tier is missing.
        let tiers: Vec<u32> = if pool.fee_or_tick_spacing > 0 {
            vec![pool.fee_or_tick_spacing]
        } else {
            V3_FEE_TIERS.to_vec()
        };

        let mut best: Option<(U256, u64, u32)> = None;
        for fee in tiers {
            match self
                .quote_tier(quoter, token_in, token_out, amount_in, fee)
                .await
            {
                Ok(Some((amount_out, gas_estimate))) if !amount_out.is_zero() => {
                    if best.map(|(out, _, _)| amount_out > out).unwrap_or(true) {
                        best = Some((amount_out, gas_estimate, fee));
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    trace!(target: "quote_engine", fee, error = %e, "Tier probe failed");
                }
            }
        }

        Ok(best.map(|(amount_out, gas_estimate, fee)| QuoteResult {
            venue_id: pool.venue_id.clone(),
            venue_name: self.venue_name().to_string(),
            amount_out,
            fee_or_tick_spacing: fee,
            gas_estimate: if gas_estimate > 0 {
                gas_estimate
            } else {
                pool.venue_kind.default_gas()
            },
            extra_data: Bytes::from(pool.pool_address.as_bytes().to_vec()),
        }))
    }
}

/// Shared quoter call used by the v3 and stable-CL adapters; `fee_or_spacing`
/// fills the uint24 slot either way since both quoter layouts agree on it.
pub(crate) async fn quote_exact_input_single(
    rpc: &dyn ChainRpc,
    quoter: Address,
    token_in: Address,
    token_out: Address,
    amount_in: U256,
    fee_or_spacing: u32,
) -> Result<Option<(U256, u64)>, QuoteError> {
    let function = QUOTER_ABI
        .function("quoteExactInputSingle")
        .map_err(|e| QuoteError::Decode(e.to_string()))?;
    let params = Token::Tuple(vec![
        Token::Address(token_in),
        Token::Address(token_out),
        Token::Uint(amount_in),
        Token::Uint(U256::from(fee_or_spacing)),
        Token::Uint(U256::zero()),
    ]);
    let calldata = function
        .encode_input(&[params])
        .map_err(|e| QuoteError::Decode(e.to_string()))?;

    let raw = match rpc.call(quoter, Bytes::from(calldata)).await {
        Ok(raw) => raw,
        // An uninitialized tier reverts; that is "no route", not a failure.
        Err(crate::errors::RpcError::Revert(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let tokens = function
        .decode_output(raw.as_ref())
        .map_err(|e| QuoteError::Decode(format!("quoter output: {}", e)))?;

    let amount_out = match tokens.first() {
        Some(Token::Uint(v)) => *v,
        _ => return Err(QuoteError::Decode("quoter amountOut missing".into())),
    };
    let gas_estimate = match tokens.get(3) {
        Some(Token::Uint(v)) if *v <= U256::from(u64::MAX) => v.as_u64(),
        _ => 0,
    };
    Ok(Some((amount_out, gas_estimate)))
}
