// src/quotes/v2.rs

//! Constant-product quoting. Reserves are read once per pool per short TTL
//! and the amount-out is computed off-chain, so a v2 quote costs at most one
//! `eth_call` and usually none.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::abi::{Abi, Token};
use ethers::types::{Address, Bytes, U256};
use moka::future::Cache;
use once_cell::sync::Lazy;

use crate::blockchain::ChainRpc;
use crate::errors::QuoteError;
use crate::quotes::VenueAdapter;
use crate::types::{DiscoveredPool, QuoteResult};

static PAIR_ABI: Lazy<Abi> = Lazy::new(|| {
    serde_json::from_str(
        r#"[{"inputs":[],"name":"getReserves","outputs":[{"internalType":"uint112","name":"_reserve0","type":"uint112"},{"internalType":"uint112","name":"_reserve1","type":"uint112"},{"internalType":"uint32","name":"_blockTimestampLast","type":"uint32"}],"stateMutability":"view","type":"function"}]"#,
    )
    .expect("V2 pair ABI must be valid")
});

const RESERVE_CACHE_TTL: Duration = Duration::from_secs(2);
const RESERVE_CACHE_SIZE: u64 = 10_000;

#[derive(Debug)]
pub struct V2Adapter {
    rpc: Arc<dyn ChainRpc>,
    fee_bps: u32,
    reserves: Cache<Address, (U256, U256)>,
}

impl V2Adapter {
    pub fn new(rpc: Arc<dyn ChainRpc>, fee_bps: u32) -> Self {
        Self {
            rpc,
            fee_bps,
            reserves: Cache::builder()
                .max_capacity(RESERVE_CACHE_SIZE)
                .time_to_live(RESERVE_CACHE_TTL)
                .build(),
        }
    }

    async fn fresh_reserves(&self, pool: &DiscoveredPool) -> Result<(U256, U256), QuoteError> {
        if let Some(cached) = self.reserves.get(&pool.pool_address).await {
            return Ok(cached);
        }
        match read_reserves(self.rpc.as_ref(), pool.pool_address).await {
            Ok(reserves) => {
                self.reserves.insert(pool.pool_address, reserves).await;
                Ok(reserves)
            }
            // Catalog reserves from the last refresh still give a usable
            // quote; the final word belongs to simulation anyway.
            Err(_) if !pool.reserve0.is_zero() && !pool.reserve1.is_zero() => {
                Ok((pool.reserve0, pool.reserve1))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl VenueAdapter for V2Adapter {
    fn venue_name(&self) -> &'static str {
        "v2-amm"
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
        let (reserve0, reserve1) = self.fresh_reserves(pool).await?;
        let (reserve_in, reserve_out) = if token_in == pool.token0 {
            (reserve0, reserve1)
        } else {
            (reserve1, reserve0)
        };

        let fee_bps = if pool.fee_or_tick_spacing > 0 {
            pool.fee_or_tick_spacing
        } else {
            self.fee_bps
        };
        let Some(amount_out) = constant_product_out(amount_in, reserve_in, reserve_out, fee_bps)
        else {
            return Ok(None);
        };

        Ok(Some(QuoteResult {
            venue_id: pool.venue_id.clone(),
            venue_name: self.venue_name().to_string(),
            amount_out,
            fee_or_tick_spacing: fee_bps,
            gas_estimate: pool.venue_kind.default_gas(),
            extra_data: Bytes::from(pool.pool_address.as_bytes().to_vec()),
        }))
    }
}

/// `x * y = k` amount-out with the fee taken from the input side, in parts
/// of 10 000.
pub fn constant_product_out(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_bps: u32,
) -> Option<U256> {
    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() || fee_bps >= 10_000 {
        return None;
    }
    let amount_in_with_fee = amount_in.checked_mul(U256::from(10_000 - fee_bps))?;
    let numerator = amount_in_with_fee.checked_mul(reserve_out)?;
    let denominator = reserve_in
        .checked_mul(U256::from(10_000))?
        .checked_add(amount_in_with_fee)?;
    if denominator.is_zero() {
        return None;
    }
    Some(numerator / denominator)
}

pub(crate) async fn read_reserves(
    rpc: &dyn ChainRpc,
    pool: Address,
) -> Result<(U256, U256), QuoteError> {
    let function = PAIR_ABI
        .function("getReserves")
        .map_err(|e| QuoteError::Decode(e.to_string()))?;
    let calldata = function
        .encode_input(&[])
        .map_err(|e| QuoteError::Decode(e.to_string()))?;
    let raw = rpc.call(pool, Bytes::from(calldata)).await?;
    let tokens = function
        .decode_output(raw.as_ref())
        .map_err(|e| QuoteError::Decode(format!("getReserves on {}: {}", pool, e)))?;
    match (tokens.get(0), tokens.get(1)) {
        (Some(Token::Uint(r0)), Some(Token::Uint(r1))) => Ok((*r0, *r1)),
        _ => Err(QuoteError::Decode(format!(
            "unexpected getReserves output on {}",
            pool
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_reduces_output() {
        let reserve = U256::exp10(21);
        let input = U256::exp10(18);
        let no_fee = constant_product_out(input, reserve, reserve, 0).unwrap();
        let with_fee = constant_product_out(input, reserve, reserve, 30).unwrap();
        assert!(with_fee < no_fee);
    }

    #[test]
    fn known_value() {
        // 1e18 in against 100e18/250_000e6 reserves at 30 bps.
        let amount_in = U256::exp10(18);
        let reserve_in = U256::exp10(18) * U256::from(100u64);
        let reserve_out = U256::from(250_000_000_000u64);
        let out = constant_product_out(amount_in, reserve_in, reserve_out, 30).unwrap();
        // 0.997 / 100.997 * 250_000e6 ≈ 2467.89e6
        assert!(out > U256::from(2_460_000_000u64));
        assert!(out < U256::from(2_470_000_000u64));
    }

    #[test]
    fn degenerate_inputs_yield_none() {
        let r = U256::exp10(18);
        assert!(constant_product_out(U256::zero(), r, r, 30).is_none());
        assert!(constant_product_out(r, U256::zero(), r, 30).is_none());
        assert!(constant_product_out(r, r, r, 10_000).is_none());
    }
}
