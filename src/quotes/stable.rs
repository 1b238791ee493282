// src/quotes/stable.rs

//! Stable-CL (slipstream-style) quoting. The quoter interface mirrors the v3
//! one with tick spacing in place of the fee tier, so this adapter reuses the
//! shared quoter call and differs only in what it probes.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};
use tracing::trace;

use crate::blockchain::ChainRpc;
use crate::discovery::{quoter_for, tick_spacings_for};
use crate::errors::QuoteError;
use crate::quotes::v3::quote_exact_input_single;
use crate::quotes::VenueAdapter;
use crate::types::{DiscoveredPool, QuoteResult};

#[derive(Debug)]
pub struct StableClAdapter {
    rpc: Arc<dyn ChainRpc>,
}

impl StableClAdapter {
    pub fn new(rpc: Arc<dyn ChainRpc>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl VenueAdapter for StableClAdapter {
    fn venue_name(&self) -> &'static str {
        "stable-cl"
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

        let spacings: Vec<u32> = if pool.fee_or_tick_spacing > 0 {
            vec![pool.fee_or_tick_spacing]
        } else {
            tick_spacings_for(&pool.venue_id)
        };

        let mut best: Option<(U256, u64, u32)> = None;
        for spacing in spacings {
            match quote_exact_input_single(
                self.rpc.as_ref(),
                quoter,
                token_in,
                token_out,
                amount_in,
                spacing,
            )
            .await
            {
                Ok(Some((amount_out, gas_estimate))) if !amount_out.is_zero() => {
                    if best.map(|(out, _, _)| amount_out > out).unwrap_or(true) {
                        best = Some((amount_out, gas_estimate, spacing));
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    trace!(target: "quote_engine", spacing, error = %e, "Spacing probe failed");
                }
            }
        }

        Ok(best.map(|(amount_out, gas_estimate, spacing)| QuoteResult {
            venue_id: pool.venue_id.clone(),
            venue_name: self.venue_name().to_string(),
            amount_out,
            fee_or_tick_spacing: spacing,
            gas_estimate: if gas_estimate > 0 {
                gas_estimate
            } else {
                pool.venue_kind.default_gas()
            },
            extra_data: Bytes::from(pool.pool_address.as_bytes().to_vec()),
        }))
    }
}
