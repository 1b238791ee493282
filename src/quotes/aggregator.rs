// src/quotes/aggregator.rs

//! External aggregator adapter. Two endpoints: `price` for indicative
//! numbers while searching, `quote` for a firm, executable quote carrying
//! calldata. Requests are spaced by a minimum interval and degrade to `None`
//! on 429 or timeout so the search loop never stalls on the aggregator.

use std::time::{Duration, Instant};

use ethers::types::{Address, Bytes, U256};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{QuoteSettings, CHAIN_ID};
use crate::errors::QuoteError;
use crate::types::QuoteResult;

const BASE_URL: &str = "https://api.0x.org/swap/v1";
const VENUE_ID: &str = "zerox";

#[derive(Debug, Deserialize)]
struct PriceReply {
    #[serde(rename = "buyAmount")]
    buy_amount: String,
    #[serde(rename = "estimatedGas", default)]
    estimated_gas: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuoteReply {
    #[serde(rename = "buyAmount")]
    buy_amount: String,
    #[serde(rename = "data")]
    calldata: String,
    #[serde(rename = "estimatedGas", default)]
    estimated_gas: Option<String>,
}

#[derive(Debug)]
pub struct AggregatorAdapter {
    client: Client,
    api_key: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl AggregatorAdapter {
    pub fn new(api_key: String, settings: &QuoteSettings) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.aggregator_timeout_ms))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            min_interval: Duration::from_millis(settings.aggregator_min_interval_ms),
            last_request: Mutex::new(None),
        }
    }

    /// Indicative price, no calldata. Cheap enough to use inside the search.
    pub async fn price(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<Option<QuoteResult>, QuoteError> {
        let url = format!(
            "{}/price?chainId={}&sellToken={:#x}&buyToken={:#x}&sellAmount={}",
            BASE_URL, CHAIN_ID, token_in, token_out, amount_in
        );
        let Some(body) = self.rate_limited_get(&url).await? else {
            return Ok(None);
        };
        let reply: PriceReply = serde_json::from_str(&body)
            .map_err(|e| QuoteError::Decode(format!("price reply: {}", e)))?;
        Ok(Some(self.to_result(
            &reply.buy_amount,
            reply.estimated_gas.as_deref(),
            Bytes::new(),
        )?))
    }

    /// Firm quote with execution calldata. Only requested when the engine
    /// actually intends to execute through the aggregator.
    pub async fn firm_quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<Option<QuoteResult>, QuoteError> {
        let url = format!(
            "{}/quote?chainId={}&sellToken={:#x}&buyToken={:#x}&sellAmount={}",
            BASE_URL, CHAIN_ID, token_in, token_out, amount_in
        );
        let Some(body) = self.rate_limited_get(&url).await? else {
            return Ok(None);
        };
        let reply: QuoteReply = serde_json::from_str(&body)
            .map_err(|e| QuoteError::Decode(format!("quote reply: {}", e)))?;
        let calldata = hex::decode(reply.calldata.trim_start_matches("0x"))
            .map_err(|e| QuoteError::Decode(format!("quote calldata: {}", e)))?;
        Ok(Some(self.to_result(
            &reply.buy_amount,
            reply.estimated_gas.as_deref(),
            Bytes::from(calldata),
        )?))
    }

    fn to_result(
        &self,
        buy_amount: &str,
        estimated_gas: Option<&str>,
        extra_data: Bytes,
    ) -> Result<QuoteResult, QuoteError> {
        let amount_out = U256::from_dec_str(buy_amount)
            .map_err(|e| QuoteError::Decode(format!("buyAmount {}: {}", buy_amount, e)))?;
        let gas_estimate = estimated_gas
            .and_then(|g| g.parse::<u64>().ok())
            .unwrap_or(200_000);
        Ok(QuoteResult {
            venue_id: VENUE_ID.to_string(),
            venue_name: VENUE_ID.to_string(),
            amount_out,
            fee_or_tick_spacing: 0,
            gas_estimate,
            extra_data,
        })
    }

    /// GET with the minimum inter-request interval enforced across callers.
    /// `Ok(None)` covers 429 and timeout; both add a jittered pause before
    /// the next caller proceeds.
    async fn rate_limited_get(&self, url: &str) -> Result<Option<String>, QuoteError> {
        {
            let mut last = self.last_request.lock().await;
            if let Some(at) = *last {
                let since = at.elapsed();
                if since < self.min_interval {
                    tokio::time::sleep(self.min_interval - since).await;
                }
            }
            *last = Some(Instant::now());
        }

        let response = match self
            .client
            .get(url)
            .header("0x-api-key", &self.api_key)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                debug!(target: "quote_engine", "Aggregator request timed out");
                return Ok(None);
            }
            Err(e) => return Err(QuoteError::Aggregator {
                status: 0,
                body: e.to_string(),
            }),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let jitter_ms = rand::thread_rng().gen_range(250..1_000);
            warn!(target: "quote_engine", jitter_ms, "Aggregator rate limited, backing off");
            tokio::time::sleep(self.min_interval + Duration::from_millis(jitter_ms)).await;
            return Ok(None);
        }
        let body = response
            .text()
            .await
            .map_err(|e| QuoteError::Decode(e.to_string()))?;
        if !status.is_success() {
            return Err(QuoteError::Aggregator {
                status: status.as_u16(),
                body,
            });
        }
        Ok(Some(body))
    }
}
