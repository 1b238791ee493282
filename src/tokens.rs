// src/tokens.rs

//! # Token Registry
//!
//! Address → `{symbol, decimals, price_usd}` with lazy on-chain resolution.
//! A short seeded table covers the assets the strategies borrow and price
//! against; every other token resolves its metadata from `symbol()` and
//! `decimals()` and carries a zero price, contributing nothing to TVL.

use std::sync::Arc;

use dashmap::DashMap;
use ethers::abi::{Abi, Token};
use ethers::types::{Address, Bytes, U256};
use once_cell::sync::Lazy;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::blockchain::ChainRpc;
use crate::types::{normalize_units, AssetClass, TokenInfo};

static ERC20_ABI: Lazy<Abi> = Lazy::new(|| {
    serde_json::from_str(
        r#"[
            {"inputs":[],"name":"symbol","outputs":[{"internalType":"string","name":"","type":"string"}],"stateMutability":"view","type":"function"},
            {"inputs":[],"name":"decimals","outputs":[{"internalType":"uint8","name":"","type":"uint8"}],"stateMutability":"view","type":"function"}
        ]"#,
    )
    .expect("ERC20 metadata ABI must be valid")
});

/// Fixed EUR/USD multiplier for EUR-pegged stables.
const EUR_USD: f64 = 1.08;

/// Parsed addresses of the seeded assets, shared with the curated strategy
/// tables so both sides agree on identity.
pub mod well_known {
    use ethers::types::Address;
    use once_cell::sync::Lazy;

    fn parse(s: &str) -> Address {
        s.parse().expect("well-known address must parse")
    }

    pub static WETH: Lazy<Address> =
        Lazy::new(|| parse("0x4200000000000000000000000000000000000006"));
    pub static CBETH: Lazy<Address> =
        Lazy::new(|| parse("0x2ae3f1ec7f1f5012cfeab0185bfc7aa3cf0dec22"));
    pub static WSTETH: Lazy<Address> =
        Lazy::new(|| parse("0xc1cba3fcea344f92d9239c08c0568f6f2f0ee452"));
    pub static WEETH: Lazy<Address> =
        Lazy::new(|| parse("0x04c0599ae5a44757c0af6f9ec3b93da8976c150a"));
    pub static RETH: Lazy<Address> =
        Lazy::new(|| parse("0xb6fe221fe9eef5aba221c348ba20a1bf5e73624c"));
    pub static CBBTC: Lazy<Address> =
        Lazy::new(|| parse("0xcbb7c0000ab88b473b1f5afd9ef808440eed33bf"));
    pub static WBTC: Lazy<Address> =
        Lazy::new(|| parse("0x0555e30da8f98308edb960aa94c0db47230d2b9c"));
    pub static TBTC: Lazy<Address> =
        Lazy::new(|| parse("0x236aa50979d5f3de3bd1eeb40e81137f22ab794b"));
    pub static USDC: Lazy<Address> =
        Lazy::new(|| parse("0x833589fcd6edb6e08f4c7c32d4f71b54bda02913"));
    pub static USDBC: Lazy<Address> =
        Lazy::new(|| parse("0xd9aaec86b65d86f6a7b5b1b0c42ffa531710b6ca"));
    pub static DAI: Lazy<Address> =
        Lazy::new(|| parse("0x50c5725949a6f0c72e6c4a641f24049a917db0cb"));
    pub static USDT: Lazy<Address> =
        Lazy::new(|| parse("0xfde4c96c8593536e31f229ea8f37b2ada2699bb2"));
    pub static EURC: Lazy<Address> =
        Lazy::new(|| parse("0x60a3e35cc302bfa44cb288bc5a4f316fdb1adb42"));
}

/// Seeded Base-mainnet assets. The class drives pricing; symbols here are
/// authoritative and skip the on-chain lookup.
fn seeded() -> Vec<(Address, &'static str, u8, AssetClass)> {
    vec![
        (*well_known::WETH, "WETH", 18, AssetClass::Eth),
        (*well_known::CBETH, "cbETH", 18, AssetClass::Eth),
        (*well_known::WSTETH, "wstETH", 18, AssetClass::Eth),
        (*well_known::WEETH, "weETH", 18, AssetClass::Eth),
        (*well_known::RETH, "rETH", 18, AssetClass::Eth),
        (*well_known::CBBTC, "cbBTC", 8, AssetClass::Btc),
        (*well_known::WBTC, "WBTC", 8, AssetClass::Btc),
        (*well_known::TBTC, "tBTC", 18, AssetClass::Btc),
        (*well_known::USDC, "USDC", 6, AssetClass::Usd),
        (*well_known::USDBC, "USDbC", 6, AssetClass::Usd),
        (*well_known::DAI, "DAI", 18, AssetClass::Usd),
        (*well_known::USDT, "USDT", 6, AssetClass::Usd),
        (*well_known::EURC, "EURC", 6, AssetClass::EurPegged),
    ]
}

#[derive(Debug)]
struct ReferencePrices {
    eth_usd: f64,
    btc_usd: f64,
}

/// Process-wide token registry. Created once; mutated only by resolution and
/// `update_prices`.
#[derive(Debug)]
pub struct TokenRegistry {
    rpc: Arc<dyn ChainRpc>,
    tokens: DashMap<Address, TokenInfo>,
    prices: RwLock<ReferencePrices>,
}

impl TokenRegistry {
    pub fn new(rpc: Arc<dyn ChainRpc>, eth_usd: f64, btc_usd: f64) -> Self {
        let registry = Self {
            rpc,
            tokens: DashMap::new(),
            prices: RwLock::new(ReferencePrices { eth_usd, btc_usd }),
        };
        for (address, symbol, decimals, class) in seeded() {
            registry.tokens.insert(
                address,
                TokenInfo {
                    address,
                    symbol: symbol.to_string(),
                    decimals,
                    price_usd: class_price(class, eth_usd, btc_usd),
                    class,
                },
            );
        }
        registry
    }

    /// True for tokens in the seeded table (the "known" set that anchors
    /// liquidity estimation and pool relevance).
    pub fn is_known(&self, address: Address) -> bool {
        self.tokens
            .get(&address)
            .map(|t| t.class != AssetClass::Unknown)
            .unwrap_or(false)
    }

    /// Tokens the flash lender will fund: anything with a priced class.
    pub fn is_borrowable(&self, address: Address) -> bool {
        self.is_known(address)
    }

    pub fn get(&self, address: Address) -> Option<TokenInfo> {
        self.tokens.get(&address).map(|t| t.clone())
    }

    /// Resolves a token, reading `symbol()`/`decimals()` on-chain on first
    /// sight. Metadata call failures fall back to `"UNKNOWN"`/18; a transport
    /// failure on both calls yields `None` and the caller drops the pool.
    pub async fn resolve(&self, address: Address) -> Option<TokenInfo> {
        if let Some(info) = self.tokens.get(&address) {
            return Some(info.clone());
        }

        let symbol_res = self.call_string(address, "symbol").await;
        let decimals_res = self.call_u8(address, "decimals").await;
        if symbol_res.is_err() && decimals_res.is_err() {
            debug!(target: "token_registry", token = %address, "Token metadata unreachable");
            return None;
        }
        let symbol = symbol_res.unwrap_or_else(|_| "UNKNOWN".to_string());
        let decimals = decimals_res.unwrap_or(18);
        if decimals > 36 {
            warn!(target: "token_registry", token = %address, decimals, "Implausible decimals, dropping token");
            return None;
        }

        let info = TokenInfo {
            address,
            symbol,
            decimals,
            price_usd: 0.0,
            class: AssetClass::Unknown,
        };
        // First writer wins; a racing resolve of the same address is benign.
        self.tokens.entry(address).or_insert_with(|| info.clone());
        Some(info)
    }

    /// USD value of `amount` raw units of `address`. Unknown or unpriced
    /// tokens contribute zero.
    pub fn value_usd(&self, address: Address, amount: U256) -> f64 {
        match self.tokens.get(&address) {
            Some(token) if token.price_usd > 0.0 => {
                let v = normalize_units(amount, token.decimals) * token.price_usd;
                if v.is_finite() {
                    v
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }

    pub fn price_usd(&self, address: Address) -> f64 {
        self.tokens.get(&address).map(|t| t.price_usd).unwrap_or(0.0)
    }

    pub async fn eth_usd(&self) -> f64 {
        self.prices.read().await.eth_usd
    }

    /// Re-derives every seeded token's price from fresh ETH/BTC inputs.
    pub async fn update_prices(&self, eth_usd: f64, btc_usd: f64) {
        {
            let mut prices = self.prices.write().await;
            prices.eth_usd = eth_usd;
            prices.btc_usd = btc_usd;
        }
        for mut entry in self.tokens.iter_mut() {
            let class = entry.class;
            entry.price_usd = class_price(class, eth_usd, btc_usd);
        }
        debug!(target: "token_registry", eth_usd, btc_usd, "Reference prices updated");
    }

    async fn call_string(&self, to: Address, func: &str) -> Result<String, String> {
        let tokens = self.metadata_call(to, func).await?;
        match tokens.into_iter().next() {
            Some(Token::String(s)) => Ok(s.trim().to_string()),
            other => Err(format!("unexpected {} output: {:?}", func, other)),
        }
    }

    async fn call_u8(&self, to: Address, func: &str) -> Result<u8, String> {
        let tokens = self.metadata_call(to, func).await?;
        match tokens.into_iter().next() {
            Some(Token::Uint(v)) if v <= U256::from(u8::MAX) => Ok(v.as_u32() as u8),
            other => Err(format!("unexpected {} output: {:?}", func, other)),
        }
    }

    async fn metadata_call(&self, to: Address, func: &str) -> Result<Vec<Token>, String> {
        let function = ERC20_ABI
            .function(func)
            .map_err(|e| format!("missing {} in ERC20 ABI: {}", func, e))?;
        let calldata = function
            .encode_input(&[])
            .map_err(|e| format!("encode {}: {}", func, e))?;
        let raw = self
            .rpc
            .call(to, Bytes::from(calldata))
            .await
            .map_err(|e| e.to_string())?;
        function
            .decode_output(raw.as_ref())
            .map_err(|e| format!("decode {}: {}", func, e))
    }
}

fn class_price(class: AssetClass, eth_usd: f64, btc_usd: f64) -> f64 {
    match class {
        AssetClass::Eth => eth_usd.max(0.0),
        AssetClass::Btc => btc_usd.max(0.0),
        AssetClass::Usd => 1.0,
        AssetClass::EurPegged => EUR_USD,
        AssetClass::Unknown => 0.0,
    }
}
