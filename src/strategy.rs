// src/strategy.rs

//! # Strategy Search
//!
//! Enumerates closed-loop trade candidates across six families and costs
//! each one to net USD. The search owns nothing: it reads one graph snapshot
//! per cycle, asks the quote engine for prices, and emits sorted
//! [`ArbOpportunity`] values for the risk controller to judge.

use std::collections::HashSet;
use std::sync::Arc;

use ethers::types::{Address, U256};
use once_cell::sync::Lazy;
use smallvec::{smallvec, SmallVec};
use tracing::{debug, instrument, trace};

use crate::config::StrategySettings;
use crate::gas::GasOracle;
use crate::graph::TradeGraph;
use crate::quotes::QuoteEngine;
use crate::tokens::{well_known, TokenRegistry};
use crate::types::{
    now_millis, ArbOpportunity, AssetClass, QuoteResult, StrategyKind, SwapLeg, TradePair,
    USE_BALANCE,
};

/// Flat gas overhead of the flash-loan wrapper for a two-leg trade.
const FLASH_OVERHEAD_GAS_2LEG: u64 = 100_000;
/// Overhead for a three-leg trade.
const FLASH_OVERHEAD_GAS_3LEG: u64 = 120_000;

/// Fallback gas price when the oracle has no observations yet (Base idles
/// well under this).
const FALLBACK_GAS_GWEI: f64 = 0.05;

/// Dynamic family: graph pairs examined per cycle beyond the curated set.
const DYNAMIC_PAIR_BUDGET: usize = 10;

/// Curated direct-arb pairs: the deep, battle-tested markets.
static DIRECT_PAIRS: Lazy<Vec<(Address, Address)>> = Lazy::new(|| {
    vec![
        (*well_known::WETH, *well_known::USDC),
        (*well_known::WETH, *well_known::USDBC),
        (*well_known::WETH, *well_known::DAI),
        (*well_known::WETH, *well_known::CBBTC),
        (*well_known::CBBTC, *well_known::USDC),
    ]
});

/// {base, LST} pairs, quoted in both directions.
static LST_PAIRS: Lazy<Vec<(Address, Address)>> = Lazy::new(|| {
    vec![
        (*well_known::WETH, *well_known::CBETH),
        (*well_known::WETH, *well_known::WSTETH),
        (*well_known::WETH, *well_known::RETH),
        (*well_known::WETH, *well_known::WEETH),
        (*well_known::CBBTC, *well_known::WBTC),
        (*well_known::CBBTC, *well_known::TBTC),
    ]
});

static STABLE_PAIRS: Lazy<Vec<(Address, Address)>> = Lazy::new(|| {
    vec![
        (*well_known::USDC, *well_known::USDBC),
        (*well_known::USDC, *well_known::DAI),
        (*well_known::USDC, *well_known::USDT),
        (*well_known::USDBC, *well_known::DAI),
    ]
});

static CURATED_TRIANGLES: Lazy<Vec<[Address; 3]>> = Lazy::new(|| {
    vec![
        [*well_known::WETH, *well_known::USDC, *well_known::CBETH],
        [*well_known::WETH, *well_known::USDC, *well_known::DAI],
        [*well_known::WETH, *well_known::CBBTC, *well_known::USDC],
    ]
});

/// Stable family probes larger notionals than the generic USD schedule.
const STABLE_BORROW_UNITS: [u64; 3] = [10_000, 50_000, 100_000];

pub struct StrategyEngine {
    quotes: Arc<QuoteEngine>,
    registry: Arc<TokenRegistry>,
    gas: Arc<GasOracle>,
    settings: StrategySettings,
}

impl StrategyEngine {
    pub fn new(
        quotes: Arc<QuoteEngine>,
        registry: Arc<TokenRegistry>,
        gas: Arc<GasOracle>,
        settings: StrategySettings,
    ) -> Self {
        Self {
            quotes,
            registry,
            gas,
            settings,
        }
    }

    /// One full search pass over the cycle's graph snapshot. Returns the
    /// top-k candidates by net USD, best first.
    #[instrument(skip(self, graph), fields(pairs = graph.pair_count()))]
    pub async fn find_opportunities(&self, graph: &TradeGraph) -> Vec<ArbOpportunity> {
        let gas_gwei = self
            .gas
            .current_gas()
            .map(|g| g.max_fee_gwei())
            .unwrap_or(FALLBACK_GAS_GWEI);
        let eth_usd = self.registry.eth_usd().await;

        let mut candidates: Vec<ArbOpportunity> = Vec::new();
        let mut curated: HashSet<(Address, Address)> = HashSet::new();

        for &(a, b) in DIRECT_PAIRS.iter() {
            curated.insert(ordered(a, b));
            self.search_pair(graph, a, b, StrategyKind::Direct, None, gas_gwei, eth_usd, &mut candidates)
                .await;
        }

        for &(base, lst) in LST_PAIRS.iter() {
            curated.insert(ordered(base, lst));
            // Both directions: the peg can drift either way.
            self.search_pair(graph, base, lst, StrategyKind::Lst, None, gas_gwei, eth_usd, &mut candidates)
                .await;
            self.search_pair(graph, lst, base, StrategyKind::Lst, None, gas_gwei, eth_usd, &mut candidates)
                .await;
        }

        for &(a, b) in STABLE_PAIRS.iter() {
            curated.insert(ordered(a, b));
            let schedule = self.stable_schedule(a);
            self.search_pair(
                graph,
                a,
                b,
                StrategyKind::Stable,
                Some(schedule.as_slice()),
                gas_gwei,
                eth_usd,
                &mut candidates,
            )
            .await;
        }

        for triangle in CURATED_TRIANGLES.iter() {
            self.search_triangle(graph, *triangle, gas_gwei, eth_usd, &mut candidates)
                .await;
        }
        let registry = self.registry.clone();
        for triangle in graph.triangular_paths(|t| registry.is_borrowable(t)) {
            if CURATED_TRIANGLES.iter().any(|c| *c == triangle.tokens) {
                continue;
            }
            self.search_triangle(graph, triangle.tokens, gas_gwei, eth_usd, &mut candidates)
                .await;
        }

        if self.quotes.has_aggregator() {
            for &(a, b) in DIRECT_PAIRS.iter() {
                self.search_aggregator(graph, a, b, gas_gwei, eth_usd, &mut candidates)
                    .await;
            }
        }

        // Dynamic family: whatever the graph surfaced that nobody curated.
        let mut examined = 0usize;
        for pair in graph.arbitrageable_pairs() {
            if examined >= DYNAMIC_PAIR_BUDGET {
                break;
            }
            if curated.contains(&ordered(pair.token_a, pair.token_b)) {
                continue;
            }
            if !self.registry.is_borrowable(pair.token_a)
                && !self.registry.is_borrowable(pair.token_b)
            {
                continue;
            }
            let (borrow, other) = if self.registry.is_borrowable(pair.token_a) {
                (pair.token_a, pair.token_b)
            } else {
                (pair.token_b, pair.token_a)
            };
            examined += 1;
            self.search_pair(
                graph,
                borrow,
                other,
                StrategyKind::Dynamic,
                None,
                gas_gwei,
                eth_usd,
                &mut candidates,
            )
            .await;
        }

        candidates.sort_by(|x, y| {
            y.net_profit_usd
                .partial_cmp(&x.net_profit_usd)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        debug!(
            target: "strategy",
            candidates = candidates.len(),
            top_k = self.settings.top_k,
            "Search pass complete"
        );
        candidates.truncate(self.settings.top_k);
        candidates
    }

    /// Direct-shape search on one ordered pair: borrow → quote out on every
    /// venue → for each, quote back on every venue; same (venue, fee) on
    /// both legs is a self-trade and skipped.
    #[allow(clippy::too_many_arguments)]
    async fn search_pair(
        &self,
        graph: &TradeGraph,
        borrow_asset: Address,
        other: Address,
        strategy: StrategyKind,
        schedule_override: Option<&[U256]>,
        gas_gwei: f64,
        eth_usd: f64,
        out: &mut Vec<ArbOpportunity>,
    ) {
        let Some(pair) = graph.pair(borrow_asset, other) else {
            return;
        };
        let schedule = match schedule_override {
            Some(s) => s.to_vec(),
            None => self.borrow_schedule(borrow_asset),
        };

        for borrow in schedule {
            let out_quotes = self
                .quotes
                .quotes_for(&pair.pools, borrow_asset, other, borrow)
                .await;
            for q1 in &out_quotes {
                let back_quotes = self
                    .quotes
                    .quotes_for(&pair.pools, other, borrow_asset, q1.amount_out)
                    .await;
                for q2 in &back_quotes {
                    if q2.venue_id == q1.venue_id
                        && q2.fee_or_tick_spacing == q1.fee_or_tick_spacing
                    {
                        continue;
                    }
                    let legs = [
                        (borrow_asset, other, q1.clone()),
                        (other, borrow_asset, q2.clone()),
                    ];
                    if let Some(opp) = self.cost_candidate(
                        strategy,
                        borrow_asset,
                        borrow,
                        &legs,
                        pair_floor(pair),
                        gas_gwei,
                        eth_usd,
                    ) {
                        out.push(opp);
                    }
                }
            }
        }
    }

    async fn search_triangle(
        &self,
        graph: &TradeGraph,
        tokens: [Address; 3],
        gas_gwei: f64,
        eth_usd: f64,
        out: &mut Vec<ArbOpportunity>,
    ) {
        let [a, b, c] = tokens;
        let (Some(pair_ab), Some(pair_bc), Some(pair_ca)) =
            (graph.pair(a, b), graph.pair(b, c), graph.pair(c, a))
        else {
            return;
        };

        for borrow in self.borrow_schedule(a) {
            let Some(q1) = self
                .quotes
                .quotes_for(&pair_ab.pools, a, b, borrow)
                .await
                .into_iter()
                .next()
            else {
                continue;
            };
            let Some(q2) = self
                .quotes
                .quotes_for(&pair_bc.pools, b, c, q1.amount_out)
                .await
                .into_iter()
                .next()
            else {
                continue;
            };
            let Some(q3) = self
                .quotes
                .quotes_for(&pair_ca.pools, c, a, q2.amount_out)
                .await
                .into_iter()
                .next()
            else {
                continue;
            };

            let floor = pair_floor(pair_ab)
                .min(pair_floor(pair_bc))
                .min(pair_floor(pair_ca));
            let legs = [(a, b, q1), (b, c, q2), (c, a, q3)];
            if let Some(opp) = self.cost_candidate(
                StrategyKind::Triangular,
                a,
                borrow,
                &legs,
                floor,
                gas_gwei,
                eth_usd,
            ) {
                out.push(opp);
            }
        }
    }

    /// Aggregator out-leg, best direct venue back. The indicative price
    /// screens; only a screening pass that survives costing earns the firm
    /// quote with calldata, and the firm numbers replace the indicative ones.
    async fn search_aggregator(
        &self,
        graph: &TradeGraph,
        borrow_asset: Address,
        other: Address,
        gas_gwei: f64,
        eth_usd: f64,
        out: &mut Vec<ArbOpportunity>,
    ) {
        let Some(pair) = graph.pair(borrow_asset, other) else {
            return;
        };
        for borrow in self.borrow_schedule(borrow_asset) {
            let Some(price) = self
                .quotes
                .aggregator_price(borrow_asset, other, borrow)
                .await
            else {
                continue;
            };
            let Some(back) = self
                .quotes
                .quotes_for(&pair.pools, other, borrow_asset, price.amount_out)
                .await
                .into_iter()
                .next()
            else {
                continue;
            };

            let screening = [
                (borrow_asset, other, price.clone()),
                (other, borrow_asset, back.clone()),
            ];
            if self
                .cost_candidate(
                    StrategyKind::Aggregator,
                    borrow_asset,
                    borrow,
                    &screening,
                    pair_floor(pair),
                    gas_gwei,
                    eth_usd,
                )
                .is_none()
            {
                continue;
            }

            // Firm quote required before the opportunity is actionable.
            let Some(firm) = self
                .quotes
                .aggregator_firm_quote(borrow_asset, other, borrow)
                .await
            else {
                trace!(target: "strategy", "Firm quote unavailable, dropping aggregator candidate");
                continue;
            };
            let legs = [
                (borrow_asset, other, firm),
                (other, borrow_asset, back),
            ];
            if let Some(opp) = self.cost_candidate(
                StrategyKind::Aggregator,
                borrow_asset,
                borrow,
                &legs,
                pair_floor(pair),
                gas_gwei,
                eth_usd,
            ) {
                out.push(opp);
            }
        }
    }

    /// Profit accounting. Rejects non-positive gross profit and anything
    /// netting under the configured USD floor.
    #[allow(clippy::too_many_arguments)]
    fn cost_candidate(
        &self,
        strategy: StrategyKind,
        borrow_asset: Address,
        borrow: U256,
        legs: &[(Address, Address, QuoteResult)],
        pool_floor_usd: f64,
        gas_gwei: f64,
        eth_usd: f64,
    ) -> Option<ArbOpportunity> {
        let flash_fee = borrow * U256::from(self.settings.flash_premium_bps) / U256::from(10_000);
        let total_cost = borrow.checked_add(flash_fee)?;
        let total_return = legs.last()?.2.amount_out;
        if total_return <= total_cost {
            return None;
        }
        let profit = total_return - total_cost;
        let profit_bps = (profit * U256::from(10_000) / borrow).low_u64() as u32;
        let profit_usd = self.registry.value_usd(borrow_asset, profit);

        let overhead = if legs.len() >= 3 {
            FLASH_OVERHEAD_GAS_3LEG
        } else {
            FLASH_OVERHEAD_GAS_2LEG
        };
        let gas_estimate: u64 =
            legs.iter().map(|(_, _, q)| q.gas_estimate).sum::<u64>() + overhead;
        let gas_cost_usd = gas_estimate as f64 * gas_gwei * 1e-9 * eth_usd;
        let net_profit_usd = profit_usd - gas_cost_usd;
        if net_profit_usd < self.settings.min_profit_usd {
            return None;
        }

        let slip = U256::from(10_000 - self.settings.slippage_bps.min(9_999));
        let mut swap_legs: SmallVec<[SwapLeg; 3]> = smallvec![];
        let last = legs.len() - 1;
        for (i, (token_in, token_out, quote)) in legs.iter().enumerate() {
            let amount_out_min = if i == last {
                // Break-even plus one basis point, enforced atomically
                // on-chain.
                total_cost * U256::from(10_001) / U256::from(10_000)
            } else {
                quote.amount_out * slip / U256::from(10_000)
            };
            swap_legs.push(SwapLeg {
                venue_id: quote.venue_id.clone(),
                token_in: *token_in,
                token_out: *token_out,
                amount_in: if i == 0 { borrow } else { USE_BALANCE },
                expected_amount_out: quote.amount_out,
                amount_out_min,
                fee_or_tick_spacing: quote.fee_or_tick_spacing,
                venue_extra_data: quote.extra_data.clone(),
            });
        }

        Some(ArbOpportunity {
            strategy,
            borrow_asset,
            borrow_amount: borrow,
            legs: swap_legs,
            expected_profit: profit,
            profit_bps,
            profit_usd,
            gas_estimate,
            gas_cost_usd,
            net_profit_usd,
            pool_floor_usd,
            created_millis: now_millis(),
        })
    }

    /// Asset-class borrow schedule, scaled to the token's decimals.
    fn borrow_schedule(&self, asset: Address) -> Vec<U256> {
        let Some(info) = self.registry.get(asset) else {
            return Vec::new();
        };
        let unit = U256::exp10(info.decimals as usize);
        match info.class {
            AssetClass::Eth => [1u64, 5, 10, 50, 100]
                .iter()
                .map(|n| unit * U256::from(*n))
                .collect(),
            AssetClass::Usd | AssetClass::EurPegged => [5_000u64, 25_000, 100_000, 250_000]
                .iter()
                .map(|n| unit * U256::from(*n))
                .collect(),
            // BTC schedule is {0.1, 0.5, 1, 5} whole coins.
            AssetClass::Btc => {
                let tenth = unit / U256::from(10u64);
                vec![
                    tenth,
                    tenth * U256::from(5u64),
                    unit,
                    unit * U256::from(5u64),
                ]
            }
            AssetClass::Unknown => Vec::new(),
        }
    }

    fn stable_schedule(&self, asset: Address) -> Vec<U256> {
        let decimals = self.registry.get(asset).map(|t| t.decimals).unwrap_or(6);
        let unit = U256::exp10(decimals as usize);
        STABLE_BORROW_UNITS
            .iter()
            .map(|n| unit * U256::from(*n))
            .collect()
    }
}

fn ordered(a: Address, b: Address) -> (Address, Address) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Thinnest pool of the pair, the liquidity number risk validation sees.
pub fn pair_floor(pair: &TradePair) -> f64 {
    pair.pools
        .iter()
        .map(|p| p.liquidity_usd)
        .fold(f64::INFINITY, f64::min)
}

impl std::fmt::Debug for StrategyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyEngine")
            .field("settings", &self.settings)
            .finish()
    }
}
