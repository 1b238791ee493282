// src/graph.rs

//! # Trade Graph
//!
//! Derives the searchable structures from the active-pool set: unordered
//! token pairs, pairs tradable on at least two venues, and triangles from
//! adjacency intersection. The graph is a pure function of the snapshot it
//! was built from; strategies hold it for one cycle and never reach back
//! into the catalog.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use ethers::types::Address;
use tracing::debug;

use crate::types::{DiscoveredPool, TradePair};

/// A three-leg loop `a → b → c → a`, rotated so the first vertex is
/// flash-borrowable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triangle {
    pub tokens: [Address; 3],
}

#[derive(Debug, Default)]
pub struct TradeGraph {
    pairs: BTreeMap<(Address, Address), TradePair>,
}

impl TradeGraph {
    /// Builds the graph from an active-pool snapshot. Pools whose pair
    /// already exists extend the pool list; `best_liquidity_usd` tracks the
    /// deepest single pool of the pair.
    pub fn build(active_pools: &[DiscoveredPool]) -> Self {
        let mut pairs: BTreeMap<(Address, Address), TradePair> = BTreeMap::new();
        for pool in active_pools {
            let key = pool.pair_key();
            let entry = pairs.entry(key).or_insert_with(|| TradePair {
                token_a: key.0,
                token_b: key.1,
                pools: Vec::new(),
                best_liquidity_usd: 0.0,
            });
            entry.best_liquidity_usd = entry.best_liquidity_usd.max(pool.liquidity_usd);
            entry.pools.push(pool.clone());
        }
        debug!(target: "trade_graph", pairs = pairs.len(), pools = active_pools.len(), "Graph rebuilt");
        Self { pairs }
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn pair(&self, token_a: Address, token_b: Address) -> Option<&TradePair> {
        let key = if token_a <= token_b {
            (token_a, token_b)
        } else {
            (token_b, token_a)
        };
        self.pairs.get(&key)
    }

    pub fn pairs(&self) -> impl Iterator<Item = &TradePair> {
        self.pairs.values()
    }

    /// Pairs whose pools span at least two distinct venues, deepest first.
    /// Deterministic for a given snapshot.
    pub fn arbitrageable_pairs(&self) -> Vec<&TradePair> {
        let mut result: Vec<&TradePair> = self
            .pairs
            .values()
            .filter(|pair| {
                let venues: HashSet<&str> =
                    pair.pools.iter().map(|p| p.venue_id.as_str()).collect();
                venues.len() >= 2
            })
            .collect();
        result.sort_by(|a, b| {
            b.best_liquidity_usd
                .partial_cmp(&a.best_liquidity_usd)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        result
    }

    /// Triangles over the pair adjacency, one per strictly ordered triple
    /// `(a < b < c)` with all three edges present, rotated so the lead vertex
    /// satisfies `is_borrowable`. Triples with no borrowable vertex are
    /// dropped: a loop the flash lender cannot fund is not executable.
    pub fn triangular_paths(&self, is_borrowable: impl Fn(Address) -> bool) -> Vec<Triangle> {
        let mut adjacency: HashMap<Address, BTreeSet<Address>> = HashMap::new();
        for (a, b) in self.pairs.keys() {
            adjacency.entry(*a).or_default().insert(*b);
            adjacency.entry(*b).or_default().insert(*a);
        }

        let mut vertices: Vec<Address> = adjacency.keys().copied().collect();
        vertices.sort();

        let mut triangles = Vec::new();
        for (i, &a) in vertices.iter().enumerate() {
            let Some(a_adj) = adjacency.get(&a) else { continue };
            for &b in vertices[i + 1..].iter() {
                if !a_adj.contains(&b) {
                    continue;
                }
                let Some(b_adj) = adjacency.get(&b) else { continue };
                // c ranges above b; the intersection closes the triangle.
                for &c in a_adj.iter().filter(|&&c| c > b) {
                    if !b_adj.contains(&c) {
                        continue;
                    }
                    if let Some(rotated) = rotate_to_borrowable([a, b, c], &is_borrowable) {
                        triangles.push(Triangle { tokens: rotated });
                    }
                }
            }
        }
        debug!(target: "trade_graph", triangles = triangles.len(), "Triangles derived");
        triangles
    }
}

/// Rotates the triple (preserving cyclic order) until a borrowable token
/// leads. Rotation only — the two mirror-image directions of a triangle are
/// distinct trades and only the discovered orientation is emitted.
fn rotate_to_borrowable(
    tokens: [Address; 3],
    is_borrowable: &impl Fn(Address) -> bool,
) -> Option<[Address; 3]> {
    for shift in 0..3 {
        if is_borrowable(tokens[shift]) {
            return Some([
                tokens[shift],
                tokens[(shift + 1) % 3],
                tokens[(shift + 2) % 3],
            ]);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VenueKind;
    use ethers::types::U256;

    fn pool(venue: &str, a: u64, b: u64, liquidity_usd: f64) -> DiscoveredPool {
        let mut p = DiscoveredPool::new(
            venue.to_string(),
            VenueKind::V2Amm,
            Address::from_low_u64_be(1000 + a * 100 + b),
            Address::from_low_u64_be(a),
            Address::from_low_u64_be(b),
            18,
            18,
            30,
        );
        p.liquidity = U256::from(1u64);
        p.liquidity_usd = liquidity_usd;
        p.is_active = true;
        p
    }

    #[test]
    fn single_venue_pairs_are_not_arbitrageable() {
        let graph = TradeGraph::build(&[pool("uniswap_v2", 1, 2, 50_000.0)]);
        assert_eq!(graph.pair_count(), 1);
        assert!(graph.arbitrageable_pairs().is_empty());
    }

    #[test]
    fn arbitrageable_pairs_sorted_by_liquidity() {
        let mut p2 = pool("aerodrome", 1, 2, 80_000.0);
        p2.pool_address = Address::from_low_u64_be(7001);
        let mut p4 = pool("aerodrome", 3, 4, 500_000.0);
        p4.pool_address = Address::from_low_u64_be(7002);
        let pools = vec![
            pool("uniswap_v2", 1, 2, 50_000.0),
            p2,
            pool("uniswap_v3", 3, 4, 300_000.0),
            p4,
        ];
        let graph = TradeGraph::build(&pools);
        let arb = graph.arbitrageable_pairs();
        assert_eq!(arb.len(), 2);
        assert_eq!(arb[0].token_a, Address::from_low_u64_be(3));
        assert_eq!(arb[0].best_liquidity_usd, 500_000.0);
    }

    #[test]
    fn graph_is_deterministic_for_a_snapshot() {
        let pools = vec![
            pool("uniswap_v2", 1, 2, 50_000.0),
            pool("uniswap_v3", 1, 2, 60_000.0),
            pool("uniswap_v2", 2, 3, 10_000.0),
        ];
        let a: Vec<(Address, Address)> = TradeGraph::build(&pools)
            .arbitrageable_pairs()
            .iter()
            .map(|p| (p.token_a, p.token_b))
            .collect();
        let b: Vec<(Address, Address)> = TradeGraph::build(&pools)
            .arbitrageable_pairs()
            .iter()
            .map(|p| (p.token_a, p.token_b))
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn triangle_requires_all_three_edges() {
        let pools = vec![pool("u", 1, 2, 1.0), pool("u", 2, 3, 1.0)];
        let graph = TradeGraph::build(&pools);
        assert!(graph.triangular_paths(|_| true).is_empty());
    }

    #[test]
    fn triangle_rotates_to_borrowable_lead() {
        let pools = vec![
            pool("u", 1, 2, 1.0),
            pool("u", 2, 3, 1.0),
            pool("u", 1, 3, 1.0),
        ];
        let graph = TradeGraph::build(&pools);
        let borrowable = Address::from_low_u64_be(2);

        let triangles = graph.triangular_paths(|t| t == borrowable);
        assert_eq!(triangles.len(), 1);
        assert_eq!(triangles[0].tokens[0], borrowable);
        // Cyclic order of (1, 2, 3) preserved under rotation.
        assert_eq!(triangles[0].tokens[1], Address::from_low_u64_be(3));
        assert_eq!(triangles[0].tokens[2], Address::from_low_u64_be(1));
    }

    #[test]
    fn triangle_without_borrowable_vertex_is_dropped() {
        let pools = vec![
            pool("u", 1, 2, 1.0),
            pool("u", 2, 3, 1.0),
            pool("u", 1, 3, 1.0),
        ];
        let graph = TradeGraph::build(&pools);
        assert!(graph.triangular_paths(|_| false).is_empty());
    }
}
