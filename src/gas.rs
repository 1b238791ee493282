// src/gas.rs

//! # Gas Oracle
//!
//! Tracks recent base fees from new chain heads and advises the execution
//! pipeline on EIP-1559 fee fields. Prediction follows the protocol's own
//! adjustment rule, so the proposed `max_fee` stays valid for the next block
//! without overbidding on a quiet chain.

use std::collections::VecDeque;
use std::sync::Mutex;

use ethers::types::U256;

use crate::errors::GasError;

/// Number of base-fee observations retained.
const HISTORY_LEN: usize = 20;

/// Priority fee when base fee is accelerating (last delta > 10% of base).
const PRIORITY_FAST_GWEI: u64 = 5;
/// Priority fee on a calm chain.
const PRIORITY_CALM_GWEI: u64 = 2;

const DEFAULT_GAS_LIMIT: u64 = 500_000;

const GWEI: u64 = 1_000_000_000;

/// EIP-1559 fee proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasPrice {
    pub base_fee: U256,
    pub priority_fee: U256,
    pub max_fee: U256,
    pub gas_limit: u64,
}

impl GasPrice {
    pub fn max_fee_gwei(&self) -> f64 {
        if self.max_fee > U256::from(u128::MAX) {
            return f64::INFINITY;
        }
        self.max_fee.as_u128() as f64 / GWEI as f64
    }
}

#[derive(Debug, Clone, Copy)]
struct BlockSample {
    base_fee: U256,
    gas_used: U256,
    gas_limit: U256,
}

#[derive(Debug, Default)]
pub struct GasOracle {
    history: Mutex<VecDeque<BlockSample>>,
}

impl GasOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one new chain head. Called by the engine for every head it sees.
    pub fn observe_block(&self, base_fee: U256, gas_used: U256, gas_limit: U256) {
        let mut history = self.history.lock().expect("gas history lock");
        if history.len() == HISTORY_LEN {
            history.pop_front();
        }
        history.push_back(BlockSample {
            base_fee,
            gas_used,
            gas_limit,
        });
    }

    /// Current fee proposal: observed base fee plus an acceleration-aware
    /// priority fee.
    pub fn current_gas(&self) -> Result<GasPrice, GasError> {
        let history = self.history.lock().expect("gas history lock");
        let latest = history.back().ok_or(GasError::NoObservations)?;
        let priority_gwei = match history.len() {
            0 | 1 => PRIORITY_CALM_GWEI,
            n => {
                let prev = history[n - 2].base_fee;
                let delta = if latest.base_fee > prev {
                    latest.base_fee - prev
                } else {
                    prev - latest.base_fee
                };
                // Accelerating chain: bid harder to stay in the next block.
                if delta.saturating_mul(U256::from(10)) > latest.base_fee {
                    PRIORITY_FAST_GWEI
                } else {
                    PRIORITY_CALM_GWEI
                }
            }
        };
        let priority_fee = U256::from(priority_gwei) * U256::from(GWEI);
        Ok(GasPrice {
            base_fee: latest.base_fee,
            priority_fee,
            max_fee: latest.base_fee.saturating_add(priority_fee),
            gas_limit: DEFAULT_GAS_LIMIT,
        })
    }

    /// Next block's base fee per the EIP-1559 rule:
    /// `delta = base * |gas_used - target| / target / 8`, added when the last
    /// block ran above target (half the gas limit), subtracted below it.
    pub fn predict_next_base_fee(&self) -> Result<U256, GasError> {
        let history = self.history.lock().expect("gas history lock");
        let latest = history.back().ok_or(GasError::NoObservations)?;
        let target = latest.gas_limit / U256::from(2);
        if target.is_zero() {
            return Ok(latest.base_fee);
        }
        if latest.gas_used > target {
            let excess = latest.gas_used - target;
            let delta = latest.base_fee * excess / target / U256::from(8);
            Ok(latest.base_fee.saturating_add(delta))
        } else {
            let shortfall = target - latest.gas_used;
            let delta = latest.base_fee * shortfall / target / U256::from(8);
            Ok(latest.base_fee.saturating_sub(delta))
        }
    }

    /// Fee proposal scaled by urgency 1..=5; urgency 3 is the neutral bid.
    pub fn optimal_params(&self, urgency: u8) -> Result<GasPrice, GasError> {
        let urgency = urgency.clamp(1, 5) as u64;
        let mut gas = self.current_gas()?;
        gas.priority_fee = gas.priority_fee * U256::from(urgency) / U256::from(3);
        gas.max_fee = gas.base_fee.saturating_add(gas.priority_fee);
        Ok(gas)
    }

    pub fn observation_count(&self) -> usize {
        self.history.lock().expect("gas history lock").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gwei(n: u64) -> U256 {
        U256::from(n) * U256::from(GWEI)
    }

    #[test]
    fn no_observations_is_an_error() {
        let oracle = GasOracle::new();
        assert!(matches!(oracle.current_gas(), Err(GasError::NoObservations)));
    }

    #[test]
    fn calm_chain_bids_two_gwei() {
        let oracle = GasOracle::new();
        oracle.observe_block(gwei(100), U256::from(15_000_000u64), U256::from(30_000_000u64));
        oracle.observe_block(gwei(101), U256::from(15_000_000u64), U256::from(30_000_000u64));
        let gas = oracle.current_gas().unwrap();
        assert_eq!(gas.priority_fee, gwei(2));
        assert_eq!(gas.max_fee, gwei(103));
    }

    #[test]
    fn accelerating_chain_bids_five_gwei() {
        let oracle = GasOracle::new();
        oracle.observe_block(gwei(100), U256::from(15_000_000u64), U256::from(30_000_000u64));
        oracle.observe_block(gwei(120), U256::from(15_000_000u64), U256::from(30_000_000u64));
        let gas = oracle.current_gas().unwrap();
        assert_eq!(gas.priority_fee, gwei(5));
    }

    #[test]
    fn predicts_increase_above_target() {
        let oracle = GasOracle::new();
        // Full block: gas_used == limit, excess == target, delta == base/8.
        oracle.observe_block(gwei(80), U256::from(30_000_000u64), U256::from(30_000_000u64));
        assert_eq!(oracle.predict_next_base_fee().unwrap(), gwei(90));
    }

    #[test]
    fn predicts_decrease_below_target() {
        let oracle = GasOracle::new();
        // Empty block: shortfall == target, delta == base/8.
        oracle.observe_block(gwei(80), U256::zero(), U256::from(30_000_000u64));
        assert_eq!(oracle.predict_next_base_fee().unwrap(), gwei(70));
    }

    #[test]
    fn urgency_scales_priority() {
        let oracle = GasOracle::new();
        oracle.observe_block(gwei(100), U256::from(15_000_000u64), U256::from(30_000_000u64));
        let neutral = oracle.optimal_params(3).unwrap();
        let aggressive = oracle.optimal_params(5).unwrap();
        assert_eq!(neutral.priority_fee, gwei(2));
        assert_eq!(aggressive.priority_fee, gwei(2) * U256::from(5) / U256::from(3));
        assert_eq!(aggressive.gas_limit, 500_000);
    }

    #[test]
    fn history_is_bounded() {
        let oracle = GasOracle::new();
        for i in 0..50 {
            oracle.observe_block(gwei(10 + i), U256::from(15_000_000u64), U256::from(30_000_000u64));
        }
        assert_eq!(oracle.observation_count(), 20);
    }
}
