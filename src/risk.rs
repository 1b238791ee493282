// src/risk.rs

//! # Risk Controller
//!
//! Gatekeeper between strategy search and execution. Validates candidates
//! against the breaker, hourly budget, liquidity floor, gas floor and
//! drawdown cap; accounts for every settled trade; trips the circuit breaker
//! on loss streaks. The breaker is one-way — only an operator `reset()`
//! re-arms the engine.

use std::collections::VecDeque;

use ethers::utils::parse_ether;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::RiskSettings;
use crate::errors::RiskError;
use crate::types::{now_millis, ArbOpportunity, TradeRecord};

/// Trades retained for breaker evaluation and analytics.
const HISTORY_LEN: usize = 1_000;
/// Window inspected by the breaker rules.
const BREAKER_WINDOW: usize = 20;
/// Consecutive losses within the window that trip the breaker.
const MAX_CONSECUTIVE_LOSSES: usize = 10;
/// Loss ratio over the window that trips the breaker.
const MAX_LOSS_RATIO: f64 = 0.70;
/// Expected profit must clear this multiple of the gas cost.
const PROFIT_GAS_MULTIPLE: f64 = 2.0;

#[derive(Debug, Default)]
struct RiskState {
    drawdown_wei: u128,
    hourly_trade_count: u32,
    breaker_tripped: bool,
    history: VecDeque<TradeRecord>,
}

#[derive(Debug)]
pub struct RiskController {
    settings: RiskSettings,
    max_drawdown_wei: u128,
    state: Mutex<RiskState>,
}

impl RiskController {
    pub fn new(settings: RiskSettings) -> Self {
        let max_drawdown_wei = parse_ether(settings.max_drawdown_eth)
            .map(|v| v.as_u128())
            .unwrap_or(u128::MAX);
        Self {
            settings,
            max_drawdown_wei,
            state: Mutex::new(RiskState::default()),
        }
    }

    /// Accepts or rejects a candidate. `pool_liquidity_usd` is the thinnest
    /// pool the trade crosses.
    pub async fn validate(
        &self,
        candidate: &ArbOpportunity,
        pool_liquidity_usd: f64,
    ) -> Result<(), RiskError> {
        let state = self.state.lock().await;
        if state.breaker_tripped {
            return Err(RiskError::CircuitBreaker);
        }
        if state.hourly_trade_count >= self.settings.max_trades_per_hour {
            return Err(RiskError::HourlyLimit(self.settings.max_trades_per_hour));
        }
        if pool_liquidity_usd < self.settings.min_pool_liquidity_usd {
            return Err(RiskError::ThinLiquidity);
        }
        if candidate.profit_usd < candidate.gas_cost_usd * PROFIT_GAS_MULTIPLE {
            return Err(RiskError::ProfitBelowGasFloor);
        }
        if state.drawdown_wei >= self.max_drawdown_wei {
            return Err(RiskError::DrawdownCap);
        }
        Ok(())
    }

    /// Books one settled trade. Calls are serialized by the mutex in the
    /// order trades confirm on-chain.
    pub async fn record(&self, net_profit_wei: i128, gas_cost_wei: u128) {
        let mut state = self.state.lock().await;

        if net_profit_wei < 0 {
            state.drawdown_wei = state
                .drawdown_wei
                .saturating_add(net_profit_wei.unsigned_abs());
        } else {
            state.drawdown_wei = state
                .drawdown_wei
                .saturating_sub(net_profit_wei as u128);
        }

        if state.history.len() == HISTORY_LEN {
            state.history.pop_front();
        }
        state.history.push_back(TradeRecord {
            finished_millis: now_millis(),
            net_profit: net_profit_wei,
            gas_cost: gas_cost_wei,
        });
        state.hourly_trade_count = state.hourly_trade_count.saturating_add(1);

        if self.settings.enable_circuit_breaker && !state.breaker_tripped {
            if let Some(reason) = self.breaker_reason(&state) {
                state.breaker_tripped = true;
                warn!(target: "risk", reason, "Circuit breaker tripped");
            }
        }
    }

    fn breaker_reason(&self, state: &RiskState) -> Option<&'static str> {
        if state.drawdown_wei >= self.max_drawdown_wei {
            return Some("drawdown at cap");
        }
        let window: Vec<&TradeRecord> = state
            .history
            .iter()
            .rev()
            .take(BREAKER_WINDOW)
            .collect();
        if window.is_empty() {
            return None;
        }

        // window[0] is the most recent trade; a streak of losses at the head
        // is a run of consecutive losing trades.
        let mut streak = 0usize;
        let mut max_streak = 0usize;
        for record in window.iter().rev() {
            if record.is_loss() {
                streak += 1;
                max_streak = max_streak.max(streak);
            } else {
                streak = 0;
            }
        }
        if max_streak >= MAX_CONSECUTIVE_LOSSES {
            return Some("consecutive loss streak");
        }

        if window.len() == BREAKER_WINDOW {
            let losses = window.iter().filter(|r| r.is_loss()).count();
            if losses as f64 / window.len() as f64 > MAX_LOSS_RATIO {
                return Some("loss ratio over window");
            }
        }
        None
    }

    /// Operator acknowledgment; re-arms the breaker.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.breaker_tripped = false;
        info!(target: "risk", "Circuit breaker reset by operator");
    }

    /// Zeroes the hourly budget. Driven by an hourly tick independent of
    /// trade flow.
    pub async fn tick_hourly(&self) {
        let mut state = self.state.lock().await;
        state.hourly_trade_count = 0;
    }

    pub async fn is_tripped(&self) -> bool {
        self.state.lock().await.breaker_tripped
    }

    pub async fn drawdown_wei(&self) -> u128 {
        self.state.lock().await.drawdown_wei
    }

    pub async fn hourly_count(&self) -> u32 {
        self.state.lock().await.hourly_trade_count
    }

    pub async fn recent_trades(&self, n: usize) -> Vec<TradeRecord> {
        let state = self.state.lock().await;
        state.history.iter().rev().take(n).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StrategyKind;
    use ethers::types::{Address, U256};
    use smallvec::smallvec;

    fn settings() -> RiskSettings {
        RiskSettings {
            enable_circuit_breaker: true,
            max_trades_per_hour: 100,
            max_drawdown_eth: 5.0,
            min_pool_liquidity_usd: 10_000.0,
        }
    }

    fn candidate(profit_usd: f64, gas_cost_usd: f64) -> ArbOpportunity {
        ArbOpportunity {
            strategy: StrategyKind::Direct,
            borrow_asset: Address::zero(),
            borrow_amount: U256::exp10(18),
            legs: smallvec![],
            expected_profit: U256::from(1u64),
            profit_bps: 10,
            profit_usd,
            gas_estimate: 300_000,
            gas_cost_usd,
            net_profit_usd: profit_usd - gas_cost_usd,
            pool_floor_usd: 50_000.0,
            created_millis: now_millis(),
        }
    }

    #[tokio::test]
    async fn drawdown_never_goes_negative() {
        let risk = RiskController::new(settings());
        risk.record(-1_000, 10).await;
        risk.record(5_000, 10).await;
        assert_eq!(risk.drawdown_wei().await, 0);
    }

    #[tokio::test]
    async fn gains_reduce_drawdown() {
        let risk = RiskController::new(settings());
        risk.record(-10_000, 10).await;
        risk.record(4_000, 10).await;
        assert_eq!(risk.drawdown_wei().await, 6_000);
    }

    #[tokio::test]
    async fn profit_must_clear_double_gas() {
        let risk = RiskController::new(settings());
        let thin = candidate(1.0, 0.6);
        assert_eq!(
            risk.validate(&thin, 50_000.0).await,
            Err(RiskError::ProfitBelowGasFloor)
        );
        let fat = candidate(5.0, 0.6);
        assert!(risk.validate(&fat, 50_000.0).await.is_ok());
    }

    #[tokio::test]
    async fn thin_pools_are_rejected() {
        let risk = RiskController::new(settings());
        let c = candidate(10.0, 0.5);
        assert_eq!(
            risk.validate(&c, 500.0).await,
            Err(RiskError::ThinLiquidity)
        );
    }
}
