use crate::engine::AnalyticsEngine;
use crate::error::AnalyticsError;
use crate::report::PerformanceSummary;
use crate::reward::{shape, RewardWeights};
use chrono::{DateTime, Utc};
use core_types::{Action, RewardSignal};
use executor::Valuation;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What became of the agent's proposal on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// An order was approved and filled.
    Executed,
    /// The approved action needed no order.
    Held,
    Vetoed,
    /// Rejected or timed out at the execution boundary.
    ExecutionFailed,
}

/// Aggregates realized P&L, drawdown and reward over an episode.
#[derive(Debug)]
pub struct PerformanceTracker {
    weights: RewardWeights,
    engine: AnalyticsEngine,
    initial_equity: Decimal,
    equity_curve: Vec<(DateTime<Utc>, Decimal)>,
    last: Option<Valuation>,
    ticks: u64,
    cumulative_reward: f64,
    vetoes: u64,
    failed_executions: u64,
}

impl PerformanceTracker {
    pub fn new(weights: RewardWeights, initial_equity: Decimal) -> Self {
        Self {
            weights,
            engine: AnalyticsEngine::new(),
            initial_equity,
            equity_curve: Vec::new(),
            last: None,
            ticks: 0,
            cumulative_reward: 0.0,
            vetoes: 0,
            failed_executions: 0,
        }
    }

    /// Scores one tick and appends it to the equity curve.
    pub fn record(
        &mut self,
        before: &Valuation,
        after: &Valuation,
        action: &Action,
        disposition: Disposition,
        timestamp: DateTime<Utc>,
    ) -> RewardSignal {
        let reward = match disposition {
            Disposition::Vetoed => {
                self.vetoes += 1;
                RewardSignal {
                    realized_pnl: Decimal::ZERO,
                    risk_penalty: 0.0,
                    value: -self.weights.veto_penalty,
                }
            }
            Disposition::ExecutionFailed => {
                self.failed_executions += 1;
                RewardSignal::zero()
            }
            // Drawdown is measured from the previous tick's close so that
            // price moves between ticks reach the penalty, not only fees.
            Disposition::Executed | Disposition::Held => shape(
                after.realized_pnl - before.realized_pnl,
                before.equity,
                self.last.map_or(before.drawdown, |last| last.drawdown),
                after.drawdown,
                &self.weights,
            ),
        };

        tracing::trace!(
            action = action.label(),
            ?disposition,
            reward = reward.value,
            equity = %after.equity,
            "Tick recorded"
        );

        self.ticks += 1;
        self.cumulative_reward += reward.value;
        self.equity_curve.push((timestamp, after.equity));
        self.last = Some(*after);
        reward
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn equity_curve(&self) -> &[(DateTime<Utc>, Decimal)] {
        &self.equity_curve
    }

    pub fn summary(&self) -> Result<PerformanceSummary, AnalyticsError> {
        let last = self.last.unwrap_or_default();
        let final_equity = if self.last.is_some() {
            last.equity
        } else {
            self.initial_equity
        };
        let cumulative_return = if self.initial_equity > Decimal::ZERO {
            (final_equity - self.initial_equity) / self.initial_equity
        } else {
            Decimal::ZERO
        };
        let win_rate = (last.closed_trades > 0)
            .then(|| Decimal::from(last.winning_trades) / Decimal::from(last.closed_trades));

        // The curve starts from the initial equity so a loss on the first tick counts.
        let mut curve = Vec::with_capacity(self.equity_curve.len() + 1);
        if let Some(&(first_ts, _)) = self.equity_curve.first() {
            curve.push((first_ts, self.initial_equity));
        }
        curve.extend_from_slice(&self.equity_curve);

        Ok(PerformanceSummary {
            cumulative_return,
            max_drawdown: self.engine.max_drawdown(&curve),
            win_rate,
            sharpe_estimate: self.engine.sharpe_estimate(&curve)?,
            total_trades: last.closed_trades,
            ticks: self.ticks,
            cumulative_reward: self.cumulative_reward,
            final_equity,
            realized_pnl: last.realized_pnl,
            vetoes: self.vetoes,
            failed_executions: self.failed_executions,
        })
    }
}
