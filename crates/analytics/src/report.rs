use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregated performance of one episode.
///
/// This struct is the final output of the `PerformanceTracker` and is carried in the
/// episode report the engine checkpoints and prints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceSummary {
    /// `(final_equity - initial_equity) / initial_equity`.
    pub cumulative_return: Decimal,
    /// Fraction of peak equity.
    pub max_drawdown: Decimal,
    /// `None` before the first closed trade.
    pub win_rate: Option<Decimal>,
    pub sharpe_estimate: Option<Decimal>,
    pub total_trades: u32,
    pub ticks: u64,
    pub cumulative_reward: f64,
    pub final_equity: Decimal,
    pub realized_pnl: Decimal,
    pub vetoes: u64,
    pub failed_executions: u64,
}
