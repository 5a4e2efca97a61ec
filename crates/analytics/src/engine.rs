use crate::error::AnalyticsError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;

/// A stateless calculator for deriving risk metrics from an equity curve.
#[derive(Debug, Default)]
pub struct AnalyticsEngine {}

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest peak-to-trough decline of the curve, as a fraction of the peak.
    pub fn max_drawdown(&self, equity_curve: &[(DateTime<Utc>, Decimal)]) -> Decimal {
        let Some(&(_, first)) = equity_curve.first() else {
            return Decimal::ZERO;
        };
        let mut peak = first;
        let mut max_drawdown = Decimal::ZERO;

        for &(_timestamp, equity) in equity_curve {
            if equity > peak {
                peak = equity;
            }
            if peak > Decimal::ZERO {
                let drawdown = (peak - equity) / peak;
                if drawdown > max_drawdown {
                    max_drawdown = drawdown;
                }
            }
        }
        max_drawdown
    }

    /// Per-tick Sharpe estimate (risk-free rate zero, not annualized).
    ///
    /// `None` with fewer than two returns or a flat curve.
    pub fn sharpe_estimate(
        &self,
        equity_curve: &[(DateTime<Utc>, Decimal)],
    ) -> Result<Option<Decimal>, AnalyticsError> {
        // 1. Calculate periodic returns
        let returns: Vec<Decimal> = equity_curve
            .windows(2)
            .filter(|w| w[0].1 > Decimal::ZERO)
            .map(|w| (w[1].1 - w[0].1) / w[0].1)
            .collect();

        if returns.len() < 2 {
            return Ok(None);
        }

        // 2. Calculate the mean of returns
        let n = Decimal::from(returns.len());
        let mean_return = returns.iter().sum::<Decimal>() / n;

        // 3. Calculate the standard deviation of returns
        let variance = returns
            .iter()
            .map(|r| (*r - mean_return) * (*r - mean_return))
            .sum::<Decimal>()
            / n;
        if variance <= Decimal::ZERO {
            return Ok(None);
        }

        let std_dev = variance.sqrt().ok_or(AnalyticsError::Variance(variance))?;

        Ok((std_dev > Decimal::ZERO).then(|| mean_return / std_dev))
    }
}
