use configuration::RlSettings;
use core_types::RewardSignal;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Weights of the reward formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardWeights {
    /// Multiplies any increase in drawdown.
    pub risk_penalty_weight: f64,
    /// Charged when the governor vetoes a proposal.
    pub veto_penalty: f64,
}

impl RewardWeights {
    pub fn from_settings(settings: &RlSettings) -> Self {
        Self {
            risk_penalty_weight: settings.risk_penalty_weight,
            veto_penalty: settings.veto_penalty,
        }
    }
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self::from_settings(&RlSettings::default())
    }
}

/// `realized_delta / equity_before - w * max(0, drawdown_after - drawdown_before)`.
///
/// Strictly increasing in `realized_delta` for a fixed drawdown change.
pub fn shape(
    realized_delta: Decimal,
    equity_before: Decimal,
    drawdown_before: Decimal,
    drawdown_after: Decimal,
    weights: &RewardWeights,
) -> RewardSignal {
    let pnl_return = if equity_before > Decimal::ZERO {
        (realized_delta / equity_before).to_f64().unwrap_or(0.0)
    } else {
        0.0
    };
    let drawdown_increase = (drawdown_after - drawdown_before)
        .max(Decimal::ZERO)
        .to_f64()
        .unwrap_or(0.0);
    let risk_penalty = weights.risk_penalty_weight * drawdown_increase;

    RewardSignal {
        realized_pnl: realized_delta,
        risk_penalty,
        value: pnl_return - risk_penalty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rust_decimal_macros::dec;

    #[test]
    fn drawdown_increase_is_penalized_and_recovery_is_not_rewarded() {
        let weights = RewardWeights { risk_penalty_weight: 2.0, veto_penalty: 0.0 };
        let worse = shape(Decimal::ZERO, dec!(1000), dec!(0.01), dec!(0.03), &weights);
        assert!((worse.risk_penalty - 0.04).abs() < 1e-12);
        assert!((worse.value + 0.04).abs() < 1e-12);

        let better = shape(Decimal::ZERO, dec!(1000), dec!(0.03), dec!(0.01), &weights);
        assert_eq!(better.value, 0.0);
    }

    #[test]
    fn reward_is_strictly_increasing_in_realized_pnl() {
        let mut rng = StdRng::seed_from_u64(11);
        let weights = RewardWeights::default();
        for _ in 0..500 {
            let equity = Decimal::from(rng.gen_range(1_000i64..10_000_000));
            let dd_before = Decimal::new(rng.gen_range(0i64..500), 3);
            let dd_after = Decimal::new(rng.gen_range(0i64..500), 3);
            let low = Decimal::new(rng.gen_range(-1_000_000i64..1_000_000), 2);
            let step = Decimal::new(rng.gen_range(100i64..1_000_000), 2);

            let a = shape(low, equity, dd_before, dd_after, &weights);
            let b = shape(low + step, equity, dd_before, dd_after, &weights);
            assert_eq!(a.risk_penalty, b.risk_penalty);
            assert!(b.value > a.value, "{} !> {} for +{step}", b.value, a.value);
        }
    }

    #[test]
    fn zero_equity_contributes_no_return() {
        let signal = shape(dec!(50), Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, &RewardWeights::default());
        assert_eq!(signal.value, 0.0);
        assert_eq!(signal.realized_pnl, dec!(50));
    }
}
