use crate::error::CoreError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Session-wide risk limits. Validated on construction and never mutated afterwards;
/// a new set may only be installed between episodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    max_position_size_fraction: Decimal,
    stop_loss_fraction: Decimal,
    max_drawdown_fraction: Decimal,
    recovery_fraction: Decimal,
    fatal_drawdown_fraction: Decimal,
    fatal_breach_ticks: u32,
}

impl RiskLimits {
    pub fn new(
        max_position_size_fraction: Decimal,
        stop_loss_fraction: Decimal,
        max_drawdown_fraction: Decimal,
        recovery_fraction: Decimal,
        fatal_drawdown_fraction: Decimal,
        fatal_breach_ticks: u32,
    ) -> Result<Self, CoreError> {
        if max_position_size_fraction <= Decimal::ZERO || max_position_size_fraction > Decimal::ONE {
            return Err(CoreError::InvalidLimit(
                "max_position_size_fraction",
                format!("{max_position_size_fraction} is not in (0, 1]"),
            ));
        }
        if stop_loss_fraction <= Decimal::ZERO {
            return Err(CoreError::InvalidLimit(
                "stop_loss_fraction",
                format!("{stop_loss_fraction} must be greater than 0"),
            ));
        }
        if max_drawdown_fraction <= Decimal::ZERO || max_drawdown_fraction > Decimal::ONE {
            return Err(CoreError::InvalidLimit(
                "max_drawdown_fraction",
                format!("{max_drawdown_fraction} is not in (0, 1]"),
            ));
        }
        if recovery_fraction <= Decimal::ZERO || recovery_fraction >= Decimal::ONE {
            return Err(CoreError::InvalidLimit(
                "recovery_fraction",
                format!("{recovery_fraction} is not in (0, 1)"),
            ));
        }
        // With a halt at 1 the fatal bar may only equal it; the breach count still separates them.
        let fatal_too_low = if max_drawdown_fraction == Decimal::ONE {
            fatal_drawdown_fraction < max_drawdown_fraction
        } else {
            fatal_drawdown_fraction <= max_drawdown_fraction
        };
        if fatal_too_low || fatal_drawdown_fraction > Decimal::ONE {
            return Err(CoreError::InvalidLimit(
                "fatal_drawdown_fraction",
                format!(
                    "{fatal_drawdown_fraction} must be above max_drawdown_fraction ({max_drawdown_fraction}) and at most 1"
                ),
            ));
        }
        if fatal_breach_ticks == 0 {
            return Err(CoreError::InvalidLimit(
                "fatal_breach_ticks",
                "must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_position_size_fraction,
            stop_loss_fraction,
            max_drawdown_fraction,
            recovery_fraction,
            fatal_drawdown_fraction,
            fatal_breach_ticks,
        })
    }

    pub fn max_position_size_fraction(&self) -> Decimal {
        self.max_position_size_fraction
    }

    pub fn stop_loss_fraction(&self) -> Decimal {
        self.stop_loss_fraction
    }

    pub fn max_drawdown_fraction(&self) -> Decimal {
        self.max_drawdown_fraction
    }

    pub fn fatal_drawdown_fraction(&self) -> Decimal {
        self.fatal_drawdown_fraction
    }

    pub fn fatal_breach_ticks(&self) -> u32 {
        self.fatal_breach_ticks
    }

    /// Drawdown below which an exit-only halt is lifted again.
    pub fn recovery_threshold(&self) -> Decimal {
        self.max_drawdown_fraction * self.recovery_fraction
    }
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_size_fraction: dec!(0.1),
            stop_loss_fraction: dec!(0.02),
            max_drawdown_fraction: dec!(0.15),
            recovery_fraction: dec!(0.5),
            fatal_drawdown_fraction: dec!(0.25),
            fatal_breach_ticks: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_fractions() {
        assert!(RiskLimits::new(dec!(0), dec!(0.02), dec!(0.15), dec!(0.5), dec!(0.25), 1).is_err());
        assert!(RiskLimits::new(dec!(1.5), dec!(0.02), dec!(0.15), dec!(0.5), dec!(0.25), 1).is_err());
        assert!(RiskLimits::new(dec!(0.1), dec!(0), dec!(0.15), dec!(0.5), dec!(0.25), 1).is_err());
        assert!(RiskLimits::new(dec!(0.1), dec!(0.02), dec!(1.2), dec!(0.5), dec!(0.25), 1).is_err());
    }

    #[test]
    fn fatal_bar_must_sit_above_halt_bar() {
        let err = RiskLimits::new(dec!(0.1), dec!(0.02), dec!(0.15), dec!(0.5), dec!(0.15), 1);
        assert!(matches!(err, Err(CoreError::InvalidLimit("fatal_drawdown_fraction", _))));
    }

    #[test]
    fn a_halt_at_full_drawdown_accepts_an_equal_fatal_bar() {
        let limits = RiskLimits::new(dec!(0.1), dec!(0.02), dec!(1), dec!(0.5), dec!(1), 1).unwrap();
        assert_eq!(limits.max_drawdown_fraction(), Decimal::ONE);
        assert_eq!(limits.fatal_drawdown_fraction(), Decimal::ONE);

        let err = RiskLimits::new(dec!(0.1), dec!(0.02), dec!(1), dec!(0.5), dec!(0.99), 1);
        assert!(matches!(err, Err(CoreError::InvalidLimit("fatal_drawdown_fraction", _))));
    }

    #[test]
    fn recovery_threshold_is_half_the_trigger_by_default() {
        assert_eq!(RiskLimits::default().recovery_threshold(), dec!(0.075));
    }
}
