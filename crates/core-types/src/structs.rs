use crate::enums::{Direction, PositionStatus};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A compact, read-only view of an open position, attached to an `Observation` so an
/// agent can refer to the positions it may exit or tighten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
    pub position_id: Uuid,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub stop_loss_price: Decimal,
    pub opened_at: DateTime<Utc>,
}

/// The fixed-shape market state for a single decision tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Version of the feature schema that produced `features`.
    pub schema_version: u32,
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    /// The last close price the features were computed from.
    pub reference_price: Decimal,
    /// Ordered feature values, one per schema entry.
    pub features: Vec<f64>,
    /// `false` when an optional feature had to fall back to its neutral value.
    pub complete: bool,
    /// Open positions in `instrument`, oldest first. Empty until the loop attaches them.
    #[serde(default)]
    pub positions: Vec<PositionView>,
}

impl Observation {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Returns a copy of the observation carrying the given position view.
    pub fn with_positions(mut self, positions: Vec<PositionView>) -> Self {
        self.positions = positions;
        self
    }

    /// Net exposure sign of the attached positions: `1.0` long, `-1.0` short, `0.0` flat.
    pub fn position_bias(&self) -> f64 {
        let net: i32 = self
            .positions
            .iter()
            .map(|p| match p.direction {
                Direction::Long => 1,
                Direction::Short => -1,
            })
            .sum();
        f64::from(net.signum())
    }
}

/// A trading decision proposed by an agent. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    Hold,
    Enter {
        direction: Direction,
        size_fraction: Decimal,
    },
    Exit {
        position_id: Uuid,
    },
    AdjustStop {
        position_id: Uuid,
        new_stop: Decimal,
    },
}

impl Action {
    /// Builds an `Enter` action, rejecting a size fraction outside `(0, 1]`.
    pub fn enter(direction: Direction, size_fraction: Decimal) -> Result<Self, CoreError> {
        if size_fraction <= Decimal::ZERO || size_fraction > Decimal::ONE {
            return Err(CoreError::InvalidInput(
                "size_fraction".to_string(),
                format!("{size_fraction} is not in (0, 1]"),
            ));
        }
        Ok(Action::Enter {
            direction,
            size_fraction,
        })
    }

    pub fn is_entry(&self) -> bool {
        matches!(self, Action::Enter { .. })
    }

    /// Short label for logs and events.
    pub fn label(&self) -> &'static str {
        match self {
            Action::Hold => "hold",
            Action::Enter {
                direction: Direction::Long,
                ..
            } => "enter_long",
            Action::Enter {
                direction: Direction::Short,
                ..
            } => "enter_short",
            Action::Exit { .. } => "exit",
            Action::AdjustStop { .. } => "adjust_stop",
        }
    }
}

/// A single position, owned exclusively by the portfolio state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub position_id: Uuid,
    pub instrument: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    /// Quantity in base units.
    pub quantity: Decimal,
    pub stop_loss_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub status: PositionStatus,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<Decimal>,
    pub realized_pnl: Option<Decimal>,
}

impl Position {
    /// Unrealized P&L at the given mark.
    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        (mark - self.entry_price) * self.direction.sign() * self.quantity
    }

    /// Entry notional, i.e. the collateral locked by the position.
    pub fn cost_basis(&self) -> Decimal {
        self.entry_price * self.quantity
    }

    /// Whether `mark` has crossed the stop-loss price.
    pub fn is_stop_triggered(&self, mark: Decimal) -> bool {
        match self.direction {
            Direction::Long => mark <= self.stop_loss_price,
            Direction::Short => mark >= self.stop_loss_price,
        }
    }

    pub fn view(&self) -> PositionView {
        PositionView {
            position_id: self.position_id,
            direction: self.direction,
            entry_price: self.entry_price,
            stop_loss_price: self.stop_loss_price,
            opened_at: self.opened_at,
        }
    }
}

/// The reward produced for one tick, with the components that made it up.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RewardSignal {
    /// Realized P&L booked during the tick.
    pub realized_pnl: Decimal,
    /// Penalty subtracted for drawdown incurred during the tick.
    pub risk_penalty: f64,
    /// The scalar the learner consumes.
    pub value: f64,
}

impl RewardSignal {
    pub fn zero() -> Self {
        Self::default()
    }
}

/// One (observation, action, reward, next observation) tuple for the learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Monotonic id used to deduplicate replays.
    pub id: u64,
    pub observation: Observation,
    pub action: Action,
    pub reward: RewardSignal,
    pub next_observation: Observation,
    pub done: bool,
}

/// Why a position is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    Agent,
    StopLoss,
}

/// The concrete instruction sent to the execution boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderIntent {
    Open {
        direction: Direction,
        quantity: Decimal,
        stop_loss_price: Decimal,
    },
    Close {
        position_id: Uuid,
        direction: Direction,
        quantity: Decimal,
        reason: CloseReason,
    },
    AmendStop {
        position_id: Uuid,
        stop_loss_price: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: Uuid,
    pub instrument: String,
    pub intent: OrderIntent,
    /// The mark the governor sized the order against.
    pub reference_price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl OrderRequest {
    pub fn new(instrument: &str, intent: OrderIntent, reference_price: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4(),
            instrument: instrument.to_string(),
            intent,
            reference_price,
            created_at: Utc::now(),
        }
    }

    /// Quantity the order trades. Stop amendments trade nothing.
    pub fn quantity(&self) -> Decimal {
        match &self.intent {
            OrderIntent::Open { quantity, .. } | OrderIntent::Close { quantity, .. } => *quantity,
            OrderIntent::AmendStop { .. } => Decimal::ZERO,
        }
    }

    /// Marks a close order as a stop-loss liquidation.
    pub fn into_stop_loss(mut self) -> Self {
        if let OrderIntent::Close { reason, .. } = &mut self.intent {
            *reason = CloseReason::StopLoss;
        }
        self
    }
}

/// A confirmed execution received from the execution boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub fill_id: Uuid,
    pub client_order_id: Uuid,
    pub instrument: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(direction: Direction) -> Position {
        Position {
            position_id: Uuid::new_v4(),
            instrument: "BTCUSDT".to_string(),
            direction,
            entry_price: dec!(100),
            quantity: dec!(2),
            stop_loss_price: match direction {
                Direction::Long => dec!(98),
                Direction::Short => dec!(102),
            },
            opened_at: Utc::now(),
            status: PositionStatus::Open,
            closed_at: None,
            exit_price: None,
            realized_pnl: None,
        }
    }

    #[test]
    fn enter_rejects_size_outside_unit_interval() {
        assert!(Action::enter(Direction::Long, dec!(0)).is_err());
        assert!(Action::enter(Direction::Long, dec!(1.01)).is_err());
        assert!(Action::enter(Direction::Short, dec!(1)).is_ok());
    }

    #[test]
    fn short_position_profits_when_price_falls() {
        let short = position(Direction::Short);
        assert_eq!(short.unrealized_pnl(dec!(90)), dec!(20));
        assert_eq!(position(Direction::Long).unrealized_pnl(dec!(90)), dec!(-20));
    }

    #[test]
    fn stop_trigger_respects_direction() {
        assert!(position(Direction::Long).is_stop_triggered(dec!(97.5)));
        assert!(!position(Direction::Long).is_stop_triggered(dec!(99)));
        assert!(position(Direction::Short).is_stop_triggered(dec!(102)));
    }
}
