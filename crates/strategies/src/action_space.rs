use crate::error::StrategyError;
use core_types::{Action, Direction, Observation, PositionView};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// The discrete actions a learned policy chooses between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CatalogAction {
    Hold,
    EnterLong,
    EnterShort,
    /// Exit the oldest open position.
    ExitOldest,
    /// Move the oldest position's stop halfway towards the price.
    TightenStop,
}

impl CatalogAction {
    pub const ALL: [CatalogAction; 5] = [
        CatalogAction::Hold,
        CatalogAction::EnterLong,
        CatalogAction::EnterShort,
        CatalogAction::ExitOldest,
        CatalogAction::TightenStop,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        match self {
            CatalogAction::Hold => 0,
            CatalogAction::EnterLong => 1,
            CatalogAction::EnterShort => 2,
            CatalogAction::ExitOldest => 3,
            CatalogAction::TightenStop => 4,
        }
    }

    /// Maps an executed action back onto the catalog entry that produced it.
    pub fn of(action: &Action) -> Self {
        match action {
            Action::Hold => CatalogAction::Hold,
            Action::Enter {
                direction: Direction::Long,
                ..
            } => CatalogAction::EnterLong,
            Action::Enter {
                direction: Direction::Short,
                ..
            } => CatalogAction::EnterShort,
            Action::Exit { .. } => CatalogAction::ExitOldest,
            Action::AdjustStop { .. } => CatalogAction::TightenStop,
        }
    }

    /// Turns a catalog choice into a concrete action for `observation`.
    ///
    /// Position actions degrade to `Hold` when the observation shows no open position.
    pub fn resolve(
        self,
        observation: &Observation,
        size_fraction: Decimal,
    ) -> Result<Action, StrategyError> {
        let action = match self {
            CatalogAction::Hold => Action::Hold,
            CatalogAction::EnterLong => Action::enter(Direction::Long, size_fraction)?,
            CatalogAction::EnterShort => Action::enter(Direction::Short, size_fraction)?,
            CatalogAction::ExitOldest => match oldest(&observation.positions) {
                Some(position) => Action::Exit {
                    position_id: position.position_id,
                },
                None => Action::Hold,
            },
            CatalogAction::TightenStop => match oldest(&observation.positions) {
                Some(position) => Action::AdjustStop {
                    position_id: position.position_id,
                    new_stop: position.stop_loss_price
                        + (observation.reference_price - position.stop_loss_price) * dec!(0.5),
                },
                None => Action::Hold,
            },
        };
        Ok(action)
    }
}

fn oldest(positions: &[PositionView]) -> Option<&PositionView> {
    positions.iter().min_by_key(|p| p.opened_at)
}

/// Index of the largest value; the first one wins ties so an untrained policy holds.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn observation(positions: Vec<PositionView>) -> Observation {
        Observation {
            schema_version: 1,
            instrument: "BTCUSDT".to_string(),
            timestamp: Utc::now(),
            reference_price: dec!(100),
            features: vec![0.0; 3],
            complete: true,
            positions,
        }
    }

    fn view(direction: Direction, stop: Decimal, age_minutes: i64) -> PositionView {
        PositionView {
            position_id: Uuid::new_v4(),
            direction,
            entry_price: dec!(100),
            stop_loss_price: stop,
            opened_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    #[test]
    fn position_actions_degrade_to_hold_when_flat() {
        let flat = observation(Vec::new());
        assert_eq!(CatalogAction::ExitOldest.resolve(&flat, dec!(0.1)).unwrap(), Action::Hold);
        assert_eq!(CatalogAction::TightenStop.resolve(&flat, dec!(0.1)).unwrap(), Action::Hold);
    }

    #[test]
    fn exit_targets_the_oldest_position() {
        let old = view(Direction::Long, dec!(98), 10);
        let young = view(Direction::Long, dec!(98), 1);
        let obs = observation(vec![young, old.clone()]);
        assert_eq!(
            CatalogAction::ExitOldest.resolve(&obs, dec!(0.1)).unwrap(),
            Action::Exit { position_id: old.position_id }
        );
    }

    #[test]
    fn tighten_moves_stop_halfway_to_price_for_both_sides() {
        let long = view(Direction::Long, dec!(98), 1);
        let obs = observation(vec![long.clone()]);
        assert_eq!(
            CatalogAction::TightenStop.resolve(&obs, dec!(0.1)).unwrap(),
            Action::AdjustStop { position_id: long.position_id, new_stop: dec!(99) }
        );

        let short = view(Direction::Short, dec!(102), 1);
        let obs = observation(vec![short.clone()]);
        assert_eq!(
            CatalogAction::TightenStop.resolve(&obs, dec!(0.1)).unwrap(),
            Action::AdjustStop { position_id: short.position_id, new_stop: dec!(101) }
        );
    }

    #[test]
    fn catalog_round_trips_through_actions() {
        let obs = observation(vec![view(Direction::Short, dec!(102), 1)]);
        for entry in CatalogAction::ALL {
            let action = entry.resolve(&obs, dec!(0.2)).unwrap();
            assert_eq!(CatalogAction::of(&action), entry);
        }
    }

    #[test]
    fn argmax_prefers_first_on_ties() {
        assert_eq!(argmax(&[0.0, 0.0, 0.0]), 0);
        assert_eq!(argmax(&[0.0, 1.0, 1.0]), 1);
    }
}
