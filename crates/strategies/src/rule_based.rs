use crate::action_space::CatalogAction;
use crate::error::StrategyError;
use crate::ledger::TransitionLedger;
use crate::{InputShape, StrategyAgent, UpdateStats};
use core_types::{Action, AgentKind, Direction, Observation, SessionMode, Transition};
use market_state::FeatureSchema;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Momentum beyond which the fallback policy acts.
pub const DEFAULT_MOMENTUM_THRESHOLD: f64 = 0.002;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RuleState {
    shape: InputShape,
    threshold: f64,
    ledger: TransitionLedger,
}

/// A fixed momentum/sentiment policy used as a baseline and fallback.
///
/// It follows momentum when sentiment does not disagree, and exits the oldest position
/// once momentum turns against it. It never learns, but it still tracks applied
/// transitions so watermarks stay monotonic when it stands in for a learned agent.
pub struct RuleBasedAgent {
    shape: InputShape,
    momentum_index: usize,
    sentiment_index: Option<usize>,
    threshold: f64,
    size_fraction: Decimal,
    ledger: TransitionLedger,
}

impl RuleBasedAgent {
    pub fn new(
        schema: &FeatureSchema,
        threshold: f64,
        size_fraction: Decimal,
    ) -> Result<Self, StrategyError> {
        let momentum_index = schema
            .index_of("momentum_5")
            .or_else(|| schema.index_of("last_return"))
            .ok_or_else(|| {
                StrategyError::InvalidParameters(
                    "rule-based agent needs a momentum_5 or last_return feature".to_string(),
                )
            })?;
        if threshold <= 0.0 {
            return Err(StrategyError::InvalidParameters(
                "momentum threshold must be positive".to_string(),
            ));
        }
        Ok(Self {
            shape: InputShape {
                schema_version: schema.version,
                dim: schema.dim(),
            },
            momentum_index,
            sentiment_index: schema.index_of("sentiment"),
            threshold,
            size_fraction,
            ledger: TransitionLedger::default(),
        })
    }

    fn choose(&self, observation: &Observation) -> CatalogAction {
        let momentum = observation.features[self.momentum_index];
        let sentiment = self
            .sentiment_index
            .map(|i| observation.features[i])
            .unwrap_or(0.0);

        if let Some(oldest) = observation.positions.iter().min_by_key(|p| p.opened_at) {
            let against = match oldest.direction {
                Direction::Long => momentum < -self.threshold,
                Direction::Short => momentum > self.threshold,
            };
            return if against {
                CatalogAction::ExitOldest
            } else {
                CatalogAction::Hold
            };
        }

        if momentum > self.threshold && sentiment >= 0.0 {
            CatalogAction::EnterLong
        } else if momentum < -self.threshold && sentiment <= 0.0 {
            CatalogAction::EnterShort
        } else {
            CatalogAction::Hold
        }
    }
}

impl StrategyAgent for RuleBasedAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::RuleBased
    }

    fn input_shape(&self) -> InputShape {
        self.shape
    }

    fn propose(&mut self, observation: &Observation) -> Result<Action, StrategyError> {
        self.shape.check(observation)?;
        self.choose(observation)
            .resolve(observation, self.size_fraction)
    }

    fn update(&mut self, batch: &[Transition]) -> Result<UpdateStats, StrategyError> {
        let mut stats = UpdateStats::default();
        for transition in batch {
            if self.ledger.insert(transition.id) {
                stats.applied += 1;
            } else {
                stats.skipped += 1;
            }
        }
        Ok(stats)
    }

    fn serialize(&self) -> Result<Vec<u8>, StrategyError> {
        Ok(bincode::serialize(&RuleState {
            shape: self.shape,
            threshold: self.threshold,
            ledger: self.ledger.clone(),
        })?)
    }

    fn deserialize(&mut self, blob: &[u8]) -> Result<(), StrategyError> {
        let state: RuleState = bincode::deserialize(blob)?;
        if state.shape != self.shape {
            return Err(StrategyError::ShapeMismatch {
                expected_version: self.shape.schema_version,
                expected_dim: self.shape.dim,
                actual_version: state.shape.schema_version,
                actual_dim: state.shape.dim,
            });
        }
        self.threshold = state.threshold;
        self.ledger = state.ledger;
        Ok(())
    }

    fn set_mode(&mut self, _mode: SessionMode) {}

    fn on_episode_end(&mut self) {}

    fn applied_watermark(&self) -> u64 {
        self.ledger.watermark()
    }

    fn exploration_rate(&self) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::PositionView;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn obs(momentum: f64, sentiment: f64, positions: Vec<PositionView>) -> Observation {
        let mut features = vec![0.0; 7];
        features[1] = momentum;
        features[6] = sentiment;
        Observation {
            schema_version: 1,
            instrument: "BTCUSDT".to_string(),
            timestamp: Utc::now(),
            reference_price: dec!(100),
            features,
            complete: true,
            positions,
        }
    }

    fn agent() -> RuleBasedAgent {
        RuleBasedAgent::new(&FeatureSchema::v1(true), DEFAULT_MOMENTUM_THRESHOLD, dec!(0.1)).unwrap()
    }

    #[test]
    fn follows_momentum_confirmed_by_sentiment() {
        let mut agent = agent();
        assert_eq!(
            agent.propose(&obs(0.01, 0.3, Vec::new())).unwrap(),
            Action::enter(Direction::Long, dec!(0.1)).unwrap()
        );
        assert_eq!(
            agent.propose(&obs(-0.01, -0.3, Vec::new())).unwrap(),
            Action::enter(Direction::Short, dec!(0.1)).unwrap()
        );
        assert_eq!(agent.propose(&obs(0.01, -0.3, Vec::new())).unwrap(), Action::Hold);
        assert_eq!(agent.propose(&obs(0.001, 0.3, Vec::new())).unwrap(), Action::Hold);
    }

    #[test]
    fn exits_when_momentum_turns_against_the_position() {
        let mut agent = agent();
        let long = PositionView {
            position_id: Uuid::new_v4(),
            direction: Direction::Long,
            entry_price: dec!(100),
            stop_loss_price: dec!(98),
            opened_at: Utc::now(),
        };
        assert_eq!(
            agent.propose(&obs(-0.01, 0.0, vec![long.clone()])).unwrap(),
            Action::Exit { position_id: long.position_id }
        );
        assert_eq!(agent.propose(&obs(0.01, 0.0, vec![long])).unwrap(), Action::Hold);
    }
}
