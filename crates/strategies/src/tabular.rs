use crate::action_space::{argmax, CatalogAction};
use crate::error::StrategyError;
use crate::exploration::EpsilonGreedy;
use crate::ledger::TransitionLedger;
use crate::{InputShape, StrategyAgent, UpdateStats};
use core_types::{Action, AgentKind, Observation, SessionMode, Transition};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters of the tabular Q-learner.
#[derive(Debug, Clone)]
pub struct TabularParams {
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub size_fraction: Decimal,
    /// Width of one discretization bucket in feature units.
    pub bucket_width: f64,
    /// Buckets are clamped to `-max_bucket..=max_bucket`.
    pub max_bucket: i64,
}

/// Everything that is learned. A `BTreeMap` keeps the encoding deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct TabularState {
    shape: Option<InputShape>,
    exploration_rate: f64,
    ledger: TransitionLedger,
    table: BTreeMap<String, Vec<f64>>,
}

/// Q-learning over a discretized observation space.
pub struct TabularQAgent {
    params: TabularParams,
    shape: InputShape,
    explorer: EpsilonGreedy,
    ledger: TransitionLedger,
    table: BTreeMap<String, Vec<f64>>,
}

impl TabularQAgent {
    pub fn new(
        shape: InputShape,
        params: TabularParams,
        explorer: EpsilonGreedy,
    ) -> Result<Self, StrategyError> {
        if params.bucket_width <= 0.0 || params.max_bucket < 1 {
            return Err(StrategyError::InvalidParameters(
                "bucket_width must be positive and max_bucket at least 1".to_string(),
            ));
        }
        Ok(Self {
            params,
            shape,
            explorer,
            ledger: TransitionLedger::default(),
            table: BTreeMap::new(),
        })
    }

    /// The discrete state an observation falls into, position side included.
    fn state_key(&self, observation: &Observation) -> String {
        let mut key: String = observation
            .features
            .iter()
            .map(|v| {
                let bucket = (v / self.params.bucket_width).round() as i64;
                bucket
                    .clamp(-self.params.max_bucket, self.params.max_bucket)
                    .to_string()
            })
            .collect::<Vec<_>>()
            .join(",");
        key.push('|');
        key.push_str(&(observation.position_bias() as i64).to_string());
        key
    }

    fn values(&self, key: &str) -> [f64; CatalogAction::COUNT] {
        let mut out = [0.0; CatalogAction::COUNT];
        if let Some(row) = self.table.get(key) {
            for (o, v) in out.iter_mut().zip(row) {
                *o = *v;
            }
        }
        out
    }

    pub fn q_values(&self, observation: &Observation) -> [f64; CatalogAction::COUNT] {
        self.values(&self.state_key(observation))
    }

    pub fn states_visited(&self) -> usize {
        self.table.len()
    }
}

impl StrategyAgent for TabularQAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Tabular
    }

    fn input_shape(&self) -> InputShape {
        self.shape
    }

    fn propose(&mut self, observation: &Observation) -> Result<Action, StrategyError> {
        self.shape.check(observation)?;
        let greedy = argmax(&self.q_values(observation));
        let choice = self.explorer.choose(greedy, CatalogAction::COUNT);
        CatalogAction::ALL[choice].resolve(observation, self.params.size_fraction)
    }

    fn update(&mut self, batch: &[Transition]) -> Result<UpdateStats, StrategyError> {
        let mut stats = UpdateStats::default();
        let mut td_total = 0.0;

        for transition in batch {
            if self.ledger.contains(transition.id) {
                stats.skipped += 1;
                continue;
            }
            self.shape.check(&transition.observation)?;
            self.shape.check(&transition.next_observation)?;

            let key = self.state_key(&transition.observation);
            let next_best = if transition.done {
                0.0
            } else {
                let next = self.q_values(&transition.next_observation);
                next.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            };
            let a = CatalogAction::of(&transition.action).index();

            let row = self
                .table
                .entry(key)
                .or_insert_with(|| vec![0.0; CatalogAction::COUNT]);
            let target = transition.reward.value + self.params.discount_factor * next_best;
            let td = target - row[a];
            row[a] += self.params.learning_rate * td;

            self.ledger.insert(transition.id);
            td_total += td.abs();
            stats.applied += 1;
        }

        if stats.applied > 0 {
            stats.mean_td_error = td_total / stats.applied as f64;
        }
        Ok(stats)
    }

    fn serialize(&self) -> Result<Vec<u8>, StrategyError> {
        let state = TabularState {
            shape: Some(self.shape),
            exploration_rate: self.explorer.base_rate(),
            ledger: self.ledger.clone(),
            table: self.table.clone(),
        };
        Ok(bincode::serialize(&state)?)
    }

    fn deserialize(&mut self, blob: &[u8]) -> Result<(), StrategyError> {
        let state: TabularState = bincode::deserialize(blob)?;
        if let Some(shape) = state.shape {
            if shape != self.shape {
                return Err(StrategyError::ShapeMismatch {
                    expected_version: self.shape.schema_version,
                    expected_dim: self.shape.dim,
                    actual_version: shape.schema_version,
                    actual_dim: shape.dim,
                });
            }
        }
        self.explorer.set_base_rate(state.exploration_rate);
        self.ledger = state.ledger;
        self.table = state.table;
        Ok(())
    }

    fn set_mode(&mut self, mode: SessionMode) {
        self.explorer.set_mode(mode);
    }

    fn on_episode_end(&mut self) {
        self.explorer.decay();
    }

    fn applied_watermark(&self) -> u64 {
        self.ledger.watermark()
    }

    fn exploration_rate(&self) -> f64 {
        self.explorer.effective_rate()
    }
}
