use crate::action_space::{argmax, CatalogAction};
use crate::error::StrategyError;
use crate::exploration::EpsilonGreedy;
use crate::ledger::TransitionLedger;
use crate::{InputShape, StrategyAgent, UpdateStats};
use core_types::{Action, AgentKind, Observation, SessionMode, Transition};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// TD errors are clipped to this magnitude before the gradient step.
const TD_CLIP: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct LinearParams {
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub size_fraction: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LinearState {
    shape: InputShape,
    exploration_rate: f64,
    ledger: TransitionLedger,
    weights: Vec<Vec<f64>>,
}

/// A linear Q-function per catalog action, trained with semi-gradient Q-learning.
///
/// The feature vector is the observation extended with the position bias and a constant.
pub struct LinearQAgent {
    params: LinearParams,
    shape: InputShape,
    explorer: EpsilonGreedy,
    ledger: TransitionLedger,
    weights: Vec<Vec<f64>>,
}

impl LinearQAgent {
    pub fn new(shape: InputShape, params: LinearParams, explorer: EpsilonGreedy) -> Self {
        Self {
            weights: vec![vec![0.0; shape.dim + 2]; CatalogAction::COUNT],
            params,
            shape,
            explorer,
            ledger: TransitionLedger::default(),
        }
    }

    fn phi(observation: &Observation) -> Vec<f64> {
        let mut phi = observation.features.clone();
        phi.push(observation.position_bias());
        phi.push(1.0);
        phi
    }

    fn q(&self, phi: &[f64], action: usize) -> f64 {
        self.weights[action].iter().zip(phi).map(|(w, x)| w * x).sum()
    }

    pub fn q_values(&self, observation: &Observation) -> Vec<f64> {
        let phi = Self::phi(observation);
        (0..CatalogAction::COUNT).map(|a| self.q(&phi, a)).collect()
    }
}

impl StrategyAgent for LinearQAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Linear
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

            let phi = Self::phi(&transition.observation);
            let a = CatalogAction::of(&transition.action).index();
            let next_best = if transition.done {
                0.0
            } else {
                self.q_values(&transition.next_observation)
                    .into_iter()
                    .fold(f64::NEG_INFINITY, f64::max)
            };
            let td = transition.reward.value + self.params.discount_factor * next_best - self.q(&phi, a);
            let step = self.params.learning_rate * td.clamp(-TD_CLIP, TD_CLIP);
            for (w, x) in self.weights[a].iter_mut().zip(&phi) {
                *w += step * x;
            }

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
        let state = LinearState {
            shape: self.shape,
            exploration_rate: self.explorer.base_rate(),
            ledger: self.ledger.clone(),
            weights: self.weights.clone(),
        };
        Ok(bincode::serialize(&state)?)
    }

    fn deserialize(&mut self, blob: &[u8]) -> Result<(), StrategyError> {
        let state: LinearState = bincode::deserialize(blob)?;
        let dims_ok = state.weights.len() == CatalogAction::COUNT
            && state.weights.iter().all(|w| w.len() == self.shape.dim + 2);
        if state.shape != self.shape || !dims_ok {
            return Err(StrategyError::ShapeMismatch {
                expected_version: self.shape.schema_version,
                expected_dim: self.shape.dim,
                actual_version: state.shape.schema_version,
                actual_dim: state.shape.dim,
            });
        }
        self.explorer.set_base_rate(state.exploration_rate);
        self.ledger = state.ledger;
        self.weights = state.weights;
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
