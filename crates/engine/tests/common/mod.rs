#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use configuration::Config;
use core_types::{Action, AgentKind, Direction, Fill, Observation, OrderRequest, SessionMode, Transition};
use executor::{Executor, ExecutorError};
use market_state::RawSnapshot;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strategies::{InputShape, StrategyAgent, StrategyError, UpdateStats};

pub const INSTRUMENT: &str = "BTCUSDT";

/// Defaults with frictionless fills and short backoffs.
pub fn config() -> Config {
    let mut config = Config::default();
    config.rl.batch_size = 4;
    config.rl.max_steps_per_episode = 50;
    config.execution.slippage_pct = Decimal::ZERO;
    config.execution.taker_fee_pct = Decimal::ZERO;
    config.observation.backoff_initial_ms = 10;
    config.observation.backoff_max_ms = 40;
    config
}

/// Twenty bars of alternating closes ending at `last`.
pub fn snapshot(tick: i64, last: Decimal, sentiment: Option<f64>) -> RawSnapshot {
    let prices = (0..20)
        .map(|i| if i % 2 == 0 { last + dec!(0.5) } else { last })
        .collect();
    RawSnapshot {
        instrument: INSTRUMENT.to_string(),
        timestamp: DateTime::<Utc>::UNIX_EPOCH + ChronoDuration::minutes(tick),
        prices,
        volumes: vec![dec!(10); 20],
        sentiment,
        indicators: HashMap::new(),
        liquidity: Some(dec!(1000000)),
    }
}

pub fn snapshots(prices: &[Decimal]) -> Vec<RawSnapshot> {
    prices
        .iter()
        .enumerate()
        .map(|(i, price)| snapshot(i as i64, *price, Some(0.1)))
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub enum Step {
    Hold,
    Enter(Direction, Decimal),
    ExitOldest,
}

/// Plays back a fixed list of decisions, then holds. Records every batch it learns from.
pub struct ScriptedAgent {
    script: VecDeque<Step>,
    watermark: u64,
    pub learned: Arc<Mutex<Vec<Transition>>>,
}

impl ScriptedAgent {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script: script.into(),
            watermark: 0,
            learned: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl StrategyAgent for ScriptedAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::RuleBased
    }

    fn input_shape(&self) -> InputShape {
        InputShape { schema_version: 1, dim: 7 }
    }

    fn propose(&mut self, observation: &Observation) -> Result<Action, StrategyError> {
        Ok(match self.script.pop_front().unwrap_or(Step::Hold) {
            Step::Hold => Action::Hold,
            Step::Enter(direction, size) => Action::enter(direction, size)?,
            Step::ExitOldest => match observation.positions.first() {
                Some(position) => Action::Exit { position_id: position.position_id },
                None => Action::Hold,
            },
        })
    }

    fn update(&mut self, batch: &[Transition]) -> Result<UpdateStats, StrategyError> {
        let mut learned = self.learned.lock().unwrap();
        let mut stats = UpdateStats::default();
        for transition in batch {
            if transition.id <= self.watermark {
                stats.skipped += 1;
                continue;
            }
            self.watermark = transition.id;
            learned.push(transition.clone());
            stats.applied += 1;
        }
        Ok(stats)
    }

    fn serialize(&self) -> Result<Vec<u8>, StrategyError> {
        Ok(self.watermark.to_le_bytes().to_vec())
    }

    fn deserialize(&mut self, blob: &[u8]) -> Result<(), StrategyError> {
        let bytes: [u8; 8] = blob
            .try_into()
            .map_err(|_| StrategyError::InvalidParameters("bad blob".to_string()))?;
        self.watermark = u64::from_le_bytes(bytes);
        Ok(())
    }

    fn set_mode(&mut self, _mode: SessionMode) {}

    fn on_episode_end(&mut self) {}

    fn applied_watermark(&self) -> u64 {
        self.watermark
    }

    fn exploration_rate(&self) -> f64 {
        0.0
    }
}

/// A venue that never answers.
pub struct StalledExecutor;

#[async_trait]
impl Executor for StalledExecutor {
    async fn submit(&self, _order: &OrderRequest) -> Result<Fill, ExecutorError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(ExecutorError::Rejected("answered too late".to_string()))
    }
}
