use core_types::{AgentKind, RiskLimits, SessionMode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// The root configuration structure for the entire application.
///
/// Every section has defaults, so a config file only needs to name what it changes.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub data_sources: DataSources,
    pub rl: RlSettings,
    pub risk_management: RiskManagement,
    pub execution: Execution,
    pub observation: ObservationSettings,
    pub persistence: Persistence,
    pub logging: Logging,
}

/// Identifiers of the upstream data collaborators, one per asset class.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataSources {
    pub crypto: String,
    pub stocks: String,
    pub news: String,
    /// Polling interval of the data collaborator, in seconds. `0` polls as fast as the
    /// feed yields (backtests).
    pub update_interval_secs: u64,
    /// How much history a replay feed should cover.
    pub historical_days: u32,
}

impl DataSources {
    /// Pause between ticks of a paced session; `None` when the interval is zero.
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.update_interval_secs > 0).then(|| Duration::from_secs(self.update_interval_secs))
    }
}

impl Default for DataSources {
    fn default() -> Self {
        Self {
            crypto: "binance".to_string(),
            stocks: "yfinance".to_string(),
            news: "newsapi.org".to_string(),
            update_interval_secs: 60,
            historical_days: 365,
        }
    }
}

/// Parameters of the learning agent and the training loop.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RlSettings {
    pub agent: AgentKind,
    pub episodes: u32,
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub exploration_rate: f64,
    /// Multiplied into the exploration rate after each episode.
    pub exploration_decay: f64,
    pub exploration_min: f64,
    /// Transitions accumulated before each policy update.
    pub batch_size: usize,
    pub max_steps_per_episode: u64,
    /// Size fraction the agent requests when it enters a position.
    pub enter_size_fraction: Decimal,
    pub seed: u64,
    /// Weight of the drawdown penalty in the reward.
    pub risk_penalty_weight: f64,
    /// Reward subtracted when the governor vetoes a proposal.
    pub veto_penalty: f64,
}

impl Default for RlSettings {
    fn default() -> Self {
        Self {
            agent: AgentKind::Tabular,
            episodes: 1000,
            learning_rate: 0.001,
            discount_factor: 0.95,
            exploration_rate: 0.1,
            exploration_decay: 0.995,
            exploration_min: 0.01,
            batch_size: 32,
            max_steps_per_episode: 500,
            enter_size_fraction: dec!(0.25),
            seed: 42,
            risk_penalty_weight: 1.0,
            veto_penalty: 0.001,
        }
    }
}

/// Contains parameters for portfolio-level risk management.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RiskManagement {
    /// The largest fraction of total equity a single instrument may be exposed to.
    pub max_position_size_pct: Decimal,
    /// The distance from the entry price to the implicit stop-loss.
    pub stop_loss_pct: Decimal,
    /// Drawdown from peak equity at which new entries are halted.
    pub max_drawdown_pct: Decimal,
    /// The halt is lifted once drawdown falls below `max_drawdown_pct * recovery_fraction`.
    pub recovery_fraction: Decimal,
    /// Drawdown at which the episode is terminated.
    pub fatal_drawdown_pct: Decimal,
    /// Consecutive ticks the fatal bar must be breached before terminating.
    pub fatal_breach_ticks: u32,
}

impl Default for RiskManagement {
    fn default() -> Self {
        Self {
            max_position_size_pct: dec!(0.1),
            stop_loss_pct: dec!(0.02),
            max_drawdown_pct: dec!(0.15),
            recovery_fraction: dec!(0.5),
            fatal_drawdown_pct: dec!(0.25),
            fatal_breach_ticks: 3,
        }
    }
}

impl RiskManagement {
    /// Converts the raw section into validated `RiskLimits`.
    pub fn to_limits(&self) -> Result<RiskLimits, ConfigError> {
        Ok(RiskLimits::new(
            self.max_position_size_pct,
            self.stop_loss_pct,
            self.max_drawdown_pct,
            self.recovery_fraction,
            self.fatal_drawdown_pct,
            self.fatal_breach_ticks,
        )?)
    }
}

/// Contains parameters for the execution boundary and the paper-trading venue.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Execution {
    /// Simulation (paper) vs live trading.
    pub paper_trading: bool,
    pub order_timeout_secs: u64,
    /// Entries are vetoed while the instrument's liquidity is below this.
    pub min_liquidity: Decimal,
    /// 0.0004 corresponds to 0.04%.
    pub taker_fee_pct: Decimal,
    /// Adverse price move applied to simulated fills, as a fraction of the mark.
    pub slippage_pct: Decimal,
    pub initial_capital: Decimal,
}

impl Default for Execution {
    fn default() -> Self {
        Self {
            paper_trading: true,
            order_timeout_secs: 30,
            min_liquidity: dec!(10000),
            taker_fee_pct: dec!(0.0004),
            slippage_pct: dec!(0.0005),
            initial_capital: dec!(100000),
        }
    }
}

impl Execution {
    pub fn order_timeout(&self) -> Duration {
        Duration::from_secs(self.order_timeout_secs)
    }

    pub fn session_mode(&self) -> SessionMode {
        if self.paper_trading {
            SessionMode::Simulation
        } else {
            SessionMode::Live
        }
    }
}

/// Controls how the loop observes the market and recovers from data outages.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservationSettings {
    pub require_sentiment: bool,
    /// Fetch attempts per tick before the tick is skipped.
    pub max_feed_attempts: u32,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    /// Consecutive skipped ticks that end the episode.
    pub max_consecutive_skips: u32,
}

impl Default for ObservationSettings {
    fn default() -> Self {
        Self {
            require_sentiment: true,
            max_feed_attempts: 3,
            backoff_initial_ms: 500,
            backoff_max_ms: 30_000,
            max_consecutive_skips: 50,
        }
    }
}

/// Where checkpoints go. Without a database URL the engine runs in-memory only.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Persistence {
    pub database_url: Option<String>,
    pub project_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Directory for daily-rolling log files. Console only when unset.
    pub directory: Option<PathBuf>,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

impl Config {
    /// Rejects any value that would make the engine behave unsafely. Nothing is
    /// clamped: an out-of-range value fails the load.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.risk_management.to_limits()?;

        let rl = &self.rl;
        if rl.learning_rate <= 0.0 || rl.learning_rate > 1.0 {
            return Err(ConfigError::ValidationError(
                "rl.learning_rate must be in (0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&rl.discount_factor) {
            return Err(ConfigError::ValidationError(
                "rl.discount_factor must be in [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&rl.exploration_rate) || !(0.0..=1.0).contains(&rl.exploration_min) {
            return Err(ConfigError::ValidationError(
                "rl.exploration_rate and rl.exploration_min must be in [0, 1]".to_string(),
            ));
        }
        if rl.exploration_decay <= 0.0 || rl.exploration_decay > 1.0 {
            return Err(ConfigError::ValidationError(
                "rl.exploration_decay must be in (0, 1]".to_string(),
            ));
        }
        if rl.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "rl.batch_size must be at least 1".to_string(),
            ));
        }
        if rl.max_steps_per_episode == 0 {
            return Err(ConfigError::ValidationError(
                "rl.max_steps_per_episode must be at least 1".to_string(),
            ));
        }
        if rl.enter_size_fraction <= Decimal::ZERO || rl.enter_size_fraction > Decimal::ONE {
            return Err(ConfigError::ValidationError(
                "rl.enter_size_fraction must be in (0, 1]".to_string(),
            ));
        }
        if rl.risk_penalty_weight < 0.0 || rl.veto_penalty < 0.0 {
            return Err(ConfigError::ValidationError(
                "rl.risk_penalty_weight and rl.veto_penalty must not be negative".to_string(),
            ));
        }

        let execution = &self.execution;
        if execution.order_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "execution.order_timeout_secs must be at least 1".to_string(),
            ));
        }
        if execution.min_liquidity.is_sign_negative() {
            return Err(ConfigError::ValidationError(
                "execution.min_liquidity must not be negative".to_string(),
            ));
        }
        if execution.taker_fee_pct.is_sign_negative() || execution.slippage_pct.is_sign_negative() {
            return Err(ConfigError::ValidationError(
                "execution fees and slippage must not be negative".to_string(),
            ));
        }
        if execution.initial_capital <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "execution.initial_capital must be positive".to_string(),
            ));
        }

        let observation = &self.observation;
        if observation.max_feed_attempts == 0 || observation.max_consecutive_skips == 0 {
            return Err(ConfigError::ValidationError(
                "observation.max_feed_attempts and observation.max_consecutive_skips must be at least 1"
                    .to_string(),
            ));
        }
        if observation.backoff_initial_ms > observation.backoff_max_ms {
            return Err(ConfigError::ValidationError(
                "observation.backoff_initial_ms must not exceed observation.backoff_max_ms".to_string(),
            ));
        }

        if !execution.paper_trading && self.persistence.database_url.is_none() {
            tracing::warn!("Live trading configured without a database; checkpoints stay in memory.");
        }

        Ok(())
    }

    /// The effective configuration as pretty-printed JSON.
    pub fn to_pretty_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}
