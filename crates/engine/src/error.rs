use crate::state::LoopState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] configuration::ConfigError),

    #[error("Market state error: {0}")]
    MarketState(#[from] market_state::MarketStateError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Risk management error: {0}")]
    Risk(#[from] risk::RiskError),

    #[error("Portfolio state error: {0}")]
    Portfolio(#[from] executor::ExecutorError),

    #[error("Analytics error: {0}")]
    Analytics(#[from] analytics::AnalyticsError),

    #[error("Database error: {0}")]
    Database(#[from] database::DbError),

    #[error("Event error: {0}")]
    Events(#[from] events::EventsError),

    #[error("Serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Illegal loop transition from {from:?} to {to:?}")]
    InvalidTransition { from: LoopState, to: LoopState },

    #[error("Operation not allowed while the loop is {0:?}")]
    InvalidState(LoopState),

    #[error("Episode task failed: {0}")]
    TaskFailed(String),
}
