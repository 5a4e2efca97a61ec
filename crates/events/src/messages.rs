use crate::error::EventsError;
use chrono::{DateTime, Utc};
use core_types::{Action, AgentKind, Fill, SessionMode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Enum representing the severity of a log message for structured logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// A free-form message attached to an episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// The account as seen at the end of a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub episode_id: Uuid,
    pub step: u64,
    pub timestamp: DateTime<Utc>,
    pub cash: Decimal,
    pub equity: Decimal,
    pub drawdown: Decimal,
    pub open_positions: usize,
}

/// Everything a learning loop reports while it runs.
///
/// Serialized adjacently tagged, e.g.
/// `{"type": "ActionVetoed", "payload": {"episode_id": "...", "step": 4, ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum LoopEvent {
    EpisodeStarted {
        episode_id: Uuid,
        agent: AgentKind,
        mode: SessionMode,
        initial_capital: Decimal,
    },
    /// No observation could be built; nothing was learned from this tick.
    TickSkipped {
        episode_id: Uuid,
        step: u64,
        reason: String,
        consecutive: u32,
    },
    ActionVetoed {
        episode_id: Uuid,
        step: u64,
        action: Action,
        reason: String,
    },
    OrderFilled {
        episode_id: Uuid,
        step: u64,
        action: Action,
        fill: Fill,
        clamped: bool,
    },
    /// The execution boundary rejected or timed out; the portfolio is untouched.
    ExecutionFailed {
        episode_id: Uuid,
        step: u64,
        action: Action,
        error: String,
    },
    StopTriggered {
        episode_id: Uuid,
        step: u64,
        position_id: Uuid,
        price: Decimal,
    },
    PolicyUpdated {
        episode_id: Uuid,
        version: u64,
        applied: usize,
        watermark: u64,
    },
    EpisodeTerminated {
        episode_id: Uuid,
        reason: String,
        steps: u64,
        cumulative_reward: f64,
    },
    Portfolio(PortfolioSnapshot),
    Log(LogMessage),
}

impl LoopEvent {
    /// The episode the event belongs to, if any.
    pub fn episode_id(&self) -> Option<Uuid> {
        match self {
            LoopEvent::EpisodeStarted { episode_id, .. }
            | LoopEvent::TickSkipped { episode_id, .. }
            | LoopEvent::ActionVetoed { episode_id, .. }
            | LoopEvent::OrderFilled { episode_id, .. }
            | LoopEvent::ExecutionFailed { episode_id, .. }
            | LoopEvent::StopTriggered { episode_id, .. }
            | LoopEvent::PolicyUpdated { episode_id, .. }
            | LoopEvent::EpisodeTerminated { episode_id, .. } => Some(*episode_id),
            LoopEvent::Portfolio(snapshot) => Some(snapshot.episode_id),
            LoopEvent::Log(_) => None,
        }
    }

    pub fn to_json(&self) -> Result<String, EventsError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Direction;
    use rust_decimal_macros::dec;

    #[test]
    fn events_serialize_adjacently_tagged() {
        let episode_id = Uuid::new_v4();
        let event = LoopEvent::ActionVetoed {
            episode_id,
            step: 4,
            action: Action::enter(Direction::Long, dec!(0.1)).unwrap(),
            reason: "entries halted at drawdown 0.17".to_string(),
        };
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "ActionVetoed");
        assert_eq!(json["payload"]["step"], 4);
        assert_eq!(event.episode_id(), Some(episode_id));
    }

    #[test]
    fn log_messages_have_no_episode() {
        let event = LoopEvent::Log(LogMessage {
            timestamp: Utc::now(),
            level: LogLevel::Warn,
            message: "persistence degraded".to_string(),
        });
        assert_eq!(event.episode_id(), None);
    }
}
