use crate::state::TerminationReason;
use analytics::PerformanceSummary;
use chrono::{DateTime, Utc};
use core_types::{AgentKind, SessionMode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The archived outcome of one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeReport {
    pub episode_id: Uuid,
    pub agent: AgentKind,
    pub mode: SessionMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Decision ticks; skipped ticks are not counted.
    pub steps: u64,
    pub skipped_ticks: u64,
    /// Transitions handed to the learner.
    pub transitions: u64,
    /// Transitions dropped because an observation had neutral-filled features.
    #[serde(default)]
    pub incomplete_transitions: u64,
    pub termination: TerminationReason,
    pub policy_version: u64,
    pub applied_watermark: u64,
    pub exploration_rate: f64,
    pub summary: PerformanceSummary,
}
