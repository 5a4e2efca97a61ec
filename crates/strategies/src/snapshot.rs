use crate::error::StrategyError;
use crate::StrategyAgent;
use chrono::{DateTime, Utc};
use core_types::AgentKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// An immutable, versioned copy of a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub version: u64,
    pub kind: AgentKind,
    pub schema_version: u32,
    pub blob: Vec<u8>,
    pub published_at: DateTime<Utc>,
}

impl PolicySnapshot {
    pub fn capture(agent: &dyn StrategyAgent, version: u64) -> Result<Self, StrategyError> {
        Ok(Self {
            version,
            kind: agent.kind(),
            schema_version: agent.input_shape().schema_version,
            blob: agent.serialize()?,
            published_at: Utc::now(),
        })
    }

    /// Loads this snapshot into `agent`, refusing a different kind or schema.
    pub fn apply_to(&self, agent: &mut dyn StrategyAgent) -> Result<(), StrategyError> {
        if self.kind != agent.kind() {
            return Err(StrategyError::KindMismatch {
                expected: agent.kind(),
                found: self.kind,
            });
        }
        let shape = agent.input_shape();
        if self.schema_version != shape.schema_version {
            return Err(StrategyError::ShapeMismatch {
                expected_version: shape.schema_version,
                expected_dim: shape.dim,
                actual_version: self.schema_version,
                actual_dim: shape.dim,
            });
        }
        agent.deserialize(&self.blob)
    }

    pub fn encode(&self) -> Result<Vec<u8>, StrategyError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StrategyError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

type Slot = Option<Arc<PolicySnapshot>>;

/// The training side of policy distribution.
///
/// Each publish replaces the whole snapshot, so a reader sees either the previous or the
/// next policy, never a mix.
pub struct PolicyPublisher {
    tx: watch::Sender<Slot>,
    version: u64,
}

impl PolicyPublisher {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx, version: 0 }
    }

    /// Continues numbering after a restored snapshot and makes it visible to replicas.
    pub fn seed(&mut self, snapshot: PolicySnapshot) {
        self.version = self.version.max(snapshot.version);
        self.tx.send_replace(Some(Arc::new(snapshot)));
    }

    pub fn publish(&mut self, agent: &dyn StrategyAgent) -> Result<Arc<PolicySnapshot>, StrategyError> {
        let snapshot = Arc::new(PolicySnapshot::capture(agent, self.version + 1)?);
        self.version = snapshot.version;
        self.tx.send_replace(Some(snapshot.clone()));
        tracing::debug!(version = snapshot.version, kind = %snapshot.kind, "Policy published");
        Ok(snapshot)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn latest(&self) -> Option<Arc<PolicySnapshot>> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> PolicySubscriber {
        PolicySubscriber {
            rx: self.tx.subscribe(),
            applied_version: None,
        }
    }
}

impl Default for PolicyPublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// The replica side: refreshed by the loop at tick boundaries only.
pub struct PolicySubscriber {
    rx: watch::Receiver<Slot>,
    applied_version: Option<u64>,
}

impl PolicySubscriber {
    /// Applies the newest snapshot if it differs from the one already loaded.
    ///
    /// Returns the version applied by this call, if any.
    pub fn refresh(&mut self, agent: &mut dyn StrategyAgent) -> Result<Option<u64>, StrategyError> {
        let latest = self.rx.borrow_and_update().clone();
        match latest {
            Some(snapshot) if Some(snapshot.version) != self.applied_version => {
                snapshot.apply_to(agent)?;
                self.applied_version = Some(snapshot.version);
                Ok(Some(snapshot.version))
            }
            _ => Ok(None),
        }
    }

    pub fn applied_version(&self) -> Option<u64> {
        self.applied_version
    }
}
