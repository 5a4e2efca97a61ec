//! Storage keys and checkpoint helpers over a `KeyValueStore`.

use crate::error::EngineError;
use crate::report::EpisodeReport;
use core_types::AgentKind;
use database::{load_json, save_json, KeyValueStore};
use executor::PortfolioState;
use strategies::PolicySnapshot;
use uuid::Uuid;

pub fn policy_key(kind: AgentKind) -> String {
    format!("policy/{kind}/latest")
}

pub fn report_key(episode_id: Uuid) -> String {
    format!("episodes/{episode_id}/report")
}

pub fn portfolio_key(episode_id: Uuid) -> String {
    format!("episodes/{episode_id}/portfolio")
}

pub async fn save_policy(store: &dyn KeyValueStore, snapshot: &PolicySnapshot) -> Result<(), EngineError> {
    store.save(&policy_key(snapshot.kind), &snapshot.encode()?).await?;
    Ok(())
}

/// The latest stored policy for `kind`, or `None` if none was ever saved.
pub async fn load_policy(
    store: &dyn KeyValueStore,
    kind: AgentKind,
) -> Result<Option<PolicySnapshot>, EngineError> {
    match store.load(&policy_key(kind)).await {
        Ok(blob) => Ok(Some(PolicySnapshot::decode(&blob)?)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn save_episode(
    store: &dyn KeyValueStore,
    report: &EpisodeReport,
    portfolio: &PortfolioState,
) -> Result<(), EngineError> {
    save_json(store, &report_key(report.episode_id), report).await?;
    save_json(store, &portfolio_key(report.episode_id), portfolio).await?;
    Ok(())
}

pub async fn load_report(store: &dyn KeyValueStore, episode_id: Uuid) -> Result<EpisodeReport, EngineError> {
    Ok(load_json(store, &report_key(episode_id)).await?)
}
