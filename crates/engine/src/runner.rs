use crate::error::EngineError;
use crate::learning_loop::LearningLoop;
use crate::report::EpisodeReport;
use futures::future::join_all;

/// Runs each loop's episode as its own tokio task and waits for all of them.
///
/// Loops own disjoint portfolios, so one failing or panicking episode does not affect the
/// others; results come back in the order the loops were given.
pub async fn run_concurrently(loops: Vec<LearningLoop>) -> Vec<Result<EpisodeReport, EngineError>> {
    let handles: Vec<_> = loops
        .into_iter()
        .map(|mut episode| tokio::spawn(async move { episode.run_episode().await }))
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| match joined {
            Ok(result) => result,
            Err(e) => Err(EngineError::TaskFailed(e.to_string())),
        })
        .collect()
}
