mod common;

use common::config;
use configuration::Config;
use core_types::SessionMode;
use engine::{run_concurrently, LearningLoop, TerminationReason};
use executor::SimulatedExecutor;
use market_state::{FeatureSchema, SyntheticFeed, SyntheticFeedConfig};
use std::sync::Arc;
use strategies::{create_agent, PolicyPublisher};

fn synthetic(seed: u64) -> Box<SyntheticFeed> {
    Box::new(SyntheticFeed::new(SyntheticFeedConfig {
        seed,
        ..SyntheticFeedConfig::default()
    }))
}

fn looped(config: &Config, mode: SessionMode, seed: u64) -> LearningLoop {
    let agent = create_agent(&config.rl, &FeatureSchema::v1(true)).unwrap();
    LearningLoop::new(
        config,
        mode,
        synthetic(seed),
        agent,
        Arc::new(SimulatedExecutor::new(&config.execution)),
    )
    .unwrap()
}

#[tokio::test]
async fn evaluation_replicas_follow_the_published_policy() {
    let mut config = config();
    config.rl.batch_size = 8;
    config.rl.max_steps_per_episode = 20;

    let mut trainer = looped(&config, SessionMode::Training, 1).with_publisher(PolicyPublisher::new());
    let trained = trainer.run_episode().await.unwrap();
    let published = trainer.publisher().unwrap().version();
    assert_eq!(trained.policy_version, published);

    config.rl.max_steps_per_episode = 10;
    let replicas: Vec<LearningLoop> = (0..3)
        .map(|i| {
            looped(&config, SessionMode::Evaluation, 100 + i)
                .with_subscriber(trainer.publisher().unwrap().subscribe())
        })
        .collect();

    let reports = run_concurrently(replicas).await;
    assert_eq!(reports.len(), 3);
    for report in reports {
        let report = report.unwrap();
        assert_eq!(report.mode, SessionMode::Evaluation);
        assert_eq!(report.termination, TerminationReason::MaxSteps);
        assert_eq!(report.steps, 10);
        assert_eq!(report.policy_version, published);
        // Replicas never learn, so the watermark is the trainer's.
        assert_eq!(report.applied_watermark, 20);
        assert_eq!(report.exploration_rate, 0.0);
    }
}

#[tokio::test]
async fn replicas_own_disjoint_portfolios() {
    let config = {
        let mut config = config();
        config.rl.max_steps_per_episode = 15;
        config
    };
    let loops = vec![
        looped(&config, SessionMode::Simulation, 5),
        looped(&config, SessionMode::Simulation, 6),
    ];

    let reports: Vec<_> = run_concurrently(loops)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    assert_ne!(reports[0].episode_id, reports[1].episode_id);
    assert!(reports.iter().all(|r| r.steps == 15));
}
