use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use configuration::{init_tracing, load_config, Config};
use core_types::SessionMode;
use database::{KeyValueStore, ResilientStore};
use engine::checkpoint::load_policy;
use engine::{run_concurrently, EpisodeReport, LearningLoop, TerminationReason};
use executor::SimulatedExecutor;
use indicatif::{ProgressBar, ProgressStyle};
use market_state::{FeatureSchema, SyntheticFeed, SyntheticFeedConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use strategies::{create_agent, PolicyPublisher};
use tokio::sync::watch;

/// The main entry point for the Meridian decision loop.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; values may come from the real environment.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    let _log_guard = init_tracing(&config.logging);

    match cli.command {
        Commands::Train(args) => handle_train(config, args).await,
        Commands::Run(args) => handle_run(config, args).await,
        Commands::Evaluate(args) => handle_evaluate(config, args).await,
        Commands::CheckConfig => {
            println!("{}", config.to_pretty_json()?);
            Ok(())
        }
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// A closed-loop reinforcement learning trading engine.
#[derive(Parser)]
#[command(name = "meridian", author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run paper-training episodes on the synthetic feed as fast as it yields.
    Train(TrainArgs),
    /// Run a paced session in the mode set by `execution.paper_trading`.
    Run(TrainArgs),
    /// Run concurrent evaluation episodes that follow the stored policy.
    Evaluate(EvaluateArgs),
    /// Load, validate and print the effective configuration.
    CheckConfig,
}

#[derive(Parser)]
struct TrainArgs {
    /// Number of episodes; defaults to `rl.episodes`.
    #[arg(long)]
    episodes: Option<u32>,
}

#[derive(Parser)]
struct EvaluateArgs {
    #[arg(long, default_value_t = 4)]
    replicas: u32,

    /// Steps per evaluation episode; defaults to `rl.max_steps_per_episode`.
    #[arg(long)]
    steps: Option<u64>,
}

// ==============================================================================
// Shared Setup
// ==============================================================================

fn synthetic_feed(config: &Config, seed: u64) -> Box<SyntheticFeed> {
    let schema = FeatureSchema::v1(config.observation.require_sentiment);
    Box::new(SyntheticFeed::new(SyntheticFeedConfig {
        window: schema.min_history().max(SyntheticFeedConfig::default().window),
        seed,
        ..SyntheticFeedConfig::default()
    }))
}

/// Flips the shutdown flag on Ctrl-C so running episodes stop at their next suspend point.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            let _ = tx.send(true);
        }
        // Keep the sender alive so receivers never see a closed channel.
        std::future::pending::<()>().await;
    });
    rx
}

fn summary_table(reports: &[EpisodeReport]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Episode",
        "Mode",
        "Steps",
        "Termination",
        "Reward",
        "Return",
        "Max DD",
        "Win Rate",
        "Trades",
        "Policy",
    ]);
    for report in reports {
        let summary = &report.summary;
        table.add_row(vec![
            report.episode_id.to_string()[..8].to_string(),
            format!("{:?}", report.mode),
            report.steps.to_string(),
            report.termination.to_string(),
            format!("{:.4}", summary.cumulative_reward),
            format!("{:.4}", summary.cumulative_return),
            format!("{:.4}", summary.max_drawdown),
            summary
                .win_rate
                .map(|w| format!("{w:.2}"))
                .unwrap_or_else(|| "-".to_string()),
            summary.total_trades.to_string(),
            format!("v{}", report.policy_version),
        ]);
    }
    table
}

// ==============================================================================
// Train Command Logic
// ==============================================================================

async fn handle_train(config: Config, args: TrainArgs) -> anyhow::Result<()> {
    let episodes = args.episodes.unwrap_or(config.rl.episodes);
    run_learning_session(config, SessionMode::Training, episodes, None).await
}

// ==============================================================================
// Run Command Logic
// ==============================================================================

async fn handle_run(config: Config, args: TrainArgs) -> anyhow::Result<()> {
    let mode = config.execution.session_mode();
    if mode == SessionMode::Live {
        bail!("No live venue executor is available; set execution.paper_trading = true");
    }
    let episodes = args.episodes.unwrap_or(config.rl.episodes);
    let poll_interval = config.data_sources.poll_interval();
    tracing::info!(?mode, ?poll_interval, "Starting paced session");
    run_learning_session(config, mode, episodes, poll_interval).await
}

async fn run_learning_session(
    config: Config,
    mode: SessionMode,
    episodes: u32,
    poll_interval: Option<Duration>,
) -> anyhow::Result<()> {
    let store = Arc::new(ResilientStore::open(config.persistence.database_url.as_deref()).await);
    let schema = FeatureSchema::v1(config.observation.require_sentiment);
    let mut agent = create_agent(&config.rl, &schema)?;

    let mut publisher = PolicyPublisher::new();
    if let Some(snapshot) = load_policy(store.as_ref(), config.rl.agent).await? {
        snapshot.apply_to(agent.as_mut())?;
        tracing::info!(version = snapshot.version, agent = %snapshot.kind, "Restored stored policy");
        publisher.seed(snapshot);
    }

    let mut learning_loop = LearningLoop::new(
        &config,
        mode,
        synthetic_feed(&config, config.rl.seed),
        agent,
        Arc::new(SimulatedExecutor::new(&config.execution)),
    )?
    .with_publisher(publisher)
    .with_store(store.clone())
    .with_shutdown(shutdown_on_ctrl_c());
    if let Some(interval) = poll_interval {
        learning_loop = learning_loop.with_poll_interval(interval);
    }

    let progress_bar = ProgressBar::new(u64::from(episodes));
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );

    let mut reports = Vec::with_capacity(episodes as usize);
    for _ in 0..episodes {
        let report = learning_loop.run_episode().await?;
        progress_bar.inc(1);
        progress_bar.set_message(format!(
            "reward {:.4}, epsilon {:.3}",
            report.summary.cumulative_reward, report.exploration_rate
        ));
        let stopped = report.termination == TerminationReason::Stopped;
        reports.push(report);
        if stopped {
            break;
        }
    }
    progress_bar.finish_with_message("Session complete!");

    println!("{}", summary_table(&reports));
    if store.is_degraded() {
        tracing::warn!("Checkpoints were kept in memory only and are lost on exit");
    }
    store.close().await;
    Ok(())
}

// ==============================================================================
// Evaluate Command Logic
// ==============================================================================

async fn handle_evaluate(mut config: Config, args: EvaluateArgs) -> anyhow::Result<()> {
    if args.replicas == 0 {
        bail!("--replicas must be at least 1");
    }
    if let Some(steps) = args.steps {
        config.rl.max_steps_per_episode = steps;
    }

    let store = Arc::new(ResilientStore::open(config.persistence.database_url.as_deref()).await);
    let Some(snapshot) = load_policy(store.as_ref(), config.rl.agent).await? else {
        bail!("No stored {} policy found; run `train` first", config.rl.agent);
    };
    tracing::info!(version = snapshot.version, replicas = args.replicas, "Evaluating stored policy");

    let mut publisher = PolicyPublisher::new();
    publisher.seed(snapshot);

    let schema = FeatureSchema::v1(config.observation.require_sentiment);
    let shutdown = shutdown_on_ctrl_c();
    let mut replicas = Vec::with_capacity(args.replicas as usize);
    for replica in 0..u64::from(args.replicas) {
        let agent = create_agent(&config.rl, &schema)?;
        let learning_loop = LearningLoop::new(
            &config,
            SessionMode::Evaluation,
            synthetic_feed(&config, config.rl.seed.wrapping_add(1 + replica)),
            agent,
            Arc::new(SimulatedExecutor::new(&config.execution)),
        )?
        .with_subscriber(publisher.subscribe())
        .with_store(store.clone())
        .with_shutdown(shutdown.clone());
        replicas.push(learning_loop);
    }

    let mut reports = Vec::new();
    for (replica, result) in run_concurrently(replicas).await.into_iter().enumerate() {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => tracing::error!(replica, error = %e, "Evaluation episode failed"),
        }
    }

    println!("{}", summary_table(&reports));
    store.close().await;
    Ok(())
}
