use crate::backoff::Backoff;
use crate::buffer::TransitionBuffer;
use crate::checkpoint;
use crate::error::EngineError;
use crate::report::EpisodeReport;
use crate::state::{LoopState, TerminationReason};
use analytics::{Disposition, PerformanceSummary, PerformanceTracker, RewardWeights};
use chrono::{DateTime, Utc};
use configuration::Config;
use core_types::{
    Action, Fill, Observation, OrderRequest, Position, RewardSignal, RiskLimits, SessionMode,
};
use database::KeyValueStore;
use events::{EventBus, LoopEvent, PortfolioSnapshot};
use executor::{Executor, ExecutorError, PortfolioState, Valuation};
use market_state::{DataFeed, FeatureSchema, MarketStateBuilder, RawSnapshot};
use risk::{next_mode, Decision, MarketContext, RiskGovernor, RiskMode, VetoReason};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use strategies::{
    InputShape, PolicyPublisher, PolicySnapshot, PolicySubscriber, StrategyAgent, StrategyError,
};
use tokio::sync::watch;
use uuid::Uuid;

/// What a single call to [`LearningLoop::tick`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No observation could be built. No step was taken and nothing was recorded.
    Skipped { reason: String },
    Held { reward: RewardSignal },
    Vetoed { reason: VetoReason, reward: RewardSignal },
    /// `forced` marks a stop-loss liquidation the agent did not propose.
    Executed { fill: Fill, reward: RewardSignal, forced: bool },
    ExecutionFailed { error: ExecutorError, reward: RewardSignal },
    Terminated(TerminationReason),
}

/// How the governed action was resolved, before it is scored.
enum Resolution {
    Held,
    Vetoed(VetoReason),
    Executed(Fill, bool),
    Failed(ExecutorError),
}

impl Resolution {
    fn disposition(&self) -> Disposition {
        match self {
            Resolution::Held => Disposition::Held,
            Resolution::Vetoed(_) => Disposition::Vetoed,
            Resolution::Executed(..) => Disposition::Executed,
            Resolution::Failed(_) => Disposition::ExecutionFailed,
        }
    }

    fn into_outcome(self, reward: RewardSignal) -> TickOutcome {
        match self {
            Resolution::Held => TickOutcome::Held { reward },
            Resolution::Vetoed(reason) => TickOutcome::Vetoed { reason, reward },
            Resolution::Executed(fill, forced) => TickOutcome::Executed { fill, reward, forced },
            Resolution::Failed(error) => TickOutcome::ExecutionFailed { error, reward },
        }
    }
}

enum Observed {
    Ready(RawSnapshot, Observation),
    Skip(String),
    Exhausted,
    Stopped,
}

enum Submission {
    Filled(Fill),
    Failed(ExecutorError),
    Stopped,
}

#[derive(Debug, Clone)]
struct LoopSettings {
    batch_size: usize,
    max_steps: u64,
    order_timeout: Duration,
    max_feed_attempts: u32,
    backoff_initial: Duration,
    backoff_max: Duration,
    max_consecutive_skips: u32,
    initial_capital: Decimal,
    reward: RewardWeights,
}

/// The closed decision loop for one instrument and one portfolio.
///
/// Every tick runs observe, propose, govern, execute, reward and (when a batch is full)
/// update, strictly in sequence. All mutation of the `PortfolioState` happens here, and
/// only from confirmed fills.
pub struct LearningLoop {
    settings: LoopSettings,
    mode: SessionMode,
    state: LoopState,
    episode_id: Uuid,
    started_at: DateTime<Utc>,

    feed: Box<dyn DataFeed>,
    builder: MarketStateBuilder,
    governor: RiskGovernor,
    limits: RiskLimits,
    risk_mode: RiskMode,
    agent: Box<dyn StrategyAgent>,
    executor: Arc<dyn Executor>,
    portfolio: PortfolioState,
    tracker: PerformanceTracker,
    buffer: TransitionBuffer,

    step: u64,
    consecutive_skips: u32,
    skipped_ticks: u64,
    breach_ticks: u32,
    feed_backoff: Backoff,
    policy_version: u64,
    report: Option<EpisodeReport>,

    events: Option<EventBus>,
    publisher: Option<PolicyPublisher>,
    subscriber: Option<PolicySubscriber>,
    shutdown: Option<watch::Receiver<bool>>,
    store: Option<Arc<dyn KeyValueStore>>,
    poll_interval: Option<Duration>,
}

impl LearningLoop {
    pub fn new(
        config: &Config,
        mode: SessionMode,
        feed: Box<dyn DataFeed>,
        agent: Box<dyn StrategyAgent>,
        executor: Arc<dyn Executor>,
    ) -> Result<Self, EngineError> {
        let schema = FeatureSchema::v1(config.observation.require_sentiment);
        let expected = InputShape {
            schema_version: schema.version,
            dim: schema.dim(),
        };
        let actual = agent.input_shape();
        if actual != expected {
            return Err(StrategyError::ShapeMismatch {
                expected_version: expected.schema_version,
                expected_dim: expected.dim,
                actual_version: actual.schema_version,
                actual_dim: actual.dim,
            }
            .into());
        }

        let observation = &config.observation;
        let settings = LoopSettings {
            batch_size: config.rl.batch_size.max(1),
            max_steps: config.rl.max_steps_per_episode,
            order_timeout: config.execution.order_timeout(),
            max_feed_attempts: observation.max_feed_attempts.max(1),
            backoff_initial: Duration::from_millis(observation.backoff_initial_ms),
            backoff_max: Duration::from_millis(observation.backoff_max_ms),
            max_consecutive_skips: observation.max_consecutive_skips.max(1),
            initial_capital: config.execution.initial_capital,
            reward: RewardWeights::from_settings(&config.rl),
        };

        Ok(Self {
            mode,
            state: LoopState::Idle,
            episode_id: Uuid::nil(),
            started_at: Utc::now(),
            feed,
            builder: MarketStateBuilder::new(schema),
            governor: RiskGovernor::new(&config.execution)?,
            limits: config.risk_management.to_limits()?,
            risk_mode: RiskMode::Normal,
            agent,
            executor,
            portfolio: PortfolioState::new(settings.initial_capital),
            tracker: PerformanceTracker::new(settings.reward, settings.initial_capital),
            buffer: TransitionBuffer::new(),
            step: 0,
            consecutive_skips: 0,
            skipped_ticks: 0,
            breach_ticks: 0,
            feed_backoff: Backoff::new(settings.backoff_initial, settings.backoff_max),
            policy_version: 0,
            report: None,
            events: None,
            publisher: None,
            subscriber: None,
            shutdown: None,
            store: None,
            poll_interval: None,
            settings,
        })
    }

    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Publishes a snapshot after every policy update.
    pub fn with_publisher(mut self, publisher: PolicyPublisher) -> Self {
        self.policy_version = publisher.version();
        self.publisher = Some(publisher);
        self
    }

    /// Follows a published policy, refreshed at tick boundaries.
    pub fn with_subscriber(mut self, subscriber: PolicySubscriber) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    /// The episode stops at the next suspend point once the flag turns `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Waits this long between ticks instead of polling as fast as the feed yields.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn episode_id(&self) -> Uuid {
        self.episode_id
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn portfolio(&self) -> &PortfolioState {
        &self.portfolio
    }

    pub fn risk_mode(&self) -> RiskMode {
        self.risk_mode
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn agent(&self) -> &dyn StrategyAgent {
        self.agent.as_ref()
    }

    pub fn policy_version(&self) -> u64 {
        self.policy_version
    }

    pub fn publisher(&self) -> Option<&PolicyPublisher> {
        self.publisher.as_ref()
    }

    /// Transitions completed so far in the current episode.
    pub fn transitions_recorded(&self) -> u64 {
        self.buffer.recorded()
    }

    /// Replaces the risk limits. Refused while an episode is running.
    pub fn reload_limits(&mut self, limits: RiskLimits) -> Result<(), EngineError> {
        if self.state.is_active() {
            return Err(EngineError::InvalidState(self.state));
        }
        tracing::info!(?limits, "Risk limits reloaded");
        self.limits = limits;
        Ok(())
    }

    /// Starts a new episode on a fresh portfolio.
    pub fn start_episode(&mut self) -> Result<Uuid, EngineError> {
        if self.state != LoopState::Idle {
            return Err(EngineError::InvalidState(self.state));
        }
        let capital = self.settings.initial_capital;
        self.episode_id = Uuid::new_v4();
        self.started_at = Utc::now();
        self.portfolio = PortfolioState::new(capital);
        self.tracker = PerformanceTracker::new(self.settings.reward, capital);
        self.buffer.reset(self.agent.applied_watermark());
        self.step = 0;
        self.consecutive_skips = 0;
        self.skipped_ticks = 0;
        self.breach_ticks = 0;
        self.risk_mode = RiskMode::Normal;
        self.feed_backoff = Backoff::new(self.settings.backoff_initial, self.settings.backoff_max);
        self.report = None;
        self.agent.set_mode(self.mode);
        self.transition(LoopState::Observing)?;

        tracing::info!(
            episode = %self.episode_id,
            agent = %self.agent.kind(),
            mode = ?self.mode,
            exploration = self.agent.exploration_rate(),
            "Episode started"
        );
        self.emit(LoopEvent::EpisodeStarted {
            episode_id: self.episode_id,
            agent: self.agent.kind(),
            mode: self.mode,
            initial_capital: capital,
        });
        Ok(self.episode_id)
    }

    /// Runs one episode to termination and archives it.
    pub async fn run_episode(&mut self) -> Result<EpisodeReport, EngineError> {
        self.start_episode()?;
        loop {
            match self.tick().await {
                Ok(TickOutcome::Terminated(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(episode = %self.episode_id, error = %e, "Tick failed");
                    self.terminate(TerminationReason::Fault {
                        detail: e.to_string(),
                    })
                    .await?;
                    break;
                }
            }
            if let Some(interval) = self.poll_interval {
                // A stop during the wait is picked up by the next tick.
                self.pause(interval).await;
            }
        }
        self.finish()
    }

    /// Hands back the report of a terminated episode and returns the loop to `Idle`.
    pub fn finish(&mut self) -> Result<EpisodeReport, EngineError> {
        if self.state != LoopState::Terminated {
            return Err(EngineError::InvalidState(self.state));
        }
        let report = self
            .report
            .take()
            .ok_or(EngineError::InvalidState(self.state))?;
        self.transition(LoopState::Idle)?;
        Ok(report)
    }

    /// Runs one full tick of the loop.
    pub async fn tick(&mut self) -> Result<TickOutcome, EngineError> {
        if !self.state.is_active() {
            return Err(EngineError::InvalidState(self.state));
        }
        if self.stop_requested() {
            return self.terminate(TerminationReason::Stopped).await;
        }
        if self.step >= self.settings.max_steps {
            return self.terminate(TerminationReason::MaxSteps).await;
        }

        self.refresh_policy();
        self.transition(LoopState::Observing)?;

        let (raw, observation) = match self.observe().await {
            Observed::Ready(raw, observation) => (raw, observation),
            Observed::Skip(reason) => return self.skip(reason).await,
            Observed::Exhausted => return self.terminate(TerminationReason::FeedExhausted).await,
            Observed::Stopped => return self.terminate(TerminationReason::Stopped).await,
        };
        self.consecutive_skips = 0;

        let instrument = observation.instrument.clone();
        let price = observation.reference_price;
        let marks = HashMap::from([(instrument.clone(), price)]);
        let before = match self.portfolio.mark_to_market(&marks) {
            Ok(valuation) => valuation,
            Err(e) => return self.fault(e.to_string()).await,
        };

        let mode = next_mode(self.risk_mode, before.drawdown, &self.limits);
        if mode != self.risk_mode {
            tracing::info!(episode = %self.episode_id, ?mode, drawdown = %before.drawdown, "Risk mode changed");
            self.risk_mode = mode;
        }

        if before.drawdown >= self.limits.fatal_drawdown_fraction() {
            self.breach_ticks += 1;
        } else {
            self.breach_ticks = 0;
        }
        if self.breach_ticks >= self.limits.fatal_breach_ticks() {
            self.buffer.complete(&observation, true);
            return self
                .terminate(TerminationReason::FatalDrawdown {
                    drawdown: before.drawdown,
                })
                .await;
        }
        self.buffer.complete(&observation, false);

        let forced_exit = self
            .portfolio
            .triggered_stops(&instrument, price)
            .first()
            .map(|p| (p.position_id, p.stop_loss_price));
        let action = match forced_exit {
            Some((position_id, stop)) => {
                tracing::info!(episode = %self.episode_id, step = self.step, %position_id, %stop, %price, "Stop-loss triggered");
                self.emit(LoopEvent::StopTriggered {
                    episode_id: self.episode_id,
                    step: self.step,
                    position_id,
                    price,
                });
                Action::Exit { position_id }
            }
            None => {
                self.transition(LoopState::Proposing)?;
                match self.agent.propose(&observation) {
                    Ok(action) => action,
                    Err(e) => {
                        return self
                            .terminate(TerminationReason::AgentFailure {
                                detail: e.to_string(),
                            })
                            .await;
                    }
                }
            }
        };
        self.step += 1;

        self.transition(LoopState::Governing)?;
        let market = MarketContext::new(&instrument, price, raw.liquidity);
        let decision = match self.governor.evaluate(
            &action,
            &self.portfolio,
            &market,
            &self.limits,
            self.risk_mode,
        ) {
            Ok(decision) => decision,
            Err(e) => return self.fault(e.to_string()).await,
        };

        let (recorded, resolution, after) = match decision {
            Decision::Vetoed(reason) => {
                self.emit(LoopEvent::ActionVetoed {
                    episode_id: self.episode_id,
                    step: self.step,
                    action: action.clone(),
                    reason: reason.to_string(),
                });
                (action, Resolution::Vetoed(reason), before)
            }
            Decision::Approved(approved) => match approved.order {
                None => (approved.action, Resolution::Held, before),
                Some(order) => {
                    let forced = forced_exit.is_some();
                    let order = if forced { order.into_stop_loss() } else { order };
                    self.transition(LoopState::AwaitingExecution)?;
                    match self.submit(&order).await {
                        Submission::Stopped => {
                            return self.terminate(TerminationReason::Stopped).await;
                        }
                        Submission::Filled(fill) => {
                            match self.portfolio.apply_fill(&order, &fill) {
                                Ok(outcome) => {
                                    tracing::debug!(episode = %self.episode_id, step = self.step, ?outcome, "Fill applied");
                                    let after = match self.portfolio.mark_to_market(&marks) {
                                        Ok(valuation) => valuation,
                                        Err(e) => return self.fault(e.to_string()).await,
                                    };
                                    self.emit(LoopEvent::OrderFilled {
                                        episode_id: self.episode_id,
                                        step: self.step,
                                        action: approved.action.clone(),
                                        fill: fill.clone(),
                                        clamped: approved.clamped,
                                    });
                                    (approved.action, Resolution::Executed(fill, forced), after)
                                }
                                Err(e) => {
                                    let resolution = self.execution_failed(&approved.action, e);
                                    (approved.action, resolution, before)
                                }
                            }
                        }
                        Submission::Failed(e) => {
                            let resolution = self.execution_failed(&approved.action, e);
                            (approved.action, resolution, before)
                        }
                    }
                }
            },
        };

        self.transition(LoopState::Rewarding)?;
        let reward = self.tracker.record(
            &before,
            &after,
            &recorded,
            resolution.disposition(),
            observation.timestamp,
        );
        self.buffer.set_pending(observation, recorded, reward);
        self.emit_portfolio(&after);

        self.transition(LoopState::Updated)?;
        if self.buffer.ready_len() >= self.settings.batch_size {
            if let Err(e) = self.learn() {
                return self
                    .terminate(TerminationReason::AgentFailure {
                        detail: e.to_string(),
                    })
                    .await;
            }
        }

        Ok(resolution.into_outcome(reward))
    }

    fn refresh_policy(&mut self) {
        if let Some(subscriber) = self.subscriber.as_mut() {
            match subscriber.refresh(self.agent.as_mut()) {
                Ok(Some(version)) => {
                    tracing::debug!(episode = %self.episode_id, version, "Replica refreshed");
                    self.policy_version = version;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(episode = %self.episode_id, error = %e, "Could not apply published policy");
                }
            }
        }
    }

    async fn observe(&mut self) -> Observed {
        let attempts = self.settings.max_feed_attempts;
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.feed.fetch().await {
                Ok(Some(raw)) => {
                    self.feed_backoff =
                        Backoff::new(self.settings.backoff_initial, self.settings.backoff_max);
                    return self.build_observation(raw);
                }
                Ok(None) => return Observed::Exhausted,
                Err(e) => {
                    let delay = self.feed_backoff.next_delay();
                    tracing::warn!(
                        episode = %self.episode_id,
                        instrument = self.feed.instrument(),
                        attempt,
                        ?delay,
                        error = %e,
                        "Data feed fetch failed"
                    );
                    last_error = e.to_string();
                    if !self.pause(delay).await {
                        return Observed::Stopped;
                    }
                }
            }
        }
        Observed::Skip(format!("feed unavailable after {attempts} attempts: {last_error}"))
    }

    fn build_observation(&self, raw: RawSnapshot) -> Observed {
        let observation = match self.builder.build(&raw) {
            Ok(observation) => observation,
            Err(e) => return Observed::Skip(e.to_string()),
        };
        let positions = self
            .portfolio
            .positions_in(&raw.instrument)
            .iter()
            .map(Position::view)
            .collect();
        let observation = observation.with_positions(positions);
        if let Err(e) = self.agent.input_shape().check(&observation) {
            return Observed::Skip(e.to_string());
        }
        Observed::Ready(raw, observation)
    }

    async fn skip(&mut self, reason: String) -> Result<TickOutcome, EngineError> {
        self.consecutive_skips += 1;
        self.skipped_ticks += 1;
        tracing::info!(
            episode = %self.episode_id,
            step = self.step,
            consecutive = self.consecutive_skips,
            %reason,
            "Tick skipped"
        );
        self.emit(LoopEvent::TickSkipped {
            episode_id: self.episode_id,
            step: self.step,
            reason: reason.clone(),
            consecutive: self.consecutive_skips,
        });
        if self.consecutive_skips >= self.settings.max_consecutive_skips {
            return self
                .terminate(TerminationReason::DataUnavailable {
                    consecutive_skips: self.consecutive_skips,
                })
                .await;
        }
        Ok(TickOutcome::Skipped { reason })
    }

    async fn submit(&mut self, order: &OrderRequest) -> Submission {
        let executor = Arc::clone(&self.executor);
        let timeout = self.settings.order_timeout;
        let submit = tokio::time::timeout(timeout, executor.submit(order));
        let result = match self.shutdown.as_mut() {
            None => Some(submit.await),
            Some(rx) => tokio::select! {
                result = submit => Some(result),
                _ = wait_for_stop(rx) => None,
            },
        };
        match result {
            None => Submission::Stopped,
            Some(Ok(Ok(fill))) => Submission::Filled(fill),
            Some(Ok(Err(e))) => Submission::Failed(e),
            Some(Err(_elapsed)) => Submission::Failed(ExecutorError::Timeout(timeout.as_secs())),
        }
    }

    fn execution_failed(&self, action: &Action, error: ExecutorError) -> Resolution {
        tracing::warn!(
            episode = %self.episode_id,
            step = self.step,
            action = action.label(),
            %error,
            "Execution failed, portfolio unchanged"
        );
        self.emit(LoopEvent::ExecutionFailed {
            episode_id: self.episode_id,
            step: self.step,
            action: action.clone(),
            error: error.to_string(),
        });
        Resolution::Failed(error)
    }

    /// Feeds the completed transitions to the agent and publishes the new policy.
    fn learn(&mut self) -> Result<(), StrategyError> {
        let batch = self.buffer.drain();
        if batch.is_empty() || !self.mode.learns() {
            return Ok(());
        }
        let stats = self.agent.update(&batch)?;
        self.policy_version = match self.publisher.as_mut() {
            Some(publisher) => publisher.publish(self.agent.as_ref())?.version,
            None => self.policy_version + 1,
        };
        let watermark = self.agent.applied_watermark();
        tracing::debug!(
            episode = %self.episode_id,
            version = self.policy_version,
            applied = stats.applied,
            skipped = stats.skipped,
            td_error = stats.mean_td_error,
            watermark,
            "Policy updated"
        );
        self.emit(LoopEvent::PolicyUpdated {
            episode_id: self.episode_id,
            version: self.policy_version,
            applied: stats.applied,
            watermark,
        });
        Ok(())
    }

    async fn fault(&mut self, detail: String) -> Result<TickOutcome, EngineError> {
        tracing::error!(episode = %self.episode_id, step = self.step, %detail, "Loop fault");
        self.terminate(TerminationReason::Fault { detail }).await
    }

    async fn terminate(&mut self, reason: TerminationReason) -> Result<TickOutcome, EngineError> {
        self.transition(LoopState::Terminated)?;
        self.buffer.finish();
        if !matches!(reason, TerminationReason::AgentFailure { .. }) {
            if let Err(e) = self.learn() {
                tracing::error!(episode = %self.episode_id, error = %e, "Final policy update failed");
            }
        }
        if self.mode.allows_exploration() {
            self.agent.on_episode_end();
        }

        let summary = self.tracker.summary().unwrap_or_else(|e| {
            tracing::warn!(episode = %self.episode_id, error = %e, "Could not summarise episode");
            PerformanceSummary::default()
        });
        let report = EpisodeReport {
            episode_id: self.episode_id,
            agent: self.agent.kind(),
            mode: self.mode,
            started_at: self.started_at,
            finished_at: Utc::now(),
            steps: self.step,
            skipped_ticks: self.skipped_ticks,
            transitions: self.buffer.recorded(),
            incomplete_transitions: self.buffer.discarded(),
            termination: reason.clone(),
            policy_version: self.policy_version,
            applied_watermark: self.agent.applied_watermark(),
            exploration_rate: self.agent.exploration_rate(),
            summary,
        };

        tracing::info!(
            episode = %self.episode_id,
            steps = self.step,
            %reason,
            equity = %report.summary.final_equity,
            reward = report.summary.cumulative_reward,
            "Episode terminated"
        );
        self.checkpoint(&report).await;
        self.emit(LoopEvent::EpisodeTerminated {
            episode_id: self.episode_id,
            reason: reason.to_string(),
            steps: self.step,
            cumulative_reward: report.summary.cumulative_reward,
        });
        self.report = Some(report);
        Ok(TickOutcome::Terminated(reason))
    }

    /// Persists the policy and the episode. Failures are logged, never raised.
    async fn checkpoint(&mut self, report: &EpisodeReport) {
        let Some(store) = self.store.clone() else {
            return;
        };
        if self.mode.learns() {
            match PolicySnapshot::capture(self.agent.as_ref(), self.policy_version) {
                Ok(snapshot) => {
                    if let Err(e) = checkpoint::save_policy(store.as_ref(), &snapshot).await {
                        tracing::warn!(episode = %self.episode_id, error = %e, "Policy checkpoint failed");
                    }
                }
                Err(e) => {
                    tracing::warn!(episode = %self.episode_id, error = %e, "Policy capture failed");
                }
            }
        }
        if let Err(e) = checkpoint::save_episode(store.as_ref(), report, &self.portfolio).await {
            tracing::warn!(episode = %self.episode_id, error = %e, "Episode checkpoint failed");
        }
    }

    fn transition(&mut self, next: LoopState) -> Result<(), EngineError> {
        if !self.state.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(episode = %self.episode_id, from = ?self.state, to = ?next, "Loop transition");
        self.state = next;
        Ok(())
    }

    fn stop_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Sleeps for `duration`; returns `false` if a stop was requested meanwhile.
    async fn pause(&mut self, duration: Duration) -> bool {
        match self.shutdown.as_mut() {
            None => {
                tokio::time::sleep(duration).await;
                true
            }
            Some(rx) => tokio::select! {
                _ = tokio::time::sleep(duration) => true,
                _ = wait_for_stop(rx) => false,
            },
        }
    }

    fn emit(&self, event: LoopEvent) {
        if let Some(bus) = &self.events {
            bus.emit(event);
        }
    }

    fn emit_portfolio(&self, valuation: &Valuation) {
        if self.events.is_none() {
            return;
        }
        self.emit(LoopEvent::Portfolio(PortfolioSnapshot {
            episode_id: self.episode_id,
            step: self.step,
            timestamp: Utc::now(),
            cash: valuation.cash,
            equity: valuation.equity,
            drawdown: valuation.drawdown,
            open_positions: self.portfolio.open_position_count(),
        }));
    }
}

/// Resolves once the shutdown flag is `true`. Never resolves if the sender is gone.
async fn wait_for_stop(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
