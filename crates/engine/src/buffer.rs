use core_types::{Action, Observation, RewardSignal, Transition};

/// Collects transitions for the learner.
///
/// A rewarded tick waits as `pending` until the next observation arrives, and only then
/// becomes a `Transition`. Ids increase across episodes so a policy's ledger never sees
/// the same id for two different transitions.
#[derive(Debug, Default)]
pub struct TransitionBuffer {
    next_id: u64,
    pending: Option<(Observation, Action, RewardSignal)>,
    ready: Vec<Transition>,
    recorded: u64,
    discarded: u64,
}

impl TransitionBuffer {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Clears per-episode state and moves ids past everything the policy has applied.
    pub fn reset(&mut self, applied_watermark: u64) {
        self.pending = None;
        self.ready.clear();
        self.recorded = 0;
        self.discarded = 0;
        self.next_id = self.next_id.max(applied_watermark + 1);
    }

    pub fn set_pending(&mut self, observation: Observation, action: Action, reward: RewardSignal) {
        if self.pending.is_some() {
            tracing::warn!("Overwriting a pending transition that never saw its next observation");
        }
        self.pending = Some((observation, action, reward));
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Turns the pending tick into a transition ending at `next_observation`.
    pub fn complete(&mut self, next_observation: &Observation, done: bool) {
        if let Some((observation, action, reward)) = self.pending.take() {
            self.push(observation, action, reward, next_observation.clone(), done);
        }
    }

    /// Closes the episode: the pending tick, or else the last unflushed one, becomes terminal.
    pub fn finish(&mut self) {
        if let Some((observation, action, reward)) = self.pending.take() {
            let next = observation.clone();
            self.push(observation, action, reward, next, true);
        } else if let Some(last) = self.ready.last_mut() {
            last.done = true;
        }
    }

    fn push(
        &mut self,
        observation: Observation,
        action: Action,
        reward: RewardSignal,
        next_observation: Observation,
        done: bool,
    ) {
        if !observation.complete || !next_observation.complete {
            tracing::debug!(
                at = %observation.timestamp,
                next = %next_observation.timestamp,
                "Discarding a transition built on incomplete features"
            );
            self.discarded += 1;
            return;
        }
        self.ready.push(Transition {
            id: self.next_id,
            observation,
            action,
            reward,
            next_observation,
            done,
        });
        self.next_id += 1;
        self.recorded += 1;
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub fn drain(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.ready)
    }

    /// Transitions completed in the current episode.
    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    /// Transitions dropped this episode because an end was incomplete.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn obs(price: rust_decimal::Decimal) -> Observation {
        Observation {
            schema_version: 1,
            instrument: "BTCUSDT".to_string(),
            timestamp: Utc::now(),
            reference_price: price,
            features: vec![0.0; 7],
            complete: true,
            positions: Vec::new(),
        }
    }

    #[test]
    fn pending_ticks_wait_for_the_next_observation() {
        let mut buffer = TransitionBuffer::new();
        buffer.complete(&obs(dec!(1)), false);
        assert_eq!(buffer.ready_len(), 0);

        buffer.set_pending(obs(dec!(1)), Action::Hold, RewardSignal::zero());
        assert_eq!(buffer.ready_len(), 0);
        buffer.complete(&obs(dec!(2)), false);

        let batch = buffer.drain();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, 1);
        assert_eq!(batch[0].next_observation.reference_price, dec!(2));
        assert!(!batch[0].done);
    }

    #[test]
    fn finish_flags_the_last_transition_done() {
        let mut buffer = TransitionBuffer::new();
        buffer.set_pending(obs(dec!(1)), Action::Hold, RewardSignal::zero());
        buffer.complete(&obs(dec!(2)), false);
        buffer.finish();
        assert!(buffer.drain()[0].done);

        buffer.set_pending(obs(dec!(3)), Action::Hold, RewardSignal::zero());
        buffer.finish();
        let batch = buffer.drain();
        assert!(batch[0].done);
        assert_eq!(batch[0].id, 2);
    }

    #[test]
    fn ids_never_fall_behind_the_applied_watermark() {
        let mut buffer = TransitionBuffer::new();
        buffer.reset(40);
        buffer.set_pending(obs(dec!(1)), Action::Hold, RewardSignal::zero());
        buffer.finish();
        assert_eq!(buffer.drain()[0].id, 41);

        // A lower watermark (fresh replica) does not rewind the counter.
        buffer.reset(0);
        buffer.set_pending(obs(dec!(1)), Action::Hold, RewardSignal::zero());
        buffer.finish();
        assert_eq!(buffer.drain()[0].id, 42);
        assert_eq!(buffer.recorded(), 1);
    }

    #[test]
    fn incomplete_observations_never_reach_the_batch() {
        let mut partial = obs(dec!(2));
        partial.complete = false;

        let mut buffer = TransitionBuffer::new();
        buffer.set_pending(obs(dec!(1)), Action::Hold, RewardSignal::zero());
        buffer.complete(&partial, false);
        buffer.set_pending(partial, Action::Hold, RewardSignal::zero());
        buffer.complete(&obs(dec!(3)), false);
        buffer.set_pending(obs(dec!(3)), Action::Hold, RewardSignal::zero());
        buffer.complete(&obs(dec!(4)), false);

        let batch = buffer.drain();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, 1);
        assert_eq!(batch[0].observation.reference_price, dec!(3));
        assert_eq!(buffer.recorded(), 1);
        assert_eq!(buffer.discarded(), 2);
    }
}
