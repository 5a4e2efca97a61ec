use core_types::SessionMode;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded epsilon-greedy exploration with per-episode decay.
#[derive(Debug, Clone)]
pub struct EpsilonGreedy {
    rate: f64,
    decay: f64,
    min: f64,
    mode: SessionMode,
    rng: StdRng,
}

impl EpsilonGreedy {
    pub fn new(rate: f64, decay: f64, min: f64, seed: u64) -> Self {
        Self {
            rate: rate.clamp(0.0, 1.0),
            decay,
            min: min.clamp(0.0, 1.0),
            mode: SessionMode::Training,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// A policy that never explores.
    pub fn disabled(seed: u64) -> Self {
        Self::new(0.0, 1.0, 0.0, seed)
    }

    pub fn set_mode(&mut self, mode: SessionMode) {
        self.mode = mode;
    }

    /// The configured rate, whatever the session mode.
    pub fn base_rate(&self) -> f64 {
        self.rate
    }

    pub fn set_base_rate(&mut self, rate: f64) {
        self.rate = rate.clamp(0.0, 1.0);
    }

    /// Zero outside training and simulation sessions.
    pub fn effective_rate(&self) -> f64 {
        if self.mode.allows_exploration() {
            self.rate
        } else {
            0.0
        }
    }

    /// Returns `greedy`, or a uniformly random index in `0..n` with the effective rate.
    pub fn choose(&mut self, greedy: usize, n: usize) -> usize {
        let rate = self.effective_rate();
        if n > 1 && rate > 0.0 && self.rng.gen_bool(rate) {
            self.rng.gen_range(0..n)
        } else {
            greedy
        }
    }

    pub fn decay(&mut self) {
        self.rate = (self.rate * self.decay).max(self.min);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_explores_outside_training_modes() {
        let mut explorer = EpsilonGreedy::new(1.0, 1.0, 0.0, 1);
        explorer.set_mode(SessionMode::Evaluation);
        assert_eq!(explorer.effective_rate(), 0.0);
        assert!((0..100).all(|_| explorer.choose(2, 5) == 2));

        explorer.set_mode(SessionMode::Live);
        assert!((0..100).all(|_| explorer.choose(2, 5) == 2));
    }

    #[test]
    fn full_rate_explores_across_the_catalog() {
        let mut explorer = EpsilonGreedy::new(1.0, 1.0, 0.0, 1);
        let picks: std::collections::HashSet<_> = (0..200).map(|_| explorer.choose(0, 5)).collect();
        assert_eq!(picks.len(), 5);
    }

    #[test]
    fn decay_is_floored_at_minimum() {
        let mut explorer = EpsilonGreedy::new(0.1, 0.5, 0.03, 1);
        explorer.decay();
        assert!((explorer.base_rate() - 0.05).abs() < 1e-12);
        explorer.decay();
        assert!((explorer.base_rate() - 0.03).abs() < 1e-12);
    }

    #[test]
    fn same_seed_same_choices() {
        let mut a = EpsilonGreedy::new(0.5, 1.0, 0.0, 9);
        let mut b = EpsilonGreedy::new(0.5, 1.0, 0.0, 9);
        let xs: Vec<_> = (0..50).map(|_| a.choose(0, 5)).collect();
        let ys: Vec<_> = (0..50).map(|_| b.choose(0, 5)).collect();
        assert_eq!(xs, ys);
    }
}
