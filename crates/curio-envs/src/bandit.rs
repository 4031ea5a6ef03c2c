//! Multi-armed bandit environment.

use curio::env::{Env, EnvInfo, StepResult};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Multi-armed bandit environment
///
/// The agent must learn which arm gives the highest reward.
/// Rewards are determined by a fixed random seed, so all
/// instances have the same optimal arm. Every episode is one pull.
pub struct Bandit {
    /// Number of arms
    num_actions: usize,
    /// Reward scale
    reward_scale: f32,
    /// Reward noise amplitude
    reward_noise: f32,
    /// Optimal arm index
    solution_idx: usize,
    /// RNG for noise
    rng: StdRng,
}

impl Bandit {
    /// Create a new bandit environment
    pub fn new(num_actions: usize) -> Self {
        Self::with_config(num_actions, 1.0, 0.0, 42)
    }

    /// Create with full configuration
    pub fn with_config(
        num_actions: usize,
        reward_scale: f32,
        reward_noise: f32,
        hard_fixed_seed: u64,
    ) -> Self {
        let num_actions = num_actions.max(1);
        let mut seed_rng = StdRng::seed_from_u64(hard_fixed_seed);
        let solution_idx = seed_rng.gen_range(0..num_actions);

        Self {
            num_actions,
            reward_scale,
            reward_noise,
            solution_idx,
            rng: StdRng::from_entropy(),
        }
    }

    /// The arm that pays out
    pub fn solution(&self) -> usize {
        self.solution_idx
    }
}

impl Env for Bandit {
    fn observation_size(&self) -> usize {
        1
    }

    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn reset(&mut self, seed: Option<u64>) -> Array1<f32> {
        if let Some(s) = seed {
            self.rng = StdRng::seed_from_u64(s);
        }
        Array1::ones(1)
    }

    fn step(&mut self, action: usize) -> StepResult {
        let correct = action == self.solution_idx;
        let mut reward = if correct { 1.0 } else { 0.0 };

        if self.reward_noise > 0.0 {
            let noise: f32 = self.rng.gen::<f32>() * 2.0 - 1.0;
            reward += noise * self.reward_noise;
        }

        StepResult {
            observation: Array1::ones(1),
            reward: reward * self.reward_scale,
            terminated: true,
            truncated: false,
            info: EnvInfo::new(),
        }
    }

    fn render(&self) -> Option<String> {
        Some(format!("Bandit: solution arm = {}", self.solution_idx))
    }
}
