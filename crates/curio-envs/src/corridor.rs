//! Sparse-reward corridor for exploration experiments.

use curio::env::{Env, EnvInfo, StepResult};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Corridor environment
///
/// The agent starts at the left end of a corridor of `length` cells and is
/// rewarded only for reaching the right end. The observation is a one-hot
/// encoding of its position, so novelty is easy to measure but the extrinsic
/// reward is rarely seen by a random policy.
///
/// Actions: 0 = left, 1 = right, 2 = stay
pub struct Corridor {
    length: usize,
    max_steps: u32,
    /// Chance that a move goes the other way
    slip: f32,
    position: usize,
    steps: u32,
    rng: StdRng,
}

const LEFT: usize = 0;
const RIGHT: usize = 1;

impl Corridor {
    /// Create a corridor of `length` cells with a step limit of `4 * length`
    pub fn new(length: usize) -> Self {
        let length = length.max(2);
        Self {
            length,
            max_steps: (4 * length) as u32,
            slip: 0.0,
            position: 0,
            steps: 0,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Reverse each move with probability `slip`
    pub fn with_slip(mut self, slip: f32) -> Self {
        self.slip = slip.clamp(0.0, 1.0);
        self
    }

    pub fn position(&self) -> usize {
        self.position
    }

    fn observation(&self) -> Array1<f32> {
        let mut obs = Array1::zeros(self.length);
        obs[self.position] = 1.0;
        obs
    }
}

impl Env for Corridor {
    fn observation_size(&self) -> usize {
        self.length
    }

    fn num_actions(&self) -> usize {
        3
    }

    fn reset(&mut self, seed: Option<u64>) -> Array1<f32> {
        if let Some(s) = seed {
            self.rng = StdRng::seed_from_u64(s);
        }
        self.position = 0;
        self.steps = 0;
        self.observation()
    }

    fn step(&mut self, action: usize) -> StepResult {
        let slipped = self.slip > 0.0 && self.rng.gen::<f32>() < self.slip;
        let direction = match (action, slipped) {
            (LEFT, false) | (RIGHT, true) => -1,
            (RIGHT, false) | (LEFT, true) => 1,
            _ => 0,
        };
        self.position = (self.position as i64 + direction).clamp(0, self.length as i64 - 1) as usize;
        self.steps += 1;

        let terminated = self.position == self.length - 1;
        let truncated = !terminated && self.steps >= self.max_steps;

        StepResult {
            observation: self.observation(),
            reward: if terminated { 1.0 } else { 0.0 },
            terminated,
            truncated,
            info: EnvInfo::new(),
        }
    }

    fn render(&self) -> Option<String> {
        let cells: String = (0..self.length)
            .map(|i| if i == self.position { '@' } else { '.' })
            .collect();
        Some(format!("[{}]", cells))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walking_right_reaches_goal() {
        let mut env = Corridor::new(4);
        let obs = env.reset(Some(0));
        assert_eq!(obs.to_vec(), vec![1.0, 0.0, 0.0, 0.0]);

        let rewards: Vec<f32> = (0..3).map(|_| env.step(RIGHT).reward).collect();
        assert_eq!(rewards, vec![0.0, 0.0, 1.0]);
        assert_eq!(env.position(), 3);
    }

    #[test]
    fn test_walls_and_truncation() {
        let mut env = Corridor::new(5).with_max_steps(2);
        env.reset(None);

        let first = env.step(LEFT);
        assert_eq!(env.position(), 0);
        assert!(!first.done());

        let second = env.step(2);
        assert!(second.truncated);
        assert!(!second.terminated);
        assert_eq!(second.reward, 0.0);
    }

    #[test]
    fn test_full_slip_reverses_moves() {
        let mut env = Corridor::new(4).with_slip(1.0);
        env.reset(Some(3));
        env.step(LEFT);
        assert_eq!(env.position(), 1);
    }

    #[test]
    fn test_render() {
        let mut env = Corridor::new(3);
        env.reset(None);
        assert_eq!(env.render().as_deref(), Some("[@..]"));
    }
}
