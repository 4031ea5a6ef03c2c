//! CartPole classic control environment.

use curio::env::{Env, EnvInfo, StepResult};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

/// CartPole environment
///
/// A pole is attached to a cart on a frictionless track. The goal
/// is to balance the pole by applying forces to the cart.
///
/// Observation: [cart_pos, cart_vel, pole_angle, pole_vel]
/// Action: 0 = push left, 1 = push right
pub struct CartPole {
    // Physics constants
    gravity: f32,
    mass_pole: f32,
    total_mass: f32,
    length: f32, // half-pole length
    pole_mass_length: f32,
    force_mag: f32,
    tau: f32, // timestep

    // Thresholds
    theta_threshold: f32,
    x_threshold: f32,
    max_steps: u32,

    // State
    state: [f32; 4], // x, x_dot, theta, theta_dot
    steps: u32,
    rng: StdRng,
}

impl CartPole {
    /// Create a new CartPole environment
    pub fn new() -> Self {
        let mass_cart = 1.0;
        let mass_pole = 0.1;
        let length = 0.5;

        Self {
            gravity: 9.8,
            mass_pole,
            total_mass: mass_cart + mass_pole,
            length,
            pole_mass_length: mass_pole * length,
            force_mag: 10.0,
            tau: 0.02,
            theta_threshold: 12.0 * 2.0 * PI / 360.0, // 12 degrees
            x_threshold: 2.4,
            max_steps: 500,
            state: [0.0; 4],
            steps: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Truncate episodes after `max_steps`
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    fn is_terminal(&self) -> bool {
        let x = self.state[0];
        let theta = self.state[2];

        x.abs() > self.x_threshold || theta.abs() > self.theta_threshold
    }

    fn observation(&self) -> Array1<f32> {
        Array1::from_vec(self.state.to_vec())
    }
}

impl Default for CartPole {
    fn default() -> Self {
        Self::new()
    }
}

impl Env for CartPole {
    fn observation_size(&self) -> usize {
        4
    }

    fn num_actions(&self) -> usize {
        2
    }

    fn reset(&mut self, seed: Option<u64>) -> Array1<f32> {
        if let Some(s) = seed {
            self.rng = StdRng::seed_from_u64(s);
        }

        // Initialize state randomly in [-0.05, 0.05]
        for value in self.state.iter_mut() {
            *value = self.rng.gen::<f32>() * 0.1 - 0.05;
        }
        self.steps = 0;

        self.observation()
    }

    fn step(&mut self, action: usize) -> StepResult {
        let [x, x_dot, theta, theta_dot] = self.state;

        let force = if action == 1 {
            self.force_mag
        } else {
            -self.force_mag
        };

        let cos_theta = theta.cos();
        let sin_theta = theta.sin();

        let temp = (force + self.pole_mass_length * theta_dot * theta_dot * sin_theta)
            / self.total_mass;
        let theta_acc = (self.gravity * sin_theta - cos_theta * temp)
            / (self.length * (4.0 / 3.0 - self.mass_pole * cos_theta * cos_theta / self.total_mass));
        let x_acc = temp - self.pole_mass_length * theta_acc * cos_theta / self.total_mass;

        // Euler integration
        self.state[0] = x + self.tau * x_dot;
        self.state[1] = x_dot + self.tau * x_acc;
        self.state[2] = theta + self.tau * theta_dot;
        self.state[3] = theta_dot + self.tau * theta_acc;

        self.steps += 1;

        let terminated = self.is_terminal();
        let truncated = !terminated && self.steps >= self.max_steps;
        let reward = if terminated { 0.0 } else { 1.0 };

        StepResult {
            observation: self.observation(),
            reward,
            terminated,
            truncated,
            info: EnvInfo::new(),
        }
    }

    fn render(&self) -> Option<String> {
        let [x, _, theta, _] = self.state;

        let cart_pos = ((x + 2.4) / 4.8 * 20.0) as i32;
        let cart_pos = cart_pos.clamp(0, 20);

        let mut line = vec![' '; 21];
        line[cart_pos as usize] = if theta.abs() < 0.1 { '|' } else { '/' };

        Some(format!("[{}]", line.iter().collect::<String>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cartpole_reset() {
        let mut env = CartPole::new();
        let obs = env.reset(Some(42));

        assert_eq!(obs.len(), 4);
        assert!(obs.iter().all(|v| v.abs() <= 0.05));
    }

    #[test]
    fn test_cartpole_step() {
        let mut env = CartPole::new();
        env.reset(Some(42));

        let result = env.step(1);
        assert_eq!(result.observation.len(), 4);
        assert_eq!(result.reward, 1.0);
        assert!(!result.done());
    }

    #[test]
    fn test_cartpole_determinism() {
        let mut env1 = CartPole::new();
        let mut env2 = CartPole::new();

        env1.reset(Some(42));
        env2.reset(Some(42));

        for _ in 0..10 {
            let res1 = env1.step(1);
            let res2 = env2.step(1);
            assert_eq!(res1.observation, res2.observation);
        }
    }

    #[test]
    fn test_cartpole_falls_when_pushed_one_way() {
        let mut env = CartPole::new();
        env.reset(Some(0));

        let terminated = (0..200).any(|_| env.step(1).terminated);
        assert!(terminated);
    }

    #[test]
    fn test_cartpole_truncates() {
        let mut env = CartPole::new().with_max_steps(3);
        env.reset(Some(1));

        let results: Vec<StepResult> = (0..3).map(|i| env.step(i % 2)).collect();
        assert!(!results[1].done());
        assert!(results[2].truncated);
    }
}
