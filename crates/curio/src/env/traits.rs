//! Core environment trait definitions.

use ndarray::Array1;

/// Information returned from environment steps
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvInfo {
    /// Episode return (if done)
    pub episode_return: Option<f32>,
    /// Episode length (if done)
    pub episode_length: Option<u32>,
}

impl EnvInfo {
    /// Create empty info
    pub fn new() -> Self {
        Self::default()
    }

    /// Add episode stats
    pub fn with_episode_stats(mut self, ret: f32, len: u32) -> Self {
        self.episode_return = Some(ret);
        self.episode_length = Some(len);
        self
    }
}

/// Result from a single environment step
#[derive(Clone, Debug)]
pub struct StepResult {
    /// Observation after the step
    pub observation: Array1<f32>,
    /// Reward received
    pub reward: f32,
    /// Whether episode terminated (goal reached, failure, etc.)
    pub terminated: bool,
    /// Whether episode truncated (time limit, etc.)
    pub truncated: bool,
    /// Additional info
    pub info: EnvInfo,
}

impl StepResult {
    /// Check if episode is done (terminated or truncated)
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// A single environment with a flat observation vector and a discrete
/// action space.
///
/// # Example
///
/// ```rust,ignore
/// use curio::env::{Env, EnvInfo, StepResult};
/// use ndarray::Array1;
///
/// struct Coin {
///     flips: u32,
/// }
///
/// impl Env for Coin {
///     fn observation_size(&self) -> usize { 1 }
///     fn num_actions(&self) -> usize { 2 }
///
///     fn reset(&mut self, _seed: Option<u64>) -> Array1<f32> {
///         self.flips = 0;
///         Array1::zeros(1)
///     }
///
///     fn step(&mut self, action: usize) -> StepResult {
///         self.flips += 1;
///         StepResult {
///             observation: Array1::zeros(1),
///             reward: action as f32,
///             terminated: self.flips == 10,
///             truncated: false,
///             info: EnvInfo::new(),
///         }
///     }
/// }
/// ```
pub trait Env: Send {
    /// Length of the flat observation vector
    fn observation_size(&self) -> usize;

    /// Cardinality of the discrete action space
    fn num_actions(&self) -> usize;

    /// Reset the environment to an initial state
    ///
    /// # Arguments
    /// * `seed` - Optional random seed for reproducibility
    fn reset(&mut self, seed: Option<u64>) -> Array1<f32>;

    /// Take a single step. `action` is always below `num_actions()`.
    fn step(&mut self, action: usize) -> StepResult;

    /// Optional: Render the environment
    fn render(&self) -> Option<String> {
        None
    }

    /// Optional: Close the environment and free resources
    fn close(&mut self) {}
}

impl<E: Env + ?Sized> Env for Box<E> {
    fn observation_size(&self) -> usize {
        (**self).observation_size()
    }

    fn num_actions(&self) -> usize {
        (**self).num_actions()
    }

    fn reset(&mut self, seed: Option<u64>) -> Array1<f32> {
        (**self).reset(seed)
    }

    fn step(&mut self, action: usize) -> StepResult {
        (**self).step(action)
    }

    fn render(&self) -> Option<String> {
        (**self).render()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
