//! Vectorized environment abstraction.

use crate::env::EnvInfo;
use crate::Result;
use ndarray::Array2;
use tch::{Device, Kind, Tensor};

/// Result from stepping all environments
#[derive(Clone, Debug)]
pub struct VecStep {
    /// Observations `[num_envs, obs_size]`. For finished environments this is
    /// already the first observation of the next episode.
    pub observations: Array2<f32>,
    /// Rewards for all environments
    pub rewards: Vec<f32>,
    /// Episode finished on this step (terminated or truncated)
    pub dones: Vec<bool>,
    /// Info for each environment
    pub infos: Vec<EnvInfo>,
}

impl VecStep {
    /// Returns of the episodes that finished on this step
    pub fn episode_returns(&self) -> impl Iterator<Item = f32> + '_ {
        self.infos.iter().filter_map(|info| info.episode_return)
    }

    /// Rollout masks `[num_envs, 1]`: 0.0 where an episode ended, 1.0 elsewhere
    pub fn masks(&self, device: Device) -> Tensor {
        let masks: Vec<f32> = self
            .dones
            .iter()
            .map(|&done| if done { 0.0 } else { 1.0 })
            .collect();
        Tensor::from_slice(&masks)
            .reshape([self.dones.len() as i64, 1])
            .to_device(device)
    }

    /// Rewards as a `[num_envs, 1]` tensor
    pub fn rewards_tensor(&self, device: Device) -> Tensor {
        Tensor::from_slice(&self.rewards)
            .reshape([self.rewards.len() as i64, 1])
            .to_device(device)
    }
}

/// A batch of environments stepped in lockstep
pub trait VecEnv {
    /// Number of environments
    fn num_envs(&self) -> usize;

    /// Observation size of a single environment
    fn observation_size(&self) -> usize;

    /// Number of discrete actions of a single environment
    fn num_actions(&self) -> usize;

    /// Reset all environments, returning `[num_envs, obs_size]`
    fn reset(&mut self, seed: Option<u64>) -> Result<Array2<f32>>;

    /// Step all environments with one action each
    fn step(&mut self, actions: &[i64]) -> Result<VecStep>;

    /// Close all environments
    fn close(&mut self) {}
}

/// Copy a `[num_envs, obs_size]` batch into a float tensor on `device`.
pub fn observations_to_tensor(observations: &Array2<f32>, device: Device) -> Tensor {
    let (rows, cols) = observations.dim();
    let flat: Vec<f32> = observations.iter().copied().collect();
    Tensor::from_slice(&flat)
        .reshape([rows as i64, cols as i64])
        .to_kind(Kind::Float)
        .to_device(device)
}
