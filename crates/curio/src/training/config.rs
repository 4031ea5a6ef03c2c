//! Trainer configuration.

use crate::curiosity::CuriosityConfig;
use crate::{CurioError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tch::Device;

/// Hyperparameters of the PPO update engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PpoConfig {
    /// PPO clipping coefficient
    pub clip_param: f64,
    /// Number of passes over each rollout
    pub ppo_epoch: usize,
    /// Number of minibatches per pass
    pub num_mini_batch: usize,
    /// Value loss coefficient
    pub value_loss_coef: f64,
    /// Entropy coefficient
    pub entropy_coef: f64,
    /// Learning rate
    pub lr: f64,
    /// Adam epsilon
    pub eps: f64,
    /// Maximum global gradient norm
    pub max_grad_norm: f64,
    /// Clip value updates around the collection-time estimate
    pub use_clipped_value_loss: bool,
    /// Seed for minibatch shuffling
    pub seed: u64,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            clip_param: 0.2,
            ppo_epoch: 4,
            num_mini_batch: 4,
            value_loss_coef: 0.5,
            entropy_coef: 0.01,
            lr: 7e-4,
            eps: 1e-5,
            max_grad_norm: 0.5,
            use_clipped_value_loss: true,
            seed: 1,
        }
    }
}

impl PpoConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ppo_epoch == 0 {
            return Err(CurioError::InvalidConfig("ppo_epoch must be positive".into()));
        }
        if self.num_mini_batch == 0 {
            return Err(CurioError::InvalidConfig(
                "num_mini_batch must be positive".into(),
            ));
        }
        if !(self.clip_param >= 0.0) {
            return Err(CurioError::InvalidConfig(format!(
                "clip_param must be non-negative, got {}",
                self.clip_param
            )));
        }
        if !(self.lr > 0.0) || !(self.max_grad_norm > 0.0) {
            return Err(CurioError::InvalidConfig(
                "lr and max_grad_norm must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the training loop
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    // Optimization
    /// Learning rate
    pub lr: f64,
    /// Adam epsilon
    pub eps: f64,
    /// Maximum global gradient norm
    pub max_grad_norm: f64,
    /// Decay the learning rate (and PPO clip) linearly to zero
    pub use_linear_lr_decay: bool,

    // Returns
    /// Discount factor
    pub gamma: f64,
    /// Use generalized advantage estimation
    pub use_gae: bool,
    /// GAE lambda
    pub gae_lambda: f64,

    // PPO
    pub entropy_coef: f64,
    pub value_loss_coef: f64,
    pub ppo_epoch: usize,
    pub num_mini_batch: usize,
    pub clip_param: f64,
    pub use_clipped_value_loss: bool,

    // Rollouts
    /// Number of parallel environments
    pub num_processes: usize,
    /// Steps per environment per rollout
    pub num_steps: usize,
    /// Total environment steps to train for
    pub num_env_steps: u64,

    // Policy
    /// Use the GRU policy
    pub recurrent_policy: bool,
    /// Hidden layer / recurrent state size
    pub hidden_size: i64,

    // Bookkeeping
    /// Updates between log lines
    pub log_interval: usize,
    /// Updates between checkpoints
    pub save_interval: usize,
    /// Updates between evaluations (disabled when `None`)
    pub eval_interval: Option<usize>,
    /// Checkpoint directory (no checkpoints when empty)
    pub save_dir: String,

    /// Curiosity-driven exploration
    pub curiosity: CuriosityConfig,

    /// Device to train on
    #[serde(skip, default = "default_device")]
    pub device: Device,

    // Random seed
    pub seed: u64,
}

fn default_device() -> Device {
    Device::Cpu
}

impl Default for TrainerConfig {
    fn default() -> Self {
        let ppo = PpoConfig::default();
        Self {
            lr: ppo.lr,
            eps: ppo.eps,
            max_grad_norm: ppo.max_grad_norm,
            use_linear_lr_decay: false,

            gamma: 0.99,
            use_gae: false,
            gae_lambda: 0.95,

            entropy_coef: ppo.entropy_coef,
            value_loss_coef: ppo.value_loss_coef,
            ppo_epoch: ppo.ppo_epoch,
            num_mini_batch: ppo.num_mini_batch,
            clip_param: ppo.clip_param,
            use_clipped_value_loss: ppo.use_clipped_value_loss,

            num_processes: 8,
            num_steps: 128,
            num_env_steps: 10_000_000,

            recurrent_policy: false,
            hidden_size: 64,

            log_interval: 10,
            save_interval: 100,
            eval_interval: None,
            save_dir: "trained_models".to_string(),

            curiosity: CuriosityConfig::default(),

            device: Device::Cpu,
            seed: ppo.seed,
        }
    }
}

impl TrainerConfig {
    /// Create config for CUDA device
    pub fn cuda(mut self) -> Self {
        self.device = Device::Cuda(0);
        self
    }

    /// Set total environment steps
    pub fn with_num_env_steps(mut self, steps: u64) -> Self {
        self.num_env_steps = steps;
        self
    }

    /// Set learning rate
    pub fn with_lr(mut self, lr: f64) -> Self {
        self.lr = lr;
        self
    }

    /// Set rollout shape
    pub fn with_rollout(mut self, num_processes: usize, num_steps: usize) -> Self {
        self.num_processes = num_processes;
        self.num_steps = num_steps;
        self
    }

    /// Set PPO epochs and minibatches per epoch
    pub fn with_ppo_schedule(mut self, ppo_epoch: usize, num_mini_batch: usize) -> Self {
        self.ppo_epoch = ppo_epoch;
        self.num_mini_batch = num_mini_batch;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_recurrent_policy(mut self, recurrent: bool) -> Self {
        self.recurrent_policy = recurrent;
        self
    }

    pub fn with_curiosity(mut self, curiosity: CuriosityConfig) -> Self {
        self.curiosity = curiosity;
        self
    }

    pub fn with_save_dir(mut self, dir: impl Into<String>) -> Self {
        self.save_dir = dir.into();
        self
    }

    pub fn with_eval_interval(mut self, interval: Option<usize>) -> Self {
        self.eval_interval = interval;
        self
    }

    /// Transitions per rollout
    pub fn batch_size(&self) -> usize {
        self.num_processes * self.num_steps
    }

    /// Number of collect/update cycles
    pub fn num_updates(&self) -> usize {
        let per_update = (self.num_steps * self.num_processes).max(1) as u64;
        (self.num_env_steps / per_update) as usize
    }

    /// The update engine's share of the configuration
    pub fn ppo(&self) -> PpoConfig {
        PpoConfig {
            clip_param: self.clip_param,
            ppo_epoch: self.ppo_epoch,
            num_mini_batch: self.num_mini_batch,
            value_loss_coef: self.value_loss_coef,
            entropy_coef: self.entropy_coef,
            lr: self.lr,
            eps: self.eps,
            max_grad_norm: self.max_grad_norm,
            use_clipped_value_loss: self.use_clipped_value_loss,
            seed: self.seed,
        }
    }

    /// Check rollout shape against the minibatch partition
    pub fn validate(&self) -> Result<()> {
        if self.num_processes == 0 || self.num_steps == 0 {
            return Err(CurioError::InvalidConfig(
                "num_processes and num_steps must be positive".into(),
            ));
        }
        self.ppo().validate()?;

        let partitioned = if self.recurrent_policy {
            self.num_processes
        } else {
            self.batch_size()
        };
        if partitioned < self.num_mini_batch || partitioned % self.num_mini_batch != 0 {
            return Err(CurioError::InvalidConfig(format!(
                "num_mini_batch ({}) must divide {} ({})",
                self.num_mini_batch,
                if self.recurrent_policy {
                    "num_processes"
                } else {
                    "num_processes * num_steps"
                },
                partitioned
            )));
        }
        if self.log_interval == 0 || self.save_interval == 0 || self.eval_interval == Some(0) {
            return Err(CurioError::InvalidConfig("intervals must be positive".into()));
        }
        self.curiosity.validate()
    }

    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write as pretty-printed JSON
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = TrainerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.num_updates(), 10_000_000 / 128 / 8);
        assert_eq!(config.ppo(), PpoConfig::default());
    }

    #[test]
    fn test_rejects_indivisible_minibatches() {
        let config = TrainerConfig::default()
            .with_rollout(4, 5)
            .with_ppo_schedule(4, 3);
        assert!(matches!(
            config.validate(),
            Err(CurioError::InvalidConfig(_))
        ));

        // Recurrent policies partition environments, not transitions
        let config = TrainerConfig::default()
            .with_rollout(4, 5)
            .with_ppo_schedule(4, 5)
            .with_recurrent_policy(true);
        assert!(config.validate().is_err());
        let config = config.with_ppo_schedule(4, 2);
        config.validate().unwrap();
    }

    #[test]
    fn test_json_roundtrip_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "lr": 0.001, "curiosity": { "enabled": true } }"#).unwrap();

        let config = TrainerConfig::from_json_file(&path).unwrap();
        assert_eq!(config.lr, 0.001);
        assert!(config.curiosity.enabled);
        assert_eq!(config.curiosity.lam_pol, CuriosityConfig::default().lam_pol);
        assert_eq!(config.num_steps, TrainerConfig::default().num_steps);

        config.save_json(&path).unwrap();
        let again = TrainerConfig::from_json_file(&path).unwrap();
        assert_eq!(again.lr, 0.001);
    }
}
