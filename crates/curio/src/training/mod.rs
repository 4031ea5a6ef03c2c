//! Training system for PPO.
//!
//! Provides:
//! - `RolloutStorage` - Storage for rollout data and minibatch sampling
//! - `Ppo` - The clipped-surrogate update engine, optionally with an
//!   auxiliary objective such as curiosity
//! - `Trainer` - Main collect/update loop

mod auxiliary;
mod buffer;
mod config;
mod optimizer;
mod ppo;
mod trainer;
mod update;

pub use auxiliary::{AuxiliaryObjective, AuxiliaryStats, NoAuxiliary, Objective};
pub use buffer::{MiniBatch, RolloutStorage, TransitionBatch};
pub use config::{PpoConfig, TrainerConfig};
pub use optimizer::{
    clip_grad_norm, linear_decay, update_linear_schedule, PolicyOptimizer, TorchOptimizer,
};
pub use ppo::{
    mse_value_loss, normalize_advantages, ppo_policy_loss, ppo_value_loss, value_loss,
    ADVANTAGE_EPS,
};
pub use trainer::{RecentWindow, Trainer};
pub use update::{CuriosityPpo, Ppo, Sampling, UpdateStats};
