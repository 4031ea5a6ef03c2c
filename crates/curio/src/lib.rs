//! # curio
//!
//! Proximal Policy Optimization with an optional Intrinsic Curiosity Module,
//! built on libtorch through `tch`.
//!
//! ## Overview
//!
//! curio provides:
//! - A discrete-action environment abstraction with the `Env` trait
//! - Vectorized stepping with automatic resets (`vector::Serial`)
//! - Actor-critic policies (`MlpPolicy`, `GruPolicy`)
//! - A clipped-surrogate PPO update engine (`training::Ppo`)
//! - Curiosity-driven exploration (`curiosity::Curiosity`), trained jointly
//!   with the policy through a single optimizer
//! - A rollout/update training loop with evaluation and checkpoints
//!
//! ## Features
//!
//! - `tensorboard` - Write scalar metrics as TensorBoard event files
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use curio::prelude::*;
//! use curio_envs::CartPole;
//!
//! let config = TrainerConfig::default();
//! let envs = Serial::new(CartPole::new, config.num_processes);
//! let policy = MlpPolicy::new(4, 2, MlpConfig::default(), tch::Device::Cpu);
//! let ppo = Ppo::new(&policy, config.ppo())?;
//! let mut trainer = Trainer::new(envs, policy, ppo, config)?;
//! trainer.train()?;
//! ```

pub mod curiosity;
pub mod env;
pub mod log;
pub mod policy;
pub mod training;
pub mod utils;
pub mod vector;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::curiosity::{
        Curiosity, CuriosityConfig, IntrinsicRewardFormula, MlpFeatureEncoder, MlpForwardModel,
        MlpInverseModel,
    };
    pub use crate::env::{Env, EnvInfo, EpisodeStats, StepResult};
    pub use crate::vector::{Serial, VecEnv, VecStep};

    #[cfg(feature = "tensorboard")]
    pub use crate::log::TensorBoardLogger;
    pub use crate::log::{CompositeLogger, ConsoleLogger, MemoryLogger, MetricLogger, Metrics, NoOpLogger};

    pub use crate::policy::{
        ActorCritic, Categorical, GruPolicy, HasVarStore, MlpConfig, MlpPolicy,
    };

    pub use crate::training::{
        AuxiliaryObjective, CuriosityPpo, NoAuxiliary, Ppo, PpoConfig, RolloutStorage, Trainer,
        TrainerConfig, UpdateStats,
    };

    pub use crate::{CurioError, Result};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum CurioError {
    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<i64>,
        actual: Vec<i64>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Non-finite {what} loss: {value}")]
    NonFiniteLoss { what: &'static str, value: f64 },

    #[error("Action {action} out of range for {num_actions} actions")]
    InvalidAction { action: i64, num_actions: i64 },

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tensor error: {0}")]
    Tensor(#[from] tch::TchError),
}

pub type Result<T> = std::result::Result<T, CurioError>;
