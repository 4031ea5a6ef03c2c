//! Environment traits and wrappers.
//!
//! Provides the `Env` trait for discrete-action environments plus the
//! `EpisodeStats` wrapper that reports episode returns on completion.

mod traits;
mod wrappers;

pub use traits::{Env, EnvInfo, StepResult};
pub use wrappers::EpisodeStats;
