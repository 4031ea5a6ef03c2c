//! Vectorized environments.
//!
//! `VecEnv` steps a fixed set of environments in lockstep; `Serial` runs
//! them one after another on the calling thread.

mod serial;
mod vecenv;

pub use serial::Serial;
pub use vecenv::{observations_to_tensor, VecEnv, VecStep};
