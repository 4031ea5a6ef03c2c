//! Actor-critic policies.
//!
//! Provides policy architectures for PPO:
//! - `MlpPolicy` - Multi-layer perceptron for flat observations
//! - `GruPolicy` - GRU core with mask-aware unrolling for partial observability

mod distribution;
mod gru;
mod mlp;

pub use distribution::Categorical;
pub use gru::GruPolicy;
pub use mlp::{Activation, MlpConfig, MlpPolicy};

use tch::{nn, Tensor};

/// Trait for policies that have a VarStore for optimization
pub trait HasVarStore {
    /// Get mutable reference to the VarStore
    fn var_store_mut(&mut self) -> &mut nn::VarStore;

    /// Get reference to the VarStore
    fn var_store(&self) -> &nn::VarStore;
}

/// Output of [`ActorCritic::act`]
#[derive(Debug)]
pub struct ActOutput {
    /// Value estimate `[B, 1]`
    pub value: Tensor,
    /// Chosen actions `[B, 1]` (Int64)
    pub action: Tensor,
    /// Log-probability of the chosen actions `[B, 1]`
    pub action_log_prob: Tensor,
    /// Recurrent state after this step `[B, H]`
    pub hidden: Tensor,
}

/// Output of [`ActorCritic::evaluate_actions`]
#[derive(Debug)]
pub struct Evaluation {
    /// Value estimates `[B, 1]`
    pub values: Tensor,
    /// Log-probabilities of the given actions `[B, 1]`
    pub action_log_probs: Tensor,
    /// Mean entropy of the action distribution (scalar)
    pub dist_entropy: Tensor,
    /// Recurrent state after the unroll
    pub hidden: Tensor,
}

/// A policy with a discrete action head and a value head.
///
/// `hidden` is the recurrent state, `[B, recurrent_hidden_state_size()]`.
/// Feed-forward policies use a size of 1 and pass it through untouched.
/// `masks` are 0.0 at the first step of a new episode.
pub trait ActorCritic: HasVarStore {
    /// Whether minibatches must keep whole per-environment sequences
    fn is_recurrent(&self) -> bool {
        false
    }

    fn recurrent_hidden_state_size(&self) -> i64 {
        1
    }

    /// Pick actions for a batch of observations
    fn act(
        &self,
        observations: &Tensor,
        hidden: &Tensor,
        masks: &Tensor,
        deterministic: bool,
    ) -> ActOutput;

    /// Value estimates `[B, 1]`
    fn get_value(&self, observations: &Tensor, hidden: &Tensor, masks: &Tensor) -> Tensor;

    /// Re-evaluate stored actions under the current parameters.
    ///
    /// For recurrent policies `observations`, `masks` and `actions` are
    /// time-major flattened sequences (`[T * N, ·]`) and `hidden` holds the
    /// state at the start of each of the `N` sequences.
    fn evaluate_actions(
        &self,
        observations: &Tensor,
        hidden: &Tensor,
        masks: &Tensor,
        actions: &Tensor,
    ) -> Evaluation;
}
