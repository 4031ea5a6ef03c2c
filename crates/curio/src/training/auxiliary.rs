//! Auxiliary objectives blended into the PPO loss.

use super::buffer::MiniBatch;
use crate::Result;
use tch::Tensor;

/// Detached auxiliary loss values of one minibatch
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AuxiliaryStats {
    pub inverse_loss: f64,
    pub forward_loss: f64,
}

/// Loss to back-propagate for one minibatch
pub struct Objective {
    pub loss: Tensor,
    pub auxiliary: Option<AuxiliaryStats>,
}

/// Extra training signal sharing the policy's gradient step.
///
/// Implementations receive the PPO objective
/// `value_loss * value_coef + action_loss - entropy * entropy_coef` and return
/// the loss that is actually back-propagated.
pub trait AuxiliaryObjective {
    /// Whether minibatches must carry transition observation pairs
    fn requires_transitions(&self) -> bool;

    /// Combine the PPO objective with this objective's terms
    fn objective(&self, policy_objective: Tensor, batch: &MiniBatch) -> Result<Objective>;

    /// Reward bonus `[N, 1]` for transitions `prev_observations -> observations`
    /// under `actions`, computed without gradient tracking
    fn intrinsic_reward(
        &self,
        _prev_observations: &Tensor,
        _actions: &Tensor,
        _observations: &Tensor,
    ) -> Result<Option<Tensor>> {
        Ok(None)
    }
}

/// Plain PPO
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAuxiliary;

impl AuxiliaryObjective for NoAuxiliary {
    fn requires_transitions(&self) -> bool {
        false
    }

    fn objective(&self, policy_objective: Tensor, _batch: &MiniBatch) -> Result<Objective> {
        Ok(Objective {
            loss: policy_objective,
            auxiliary: None,
        })
    }
}
