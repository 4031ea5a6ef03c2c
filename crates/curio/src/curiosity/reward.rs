//! Intrinsic reward and reward mixing.

use serde::{Deserialize, Serialize};
use tch::{Kind, Tensor};

/// How the forward-model prediction error becomes a reward
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntrinsicRewardFormula {
    /// `0.5 * sum((pred - target)^2)`
    #[default]
    SquaredError,
    /// `0.5 * sum(pred - target^2)`; squares the target before differencing.
    /// Kept to reproduce runs made with that formula.
    TargetSquared,
}

/// Per-row prediction error `[B, 1]`
pub fn prediction_error(
    predicted: &Tensor,
    target: &Tensor,
    formula: IntrinsicRewardFormula,
) -> Tensor {
    let diff = match formula {
        IntrinsicRewardFormula::SquaredError => (predicted - target).pow_tensor_scalar(2),
        IntrinsicRewardFormula::TargetSquared => predicted - target.pow_tensor_scalar(2),
    };
    diff.sum_dim_intlist(Some(&[1_i64][..]), true, Kind::Float) * 0.5
}

/// Blends extrinsic and intrinsic rewards before they are stored
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RewardMixer {
    pub extrinsic_weight: f64,
    pub intrinsic_weight: f64,
}

impl Default for RewardMixer {
    fn default() -> Self {
        Self {
            extrinsic_weight: 1.0,
            intrinsic_weight: 1.0,
        }
    }
}

impl RewardMixer {
    pub fn new(extrinsic_weight: f64, intrinsic_weight: f64) -> Self {
        Self {
            extrinsic_weight,
            intrinsic_weight,
        }
    }

    /// `extrinsic * w_e + intrinsic * w_i`
    pub fn mix(&self, extrinsic: &Tensor, intrinsic: &Tensor) -> Tensor {
        extrinsic * self.extrinsic_weight + intrinsic * self.intrinsic_weight
    }
}
