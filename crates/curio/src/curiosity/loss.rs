//! Auxiliary losses of the curiosity module.

use crate::{CurioError, Result};
use serde::{Deserialize, Serialize};
use tch::{Kind, Tensor};

/// Floor inside the log of the inverse loss
const LOG_EPS: f64 = 1e-15;

/// Reduction of the inverse-model cross-entropy over the minibatch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InverseLoss {
    /// Summed over the minibatch
    #[default]
    Sum,
    /// Averaged over the minibatch
    Mean,
}

/// Reduction of the forward-model squared error over the minibatch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForwardLoss {
    /// `0.5 * sum((pred - target)^2)` over dimensions and minibatch
    #[default]
    Sum,
    /// Summed over dimensions, averaged over the minibatch
    Mean,
}

/// `-sum(one_hot * log(p + 1e-15))`, reduced per `kind`
pub fn inverse_loss(action_probs: &Tensor, one_hot_actions: &Tensor, kind: InverseLoss) -> Tensor {
    let total = -(one_hot_actions * (action_probs + LOG_EPS).log()).sum(Kind::Float);
    match kind {
        InverseLoss::Sum => total,
        InverseLoss::Mean => total / action_probs.size()[0] as f64,
    }
}

/// `0.5 * sum((predicted - features)^2)`, reduced per `kind`
pub fn forward_loss(predicted: &Tensor, features: &Tensor, kind: ForwardLoss) -> Tensor {
    let total = (predicted - features).pow_tensor_scalar(2).sum(Kind::Float) * 0.5;
    match kind {
        ForwardLoss::Sum => total,
        ForwardLoss::Mean => total / predicted.size()[0] as f64,
    }
}

/// One-hot encode actions (`[B, 1]` or `[B]`) into `[B, action_size]` floats.
///
/// Fails when an action lies outside `0..action_size`.
pub fn one_hot(actions: &Tensor, action_size: i64) -> Result<Tensor> {
    let flat = actions.reshape([-1]).to_kind(Kind::Int64);
    if flat.numel() > 0 {
        let min = flat.min().int64_value(&[]);
        let max = flat.max().int64_value(&[]);
        let bad = if min < 0 { min } else { max };
        if min < 0 || max >= action_size {
            return Err(CurioError::InvalidAction {
                action: bad,
                num_actions: action_size,
            });
        }
    }
    Ok(flat.one_hot(action_size).to_kind(Kind::Float))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    #[test]
    fn test_one_hot() {
        let actions = Tensor::from_slice(&[2i64, 0, 1]).reshape([3, 1]);
        let encoded = one_hot(&actions, 3).unwrap();
        assert_eq!(encoded.size(), [3, 3]);
        assert_eq!(encoded.double_value(&[0, 2]), 1.0);
        assert_eq!(encoded.double_value(&[1, 0]), 1.0);
        assert_eq!(encoded.sum(Kind::Float).double_value(&[]), 3.0);
    }

    #[test]
    fn test_one_hot_rejects_out_of_range() {
        let actions = Tensor::from_slice(&[0i64, 4]).reshape([2, 1]);
        assert!(matches!(
            one_hot(&actions, 4),
            Err(CurioError::InvalidAction {
                action: 4,
                num_actions: 4
            })
        ));
        let actions = Tensor::from_slice(&[-1i64]);
        assert!(one_hot(&actions, 4).is_err());
    }

    #[test]
    fn test_inverse_loss_vanishes_for_certain_prediction() {
        let actions = Tensor::from_slice(&[1i64, 0]).reshape([2, 1]);
        let targets = one_hot(&actions, 2).unwrap();
        let probs = targets.copy();

        let loss = inverse_loss(&probs, &targets, InverseLoss::Sum).double_value(&[]);
        assert!(loss.abs() < 1e-6);
    }

    #[test]
    fn test_inverse_loss_reductions() {
        let targets = Tensor::from_slice(&[1.0f32, 0.0, 0.0, 1.0]).reshape([2, 2]);
        let probs = Tensor::full([2, 2], 0.5, (Kind::Float, Device::Cpu));

        let sum = inverse_loss(&probs, &targets, InverseLoss::Sum).double_value(&[]);
        let mean = inverse_loss(&probs, &targets, InverseLoss::Mean).double_value(&[]);
        assert!((sum - 2.0 * 2f64.ln()).abs() < 1e-5);
        assert!((mean - 2f64.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_forward_loss_reductions() {
        let predicted = Tensor::from_slice(&[1.0f32, 2.0, 0.0, 0.0]).reshape([2, 2]);
        let features = Tensor::zeros([2, 2], (Kind::Float, Device::Cpu));

        let sum = forward_loss(&predicted, &features, ForwardLoss::Sum).double_value(&[]);
        let mean = forward_loss(&predicted, &features, ForwardLoss::Mean).double_value(&[]);
        assert!((sum - 2.5).abs() < 1e-6);
        assert!((mean - 1.25).abs() < 1e-6);
    }
}
