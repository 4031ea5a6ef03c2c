//! PPO loss terms.

use tch::{Kind, Tensor};

/// Added to the advantage standard deviation before dividing.
pub const ADVANTAGE_EPS: f64 = 1e-5;

/// Normalize advantages over the whole batch: `(a - mean) / (std + 1e-5)`,
/// using the unbiased standard deviation.
pub fn normalize_advantages(advantages: &Tensor) -> Tensor {
    let mean = advantages.mean(Kind::Float);
    let std = advantages.std(true);
    (advantages - mean) / (std + ADVANTAGE_EPS)
}

/// Compute PPO clipped policy loss
pub fn ppo_policy_loss(
    advantages: &Tensor,
    log_probs: &Tensor,
    old_log_probs: &Tensor,
    clip_coef: f64,
) -> Tensor {
    let ratio = (log_probs - old_log_probs).exp();

    let surr1 = &ratio * advantages;
    let surr2 = ratio.clamp(1.0 - clip_coef, 1.0 + clip_coef) * advantages;

    -surr1.min_other(&surr2).mean(Kind::Float)
}

/// Compute clipped value loss
pub fn ppo_value_loss(
    values: &Tensor,
    old_values: &Tensor,
    returns: &Tensor,
    clip_coef: f64,
) -> Tensor {
    let values_clipped = old_values + (values - old_values).clamp(-clip_coef, clip_coef);

    let loss1 = (values - returns).pow_tensor_scalar(2);
    let loss2 = (&values_clipped - returns).pow_tensor_scalar(2);

    loss1.max_other(&loss2).mean(Kind::Float) * 0.5
}

/// Unclipped value loss, `0.5 * mean((R - v)^2)`
pub fn mse_value_loss(values: &Tensor, returns: &Tensor) -> Tensor {
    (returns - values).pow_tensor_scalar(2).mean(Kind::Float) * 0.5
}

/// Value loss in the configured mode
pub fn value_loss(
    values: &Tensor,
    old_values: &Tensor,
    returns: &Tensor,
    clip_coef: f64,
    clipped: bool,
) -> Tensor {
    if clipped {
        ppo_value_loss(values, old_values, returns, clip_coef)
    } else {
        mse_value_loss(values, returns)
    }
}
