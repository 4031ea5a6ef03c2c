//! Optimizer interface used by the update engine.

use crate::Result;
use tch::{nn, nn::OptimizerConfig, Kind, Tensor};

/// Gradient-step interface used by [`crate::training::Ppo`].
pub trait PolicyOptimizer {
    /// Zero out gradients.
    fn zero_grad(&mut self);

    /// Perform an optimization step.
    fn step(&mut self);

    /// Set the learning rate for subsequent steps.
    fn set_lr(&mut self, lr: f64);

    /// Rescale gradients so their global L2 norm is at most `max_norm`.
    /// Returns the norm before clipping.
    fn clip_grad_norm(&mut self, max_norm: f64) -> Result<f64>;
}

/// Wrapper for Torch's `nn::Optimizer` over every trainable variable of a
/// `VarStore`.
///
/// Variables are captured at construction: modules sharing the store (such as
/// curiosity networks) must be built before the optimizer.
pub struct TorchOptimizer {
    inner: nn::Optimizer,
    variables: Vec<Tensor>,
}

impl TorchOptimizer {
    pub fn new(inner: nn::Optimizer, variables: Vec<Tensor>) -> Self {
        Self { inner, variables }
    }

    /// Adam with the given learning rate and epsilon
    pub fn adam(vs: &nn::VarStore, lr: f64, eps: f64) -> Result<Self> {
        let config = nn::Adam {
            eps,
            ..Default::default()
        };
        let inner = config.build(vs, lr)?;
        Ok(Self::new(inner, vs.trainable_variables()))
    }

    /// Plain SGD without momentum
    pub fn sgd(vs: &nn::VarStore, lr: f64) -> Result<Self> {
        let inner = nn::Sgd::default().build(vs, lr)?;
        Ok(Self::new(inner, vs.trainable_variables()))
    }

    pub fn variables(&self) -> &[Tensor] {
        &self.variables
    }
}

impl PolicyOptimizer for TorchOptimizer {
    fn zero_grad(&mut self) {
        self.inner.zero_grad();
    }

    fn step(&mut self) {
        self.inner.step();
    }

    fn set_lr(&mut self, lr: f64) {
        self.inner.set_lr(lr);
    }

    fn clip_grad_norm(&mut self, max_norm: f64) -> Result<f64> {
        clip_grad_norm(&self.variables, max_norm)
    }
}

/// Global L2 gradient norm over `variables`, clipped in place to `max_norm`.
/// Returns the norm before clipping.
pub fn clip_grad_norm(variables: &[Tensor], max_norm: f64) -> Result<f64> {
    let mut global_norm = 0.0f64;
    for var in variables {
        let grad = var.grad();
        if grad.defined() {
            global_norm += grad
                .f_pow_tensor_scalar(2.0)?
                .f_sum(Kind::Float)?
                .f_double_value(&[])?;
        }
    }
    global_norm = global_norm.sqrt();

    if global_norm > max_norm {
        let clip_coef = max_norm / (global_norm + 1e-6);
        for var in variables {
            let mut grad = var.grad();
            if grad.defined() {
                grad.f_mul_scalar_(clip_coef)?;
            }
        }
    }

    Ok(global_norm)
}

/// Decrease the learning rate linearly from `initial_lr` to zero over
/// `total_updates`.
pub fn update_linear_schedule<O: PolicyOptimizer + ?Sized>(
    optimizer: &mut O,
    update: usize,
    total_updates: usize,
    initial_lr: f64,
) -> f64 {
    let lr = linear_decay(initial_lr, update, total_updates);
    optimizer.set_lr(lr);
    lr
}

/// `value * (1 - update / total_updates)`
pub fn linear_decay(value: f64, update: usize, total_updates: usize) -> f64 {
    if total_updates == 0 {
        return value;
    }
    value - value * (update as f64 / total_updates as f64)
}
