//! Categorical action distribution.

use tch::{Kind, Tensor};

/// Categorical distribution over discrete actions, parameterized by logits
/// `[B, num_actions]`.
///
/// Actions are `[B, 1]` Int64 tensors throughout.
#[derive(Debug)]
pub struct Categorical {
    logits: Tensor,
}

impl Categorical {
    pub fn new(logits: Tensor) -> Self {
        Self { logits }
    }

    pub fn logits(&self) -> &Tensor {
        &self.logits
    }

    pub fn probs(&self) -> Tensor {
        self.logits.softmax(-1, Kind::Float)
    }

    /// Sample one action per row
    pub fn sample(&self) -> Tensor {
        self.probs().multinomial(1, true)
    }

    /// Most likely action per row
    pub fn mode(&self) -> Tensor {
        self.logits.argmax(-1, true)
    }

    /// Log-probabilities of `actions`, `[B, 1]`
    pub fn log_probs(&self, actions: &Tensor) -> Tensor {
        let log_probs = self.logits.log_softmax(-1, Kind::Float);
        let indices = if actions.dim() == log_probs.dim() {
            actions.to_kind(Kind::Int64)
        } else {
            actions.unsqueeze(-1).to_kind(Kind::Int64)
        };
        log_probs.gather(-1, &indices, false)
    }

    /// Per-row entropy, `[B]`
    pub fn entropy(&self) -> Tensor {
        let probs = self.logits.softmax(-1, Kind::Float);
        let log_probs = self.logits.log_softmax(-1, Kind::Float);
        -(probs * log_probs).sum_dim_intlist(Some(&[-1_i64][..]), false, Kind::Float)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorical_sample() {
        tch::manual_seed(0);
        let logits = Tensor::from_slice(&[1.0f32, 2.0, 10.0]).reshape([1, 3]);
        let dist = Categorical::new(logits);
        let sample = dist.sample();
        assert_eq!(sample.size(), [1, 1]);
        let val = sample.int64_value(&[0, 0]);
        assert!((0..3).contains(&val));
    }

    #[test]
    fn test_mode_and_log_probs() {
        let logits = Tensor::from_slice(&[0.0f32, 0.0, 5.0, 1.0, 0.0, 0.0]).reshape([2, 3]);
        let dist = Categorical::new(logits);

        let mode = dist.mode();
        assert_eq!(mode.size(), [2, 1]);
        assert_eq!(mode.int64_value(&[0, 0]), 2);
        assert_eq!(mode.int64_value(&[1, 0]), 0);

        let log_probs = dist.log_probs(&mode);
        assert_eq!(log_probs.size(), [2, 1]);
        let expected = dist.probs().max_dim(-1, true).0.log();
        let diff = (log_probs - expected).abs().max().double_value(&[]);
        assert!(diff < 1e-6);
    }

    #[test]
    fn test_uniform_entropy() {
        let logits = Tensor::zeros([4, 4], (Kind::Float, tch::Device::Cpu));
        let entropy = Categorical::new(logits).entropy();
        assert_eq!(entropy.size(), [4]);
        let val = entropy.mean(Kind::Float).double_value(&[]);
        assert!((val - 4f64.ln()).abs() < 1e-5);
    }
}
