//! Networks of the Intrinsic Curiosity Module.
//!
//! Based on "Curiosity-driven Exploration by Self-supervised Prediction"
//! (Pathak et al., 2017). A feature encoder embeds observations; the forward
//! model predicts the next embedding from the current one and the action;
//! the inverse model recovers the action from two consecutive embeddings.

use tch::{nn, nn::Module, Kind, Tensor};

/// Maps observations `[B, D]` to features `[B, F]`
pub trait FeatureEncoder {
    fn encode(&self, observations: &Tensor) -> Tensor;
}

/// Predicts the next feature from the previous feature and a one-hot action
pub trait ForwardModel {
    /// Cardinality of the discrete action space
    fn action_size(&self) -> i64;

    /// `[B, F] x [B, A] -> [B, F]`
    fn predict(&self, prev_features: &Tensor, one_hot_actions: &Tensor) -> Tensor;
}

/// Predicts the action distribution explaining a feature transition
pub trait InverseModel {
    /// `[B, F] x [B, F] -> [B, A]` probabilities (rows sum to 1)
    fn predict(&self, prev_features: &Tensor, features: &Tensor) -> Tensor;
}

/// Two-layer MLP encoder
pub struct MlpFeatureEncoder {
    net: nn::Sequential,
    feature_size: i64,
}

impl MlpFeatureEncoder {
    pub fn new(vs: &nn::Path, obs_size: i64, feature_size: i64, hidden_size: i64) -> Self {
        let net = nn::seq()
            .add(nn::linear(
                vs / "encoder_0",
                obs_size,
                hidden_size,
                Default::default(),
            ))
            .add_fn(|x| x.relu())
            .add(nn::linear(
                vs / "encoder_1",
                hidden_size,
                feature_size,
                Default::default(),
            ));

        Self { net, feature_size }
    }

    pub fn feature_size(&self) -> i64 {
        self.feature_size
    }
}

impl FeatureEncoder for MlpFeatureEncoder {
    fn encode(&self, observations: &Tensor) -> Tensor {
        self.net.forward(&observations.to_kind(Kind::Float))
    }
}

/// Two-layer MLP forward model over `[features, one_hot(action)]`
pub struct MlpForwardModel {
    net: nn::Sequential,
    action_size: i64,
}

impl MlpForwardModel {
    pub fn new(vs: &nn::Path, feature_size: i64, action_size: i64, hidden_size: i64) -> Self {
        let net = nn::seq()
            .add(nn::linear(
                vs / "forward_0",
                feature_size + action_size,
                hidden_size,
                Default::default(),
            ))
            .add_fn(|x| x.relu())
            .add(nn::linear(
                vs / "forward_1",
                hidden_size,
                feature_size,
                Default::default(),
            ));

        Self { net, action_size }
    }
}

impl ForwardModel for MlpForwardModel {
    fn action_size(&self) -> i64 {
        self.action_size
    }

    fn predict(&self, prev_features: &Tensor, one_hot_actions: &Tensor) -> Tensor {
        let input = Tensor::cat(&[prev_features, one_hot_actions], -1);
        self.net.forward(&input)
    }
}

/// Two-layer MLP inverse model with a softmax output
pub struct MlpInverseModel {
    net: nn::Sequential,
}

impl MlpInverseModel {
    pub fn new(vs: &nn::Path, feature_size: i64, action_size: i64, hidden_size: i64) -> Self {
        let net = nn::seq()
            .add(nn::linear(
                vs / "inverse_0",
                feature_size * 2,
                hidden_size,
                Default::default(),
            ))
            .add_fn(|x| x.relu())
            .add(nn::linear(
                vs / "inverse_1",
                hidden_size,
                action_size,
                Default::default(),
            ));

        Self { net }
    }
}

impl InverseModel for MlpInverseModel {
    fn predict(&self, prev_features: &Tensor, features: &Tensor) -> Tensor {
        let input = Tensor::cat(&[prev_features, features], -1);
        self.net.forward(&input).softmax(-1, Kind::Float)
    }
}
