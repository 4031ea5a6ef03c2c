//! Curiosity-driven exploration.
//!
//! [`Curiosity`] plugs into [`crate::training::Ppo`] as an
//! [`AuxiliaryObjective`]: its inverse and forward losses are blended into the
//! PPO loss so the curiosity networks train in the same optimizer step as the
//! policy, and its forward-model error provides an intrinsic reward during
//! collection.
//!
//! The networks should be built on a sub-path of the policy's `VarStore`
//! (see [`Curiosity::mlp`]) so the engine's optimizer covers them.

mod loss;
mod models;
mod reward;

pub use loss::{forward_loss, inverse_loss, one_hot, ForwardLoss, InverseLoss};
pub use models::{
    FeatureEncoder, ForwardModel, InverseModel, MlpFeatureEncoder, MlpForwardModel,
    MlpInverseModel,
};
pub use reward::{prediction_error, IntrinsicRewardFormula, RewardMixer};

use crate::training::{AuxiliaryObjective, AuxiliaryStats, MiniBatch, Objective};
use crate::utils::check_shape;
use crate::{CurioError, Result};
use serde::{Deserialize, Serialize};
use tch::{nn, Tensor};

/// Configuration for curiosity-driven exploration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuriosityConfig {
    /// Train with curiosity
    pub enabled: bool,
    /// Size of the learned feature embedding
    pub feature_size: i64,
    /// Hidden layer size of the curiosity networks
    pub hidden_size: i64,
    /// Scale of the intrinsic reward
    pub intrinsic_reward_scale: f64,
    /// Weight of the environment reward in the stored reward
    pub extrinsic_weight: f64,
    /// Weight of the intrinsic reward in the stored reward
    pub intrinsic_weight: f64,
    /// Weight of the PPO objective in the blended loss
    pub lam_pol: f64,
    /// Share of the forward loss among the curiosity losses
    pub forward_loss_weight: f64,
    pub reward_formula: IntrinsicRewardFormula,
    pub inverse_loss: InverseLoss,
    pub forward_loss: ForwardLoss,
}

impl Default for CuriosityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            feature_size: 32,
            hidden_size: 64,
            intrinsic_reward_scale: 1.0,
            extrinsic_weight: 1.0,
            intrinsic_weight: 1.0,
            lam_pol: 0.5,
            forward_loss_weight: 0.2,
            reward_formula: IntrinsicRewardFormula::SquaredError,
            inverse_loss: InverseLoss::Sum,
            forward_loss: ForwardLoss::Sum,
        }
    }
}

impl CuriosityConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.forward_loss_weight) {
            return Err(CurioError::InvalidConfig(format!(
                "forward_loss_weight must be in [0, 1], got {}",
                self.forward_loss_weight
            )));
        }
        if self.feature_size <= 0 || self.hidden_size <= 0 {
            return Err(CurioError::InvalidConfig(
                "curiosity feature_size and hidden_size must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Reward blend used during collection
    pub fn mixer(&self) -> RewardMixer {
        RewardMixer::new(self.extrinsic_weight, self.intrinsic_weight)
    }
}

/// Intrinsic Curiosity Module as an auxiliary PPO objective
pub struct Curiosity {
    feature_encoder: Box<dyn FeatureEncoder>,
    forward_model: Box<dyn ForwardModel>,
    inverse_model: Box<dyn InverseModel>,
    lam_pol: f64,
    forward_loss_weight: f64,
    inverse_loss: InverseLoss,
    forward_loss: ForwardLoss,
    reward_scale: f64,
    reward_formula: IntrinsicRewardFormula,
}

/// Differentiable curiosity losses of one batch
pub struct CuriosityLosses {
    pub inverse: Tensor,
    pub forward: Tensor,
}

impl Curiosity {
    /// Compose a curiosity module with `lam_pol = 0.5` and
    /// `forward_loss_weight = 0.2`
    pub fn new(
        feature_encoder: Box<dyn FeatureEncoder>,
        forward_model: Box<dyn ForwardModel>,
        inverse_model: Box<dyn InverseModel>,
    ) -> Self {
        Self::with_config(
            feature_encoder,
            forward_model,
            inverse_model,
            &CuriosityConfig::default(),
        )
    }

    /// Compose a curiosity module using the coefficients of `config`
    pub fn with_config(
        feature_encoder: Box<dyn FeatureEncoder>,
        forward_model: Box<dyn ForwardModel>,
        inverse_model: Box<dyn InverseModel>,
        config: &CuriosityConfig,
    ) -> Self {
        Self {
            feature_encoder,
            forward_model,
            inverse_model,
            lam_pol: config.lam_pol,
            forward_loss_weight: config.forward_loss_weight,
            inverse_loss: config.inverse_loss,
            forward_loss: config.forward_loss,
            reward_scale: config.intrinsic_reward_scale,
            reward_formula: config.reward_formula,
        }
    }

    /// MLP curiosity networks under `path / "curiosity"`
    pub fn mlp(path: &nn::Path, obs_size: i64, num_actions: i64, config: &CuriosityConfig) -> Self {
        let vs = path / "curiosity";
        let (f, h) = (config.feature_size, config.hidden_size);
        Self::with_config(
            Box::new(MlpFeatureEncoder::new(&vs, obs_size, f, h)),
            Box::new(MlpForwardModel::new(&vs, f, num_actions, h)),
            Box::new(MlpInverseModel::new(&vs, f, num_actions, h)),
            config,
        )
    }

    pub fn with_coefficients(mut self, lam_pol: f64, forward_loss_weight: f64) -> Self {
        self.lam_pol = lam_pol;
        self.forward_loss_weight = forward_loss_weight;
        self
    }

    pub fn with_loss_kinds(mut self, inverse: InverseLoss, forward: ForwardLoss) -> Self {
        self.inverse_loss = inverse;
        self.forward_loss = forward;
        self
    }

    pub fn with_intrinsic_reward(mut self, scale: f64, formula: IntrinsicRewardFormula) -> Self {
        self.reward_scale = scale;
        self.reward_formula = formula;
        self
    }

    pub fn lam_pol(&self) -> f64 {
        self.lam_pol
    }

    pub fn forward_loss_weight(&self) -> f64 {
        self.forward_loss_weight
    }

    pub fn action_size(&self) -> i64 {
        self.forward_model.action_size()
    }

    /// Inverse and forward losses for transitions `prev_obs -> obs` under
    /// `actions`
    pub fn losses(
        &self,
        prev_obs: &Tensor,
        obs: &Tensor,
        actions: &Tensor,
    ) -> Result<CuriosityLosses> {
        let one_hot = one_hot(actions, self.action_size())?;
        let (prev_features, features) = self.encode_pair(prev_obs, obs, one_hot.size()[0])?;

        let action_probs = self.inverse_model.predict(&prev_features, &features);
        check_shape("inverse model output", &action_probs, &one_hot.size())?;
        let inverse = inverse_loss(&action_probs, &one_hot, self.inverse_loss);

        let predicted = self.forward_model.predict(&prev_features, &one_hot);
        check_shape("forward model output", &predicted, &features.size())?;
        let forward = forward_loss(&predicted, &features, self.forward_loss);

        Ok(CuriosityLosses { inverse, forward })
    }

    /// Features of both ends of `rows` transitions
    fn encode_pair(&self, prev_obs: &Tensor, obs: &Tensor, rows: i64) -> Result<(Tensor, Tensor)> {
        let obs_shape = with_rows(obs, rows);
        check_shape("observations", obs, &obs_shape)?;
        check_shape("previous observations", prev_obs, &obs_shape)?;

        let prev_features = self.feature_encoder.encode(prev_obs);
        let features = self.feature_encoder.encode(obs);
        let feature_shape = with_rows(&features, rows);
        check_shape("features", &features, &feature_shape)?;
        check_shape("previous features", &prev_features, &feature_shape)?;
        Ok((prev_features, features))
    }

    /// `lam_pol * policy + (1 - w) * inverse + w * forward`
    pub fn blend(&self, policy_objective: &Tensor, losses: &CuriosityLosses) -> Tensor {
        let w = self.forward_loss_weight;
        policy_objective * self.lam_pol + &losses.inverse * (1.0 - w) + &losses.forward * w
    }
}

impl AuxiliaryObjective for Curiosity {
    fn requires_transitions(&self) -> bool {
        true
    }

    fn objective(&self, policy_objective: Tensor, batch: &MiniBatch) -> Result<Objective> {
        let transitions = batch
            .transitions
            .as_ref()
            .ok_or(CurioError::MissingField("previous observations"))?;
        let losses = self.losses(
            &transitions.prev_observations,
            &transitions.observations,
            &batch.actions,
        )?;

        let loss = self.blend(&policy_objective, &losses);
        let auxiliary = AuxiliaryStats {
            inverse_loss: losses.inverse.double_value(&[]),
            forward_loss: losses.forward.double_value(&[]),
        };
        Ok(Objective {
            loss,
            auxiliary: Some(auxiliary),
        })
    }

    fn intrinsic_reward(
        &self,
        prev_observations: &Tensor,
        actions: &Tensor,
        observations: &Tensor,
    ) -> Result<Option<Tensor>> {
        let one_hot = one_hot(actions, self.action_size())?;
        let (predicted, target) = tch::no_grad(|| {
            let (prev_features, features) =
                self.encode_pair(prev_observations, observations, one_hot.size()[0])?;
            let predicted = self.forward_model.predict(&prev_features, &one_hot);
            Ok::<_, CurioError>((predicted, features))
        })?;
        check_shape("forward model output", &predicted, &target.size())?;
        let reward = prediction_error(&predicted, &target, self.reward_formula) * self.reward_scale;
        Ok(Some(reward))
    }
}

/// Shape of `tensor` with its leading dimension set to `rows`
fn with_rows(tensor: &Tensor, rows: i64) -> Vec<i64> {
    let mut shape = tensor.size();
    match shape.first_mut() {
        Some(first) => *first = rows,
        None => shape.push(rows),
    }
    shape
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::TransitionBatch;
    use tch::{Device, Kind};

    const OPTS: (Kind, Device) = (Kind::Float, Device::Cpu);

    /// Maps every observation to the zero feature
    struct ZeroEncoder(i64);

    impl FeatureEncoder for ZeroEncoder {
        fn encode(&self, observations: &Tensor) -> Tensor {
            Tensor::zeros([observations.size()[0], self.0], OPTS)
        }
    }

    /// Always predicts the zero feature
    struct ZeroForward {
        features: i64,
        actions: i64,
    }

    impl ForwardModel for ZeroForward {
        fn action_size(&self) -> i64 {
            self.actions
        }

        fn predict(&self, prev_features: &Tensor, _one_hot: &Tensor) -> Tensor {
            Tensor::zeros([prev_features.size()[0], self.features], OPTS)
        }
    }

    /// Uniform over actions
    struct UniformInverse(i64);

    impl InverseModel for UniformInverse {
        fn predict(&self, prev_features: &Tensor, _features: &Tensor) -> Tensor {
            Tensor::full([prev_features.size()[0], self.0], 1.0 / self.0 as f64, OPTS)
        }
    }

    fn zero_curiosity() -> Curiosity {
        Curiosity::new(
            Box::new(ZeroEncoder(4)),
            Box::new(ZeroForward {
                features: 4,
                actions: 2,
            }),
            Box::new(UniformInverse(2)),
        )
    }

    fn batch(transitions: bool) -> MiniBatch {
        let b = 3;
        MiniBatch {
            observations: Tensor::randn([b, 5], OPTS),
            recurrent_hidden_states: Tensor::zeros([b, 1], OPTS),
            actions: Tensor::from_slice(&[0i64, 1, 1]).reshape([b, 1]),
            value_preds: Tensor::zeros([b, 1], OPTS),
            returns: Tensor::zeros([b, 1], OPTS),
            masks: Tensor::ones([b, 1], OPTS),
            old_action_log_probs: Tensor::zeros([b, 1], OPTS),
            advantages: Tensor::zeros([b, 1], OPTS),
            transitions: transitions.then(|| TransitionBatch {
                prev_observations: Tensor::randn([b, 5], OPTS),
                observations: Tensor::randn([b, 5], OPTS),
            }),
        }
    }

    #[test]
    fn test_zero_models_give_zero_forward_loss_and_reward() {
        let curiosity = zero_curiosity();
        let prev = Tensor::randn([3, 5], OPTS);
        let obs = Tensor::randn([3, 5], OPTS);
        let actions = Tensor::from_slice(&[0i64, 1, 0]).reshape([3, 1]);

        let losses = curiosity.losses(&prev, &obs, &actions).unwrap();
        assert_eq!(losses.forward.double_value(&[]), 0.0);
        // Uniform inverse model over two actions: 3 * ln 2
        assert!((losses.inverse.double_value(&[]) - 3.0 * 2f64.ln()).abs() < 1e-5);

        let reward = curiosity
            .intrinsic_reward(&prev, &actions, &obs)
            .unwrap()
            .unwrap();
        assert_eq!(reward.size(), [3, 1]);
        assert_eq!(reward.abs().sum(Kind::Float).double_value(&[]), 0.0);
    }

    #[test]
    fn test_blend_weights() {
        let curiosity = zero_curiosity().with_coefficients(0.5, 0.2);
        let losses = CuriosityLosses {
            inverse: Tensor::from(10.0),
            forward: Tensor::from(5.0),
        };
        let blended = curiosity.blend(&Tensor::from(2.0), &losses);
        // 0.5 * 2 + 0.8 * 10 + 0.2 * 5
        assert!((blended.double_value(&[]) - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_objective_requires_transitions() {
        let curiosity = zero_curiosity();
        assert!(curiosity.requires_transitions());

        let result = curiosity.objective(Tensor::from(1.0), &batch(false));
        assert!(matches!(result, Err(CurioError::MissingField(_))));

        let objective = curiosity.objective(Tensor::from(1.0), &batch(true)).unwrap();
        let stats = objective.auxiliary.unwrap();
        assert_eq!(stats.forward_loss, 0.0);
        let expected = 0.5 + 0.8 * stats.inverse_loss;
        assert!((objective.loss.double_value(&[]) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_out_of_range_action_fails() {
        let curiosity = zero_curiosity();
        let prev = Tensor::randn([2, 5], OPTS);
        let actions = Tensor::from_slice(&[0i64, 2]).reshape([2, 1]);
        assert!(matches!(
            curiosity.losses(&prev, &prev, &actions),
            Err(CurioError::InvalidAction { action: 2, .. })
        ));
        assert!(curiosity.intrinsic_reward(&prev, &actions, &prev).is_err());
    }

    /// Predicts a single feature row whatever the batch size
    struct OneRowForward;

    impl ForwardModel for OneRowForward {
        fn action_size(&self) -> i64 {
            2
        }

        fn predict(&self, _prev_features: &Tensor, _one_hot: &Tensor) -> Tensor {
            Tensor::ones([1, 4], OPTS)
        }
    }

    #[test]
    fn test_forward_output_must_match_features() {
        let curiosity = Curiosity::new(
            Box::new(ZeroEncoder(4)),
            Box::new(OneRowForward),
            Box::new(UniformInverse(2)),
        );
        let obs = Tensor::randn([3, 5], OPTS);
        let actions = Tensor::from_slice(&[0i64, 1, 0]).reshape([3, 1]);

        assert!(matches!(
            curiosity.losses(&obs, &obs, &actions),
            Err(CurioError::ShapeMismatch {
                what: "forward model output",
                ..
            })
        ));
        assert!(matches!(
            curiosity.intrinsic_reward(&obs, &actions, &obs),
            Err(CurioError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_inverse_output_must_cover_actions() {
        let curiosity = Curiosity::new(
            Box::new(ZeroEncoder(4)),
            Box::new(ZeroForward {
                features: 4,
                actions: 2,
            }),
            Box::new(UniformInverse(3)),
        );
        let obs = Tensor::randn([3, 5], OPTS);
        let actions = Tensor::from_slice(&[0i64, 1, 0]).reshape([3, 1]);

        let result = curiosity.losses(&obs, &obs, &actions);
        match result {
            Err(CurioError::ShapeMismatch {
                what,
                expected,
                actual,
            }) => {
                assert_eq!(what, "inverse model output");
                assert_eq!(expected, vec![3, 2]);
                assert_eq!(actual, vec![3, 3]);
            }
            _ => panic!("expected a shape mismatch"),
        }
    }

    #[test]
    fn test_transition_rows_must_match_actions() {
        let mut short = batch(true);
        short.transitions = Some(TransitionBatch {
            prev_observations: Tensor::randn([2, 5], OPTS),
            observations: Tensor::randn([2, 5], OPTS),
        });
        let vs = nn::VarStore::new(Device::Cpu);
        let curiosity = Curiosity::mlp(&vs.root(), 5, 2, &CuriosityConfig::default());
        assert!(matches!(
            curiosity.objective(Tensor::from(1.0), &short),
            Err(CurioError::ShapeMismatch {
                what: "observations",
                ..
            })
        ));

        // Only the previous observations are short
        let mut uneven = batch(true);
        uneven.transitions = Some(TransitionBatch {
            prev_observations: Tensor::randn([2, 5], OPTS),
            observations: Tensor::randn([3, 5], OPTS),
        });
        assert!(matches!(
            curiosity.objective(Tensor::from(1.0), &uneven),
            Err(CurioError::ShapeMismatch {
                what: "previous observations",
                ..
            })
        ));
    }

    #[test]
    fn test_legacy_reward_formula() {
        let curiosity =
            zero_curiosity().with_intrinsic_reward(2.0, IntrinsicRewardFormula::TargetSquared);
        let obs = Tensor::randn([2, 5], OPTS);
        let actions = Tensor::from_slice(&[1i64, 0]).reshape([2, 1]);
        let reward = curiosity
            .intrinsic_reward(&obs, &actions, &obs)
            .unwrap()
            .unwrap();
        assert_eq!(reward.sum(Kind::Float).double_value(&[]), 0.0);
    }
}
