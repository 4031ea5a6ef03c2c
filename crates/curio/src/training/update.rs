//! The PPO update engine.

use super::auxiliary::{AuxiliaryObjective, NoAuxiliary};
use super::buffer::{MiniBatch, RolloutStorage};
use super::config::PpoConfig;
use super::optimizer::{PolicyOptimizer, TorchOptimizer};
use super::ppo::{normalize_advantages, ppo_policy_loss, value_loss};
use crate::curiosity::Curiosity;
use crate::policy::ActorCritic;
use crate::utils::check_shape;
use crate::{CurioError, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

/// How minibatches are drawn from a rollout
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sampling {
    /// Shuffled individual transitions
    FeedForward,
    /// Shuffled whole per-environment sequences
    Recurrent,
}

impl Sampling {
    pub fn for_policy<P: ActorCritic + ?Sized>(policy: &P) -> Self {
        if policy.is_recurrent() {
            Sampling::Recurrent
        } else {
            Sampling::FeedForward
        }
    }
}

/// Averages over every minibatch step of one [`Ppo::update`] call
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UpdateStats {
    pub value_loss: f64,
    pub action_loss: f64,
    pub dist_entropy: f64,
    /// Present when the auxiliary objective reports losses
    pub inverse_loss: Option<f64>,
    pub forward_loss: Option<f64>,
    /// Optimizer steps taken
    pub num_updates: usize,
}

/// Per-minibatch loss values
struct StepTerms {
    value_loss: f64,
    action_loss: f64,
    dist_entropy: f64,
    auxiliary: Option<(f64, f64)>,
}

/// PPO with clipped surrogate objective, optionally blended with an auxiliary
/// objective trained in the same optimizer step.
pub struct Ppo<A: AuxiliaryObjective = NoAuxiliary, O: PolicyOptimizer = TorchOptimizer> {
    config: PpoConfig,
    optimizer: O,
    objective: A,
    rng: ChaCha8Rng,
}

/// PPO with the Intrinsic Curiosity Module
pub type CuriosityPpo = Ppo<Curiosity>;

impl Ppo<NoAuxiliary, TorchOptimizer> {
    /// Plain PPO with Adam over every trainable variable of `policy`
    pub fn new<P: ActorCritic + ?Sized>(policy: &P, config: PpoConfig) -> Result<Self> {
        Self::with_objective(policy, config, NoAuxiliary)
    }
}

impl<A: AuxiliaryObjective> Ppo<A, TorchOptimizer> {
    /// PPO with an auxiliary objective. One Adam optimizer covers the whole
    /// policy `VarStore`, so auxiliary networks must already be registered on
    /// it.
    pub fn with_objective<P: ActorCritic + ?Sized>(
        policy: &P,
        config: PpoConfig,
        objective: A,
    ) -> Result<Self> {
        config.validate()?;
        let optimizer = TorchOptimizer::adam(policy.var_store(), config.lr, config.eps)?;
        Ok(Self::from_parts(config, optimizer, objective))
    }
}

impl<A: AuxiliaryObjective, O: PolicyOptimizer> Ppo<A, O> {
    /// Assemble an engine from an existing optimizer
    pub fn from_parts(config: PpoConfig, optimizer: O, objective: A) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            optimizer,
            objective,
            rng,
        }
    }

    /// Replace the shuffling RNG
    pub fn with_rng(mut self, rng: ChaCha8Rng) -> Self {
        self.rng = rng;
        self
    }

    pub fn config(&self) -> &PpoConfig {
        &self.config
    }

    pub fn clip_param(&self) -> f64 {
        self.config.clip_param
    }

    pub fn set_clip_param(&mut self, clip_param: f64) {
        self.config.clip_param = clip_param;
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    pub fn optimizer_mut(&mut self) -> &mut O {
        &mut self.optimizer
    }

    pub fn objective(&self) -> &A {
        &self.objective
    }

    /// Run `ppo_epoch` passes of minibatch updates over `rollouts`, whose
    /// returns must already be computed.
    pub fn update<P: ActorCritic + ?Sized>(
        &mut self,
        policy: &P,
        rollouts: &RolloutStorage,
    ) -> Result<UpdateStats> {
        let sampling = Sampling::for_policy(policy);
        let advantages = normalize_advantages(&rollouts.raw_advantages());
        let with_transitions = self.objective.requires_transitions();
        let num_mini_batch = self.config.num_mini_batch;

        let mut value_loss_epoch = 0.0;
        let mut action_loss_epoch = 0.0;
        let mut dist_entropy_epoch = 0.0;
        let mut auxiliary_epoch: Option<(f64, f64)> = None;
        let mut num_updates = 0usize;

        for epoch in 0..self.config.ppo_epoch {
            let minibatches = match sampling {
                Sampling::FeedForward => rollouts.feed_forward_generator(
                    &advantages,
                    num_mini_batch,
                    with_transitions,
                    &mut self.rng,
                )?,
                Sampling::Recurrent => rollouts.recurrent_generator(
                    &advantages,
                    num_mini_batch,
                    with_transitions,
                    &mut self.rng,
                )?,
            };

            for batch in &minibatches {
                let terms = self.step(policy, batch)?;
                value_loss_epoch += terms.value_loss;
                action_loss_epoch += terms.action_loss;
                dist_entropy_epoch += terms.dist_entropy;
                if let Some((inverse, forward)) = terms.auxiliary {
                    let (i, f) = auxiliary_epoch.get_or_insert((0.0, 0.0));
                    *i += inverse;
                    *f += forward;
                }
                num_updates += 1;
            }

            debug!(
                epoch,
                minibatches = minibatches.len(),
                "PPO epoch complete"
            );
        }

        let n = self.config.ppo_epoch * num_mini_batch;
        let denom = n.max(1) as f64;
        Ok(UpdateStats {
            value_loss: value_loss_epoch / denom,
            action_loss: action_loss_epoch / denom,
            dist_entropy: dist_entropy_epoch / denom,
            inverse_loss: auxiliary_epoch.map(|(i, _)| i / denom),
            forward_loss: auxiliary_epoch.map(|(_, f)| f / denom),
            num_updates,
        })
    }

    /// One gradient step on one minibatch
    fn step<P: ActorCritic + ?Sized>(&mut self, policy: &P, batch: &MiniBatch) -> Result<StepTerms> {
        let eval = policy.evaluate_actions(
            &batch.observations,
            &batch.recurrent_hidden_states,
            &batch.masks,
            &batch.actions,
        );
        let expected = batch.returns.size();
        check_shape("values", &eval.values, &expected)?;
        check_shape("action log probs", &eval.action_log_probs, &expected)?;
        check_shape("dist entropy", &eval.dist_entropy, &[])?;

        let clip = self.config.clip_param;
        let action_loss = ppo_policy_loss(
            &batch.advantages,
            &eval.action_log_probs,
            &batch.old_action_log_probs,
            clip,
        );
        let value_loss = value_loss(
            &eval.values,
            &batch.value_preds,
            &batch.returns,
            clip,
            self.config.use_clipped_value_loss,
        );

        let policy_objective = &value_loss * self.config.value_loss_coef + &action_loss
            - &eval.dist_entropy * self.config.entropy_coef;
        let objective = self.objective.objective(policy_objective, batch)?;

        let loss_value = objective.loss.double_value(&[]);
        if !loss_value.is_finite() {
            return Err(CurioError::NonFiniteLoss {
                what: "total",
                value: loss_value,
            });
        }

        self.optimizer.zero_grad();
        objective.loss.backward();
        self.optimizer.clip_grad_norm(self.config.max_grad_norm)?;
        self.optimizer.step();

        Ok(StepTerms {
            value_loss: value_loss.double_value(&[]),
            action_loss: action_loss.double_value(&[]),
            dist_entropy: eval.dist_entropy.double_value(&[]),
            auxiliary: objective
                .auxiliary
                .map(|stats| (stats.inverse_loss, stats.forward_loss)),
        })
    }
}
