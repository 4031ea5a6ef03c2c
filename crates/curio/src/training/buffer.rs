//! Rollout storage and minibatch generation.
//!
//! Per-step tensors are laid out `[T + 1, N, ·]` (observations, previous
//! observations, recurrent states, value predictions, returns, masks) or
//! `[T, N, ·]` (actions, log-probs, rewards), where `T` is the rollout length
//! and `N` the number of environments. Slot `t + 1` of the observation-like
//! tensors holds what was observed after acting at step `t`.

use crate::utils::check_shape;
use crate::{CurioError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use tch::{Device, Kind, Tensor};

/// Buffer for one rollout of `num_steps` steps across `num_processes`
/// environments
pub struct RolloutStorage {
    /// Observations `[T + 1, N, D]`
    pub obs: Tensor,
    /// Observation before the step that produced `obs`, `[T + 1, N, D]`
    pub prev_obs: Tensor,
    /// Recurrent state fed to the policy at each step `[T + 1, N, H]`
    pub recurrent_hidden_states: Tensor,
    /// Rewards `[T, N, 1]`
    pub rewards: Tensor,
    /// Value estimates at collection time `[T + 1, N, 1]`
    pub value_preds: Tensor,
    /// Bootstrapped returns `[T + 1, N, 1]`
    pub returns: Tensor,
    /// Log-probabilities at collection time `[T, N, 1]`
    pub action_log_probs: Tensor,
    /// Actions `[T, N, 1]` (Int64)
    pub actions: Tensor,
    /// 0.0 where the observation at this slot starts a new episode `[T + 1, N, 1]`
    pub masks: Tensor,

    num_steps: usize,
    num_processes: usize,
    obs_size: i64,
    hidden_size: i64,
    step: usize,
    device: Device,
}

/// Observation pair for a batch of transitions
#[derive(Debug)]
pub struct TransitionBatch {
    /// Observations the actions were taken from `[B, D]`
    pub prev_observations: Tensor,
    /// Observations the actions led to `[B, D]`
    pub observations: Tensor,
}

/// A minibatch of experience for the update engine
#[derive(Debug)]
pub struct MiniBatch {
    /// Policy inputs `[B, D]`
    pub observations: Tensor,
    /// `[B, H]` for feed-forward batches; `[Nb, H]` sequence start states for
    /// recurrent batches
    pub recurrent_hidden_states: Tensor,
    /// `[B, 1]` (Int64)
    pub actions: Tensor,
    /// Value estimates at collection time `[B, 1]`
    pub value_preds: Tensor,
    pub returns: Tensor,
    pub masks: Tensor,
    pub old_action_log_probs: Tensor,
    /// Normalized advantages `[B, 1]`
    pub advantages: Tensor,
    /// Present when requested by the auxiliary objective
    pub transitions: Option<TransitionBatch>,
}

impl MiniBatch {
    pub fn len(&self) -> i64 {
        self.actions.size()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RolloutStorage {
    /// Create a new rollout storage
    pub fn new(
        num_steps: usize,
        num_processes: usize,
        obs_size: i64,
        hidden_size: i64,
        device: Device,
    ) -> Self {
        let t = num_steps as i64;
        let n = num_processes as i64;
        let opts = (Kind::Float, device);

        Self {
            obs: Tensor::zeros([t + 1, n, obs_size], opts),
            prev_obs: Tensor::zeros([t + 1, n, obs_size], opts),
            recurrent_hidden_states: Tensor::zeros([t + 1, n, hidden_size], opts),
            rewards: Tensor::zeros([t, n, 1], opts),
            value_preds: Tensor::zeros([t + 1, n, 1], opts),
            returns: Tensor::zeros([t + 1, n, 1], opts),
            action_log_probs: Tensor::zeros([t, n, 1], opts),
            actions: Tensor::zeros([t, n, 1], (Kind::Int64, device)),
            masks: Tensor::ones([t + 1, n, 1], opts),
            num_steps,
            num_processes,
            obs_size,
            hidden_size,
            step: 0,
            device,
        }
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    pub fn num_processes(&self) -> usize {
        self.num_processes
    }

    /// Number of transitions per rollout (`T * N`)
    pub fn batch_size(&self) -> usize {
        self.num_steps * self.num_processes
    }

    /// Index of the next step to be written
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Seed slot 0 with the initial observations after an environment reset
    pub fn set_initial_observations(&mut self, obs: &Tensor) -> Result<()> {
        let n = self.num_processes as i64;
        check_shape("observations", obs, &[n, self.obs_size])?;
        self.obs.get(0).copy_(obs);
        self.prev_obs.get(0).copy_(obs);
        Ok(())
    }

    /// Record one environment step for every process.
    ///
    /// `obs`, `prev_obs`, `hidden` and `masks` describe the state after the
    /// step; `actions`, `log_probs`, `value_preds` and `rewards` the step itself.
    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &mut self,
        obs: &Tensor,
        hidden: &Tensor,
        actions: &Tensor,
        log_probs: &Tensor,
        value_preds: &Tensor,
        rewards: &Tensor,
        masks: &Tensor,
        prev_obs: &Tensor,
    ) -> Result<()> {
        let n = self.num_processes as i64;
        check_shape("observations", obs, &[n, self.obs_size])?;
        check_shape("previous observations", prev_obs, &[n, self.obs_size])?;
        check_shape("recurrent hidden states", hidden, &[n, self.hidden_size])?;
        check_shape("actions", actions, &[n, 1])?;
        check_shape("action log probs", log_probs, &[n, 1])?;
        check_shape("value predictions", value_preds, &[n, 1])?;
        check_shape("rewards", rewards, &[n, 1])?;
        check_shape("masks", masks, &[n, 1])?;

        let s = self.step as i64;
        self.obs.get(s + 1).copy_(obs);
        self.prev_obs.get(s + 1).copy_(prev_obs);
        self.recurrent_hidden_states.get(s + 1).copy_(hidden);
        self.actions.get(s).copy_(&actions.to_kind(Kind::Int64));
        self.action_log_probs.get(s).copy_(log_probs);
        self.value_preds.get(s).copy_(value_preds);
        self.rewards.get(s).copy_(rewards);
        self.masks.get(s + 1).copy_(masks);

        self.step = (self.step + 1) % self.num_steps;
        Ok(())
    }

    /// Carry the last observation, recurrent state and mask into slot 0
    pub fn after_update(&mut self) {
        let last = self.num_steps as i64;
        self.obs.get(0).copy_(&self.obs.get(last));
        self.prev_obs.get(0).copy_(&self.prev_obs.get(last));
        self.recurrent_hidden_states
            .get(0)
            .copy_(&self.recurrent_hidden_states.get(last));
        self.masks.get(0).copy_(&self.masks.get(last));
    }

    /// Fill `returns` from the stored rewards, bootstrapping from `next_value`
    /// (`[N, 1]`). With `use_gae`, returns are GAE advantages plus value
    /// predictions; otherwise plain discounted returns.
    pub fn compute_returns(
        &mut self,
        next_value: &Tensor,
        use_gae: bool,
        gamma: f64,
        gae_lambda: f64,
    ) -> Result<()> {
        let n = self.num_processes as i64;
        check_shape("next value", next_value, &[n, 1])?;
        let last = self.num_steps as i64;

        if use_gae {
            self.value_preds.get(last).copy_(next_value);
            let mut gae = Tensor::zeros([n, 1], (Kind::Float, self.device));
            for t in (0..last).rev() {
                let mask = self.masks.get(t + 1);
                let delta = self.rewards.get(t) + gamma * self.value_preds.get(t + 1) * &mask
                    - self.value_preds.get(t);
                gae = delta + gamma * gae_lambda * &mask * &gae;
                self.returns
                    .get(t)
                    .copy_(&(&gae + self.value_preds.get(t)));
            }
        } else {
            self.returns.get(last).copy_(next_value);
            for t in (0..last).rev() {
                let discounted =
                    self.returns.get(t + 1) * gamma * self.masks.get(t + 1) + self.rewards.get(t);
                self.returns.get(t).copy_(&discounted);
            }
        }
        Ok(())
    }

    /// `returns[:-1] - value_preds[:-1]`, `[T, N, 1]`
    pub fn raw_advantages(&self) -> Tensor {
        let t = self.num_steps as i64;
        self.returns.narrow(0, 0, t) - self.value_preds.narrow(0, 0, t)
    }

    /// Split the rollout into `num_mini_batch` shuffled, non-overlapping
    /// minibatches of individual transitions.
    pub fn feed_forward_generator<R: Rng + ?Sized>(
        &self,
        advantages: &Tensor,
        num_mini_batch: usize,
        with_transitions: bool,
        rng: &mut R,
    ) -> Result<Vec<MiniBatch>> {
        let batch_size = self.batch_size();
        if num_mini_batch == 0 || batch_size < num_mini_batch || batch_size % num_mini_batch != 0
        {
            return Err(CurioError::InvalidConfig(format!(
                "PPO requires the number of processes ({}) * number of steps ({}) = {} \
                 to be divisible by the number of PPO mini batches ({})",
                self.num_processes, self.num_steps, batch_size, num_mini_batch
            )));
        }
        self.check_advantages(advantages)?;

        let t = self.num_steps as i64;
        let d = self.obs_size;
        let flat = |x: &Tensor, width: i64| x.narrow(0, 0, t).reshape([-1, width]);

        let obs = flat(&self.obs, d);
        let hidden = flat(&self.recurrent_hidden_states, self.hidden_size);
        let actions = flat(&self.actions, 1);
        let value_preds = flat(&self.value_preds, 1);
        let returns = flat(&self.returns, 1);
        let masks = flat(&self.masks, 1);
        let old_log_probs = flat(&self.action_log_probs, 1);
        let advantages = advantages.reshape([-1, 1]);
        let next = if with_transitions {
            Some((
                self.prev_obs.narrow(0, 1, t).reshape([-1, d]),
                self.obs.narrow(0, 1, t).reshape([-1, d]),
            ))
        } else {
            None
        };

        let mut order: Vec<i64> = (0..batch_size as i64).collect();
        order.shuffle(rng);
        let mini_batch_size = batch_size / num_mini_batch;

        let batches = order
            .chunks(mini_batch_size)
            .map(|chunk| {
                let idx = Tensor::from_slice(chunk).to_device(self.device);
                MiniBatch {
                    observations: obs.index_select(0, &idx),
                    recurrent_hidden_states: hidden.index_select(0, &idx),
                    actions: actions.index_select(0, &idx),
                    value_preds: value_preds.index_select(0, &idx),
                    returns: returns.index_select(0, &idx),
                    masks: masks.index_select(0, &idx),
                    old_action_log_probs: old_log_probs.index_select(0, &idx),
                    advantages: advantages.index_select(0, &idx),
                    transitions: next.as_ref().map(|(prev, cur)| TransitionBatch {
                        prev_observations: prev.index_select(0, &idx),
                        observations: cur.index_select(0, &idx),
                    }),
                }
            })
            .collect();

        Ok(batches)
    }

    /// Split the rollout into `num_mini_batch` minibatches of whole
    /// per-environment sequences, flattened time-major (`[T * Nb, ·]`).
    pub fn recurrent_generator<R: Rng + ?Sized>(
        &self,
        advantages: &Tensor,
        num_mini_batch: usize,
        with_transitions: bool,
        rng: &mut R,
    ) -> Result<Vec<MiniBatch>> {
        let num_processes = self.num_processes;
        if num_mini_batch == 0
            || num_processes < num_mini_batch
            || num_processes % num_mini_batch != 0
        {
            return Err(CurioError::InvalidConfig(format!(
                "PPO requires the number of processes ({}) to be a multiple of \
                 the number of PPO mini batches ({})",
                num_processes, num_mini_batch
            )));
        }
        self.check_advantages(advantages)?;

        let t = self.num_steps as i64;
        let d = self.obs_size;
        let envs_per_batch = num_processes / num_mini_batch;

        let mut perm: Vec<i64> = (0..num_processes as i64).collect();
        perm.shuffle(rng);

        let batches = perm
            .chunks(envs_per_batch)
            .map(|chunk| {
                let idx = Tensor::from_slice(chunk).to_device(self.device);
                let seq = |x: &Tensor, offset: i64, width: i64| {
                    x.narrow(0, offset, t).index_select(1, &idx).reshape([-1, width])
                };

                MiniBatch {
                    observations: seq(&self.obs, 0, d),
                    recurrent_hidden_states: self
                        .recurrent_hidden_states
                        .get(0)
                        .index_select(0, &idx),
                    actions: seq(&self.actions, 0, 1),
                    value_preds: seq(&self.value_preds, 0, 1),
                    returns: seq(&self.returns, 0, 1),
                    masks: seq(&self.masks, 0, 1),
                    old_action_log_probs: seq(&self.action_log_probs, 0, 1),
                    advantages: seq(advantages, 0, 1),
                    transitions: with_transitions.then(|| TransitionBatch {
                        prev_observations: seq(&self.prev_obs, 1, d),
                        observations: seq(&self.obs, 1, d),
                    }),
                }
            })
            .collect();

        Ok(batches)
    }

    fn check_advantages(&self, advantages: &Tensor) -> Result<()> {
        check_shape(
            "advantages",
            advantages,
            &[self.num_steps as i64, self.num_processes as i64, 1],
        )
    }
}
