//! Recurrent actor-critic with a GRU core.

use super::{ActOutput, ActorCritic, Categorical, Evaluation, HasVarStore};
use tch::{nn, nn::Module, nn::RNN, Device, Kind, Tensor};

/// GRU actor-critic.
///
/// The recurrent state is reset wherever `masks` is zero, both for single
/// steps during collection and inside unrolled training sequences.
pub struct GruPolicy {
    hidden_size: i64,
    gru: nn::GRU,
    vs: nn::VarStore,
    encoder: nn::Sequential,
    /// Actor head
    actor: nn::Linear,
    /// Critic head
    critic: nn::Linear,
    device: Device,
}

impl GruPolicy {
    /// Create a new GRU policy
    pub fn new(obs_size: i64, num_actions: i64, hidden_size: i64, device: Device) -> Self {
        let vs = nn::VarStore::new(device);
        let root = vs.root();

        let encoder = nn::seq()
            .add(nn::linear(
                &root / "encoder",
                obs_size,
                hidden_size,
                Default::default(),
            ))
            .add_fn(|x| x.relu());

        let gru_config = nn::RNNConfig {
            batch_first: false,
            ..Default::default()
        };
        let gru = nn::gru(&root / "gru", hidden_size, hidden_size, gru_config);

        let actor = nn::linear(
            &root / "actor",
            hidden_size,
            num_actions,
            Default::default(),
        );
        let critic = nn::linear(&root / "critic", hidden_size, 1, Default::default());

        Self {
            hidden_size,
            gru,
            vs,
            encoder,
            actor,
            critic,
            device,
        }
    }

    /// Get number of parameters
    pub fn num_parameters(&self) -> usize {
        self.vs
            .trainable_variables()
            .iter()
            .map(|t| t.numel())
            .sum()
    }

    /// One GRU step over `[N, H]` inputs, resetting state where `masks` is 0
    fn step(&self, x: &Tensor, hidden: &Tensor, masks: &Tensor) -> Tensor {
        let state = nn::GRUState((hidden * masks).unsqueeze(0));
        let (output, _) = self.gru.seq_init(&x.unsqueeze(0), &state);
        output.squeeze_dim(0)
    }

    /// Run the core over either a single step (`x` has as many rows as
    /// `hidden`) or a time-major flattened sequence `[T * N, H]`.
    fn forward_core(&self, x: &Tensor, hidden: &Tensor, masks: &Tensor) -> (Tensor, Tensor) {
        let num_envs = hidden.size()[0];
        let rows = x.size()[0];

        if rows == num_envs {
            let h = self.step(x, hidden, masks);
            return (h.shallow_clone(), h);
        }

        let steps = rows / num_envs;
        let x = x.view([steps, num_envs, self.hidden_size]);
        let masks = masks.view([steps, num_envs, 1]);

        let mut h = hidden.shallow_clone();
        let mut outputs = Vec::with_capacity(steps as usize);
        for t in 0..steps {
            h = self.step(&x.get(t), &h, &masks.get(t));
            outputs.push(h.shallow_clone());
        }

        let outputs = Tensor::stack(&outputs, 0).view([steps * num_envs, self.hidden_size]);
        (outputs, h)
    }

    fn forward(
        &self,
        observations: &Tensor,
        hidden: &Tensor,
        masks: &Tensor,
    ) -> (Categorical, Tensor, Tensor) {
        let obs = observations.to_device(self.device).to_kind(Kind::Float);
        let x = self.encoder.forward(&obs);
        let (features, hidden) = self.forward_core(&x, hidden, masks);
        let logits = self.actor.forward(&features);
        let value = self.critic.forward(&features);
        (Categorical::new(logits), value, hidden)
    }
}

impl HasVarStore for GruPolicy {
    fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }

    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }
}

impl ActorCritic for GruPolicy {
    fn is_recurrent(&self) -> bool {
        true
    }

    fn recurrent_hidden_state_size(&self) -> i64 {
        self.hidden_size
    }

    fn act(
        &self,
        observations: &Tensor,
        hidden: &Tensor,
        masks: &Tensor,
        deterministic: bool,
    ) -> ActOutput {
        let (dist, value, hidden) = self.forward(observations, hidden, masks);
        let action = if deterministic {
            dist.mode()
        } else {
            dist.sample()
        };
        let action_log_prob = dist.log_probs(&action);

        ActOutput {
            value,
            action,
            action_log_prob,
            hidden,
        }
    }

    fn get_value(&self, observations: &Tensor, hidden: &Tensor, masks: &Tensor) -> Tensor {
        self.forward(observations, hidden, masks).1
    }

    fn evaluate_actions(
        &self,
        observations: &Tensor,
        hidden: &Tensor,
        masks: &Tensor,
        actions: &Tensor,
    ) -> Evaluation {
        let (dist, values, hidden) = self.forward(observations, hidden, masks);
        Evaluation {
            values,
            action_log_probs: dist.log_probs(actions),
            dist_entropy: dist.entropy().mean(Kind::Float),
            hidden,
        }
    }
}
