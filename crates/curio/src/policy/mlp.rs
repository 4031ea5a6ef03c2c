//! Multi-layer perceptron actor-critic.

use super::{ActOutput, ActorCritic, Categorical, Evaluation, HasVarStore};
use serde::{Deserialize, Serialize};
use tch::{nn, nn::Module, Device, Kind, Tensor};

/// Configuration for MLP policy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MlpConfig {
    /// Hidden layer size
    pub hidden_size: i64,
    /// Number of hidden layers
    pub num_layers: usize,
    /// Activation function
    pub activation: Activation,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    ReLU,
    Tanh,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_size: 64,
            num_layers: 2,
            activation: Activation::Tanh,
        }
    }
}

/// Build `num_layers` linear layers with activations under `path`, named
/// `{prefix}_{i}`.
pub(crate) fn mlp_encoder(
    path: &nn::Path,
    prefix: &str,
    in_size: i64,
    config: &MlpConfig,
) -> nn::Sequential {
    let mut encoder = nn::seq();
    let mut in_size = in_size;

    for i in 0..config.num_layers {
        let layer = nn::linear(
            path / format!("{}_{}", prefix, i),
            in_size,
            config.hidden_size,
            Default::default(),
        );
        encoder = encoder.add(layer);

        match config.activation {
            Activation::ReLU => encoder = encoder.add_fn(|x| x.relu()),
            Activation::Tanh => encoder = encoder.add_fn(|x| x.tanh()),
        }

        in_size = config.hidden_size;
    }

    encoder
}

/// Feed-forward actor-critic with a shared encoder
pub struct MlpPolicy {
    /// Variable store for parameters
    vs: nn::VarStore,
    /// Encoder network
    encoder: nn::Sequential,
    /// Actor head (action logits)
    actor: nn::Linear,
    /// Critic head (value estimate)
    critic: nn::Linear,
    num_actions: i64,
    device: Device,
}

impl MlpPolicy {
    /// Create a new MLP policy
    pub fn new(obs_size: i64, num_actions: i64, config: MlpConfig, device: Device) -> Self {
        let vs = nn::VarStore::new(device);
        let root = vs.root();

        let encoder = mlp_encoder(&root, "encoder", obs_size, &config);
        let last = if config.num_layers == 0 {
            obs_size
        } else {
            config.hidden_size
        };
        let actor = nn::linear(&root / "actor", last, num_actions, Default::default());
        let critic = nn::linear(&root / "critic", last, 1, Default::default());

        Self::init_weights(&vs);

        Self {
            vs,
            encoder,
            actor,
            critic,
            num_actions,
            device,
        }
    }

    /// Small random weights, zero biases
    fn init_weights(vs: &nn::VarStore) {
        for (name, mut var) in vs.variables() {
            if name.contains("weight") {
                tch::no_grad(|| {
                    var.copy_(&(Tensor::randn_like(&var) * 0.01));
                });
            } else if name.contains("bias") {
                tch::no_grad(|| {
                    let _ = var.zero_();
                });
            }
        }
    }

    pub fn num_actions(&self) -> i64 {
        self.num_actions
    }

    /// Get the number of parameters
    pub fn num_parameters(&self) -> i64 {
        self.vs.variables().values().map(|v| v.numel() as i64).sum()
    }

    fn forward(&self, observations: &Tensor) -> (Categorical, Tensor) {
        let obs = observations.to_device(self.device).to_kind(Kind::Float);
        let hidden = self.encoder.forward(&obs);
        let logits = self.actor.forward(&hidden);
        let value = self.critic.forward(&hidden);
        (Categorical::new(logits), value)
    }
}

impl HasVarStore for MlpPolicy {
    fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }

    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }
}

impl ActorCritic for MlpPolicy {
    fn act(
        &self,
        observations: &Tensor,
        hidden: &Tensor,
        _masks: &Tensor,
        deterministic: bool,
    ) -> ActOutput {
        let (dist, value) = self.forward(observations);
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
            hidden: hidden.shallow_clone(),
        }
    }

    fn get_value(&self, observations: &Tensor, _hidden: &Tensor, _masks: &Tensor) -> Tensor {
        self.forward(observations).1
    }

    fn evaluate_actions(
        &self,
        observations: &Tensor,
        hidden: &Tensor,
        _masks: &Tensor,
        actions: &Tensor,
    ) -> Evaluation {
        let (dist, values) = self.forward(observations);
        Evaluation {
            values,
            action_log_probs: dist.log_probs(actions),
            dist_entropy: dist.entropy().mean(Kind::Float),
            hidden: hidden.shallow_clone(),
        }
    }
}
