//! Rollout collection shared by the integration tests.

use curio::prelude::*;
use curio::vector::observations_to_tensor;
use tch::{Device, Kind};

/// Fill `storage` with one rollout from `envs`, adding any intrinsic reward
/// the objective produces. Returns the environment rewards seen.
pub fn collect<P, V, A>(
    envs: &mut V,
    policy: &P,
    storage: &mut RolloutStorage,
    objective: &A,
) -> anyhow::Result<Vec<f32>>
where
    P: ActorCritic,
    V: VecEnv,
    A: AuxiliaryObjective,
{
    let mut rewards = Vec::new();
    for step in 0..storage.num_steps() as i64 {
        let prev_obs = storage.obs.get(step);
        let out = tch::no_grad(|| {
            policy.act(
                &prev_obs,
                &storage.recurrent_hidden_states.get(step),
                &storage.masks.get(step),
                false,
            )
        });
        let actions = Vec::<i64>::try_from(&out.action.flatten(0, -1))?;
        let result = envs.step(&actions)?;
        rewards.extend_from_slice(&result.rewards);

        let obs = observations_to_tensor(&result.observations, Device::Cpu);
        let mut reward = result.rewards_tensor(Device::Cpu);
        if let Some(intrinsic) = objective.intrinsic_reward(&prev_obs, &out.action, &obs)? {
            reward = reward + intrinsic;
        }
        storage.insert(
            &obs,
            &out.hidden,
            &out.action,
            &out.action_log_prob,
            &out.value,
            &reward,
            &result.masks(Device::Cpu),
            &prev_obs,
        )?;
    }

    let last = storage.num_steps() as i64;
    let next_value = tch::no_grad(|| {
        policy.get_value(
            &storage.obs.get(last),
            &storage.recurrent_hidden_states.get(last),
            &storage.masks.get(last),
        )
    });
    storage.compute_returns(&next_value, true, 0.99, 0.95)?;
    Ok(rewards)
}

/// Copy of every variable whose name starts with `prefix`
pub fn snapshot(vs: &tch::nn::VarStore, prefix: &str) -> Vec<(String, tch::Tensor)> {
    let mut vars: Vec<(String, tch::Tensor)> = vs
        .variables()
        .into_iter()
        .filter(|(name, _)| name.starts_with(prefix))
        .map(|(name, var)| (name, var.detach().copy()))
        .collect();
    vars.sort_by(|a, b| a.0.cmp(&b.0));
    vars
}

/// Largest absolute change between two snapshots
pub fn max_change(before: &[(String, tch::Tensor)], after: &[(String, tch::Tensor)]) -> f64 {
    before
        .iter()
        .zip(after)
        .map(|((_, a), (_, b))| (a - b).abs().max().to_kind(Kind::Double).double_value(&[]))
        .fold(0.0, f64::max)
}
