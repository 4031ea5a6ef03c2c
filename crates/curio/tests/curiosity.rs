mod common;

use common::{collect, max_change, snapshot};
use curio::prelude::*;
use curio::utils::set_seed;
use curio::vector::observations_to_tensor;
use curio_envs::Corridor;
use tch::Device;

fn setup(
    config: &CuriosityConfig,
) -> anyhow::Result<(Serial<Corridor>, MlpPolicy, Curiosity, RolloutStorage)> {
    set_seed(7);
    let mut envs = Serial::new(|| Corridor::new(6), 4);
    let policy = MlpPolicy::new(6, 3, MlpConfig::default(), Device::Cpu);
    let curiosity = Curiosity::mlp(&policy.var_store().root(), 6, 3, config);

    let mut storage = RolloutStorage::new(12, 4, 6, 1, Device::Cpu);
    let obs = envs.reset(Some(7))?;
    storage.set_initial_observations(&observations_to_tensor(&obs, Device::Cpu))?;
    Ok((envs, policy, curiosity, storage))
}

#[test]
fn test_single_optimizer_trains_curiosity_networks() -> anyhow::Result<()> {
    let config = CuriosityConfig {
        enabled: true,
        ..CuriosityConfig::default()
    };
    let (mut envs, policy, curiosity, mut storage) = setup(&config)?;
    let mut ppo: CuriosityPpo = Ppo::with_objective(
        &policy,
        PpoConfig {
            num_mini_batch: 2,
            ..PpoConfig::default()
        },
        curiosity,
    )?;

    collect(&mut envs, &policy, &mut storage, ppo.objective())?;
    let policy_before = snapshot(policy.var_store(), "actor");
    let curiosity_before = snapshot(policy.var_store(), "curiosity");
    assert_eq!(curiosity_before.len(), 12);

    let stats = ppo.update(&policy, &storage)?;

    assert!(max_change(&policy_before, &snapshot(policy.var_store(), "actor")) > 0.0);
    assert!(max_change(&curiosity_before, &snapshot(policy.var_store(), "curiosity")) > 0.0);
    let inverse = stats.inverse_loss.expect("inverse loss reported");
    let forward = stats.forward_loss.expect("forward loss reported");
    // Summed cross-entropy over a minibatch of 24 with 3 actions
    assert!(inverse > 0.0 && inverse < 24.0 * 5.0);
    assert!(forward >= 0.0);
    Ok(())
}

#[test]
fn test_intrinsic_reward_rewards_surprise() -> anyhow::Result<()> {
    let config = CuriosityConfig {
        enabled: true,
        intrinsic_reward_scale: 2.0,
        ..CuriosityConfig::default()
    };
    let (_, _policy, curiosity, _) = setup(&config)?;

    let prev = tch::Tensor::eye(6, (tch::Kind::Float, Device::Cpu)).narrow(0, 0, 4);
    let next = tch::Tensor::eye(6, (tch::Kind::Float, Device::Cpu)).narrow(0, 1, 4);
    let actions = tch::Tensor::from_slice(&[1i64, 1, 1, 1]).reshape([4, 1]);

    let reward = curiosity
        .intrinsic_reward(&prev, &actions, &next)?
        .expect("curiosity produces a reward");
    assert_eq!(reward.size(), [4, 1]);
    assert!(!reward.requires_grad());
    let min = reward.min().double_value(&[]);
    assert!(min >= 0.0);

    // Same transition, same reward
    let again = curiosity
        .intrinsic_reward(&prev, &actions, &next)?
        .expect("curiosity produces a reward");
    assert!(reward.allclose(&again, 1e-6, 1e-6, false));
    Ok(())
}

#[test]
fn test_out_of_range_action_is_rejected() -> anyhow::Result<()> {
    let (_, _policy, curiosity, _) = setup(&CuriosityConfig::default())?;
    let obs = tch::Tensor::zeros([2, 6], (tch::Kind::Float, Device::Cpu));
    let actions = tch::Tensor::from_slice(&[0i64, 3]).reshape([2, 1]);

    let result = curiosity.intrinsic_reward(&obs, &actions, &obs);
    assert!(matches!(result, Err(CurioError::InvalidAction { action: 3, .. })));
    Ok(())
}
