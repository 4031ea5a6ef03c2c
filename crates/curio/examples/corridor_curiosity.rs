//! Train on the sparse-reward corridor with and without curiosity and print
//! the mean evaluation return of each run.

use curio::prelude::*;
use curio_envs::Corridor;
use tch::Device;

const LENGTH: usize = 12;

fn config(curiosity: bool) -> TrainerConfig {
    TrainerConfig::default()
        .with_rollout(8, 64)
        .with_num_env_steps(200_000)
        .with_save_dir("")
        .with_curiosity(CuriosityConfig {
            enabled: curiosity,
            ..CuriosityConfig::default()
        })
}

fn envs() -> Serial<Corridor> {
    Serial::new(|| Corridor::new(LENGTH), 8)
}

fn run(curiosity: bool) -> Result<Option<f64>> {
    let config = config(curiosity);
    curio::utils::set_seed(config.seed);
    let obs_size = LENGTH as i64;
    let policy = MlpPolicy::new(obs_size, 3, MlpConfig::default(), Device::Cpu);

    if curiosity {
        let icm = Curiosity::mlp(&policy.var_store().root(), obs_size, 3, &config.curiosity);
        let ppo = Ppo::with_objective(&policy, config.ppo(), icm)?;
        let mut trainer = Trainer::new(envs(), policy, ppo, config)?.with_eval_envs(envs);
        trainer.train()?;
        trainer.evaluate()
    } else {
        let ppo = Ppo::new(&policy, config.ppo())?;
        let mut trainer = Trainer::new(envs(), policy, ppo, config)?.with_eval_envs(envs);
        trainer.train()?;
        trainer.evaluate()
    }
}

fn main() -> Result<()> {
    for curiosity in [false, true] {
        println!("--- Training (curiosity: {}) ---", curiosity);
        match run(curiosity)? {
            Some(mean) => println!("Mean evaluation return: {:.3}", mean),
            None => println!("No evaluation episodes finished"),
        }
    }
    Ok(())
}
