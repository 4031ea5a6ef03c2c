//! Main training loop: collect a rollout, compute returns, run a PPO update.

use super::auxiliary::{AuxiliaryObjective, NoAuxiliary};
use super::buffer::RolloutStorage;
use super::config::TrainerConfig;
use super::optimizer::{linear_decay, update_linear_schedule};
use super::update::{Ppo, UpdateStats};
use crate::curiosity::RewardMixer;
use crate::log::{MetricLogger, Metrics, NoOpLogger};
use crate::policy::ActorCritic;
use crate::utils::{abbreviate, format_duration};
use crate::vector::{observations_to_tensor, VecEnv};
use crate::{CurioError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tch::{Device, Kind, Tensor};
use tracing::{debug, info, warn};

/// Completed episodes (and per-step reward means) kept for statistics
const WINDOW: usize = 10;

/// Episodes collected per evaluation
const EVAL_EPISODES: usize = 10;

/// Step limit for one evaluation
const EVAL_MAX_STEPS: usize = 100_000;

/// Fixed-size window over the most recent values
#[derive(Clone, Debug)]
pub struct RecentWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RecentWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// Middle value; the average of the two middle values for even lengths
    pub fn median(&self) -> Option<f64> {
        let mut sorted: Vec<f64> = self.values.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        match n {
            0 => None,
            _ if n % 2 == 1 => Some(sorted[n / 2]),
            _ => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
        }
    }

    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }
}

#[derive(Serialize, Deserialize)]
struct CheckpointMetadata {
    update: usize,
    global_step: u64,
    mean_reward: Option<f64>,
    config: TrainerConfig,
}

type EvalEnvFactory<V> = Box<dyn FnMut() -> V>;

/// Rollout/update loop for an actor-critic trained with [`Ppo`]
pub struct Trainer<P: ActorCritic, V: VecEnv, A: AuxiliaryObjective = NoAuxiliary> {
    config: TrainerConfig,
    vecenv: V,
    policy: P,
    ppo: Ppo<A>,
    rollouts: RolloutStorage,
    mixer: RewardMixer,
    logger: Box<dyn MetricLogger>,
    eval_envs: Option<EvalEnvFactory<V>>,
    /// Returns of the most recent completed episodes
    episode_rewards: RecentWindow,
    /// Per-step means of the intrinsic bonus across environments
    intrinsic_rewards: RecentWindow,
    /// Per-step means of the environment reward across environments
    extrinsic_rewards: RecentWindow,
    /// Updates completed
    update: usize,
    global_step: u64,
    start_time: Instant,
    progress: Option<ProgressBar>,
    last_stats: Option<UpdateStats>,
}

impl<P: ActorCritic, V: VecEnv, A: AuxiliaryObjective> Trainer<P, V, A> {
    /// Create a trainer and reset the environments with the configured seed
    pub fn new(mut vecenv: V, policy: P, ppo: Ppo<A>, config: TrainerConfig) -> Result<Self> {
        config.validate()?;
        if vecenv.num_envs() != config.num_processes {
            return Err(CurioError::InvalidConfig(format!(
                "vector environment has {} environments, config expects {}",
                vecenv.num_envs(),
                config.num_processes
            )));
        }

        let mut rollouts = RolloutStorage::new(
            config.num_steps,
            config.num_processes,
            vecenv.observation_size() as i64,
            policy.recurrent_hidden_state_size(),
            config.device,
        );
        let obs = vecenv.reset(Some(config.seed))?;
        rollouts.set_initial_observations(&observations_to_tensor(&obs, config.device))?;

        let mixer = config.curiosity.mixer();

        Ok(Self {
            vecenv,
            policy,
            ppo,
            rollouts,
            mixer,
            logger: Box::new(NoOpLogger),
            eval_envs: None,
            episode_rewards: RecentWindow::new(WINDOW),
            intrinsic_rewards: RecentWindow::new(WINDOW),
            extrinsic_rewards: RecentWindow::new(WINDOW),
            update: 0,
            global_step: 0,
            start_time: Instant::now(),
            progress: None,
            last_stats: None,
            config,
        })
    }

    /// Send metrics to `logger`
    pub fn with_logger(mut self, logger: Box<dyn MetricLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Enable periodic evaluation on environments built by `factory`
    pub fn with_eval_envs<F>(mut self, factory: F) -> Self
    where
        F: FnMut() -> V + 'static,
    {
        self.eval_envs = Some(Box::new(factory));
        self
    }

    /// Show a progress bar over the total number of environment steps
    pub fn with_progress(mut self) -> Self {
        let total = self.config.num_updates() as u64 * self.config.batch_size() as u64;
        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        self.progress = Some(pb);
        self
    }

    /// Run every remaining update
    pub fn train(&mut self) -> Result<()> {
        let num_updates = self.config.num_updates();
        info!(
            num_updates,
            batch_size = self.config.batch_size(),
            curiosity = self.config.curiosity.enabled,
            "Starting training"
        );

        while self.update < num_updates {
            self.train_update(num_updates)?;
        }

        if let Some(ref pb) = self.progress {
            pb.finish_with_message("Training complete");
        }
        self.logger.close();
        Ok(())
    }

    /// One collect/update cycle, followed by logging, checkpointing and
    /// evaluation when their intervals come up
    pub fn train_update(&mut self, num_updates: usize) -> Result<UpdateStats> {
        let j = self.update;

        if self.config.use_linear_lr_decay {
            update_linear_schedule(self.ppo.optimizer_mut(), j, num_updates, self.config.lr);
            self.ppo
                .set_clip_param(linear_decay(self.config.clip_param, j, num_updates));
        }

        self.collect_rollout()?;

        let last = self.config.num_steps as i64;
        let next_value = tch::no_grad(|| {
            self.policy.get_value(
                &self.rollouts.obs.get(last),
                &self.rollouts.recurrent_hidden_states.get(last),
                &self.rollouts.masks.get(last),
            )
        });
        self.rollouts.compute_returns(
            &next_value.to_device(self.config.device),
            self.config.use_gae,
            self.config.gamma,
            self.config.gae_lambda,
        )?;

        let stats = self.ppo.update(&self.policy, &self.rollouts)?;
        self.rollouts.after_update();
        self.update += 1;
        self.last_stats = Some(stats);

        if !self.config.save_dir.is_empty()
            && (j % self.config.save_interval == 0 || j + 1 == num_updates)
        {
            let dir = PathBuf::from(&self.config.save_dir);
            self.save_checkpoint(&dir)?;
        }

        if j % self.config.log_interval == 0 && self.episode_rewards.len() > 1 {
            self.log_update(j, &stats);
        }

        if let Some(interval) = self.config.eval_interval {
            if j % interval == 0 && self.episode_rewards.len() > 1 {
                self.evaluate()?;
            }
        }

        if let Some(ref pb) = self.progress {
            pb.set_position(self.global_step);
            pb.set_message(format!(
                "Loss: {:.4} Reward: {:.2}",
                stats.value_loss,
                self.episode_rewards.mean().unwrap_or(0.0)
            ));
        }

        Ok(stats)
    }

    /// Fill the rollout storage with `num_steps` steps of every environment
    fn collect_rollout(&mut self) -> Result<()> {
        let device = self.config.device;

        for step in 0..self.config.num_steps as i64 {
            let prev_obs = self.rollouts.obs.get(step);
            let out = tch::no_grad(|| {
                self.policy.act(
                    &prev_obs,
                    &self.rollouts.recurrent_hidden_states.get(step),
                    &self.rollouts.masks.get(step),
                    false,
                )
            });

            let actions = Vec::<i64>::try_from(&out.action.flatten(0, -1).to_device(Device::Cpu))?;
            let result = self.vecenv.step(&actions)?;
            for episode_return in result.episode_returns() {
                self.episode_rewards.push(episode_return as f64);
            }

            let obs = observations_to_tensor(&result.observations, device);
            let masks = result.masks(device);
            let extrinsic = result.rewards_tensor(device);
            let actions = out.action.to_device(device);

            let reward = match self
                .ppo
                .objective()
                .intrinsic_reward(&prev_obs, &actions, &obs)?
            {
                Some(intrinsic) => {
                    self.intrinsic_rewards
                        .push(intrinsic.mean(Kind::Float).double_value(&[]));
                    self.extrinsic_rewards
                        .push(extrinsic.mean(Kind::Float).double_value(&[]));
                    self.mixer.mix(&extrinsic, &intrinsic.to_device(device))
                }
                None => extrinsic,
            };

            self.rollouts.insert(
                &obs,
                &out.hidden.to_device(device),
                &actions,
                &out.action_log_prob.to_device(device),
                &out.value.to_device(device),
                &reward,
                &masks,
                &prev_obs,
            )?;
            self.global_step += self.config.num_processes as u64;
        }

        debug!(global_step = self.global_step, "Rollout collected");
        Ok(())
    }

    fn log_update(&self, j: usize, stats: &UpdateStats) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let sps = self.global_step as f64 / elapsed.max(1e-9);

        let mut metrics = Metrics::new();
        let window = &self.episode_rewards;
        for (name, value) in [
            ("mean_reward", window.mean()),
            ("median_reward", window.median()),
            ("min_reward", window.min()),
            ("max_reward", window.max()),
            ("mean_intrinsic_reward", self.intrinsic_rewards.mean()),
            ("mean_extrinsic_reward", self.extrinsic_rewards.mean()),
        ] {
            if let Some(value) = value {
                metrics.insert(name.to_string(), value);
            }
        }
        metrics.insert("dist_entropy".into(), stats.dist_entropy);
        metrics.insert("value_loss".into(), stats.value_loss);
        metrics.insert("action_loss".into(), stats.action_loss);
        if let Some(inverse) = stats.inverse_loss {
            metrics.insert("inverse_loss".into(), inverse);
        }
        if let Some(forward) = stats.forward_loss {
            metrics.insert("forward_loss".into(), forward);
        }
        self.logger.log_metrics(&metrics, self.global_step);

        info!(
            update = j,
            steps = %abbreviate(self.global_step),
            sps = sps as u64,
            elapsed = %format_duration(elapsed),
            episodes = window.len(),
            mean_reward = window.mean().unwrap_or(0.0),
            median_reward = window.median().unwrap_or(0.0),
            min_reward = window.min().unwrap_or(0.0),
            max_reward = window.max().unwrap_or(0.0),
            dist_entropy = stats.dist_entropy,
            value_loss = stats.value_loss,
            action_loss = stats.action_loss,
            "Training progress"
        );
    }

    /// Run the deterministic policy on fresh evaluation environments until
    /// 10 episodes finish. Returns the mean episode return, or `None` when no
    /// evaluation environments were configured.
    pub fn evaluate(&mut self) -> Result<Option<f64>> {
        let mut envs = match self.eval_envs.as_mut() {
            Some(factory) => factory(),
            None => return Ok(None),
        };
        let device = self.config.device;
        let n = envs.num_envs() as i64;
        let opts = (Kind::Float, device);

        let seed = self.config.seed + self.config.num_processes as u64;
        let mut obs = observations_to_tensor(&envs.reset(Some(seed))?, device);
        let mut hidden = Tensor::zeros([n, self.policy.recurrent_hidden_state_size()], opts);
        let mut masks = Tensor::zeros([n, 1], opts);
        let mut returns: Vec<f64> = Vec::with_capacity(EVAL_EPISODES);

        let mut steps = 0;
        while returns.len() < EVAL_EPISODES {
            if steps == EVAL_MAX_STEPS {
                warn!(
                    episodes = returns.len(),
                    steps, "Evaluation step limit reached"
                );
                break;
            }
            let out = tch::no_grad(|| self.policy.act(&obs, &hidden, &masks, true));
            let actions = Vec::<i64>::try_from(&out.action.flatten(0, -1).to_device(Device::Cpu))?;
            let result = envs.step(&actions)?;
            returns.extend(result.episode_returns().map(f64::from));

            obs = observations_to_tensor(&result.observations, device);
            masks = result.masks(device);
            hidden = out.hidden;
            steps += 1;
        }
        envs.close();

        if returns.is_empty() {
            return Ok(None);
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        info!(episodes = returns.len(), mean_reward = mean, "Evaluation");
        self.logger.log_scalar("eval_mean_reward", mean, self.global_step);
        Ok(Some(mean))
    }

    /// Save the policy variables (including any curiosity networks) and a
    /// JSON metadata file into `dir`
    pub fn save_checkpoint(&self, dir: &Path) -> Result<PathBuf> {
        let start_time = Instant::now();
        std::fs::create_dir_all(dir)?;

        let base_name = format!("checkpoint_{:06}", self.update);
        let pt_path = dir.join(format!("{}.pt", base_name));
        let meta_path = dir.join(format!("{}.json", base_name));

        self.policy
            .var_store()
            .save(&pt_path)
            .map_err(|e| CurioError::Checkpoint(format!("saving {}: {}", pt_path.display(), e)))?;

        let metadata = CheckpointMetadata {
            update: self.update,
            global_step: self.global_step,
            mean_reward: self.episode_rewards.mean(),
            config: self.config.clone(),
        };
        let file = std::fs::File::create(&meta_path)?;
        serde_json::to_writer_pretty(file, &metadata)?;

        info!(path = %pt_path.display(), elapsed = ?start_time.elapsed(), "Checkpoint saved");
        Ok(pt_path)
    }

    /// Restore policy variables from `path` and, when the matching metadata
    /// file exists, the update and step counters
    pub fn load_checkpoint(&mut self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "Loading checkpoint");
        self.policy
            .var_store_mut()
            .load(path)
            .map_err(|e| CurioError::Checkpoint(format!("loading {}: {}", path.display(), e)))?;

        let meta_path = path.with_extension("json");
        if meta_path.exists() {
            let file = std::fs::File::open(&meta_path)?;
            let metadata: CheckpointMetadata = serde_json::from_reader(file)?;
            self.update = metadata.update;
            self.global_step = metadata.global_step;
            info!(
                update = self.update,
                step = self.global_step,
                "Metadata restored"
            );
        } else {
            warn!(path = %meta_path.display(), "No checkpoint metadata found");
        }
        Ok(())
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn ppo(&self) -> &Ppo<A> {
        &self.ppo
    }

    pub fn rollouts(&self) -> &RolloutStorage {
        &self.rollouts
    }

    /// Updates completed so far
    pub fn update_count(&self) -> usize {
        self.update
    }

    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    pub fn episode_rewards(&self) -> &RecentWindow {
        &self.episode_rewards
    }

    pub fn intrinsic_rewards(&self) -> &RecentWindow {
        &self.intrinsic_rewards
    }

    pub fn last_stats(&self) -> Option<&UpdateStats> {
        self.last_stats.as_ref()
    }

    /// Samples per second since the trainer was created
    pub fn sps(&self) -> f64 {
        self.global_step as f64 / self.start_time.elapsed().as_secs_f64()
    }

    /// Consume the trainer, returning the policy
    pub fn into_policy(mut self) -> P {
        self.vecenv.close();
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curiosity::{Curiosity, CuriosityConfig};
    use crate::env::{Env, EnvInfo, StepResult};
    use crate::log::MemoryLogger;
    use crate::policy::{HasVarStore, MlpConfig, MlpPolicy};
    use crate::vector::Serial;
    use ndarray::Array1;
    use std::sync::Arc;

    /// Reward 1 per step, episodes last 3 steps
    struct Countdown {
        t: usize,
    }

    impl Env for Countdown {
        fn observation_size(&self) -> usize {
            3
        }

        fn num_actions(&self) -> usize {
            2
        }

        fn reset(&mut self, _seed: Option<u64>) -> Array1<f32> {
            self.t = 0;
            Array1::from_vec(vec![1.0, 0.0, 0.0])
        }

        fn step(&mut self, _action: usize) -> StepResult {
            self.t += 1;
            let mut observation = Array1::zeros(3);
            observation[self.t % 3] = 1.0;
            StepResult {
                observation,
                reward: 1.0,
                terminated: self.t >= 3,
                truncated: false,
                info: EnvInfo::new(),
            }
        }
    }

    fn envs() -> Serial<Countdown> {
        Serial::new(|| Countdown { t: 0 }, 2)
    }

    fn config(save_dir: &Path) -> TrainerConfig {
        TrainerConfig {
            log_interval: 1,
            save_interval: 10,
            ..TrainerConfig::default()
        }
        .with_rollout(2, 4)
        .with_ppo_schedule(1, 2)
        .with_num_env_steps(16)
        .with_save_dir(save_dir.to_string_lossy())
    }

    fn mlp_policy() -> MlpPolicy {
        tch::manual_seed(0);
        MlpPolicy::new(3, 2, MlpConfig::default(), Device::Cpu)
    }

    #[test]
    fn test_window_statistics() {
        let mut window = RecentWindow::new(3);
        assert!(window.median().is_none());
        for value in [5.0, 1.0, 3.0, 2.0] {
            window.push(value);
        }
        // 5.0 has been evicted
        assert_eq!(window.len(), 3);
        assert_eq!(window.mean(), Some(2.0));
        assert_eq!(window.median(), Some(2.0));
        assert_eq!(window.min(), Some(1.0));
        assert_eq!(window.max(), Some(3.0));

        let mut even = RecentWindow::new(4);
        for value in [4.0, 1.0, 2.0, 3.0] {
            even.push(value);
        }
        assert_eq!(even.median(), Some(2.5));
    }

    #[test]
    fn test_train_logs_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let policy = mlp_policy();
        let ppo = Ppo::new(&policy, config.ppo()).unwrap();
        let logger = Arc::new(MemoryLogger::new());

        let mut trainer = Trainer::new(envs(), policy, ppo, config)
            .unwrap()
            .with_logger(Box::new(logger.clone()));
        trainer.train().unwrap();

        assert_eq!(trainer.update_count(), 2);
        assert_eq!(trainer.global_step(), 16);
        // Every episode lasts 3 steps with reward 1
        assert_eq!(logger.last("mean_reward"), Some(3.0));
        assert_eq!(logger.last("min_reward"), Some(3.0));
        assert!(logger.last("value_loss").unwrap().is_finite());
        assert!(logger.last("mean_intrinsic_reward").is_none());

        // Saved on the first and on the last update
        assert!(dir.path().join("checkpoint_000001.pt").exists());
        assert!(dir.path().join("checkpoint_000002.json").exists());
    }

    #[test]
    fn test_load_checkpoint_restores_counters() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let policy = mlp_policy();
        let ppo = Ppo::new(&policy, config.ppo()).unwrap();
        let mut trainer = Trainer::new(envs(), policy, ppo, config.clone()).unwrap();
        trainer.train().unwrap();
        let saved = trainer.save_checkpoint(dir.path()).unwrap();

        let policy = mlp_policy();
        let ppo = Ppo::new(&policy, config.ppo()).unwrap();
        let mut restored = Trainer::new(envs(), policy, ppo, config).unwrap();
        restored.load_checkpoint(&saved).unwrap();
        assert_eq!(restored.update_count(), 2);
        assert_eq!(restored.global_step(), 16);

        let a = trainer.policy().var_store().variables();
        let b = restored.policy().var_store().variables();
        for (name, value) in &a {
            assert!(value.allclose(&b[name], 0.0, 0.0, false), "{}", name);
        }
    }

    #[test]
    fn test_curiosity_rewards_are_tracked() {
        let config = config(Path::new(""))
            .with_save_dir("")
            .with_curiosity(CuriosityConfig {
                enabled: true,
                ..CuriosityConfig::default()
            });
        let policy = mlp_policy();
        let curiosity = Curiosity::mlp(&policy.var_store().root(), 3, 2, &config.curiosity);
        let ppo = Ppo::with_objective(&policy, config.ppo(), curiosity).unwrap();
        let logger = Arc::new(MemoryLogger::new());

        let mut trainer = Trainer::new(envs(), policy, ppo, config)
            .unwrap()
            .with_logger(Box::new(logger.clone()));
        trainer.train().unwrap();

        // 8 collection steps, all within the window
        assert_eq!(trainer.intrinsic_rewards().len(), 8);
        assert!(logger.last("mean_intrinsic_reward").unwrap() >= 0.0);
        assert_eq!(logger.last("mean_extrinsic_reward"), Some(1.0));
        assert!(trainer.last_stats().unwrap().inverse_loss.is_some());
    }

    #[test]
    fn test_reward_weights_follow_config_when_flag_is_off() {
        // The objective decides whether intrinsic rewards exist, not the flag
        let config = config(Path::new(""))
            .with_save_dir("")
            .with_curiosity(CuriosityConfig {
                enabled: false,
                intrinsic_reward_scale: 0.0,
                extrinsic_weight: 0.0,
                ..CuriosityConfig::default()
            });
        let policy = mlp_policy();
        let curiosity = Curiosity::mlp(&policy.var_store().root(), 3, 2, &config.curiosity);
        let ppo = Ppo::with_objective(&policy, config.ppo(), curiosity).unwrap();

        let mut trainer = Trainer::new(envs(), policy, ppo, config).unwrap();
        trainer.train_update(1).unwrap();

        // Environment rewards are all 1, but their weight is 0
        let stored = trainer.rollouts().rewards.abs().sum(Kind::Float).double_value(&[]);
        assert_eq!(stored, 0.0);
        assert_eq!(trainer.extrinsic_rewards.mean(), Some(1.0));
    }

    #[test]
    fn test_evaluate() {
        let config = config(Path::new("")).with_save_dir("");
        let policy = mlp_policy();
        let ppo = Ppo::new(&policy, config.ppo()).unwrap();
        let mut trainer = Trainer::new(envs(), policy, ppo, config).unwrap();
        assert_eq!(trainer.evaluate().unwrap(), None);

        let mut trainer = trainer.with_eval_envs(envs);
        assert_eq!(trainer.evaluate().unwrap(), Some(3.0));
    }

    #[test]
    fn test_env_count_must_match() {
        let config = config(Path::new("")).with_rollout(4, 4);
        let policy = mlp_policy();
        let ppo = Ppo::new(&policy, config.ppo()).unwrap();
        assert!(matches!(
            Trainer::new(envs(), policy, ppo, config),
            Err(CurioError::InvalidConfig(_))
        ));
    }
}
