//! curio CLI
//!
//! Command-line interface for training PPO agents, with or without
//! curiosity-driven exploration.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use curio::curiosity::Curiosity;
use curio::log::{CompositeLogger, ConsoleLogger, MetricLogger};
use curio::policy::{ActorCritic, GruPolicy, HasVarStore, MlpConfig, MlpPolicy};
use curio::training::{AuxiliaryObjective, Ppo, Trainer, TrainerConfig};
use curio::vector::{Serial, VecEnv};
use curio_envs::{BoxedEnv, ENV_NAMES};

#[derive(Parser)]
#[command(name = "curio")]
#[command(version, about = "curio - PPO with curiosity-driven exploration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train an agent
    Train(TrainArgs),

    /// List available environments
    List,

    /// Print the default training configuration as JSON
    Config,
}

/// Every option overrides the matching field of `--config` (or the defaults)
#[derive(Args)]
struct TrainArgs {
    /// Environment name
    #[arg(default_value = "cartpole")]
    env: String,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Learning rate
    #[arg(long)]
    lr: Option<f64>,

    /// Adam epsilon
    #[arg(long)]
    eps: Option<f64>,

    /// Discount factor for rewards
    #[arg(long)]
    gamma: Option<f64>,

    /// Use generalized advantage estimation
    #[arg(long)]
    use_gae: bool,

    /// GAE lambda
    #[arg(long)]
    gae_lambda: Option<f64>,

    /// Entropy term coefficient
    #[arg(long)]
    entropy_coef: Option<f64>,

    /// Value loss coefficient
    #[arg(long)]
    value_loss_coef: Option<f64>,

    /// Max norm of gradients
    #[arg(long)]
    max_grad_norm: Option<f64>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Number of parallel environments
    #[arg(long)]
    num_processes: Option<usize>,

    /// Environment steps per rollout
    #[arg(long)]
    num_steps: Option<usize>,

    /// Number of PPO epochs
    #[arg(long)]
    ppo_epoch: Option<usize>,

    /// Number of minibatches per epoch
    #[arg(long)]
    num_mini_batch: Option<usize>,

    /// PPO clip parameter
    #[arg(long)]
    clip_param: Option<f64>,

    /// Train the value head without clipping
    #[arg(long)]
    no_clipped_value_loss: bool,

    /// Number of environment steps to train
    #[arg(long)]
    num_env_steps: Option<u64>,

    /// Updates between log lines
    #[arg(long)]
    log_interval: Option<usize>,

    /// Updates between checkpoints
    #[arg(long)]
    save_interval: Option<usize>,

    /// Updates between evaluations
    #[arg(long)]
    eval_interval: Option<usize>,

    /// Checkpoint directory (empty to disable)
    #[arg(long)]
    save_dir: Option<String>,

    /// Decay the learning rate linearly
    #[arg(long)]
    use_linear_lr_decay: bool,

    /// Use a recurrent (GRU) policy
    #[arg(long)]
    recurrent_policy: bool,

    /// Hidden layer size
    #[arg(long)]
    hidden_size: Option<i64>,

    /// Enable the Intrinsic Curiosity Module
    #[arg(long)]
    curiosity: bool,

    /// Curiosity feature size
    #[arg(long)]
    feature_size: Option<i64>,

    /// Intrinsic reward scale factor
    #[arg(long)]
    irsf: Option<f64>,

    /// Extrinsic reward weight
    #[arg(long)]
    erw: Option<f64>,

    /// Intrinsic reward weight
    #[arg(long)]
    irw: Option<f64>,

    /// Weight of the policy objective in the curiosity blend
    #[arg(long)]
    lam_pol: Option<f64>,

    /// Share of the forward loss in the curiosity loss
    #[arg(long)]
    forward_loss_weight: Option<f64>,

    /// Train on CUDA when available
    #[arg(long)]
    cuda: bool,

    /// Write TensorBoard event files to this directory
    #[cfg(feature = "tensorboard")]
    #[arg(long)]
    tensorboard: Option<PathBuf>,
}

impl TrainArgs {
    fn to_config(&self) -> Result<TrainerConfig> {
        let mut config = match &self.config {
            Some(path) => TrainerConfig::from_json_file(path)
                .with_context(|| format!("reading {}", path.display()))?,
            None => TrainerConfig::default(),
        };

        macro_rules! apply {
            ($($field:ident => $target:expr),* $(,)?) => {
                $(if let Some(value) = self.$field.clone() {
                    $target = value;
                })*
            };
        }
        apply! {
            lr => config.lr,
            eps => config.eps,
            gamma => config.gamma,
            gae_lambda => config.gae_lambda,
            entropy_coef => config.entropy_coef,
            value_loss_coef => config.value_loss_coef,
            max_grad_norm => config.max_grad_norm,
            seed => config.seed,
            num_processes => config.num_processes,
            num_steps => config.num_steps,
            ppo_epoch => config.ppo_epoch,
            num_mini_batch => config.num_mini_batch,
            clip_param => config.clip_param,
            num_env_steps => config.num_env_steps,
            log_interval => config.log_interval,
            save_interval => config.save_interval,
            save_dir => config.save_dir,
            hidden_size => config.hidden_size,
            feature_size => config.curiosity.feature_size,
            irsf => config.curiosity.intrinsic_reward_scale,
            erw => config.curiosity.extrinsic_weight,
            irw => config.curiosity.intrinsic_weight,
            lam_pol => config.curiosity.lam_pol,
            forward_loss_weight => config.curiosity.forward_loss_weight,
        }
        if self.eval_interval.is_some() {
            config.eval_interval = self.eval_interval;
        }
        config.use_gae |= self.use_gae;
        config.use_linear_lr_decay |= self.use_linear_lr_decay;
        config.recurrent_policy |= self.recurrent_policy;
        config.curiosity.enabled |= self.curiosity;
        if self.no_clipped_value_loss {
            config.use_clipped_value_loss = false;
        }

        if self.cuda {
            if tch::Cuda::is_available() {
                tracing::info!("Using CUDA");
                config = config.cuda();
            } else {
                tracing::warn!("CUDA requested but not available, using CPU");
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn logger(&self) -> Result<Box<dyn MetricLogger>> {
        #[allow(unused_mut)]
        let mut loggers: Vec<Box<dyn MetricLogger>> = vec![Box::new(ConsoleLogger::new())];
        #[cfg(feature = "tensorboard")]
        if let Some(dir) = &self.tensorboard {
            std::fs::create_dir_all(dir)?;
            loggers.push(Box::new(
                curio::log::TensorBoardLogger::new(dir).with_prefix("train"),
            ));
        }
        Ok(Box::new(CompositeLogger::new(loggers)))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train(args) => train(&args)?,
        Commands::List => list_envs(),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&TrainerConfig::default())?);
        }
    }

    Ok(())
}

fn list_envs() {
    println!("Available environments:");
    for name in ENV_NAMES {
        if let Some(env) = curio_envs::make(name) {
            println!(
                "  {:<10} observations: {:<3} actions: {}",
                name,
                env.observation_size(),
                env.num_actions()
            );
        }
    }
}

fn train(args: &TrainArgs) -> Result<()> {
    let Some(creator) = curio_envs::creator(&args.env) else {
        bail!(
            "unknown environment '{}', expected one of: {}",
            args.env,
            ENV_NAMES.join(", ")
        );
    };
    let config = args.to_config()?;
    let _ = curio::utils::set_seed(config.seed);

    tracing::info!(
        env = %args.env,
        num_env_steps = config.num_env_steps,
        num_processes = config.num_processes,
        recurrent = config.recurrent_policy,
        curiosity = config.curiosity.enabled,
        "Starting training"
    );

    let num_processes = config.num_processes;
    let envs = Serial::new(creator, num_processes);
    let obs_size = envs.observation_size() as i64;
    let num_actions = envs.num_actions() as i64;
    let logger = args.logger()?;

    if config.recurrent_policy {
        let policy = GruPolicy::new(obs_size, num_actions, config.hidden_size, config.device);
        with_objective(creator, envs, policy, config, logger)
    } else {
        let mlp = MlpConfig {
            hidden_size: config.hidden_size,
            ..MlpConfig::default()
        };
        let policy = MlpPolicy::new(obs_size, num_actions, mlp, config.device);
        tracing::info!(params = policy.num_parameters(), "Created MLP policy");
        with_objective(creator, envs, policy, config, logger)
    }
}

/// Curiosity networks must join the policy's variables before the optimizer
/// is built
fn with_objective<P: ActorCritic>(
    creator: fn() -> BoxedEnv,
    envs: Serial<BoxedEnv>,
    policy: P,
    config: TrainerConfig,
    logger: Box<dyn MetricLogger>,
) -> Result<()> {
    if config.curiosity.enabled {
        let curiosity = Curiosity::mlp(
            &policy.var_store().root(),
            envs.observation_size() as i64,
            envs.num_actions() as i64,
            &config.curiosity,
        );
        let ppo = Ppo::with_objective(&policy, config.ppo(), curiosity)?;
        run(creator, envs, policy, ppo, config, logger)
    } else {
        let ppo = Ppo::new(&policy, config.ppo())?;
        run(creator, envs, policy, ppo, config, logger)
    }
}

fn run<P: ActorCritic, A: AuxiliaryObjective>(
    creator: fn() -> BoxedEnv,
    envs: Serial<BoxedEnv>,
    policy: P,
    ppo: Ppo<A>,
    config: TrainerConfig,
    logger: Box<dyn MetricLogger>,
) -> Result<()> {
    let num_processes = config.num_processes;
    let mut trainer = Trainer::new(envs, policy, ppo, config)?
        .with_logger(logger)
        .with_eval_envs(move || Serial::new(creator, num_processes))
        .with_progress();

    trainer.train()?;
    tracing::info!(
        updates = trainer.update_count(),
        steps = trainer.global_step(),
        sps = trainer.sps() as u64,
        "Training complete"
    );
    Ok(())
}
