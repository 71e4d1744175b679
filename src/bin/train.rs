#![recursion_limit = "256"]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use donkey_ppo::config::AppConfig;
use donkey_ppo::encoder::{FrozenEncoder, ObservationEncoder};
use donkey_ppo::env::{EncodedEnv, EpisodeMonitor};
use donkey_ppo::policy::PpoAgent;
use donkey_ppo::sim::{scene_for_env_id, DonkeySim};
use donkey_ppo::telemetry::TensorboardRecorder;
use donkey_ppo::training::{RolloutSettings, StopFlag, TrainingOrchestrator, TrainingOutcome};

/// Train a PPO driving policy in the Donkey simulator.
#[derive(Parser)]
#[command(name = "train", about = "Train a PPO agent on a latent-encoded Donkey car")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Simulator environment id, e.g. donkey-generated-track-v0
    #[arg(long)]
    env_id: Option<String>,

    /// Override the number of environment steps
    #[arg(long)]
    total_timesteps: Option<u64>,

    /// Override the encoder weights file
    #[arg(long)]
    ae_path: Option<PathBuf>,

    /// Override where the final model is saved
    #[arg(long)]
    model_path: Option<PathBuf>,

    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    #[arg(long)]
    monitoring_dir: Option<PathBuf>,

    #[arg(long)]
    tensorboard_dir: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    init_tracing();
    if let Err(err) = run(Cli::parse()) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    // Apply CLI overrides
    if let Some(env_id) = &cli.env_id {
        config.sim.scene = scene_for_env_id(env_id)?.to_string();
    }
    if let Some(steps) = cli.total_timesteps {
        config.training.total_timesteps = steps;
    }
    if let Some(path) = cli.ae_path {
        config.encoder.weights_path = path;
    }
    if let Some(path) = cli.model_path {
        config.training.model_path = path;
    }
    if let Some(dir) = cli.checkpoint_dir {
        config.training.checkpoint_dir = dir;
    }
    if let Some(dir) = cli.monitoring_dir {
        config.training.monitoring_dir = dir;
    }
    if let Some(dir) = cli.tensorboard_dir {
        config.telemetry.tensorboard_dir = dir;
    }
    if let Some(seed) = cli.seed {
        config.training.seed = seed;
    }
    config.validate().context("validating configuration")?;

    let stop = StopFlag::new();
    stop.install_ctrl_c_handler()
        .context("installing Ctrl-C handler")?;

    let encoder = Arc::new(
        FrozenEncoder::load(&config.encoder, &config.encoder.weights_path)
            .context("loading encoder weights")?,
    );
    let sim = DonkeySim::launch(&config.sim).context("starting simulator")?;
    let monitored = EpisodeMonitor::create(sim, &config.training.monitoring_dir)
        .context("opening episode monitor")?;
    let shaper = config
        .training
        .reward_shaping
        .build(config.sim.max_cross_track_error);
    let env = EncodedEnv::training(monitored, Arc::clone(&encoder), shaper);

    let agent = PpoAgent::new(config.ppo.clone(), encoder.latent_dim(), config.training.seed);
    let recorder = TensorboardRecorder::create(&config.telemetry.tensorboard_dir, "PPO")
        .context("creating TensorBoard writer")?;

    let orchestrator =
        TrainingOrchestrator::new(config.training.clone(), RolloutSettings::from(&config.ppo));
    let report = orchestrator
        .run(env, agent, recorder, &stop)
        .context("training failed")?;

    match report.outcome {
        TrainingOutcome::Completed => info!(
            timesteps = report.timesteps,
            episodes = report.episodes,
            model = %report.final_model.display(),
            "training complete"
        ),
        TrainingOutcome::Interrupted => info!(
            timesteps = report.timesteps,
            model = %report.final_model.display(),
            "training interrupted, model saved"
        ),
    }
    Ok(())
}
