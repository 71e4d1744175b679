#![recursion_limit = "256"]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use donkey_ppo::config::AppConfig;
use donkey_ppo::encoder::{FrozenEncoder, ObservationEncoder};
use donkey_ppo::env::EncodedEnv;
use donkey_ppo::error::SweepError;
use donkey_ppo::policy::PpoPolicy;
use donkey_ppo::sim::{scene_for_env_id, DonkeySim};
use donkey_ppo::telemetry::TensorboardRecorder;

/// Replay every saved checkpoint for one episode and record how far it drives.
#[derive(Parser)]
#[command(name = "drive", about = "Evaluate PPO checkpoints in the Donkey simulator")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Simulator environment id, e.g. donkey-generated-track-v0
    #[arg(long)]
    env_id: Option<String>,

    /// Step budget per checkpoint [config default: 5000]
    #[arg(long)]
    max_time_steps: Option<u64>,

    /// Override the encoder weights file
    #[arg(long)]
    ae_path: Option<PathBuf>,

    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    #[arg(long)]
    tensorboard_dir: Option<PathBuf>,

    /// Seed for every episode [config default: 42]
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    init_tracing();
    if let Err(err) = run(Cli::parse()) {
        eprintln!("Error: {err:#}");
        let snapshot = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<SweepError>())
            .and_then(SweepError::snapshot);
        if let Some(snapshot) = snapshot {
            eprintln!("Last telemetry: {snapshot}");
        }
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

    if let Some(env_id) = &cli.env_id {
        config.sim.scene = scene_for_env_id(env_id)?.to_string();
    }
    if let Some(steps) = cli.max_time_steps {
        config.evaluation.max_timesteps = steps;
    }
    if let Some(path) = cli.ae_path {
        config.encoder.weights_path = path;
    }
    if let Some(dir) = cli.checkpoint_dir {
        config.evaluation.checkpoint_dir = dir;
    }
    if let Some(dir) = cli.tensorboard_dir {
        config.telemetry.tensorboard_dir = dir;
    }
    if let Some(seed) = cli.seed {
        config.evaluation.seed = seed;
    }
    config.validate().context("validating configuration")?;

    let encoder = Arc::new(
        FrozenEncoder::load(&config.encoder, &config.encoder.weights_path)
            .context("loading encoder weights")?,
    );
    let latent_dim = encoder.latent_dim();
    let sim = DonkeySim::launch(&config.sim).context("starting simulator")?;
    let env = EncodedEnv::evaluation(sim, encoder);

    let ppo = config.ppo.clone();
    let tensorboard_dir = config.telemetry.tensorboard_dir.clone();
    let report = config
        .evaluation
        .sweep()
        .run(
            env,
            |path| PpoPolicy::load(&ppo, latent_dim, path),
            |run| TensorboardRecorder::create(&tensorboard_dir, run),
        )
        .context("checkpoint sweep failed")?;

    for result in &report.results {
        info!(
            checkpoint = %result.checkpoint.name,
            run = %result.run,
            timesteps = result.summary.timesteps,
            distance = result.summary.distance,
            speed = result.summary.speed,
            "result"
        );
    }
    if let Some(best) = report.best_by_distance() {
        info!(
            checkpoint = %best.checkpoint.name,
            distance = best.summary.distance,
            "furthest driving checkpoint"
        );
    }
    Ok(())
}
