//! Replaying saved policies: one deterministic episode per checkpoint.

mod episode;
mod sweep;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use episode::{EpisodeRunner, EpisodeSummary};
pub use sweep::{CheckpointResult, CheckpointSweep, SweepReport};

/// Checkpoint sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub checkpoint_dir: PathBuf,
    /// Step budget per episode.
    pub max_timesteps: u64,
    pub seed: u64,
    /// Telemetry runs are named `<run_prefix>-<index>`.
    pub run_prefix: String,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        EvaluationConfig {
            checkpoint_dir: PathBuf::from("logs/checkpoints"),
            max_timesteps: 5000,
            seed: 42,
            run_prefix: "track-speed-reward".into(),
        }
    }
}

impl EvaluationConfig {
    pub fn runner(&self) -> EpisodeRunner {
        EpisodeRunner::new(self.max_timesteps, self.seed)
    }

    pub fn sweep(&self) -> CheckpointSweep {
        CheckpointSweep::new(&self.checkpoint_dir, self.runner(), &self.run_prefix)
    }
}
