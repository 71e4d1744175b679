//! Training infrastructure: the PPO optimisation loop, its scoped
//! finalization, rolling metrics and the interrupt flag.

mod interrupt;
mod metrics;
mod orchestrator;
mod session;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::env::RewardShapingKind;

pub use interrupt::StopFlag;
pub use metrics::{EpisodeStats, TrainingMetrics};
pub use orchestrator::{
    RolloutSettings, TrainingOrchestrator, TrainingOutcome, TrainingReport, ENTROPY,
    EPISODE_LENGTH, EPISODE_REWARD, LOSS, POLICY_LOSS, VALUE_LOSS,
};
pub use session::{TrainingSession, COMPLETED};

/// Training run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub total_timesteps: u64,
    pub checkpoint_interval: u64,
    pub checkpoint_dir: PathBuf,
    /// Checkpoints are named `<prefix>_<step>_steps.mpk`.
    pub checkpoint_prefix: String,
    /// Final model, written on every exit path.
    pub model_path: PathBuf,
    pub monitoring_dir: PathBuf,
    pub seed: u64,
    pub log_interval: u64,
    pub reward_shaping: RewardShapingKind,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            total_timesteps: 50_000,
            checkpoint_interval: 1000,
            checkpoint_dir: PathBuf::from("logs/checkpoints"),
            checkpoint_prefix: "donkey_model".into(),
            model_path: PathBuf::from("ppo_donkeycar"),
            monitoring_dir: PathBuf::from("logs/monitor"),
            seed: 42,
            log_interval: 1000,
            reward_shaping: RewardShapingKind::None,
        }
    }
}
