//! Donkey simulator plumbing: the TCP client, the process launcher and the
//! environment-id table.

mod client;
mod process;
pub mod protocol;

pub use client::{DonkeySim, DriveReward};
pub use process::SimProcess;

use crate::error::ConfigError;

/// Gym-style environment ids and the simulator scenes they load.
pub const SCENES: &[(&str, &str)] = &[
    ("donkey-generated-roads-v0", "generated_road"),
    ("donkey-warehouse-v0", "warehouse"),
    ("donkey-avc-sparkfun-v0", "sparkfun_avc"),
    ("donkey-generated-track-v0", "generated_track"),
    ("donkey-roboracingleague-track-v0", "roboracingleague_1"),
    ("donkey-waveshare-v0", "waveshare"),
    ("donkey-minimonaco-track-v0", "mini_monaco"),
    ("donkey-warren-track-v0", "warren"),
    ("donkey-circuit-launch-track-v0", "circuit_launch"),
    ("donkey-mountain-track-v0", "mountain_track"),
];

/// Scene name for an environment id.
pub fn scene_for_env_id(env_id: &str) -> Result<&'static str, ConfigError> {
    SCENES
        .iter()
        .find(|(id, _)| *id == env_id)
        .map(|(_, scene)| *scene)
        .ok_or_else(|| {
            let known: Vec<&str> = SCENES.iter().map(|(id, _)| *id).collect();
            ConfigError::Validation(format!(
                "unknown environment id '{env_id}', expected one of: {}",
                known.join(", ")
            ))
        })
}
