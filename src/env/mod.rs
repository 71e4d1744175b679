//! The environment capability and the wrappers stacked on top of the
//! simulator client.

mod monitor;
mod reward;
mod wrapper;

use std::collections::BTreeMap;

use crate::error::EnvError;
use crate::policy::Action;

pub use monitor::{EpisodeMonitor, EpisodeRecord, MONITOR_FILE};
pub use reward::{CrossTrackSpeedReward, RewardShaper, RewardShapingKind};
pub use wrapper::{DriveInfo, EncodedEnv, EnvMode};

/// Named scalar side information reported by a raw environment step.
pub type StepInfo = BTreeMap<String, f64>;

/// Info keys the simulator client fills in.
pub mod info_keys {
    pub const DISTANCE: &str = "distance";
    pub const SPEED: &str = "speed";
    pub const CTE: &str = "cte";
    pub const HIT: &str = "hit";
    pub const POS_X: &str = "pos_x";
    pub const POS_Y: &str = "pos_y";
    pub const POS_Z: &str = "pos_z";
}

/// Result of one environment transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Step<O, I> {
    pub observation: O,
    pub reward: f64,
    pub done: bool,
    pub info: I,
}

/// Episodic control environment: reset, step until done, close once.
///
/// Calls block until the environment answers. A handle is driven by one
/// caller at a time.
pub trait Environment {
    type Observation;
    type Info;

    fn reset(&mut self) -> Result<Self::Observation, EnvError>;

    fn step(&mut self, action: &Action) -> Result<Step<Self::Observation, Self::Info>, EnvError>;

    /// Fix any environment-side randomness for the next reset.
    fn seed(&mut self, seed: u64);

    /// Release resources. Closing an already closed environment is a no-op.
    fn close(&mut self) -> Result<(), EnvError>;
}

impl<E: Environment + ?Sized> Environment for &mut E {
    type Observation = E::Observation;
    type Info = E::Info;

    fn reset(&mut self) -> Result<Self::Observation, EnvError> {
        (**self).reset()
    }

    fn step(&mut self, action: &Action) -> Result<Step<Self::Observation, Self::Info>, EnvError> {
        (**self).step(action)
    }

    fn seed(&mut self, seed: u64) {
        (**self).seed(seed)
    }

    fn close(&mut self) -> Result<(), EnvError> {
        (**self).close()
    }
}
