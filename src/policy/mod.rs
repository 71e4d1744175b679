//! Driving policies: the capability traits, the action type and the PPO
//! implementation behind them.

mod inference;
mod network;
mod ppo;
mod rollout;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CheckpointError, PolicyError};

pub use inference::PpoPolicy;
pub use network::{ActorCritic, ActorCriticConfig};
pub use ppo::{PpoAgent, PpoConfig};
pub use rollout::{compute_gae, RolloutBuffer, Transition};

/// Number of continuous action dimensions: steering and throttle.
pub const ACTION_DIM: usize = 2;

/// One control command for the car.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Action {
    pub steering: f32,
    pub throttle: f32,
}

impl Action {
    pub fn new(steering: f32, throttle: f32) -> Self {
        Action { steering, throttle }
    }

    pub fn to_array(self) -> [f32; ACTION_DIM] {
        [self.steering, self.throttle]
    }
}

/// Allowed range for each action dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionBounds {
    pub steering_min: f32,
    pub steering_max: f32,
    pub throttle_min: f32,
    pub throttle_max: f32,
}

impl Default for ActionBounds {
    fn default() -> Self {
        ActionBounds {
            steering_min: -1.0,
            steering_max: 1.0,
            throttle_min: 0.0,
            throttle_max: 1.0,
        }
    }
}

impl ActionBounds {
    pub fn is_valid(&self) -> bool {
        self.steering_min < self.steering_max && self.throttle_min < self.throttle_max
    }

    /// Clip a raw network output into the allowed box.
    pub fn clip(&self, raw: [f32; ACTION_DIM]) -> Action {
        Action {
            steering: raw[0].clamp(self.steering_min, self.steering_max),
            throttle: raw[1].clamp(self.throttle_min, self.throttle_max),
        }
    }
}

/// Anything that maps an encoded observation to an action.
pub trait Policy {
    /// Choose an action. With `deterministic` set the same observation always
    /// yields the same action.
    fn predict(&mut self, observation: &[f32], deterministic: bool) -> Result<Action, PolicyError>;

    /// Reset stochastic components to a reproducible state.
    fn reseed(&mut self, seed: u64);
}

impl<P: Policy + ?Sized> Policy for &mut P {
    fn predict(&mut self, observation: &[f32], deterministic: bool) -> Result<Action, PolicyError> {
        (**self).predict(observation, deterministic)
    }

    fn reseed(&mut self, seed: u64) {
        (**self).reseed(seed)
    }
}

impl<P: Policy + ?Sized> Policy for Box<P> {
    fn predict(&mut self, observation: &[f32], deterministic: bool) -> Result<Action, PolicyError> {
        (**self).predict(observation, deterministic)
    }

    fn reseed(&mut self, seed: u64) {
        (**self).reseed(seed)
    }
}

/// A sampled action plus what the learner needs to score it later.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionSample {
    /// Action clipped to the bounds, sent to the environment.
    pub action: Action,
    /// Unclipped Gaussian sample, used for the log-probability.
    pub raw: [f32; ACTION_DIM],
    pub log_prob: f32,
    pub value: f32,
}

/// Losses of one optimisation phase, averaged over minibatches.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateMetrics {
    pub loss: f32,
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
}

/// A policy that can also learn from on-policy rollouts.
pub trait TrainablePolicy: Policy {
    /// Sample an action for training.
    fn act(&mut self, observation: &[f32]) -> Result<ActionSample, PolicyError>;

    /// Value estimate, used to bootstrap a truncated rollout.
    fn value(&self, observation: &[f32]) -> Result<f32, PolicyError>;

    /// Optimise on a full rollout.
    fn update(&mut self, rollout: &RolloutBuffer) -> Result<UpdateMetrics, PolicyError>;

    /// Persist weights, returning the file actually written.
    fn save(&self, path: &Path) -> Result<PathBuf, CheckpointError>;

    /// Algorithm name for logs ("PPO").
    fn algorithm_name(&self) -> &str;
}
