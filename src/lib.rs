//! # Donkey PPO
//!
//! Trains and evaluates a PPO driving policy for the Donkey car simulator.
//! Camera frames are compressed by a frozen convolutional encoder before
//! they reach the policy. Built on the Burn ML framework.
//!
//! ## Modules
//!
//! - [`sim`]: Simulator TCP client, process launcher, scene table
//! - [`encoder`]: Raw frames and the frozen latent encoder
//! - [`env`]: Environment trait, encoding wrapper, reward shaping, episode monitor
//! - [`policy`]: Policy traits, actor-critic network, PPO agent and inference policy
//! - [`training`]: Training loop with guaranteed final save
//! - [`evaluation`]: Episode runner and checkpoint sweep
//! - [`checkpoint`]: Checkpoint naming, discovery and writing
//! - [`telemetry`]: Scalar recorders (TensorBoard, in-memory)
//! - [`seeding`]: Explicit per-run seeding
//! - [`config`]: TOML configuration loading and validation
//! - [`error`]: Structured error types

#![recursion_limit = "256"]

pub mod checkpoint;
pub mod config;
pub mod encoder;
pub mod env;
pub mod error;
pub mod evaluation;
pub mod policy;
pub mod seeding;
pub mod sim;
pub mod telemetry;
pub mod training;

#[cfg(test)]
mod testing;
