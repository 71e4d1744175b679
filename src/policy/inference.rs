use std::path::Path;

use burn::prelude::*;
use burn::record::DefaultRecorder;
use burn::tensor::TensorData;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use super::network::ActorCritic;
use super::ppo::{to_vec, InferBackend, PpoConfig};
use super::{Action, ActionBounds, Policy, ACTION_DIM};
use crate::error::{CheckpointError, PolicyError};

/// Inference-only PPO actor restored from a saved artifact.
pub struct PpoPolicy {
    network: ActorCritic<InferBackend>,
    device: <InferBackend as Backend>::Device,
    observation_dim: usize,
    bounds: ActionBounds,
    rng: StdRng,
}

impl PpoPolicy {
    /// Load a policy saved by [`PpoAgent`](super::PpoAgent). The network
    /// layout comes from `config` and must match the one used in training.
    pub fn load(config: &PpoConfig, observation_dim: usize, path: &Path) -> Result<Self, CheckpointError> {
        if !path.is_file() {
            return Err(CheckpointError::ModelLoad {
                path: path.to_path_buf(),
                message: "file not found".into(),
            });
        }
        let device = Default::default();
        let network = config
            .network_config(observation_dim)
            .init::<InferBackend>(&device)
            .load_file(path.to_path_buf(), &DefaultRecorder::default(), &device)
            .map_err(|e| CheckpointError::ModelLoad {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        debug!(path = %path.display(), "loaded policy");

        Ok(PpoPolicy {
            network,
            device,
            observation_dim,
            bounds: config.action_bounds,
            rng: StdRng::seed_from_u64(0),
        })
    }
}

impl Policy for PpoPolicy {
    fn predict(&mut self, observation: &[f32], deterministic: bool) -> Result<Action, PolicyError> {
        if observation.len() != self.observation_dim {
            return Err(PolicyError::ObservationSize {
                expected: self.observation_dim,
                actual: observation.len(),
            });
        }
        let input = Tensor::<InferBackend, 1>::from_data(TensorData::from(observation), &self.device)
            .reshape([1, self.observation_dim]);
        let mean = to_vec(self.network.mean(input))?;

        let mut raw = [mean[0], mean[1]];
        if !deterministic {
            let log_std = to_vec(self.network.log_std())?;
            for i in 0..ACTION_DIM {
                let normal = Normal::new(mean[i], log_std[i].exp())
                    .map_err(|e| PolicyError::Inference(format!("invalid action distribution: {e}")))?;
                raw[i] = normal.sample(&mut self.rng);
            }
        }
        Ok(self.bounds.clip(raw))
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}
