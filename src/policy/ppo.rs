use std::path::{Path, PathBuf};

use burn::backend::{Autodiff, NdArray};
use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::DefaultRecorder;
use burn::tensor::{ElementConversion, TensorData};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::network::{ActorCritic, ActorCriticConfig};
use super::rollout::RolloutBuffer;
use super::{Action, ActionBounds, ActionSample, Policy, TrainablePolicy, UpdateMetrics, ACTION_DIM};
use crate::checkpoint::weights_file;
use crate::error::{CheckpointError, PolicyError};

pub(crate) type InferBackend = NdArray<f32>;
type TrainBackend = Autodiff<InferBackend>;

/// ln(2π)
const LN_2PI: f32 = 1.837_877_1;

/// PPO hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PpoConfig {
    pub learning_rate: f64,
    pub gamma: f32,
    pub gae_lambda: f32,
    pub clip_range: f32,
    pub ent_coef: f32,
    pub vf_coef: f32,
    pub max_grad_norm: f32,
    /// Transitions collected per update.
    pub n_steps: usize,
    pub minibatch_size: usize,
    pub n_epochs: usize,
    /// Hidden layer widths shared by the actor and critic MLPs.
    pub hidden_sizes: Vec<usize>,
    pub log_std_init: f32,
    pub action_bounds: ActionBounds,
}

impl Default for PpoConfig {
    fn default() -> Self {
        PpoConfig {
            learning_rate: 3e-4,
            gamma: 0.99,
            gae_lambda: 0.9,
            clip_range: 0.2,
            ent_coef: 0.0,
            vf_coef: 0.5,
            max_grad_norm: 0.5,
            n_steps: 512,
            minibatch_size: 64,
            n_epochs: 10,
            hidden_sizes: vec![64, 64],
            log_std_init: -2.0,
            action_bounds: ActionBounds::default(),
        }
    }
}

impl PpoConfig {
    pub(crate) fn network_config(&self, observation_dim: usize) -> ActorCriticConfig {
        ActorCriticConfig::new(observation_dim, self.hidden_sizes.clone(), self.log_std_init)
    }
}

/// Proximal Policy Optimization with a Gaussian policy and GAE.
pub struct PpoAgent {
    network: ActorCritic<TrainBackend>,
    optimizer: OptimizerAdaptor<Adam, ActorCritic<TrainBackend>, TrainBackend>,
    config: PpoConfig,
    observation_dim: usize,
    device: <TrainBackend as Backend>::Device,
    rng: StdRng,
    update_count: usize,
}

impl PpoAgent {
    /// Fresh agent. `seed` fixes both weight initialisation and sampling.
    pub fn new(config: PpoConfig, observation_dim: usize, seed: u64) -> Self {
        let device = Default::default();
        TrainBackend::seed(seed);
        let network: ActorCritic<TrainBackend> =
            config.network_config(observation_dim).init(&device);
        let optimizer = AdamConfig::new()
            .with_grad_clipping(Some(GradientClippingConfig::Norm(config.max_grad_norm)))
            .init();

        PpoAgent {
            network,
            optimizer,
            config,
            observation_dim,
            device,
            rng: StdRng::seed_from_u64(seed),
            update_count: 0,
        }
    }

    pub fn config(&self) -> &PpoConfig {
        &self.config
    }

    pub fn observation_dim(&self) -> usize {
        self.observation_dim
    }

    pub fn update_count(&self) -> usize {
        self.update_count
    }

    fn check_observation(&self, observation: &[f32]) -> Result<(), PolicyError> {
        if observation.len() != self.observation_dim {
            return Err(PolicyError::ObservationSize {
                expected: self.observation_dim,
                actual: observation.len(),
            });
        }
        Ok(())
    }

    /// Inference-mode forward pass on one observation.
    fn evaluate(&self, observation: &[f32]) -> Result<(Vec<f32>, Vec<f32>, f32), PolicyError> {
        self.check_observation(observation)?;
        let input = Tensor::<InferBackend, 1>::from_data(TensorData::from(observation), &self.device)
            .reshape([1, self.observation_dim]);
        let (mean, log_std, value) = self.network.valid().forward(input);
        let mean = to_vec(mean)?;
        let log_std = to_vec(log_std)?;
        let value = to_vec(value)?;
        Ok((mean, log_std, value[0]))
    }

    fn sample(&mut self, mean: &[f32], log_std: &[f32]) -> Result<[f32; ACTION_DIM], PolicyError> {
        let mut raw = [0.0f32; ACTION_DIM];
        for (i, slot) in raw.iter_mut().enumerate() {
            let normal = Normal::new(mean[i], log_std[i].exp())
                .map_err(|e| PolicyError::Inference(format!("invalid action distribution: {e}")))?;
            *slot = normal.sample(&mut self.rng);
        }
        Ok(raw)
    }

    fn float_tensor<const D: usize>(&self, data: Vec<f32>, shape: [usize; D]) -> Tensor<TrainBackend, D> {
        Tensor::<TrainBackend, 1>::from_data(TensorData::from(data.as_slice()), &self.device)
            .reshape(shape)
    }

    /// One gradient step on a minibatch. Returns (total, policy, value, entropy).
    fn minibatch_step(
        &mut self,
        rollout: &RolloutBuffer,
        indices: &[usize],
        advantages: &[f32],
    ) -> Result<[f32; 4], PolicyError> {
        let m = indices.len();
        let obs: Vec<f32> = indices
            .iter()
            .flat_map(|&i| rollout.observation(i).iter().copied())
            .collect();
        let actions: Vec<f32> = indices
            .iter()
            .flat_map(|&i| rollout.raw_action(i).iter().copied())
            .collect();
        let old_log_probs: Vec<f32> = indices.iter().map(|&i| rollout.log_probs()[i]).collect();
        let returns: Vec<f32> = indices.iter().map(|&i| rollout.returns()[i]).collect();
        let mut adv: Vec<f32> = indices.iter().map(|&i| advantages[i]).collect();
        normalize(&mut adv);

        let obs = self.float_tensor(obs, [m, self.observation_dim]);
        let actions = self.float_tensor(actions, [m, ACTION_DIM]);
        let old_log_probs = self.float_tensor(old_log_probs, [m]);
        let returns = self.float_tensor(returns, [m]);
        let adv = self.float_tensor(adv, [m]);

        let (mean, log_std, values) = self.network.forward(obs);

        // log N(a | mean, std), summed over action dimensions
        let z = (actions - mean) / log_std.clone().exp();
        let log_prob: Tensor<TrainBackend, 1> = ((z.clone() * z) * (-0.5) - log_std.clone() - 0.5 * LN_2PI)
            .sum_dim(1)
            .reshape([m]);

        let ratio = (log_prob - old_log_probs).exp();
        let surr1 = ratio.clone() * adv.clone();
        let clip = self.config.clip_range;
        let surr2 = ratio.clamp(1.0 - clip, 1.0 + clip) * adv;

        // min(a, b) = (a + b - |a - b|) / 2
        let diff = surr1.clone() - surr2.clone();
        let abs_diff = diff.clone() * diff.sign();
        let policy_loss = -((surr1 + surr2 - abs_diff) / 2.0).mean();

        let value_diff = values.reshape([m]) - returns;
        let value_loss = (value_diff.clone() * value_diff).mean();

        // Differential entropy of a diagonal Gaussian
        let entropy = (log_std + 0.5 * (1.0 + LN_2PI)).sum_dim(1).mean();

        let total = policy_loss.clone() + value_loss.clone() * self.config.vf_coef
            - entropy.clone() * self.config.ent_coef;

        let stats = [
            scalar(total.clone()),
            scalar(policy_loss),
            scalar(value_loss),
            scalar(entropy),
        ];

        let grads = total.backward();
        let grads = GradientsParams::from_grads(grads, &self.network);
        self.network = self
            .optimizer
            .step(self.config.learning_rate, self.network.clone(), grads);

        Ok(stats)
    }
}

impl Policy for PpoAgent {
    fn predict(&mut self, observation: &[f32], deterministic: bool) -> Result<Action, PolicyError> {
        let (mean, log_std, _) = self.evaluate(observation)?;
        let raw = if deterministic {
            [mean[0], mean[1]]
        } else {
            self.sample(&mean, &log_std)?
        };
        Ok(self.config.action_bounds.clip(raw))
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

impl TrainablePolicy for PpoAgent {
    fn act(&mut self, observation: &[f32]) -> Result<ActionSample, PolicyError> {
        let (mean, log_std, value) = self.evaluate(observation)?;
        let raw = self.sample(&mean, &log_std)?;
        Ok(ActionSample {
            action: self.config.action_bounds.clip(raw),
            raw,
            log_prob: gaussian_log_prob(&raw, &mean, &log_std),
            value,
        })
    }

    fn value(&self, observation: &[f32]) -> Result<f32, PolicyError> {
        self.evaluate(observation).map(|(_, _, value)| value)
    }

    fn update(&mut self, rollout: &RolloutBuffer) -> Result<UpdateMetrics, PolicyError> {
        if rollout.is_empty() {
            return Err(PolicyError::EmptyRollout);
        }
        if !rollout.is_finished() {
            return Err(PolicyError::Inference(
                "rollout advantages have not been computed".into(),
            ));
        }
        if rollout.observation_dim() != self.observation_dim {
            return Err(PolicyError::ObservationSize {
                expected: self.observation_dim,
                actual: rollout.observation_dim(),
            });
        }

        let n = rollout.len();
        let advantages = rollout.advantages().to_vec();
        let mut indices: Vec<usize> = (0..n).collect();
        let mut totals = [0.0f32; 4];
        let mut batches = 0usize;

        for _epoch in 0..self.config.n_epochs {
            indices.shuffle(&mut self.rng);
            for chunk in indices.clone().chunks(self.config.minibatch_size.max(1)) {
                let stats = self.minibatch_step(rollout, chunk, &advantages)?;
                for (total, value) in totals.iter_mut().zip(stats) {
                    *total += value;
                }
                batches += 1;
            }
        }
        self.update_count += 1;

        let avg = |v: f32| v / batches.max(1) as f32;
        let metrics = UpdateMetrics {
            loss: avg(totals[0]),
            policy_loss: avg(totals[1]),
            value_loss: avg(totals[2]),
            entropy: avg(totals[3]),
        };
        debug!(update = self.update_count, loss = metrics.loss, entropy = metrics.entropy, "ppo update");
        Ok(metrics)
    }

    fn save(&self, path: &Path) -> Result<PathBuf, CheckpointError> {
        let file = weights_file(path);
        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.network
            .clone()
            .valid()
            .save_file(file.clone(), &DefaultRecorder::default())
            .map_err(|e| CheckpointError::ModelSave {
                path: file.clone(),
                message: e.to_string(),
            })?;
        Ok(file)
    }

    fn algorithm_name(&self) -> &str {
        "PPO"
    }
}

/// Log-density of `x` under a diagonal Gaussian.
pub(crate) fn gaussian_log_prob(x: &[f32], mean: &[f32], log_std: &[f32]) -> f32 {
    x.iter()
        .zip(mean)
        .zip(log_std)
        .map(|((&x, &mu), &ls)| {
            let z = (x - mu) / ls.exp();
            -0.5 * z * z - ls - 0.5 * LN_2PI
        })
        .sum()
}

fn normalize(values: &mut [f32]) {
    let n = values.len();
    if n < 2 {
        return;
    }
    let mean: f32 = values.iter().sum::<f32>() / n as f32;
    let var: f32 = values.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / n as f32;
    let std = var.sqrt().max(1e-8);
    for v in values.iter_mut() {
        *v = (*v - mean) / std;
    }
}

pub(crate) fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>, PolicyError> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| PolicyError::Inference(format!("{e:?}")))
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor.into_scalar().elem::<f32>()
}
