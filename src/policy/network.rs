use burn::module::Param;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

use super::ACTION_DIM;

/// Gaussian actor-critic over latent observations.
///
/// ```text
/// Input:  [batch, latent_dim]
/// Actor:  hidden MLP (ReLU) -> mean  [batch, 2]
/// log_std: learned, state independent [2], broadcast to [batch, 2]
/// Critic: separate hidden MLP (ReLU) -> value [batch, 1]
/// ```
#[derive(Module, Debug)]
pub struct ActorCritic<B: Backend> {
    actor: Vec<Linear<B>>,
    mean_head: Linear<B>,
    log_std: Param<Tensor<B, 1>>,
    critic: Vec<Linear<B>>,
    value_head: Linear<B>,
    relu: Relu,
}

#[derive(Config, Debug)]
pub struct ActorCriticConfig {
    pub observation_dim: usize,
    pub hidden_sizes: Vec<usize>,
    pub log_std_init: f32,
}

impl ActorCriticConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ActorCritic<B> {
        let mlp = || {
            let mut layers = Vec::with_capacity(self.hidden_sizes.len());
            let mut input = self.observation_dim;
            for &width in &self.hidden_sizes {
                layers.push(LinearConfig::new(input, width).init(device));
                input = width;
            }
            (layers, input)
        };
        let (actor, actor_out) = mlp();
        let (critic, critic_out) = mlp();

        ActorCritic {
            actor,
            mean_head: LinearConfig::new(actor_out, ACTION_DIM).init(device),
            log_std: Param::from_tensor(Tensor::full([ACTION_DIM], self.log_std_init, device)),
            critic,
            value_head: LinearConfig::new(critic_out, 1).init(device),
            relu: Relu::new(),
        }
    }
}

impl<B: Backend> ActorCritic<B> {
    /// Forward pass: [batch, obs] -> (mean [batch, 2], log_std [batch, 2], value [batch, 1]).
    pub fn forward(&self, input: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 2>) {
        let batch_size = input.dims()[0];
        let mean = self.mean(input.clone());
        let log_std = self
            .log_std
            .val()
            .unsqueeze_dim::<2>(0)
            .repeat_dim(0, batch_size);
        let value = self.value(input);
        (mean, log_std, value)
    }

    /// Actor mean only.
    pub fn mean(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self
            .actor
            .iter()
            .fold(input, |x, layer| self.relu.forward(layer.forward(x)));
        self.mean_head.forward(x)
    }

    /// Critic only: [batch, obs] -> [batch, 1].
    pub fn value(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self
            .critic
            .iter()
            .fold(input, |x, layer| self.relu.forward(layer.forward(x)));
        self.value_head.forward(x)
    }

    pub fn log_std(&self) -> Tensor<B, 1> {
        self.log_std.val()
    }
}
