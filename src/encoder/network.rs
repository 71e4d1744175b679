use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

const KERNEL: usize = 4;
const STRIDE: usize = 2;
const CHANNELS: [usize; 4] = [32, 64, 128, 256];

/// Convolutional encoder half of the pretrained autoencoder.
///
/// ```text
/// Input:  [batch, C, H, W]
/// Conv1..Conv4: 4x4 kernels, stride 2, 32/64/128/256 channels, ReLU
/// Flatten
/// FC: flat -> latent_dim  (latent mean)
/// ```
#[derive(Module, Debug)]
pub struct ConvEncoder<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    conv4: Conv2d<B>,
    mu: Linear<B>,
    relu: Relu,
}

#[derive(Config, Debug)]
pub struct ConvEncoderConfig {
    pub input_height: usize,
    pub input_width: usize,
    pub input_channels: usize,
    pub latent_dim: usize,
}

/// Spatial size after the four stride-2 convolutions, `None` when the input
/// is too small to survive them.
pub fn conv_stack_output(size: usize) -> Option<usize> {
    let mut size = size;
    for _ in 0..CHANNELS.len() {
        if size < KERNEL {
            return None;
        }
        size = (size - KERNEL) / STRIDE + 1;
    }
    Some(size)
}

impl ConvEncoderConfig {
    /// Number of features entering the projection layer.
    pub fn flat_features(&self) -> Option<usize> {
        let h = conv_stack_output(self.input_height)?;
        let w = conv_stack_output(self.input_width)?;
        Some(CHANNELS[3] * h * w)
    }

    /// Initialize the network. The config must have passed
    /// [`crate::config::EncoderConfig::validate`], which guarantees the
    /// convolution stack has a non-empty output.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvEncoder<B> {
        let flat = self.flat_features().unwrap_or(CHANNELS[3]);
        let conv = |input: usize, output: usize| {
            Conv2dConfig::new([input, output], [KERNEL, KERNEL])
                .with_stride([STRIDE, STRIDE])
                .init(device)
        };
        ConvEncoder {
            conv1: conv(self.input_channels, CHANNELS[0]),
            conv2: conv(CHANNELS[0], CHANNELS[1]),
            conv3: conv(CHANNELS[1], CHANNELS[2]),
            conv4: conv(CHANNELS[2], CHANNELS[3]),
            mu: LinearConfig::new(flat, self.latent_dim).init(device),
            relu: Relu::new(),
        }
    }
}

impl<B: Backend> ConvEncoder<B> {
    /// Forward pass: input [batch, C, H, W] -> latent [batch, latent_dim].
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let batch_size = input.dims()[0];

        let x = self.relu.forward(self.conv1.forward(input));
        let x = self.relu.forward(self.conv2.forward(x));
        let x = self.relu.forward(self.conv3.forward(x));
        let x = self.relu.forward(self.conv4.forward(x));
        let x: Tensor<B, 2> = x.flatten(1, 3);
        debug_assert_eq!(x.dims()[0], batch_size);

        self.mu.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_conv_stack_output_sizes() {
        // 64 -> 31 -> 14 -> 6 -> 2
        assert_eq!(conv_stack_output(64), Some(2));
        // 80 -> 39 -> 18 -> 8 -> 3
        assert_eq!(conv_stack_output(80), Some(3));
        assert_eq!(conv_stack_output(16), None);
    }

    #[test]
    fn test_encoder_output_shape() {
        let device = Default::default();
        let config = ConvEncoderConfig::new(64, 64, 3, 32);
        assert_eq!(config.flat_features(), Some(1024));
        let network = config.init::<TestBackend>(&device);

        let input = Tensor::zeros([2, 3, 64, 64], &device);
        let latent = network.forward(input);
        assert_eq!(latent.dims(), [2, 32]);
    }
}
