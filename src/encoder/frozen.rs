use std::path::{Path, PathBuf};

use burn::backend::NdArray;
use burn::prelude::*;
use burn::record::DefaultRecorder;
use burn::tensor::TensorData;
use tracing::info;

use super::network::{ConvEncoder, ConvEncoderConfig};
use super::{Frame, ObservationEncoder};
use crate::checkpoint::weights_file;
use crate::config::EncoderConfig;
use crate::error::EncodingError;

type EncoderBackend = NdArray<f32>;

/// A [`ConvEncoder`] with fixed weights, checked against one input shape.
pub struct FrozenEncoder {
    network: ConvEncoder<EncoderBackend>,
    device: <EncoderBackend as Backend>::Device,
    input_shape: [usize; 3],
    latent_dim: usize,
}

impl FrozenEncoder {
    /// Load pretrained weights. A missing weights file is an error, never a
    /// silent fallback to random weights.
    pub fn load(config: &EncoderConfig, path: &Path) -> Result<Self, EncodingError> {
        let file = weights_file(path);
        if !file.is_file() {
            return Err(EncodingError::Weights {
                path: file,
                message: "file not found".into(),
            });
        }

        let device = Default::default();
        let network = network_config(config)
            .init::<EncoderBackend>(&device)
            .load_file(file.clone(), &DefaultRecorder::default(), &device)
            .map_err(|e| EncodingError::Weights {
                path: file.clone(),
                message: e.to_string(),
            })?;
        info!(path = %file.display(), latent_dim = config.latent_dim, "loaded encoder weights");

        Ok(Self::from_network(config, network, device))
    }

    /// Freshly initialized weights, reproducible for a given seed.
    pub fn from_seed(config: &EncoderConfig, seed: u64) -> Self {
        let device = Default::default();
        EncoderBackend::seed(seed);
        let network = network_config(config).init::<EncoderBackend>(&device);
        Self::from_network(config, network, device)
    }

    fn from_network(
        config: &EncoderConfig,
        network: ConvEncoder<EncoderBackend>,
        device: <EncoderBackend as Backend>::Device,
    ) -> Self {
        FrozenEncoder {
            network,
            device,
            input_shape: config.input_shape(),
            latent_dim: config.latent_dim,
        }
    }

    /// Persist the current weights, returning the file actually written.
    pub fn save(&self, path: &Path) -> Result<PathBuf, EncodingError> {
        let file = weights_file(path);
        self.network
            .clone()
            .save_file(file.clone(), &DefaultRecorder::default())
            .map_err(|e| EncodingError::Weights {
                path: file.clone(),
                message: e.to_string(),
            })?;
        Ok(file)
    }
}

fn network_config(config: &EncoderConfig) -> ConvEncoderConfig {
    let [height, width, channels] = config.input_shape();
    ConvEncoderConfig::new(height, width, channels, config.latent_dim)
}

impl ObservationEncoder for FrozenEncoder {
    fn input_shape(&self) -> [usize; 3] {
        self.input_shape
    }

    fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    fn encode(&self, frame: &Frame) -> Result<Vec<f32>, EncodingError> {
        let actual = frame.shape();
        if actual != self.input_shape {
            return Err(EncodingError::ShapeMismatch {
                expected: self.input_shape,
                actual,
            });
        }

        let [height, width, channels] = actual;
        let input = Tensor::<EncoderBackend, 1>::from_data(
            TensorData::from(frame.to_chw().as_slice()),
            &self.device,
        )
        .reshape([1, channels, height, width]);

        self.network
            .forward(input)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| EncodingError::Backend(format!("{e:?}")))
    }
}
