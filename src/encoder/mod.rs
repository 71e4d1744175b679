//! Observation encoding: raw camera frames in, fixed-length latent vectors out.

mod frozen;
mod network;

pub use frozen::FrozenEncoder;
pub use network::{conv_stack_output, ConvEncoder, ConvEncoderConfig};

use crate::error::EncodingError;

/// A raw camera observation, stored height × width × channels with values
/// scaled to `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    height: usize,
    width: usize,
    channels: usize,
    pixels: Vec<f32>,
}

impl Frame {
    pub fn new(
        height: usize,
        width: usize,
        channels: usize,
        pixels: Vec<f32>,
    ) -> Result<Self, EncodingError> {
        let expected = height * width * channels;
        if pixels.len() != expected {
            return Err(EncodingError::MalformedFrame {
                shape: [height, width, channels],
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Frame {
            height,
            width,
            channels,
            pixels,
        })
    }

    pub fn zeros(height: usize, width: usize, channels: usize) -> Self {
        Frame {
            height,
            width,
            channels,
            pixels: vec![0.0; height * width * channels],
        }
    }

    /// Build a frame from interleaved 8-bit RGB bytes.
    pub fn from_rgb8(height: usize, width: usize, bytes: &[u8]) -> Result<Self, EncodingError> {
        let pixels = bytes.iter().map(|&b| b as f32 / 255.0).collect();
        Frame::new(height, width, 3, pixels)
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Pixel data reordered channel-major (C × H × W), the layout the
    /// convolution stack consumes.
    pub fn to_chw(&self) -> Vec<f32> {
        let plane = self.height * self.width;
        let mut out = vec![0.0f32; self.pixels.len()];
        for (i, &v) in self.pixels.iter().enumerate() {
            let pixel = i / self.channels;
            let channel = i % self.channels;
            out[channel * plane + pixel] = v;
        }
        out
    }
}

/// Frozen mapping from a [`Frame`] to a latent vector.
///
/// Implementations hold read-only weights and keep no state between calls.
pub trait ObservationEncoder {
    /// Expected `[height, width, channels]` of incoming frames.
    fn input_shape(&self) -> [usize; 3];

    fn latent_dim(&self) -> usize;

    fn encode(&self, frame: &Frame) -> Result<Vec<f32>, EncodingError>;
}
