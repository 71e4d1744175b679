//! Write-only scalar telemetry.
//!
//! A [`TelemetryRecorder`] receives `(tag, step, value)` triples and persists
//! them somewhere. One recorder is created per trained or evaluated artifact.
//! [`EpisodeScope`] wraps a recorder for the duration of one episode and
//! guarantees the final snapshot is reported on every exit path.

mod memory;
mod scope;
mod tensorboard;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;

pub use memory::MemoryRecorder;
pub use scope::EpisodeScope;
pub use tensorboard::TensorboardRecorder;

/// Metric name for cumulative distance travelled in an episode.
pub const DISTANCE: &str = "distance";
/// Metric name for the last reported vehicle speed.
pub const SPEED: &str = "speed";

/// One recorded scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub tag: String,
    pub step: u64,
    pub value: f64,
}

/// Append-only sink for named scalar time series.
pub trait TelemetryRecorder {
    fn add_scalar(&mut self, tag: &str, step: u64, value: f64) -> Result<(), TelemetryError>;

    /// Push buffered records toward the sink. Sinks that write on a
    /// background thread may only be durable once the recorder is dropped.
    fn flush(&mut self) -> Result<(), TelemetryError>;
}

impl<R: TelemetryRecorder + ?Sized> TelemetryRecorder for &mut R {
    fn add_scalar(&mut self, tag: &str, step: u64, value: f64) -> Result<(), TelemetryError> {
        (**self).add_scalar(tag, step, value)
    }

    fn flush(&mut self) -> Result<(), TelemetryError> {
        (**self).flush()
    }
}

impl<R: TelemetryRecorder + ?Sized> TelemetryRecorder for Box<R> {
    fn add_scalar(&mut self, tag: &str, step: u64, value: f64) -> Result<(), TelemetryError> {
        (**self).add_scalar(tag, step, value)
    }

    fn flush(&mut self) -> Result<(), TelemetryError> {
        (**self).flush()
    }
}

/// Last known per-step telemetry of an episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSnapshot {
    pub timestep: u64,
    pub distance: f64,
    pub speed: f64,
}

impl fmt::Display for EpisodeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timestep {} (distance {:.3}, speed {:.3})",
            self.timestep, self.distance, self.speed
        )
    }
}
