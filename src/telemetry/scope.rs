use tracing::{info, warn};

use super::{EpisodeSnapshot, TelemetryRecorder, DISTANCE, SPEED};
use crate::error::TelemetryError;

/// Episode-long view over a recorder.
///
/// Every step goes through [`EpisodeScope::record`]. When the scope is
/// dropped, normally or while an error propagates, the last snapshot is
/// logged and the recorder is flushed.
pub struct EpisodeScope<'a, R: TelemetryRecorder + ?Sized> {
    recorder: &'a mut R,
    run: String,
    snapshot: EpisodeSnapshot,
}

impl<'a, R: TelemetryRecorder + ?Sized> EpisodeScope<'a, R> {
    pub fn open(recorder: &'a mut R, run: impl Into<String>) -> Self {
        EpisodeScope {
            recorder,
            run: run.into(),
            snapshot: EpisodeSnapshot::default(),
        }
    }

    /// Record distance and speed at `timestep`. Timesteps must increase.
    pub fn record(&mut self, timestep: u64, distance: f64, speed: f64) -> Result<(), TelemetryError> {
        debug_assert!(
            timestep > self.snapshot.timestep,
            "timestep {timestep} recorded after {}",
            self.snapshot.timestep
        );
        self.recorder.add_scalar(DISTANCE, timestep, distance)?;
        self.recorder.add_scalar(SPEED, timestep, speed)?;
        self.snapshot = EpisodeSnapshot {
            timestep,
            distance,
            speed,
        };
        Ok(())
    }

    pub fn snapshot(&self) -> EpisodeSnapshot {
        self.snapshot
    }
}

impl<R: TelemetryRecorder + ?Sized> Drop for EpisodeScope<'_, R> {
    fn drop(&mut self) {
        info!(
            run = %self.run,
            timestep = self.snapshot.timestep,
            distance = self.snapshot.distance,
            speed = self.snapshot.speed,
            "episode telemetry closed"
        );
        if let Err(e) = self.recorder.flush() {
            warn!(run = %self.run, error = %e, "failed to flush telemetry");
        }
    }
}
