use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::env::{DriveInfo, Environment};
use crate::error::TrainingError;
use crate::policy::TrainablePolicy;
use crate::telemetry::TelemetryRecorder;

/// Scalar tag written once when a session finalizes.
pub const COMPLETED: &str = "training/completed";

/// Owns everything a training run touches and releases it exactly once.
///
/// Finalization saves the model to `model_path`, closes the environment,
/// records [`COMPLETED`] and flushes the recorder, then logs "Finished".
/// It runs on an explicit [`finalize`](Self::finalize) call, or from `Drop`
/// if the loop unwinds before reaching it.
pub struct TrainingSession<E, A, R>
where
    E: Environment<Observation = Vec<f32>, Info = DriveInfo>,
    A: TrainablePolicy,
    R: TelemetryRecorder,
{
    env: E,
    agent: A,
    recorder: R,
    model_path: PathBuf,
    timesteps: u64,
    finalized: bool,
}

impl<E, A, R> TrainingSession<E, A, R>
where
    E: Environment<Observation = Vec<f32>, Info = DriveInfo>,
    A: TrainablePolicy,
    R: TelemetryRecorder,
{
    pub fn new(env: E, agent: A, recorder: R, model_path: &Path) -> Self {
        TrainingSession {
            env,
            agent,
            recorder,
            model_path: model_path.to_path_buf(),
            timesteps: 0,
            finalized: false,
        }
    }

    /// Borrow the environment, agent and recorder together.
    pub fn parts(&mut self) -> (&mut E, &mut A, &mut R) {
        (&mut self.env, &mut self.agent, &mut self.recorder)
    }

    /// Last completed environment step; the completion marker is recorded here.
    pub fn timesteps(&self) -> u64 {
        self.timesteps
    }

    pub fn set_timesteps(&mut self, timesteps: u64) {
        self.timesteps = timesteps;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Run finalization. Every step is attempted even if an earlier one
    /// fails; the first failure is returned. Calling it again is a no-op
    /// returning the would-be model path.
    pub fn finalize(&mut self) -> Result<PathBuf, TrainingError> {
        if self.finalized {
            return Ok(self.model_path.clone());
        }
        self.finalized = true;

        let step = self.timesteps;
        let saved = self.agent.save(&self.model_path);
        match &saved {
            Ok(path) => info!(path = %path.display(), step, "final model saved"),
            Err(e) => error!(path = %self.model_path.display(), error = %e, "cannot save final model"),
        }

        let closed = self.env.close();
        match &closed {
            Ok(()) => info!("environment closed"),
            Err(e) => error!(error = %e, "cannot close environment"),
        }

        let marked = self
            .recorder
            .add_scalar(COMPLETED, step, 1.0)
            .and_then(|()| self.recorder.flush());
        if let Err(e) = &marked {
            error!(error = %e, "cannot record completion marker");
        }

        info!(step, "Finished");

        let path = saved?;
        closed.map_err(|source| TrainingError::Env { step, source })?;
        marked?;
        Ok(path)
    }
}

impl<E, A, R> Drop for TrainingSession<E, A, R>
where
    E: Environment<Observation = Vec<f32>, Info = DriveInfo>,
    A: TrainablePolicy,
    R: TelemetryRecorder,
{
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        if std::thread::panicking() {
            warn!(step = self.timesteps, "training aborted by a panic, finalizing");
        }
        if let Err(e) = self.finalize() {
            error!(error = %e, "finalization during drop failed");
        }
    }
}
