use tracing::info;

use crate::env::{DriveInfo, Environment};
use crate::error::{EpisodeError, EpisodeFailure};
use crate::policy::Policy;
use crate::seeding::seed_run;
use crate::telemetry::{EpisodeScope, TelemetryRecorder};

/// Outcome of one evaluation episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeSummary {
    pub timesteps: u64,
    pub distance: f64,
    pub speed: f64,
    /// The environment signalled the end, as opposed to the budget running out.
    pub done: bool,
}

/// Drives one deterministic episode and records distance and speed per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeRunner {
    pub max_timesteps: u64,
    pub seed: u64,
}

impl EpisodeRunner {
    pub fn new(max_timesteps: u64, seed: u64) -> Self {
        EpisodeRunner {
            max_timesteps,
            seed,
        }
    }

    /// Seed, reset, then step until `done` or the budget is spent.
    ///
    /// Errors propagate immediately, carrying the last recorded snapshot.
    /// The recorder is flushed on every exit path.
    pub fn run<E, P, R>(
        &self,
        env: &mut E,
        policy: &mut P,
        recorder: &mut R,
        run: &str,
    ) -> Result<EpisodeSummary, EpisodeError>
    where
        E: Environment<Observation = Vec<f32>, Info = DriveInfo> + ?Sized,
        P: Policy + ?Sized,
        R: TelemetryRecorder + ?Sized,
    {
        let mut scope = EpisodeScope::open(recorder, run);
        let fail = |scope: &EpisodeScope<'_, R>, source: EpisodeFailure| EpisodeError {
            snapshot: scope.snapshot(),
            source,
        };

        seed_run(self.seed, env, policy);
        let mut observation = env.reset().map_err(|e| fail(&scope, e.into()))?;

        let mut done = false;
        let mut timestep = 0u64;
        while timestep < self.max_timesteps {
            let action = policy
                .predict(&observation, true)
                .map_err(|e| fail(&scope, e.into()))?;
            let step = env.step(&action).map_err(|e| fail(&scope, e.into()))?;
            timestep += 1;
            scope
                .record(timestep, step.info.distance, step.info.speed)
                .map_err(|e| fail(&scope, e.into()))?;
            observation = step.observation;

            if step.done {
                done = true;
                info!(run, timestep, distance = step.info.distance, "episode done");
                break;
            }
        }

        let snapshot = scope.snapshot();
        Ok(EpisodeSummary {
            timesteps: snapshot.timestep,
            distance: snapshot.distance,
            speed: snapshot.speed,
            done,
        })
    }
}
