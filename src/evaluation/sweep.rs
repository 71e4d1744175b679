use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::episode::{EpisodeRunner, EpisodeSummary};
use crate::checkpoint::{discover_checkpoints, CheckpointEntry};
use crate::env::{DriveInfo, Environment};
use crate::error::{CheckpointError, SweepError, TelemetryError};
use crate::policy::Policy;
use crate::telemetry::TelemetryRecorder;

/// Result of evaluating one checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointResult {
    pub checkpoint: CheckpointEntry,
    /// Telemetry namespace, `<run_prefix>-<index>`.
    pub run: String,
    pub summary: EpisodeSummary,
}

/// All checkpoints evaluated, in visit order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub results: Vec<CheckpointResult>,
}

impl SweepReport {
    /// The checkpoint that drove furthest, if any.
    pub fn best_by_distance(&self) -> Option<&CheckpointResult> {
        self.results
            .iter()
            .max_by(|a, b| a.summary.distance.total_cmp(&b.summary.distance))
    }
}

/// Evaluates every checkpoint in a directory, one episode each, in ascending
/// step order.
#[derive(Debug, Clone)]
pub struct CheckpointSweep {
    pub dir: PathBuf,
    pub runner: EpisodeRunner,
    pub run_prefix: String,
}

impl CheckpointSweep {
    pub fn new(dir: impl Into<PathBuf>, runner: EpisodeRunner, run_prefix: impl Into<String>) -> Self {
        CheckpointSweep {
            dir: dir.into(),
            runner,
            run_prefix: run_prefix.into(),
        }
    }

    /// Run the sweep over `env`, which is closed before returning whatever the
    /// outcome.
    ///
    /// `load_policy` builds a fresh policy per checkpoint and `make_recorder`
    /// a fresh recorder per run namespace. A failed episode aborts the sweep.
    pub fn run<E, P, R, L, M>(
        &self,
        mut env: E,
        mut load_policy: L,
        mut make_recorder: M,
    ) -> Result<SweepReport, SweepError>
    where
        E: Environment<Observation = Vec<f32>, Info = DriveInfo>,
        P: Policy,
        R: TelemetryRecorder,
        L: FnMut(&Path) -> Result<P, CheckpointError>,
        M: FnMut(&str) -> Result<R, TelemetryError>,
    {
        let outcome = self.visit_all(&mut env, &mut load_policy, &mut make_recorder);
        let closed = env.close();

        match (outcome, closed) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(e)) => Err(SweepError::Close(e)),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!(error = %close_err, "failed to close environment after sweep failure");
                Err(e)
            }
        }
    }

    fn visit_all<E, P, R, L, M>(
        &self,
        env: &mut E,
        load_policy: &mut L,
        make_recorder: &mut M,
    ) -> Result<SweepReport, SweepError>
    where
        E: Environment<Observation = Vec<f32>, Info = DriveInfo>,
        P: Policy,
        R: TelemetryRecorder,
        L: FnMut(&Path) -> Result<P, CheckpointError>,
        M: FnMut(&str) -> Result<R, TelemetryError>,
    {
        let entries = discover_checkpoints(&self.dir)?;
        info!(dir = %self.dir.display(), count = entries.len(), "starting checkpoint sweep");

        let mut report = SweepReport::default();
        for (index, entry) in (1usize..).zip(entries) {
            if !entry.path.is_file() {
                warn!(path = %entry.path.display(), "checkpoint vanished before evaluation, skipping");
                continue;
            }
            let run = format!("{}-{}", self.run_prefix, index);
            info!(checkpoint = %entry.name, step = entry.step, run = %run, "evaluating checkpoint");

            let mut policy = load_policy(&entry.path)?;
            let mut recorder = make_recorder(&run).map_err(|source| SweepError::Recorder {
                checkpoint: entry.path.clone(),
                source,
            })?;

            let summary = self
                .runner
                .run(env, &mut policy, &mut recorder, &run)
                .map_err(|source| SweepError::Episode {
                    checkpoint: entry.path.clone(),
                    source,
                })?;

            info!(
                checkpoint = %entry.name,
                timesteps = summary.timesteps,
                distance = summary.distance,
                speed = summary.speed,
                "checkpoint evaluated"
            );
            report.results.push(CheckpointResult {
                checkpoint: entry,
                run,
                summary,
            });
        }
        Ok(report)
    }
}
