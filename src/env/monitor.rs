use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::{Environment, Step};
use crate::error::{EnvError, TelemetryError};
use crate::policy::Action;

/// File the monitor appends to inside its directory.
pub const MONITOR_FILE: &str = "monitor.jsonl";

/// One finished episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub reward: f64,
    pub length: u64,
    /// Seconds since the monitor was created.
    pub elapsed_secs: f64,
}

/// Pass-through wrapper logging episode returns and lengths as JSON lines.
pub struct EpisodeMonitor<E: Environment> {
    inner: E,
    writer: BufWriter<File>,
    started: Instant,
    reward: f64,
    length: u64,
}

impl<E: Environment> EpisodeMonitor<E> {
    pub fn create(inner: E, dir: &Path) -> Result<Self, TelemetryError> {
        fs::create_dir_all(dir).map_err(|source| TelemetryError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(MONITOR_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(EpisodeMonitor {
            inner,
            writer: BufWriter::new(file),
            started: Instant::now(),
            reward: 0.0,
            length: 0,
        })
    }

    fn finish_episode(&mut self) -> Result<(), EnvError> {
        let record = EpisodeRecord {
            reward: self.reward,
            length: self.length,
            elapsed_secs: self.started.elapsed().as_secs_f64(),
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| EnvError::Protocol(format!("cannot encode monitor record: {e}")))?;
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<E: Environment> Environment for EpisodeMonitor<E> {
    type Observation = E::Observation;
    type Info = E::Info;

    fn reset(&mut self) -> Result<E::Observation, EnvError> {
        self.reward = 0.0;
        self.length = 0;
        self.inner.reset()
    }

    fn step(&mut self, action: &Action) -> Result<Step<E::Observation, E::Info>, EnvError> {
        let step = self.inner.step(action)?;
        self.reward += step.reward;
        self.length += 1;
        if step.done {
            self.finish_episode()?;
        }
        Ok(step)
    }

    fn seed(&mut self, seed: u64) {
        self.inner.seed(seed);
    }

    fn close(&mut self) -> Result<(), EnvError> {
        self.writer.flush()?;
        self.inner.close()
    }
}
