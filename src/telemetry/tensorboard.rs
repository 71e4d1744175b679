use std::fs;
use std::path::{Path, PathBuf};

use tensorboard_rs::summary_writer::SummaryWriter;

use super::TelemetryRecorder;
use crate::error::TelemetryError;

/// Recorder writing TensorBoard event files under `<root>/<run>`.
///
/// Events are written by a background thread. [`flush`](TelemetryRecorder::flush)
/// only queues a flush request; the event file is complete once the recorder
/// is dropped.
pub struct TensorboardRecorder {
    writer: SummaryWriter,
    log_dir: PathBuf,
}

impl TensorboardRecorder {
    pub fn create(root: &Path, run: &str) -> Result<Self, TelemetryError> {
        let log_dir = root.join(run);
        fs::create_dir_all(&log_dir).map_err(|source| TelemetryError::CreateDir {
            path: log_dir.clone(),
            source,
        })?;
        Ok(TensorboardRecorder {
            writer: SummaryWriter::new(&log_dir),
            log_dir,
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

impl TelemetryRecorder for TensorboardRecorder {
    fn add_scalar(&mut self, tag: &str, step: u64, value: f64) -> Result<(), TelemetryError> {
        self.writer.add_scalar(tag, value as f32, step as usize);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TelemetryError> {
        self.writer.flush();
        Ok(())
    }
}
