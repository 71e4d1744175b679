use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::naming::{checkpoint_stem, embedded_step, is_temporary, WEIGHTS_EXTENSION};
use crate::error::CheckpointError;
use crate::policy::TrainablePolicy;

/// A usable checkpoint file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointEntry {
    pub path: PathBuf,
    pub name: String,
    pub step: u64,
}

/// List the checkpoints in `dir`, ascending by embedded step, ties broken by
/// file name.
///
/// Directories, hidden files and names without digits are skipped with a
/// warning. An empty result is an error.
pub fn discover_checkpoints(dir: &Path) -> Result<Vec<CheckpointEntry>, CheckpointError> {
    if !dir.is_dir() {
        return Err(CheckpointError::DirNotFound(dir.to_path_buf()));
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        if is_temporary(&name) {
            debug!(name, "skipping unfinished checkpoint write");
            continue;
        }
        if name.starts_with('.') {
            warn!(path = %path.display(), "skipping hidden checkpoint entry");
            continue;
        }
        if !path.is_file() {
            warn!(path = %path.display(), "skipping non-file checkpoint entry");
            continue;
        }
        let Some(step) = embedded_step(&name) else {
            warn!(path = %path.display(), "skipping checkpoint without a numeric step in its name");
            continue;
        };
        entries.push(CheckpointEntry { path, name, step });
    }

    if entries.is_empty() {
        return Err(CheckpointError::NoCheckpointsFound(dir.to_path_buf()));
    }
    entries.sort_by(|a, b| a.step.cmp(&b.step).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

/// Saves a checkpoint every `interval` steps as `<prefix>_<step>_steps`.
#[derive(Debug, Clone)]
pub struct CheckpointWriter {
    dir: PathBuf,
    prefix: String,
    interval: u64,
}

impl CheckpointWriter {
    /// Creates `dir` if needed.
    pub fn new(dir: &Path, prefix: &str, interval: u64) -> Result<Self, CheckpointError> {
        fs::create_dir_all(dir)?;
        Ok(CheckpointWriter {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            interval: interval.max(1),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn should_save(&self, step: u64) -> bool {
        step > 0 && step % self.interval == 0
    }

    /// Write the policy under a hidden temporary name, then rename it into
    /// place so readers never see a partial file.
    pub fn save<P>(&self, policy: &P, step: u64) -> Result<PathBuf, CheckpointError>
    where
        P: TrainablePolicy + ?Sized,
    {
        let stem = checkpoint_stem(&self.prefix, step);
        let written = policy.save(&self.dir.join(format!(".{stem}_tmp.{WEIGHTS_EXTENSION}")))?;
        let final_path = self.dir.join(format!("{stem}.{WEIGHTS_EXTENSION}"));
        if final_path.exists() {
            fs::remove_file(&final_path)?;
        }
        fs::rename(&written, &final_path)?;
        info!(path = %final_path.display(), step, algorithm = policy.algorithm_name(), "checkpoint saved");
        Ok(final_path)
    }
}
