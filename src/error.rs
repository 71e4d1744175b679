use std::path::PathBuf;

use crate::telemetry::EpisodeSnapshot;

/// Errors raised while turning a raw frame into a latent vector.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("observation shape {actual:?} does not match encoder input shape {expected:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        actual: [usize; 3],
    },

    #[error("frame holds {actual} values but its shape {shape:?} needs {expected}")]
    MalformedFrame {
        shape: [usize; 3],
        expected: usize,
        actual: usize,
    },

    #[error("failed to load encoder weights from {path}: {message}")]
    Weights { path: PathBuf, message: String },

    #[error("encoder backend error: {0}")]
    Backend(String),
}

/// Errors raised by an environment (raw simulator or a wrapper around it).
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("telemetry field '{field}' missing from step info")]
    TelemetryUnavailable { field: &'static str },

    #[error("cannot reach simulator at {endpoint}: {source}")]
    SimulatorConnection {
        endpoint: String,
        source: std::io::Error,
    },

    #[error("simulator closed the connection")]
    SimulatorClosed,

    #[error("simulator protocol error: {0}")]
    Protocol(String),

    #[error("failed to launch simulator {path}: {source}")]
    Launch {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("environment already closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnvError {
    /// True when the failure means the simulator is unreachable or went away.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            EnvError::SimulatorConnection { .. } | EnvError::SimulatorClosed
        )
    }
}

/// Errors raised by a policy while acting or learning.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("observation has {actual} features, policy expects {expected}")]
    ObservationSize { expected: usize, actual: usize },

    #[error("policy inference failed: {0}")]
    Inference(String),

    #[error("rollout is empty")]
    EmptyRollout,
}

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint directory not found: {0}")]
    DirNotFound(PathBuf),

    #[error("no usable checkpoints found in {0}")]
    NoCheckpointsFound(PathBuf),

    #[error("failed to save model to {path}: {message}")]
    ModelSave { path: PathBuf, message: String },

    #[error("failed to load model from {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a telemetry sink.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to create telemetry directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Cause of a failed episode.
#[derive(Debug, thiserror::Error)]
pub enum EpisodeFailure {
    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

/// A failed episode together with the last telemetry seen before the failure.
#[derive(Debug, thiserror::Error)]
#[error("episode failed at {snapshot}: {source}")]
pub struct EpisodeError {
    pub snapshot: EpisodeSnapshot,
    #[source]
    pub source: EpisodeFailure,
}

/// Errors that abort a checkpoint sweep.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("checkpoint {checkpoint} failed: {source}")]
    Episode {
        checkpoint: PathBuf,
        #[source]
        source: EpisodeError,
    },

    #[error("telemetry for checkpoint {checkpoint} unavailable: {source}")]
    Recorder {
        checkpoint: PathBuf,
        #[source]
        source: TelemetryError,
    },

    #[error("failed to close environment: {0}")]
    Close(#[source] EnvError),
}

impl SweepError {
    /// Last telemetry snapshot, when the sweep died inside an episode.
    pub fn snapshot(&self) -> Option<&EpisodeSnapshot> {
        match self {
            SweepError::Episode { source, .. } => Some(&source.snapshot),
            _ => None,
        }
    }
}

/// Errors that can occur during training.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("environment error at step {step}: {source}")]
    Env {
        step: u64,
        #[source]
        source: EnvError,
    },

    #[error("policy error at step {step}: {source}")]
    Policy {
        step: u64,
        #[source]
        source: PolicyError,
    },

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("finalization failed: {0}")]
    Finalization(String),
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}
