mod manager;
mod naming;

pub use manager::{discover_checkpoints, CheckpointEntry, CheckpointWriter};
pub use naming::{checkpoint_stem, embedded_step, is_temporary, weights_file, WEIGHTS_EXTENSION};
