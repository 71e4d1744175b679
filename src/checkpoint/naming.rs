use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Extension of serialized network weights.
pub const WEIGHTS_EXTENSION: &str = "mpk";

/// Step count embedded in a checkpoint file name: the last contiguous run of
/// ASCII digits in the file stem, read as base 10.
///
/// `donkey_model_38000_steps.mpk` gives 38000. Names without digits, or
/// whose digits overflow `u64`, give `None`.
pub fn embedded_step(name: &str) -> Option<u64> {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);

    let bytes = stem.as_bytes();
    let end = bytes.iter().rposition(u8::is_ascii_digit)? + 1;
    let start = bytes[..end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map_or(0, |i| i + 1);
    stem[start..end].parse().ok()
}

/// File name for the checkpoint saved at `step`, without extension.
pub fn checkpoint_stem(prefix: &str, step: u64) -> String {
    format!("{prefix}_{step}_steps")
}

/// Weights file for a model path: `.mpk` is appended unless already present.
///
/// Dots in the stem are kept, so `ppo.v1` becomes `ppo.v1.mpk` rather than
/// `ppo.mpk`.
pub fn weights_file(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == WEIGHTS_EXTENSION) {
        return path.to_path_buf();
    }
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(WEIGHTS_EXTENSION);
    PathBuf::from(name)
}

/// Hidden scratch file left by an interrupted checkpoint write.
pub fn is_temporary(name: &str) -> bool {
    name.starts_with('.')
        && Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| stem.ends_with("_tmp"))
}
