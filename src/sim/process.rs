use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::EnvError;

/// A simulator child process, killed when dropped.
#[derive(Debug)]
pub struct SimProcess {
    child: Child,
    path: PathBuf,
}

impl SimProcess {
    /// Start `path --port <port>` and give it `start_delay` to open its socket.
    pub fn spawn(path: &Path, port: u16, start_delay: Duration) -> Result<Self, EnvError> {
        let child = Command::new(path)
            .arg("--port")
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| EnvError::Launch {
                path: path.to_path_buf(),
                source,
            })?;
        info!(path = %path.display(), port, pid = child.id(), "launched simulator");
        thread::sleep(start_delay);
        Ok(SimProcess {
            child,
            path: path.to_path_buf(),
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }
}

impl Drop for SimProcess {
    fn drop(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                info!(path = %self.path.display(), %status, "simulator already exited");
                return;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "cannot query simulator status"),
        }
        if let Err(e) = self.child.kill() {
            warn!(path = %self.path.display(), error = %e, "failed to stop simulator");
        }
        let _ = self.child.wait();
    }
}
