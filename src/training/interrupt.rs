use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{error, warn};

/// Cooperative stop request shared between a signal handler and the
/// training loop, which checks it once per step.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Set this flag on the first Ctrl-C.
    ///
    /// The signal is awaited on a helper thread running a single-threaded
    /// tokio runtime, so the training loop itself stays synchronous.
    pub fn install_ctrl_c_handler(&self) -> std::io::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()?;
        let flag = self.clone();
        thread::Builder::new()
            .name("ctrl-c".into())
            .spawn(move || {
                runtime.block_on(async {
                    match tokio::signal::ctrl_c().await {
                        Ok(()) => {
                            warn!("interrupt received, stopping after the current step");
                            flag.request_stop();
                        }
                        Err(e) => error!(error = %e, "cannot listen for Ctrl-C"),
                    }
                });
            })?;
        Ok(())
    }
}
