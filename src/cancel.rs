use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Cooperative stop flag shared between the interrupt listener and the harvest loop.
/// Starts out running and can only ever be switched off.
#[derive(Debug, Clone)]
pub struct CancelToken {
    running: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.running.store(false, Ordering::Release);
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Trips `token` on the first Ctrl-C. The harvest loop notices at its next iteration and
/// flushes before returning.
pub fn listen_for_interrupt(token: CancelToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received. Saving buffer...");
                token.cancel();
            }
            Err(err) => error!("Couldn't listen for Ctrl-C: {err}"),
        }
    })
}
