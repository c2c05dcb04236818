//! Shutdown signals
//!
//! The agent stops on CTRL+C and, on unix, on SIGTERM (`systemctl stop`,
//! `docker stop`).

use tracing::{error, info};

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

use crate::error::Result;

/// Registered process shutdown signals
#[derive(Debug)]
pub struct ShutdownSignal {
    #[cfg(unix)]
    sigterm: Signal,
}

impl ShutdownSignal {
    /// Install the handlers. Must be called from within a tokio runtime.
    ///
    /// Once installed, SIGTERM no longer ends the process on its own.
    pub fn install() -> Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    /// Resolve when the first shutdown signal arrives
    pub async fn recv(&mut self) {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = ctrl_c() => {}
                _ = self.sigterm.recv() => info!("Received SIGTERM"),
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c().await;
        }
    }
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received CTRL+C"),
        Err(e) => error!("Failed to listen for CTRL+C: {}", e),
    }
}
