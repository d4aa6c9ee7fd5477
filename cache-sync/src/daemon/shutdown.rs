//! Signal handling for SIGTERM and SIGINT.
//!
//! A signal cancels the run's token: no new files or dates are started, uploads
//! already in flight finish, and the manifest is flushed before the engine
//! returns its summary.

use std::io;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Turns the first termination signal into a cancellation.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Token handed to the engine.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for SIGINT or SIGTERM, then cancel the token.
    pub async fn wait_for_signal(&self) -> io::Result<()> {
        #[cfg(unix)]
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;

        #[cfg(unix)]
        let terminate = terminate.recv();

        #[cfg(not(unix))]
        let terminate = std::future::pending::<Option<()>>();

        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received SIGINT (Ctrl+C), finishing in-flight uploads...");
            }
            _ = terminate => {
                info!("Received SIGTERM, finishing in-flight uploads...");
            }
            _ = self.token.cancelled() => {
                return Ok(());
            }
        }

        self.token.cancel();
        Ok(())
    }

    /// Spawn the signal listener on the runtime.
    pub fn listen(self) -> CancellationToken {
        let token = self.token();
        tokio::spawn(async move {
            if let Err(e) = self.wait_for_signal().await {
                tracing::warn!("Signal handling unavailable: {}", e);
            }
        });
        token
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
