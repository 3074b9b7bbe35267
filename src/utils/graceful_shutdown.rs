use std::sync::{Arc, OnceLock};

use eyre::Result;
use tokio::{signal, sync::broadcast};

/// Why the process is stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGTERM / SIGINT
    Signal,
    /// Requested from inside the process (tests, embedders)
    Requested,
    /// The shutdown channel went away without a reason
    Force,
}

/// Broadcasts a single shutdown event to every listener.
pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<ShutdownReason>,
    reason: Arc<OnceLock<ShutdownReason>>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// Check if shutdown has been initiated
    pub fn is_shutdown_initiated(&self) -> bool {
        self.reason.get().is_some()
    }

    /// Trigger shutdown; later calls are ignored
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        if self.reason.set(reason).is_ok() {
            tracing::info!("Shutdown triggered: {:?}", reason);
            // No subscribers is fine: tokens read the stored reason first.
            let _ = self.shutdown_tx.send(reason);
        } else {
            tracing::debug!("Shutdown already initiated, ignoring {:?}", reason);
        }
    }

    /// Wait for SIGINT or SIGTERM and trigger shutdown
    pub async fn run_signal_handler(&self) -> Result<()> {
        tracing::info!("Signal handler started. Listening for SIGTERM and SIGINT");

        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                tracing::info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            result = wait_for_sigterm() => {
                result?;
                tracing::info!("Received SIGTERM, shutting down...");
            }
        }

        self.trigger_shutdown(ShutdownReason::Signal);
        Ok(())
    }

    /// Create a token that resolves once shutdown is triggered
    pub fn shutdown_token(&self) -> ShutdownToken {
        ShutdownToken {
            receiver: self.shutdown_tx.subscribe(),
            reason: self.reason.clone(),
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> std::io::Result<()> {
    // Only Ctrl+C exists off unix
    std::future::pending::<std::io::Result<()>>().await
}

/// A handle that waits for the shutdown broadcast
pub struct ShutdownToken {
    receiver: broadcast::Receiver<ShutdownReason>,
    reason: Arc<OnceLock<ShutdownReason>>,
}

impl Clone for ShutdownToken {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.resubscribe(),
            reason: self.reason.clone(),
        }
    }
}

impl ShutdownToken {
    pub fn is_shutdown_initiated(&self) -> bool {
        self.reason.get().is_some()
    }

    /// Resolve once shutdown has been triggered (immediately if it already was)
    pub async fn wait_for_shutdown(mut self) -> ShutdownReason {
        if let Some(reason) = self.reason.get() {
            return *reason;
        }
        match self.receiver.recv().await {
            Ok(reason) => reason,
            Err(_) => self.reason.get().copied().unwrap_or(ShutdownReason::Force),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_graceful_shutdown_creation() {
        let shutdown = GracefulShutdown::new();
        assert!(!shutdown.is_shutdown_initiated());
    }

    #[tokio::test]
    async fn test_token_resolves_on_trigger() {
        let shutdown = GracefulShutdown::new();
        let token = shutdown.shutdown_token();
        let waiter = tokio::spawn(token.wait_for_shutdown());

        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.trigger_shutdown(ShutdownReason::Requested);

        assert_eq!(waiter.await.unwrap(), ShutdownReason::Requested);
        assert!(shutdown.is_shutdown_initiated());
    }

    #[tokio::test]
    async fn test_token_created_after_trigger_resolves() {
        let shutdown = GracefulShutdown::new();
        shutdown.trigger_shutdown(ShutdownReason::Signal);

        let token = shutdown.shutdown_token();
        assert!(token.is_shutdown_initiated());
        assert_eq!(token.wait_for_shutdown().await, ShutdownReason::Signal);
    }

    #[tokio::test]
    async fn test_second_trigger_is_ignored() {
        let shutdown = GracefulShutdown::new();
        let token = shutdown.shutdown_token();

        shutdown.trigger_shutdown(ShutdownReason::Signal);
        shutdown.trigger_shutdown(ShutdownReason::Requested);

        assert_eq!(token.clone().wait_for_shutdown().await, ShutdownReason::Signal);
        assert_eq!(token.wait_for_shutdown().await, ShutdownReason::Signal);
    }
}
