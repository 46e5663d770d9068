//! Graceful shutdown coordination
//!
//! SIGTERM/SIGINT flips a watch flag; consumers stop taking new jobs and
//! drain in-flight work within the grace period. Aborted jobs stay
//! retryable through the normal failed path.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Grace period for draining in-flight jobs
pub const DRAIN_GRACE_SECS: u64 = 30;

pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Receiver for worker loops; `true` means stop taking new jobs
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        if !*self.tx.borrow() {
            info!("shutdown requested");
            let _ = self.tx.send(true);
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve when shutdown has been requested
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Install OS signal handlers that trigger the coordinator
pub async fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let on_sigterm = coordinator.clone();
        tokio::spawn(async move {
            if let Ok(mut stream) = signal(SignalKind::terminate()) {
                stream.recv().await;
                info!("received SIGTERM");
                on_sigterm.trigger();
            }
        });

        let on_sigint = coordinator;
        tokio::spawn(async move {
            if let Ok(mut stream) = signal(SignalKind::interrupt()) {
                stream.recv().await;
                info!("received SIGINT");
                on_sigint.trigger();
            }
        });
    }

    #[cfg(windows)]
    {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received Ctrl+C");
                coordinator.trigger();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_flips_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let rx = coordinator.subscribe();
        assert!(!*rx.borrow());
        assert!(!coordinator.is_triggered());

        coordinator.trigger();
        assert!(coordinator.is_triggered());
        assert!(*rx.borrow());

        // Duplicate triggers are harmless
        coordinator.trigger();
        assert!(coordinator.is_triggered());
    }

    #[tokio::test]
    async fn test_wait_resolves_after_trigger() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let waiter = coordinator.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });
        coordinator.trigger();
        handle.await.unwrap();
    }
}
