//! Interrupt-driven shutdown coordination.
//!
//! Process-wide state machine `Running -> ShuttingDown -> Stopped` with a
//! single writer. Observers either read the state or await the shutdown
//! token; signal handlers never mutate anything beyond the first transition.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Process-wide lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    ShuttingDown,
    Stopped,
}

/// Coordinates orderly shutdown across the pool and in-flight jobs.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<LifecycleState>,
    shutdown: CancellationToken,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Running),
            shutdown: CancellationToken::new(),
        }
    }
}

impl Lifecycle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Transition to `ShuttingDown`. Idempotent: only the first call returns
    /// `true` and cancels the shutdown token; repeat signals are no-ops.
    pub fn begin_shutdown(&self) -> bool {
        let mut state = self.state.lock();
        if *state != LifecycleState::Running {
            return false;
        }
        *state = LifecycleState::ShuttingDown;
        drop(state);

        self.shutdown.cancel();
        true
    }

    /// Mark the shutdown sequence finished.
    pub fn mark_stopped(&self) {
        *self.state.lock() = LifecycleState::Stopped;
    }

    /// Resolves once shutdown has been requested.
    pub async fn shutdown_requested(&self) {
        self.shutdown.cancelled().await
    }

    /// Spawn a listener that turns SIGINT/SIGTERM into a shutdown request.
    ///
    /// The first signal starts the sequence; later signals are logged and
    /// ignored rather than restarting it.
    pub fn install_signal_handler(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                wait_for_signal().await;
                if self.begin_shutdown() {
                    tracing::info!("Shutdown signal received");
                } else {
                    tracing::debug!("Ignoring repeat shutdown signal");
                }
            }
        });
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Running);
        assert!(lifecycle.is_running());
    }

    #[test]
    fn begin_shutdown_is_idempotent() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.begin_shutdown());
        assert_eq!(lifecycle.state(), LifecycleState::ShuttingDown);
        // A second request does not restart the sequence.
        assert!(!lifecycle.begin_shutdown());

        lifecycle.mark_stopped();
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        assert!(!lifecycle.begin_shutdown());
    }

    #[tokio::test]
    async fn shutdown_request_resolves_observers() {
        let lifecycle = Lifecycle::new();
        let observer = {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move {
                lifecycle.shutdown_requested().await;
            })
        };

        lifecycle.begin_shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(1), observer)
            .await
            .expect("observer should resolve")
            .unwrap();
    }
}
