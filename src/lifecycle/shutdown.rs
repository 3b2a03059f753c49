//! Shutdown coordination between the lifecycle manager and the transport.

use std::sync::Arc;

use tokio::sync::watch;

/// Actions the lifecycle manager asks of the transport and process.
pub trait ProcessControl: Send + Sync + 'static {
    /// Stop accepting new connections. Open connections are unaffected.
    fn stop_accepting(&self);

    /// Request process termination.
    fn terminate_process(&self);
}

/// Coordinator for shutdown.
///
/// Two latched flags: one the accept loop watches to stop accepting, one
/// the lifecycle run loop watches to exit. Raising a flag before anyone
/// subscribes is not lost.
#[derive(Debug, Clone)]
pub struct Shutdown {
    stop_accepting: Arc<watch::Sender<bool>>,
    exit: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            stop_accepting: Arc::new(watch::channel(false).0),
            exit: Arc::new(watch::channel(false).0),
        }
    }

    /// Subscribe to the stop-accepting flag.
    pub fn accept_stopped(&self) -> watch::Receiver<bool> {
        self.stop_accepting.subscribe()
    }

    /// Subscribe to the exit-request flag.
    pub fn exit_requested(&self) -> watch::Receiver<bool> {
        self.exit.subscribe()
    }

    pub fn is_exit_requested(&self) -> bool {
        *self.exit.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessControl for Shutdown {
    fn stop_accepting(&self) {
        self.stop_accepting.send_replace(true);
    }

    fn terminate_process(&self) {
        self.exit.send_replace(true);
    }
}

/// Resolve once `flag` is raised, or once its sender is gone.
pub async fn raised(flag: &mut watch::Receiver<bool>) {
    loop {
        let set = *flag.borrow_and_update();
        if set {
            return;
        }
        if flag.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn flag_raised_before_subscribe_is_seen() {
        let shutdown = Shutdown::new();
        shutdown.terminate_process();

        let mut exit = shutdown.exit_requested();
        timeout(Duration::from_secs(1), raised(&mut exit)).await.unwrap();
        assert!(shutdown.is_exit_requested());
    }

    #[tokio::test]
    async fn flags_are_independent() {
        let shutdown = Shutdown::new();
        let mut accept = shutdown.accept_stopped();
        let mut exit = shutdown.exit_requested();

        shutdown.stop_accepting();
        timeout(Duration::from_secs(1), raised(&mut accept)).await.unwrap();
        assert!(timeout(Duration::from_millis(50), raised(&mut exit)).await.is_err());
        assert!(!shutdown.is_exit_requested());
    }
}
