//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGUSR1)
//! - Translate signals to [`LifecycleSignal`] events for the lifecycle manager
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers only forward; every decision is a lifecycle state transition
//! - On non-unix platforms only Ctrl-C is available, mapped to interrupt

use std::fmt;

use tokio::sync::mpsc;

/// A process-level request delivered to the lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// Orderly termination (SIGTERM): clean up, then exit.
    Terminate,
    /// Interactive interrupt (SIGINT): request exit.
    Interrupt,
    /// Graceful stop (SIGUSR1): stop accepting, exit once drained.
    GracefulStop,
}

impl LifecycleSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleSignal::Terminate => "SIGTERM",
            LifecycleSignal::Interrupt => "SIGINT",
            LifecycleSignal::GracefulStop => "SIGUSR1",
        }
    }
}

impl fmt::Display for LifecycleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install OS signal handlers and forward them on the returned channel.
///
/// Handlers are registered before this returns, so a failure to install
/// any of them is reported here rather than lost in a background task.
#[cfg(unix)]
pub fn spawn_signal_listener() -> std::io::Result<mpsc::UnboundedReceiver<LifecycleSignal>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = sigterm.recv() => LifecycleSignal::Terminate,
                Some(()) = sigint.recv() => LifecycleSignal::Interrupt,
                Some(()) = sigusr1.recv() => LifecycleSignal::GracefulStop,
                else => break,
            };
            tracing::debug!(signal = %received, "OS signal received");
            if tx.send(received).is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

#[cfg(not(unix))]
pub fn spawn_signal_listener() -> std::io::Result<mpsc::UnboundedReceiver<LifecycleSignal>> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(LifecycleSignal::Interrupt).is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_names() {
        assert_eq!(LifecycleSignal::Terminate.to_string(), "SIGTERM");
        assert_eq!(LifecycleSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(LifecycleSignal::GracefulStop.to_string(), "SIGUSR1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn listener_installs_handlers() {
        let mut rx = spawn_signal_listener().unwrap();
        assert!(rx.try_recv().is_err());
    }
}
