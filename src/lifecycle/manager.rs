//! Lifecycle state machine.
//!
//! ```text
//! Starting ──on_listening──▶ Listening ──run──▶ Running ──SIGUSR1──▶ Draining
//!                                                  │                    │
//!                                                  └──────────┬─────────┘
//!                                                             ▼
//!                                                        Terminated
//! ```
//!
//! Marker files are written on entry to `Listening` and removed on entry to
//! `Terminated`, which happens exactly once whichever path leads there.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::lifecycle::markers::{MarkerError, MarkerFiles};
use crate::lifecycle::shutdown::{self, ProcessControl};
use crate::lifecycle::signals::LifecycleSignal;
use crate::net::ConnectionTracker;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Listening,
    Running,
    Draining,
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Listening => "listening",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Markers(#[from] MarkerError),
    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
}

/// Owns the marker files and decides how the process shuts down.
pub struct LifecycleManager<C: ProcessControl> {
    state: LifecycleState,
    markers: MarkerFiles,
    tracker: ConnectionTracker,
    control: Arc<C>,
    drain_timeout: Option<Duration>,
    drain_deadline: Option<Instant>,
}

impl<C: ProcessControl> LifecycleManager<C> {
    pub fn new(
        markers: MarkerFiles,
        tracker: ConnectionTracker,
        control: Arc<C>,
        drain_timeout: Option<Duration>,
    ) -> Self {
        Self {
            state: LifecycleState::Starting,
            markers,
            tracker,
            control,
            drain_timeout,
            drain_deadline: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    fn transition(&mut self, to: LifecycleState) -> Result<(), LifecycleError> {
        let allowed = matches!(
            (self.state, to),
            (LifecycleState::Starting, LifecycleState::Listening)
                | (LifecycleState::Listening, LifecycleState::Running)
                | (LifecycleState::Running, LifecycleState::Draining)
        ) || (to == LifecycleState::Terminated && self.state != LifecycleState::Terminated);

        if !allowed {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!(from = %self.state, to = %to, "Lifecycle transition");
        self.state = to;
        Ok(())
    }

    /// The transport is bound to `port`: publish the marker files.
    ///
    /// A write failure leaves the manager in `Starting` and is returned to
    /// the caller; startup must not proceed.
    pub fn on_listening(&mut self, port: u16) -> Result<(), LifecycleError> {
        if self.state != LifecycleState::Starting {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                to: LifecycleState::Listening,
            });
        }

        let pid = std::process::id();
        if let Err(e) = self.markers.write(pid, port) {
            tracing::error!(error = %e, "Failed to write marker files");
            return Err(e.into());
        }

        tracing::info!(port, pid, "Listening");
        self.transition(LifecycleState::Listening)
    }

    /// Begin serving; signals are accepted from here on.
    pub fn mark_running(&mut self) -> Result<(), LifecycleError> {
        self.transition(LifecycleState::Running)
    }

    /// Apply one process signal to the state machine.
    pub fn handle_signal(&mut self, signal: LifecycleSignal) -> Result<(), LifecycleError> {
        metrics::record_signal(signal.as_str());

        if self.state == LifecycleState::Terminated {
            tracing::debug!(signal = %signal, "Signal ignored after termination");
            return Ok(());
        }

        match signal {
            LifecycleSignal::Terminate => {
                tracing::info!(signal = %signal, "Termination requested");
                self.terminate()?;
                self.control.terminate_process();
                Ok(())
            }
            LifecycleSignal::Interrupt => {
                tracing::info!(signal = %signal, "Interrupted, exiting");
                self.control.terminate_process();
                Ok(())
            }
            LifecycleSignal::GracefulStop if self.state == LifecycleState::Draining => {
                tracing::info!(signal = %signal, "Already draining, signal ignored");
                Ok(())
            }
            LifecycleSignal::GracefulStop => self.begin_drain(),
        }
    }

    fn begin_drain(&mut self) -> Result<(), LifecycleError> {
        self.transition(LifecycleState::Draining)?;
        self.drain_deadline = self.drain_timeout.map(|timeout| Instant::now() + timeout);

        tracing::info!(
            open_connections = self.tracker.active_count(),
            drain_timeout = ?self.drain_timeout,
            "Graceful stop requested, draining connections"
        );
        self.control.stop_accepting();

        let control = Arc::clone(&self.control);
        self.tracker.add_empty_callback(move || {
            tracing::info!("All open connections have been closed. Stopping server.");
            control.terminate_process();
        });
        Ok(())
    }

    /// Enter `Terminated` and remove the marker files.
    ///
    /// Returns `Ok(false)` if already terminated; cleanup never runs twice.
    pub fn terminate(&mut self) -> Result<bool, LifecycleError> {
        if self.state == LifecycleState::Terminated {
            return Ok(false);
        }
        let from = self.state;
        self.transition(LifecycleState::Terminated)?;

        if let Err(e) = self.markers.cleanup() {
            tracing::error!(error = %e, "Failed to remove marker files");
            return Err(e.into());
        }
        tracing::info!(from = %from, "Terminated, marker files removed");
        Ok(true)
    }

    /// Drive the state machine until the process should exit.
    ///
    /// Consumes signals, watches `exit` for termination requests from the
    /// drain callback, enforces the drain deadline, and finishes in
    /// `Terminated`.
    pub async fn run(
        &mut self,
        signals: &mut mpsc::UnboundedReceiver<LifecycleSignal>,
        exit: &mut watch::Receiver<bool>,
    ) -> Result<(), LifecycleError> {
        self.mark_running()?;
        let mut signals_open = true;

        loop {
            let deadline = self.drain_deadline;
            tokio::select! {
                _ = shutdown::raised(exit) => break,
                received = signals.recv(), if signals_open => match received {
                    Some(signal) => self.handle_signal(signal)?,
                    None => {
                        tracing::warn!("Signal source closed");
                        signals_open = false;
                    }
                },
                _ = deadline_elapsed(deadline) => {
                    tracing::warn!(
                        open_connections = self.tracker.active_count(),
                        "Drain timeout elapsed, forcing shutdown"
                    );
                    self.control.terminate_process();
                    break;
                }
            }
        }

        self.terminate()?;
        Ok(())
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl<C: ProcessControl> Drop for LifecycleManager<C> {
    fn drop(&mut self) {
        if self.state == LifecycleState::Terminated {
            return;
        }
        // Backstop for exits that never reached `terminate`.
        if let Err(e) = self.markers.cleanup() {
            tracing::error!(error = %e, "Failed to remove marker files on exit");
        }
    }
}
