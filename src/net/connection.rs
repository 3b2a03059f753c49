//! Open-connection tracking for graceful shutdown.
//!
//! # Responsibilities
//! - Keep the single authoritative count of open connections
//! - Generate unique connection IDs for tracing
//! - Fire registered callbacks when the count transitions to zero
//!
//! # Design Decisions
//! - Counter and callback list live behind one mutex, so a zero-transition
//!   and a concurrent registration cannot miss or double-fire a callback
//! - Callbacks run after the lock is released and may call back into the tracker
//! - A callback registered while the count is zero fires immediately and is
//!   also retained for later zero-transitions

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough, we only need uniqueness.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Callback invoked when the open-connection count reaches zero.
pub type EmptyCallback = Arc<dyn Fn() + Send + Sync>;

/// Errors reported by the tracker.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TrackerError {
    /// A close was reported with no matching open.
    #[error("connection close reported without a matching open")]
    Underflow,
}

#[derive(Default)]
struct TrackerState {
    open: u64,
    empty_callbacks: Vec<EmptyCallback>,
}

/// Tracks open connections and notifies interested parties when none remain.
///
/// Cloning is cheap; every clone observes and mutates the same counter.
#[derive(Clone, Default)]
pub struct ConnectionTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl ConnectionTracker {
    /// Create a tracker with no open connections.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        // User callbacks never run under the lock, so a poisoned mutex still
        // holds a consistent count.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a newly opened connection.
    pub fn add_connection(&self) {
        let mut state = self.lock();
        state.open += 1;
        metrics::set_active_connections(state.open);
    }

    /// Record a closed connection.
    ///
    /// When the count drops to exactly zero every registered callback runs,
    /// in registration order, once for this transition. A close with no
    /// matching open is reported as [`TrackerError::Underflow`] and leaves
    /// the count untouched.
    pub fn remove_connection(&self) -> Result<(), TrackerError> {
        let callbacks = {
            let mut state = self.lock();
            if state.open == 0 {
                tracing::error!("Connection close reported while no connections are open");
                return Err(TrackerError::Underflow);
            }
            state.open -= 1;
            metrics::set_active_connections(state.open);
            if state.open > 0 {
                return Ok(());
            }
            state.empty_callbacks.clone()
        };

        tracing::debug!(callbacks = callbacks.len(), "Open connection count reached zero");
        for callback in &callbacks {
            callback();
        }
        Ok(())
    }

    /// Register a callback for the next zero-transition.
    ///
    /// If no connections are open right now the callback also runs
    /// immediately, before this method returns. It stays registered either
    /// way, so it fires again on every later zero-transition.
    pub fn add_empty_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let callback: EmptyCallback = Arc::new(callback);
        let fire_now = {
            let mut state = self.lock();
            state.empty_callbacks.push(Arc::clone(&callback));
            state.open == 0
        };

        if fire_now {
            callback();
        }
    }

    /// Get current open connection count.
    pub fn active_count(&self) -> u64 {
        self.lock().open
    }

    /// Record a new connection. Returns a guard that reports the close on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.add_connection();
        metrics::record_connection_opened();
        let id = ConnectionId::new();
        tracing::trace!(connection_id = %id, "Connection opened");
        ConnectionGuard {
            tracker: self.clone(),
            id,
        }
    }
}

impl fmt::Debug for ConnectionTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ConnectionTracker")
            .field("open", &state.open)
            .field("empty_callbacks", &state.empty_callbacks.len())
            .finish()
    }
}

/// Guard that tracks a connection's lifetime.
/// Reports the close to the tracker when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    tracker: ConnectionTracker,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Err(e) = self.tracker.remove_connection() {
            tracing::error!(connection_id = %self.id, error = %e, "Connection tracker out of balance");
            return;
        }
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
