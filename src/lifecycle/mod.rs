//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind listener → on_listening(port) writes markers → Start accepting
//!
//! Signals (signals.rs):
//!     SIGTERM → Terminate (cleanup, then exit)
//!     SIGINT  → Interrupt (request exit; cleanup on the exit path)
//!     SIGUSR1 → GracefulStop (stop accepting, exit when drained)
//!
//! Shutdown (manager.rs, shutdown.rs):
//!     Signal received → state transition → Terminated → markers removed
//! ```
//!
//! # Design Decisions
//! - Every exit path ends in the single transition into `Terminated`
//! - Marker cleanup runs exactly once, with `Drop` as a backstop
//! - Draining has no deadline unless `drain_timeout_secs` is configured

pub mod manager;
pub mod markers;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use manager::{LifecycleError, LifecycleManager, LifecycleState};
pub use markers::{discover, MarkerError, MarkerFiles, MarkerInfo};
pub use shutdown::{ProcessControl, Shutdown};
pub use signals::{spawn_signal_listener, LifecycleSignal};
pub use startup::StartupError;
