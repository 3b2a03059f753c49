//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the listener and learn the port the OS assigned
//! - Publish marker files before any connection is accepted
//! - Start the accept loop, then hand control to the lifecycle manager
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds first, markers second, accepting last

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::http::HttpServer;
use crate::lifecycle::manager::{LifecycleError, LifecycleManager};
use crate::lifecycle::markers::MarkerFiles;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::LifecycleSignal;
use crate::net::{ConnectionTracker, Listener, ListenerError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Run the server until a lifecycle signal ends it.
///
/// Returns once the manager has reached `Terminated` and the marker files
/// are gone. Connections still open at that point are abandoned.
pub async fn run(
    config: ServerConfig,
    mut signals: mpsc::UnboundedReceiver<LifecycleSignal>,
) -> Result<(), StartupError> {
    let listener = Listener::bind(&config.listener).await?;
    let port = listener.port()?;

    let tracker = ConnectionTracker::new();
    let shutdown = Arc::new(Shutdown::new());
    let mut lifecycle = LifecycleManager::new(
        MarkerFiles::new(&config.markers.pid_file),
        tracker.clone(),
        Arc::clone(&shutdown),
        config.lifecycle.drain_timeout(),
    );
    lifecycle.on_listening(port)?;

    let server = HttpServer::new(tracker);
    let accept_stopped = shutdown.accept_stopped();
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run(listener, accept_stopped).await {
            tracing::error!(error = %e, "HTTP server failed");
        }
    });

    let mut exit = shutdown.exit_requested();
    let result = lifecycle.run(&mut signals, &mut exit).await;
    server_task.abort();
    result?;
    Ok(())
}
