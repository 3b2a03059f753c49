//! zdd-server
//!
//! A minimal HTTP server built for zero-downtime deploys.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::listener ──▶ http::server ──▶ "Hello World"
//!                     │                  │
//!                     │ open/close       │
//!                     ▼                  │
//!            net::ConnectionTracker      │ stop accepting
//!                     │ zero             │
//!                     ▼                  │
//!     OS signal ──▶ lifecycle::LifecycleManager ──▶ node.pid, <pid>.port
//! ```
//!
//! Once bound, the server writes its pid to `node.pid` and its port to
//! `<pid>.port`. SIGUSR1 stops accepting and exits after the last open
//! connection closes; SIGTERM and SIGINT exit at once. Marker files are
//! removed on the way out.

use zdd_server::config::load_from_env;
use zdd_server::lifecycle::{spawn_signal_listener, startup};
use zdd_server::observability::{logging, metrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_from_env()?;
    logging::init_logging(&config.observability);

    tracing::info!("zdd-server v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        pid_file = %config.markers.pid_file.display(),
        drain_timeout_secs = ?config.lifecycle.drain_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: std::net::SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let signals = spawn_signal_listener()?;
    startup::run(config, signals).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
