//! HTTP server setup and accept loop.
//!
//! # Responsibilities
//! - Create the Axum router (fixed `Hello World` response)
//! - Wire up middleware (tracing, request ID)
//! - Accept connections until told to stop, reporting each open and close
//!   to the connection tracker
//! - Serve each connection with HTTP/1.1 on its own task

use std::time::Duration;

use axum::{
    http::header,
    response::IntoResponse,
    Router,
};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::http::request::UuidRequestId;
use crate::lifecycle::shutdown;
use crate::net::{ConnectionTracker, Listener, ListenerError};

/// Response body for every request.
pub const HELLO_BODY: &str = "Hello World\n";

/// Pause after a failed accept so persistent errors (e.g. fd exhaustion)
/// do not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// HTTP server: the transport in front of the lifecycle core.
pub struct HttpServer {
    router: Router,
    tracker: ConnectionTracker,
}

impl HttpServer {
    /// Create a server that reports connection events to `tracker`.
    pub fn new(tracker: ConnectionTracker) -> Self {
        Self {
            router: Self::build_router(),
            tracker,
        }
    }

    fn build_router() -> Router {
        Router::new().fallback(hello_handler).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }

    /// Accept connections until `accept_stopped` is raised, then close the
    /// listening socket. Connections already open keep being served.
    pub async fn run(
        self,
        listener: Listener,
        mut accept_stopped: watch::Receiver<bool>,
    ) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(address = %addr, "HTTP server accepting connections");

        loop {
            tokio::select! {
                _ = shutdown::raised(&mut accept_stopped) => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr, permit)) => {
                        let guard = self.tracker.track();
                        let service = TowerToHyperService::new(self.router.clone());

                        tokio::spawn(async move {
                            let result = http1::Builder::new()
                                .serve_connection(TokioIo::new(stream), service)
                                .await;
                            if let Err(e) = result {
                                tracing::debug!(
                                    connection_id = %guard.id(),
                                    peer_addr = %peer_addr,
                                    error = %e,
                                    "Connection ended with error"
                                );
                            }
                            drop(permit);
                            drop(guard);
                        });
                    }
                    Err(ListenerError::LimitClosed) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        drop(listener);
        tracing::info!(address = %addr, "Stopped accepting new connections");
        Ok(())
    }
}

async fn hello_handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], HELLO_BODY)
}
