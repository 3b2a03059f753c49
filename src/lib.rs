//! Minimal HTTP server with marker files and graceful drain.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::{LifecycleManager, LifecycleSignal, Shutdown};
pub use net::ConnectionTracker;
