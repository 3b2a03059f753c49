//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::listener)
//!     → server.rs (accept loop, connection tracking, hyper HTTP/1.1)
//!     → request.rs (request ID)
//!     → fixed 200 text/plain response
//! ```

pub mod request;
pub mod server;

pub use request::UuidRequestId;
pub use server::{HttpServer, HELLO_BODY};
