//! HTTP server for the version and health endpoints
//!
//! - `/` - Build metadata as JSON
//! - `/healthz` - Liveness probe
//!
//! Also owns the listener lifecycle and graceful shutdown on SIGTERM/SIGINT.

mod connection;
mod lifecycle;
pub mod routes;
pub mod shutdown;

pub use lifecycle::{Accept, LifecycleState, RunningServer, Server};
pub use routes::router;
pub use shutdown::{shutdown_channel, wait_for_signal, ShutdownController, ShutdownSignal};

#[cfg(test)]
#[path = "routes_test.rs"]
mod routes_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;

#[cfg(test)]
#[path = "lifecycle_test.rs"]
mod lifecycle_tests;
