//! Errors surfaced by the server lifecycle

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while starting or stopping the server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Listener could not be bound. Fatal at startup.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// In-flight requests did not finish before the grace period ran out
    #[error("Shutdown timed out after {0:?} with connections still open")]
    ShutdownTimeout(Duration),

    /// Listener stopped handing out connections for a reason retrying won't fix
    #[error("Failed to accept connections: {0}")]
    Accept(#[source] std::io::Error),

    /// The background accept task died instead of returning
    #[error("Accept loop failed: {0}")]
    Serve(String),

    /// OS signal handlers could not be installed
    #[error("Failed to wait for termination signal: {0}")]
    Signal(#[from] std::io::Error),
}

impl ServerError {
    /// Whether this error should stop the process with a non-zero status
    ///
    /// Startup failures and a dead accept loop are fatal. Running out of
    /// grace period while draining is only logged.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ServerError::ShutdownTimeout(_))
    }
}
