//! Server settings
//!
//! There is no config file or environment surface. The defaults below are what
//! the binary runs with; fields stay public so tests can bind an ephemeral port
//! and shorten the timeouts.

use std::net::SocketAddr;
use std::time::Duration;

/// Default listen port (all interfaces)
pub const DEFAULT_PORT: u16 = 8080;

/// Max time to receive a request's headers
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Max time to produce a response
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Keep-alive connections with no traffic for this long are closed
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// How long in-flight requests get to finish once shutdown starts
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub bind_address: SocketAddr,

    /// Header read timeout per request
    pub read_timeout: Duration,

    /// Handler deadline per request
    pub write_timeout: Duration,

    /// Idle keep-alive timeout per connection
    pub idle_timeout: Duration,

    /// Drain deadline during shutdown
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_production_values() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:8080");
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert_eq!(config.idle_timeout, Duration::from_secs(120));
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
    }
}
