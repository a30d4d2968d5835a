pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod version;

#[cfg(test)]
mod log_capture;

pub use config::ServerConfig;
pub use error::ServerError;
pub use version::VersionInfo;
