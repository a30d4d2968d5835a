//! Structured logging setup
//!
//! One JSON object per line on stdout. Level comes from `RUST_LOG`, default `info`.

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// JSON subscriber writing one event per line to `writer`
pub fn subscriber<W>(writer: W) -> impl tracing::Subscriber + Send + Sync + 'static
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_current_span(false)
        .finish()
}

/// Install the global JSON subscriber on stdout
///
/// Returns an error if a global subscriber was already set.
pub fn init() -> Result<(), TryInitError> {
    subscriber(std::io::stdout).try_init()
}
