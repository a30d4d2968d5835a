use std::future::Future;
use tracing::{error, info};
use versiond::server::{router, wait_for_signal, RunningServer, Server};
use versiond::{logging, ServerConfig, ServerError, VersionInfo};

/// Run the server until `terminate` resolves, then shut it down
///
/// Startup failures and a dead accept loop come back as `Err` (exit status 1).
/// A shutdown that runs out of grace period is logged and still returns `Ok`
/// (exit status 0).
async fn run<F>(config: ServerConfig, info: VersionInfo, terminate: F) -> anyhow::Result<()>
where
    F: Future<Output = std::io::Result<&'static str>>,
{
    let version = info.version.clone();
    let server = Server::new(config, router(info));
    info!(
        port = server.config().bind_address.port(),
        version = %version,
        "starting production server"
    );

    let server = match server.start().await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "server failed");
            return Err(e.into());
        }
    };

    serve_until(server, terminate).await
}

/// Wait for `terminate` or for the accept loop to die, whichever comes first
async fn serve_until<F>(server: RunningServer, terminate: F) -> anyhow::Result<()>
where
    F: Future<Output = std::io::Result<&'static str>>,
{
    // No timeout here: the process runs until something terminates it
    let outcome = tokio::select! {
        signal = terminate => Some(signal),
        _ = server.closed() => None,
    };

    let signal = match outcome {
        Some(Ok(signal)) => signal,
        Some(Err(e)) => {
            let e = ServerError::from(e);
            error!(error = %e, "server failed");
            return Err(e.into());
        }
        None => {
            let e = match server.shutdown().await {
                Err(e) => e,
                Ok(()) => ServerError::Serve("accept loop exited".to_string()),
            };
            error!(error = %e, "server failed");
            return Err(e.into());
        }
    };
    info!(signal = signal, "shutting down gracefully...");

    match server.shutdown().await {
        Ok(()) => {}
        Err(e) if e.is_fatal() => {
            error!(error = %e, "server failed");
            return Err(e.into());
        }
        Err(e) => error!(error = %e, "shutdown failed"),
    }
    info!("server stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init()?;

    run(
        ServerConfig::default(),
        VersionInfo::from_build(),
        wait_for_signal(),
    )
    .await
}

#[cfg(test)]
mod log_capture;

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
