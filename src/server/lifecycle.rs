//! Server lifecycle: Starting → Running → ShuttingDown → Stopped
//!
//! ```text
//! Server::new      ── Starting
//! Server::start    ── bind listener, spawn accept loop ── Running
//! RunningServer::shutdown
//!     ── stop accepting, drop listener ── ShuttingDown
//!     ── drain in-flight requests (bounded by shutdown_grace)
//!     ── abort leftovers on deadline ── Stopped
//! ```
//!
//! Each accepted connection runs on its own task. Handlers share no mutable
//! state, so the only coordination is the shutdown trigger and the drain.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::server::connection::{ConnectionTracker, TrackedStream};
use crate::server::shutdown::{shutdown_channel, ShutdownController, ShutdownSignal};
use async_trait::async_trait;
use axum::http::Request;
use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tower::ServiceExt;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, error, info, warn};

/// Pause after a transient `accept` failure before trying again
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Source of inbound connections for the accept loop
///
/// Implemented for [`TcpListener`]; [`Server::start_on`] accepts any
/// implementation, e.g. a listener handed over by a supervisor.
#[async_trait]
pub trait Accept: Send + Sync + 'static {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Accept for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// Whether an `accept` failure is worth retrying
///
/// Per-connection failures and descriptor/buffer exhaustion clear up on their
/// own. Anything else means the listener is unusable.
pub(crate) fn is_transient_accept_error(e: &io::Error) -> bool {
    use io::ErrorKind::*;

    if matches!(
        e.kind(),
        ConnectionAborted | ConnectionReset | ConnectionRefused | Interrupted | WouldBlock
            | TimedOut | OutOfMemory
    ) {
        return true;
    }

    #[cfg(unix)]
    {
        if let Some(code) = e.raw_os_error() {
            return matches!(
                code,
                libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM
            );
        }
    }

    false
}

/// Lifecycle state of a server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Publish a state transition
fn transition(state: &watch::Sender<LifecycleState>, next: LifecycleState) {
    let previous = state.send_replace(next);
    debug!(from = %previous, to = %next, "Lifecycle transition");
}

/// A configured server that has not bound its listener yet
pub struct Server {
    config: ServerConfig,
    router: Router,
    state: watch::Sender<LifecycleState>,
}

impl Server {
    /// Create a server for `router`
    ///
    /// The router is wrapped in a timeout layer bound to `write_timeout`.
    #[allow(deprecated)]
    pub fn new(config: ServerConfig, router: Router) -> Self {
        let router = router.layer(TimeoutLayer::new(config.write_timeout));
        let (state, _) = watch::channel(LifecycleState::Starting);
        Self {
            config,
            router,
            state,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Bind the listener and start accepting connections in the background
    ///
    /// Bind failures are returned as [`ServerError::Bind`]; nothing is retried.
    pub async fn start(self) -> Result<RunningServer, ServerError> {
        let addr = self.config.bind_address;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.start_on(listener)
    }

    /// Start accepting connections from an already bound listener
    pub fn start_on<L: Accept>(self, listener: L) -> Result<RunningServer, ServerError> {
        let addr = self.config.bind_address;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let (controller, signal) = shutdown_channel();
        let (exited_tx, exited) = watch::channel(());
        let accept = AcceptLoop {
            listener,
            router: self.router,
            read_timeout: self.config.read_timeout,
            idle_timeout: self.config.idle_timeout,
        };
        let handle = tokio::spawn(async move {
            // Dropped when the loop ends, however it ends
            let _exited = exited_tx;
            accept.run(signal).await
        });

        // Log after successful bind - server is actually listening
        info!(address = %local_addr, "HTTP server listening");
        transition(&self.state, LifecycleState::Running);

        Ok(RunningServer {
            local_addr,
            shutdown_grace: self.config.shutdown_grace,
            controller,
            handle,
            exited,
            state: self.state,
        })
    }
}

/// A server whose accept loop is running
pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown_grace: Duration,
    controller: ShutdownController,
    handle: JoinHandle<Result<Drain, ServerError>>,
    exited: watch::Receiver<()>,
    state: watch::Sender<LifecycleState>,
}

impl RunningServer {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions, including ones after `shutdown` consumes the server
    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Resolve when the accept loop stops without being asked to
    ///
    /// That only happens on a fatal accept error or a panic. Call
    /// [`RunningServer::shutdown`] afterwards to collect the error.
    pub async fn closed(&self) {
        let mut exited = self.exited.clone();
        // Nothing is ever sent; this returns once the sender is dropped
        while exited.changed().await.is_ok() {}
    }

    /// Stop accepting and drain in-flight requests
    ///
    /// New connections are refused as soon as the accept loop exits. Open
    /// connections finish their current request and close. Whatever is still
    /// open after `shutdown_grace` is aborted and reported as
    /// [`ServerError::ShutdownTimeout`]. If the accept loop already failed,
    /// its error is returned instead. Called once; the server ends `Stopped`
    /// whatever the outcome.
    pub async fn shutdown(self) -> Result<(), ServerError> {
        let RunningServer {
            shutdown_grace,
            controller,
            handle,
            state,
            ..
        } = self;

        transition(&state, LifecycleState::ShuttingDown);
        controller.shutdown();

        let result = match handle.await {
            Ok(Ok(drain)) => drain.run(shutdown_grace).await,
            Ok(Err(e)) => Err(e),
            Err(e) => Err(ServerError::Serve(e.to_string())),
        };

        transition(&state, LifecycleState::Stopped);
        result
    }
}

/// Background accept loop
struct AcceptLoop<L> {
    listener: L,
    router: Router,
    read_timeout: Duration,
    idle_timeout: Duration,
}

impl<L: Accept> AcceptLoop<L> {
    /// Accept until shutdown is signalled, then hand the open connections back
    ///
    /// A non-transient accept error ends the loop with [`ServerError::Accept`].
    async fn run(self, mut signal: ShutdownSignal) -> Result<Drain, ServerError> {
        let builder = auto::Builder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = signal.wait() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.serve(&builder, &graceful, &mut connections, stream, peer);
                    }
                    Err(e) if is_transient_accept_error(&e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                    Err(e) => {
                        error!(error = %e, "Listener failed, accept loop stopped");
                        return Err(ServerError::Accept(e));
                    }
                },
                // Reap finished connection tasks
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        // Dropping the listener refuses anything not yet accepted
        drop(self.listener);
        debug!(open_connections = connections.len(), "Accept loop stopped");

        Ok(Drain {
            graceful,
            connections,
        })
    }

    fn serve(
        &self,
        builder: &auto::Builder<TokioExecutor>,
        graceful: &GracefulShutdown,
        connections: &mut JoinSet<()>,
        stream: TcpStream,
        peer: SocketAddr,
    ) {
        let tracker = ConnectionTracker::new();
        let io = TokioIo::new(TrackedStream::new(stream, tracker.clone()));

        let router = self.router.clone();
        let requests = tracker.clone();
        let service = tower::service_fn(move |request: Request<Incoming>| {
            let guard = requests.begin_request();
            let router = router.clone();
            async move {
                let response = router.oneshot(request).await;
                drop(guard);
                response
            }
        });

        let conn = builder
            .serve_connection_with_upgrades(io, TowerToHyperService::new(service))
            .into_owned();
        let conn = graceful.watch(conn);
        let (read_timeout, idle_timeout) = (self.read_timeout, self.idle_timeout);

        connections.spawn(async move {
            tokio::select! {
                result = conn => {
                    if let Err(e) = result {
                        debug!(peer = %peer, error = %e, "Connection closed with error");
                    }
                }
                expiry = tracker.expired(read_timeout, idle_timeout) => {
                    debug!(peer = %peer, expiry = ?expiry, "Closing connection after timeout");
                }
            }
        });
    }
}

/// Connections left open when the accept loop stopped
struct Drain {
    graceful: GracefulShutdown,
    connections: JoinSet<()>,
}

impl Drain {
    async fn run(self, grace: Duration) -> Result<(), ServerError> {
        let Drain {
            graceful,
            mut connections,
        } = self;

        let drained = tokio::time::timeout(grace, graceful.shutdown()).await;

        // Abort anything still running; after a clean drain this only reaps
        connections.shutdown().await;

        match drained {
            Ok(()) => Ok(()),
            Err(_) => Err(ServerError::ShutdownTimeout(grace)),
        }
    }
}
