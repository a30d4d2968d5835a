//! Per-connection read and idle deadlines
//!
//! A connection is always in one of three phases:
//! - `Reading`: request bytes have arrived, no handler has been dispatched yet.
//!   Bounded by `read_timeout`.
//! - `Active`: at least one request is being handled. No deadline here; the
//!   write timeout on the router bounds handlers.
//! - `Idle`: the last response went out and no new bytes have arrived.
//!   Bounded by `idle_timeout`.
//!
//! A freshly accepted connection starts in `Reading`. [`TrackedStream`] moves
//! `Idle` to `Reading` on the first byte read; [`RequestGuard`] covers `Active`.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Reading(Instant),
    Active,
    Idle(Instant),
}

/// Which deadline closed a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Read,
    Idle,
}

#[derive(Debug)]
struct State {
    phase: Phase,
    in_flight: usize,
}

/// Shared phase of one connection
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    state: Arc<Mutex<State>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                phase: Phase::Reading(Instant::now()),
                in_flight: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Bytes arrived from the peer
    pub fn bytes_read(&self) {
        let mut state = self.lock();
        if let Phase::Idle(_) = state.phase {
            state.phase = Phase::Reading(Instant::now());
        }
    }

    /// A request was dispatched to a handler
    ///
    /// The connection stays `Active` until every guard is dropped.
    pub fn begin_request(&self) -> RequestGuard {
        let mut state = self.lock();
        state.in_flight += 1;
        state.phase = Phase::Active;
        RequestGuard {
            tracker: self.clone(),
        }
    }

    fn end_request(&self) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            state.phase = Phase::Idle(Instant::now());
        }
    }

    /// Resolve once the current phase's deadline has passed
    pub async fn expired(&self, read_timeout: Duration, idle_timeout: Duration) -> Expiry {
        loop {
            let (deadline, expiry) = match self.phase() {
                Phase::Reading(since) => (since + read_timeout, Expiry::Read),
                Phase::Idle(since) => (since + idle_timeout, Expiry::Idle),
                Phase::Active => {
                    tokio::time::sleep(read_timeout.min(idle_timeout)).await;
                    continue;
                }
            };
            if Instant::now() >= deadline {
                return expiry;
            }
            // The phase may change while sleeping; re-evaluate on wake
            tokio::time::sleep_until(deadline).await;
        }
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks a request as in flight until dropped
#[derive(Debug)]
pub struct RequestGuard {
    tracker: ConnectionTracker,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.tracker.end_request();
    }
}

/// Stream wrapper that reports reads to a [`ConnectionTracker`]
#[derive(Debug)]
pub struct TrackedStream<S> {
    inner: S,
    tracker: ConnectionTracker,
}

impl<S> TrackedStream<S> {
    pub fn new(inner: S, tracker: ConnectionTracker) -> Self {
        Self { inner, tracker }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TrackedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if matches!(poll, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            self.tracker.bytes_read();
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TrackedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const READ: Duration = Duration::from_millis(50);
    const IDLE: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_new_connection_is_bounded_by_read_timeout() {
        let tracker = ConnectionTracker::new();
        let started = Instant::now();

        let expiry = tracker.expired(READ, IDLE).await;

        assert_eq!(expiry, Expiry::Read);
        assert!(started.elapsed() >= READ);
        assert!(started.elapsed() < IDLE);
    }

    /// Test that a finished request switches the connection to the idle deadline
    #[tokio::test]
    async fn test_finished_request_uses_idle_timeout() {
        let tracker = ConnectionTracker::new();
        drop(tracker.begin_request());
        assert!(matches!(tracker.phase(), Phase::Idle(_)));

        let started = Instant::now();
        let expiry = tracker.expired(READ, IDLE).await;

        assert_eq!(expiry, Expiry::Idle);
        assert!(started.elapsed() >= IDLE - Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_active_request_has_no_deadline() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.begin_request();

        let result = tokio::time::timeout(IDLE * 2, tracker.expired(READ, IDLE)).await;
        assert!(result.is_err(), "in-flight request must not expire");

        drop(guard);
        assert!(matches!(tracker.phase(), Phase::Idle(_)));
    }

    #[tokio::test]
    async fn test_overlapping_requests_stay_active_until_last_ends() {
        let tracker = ConnectionTracker::new();
        let first = tracker.begin_request();
        let second = tracker.begin_request();

        drop(first);
        assert_eq!(tracker.phase(), Phase::Active);

        drop(second);
        assert!(matches!(tracker.phase(), Phase::Idle(_)));
    }

    /// Test that bytes arriving on an idle connection restart the read deadline
    #[tokio::test]
    async fn test_tracked_stream_read_moves_idle_to_reading() {
        let (mut client, server) = tokio::io::duplex(64);
        let tracker = ConnectionTracker::new();
        drop(tracker.begin_request());
        let mut tracked = TrackedStream::new(server, tracker.clone());

        client.write_all(b"GET").await.expect("write to duplex");
        let mut buf = [0u8; 3];
        tracked.read_exact(&mut buf).await.expect("read from tracked");

        assert!(matches!(tracker.phase(), Phase::Reading(_)));
    }

    #[tokio::test]
    async fn test_tracked_stream_read_during_request_stays_active() {
        let (mut client, server) = tokio::io::duplex(64);
        let tracker = ConnectionTracker::new();
        let _guard = tracker.begin_request();
        let mut tracked = TrackedStream::new(server, tracker.clone());

        client.write_all(b"body").await.expect("write to duplex");
        let mut buf = [0u8; 4];
        tracked.read_exact(&mut buf).await.expect("read from tracked");

        assert_eq!(tracker.phase(), Phase::Active);
    }
}
