//! The public session state machine.
//!
//! `Session` owns at most one live [`Connection`], the request tracker, and
//! the subscription registry, and is the single authority on the connected
//! state front-ends consult for control enablement. All operations take
//! `&self`, so a session can be shared behind an [`Arc`] between a UI task
//! and background workers; the send path is serialized internally and the
//! receive path belongs exclusively to the reader task.
//!
//! State machine: `Disconnected -> Connecting -> Connected -> Executing ->
//! Connected`, with every state able to fall back to `Disconnected` on
//! disconnect or fatal connection error. Fatal errors drain all pending
//! calls, so no caller is ever left hanging.

use std::{
    io,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::SinkExt;
use tokio::{
    sync::{Mutex as AsyncMutex, oneshot, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    codec::FrameError,
    config::{ServerAddr, SessionConfig},
    connection::{Connection, FrameSink},
    error::SessionError,
    frame::Frame,
    reader::{self, ReaderExit},
    result::QueryResult,
    subscription::{Subscription, SubscriptionRegistry},
    tracker::RequestTracker,
};

/// Drain reason reported to pending calls on orderly disconnect.
const DISCONNECTED_MESSAGE: &str = "disconnected";

/// Observable session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No connection; connect controls are enabled.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Connected and idle.
    Connected,
    /// Connected with at least one query in flight.
    Executing,
}

impl SessionState {
    /// True in the states where the connection is live.
    #[must_use]
    pub const fn is_connected(self) -> bool { matches!(self, Self::Connected | Self::Executing) }
}

struct Shared {
    state: watch::Sender<SessionState>,
    tracker: RequestTracker,
    registry: SubscriptionRegistry,
    sink: AsyncMutex<Option<FrameSink>>,
    current: Mutex<Option<u64>>,
    shutdown: Mutex<Option<CancellationToken>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    /// Force the session back to `Disconnected`, resolving every pending
    /// call with `reason` and ending all subscriptions. Idempotent.
    fn teardown(&self, reason: &str) {
        if let Some(token) = lock(&self.shutdown).take() {
            token.cancel();
        }
        lock(&self.current).take();
        self.tracker.drain_all(reason);
        self.registry.clear();
        self.state.send_if_modified(|state| {
            if *state == SessionState::Disconnected {
                false
            } else {
                *state = SessionState::Disconnected;
                true
            }
        });
    }
}

/// Client session for one pub/sub SQL server.
///
/// # Examples
///
/// ```no_run
/// use pubsql::session::Session;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), pubsql::error::SessionError> {
/// let session = Session::new();
/// session.connect("localhost:7777").await?;
/// let result = session.execute("select * from stocks").await?;
/// for row in result.rows() {
///     println!("{row:?}");
/// }
/// session.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    config: SessionConfig,
    shared: Arc<Shared>,
    reader: AsyncMutex<Option<JoinHandle<()>>>,
}

impl Default for Session {
    fn default() -> Self { Self::new() }
}

impl Session {
    /// Create a session with default configuration.
    #[must_use]
    pub fn new() -> Self { Self::with_config(SessionConfig::default()) }

    /// Create a session with explicit configuration.
    #[must_use]
    pub fn with_config(config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            config,
            shared: Arc::new(Shared {
                state,
                tracker: RequestTracker::new(),
                registry: SubscriptionRegistry::new(),
                sink: AsyncMutex::new(None),
                current: Mutex::new(None),
                shutdown: Mutex::new(None),
            }),
            reader: AsyncMutex::new(None),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState { *self.shared.state.borrow() }

    /// True while a connection is live.
    ///
    /// Front-ends enable connect controls iff this is false and
    /// disconnect/execute/cancel controls iff it is true.
    #[must_use]
    pub fn connected(&self) -> bool { self.state().is_connected() }

    /// Subscribe to state transitions instead of polling [`connected`].
    ///
    /// [`connected`]: Self::connected
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Connect to the server at `addr` (`"host"` or `"host:port"`).
    ///
    /// On success the background reader is running and the session is
    /// `Connected`. On failure the session is `Disconnected` again.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyConnected`] when a connection is
    /// already live, [`SessionError::Connect`] when address parsing, the
    /// transport, or the handshake fails, and [`SessionError::NotConnected`]
    /// when a concurrent [`disconnect`] aborts the attempt.
    ///
    /// [`disconnect`]: Self::disconnect
    pub async fn connect(&self, addr: &str) -> Result<(), SessionError> {
        let claimed = self.shared.state.send_if_modified(|state| {
            if *state == SessionState::Disconnected {
                *state = SessionState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(SessionError::AlreadyConnected);
        }

        // Reap the previous connection's finished reader, if any.
        if let Some(stale) = self.reader.lock().await.take() {
            let _ = stale.await;
        }
        lock(&self.shared.shutdown).take();

        let result = async {
            let addr = ServerAddr::from_str(addr)?;
            Ok::<Connection, SessionError>(Connection::connect(&addr, &self.config).await?)
        }
        .await;
        let connection = match result {
            Ok(connection) => connection,
            Err(err) => {
                self.shared.teardown(DISCONNECTED_MESSAGE);
                return Err(err);
            }
        };

        let peer = connection.peer_addr();
        let (sink, stream) = connection.split();
        *self.shared.sink.lock().await = Some(sink);
        let token = CancellationToken::new();
        *lock(&self.shared.shutdown) = Some(token.clone());

        // A concurrent `disconnect` may have moved the state off `Connecting`
        // while the transport came up; it wins, and the fresh connection is
        // torn down instead of resurrecting the session.
        let still_connecting = self.shared.state.send_if_modified(|state| {
            if *state == SessionState::Connecting {
                *state = SessionState::Connected;
                true
            } else {
                false
            }
        });
        if !still_connecting {
            if let Some(mut sink) = self.shared.sink.lock().await.take() {
                let _ = sink.close().await;
            }
            self.shared.teardown(DISCONNECTED_MESSAGE);
            return Err(SessionError::NotConnected);
        }
        info!(peer = %peer, "session connected");

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            let exit = reader::run(stream, &shared.tracker, &shared.registry, token).await;
            match exit {
                // Orderly disconnect: `disconnect` drives the teardown so it
                // can report completion only once no frames can arrive.
                ReaderExit::Shutdown => {}
                ReaderExit::PeerClosed => {
                    info!("server closed the connection");
                    shared.sink.lock().await.take();
                    shared.teardown(DISCONNECTED_MESSAGE);
                }
                ReaderExit::Failed(err) => {
                    error!(%err, "connection failed");
                    shared.sink.lock().await.take();
                    shared.teardown(&format!("connection failed: {err}"));
                }
            }
        });
        *self.reader.lock().await = Some(handle);
        Ok(())
    }

    /// Tear down the connection, if any.
    ///
    /// Idempotent: disconnecting a disconnected session is a no-op. Once this
    /// returns, every pending call has been resolved, all subscriptions have
    /// ended, and no further frames will be delivered.
    pub async fn disconnect(&self) {
        if let Some(token) = lock(&self.shared.shutdown).take() {
            token.cancel();
        }
        if let Some(mut sink) = self.shared.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        if let Some(handle) = self.reader.lock().await.take() {
            let _ = handle.await;
        }
        self.shared.teardown(DISCONNECTED_MESSAGE);
    }

    /// Execute a query and await its result.
    ///
    /// The call resolves when the server responds, when the query is
    /// cancelled, or when the connection fails; cancellation and disconnect
    /// surface as an error-status [`QueryResult`], never as a hang. Local
    /// failures (`NotConnected`, `InvalidQuery`) return an error without
    /// touching the wire.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] when no connection is live,
    /// [`SessionError::InvalidQuery`] when the query text is rejected, and
    /// [`SessionError::Io`] when sending the request fails.
    pub async fn execute(&self, query: &str) -> Result<QueryResult, SessionError> {
        if !self.connected() {
            return Err(SessionError::NotConnected);
        }

        let (id, rx) = self.shared.tracker.submit();
        let frame = match Frame::request(id, query, self.config.max_query_len_value()) {
            Ok(frame) => frame,
            Err(err) => {
                // Withdraw the slot; the receiver is dropped right here, so
                // the synthesized cancel result goes nowhere.
                self.shared.tracker.cancel(id);
                return Err(err);
            }
        };

        *lock(&self.shared.current) = Some(id);
        self.shared.state.send_if_modified(|state| {
            if *state == SessionState::Connected {
                *state = SessionState::Executing;
                true
            } else {
                false
            }
        });

        if let Err(err) = self.send_request(frame).await {
            self.shared.teardown(&format!("send failed: {err}"));
            return Err(err);
        }

        let result = await_result(rx).await;
        self.finish(id);
        Ok(result)
    }

    /// Cancel the currently outstanding execute, if any.
    ///
    /// Best-effort: the cancellation races with the server's response and
    /// the earlier of the two resolves the call (client wins whenever the
    /// response has not yet been processed). Returns whether a pending query
    /// was cancelled.
    pub fn cancel_execute(&self) -> bool {
        match lock(&self.shared.current).take() {
            Some(id) => self.shared.tracker.cancel(id),
            None => false,
        }
    }

    /// Register a listener for pushes on `topic`.
    ///
    /// Push delivery requires an active server-side subscription, established
    /// by executing the corresponding `subscribe` command; this call only
    /// routes the resulting push frames. The subscription ends on
    /// [`unsubscribe`](Self::unsubscribe), on drop, or when the connection
    /// tears down.
    #[must_use]
    pub fn subscribe(&self, topic: &str) -> Subscription {
        self.shared
            .registry
            .subscribe(topic, self.config.push_queue_capacity_value())
    }

    /// Remove a listener registered with [`subscribe`](Self::subscribe).
    /// Idempotent.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.shared.registry.unsubscribe(subscription);
    }

    async fn send_request(&self, frame: Frame) -> Result<(), SessionError> {
        let mut guard = self.shared.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Err(SessionError::NotConnected);
        };
        match sink.send(frame).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // Sending on a dead connection; drop the sink so later sends
                // fail fast rather than this one succeeding spuriously.
                guard.take();
                Err(frame_error_to_io(err))
            }
        }
    }

    /// Post-result bookkeeping for one execute call.
    fn finish(&self, id: u64) {
        let mut current = lock(&self.shared.current);
        if *current == Some(id) {
            current.take();
        }
        drop(current);
        if self.shared.tracker.pending_len() == 0 {
            self.shared.state.send_if_modified(|state| {
                if *state == SessionState::Executing {
                    *state = SessionState::Connected;
                    true
                } else {
                    false
                }
            });
        }
    }
}

async fn await_result(rx: oneshot::Receiver<QueryResult>) -> QueryResult {
    // The sender is dropped without a value only if the tracker entry was
    // removed outside resolve/cancel/drain, which does not happen; treat it
    // like a drain anyway so the caller never hangs.
    rx.await
        .unwrap_or_else(|_| QueryResult::failed(DISCONNECTED_MESSAGE))
}

fn frame_error_to_io(err: FrameError) -> SessionError {
    match err {
        FrameError::Io(err) => SessionError::Io(err),
        other => SessionError::Io(io::Error::other(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_session_is_disconnected() {
        let session = Session::new();
        assert!(!session.connected());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn execute_without_connection_fails_locally() {
        let session = Session::new();
        let err = session.execute("select 1").await.expect_err("must fail");
        assert!(matches!(err, SessionError::NotConnected));
    }

    #[tokio::test]
    async fn cancel_with_no_outstanding_query_is_noop() {
        let session = Session::new();
        assert!(!session.cancel_execute());
    }

    #[tokio::test]
    async fn disconnect_when_disconnected_is_noop() {
        let session = Session::new();
        session.disconnect().await;
        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_rejects_bad_address() {
        let session = Session::new();
        let err = session.connect("not an address:xx").await.expect_err("must fail");
        assert!(matches!(
            err,
            SessionError::Connect(crate::error::ConnectError::InvalidAddress(_))
        ));
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
