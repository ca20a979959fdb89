//! Sessions and the registry that routes side-channel messages to them.
//!
//! The HTTP transports serve many clients at once. Each client gets a
//! [`Session`] with its own [`McpServer`], and the [`SessionRegistry`] maps
//! the opaque identifier the client presents back to that session. The stdio
//! transport has exactly one client and never touches the registry.
//!
//! A session must be registered before its identifier is handed to the
//! client; otherwise the client's first POST could race the registration
//! and be answered with 404.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{SessionError, TransportError};
use crate::mcp::McpServer;

use super::lifecycle::{ConnectionState, Lifecycle};

/// Buffered frames per push channel before senders wait.
const PUSH_CHANNEL_CAPACITY: usize = 64;

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The identifier as presented on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A frame written to a push channel.
///
/// Each frame becomes one self-delimited server-sent event, so keep-alives
/// may interleave with messages without corrupting either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Where the client should POST its messages.
    Endpoint(String),
    /// One serialised JSON-RPC message.
    Message(String),
    /// Keep-alive comment for idle proxies.
    KeepAlive,
}

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client went away.
    ClientDisconnected,
    /// A write to the push channel failed.
    WriteFailed,
    /// The client asked for it (HTTP `DELETE`).
    Explicit,
    /// The process is shutting down.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ClientDisconnected => "client disconnected",
            Self::WriteFailed => "write failed",
            Self::Explicit => "closed by client",
            Self::Shutdown => "server shutdown",
        })
    }
}

/// One logical client connection.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    lifecycle: Lifecycle,
    server: tokio::sync::Mutex<McpServer>,
    outbound: Mutex<Option<mpsc::Sender<Frame>>>,
}

impl Session {
    /// Creates a request/response session with no push channel.
    #[must_use]
    pub fn new(server: McpServer) -> Self {
        Self {
            id: SessionId::generate(),
            created_at: Utc::now(),
            lifecycle: Lifecycle::new(),
            server: tokio::sync::Mutex::new(server),
            outbound: Mutex::new(None),
        }
    }

    /// Creates a session with a push channel; the receiver feeds the
    /// client's event stream.
    #[must_use]
    pub fn with_push(server: McpServer) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(PUSH_CHANNEL_CAPACITY);
        let session = Self::new(server);
        *session.outbound_slot() = Some(tx);
        (session, rx)
    }

    fn outbound_slot(&self) -> MutexGuard<'_, Option<mpsc::Sender<Frame>>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The session identifier.
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// When the session was created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    /// The session's lifecycle.
    #[must_use]
    pub const fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// A handle to the push channel, while the session is open.
    #[must_use]
    pub fn sender(&self) -> Option<mpsc::Sender<Frame>> {
        self.outbound_slot().clone()
    }

    /// Handles one inbound message and returns the serialised reply.
    ///
    /// Messages are handled one at a time in arrival order.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the session is closing.
    pub async fn handle(&self, text: &str) -> Result<Option<String>, TransportError> {
        let mut server = self.server.lock().await;
        self.lifecycle.activate()?;
        Ok(server.handle_line(text))
    }

    /// Handles one inbound message and pushes the reply onto the event
    /// stream.
    ///
    /// The server stays locked until the reply is queued, so replies leave
    /// in the same order their requests arrived.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the session is closing, or
    /// [`TransportError::WriteFailed`] if the event stream is gone.
    pub async fn handle_and_push(&self, text: &str) -> Result<(), TransportError> {
        let mut server = self.server.lock().await;
        self.lifecycle.activate()?;
        if let Some(line) = server.handle_line(text) {
            self.push(Frame::Message(line)).await?;
        }
        Ok(())
    }

    /// Queues a frame on the push channel.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the session has no open push
    /// channel, or [`TransportError::WriteFailed`] if the stream was dropped.
    pub async fn push(&self, frame: Frame) -> Result<(), TransportError> {
        let sender = self.sender().ok_or(TransportError::Closed)?;
        sender
            .send(frame)
            .await
            .map_err(|_| TransportError::WriteFailed {
                channel: "event stream",
            })
    }

    /// Tears the session down.
    ///
    /// The first call cancels the heartbeat, removes the registry entry, and
    /// releases the push channel; it returns `true`. Any later call is a
    /// no-op returning `false`.
    pub fn close(&self, registry: &SessionRegistry, reason: CloseReason) -> bool {
        if !self.lifecycle.begin_close() {
            debug!(session_id = %self.id, %reason, "Session already closing");
            return false;
        }

        registry.unregister(self.id.as_str());
        self.outbound_slot().take();
        self.lifecycle.finish_close();

        let age = Utc::now().signed_duration_since(self.created_at);
        info!(
            session_id = %self.id,
            %reason,
            age_secs = age.num_seconds(),
            "Session closed"
        );
        true
    }
}

/// Maps session identifiers to live sessions.
///
/// Generic over the handle so tests can register lightweight stand-ins.
#[derive(Debug)]
pub struct SessionRegistry<T = Session> {
    sessions: Mutex<HashMap<SessionId, Arc<T>>>,
}

impl<T> SessionRegistry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<T>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts `handle` under `id`, returning any handle it replaced.
    pub fn register(&self, id: SessionId, handle: Arc<T>) -> Option<Arc<T>> {
        self.lock().insert(id, handle)
    }

    /// Finds the live handle for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if `id` was never registered or has
    /// been unregistered.
    pub fn lookup(&self, id: &str) -> Result<Arc<T>, SessionError> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound { id: id.to_string() })
    }

    /// Removes `id`. Returns `false` if it was already absent.
    pub fn unregister(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    /// `true` if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// `true` if no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Identifiers of every registered session.
    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> {
        self.lock().keys().cloned().collect()
    }

    /// Removes and returns every registered handle.
    pub fn drain(&self) -> Vec<Arc<T>> {
        self.lock().drain().map(|(_, handle)| handle).collect()
    }
}

impl SessionRegistry<Session> {
    /// Closes every registered session. Returns how many were closed.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        self.drain()
            .iter()
            .filter(|session| session.close(self, reason))
            .count()
    }
}

impl<T> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
