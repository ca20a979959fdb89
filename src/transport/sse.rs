//! Server-sent events transport.
//!
//! A client opens `GET /sse` and receives an `endpoint` event naming the URL
//! to POST its messages to. Each POST carries `?sessionId=`; the server
//! answers `202 Accepted` at once and delivers the JSON-RPC reply as a
//! `message` event on the stream. Keep-alive comments flow on the same
//! stream every heartbeat period.
//!
//! `GET /mcp` and `POST /message` are accepted as aliases.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderName, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::TransportError;
use crate::mcp::ServerFactory;

use super::heartbeat::spawn_heartbeat;
use super::http::finish_router;
use super::session::{CloseReason, Frame, Session, SessionId, SessionRegistry};
use super::TransportKind;

/// Path advertised in the `endpoint` event.
pub const ENDPOINT_PATH: &str = "/messages";

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

impl Frame {
    /// Renders the frame as one server-sent event.
    #[must_use]
    pub fn into_event(self) -> Event {
        match self {
            Self::Endpoint(url) => Event::default().event("endpoint").data(url),
            Self::Message(json) => Event::default().event("message").data(json),
            Self::KeepAlive => Event::default().comment("keepalive"),
        }
    }
}

/// Closes its session when the client's stream is dropped.
#[derive(Debug)]
struct SessionGuard {
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session
            .close(&self.registry, CloseReason::ClientDisconnected);
    }
}

/// The outbound half of one SSE session.
///
/// Yields frames until the session closes. Dropping it closes the session.
#[derive(Debug)]
pub struct SessionStream {
    rx: mpsc::Receiver<Frame>,
    guard: SessionGuard,
}

impl SessionStream {
    /// The session this stream belongs to.
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.guard.session
    }
}

impl Stream for SessionStream {
    type Item = Frame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        self.rx.poll_recv(cx)
    }
}

#[derive(Debug)]
struct Shared {
    factory: ServerFactory,
    registry: Arc<SessionRegistry>,
    heartbeat: Duration,
}

/// The SSE transport: owns the session registry for its streams.
#[derive(Debug, Clone)]
pub struct SseTransport {
    shared: Arc<Shared>,
}

impl SseTransport {
    /// Creates a transport whose sessions beat every `heartbeat`.
    #[must_use]
    pub fn new(factory: ServerFactory, heartbeat: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                factory,
                registry: Arc::new(SessionRegistry::new()),
                heartbeat,
            }),
        }
    }

    /// The live sessions.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.shared.registry
    }

    /// Opens a session and returns its outbound stream.
    ///
    /// The session is registered before the `endpoint` event is queued, so
    /// the client cannot learn its identifier before the side channel will
    /// accept it.
    #[must_use]
    pub fn open_session(&self) -> SessionStream {
        let registry = Arc::clone(&self.shared.registry);
        let (session, rx) = Session::with_push(self.shared.factory.session());
        let session = Arc::new(session);
        let id = session.id().clone();

        registry.register(id.clone(), Arc::clone(&session));
        if let Err(e) = session.lifecycle().attach() {
            warn!(session_id = %id, error = %e, "Fresh session failed to attach");
        }

        if let Some(sender) = session.sender() {
            let endpoint = format!("{ENDPOINT_PATH}?sessionId={id}");
            if sender.try_send(Frame::Endpoint(endpoint)).is_err() {
                warn!(session_id = %id, "Could not queue endpoint event");
            }
        }

        spawn_heartbeat(
            Arc::clone(&session),
            Arc::clone(&registry),
            self.shared.heartbeat,
        );

        info!(session_id = %id, active = registry.len(), "SSE session opened");
        SessionStream {
            rx,
            guard: SessionGuard { session, registry },
        }
    }

    /// Routes one side-channel message to its session.
    ///
    /// A failed push means the stream is gone; the session is torn down.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] or [`TransportError::WriteFailed`]
    /// when the session can no longer receive.
    pub async fn deliver(&self, session: &Session, body: &str) -> Result<(), TransportError> {
        let result = session.handle_and_push(body).await;
        if let Err(TransportError::WriteFailed { .. }) = &result {
            session.close(&self.shared.registry, CloseReason::WriteFailed);
        }
        result
    }

    /// Closes every session.
    pub fn close_all(&self) -> usize {
        self.shared.registry.close_all(CloseReason::Shutdown)
    }

    /// The axum router for this transport, health check and CORS included.
    pub fn router(&self) -> Router {
        let routes = Router::new()
            .route("/sse", get(open_stream))
            .route("/mcp", get(open_stream))
            .route("/messages", post(post_message))
            .route("/message", post(post_message))
            .with_state(self.clone());

        finish_router(routes, TransportKind::Sse)
    }
}

async fn open_stream(State(transport): State<SseTransport>) -> impl IntoResponse {
    let stream = transport
        .open_session()
        .map(|frame| Ok::<_, Infallible>(frame.into_event()));

    (
        [(CACHE_CONTROL, "no-cache"), (X_ACCEL_BUFFERING, "no")],
        Sse::new(stream),
    )
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

async fn post_message(
    State(transport): State<SseTransport>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    let Some(id) = query.session_id.filter(|id| !id.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing sessionId parameter").into_response();
    };

    let session = match transport.registry().lookup(&id) {
        Ok(session) => session,
        Err(e) => {
            warn!(
                session_id = %id,
                active = transport.registry().len(),
                "Message for unknown session"
            );
            return (StatusCode::NOT_FOUND, e.to_string()).into_response();
        }
    };

    match transport.deliver(&session, &body).await {
        Ok(()) => (StatusCode::ACCEPTED, "Accepted").into_response(),
        Err(e) => {
            warn!(session_id = %id, error = %e, "Could not deliver reply");
            (StatusCode::GONE, format!("Session closed: {id}")).into_response()
        }
    }
}

/// Session identifier carried by an `endpoint` event URL.
#[must_use]
pub fn session_id_from_endpoint(url: &str) -> Option<SessionId> {
    url.split_once("sessionId=")
        .map(|(_, id)| id.split('&').next().unwrap_or(id))
        .filter(|id| !id.is_empty())
        .map(SessionId::from)
}
