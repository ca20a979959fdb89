//! Streamable HTTP transport.
//!
//! Every JSON-RPC message is one `POST /mcp`; the reply is the response body.
//! In stateless mode each request gets a fresh server. In stateful mode an
//! `initialize` request without a session opens one, and its identifier is
//! returned in the `Mcp-Session-Id` header for later requests to present
//! (the `sessionId` query parameter is accepted too).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::SessionMode;
use crate::error::TransportError;
use crate::mcp::protocol::parse_message;
use crate::mcp::ServerFactory;

use super::http::{finish_router, SESSION_HEADER};
use super::session::{CloseReason, Session, SessionRegistry};
use super::TransportKind;

#[derive(Debug)]
struct Shared {
    factory: ServerFactory,
    mode: SessionMode,
    registry: Arc<SessionRegistry>,
}

/// The streamable HTTP transport.
#[derive(Debug, Clone)]
pub struct StreamableTransport {
    shared: Arc<Shared>,
}

impl StreamableTransport {
    /// Creates a transport in the given session mode.
    #[must_use]
    pub fn new(factory: ServerFactory, mode: SessionMode) -> Self {
        Self {
            shared: Arc::new(Shared {
                factory,
                mode,
                registry: Arc::new(SessionRegistry::new()),
            }),
        }
    }

    /// The session mode.
    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.shared.mode
    }

    /// Live sessions (always empty in stateless mode).
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.shared.registry
    }

    /// Closes every session.
    pub fn close_all(&self) -> usize {
        self.shared.registry.close_all(CloseReason::Shutdown)
    }

    /// The axum router for this transport, health check and CORS included.
    pub fn router(&self) -> Router {
        let routes = Router::new()
            .route(
                "/mcp",
                post(handle_post)
                    .delete(handle_delete)
                    .get(|| async { StatusCode::METHOD_NOT_ALLOWED }),
            )
            .with_state(self.clone());

        finish_router(routes, TransportKind::Streamable)
    }

    fn open_session(&self) -> Result<Arc<Session>, TransportError> {
        let session = Arc::new(Session::new(self.shared.factory.session()));
        session.lifecycle().attach()?;
        self.shared
            .registry
            .register(session.id().clone(), Arc::clone(&session));
        info!(
            session_id = %session.id(),
            active = self.shared.registry.len(),
            "Streamable session opened"
        );
        Ok(session)
    }
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

fn presented_session(headers: &HeaderMap, query: SessionQuery) -> Option<String> {
    headers
        .get(&SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or(query.session_id)
        .filter(|id| !id.is_empty())
}

fn reply(line: Option<String>) -> Response {
    match line {
        Some(body) => (StatusCode::OK, [(CONTENT_TYPE, "application/json")], body).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

fn missing_session() -> Response {
    (StatusCode::BAD_REQUEST, "Missing sessionId parameter").into_response()
}

async fn handle_post(
    State(transport): State<StreamableTransport>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
    body: String,
) -> Response {
    if transport.mode() == SessionMode::Stateless {
        let mut server = transport.shared.factory.stateless();
        return reply(server.handle_line(&body));
    }

    let Some(id) = presented_session(&headers, query) else {
        let opens_session = parse_message(&body).is_ok_and(|msg| msg.is_initialize());
        if !opens_session {
            return missing_session();
        }
        return initialize_session(&transport, &body).await;
    };

    let session = match transport.registry().lookup(&id) {
        Ok(session) => session,
        Err(e) => {
            debug!(session_id = %id, "Request for unknown session");
            return (StatusCode::NOT_FOUND, e.to_string()).into_response();
        }
    };

    match session.handle(&body).await {
        Ok(line) => reply(line),
        Err(e) => {
            warn!(session_id = %id, error = %e, "Request for closing session");
            (StatusCode::NOT_FOUND, format!("Session not found: {id}")).into_response()
        }
    }
}

async fn initialize_session(transport: &StreamableTransport, body: &str) -> Response {
    let session = match transport.open_session() {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "Could not open session");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let line = match session.handle(body).await {
        Ok(line) => line,
        Err(e) => {
            warn!(session_id = %session.id(), error = %e, "Session closed during initialize");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if line.as_deref().map_or(true, is_error_reply) {
        warn!(session_id = %session.id(), "Initialize failed, discarding session");
        session.close(transport.registry(), CloseReason::Explicit);
        return reply(line);
    }

    let mut response = reply(line);
    if let Ok(value) = HeaderValue::from_str(session.id().as_str()) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

fn is_error_reply(line: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(line)
        .map_or(true, |value| value.get("error").is_some())
}

async fn handle_delete(
    State(transport): State<StreamableTransport>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> Response {
    if transport.mode() == SessionMode::Stateless {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let Some(id) = presented_session(&headers, query) else {
        return missing_session();
    };

    match transport.registry().lookup(&id) {
        Ok(session) => {
            session.close(transport.registry(), CloseReason::Explicit);
            StatusCode::OK.into_response()
        }
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    const INIT: &str = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26","capabilities":{},"clientInfo":{"name":"test","version":"1"}}}"#;
    const LIST: &str = r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#;
    const INITIALIZED: &str = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;

    fn post(session: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::post("/mcp").header("content-type", "application/json");
        if let Some(id) = session {
            builder = builder.header("mcp-session-id", id);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn stateful() -> StreamableTransport {
        StreamableTransport::new(ServerFactory::default(), SessionMode::Stateful)
    }

    fn stateless() -> StreamableTransport {
        StreamableTransport::new(ServerFactory::default(), SessionMode::Stateless)
    }

    #[tokio::test]
    async fn stateless_request_gets_json_reply() {
        let response = stateless().router().oneshot(post(None, LIST)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let body = json(response).await;
        assert_eq!(body["id"], 2);
        assert_eq!(body["result"]["tools"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn stateless_notification_is_202() {
        let response = stateless()
            .router()
            .oneshot(post(None, INITIALIZED))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn stateless_tool_call() {
        let call = r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"create_flowchart","arguments":{"content":"Start > End"}}}"#;
        let response = stateless().router().oneshot(post(None, call)).await.unwrap();
        let body = json(response).await;
        let text = body["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("https://chhart.app/#flowchart="));
    }

    #[tokio::test]
    async fn stateless_delete_is_not_allowed() {
        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/mcp")
            .body(Body::empty())
            .unwrap();
        let response = stateless().router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn get_is_not_allowed() {
        let response = stateless()
            .router()
            .oneshot(Request::get("/mcp").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn stateful_initialize_issues_session() {
        let transport = stateful();
        let response = transport.router().oneshot(post(None, INIT)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let id = response
            .headers()
            .get("mcp-session-id")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(transport.registry().contains(&id));

        let body = json(response).await;
        assert_eq!(body["result"]["protocolVersion"], "2025-03-26");

        let response = transport
            .router()
            .oneshot(post(Some(&id), LIST))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["id"], 2);
    }

    #[tokio::test]
    async fn failed_initialize_opens_no_session() {
        let transport = stateful();
        let bare = r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#;

        for _ in 0..3 {
            let response = transport.router().oneshot(post(None, bare)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get(SESSION_HEADER).is_none());
            assert_eq!(json(response).await["error"]["code"], -32602);
        }
        assert_eq!(transport.registry().len(), 0);
    }

    #[tokio::test]
    async fn stateful_requires_session() {
        let response = stateful().router().oneshot(post(None, LIST)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stateful_unknown_session_is_404() {
        let response = stateful()
            .router()
            .oneshot(post(Some("nope"), LIST))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn session_accepted_from_query() {
        let transport = stateful();
        let response = transport.router().oneshot(post(None, INIT)).await.unwrap();
        let id = response.headers()["mcp-session-id"].to_str().unwrap().to_string();

        let request = Request::post(format!("/mcp?sessionId={id}"))
            .body(Body::from(LIST))
            .unwrap();
        let response = transport.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn delete_closes_session() {
        let transport = stateful();
        let response = transport.router().oneshot(post(None, INIT)).await.unwrap();
        let id = response.headers()["mcp-session-id"].to_str().unwrap().to_string();

        let delete = Request::builder()
            .method(Method::DELETE)
            .uri("/mcp")
            .header("mcp-session-id", &id)
            .body(Body::empty())
            .unwrap();
        let response = transport.router().oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(transport.registry().is_empty());

        let response = transport
            .router()
            .oneshot(post(Some(&id), LIST))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sessions_keep_their_own_state() {
        let transport = stateful();
        let first = transport.router().oneshot(post(None, INIT)).await.unwrap();
        let second = transport.router().oneshot(post(None, INIT)).await.unwrap();

        assert_ne!(
            first.headers()["mcp-session-id"],
            second.headers()["mcp-session-id"]
        );
        assert_eq!(transport.registry().len(), 2);
        assert_eq!(transport.close_all(), 2);
    }
}
