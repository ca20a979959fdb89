//! Pieces shared by the HTTP transports: health check, CORS, body limit,
//! and the listener loop.

use std::future::Future;

use axum::extract::{DefaultBodyLimit, Request};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::TransportError;
use crate::mcp::protocol::SERVER_NAME;

use super::TransportKind;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Header carrying the streamable-HTTP session identifier.
pub const SESSION_HEADER: HeaderName = HeaderName::from_static("mcp-session-id");

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub transport: &'static str,
    pub timestamp: String,
}

impl HealthResponse {
    /// A healthy report stamped with the current time.
    #[must_use]
    pub fn now(transport: TransportKind) -> Self {
        Self {
            status: "ok",
            service: SERVER_NAME,
            version: env!("CARGO_PKG_VERSION"),
            transport: transport.as_str(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Permissive CORS: any origin, the MCP methods, and the session header.
#[must_use]
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION, SESSION_HEADER])
        .expose_headers([SESSION_HEADER])
}

/// Answers every `OPTIONS` request with an empty 200, preflight or not.
async fn answer_options(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(request).await
}

/// Adds `/health` and the shared layers to a transport router.
pub fn finish_router(router: Router, transport: TransportKind) -> Router {
    router
        .route(
            "/health",
            get(move || async move { Json(HealthResponse::now(transport)) }),
        )
        .layer(middleware::from_fn(answer_options))
        .layer(cors_layer())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

/// Binds `host:port` and serves `router` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the listener fails.
pub async fn serve<F>(
    router: Router,
    host: &str,
    port: u16,
    shutdown: F,
) -> Result<(), TransportError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind((host, port)).await?;
    info!(addr = %listener.local_addr()?, "Listening for HTTP connections");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
