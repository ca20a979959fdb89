//! Transport bindings for the MCP server.
//!
//! Every binding carries the same JSON-RPC messages to an [`McpServer`]:
//!
//! ```text
//! ┌────────────┐   ┌──────────────────────┐   ┌─────────────┐   ┌─────────┐
//! │   stdio    │──▶│                      │   │             │   │         │
//! ├────────────┤   │  Session / Lifecycle │──▶│  McpServer  │──▶│  Tools  │
//! │ SSE + POST │──▶│  (registry, heartbeat│   │  (JSON-RPC) │   │         │
//! ├────────────┤   │   for HTTP clients)  │   │             │   │         │
//! │ Streamable │──▶│                      │   │             │   │         │
//! └────────────┘   └──────────────────────┘   └─────────────┘   └─────────┘
//! ```
//!
//! [`McpServer`]: crate::mcp::McpServer

pub mod heartbeat;
pub mod http;
pub mod lifecycle;
pub mod session;
pub mod sse;
pub mod stdio;
pub mod streamable;

use std::fmt;
use std::time::Duration;

use clap::ValueEnum;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::SessionMode;
use crate::error::TransportError;
use crate::mcp::ServerFactory;

pub use heartbeat::DEFAULT_HEARTBEAT_INTERVAL;
pub use lifecycle::{ConnectionState, Lifecycle};
pub use session::{CloseReason, Frame, Session, SessionId, SessionRegistry};
pub use sse::SseTransport;
pub use stdio::StdioTransport;
pub use streamable::StreamableTransport;

/// Which binding to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Newline-delimited JSON-RPC over stdin/stdout.
    #[default]
    Stdio,
    /// Server-sent events with a POST side channel.
    Sse,
    /// One POST per message on `/mcp`.
    Streamable,
}

impl TransportKind {
    /// Name reported by the health check.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Sse => "sse",
            Self::Streamable => "streamable-http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for the HTTP bindings.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
    pub heartbeat: Duration,
    pub session_mode: SessionMode,
}

/// Resolves on SIGINT or SIGTERM.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigint, mut sigterm) =
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
                return std::future::pending().await;
            }
        };

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

/// Resolves on Ctrl+C.
#[cfg(windows)]
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

/// Runs the chosen binding until it ends or a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or stdin fails.
pub async fn run(
    kind: TransportKind,
    factory: ServerFactory,
    settings: HttpSettings,
) -> Result<(), TransportError> {
    match kind {
        TransportKind::Stdio => {
            StdioTransport::new()
                .serve(factory.session(), shutdown_signal())
                .await
        }
        TransportKind::Sse => {
            let transport = SseTransport::new(factory, settings.heartbeat);
            let stop = shutdown_trigger({
                let transport = transport.clone();
                move || transport.close_all()
            });
            http::serve(transport.router(), &settings.host, settings.port, stop).await
        }
        TransportKind::Streamable => {
            let transport = StreamableTransport::new(factory, settings.session_mode);
            let stop = shutdown_trigger({
                let transport = transport.clone();
                move || transport.close_all()
            });
            http::serve(transport.router(), &settings.host, settings.port, stop).await
        }
    }
}

/// Waits for a shutdown signal, closes every session, then resolves.
///
/// Sessions close first so open event streams end and the listener can
/// drain.
fn shutdown_trigger<F>(close_sessions: F) -> impl std::future::Future<Output = ()> + Send + 'static
where
    F: FnOnce() -> usize + Send + 'static,
{
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        let closed = close_sessions();
        info!(closed, "Closed open sessions");
        trigger.cancel();
    });

    async move { token.cancelled().await }
}
