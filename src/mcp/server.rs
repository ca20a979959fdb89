//! MCP request dispatch.
//!
//! [`McpServer`] turns one inbound JSON-RPC message into at most one
//! outbound message. It knows nothing about framing or connections: the
//! transports in [`crate::transport`] feed it text and write back whatever it
//! returns.
//!
//! # Lifecycle
//!
//! A session-bound server follows the MCP handshake:
//!
//! 1. **`AwaitingInit`**: only `initialize` and `ping` are accepted
//! 2. **`Initialising`**: `initialize` answered, waiting for
//!    `notifications/initialized`
//! 3. **`Running`**: normal operation
//!
//! A stateless server (streamable HTTP without sessions) starts in `Running`
//! and answers `initialize` on every call, because consecutive requests may
//! come from different clients.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::chart::LinkBuilder;
use crate::mcp::protocol::{
    negotiate_version, parse_message, IncomingMessage, JsonRpcError, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, OutgoingMessage, SERVER_NAME,
};
use crate::mcp::tools::{self, Tool, ToolCallResult};

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize answered, waiting for the initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities. The tool list never changes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: &'static str,
    /// Server version.
    pub version: &'static str,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Dispatches MCP messages for one connection.
#[derive(Debug)]
pub struct McpServer {
    state: ServerState,
    stateless: bool,
    protocol_version: Option<&'static str>,
    client: Option<ClientInfo>,
    links: LinkBuilder,
}

impl McpServer {
    /// Creates a server for one session, awaiting `initialize`.
    #[must_use]
    pub const fn new(links: LinkBuilder) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            stateless: false,
            protocol_version: None,
            client: None,
            links,
        }
    }

    /// Creates a server that handles every call independently.
    #[must_use]
    pub const fn stateless(links: LinkBuilder) -> Self {
        Self {
            state: ServerState::Running,
            stateless: true,
            protocol_version: None,
            client: None,
            links,
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the negotiated protocol version, once `initialize` succeeded.
    #[must_use]
    pub const fn protocol_version(&self) -> Option<&'static str> {
        self.protocol_version
    }

    /// Returns the client's self-reported name, if it sent one.
    #[must_use]
    pub fn client_name(&self) -> Option<&str> {
        self.client.as_ref().map(|c| c.name.as_str())
    }

    /// Handles one line of text and returns the serialised reply, if any.
    ///
    /// Blank lines and notifications produce no reply. Malformed JSON
    /// produces a parse-error reply rather than an error.
    pub fn handle_line(&mut self, line: &str) -> Option<String> {
        if line.trim().is_empty() {
            return None;
        }
        self.handle_text(line).map(|msg| msg.to_line())
    }

    /// Parses and handles one message.
    pub fn handle_text(&mut self, text: &str) -> Option<OutgoingMessage> {
        match parse_message(text) {
            Ok(msg) => self.handle_message(msg),
            Err(error) => {
                debug!(code = error.error.code, "Rejected malformed message");
                Some(error.into())
            }
        }
    }

    /// Handles a parsed message.
    pub fn handle_message(&mut self, msg: IncomingMessage) -> Option<OutgoingMessage> {
        match msg {
            IncomingMessage::Request(req) => Some(self.handle_request(&req)),
            IncomingMessage::Notification(ref notif) => {
                self.handle_notification(notif);
                None
            }
        }
    }

    fn handle_request(&mut self, req: &JsonRpcRequest) -> OutgoingMessage {
        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(req),
            "ping" => Ok(JsonRpcResponse::success(req.id.clone(), json!({}))),
            "tools/list" => self.handle_tools_list(req),
            "tools/call" => self.handle_tools_call(req),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        match response {
            Ok(resp) => resp.into(),
            Err(error) => error.into(),
        }
    }

    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" => {
                if self.state == ServerState::Initialising {
                    self.state = ServerState::Running;
                    debug!("Client initialised");
                }
            }
            other => debug!(method = other, "Ignoring notification"),
        }
    }

    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if !self.stateless && self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::invalid_request_with(
                req.id.clone(),
                "Server already initialised",
            ));
        }

        let params: InitializeParams = req
            .params
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| {
                JsonRpcError::invalid_params(
                    req.id.clone(),
                    format!("Invalid initialize params: {e}"),
                )
            })?
            .ok_or_else(|| {
                JsonRpcError::invalid_params(req.id.clone(), "Missing initialize params")
            })?;

        let version = negotiate_version(&params.protocol_version);
        if version != params.protocol_version {
            warn!(
                requested = %params.protocol_version,
                offered = version,
                "Client requested an unsupported protocol version"
            );
        }

        if let Some(client) = &params.client_info {
            info!(
                client = %client.name,
                client_version = client.version.as_deref().unwrap_or("unknown"),
                protocol_version = version,
                "Client connected"
            );
        }

        self.protocol_version = Some(version);
        self.client = params.client_info;
        if !self.stateless {
            self.state = ServerState::Initialising;
        }

        let result = json!({
            "protocolVersion": version,
            "capabilities": ServerCapabilities { tools: ToolCapabilities::default() },
            "serverInfo": ServerInfo::default(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_initialised(req)?;

        let result = json!({ "tools": tools::definitions() });
        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    fn handle_tools_call(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_initialised(req)?;

        let params: ToolCallParams = req
            .params
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| {
                JsonRpcError::invalid_params(
                    req.id.clone(),
                    format!("Invalid tool call params: {e}"),
                )
            })?
            .ok_or_else(|| {
                JsonRpcError::invalid_params(req.id.clone(), "Missing tool call params")
            })?;

        let result = match Tool::from_name(&params.name) {
            Some(tool) => {
                debug!(tool = tool.name(), "Calling tool");
                tools::call(tool, &params.arguments, &self.links)
            }
            None => {
                warn!(tool = %params.name, "Unknown tool requested");
                ToolCallResult::error(format!("Unknown tool: {}", params.name))
            }
        };

        let value = serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(
                req.id.clone(),
                "Internal error: failed to serialise result",
            )
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), value))
    }

    /// Rejects work before the handshake has started.
    ///
    /// `Initialising` is accepted: some clients pipeline `tools/list` right
    /// behind `notifications/initialized` on a different channel.
    fn require_initialised(&self, req: &JsonRpcRequest) -> Result<(), JsonRpcError> {
        if self.state == ServerState::AwaitingInit {
            return Err(JsonRpcError::invalid_request_with(
                req.id.clone(),
                "Server not initialised",
            ));
        }
        Ok(())
    }
}

/// Creates servers for new connections.
///
/// Every session gets its own [`McpServer`]; all of them share one
/// [`LinkBuilder`].
#[derive(Debug, Clone, Default)]
pub struct ServerFactory {
    links: LinkBuilder,
}

impl ServerFactory {
    /// Creates a factory whose servers build links with `links`.
    #[must_use]
    pub const fn new(links: LinkBuilder) -> Self {
        Self { links }
    }

    /// A fresh server for one session.
    #[must_use]
    pub fn session(&self) -> McpServer {
        McpServer::new(self.links.clone())
    }

    /// A fresh server for one independent call.
    #[must_use]
    pub fn stateless(&self) -> McpServer {
        McpServer::stateless(self.links.clone())
    }
}
