//! chhart-mcp: MCP server that turns diagram outlines into chhart.app links
//!
//! Clients describe a flowchart in chhart's indentation DSL, or a Sankey
//! diagram as a list of weighted flows, and get back a shareable URL with
//! the diagram encoded in its fragment. Nothing is stored server-side.
//!
//! # Architecture
//!
//! - **Tools**: `create_flowchart`, `create_sankey`, `get_syntax_help`
//! - **Transports**: stdio, SSE with a POST side channel, streamable HTTP
//! - **Sessions**: per-client servers, a registry for HTTP routing, and a
//!   keep-alive heartbeat on event streams
//!
//! # Modules
//!
//! - [`chart`]: token codec, link builder, syntax reference
//! - [`config`]: configuration loading and validation
//! - [`error`]: error types
//! - [`mcp`]: JSON-RPC protocol and tool dispatch
//! - [`transport`]: stdio and HTTP bindings

pub mod chart;
pub mod config;
pub mod error;
pub mod mcp;
pub mod transport;
