//! Model Context Protocol (MCP) server implementation.
//!
//! This module exposes chhart.app link generation as MCP tools. It is
//! transport-agnostic: [`McpServer`] consumes JSON-RPC 2.0 text and produces
//! JSON-RPC 2.0 text, and the bindings in [`crate::transport`] move that text
//! over stdio or HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         MCP Server                          │
//! │                                                             │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │   │  Transport  │───▶│   Server    │───▶│   Tools     │     │
//! │   │ (any kind)  │    │ (lifecycle) │    │ (handlers)  │     │
//! │   └─────────────┘    └─────────────┘    └─────────────┘     │
//! │          │                  │                  │            │
//! │          ▼                  ▼                  ▼            │
//! │   ┌─────────────────────────────────────────────────┐       │
//! │   │              JSON-RPC Messages                  │       │
//! │   └─────────────────────────────────────────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! Protocol versions 2025-06-18, 2025-03-26 and 2024-11-05 are accepted;
//! anything else is answered with the newest.

pub mod protocol;
pub mod server;
pub mod tools;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::{McpServer, ServerFactory, ServerState};
pub use tools::{Tool, ToolCallResult};
