//! Model Context Protocol (MCP) server implementation
//!
//! Provides a JSON-RPC 2.0 request handler for AI assistant clients,
//! exposing workspace prompts, resources and the `focal_rules` tool.
//! Transports (stdio here, HTTP in [`crate::api`]) own the per-connection
//! [`SessionState`].

pub mod protocol;
pub mod server;
pub mod tools;

pub use protocol::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
pub use server::{McpServer, SessionState};
pub use tools::ToolHandler;
