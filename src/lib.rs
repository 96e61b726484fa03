//! `mcpstdio`: a minimal MCP (Model Context Protocol) server host over stdio.
//!
//! Reads JSON-RPC requests from standard input, dispatches them to a table of
//! named, schema-validated tools, and writes responses to standard output.
//! Diagnostics go to stderr; lifecycle and per-call events go to a durable
//! event log file. Standard output carries protocol bytes only.
//!
//! # Quick start
//!
//! ```rust
//! use mcpstdio::{text_result, tools, FnToolHandler, Server, ToolRegistry};
//! use serde_json::Value;
//!
//! # async fn example() -> Result<(), mcpstdio::McpError> {
//! let mut registry = ToolRegistry::new();
//! tools::register_builtin(&mut registry)?;
//!
//! let defs = mcpstdio::parse_tools(br#"[{"name":"echo","inputSchema":{"type":"object","properties":{"message":{"type":"string"}},"required":["message"]}}]"#)?;
//! registry.register(defs[0].clone(), FnToolHandler::new(|args: Value| async move {
//!     let msg = args.get("message").and_then(|v| v.as_str()).unwrap_or("");
//!     Ok(text_result(msg))
//! }))?;
//!
//! let server = Server::builder()
//!     .registry(registry)
//!     .server_info("my-server", "0.1.0")
//!     .build()?;
//!
//! server.handle_message(br#"{"id":0,"method":"initialize"}"#).await;
//! let resp = server
//!     .handle_message(br#"{"id":1,"method":"echo","params":{"message":"hi"}}"#)
//!     .await
//!     .expect("requests with an id are answered");
//! let json = serde_json::to_string(&resp)?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod loader;
pub mod logger;
pub mod registry;
pub mod server;
pub mod supervisor;
pub mod tools;
pub mod transport;
pub mod types;
mod validate;

// Re-export the most commonly used items at the crate root.
pub use codec::Framing;
pub use config::Config;
pub use loader::{find_tool, parse_tools};
pub use logger::EventLog;
pub use registry::{ToolDescriptor, ToolRegistry};
pub use server::{FnToolHandler, Server, ServerBuilder, ToolHandler};
pub use supervisor::{Exit, Supervisor};
pub use transport::{ResponseOrder, ServeOptions, SessionEnd, StdioTransport, StreamTransport};
pub use types::{
    text_result, ContentBlock, DispatchError, JsonRpcRequest, JsonRpcResponse,
    McpError, McpResponse, RpcError, Tool, ToolResult, PROTOCOL_VERSION,
};
