use serde_json::Value;

use crate::loader;
use crate::registry::ToolRegistry;
use crate::server::FnToolHandler;
use crate::types::{text_result, McpError, Tool, ToolResult};

pub fn register(registry: &mut ToolRegistry, defs: &[Tool]) -> Result<(), McpError> {
    let def = loader::find_tool(defs, "ping")?;
    registry.register(
        def,
        FnToolHandler::new(|args: Value| async move { handle_ping(args).await }),
    )
}

async fn handle_ping(args: Value) -> Result<ToolResult, McpError> {
    let message = args
        .get("message")
        .and_then(|v| v.as_str())
        .filter(|m| !m.is_empty())
        .unwrap_or("<no message>");
    Ok(text_result(format!("Pong! Message: {}", message)))
}
