//! Built-in tools. Definitions (name, description, input schema) come from
//! `tools.json`; each submodule attaches the handler for its tools.

pub mod ping;

use crate::loader;
use crate::registry::ToolRegistry;
use crate::types::McpError;

const TOOL_DEFINITIONS: &[u8] = include_bytes!("../../tools.json");

/// Register all built-in tools.
pub fn register_builtin(registry: &mut ToolRegistry) -> Result<(), McpError> {
    let defs = loader::parse_tools(TOOL_DEFINITIONS)?;
    ping::register(registry, &defs)?;
    Ok(())
}
