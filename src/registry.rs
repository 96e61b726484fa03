use std::collections::HashMap;
use std::sync::Arc;

use crate::server::ToolHandler;
use crate::types::{McpError, Tool};

/// A registered tool: its advertised definition plus the handler behind it.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub tool: Tool,
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("tool", &self.tool.name)
            .finish_non_exhaustive()
    }
}

/// Name-keyed tool table.
///
/// Filled during startup and then moved into the [`Server`](crate::Server),
/// which only ever reads it. There is no removal.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A name that is already taken is rejected and the
    /// existing entry stays as it was.
    pub fn register(&mut self, tool: Tool, handler: Arc<dyn ToolHandler>) -> Result<(), McpError> {
        if self.tools.contains_key(&tool.name) {
            return Err(McpError::DuplicateTool(tool.name));
        }
        tracing::debug!(tool = %tool.name, "registered tool");
        self.tools
            .insert(tool.name.clone(), ToolDescriptor { tool, handler });
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Tool definitions for capability advertisement, sorted by name.
    pub fn list_descriptors(&self) -> Vec<&Tool> {
        let mut tools: Vec<&Tool> = self.tools.values().map(|d| &d.tool).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
