//! MCP Tool Wrapper
//!
//! Exposes each tool discovered on a running MCP server as a [`Tool`] so the
//! agent can call maps, lodging, messaging, lights and calendar tools the
//! same way.

use std::sync::Arc;

use serde_json::Value;

use crate::error::ToolError;
use crate::mcp_manager::{McpServerManager, McpToolInfo};
use crate::tools::{BoxFuture, Tool, ToolOutput};

/// Wrapper that exposes an MCP tool as an agent Tool
pub struct McpToolWrapper {
    tool_info: McpToolInfo,
    manager: Arc<McpServerManager>,
    /// mcp__{server}__{tool}
    prefixed_name: String,
}

impl McpToolWrapper {
    pub fn new(tool_info: McpToolInfo, manager: Arc<McpServerManager>) -> Self {
        // Servers may expose tools with the same name
        let prefixed_name = format!(
            "mcp__{}__{}",
            tool_info.server.replace('-', "_"),
            tool_info.name.replace('-', "_")
        );

        Self {
            tool_info,
            manager,
            prefixed_name,
        }
    }

    /// Get the server name this tool belongs to
    pub fn server_name(&self) -> &str {
        &self.tool_info.server
    }

    /// Get the original MCP tool name (without prefix)
    pub fn original_name(&self) -> &str {
        &self.tool_info.name
    }
}

impl Tool for McpToolWrapper {
    fn name(&self) -> &str {
        &self.prefixed_name
    }

    fn description(&self) -> &str {
        &self.tool_info.description
    }

    fn parameters_schema(&self) -> Value {
        match &self.tool_info.input_schema {
            Value::Null => serde_json::json!({ "type": "object", "properties": {} }),
            schema => schema.clone(),
        }
    }

    fn execute(&self, params: Value) -> BoxFuture<'_, Result<ToolOutput, ToolError>> {
        Box::pin(async move {
            let result = self
                .manager
                .call_tool(&self.tool_info.server, &self.tool_info.name, params)
                .await
                .map_err(|e| {
                    ToolError::ExecutionFailed(format!(
                        "MCP tool '{}' on server '{}' failed: {}",
                        self.tool_info.name, self.tool_info.server, e
                    ))
                })?;

            let text = result.text();
            if result.is_error {
                let message = if text.is_empty() {
                    "MCP tool execution failed".to_string()
                } else {
                    text
                };
                return Ok(ToolOutput::error(message));
            }

            let content = if text.is_empty() {
                serde_json::to_value(&result.content)
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?
            } else {
                Value::String(text)
            };

            Ok(ToolOutput::success(content)
                .with_metadata("mcp_server", self.tool_info.server.clone())
                .with_metadata("mcp_tool", self.tool_info.name.clone()))
        })
    }
}

/// Create tool wrappers for all tools from all running MCP servers
pub fn create_mcp_tools(manager: Arc<McpServerManager>) -> Vec<Arc<dyn Tool>> {
    manager
        .get_all_tools()
        .into_iter()
        .map(|tool_info| Arc::new(McpToolWrapper::new(tool_info, manager.clone())) as Arc<dyn Tool>)
        .collect()
}
