//! Error types for chanwatch

use thiserror::Error;

/// Result type alias using chanwatch Error
pub type Result<T> = std::result::Result<T, Error>;

/// Chanwatch error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("MCP server '{server}': {source}")]
    Mcp {
        server: String,
        #[source]
        source: chanwatch_mcp::McpError,
    },
}

impl Error {
    pub fn mcp(server: impl Into<String>, source: chanwatch_mcp::McpError) -> Self {
        Self::Mcp {
            server: server.into(),
            source,
        }
    }
}

/// Tool-specific errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    NotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}
