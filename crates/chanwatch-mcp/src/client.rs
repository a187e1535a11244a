//! MCP Client implementation

use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;

use serde_json::Value;

use crate::protocol::{
    is_response, methods, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
use crate::transport::Transport;
use crate::{McpTool, ServerCapabilities, PROTOCOL_VERSION};

/// MCP Client for connecting to MCP servers
pub struct McpClient<T: Transport> {
    transport: Mutex<T>,
    request_id: AtomicI64,
    server_capabilities: Option<ServerCapabilities>,
}

impl<T: Transport> McpClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Mutex::new(transport),
            request_id: AtomicI64::new(1),
            server_capabilities: None,
        }
    }

    fn next_id(&self) -> RequestId {
        RequestId::Number(self.request_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Capabilities reported by the server during `initialize`
    pub fn server_capabilities(&self) -> Option<&ServerCapabilities> {
        self.server_capabilities.as_ref()
    }

    /// Initialize the connection
    pub async fn initialize(&mut self, client_info: ClientInfo) -> Result<ServerInfo, McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": client_info.name,
                "version": client_info.version
            }
        });

        let request = JsonRpcRequest::new(self.next_id(), methods::INITIALIZE).with_params(params);

        let result = self.send_request(request).await?;
        let server_info: InitializeResult =
            serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))?;

        self.server_capabilities = Some(server_info.capabilities.clone());

        let notification = serde_json::to_value(JsonRpcNotification::new(methods::INITIALIZED))
            .map_err(|e| McpError::Protocol(e.to_string()))?;

        let mut transport = self.transport.lock().await;
        transport
            .send(notification)
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        Ok(ServerInfo {
            name: server_info.server_info.name,
            version: server_info.server_info.version,
            protocol_version: server_info.protocol_version,
        })
    }

    /// List available tools
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let request = JsonRpcRequest::new(self.next_id(), methods::TOOLS_LIST);
        let result = self.send_request(request).await?;

        let tools_result: ToolsListResult =
            serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))?;
        Ok(tools_result.tools)
    }

    /// Call a tool
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments
        });

        let request = JsonRpcRequest::new(self.next_id(), methods::TOOLS_CALL).with_params(params);

        let result = self.send_request(request).await?;
        serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))
    }

    /// Shut down the underlying transport
    pub async fn close(&self) -> Result<(), McpError> {
        let mut transport = self.transport.lock().await;
        transport
            .close()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))
    }

    /// Send a request and wait for the response with the same id.
    ///
    /// The transport lock is held for the whole exchange, so requests on one
    /// client never interleave.
    async fn send_request(&self, request: JsonRpcRequest) -> Result<Value, McpError> {
        let mut transport = self.transport.lock().await;

        let request_id = request.id.clone();
        let method = request.method.clone();
        let request_value =
            serde_json::to_value(&request).map_err(|e| McpError::Protocol(e.to_string()))?;

        transport
            .send(request_value)
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        loop {
            let message = transport
                .receive()
                .await
                .map_err(|e| McpError::Transport(e.to_string()))?
                .ok_or_else(|| McpError::Transport("Connection closed".to_string()))?;

            if !is_response(&message) {
                // Answer liveness pings; everything else the server sends
                // unprompted is not ours to handle.
                if message.get("method").and_then(|m| m.as_str()) == Some("ping")
                    && let Some(id) = message.get("id")
                {
                    let pong = serde_json::json!({"jsonrpc": "2.0", "id": id, "result": {}});
                    transport
                        .send(pong)
                        .await
                        .map_err(|e| McpError::Transport(e.to_string()))?;
                } else {
                    tracing::debug!(%method, ?message, "skipping server message while awaiting response");
                }
                continue;
            }

            let response: JsonRpcResponse =
                serde_json::from_value(message).map_err(|e| McpError::Protocol(e.to_string()))?;

            // A null id only comes with an error the server could not tie to a request
            if let Some(id) = &response.id
                && *id != request_id
            {
                tracing::warn!(expected = %request_id, got = %id, "discarding response with unexpected id");
                continue;
            }

            if let Some(error) = response.error {
                return Err(McpError::Server(format!("{} (code {})", error.message, error.code)));
            }
            return response
                .result
                .ok_or_else(|| McpError::Protocol("Empty response".to_string()));
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl ClientInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub protocol_version: String,
}

#[derive(Debug, serde::Deserialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    protocol_version: String,
    #[serde(default)]
    capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    server_info: ServerInfoInner,
}

#[derive(Debug, serde::Deserialize)]
struct ServerInfoInner {
    name: String,
    #[serde(default)]
    version: String,
}

#[derive(Debug, serde::Deserialize)]
struct ToolsListResult {
    #[serde(default)]
    tools: Vec<McpTool>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// All text content items joined by newlines
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|item| item.content_type == "text")
            .filter_map(|item| item.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// MCP errors
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Server error: {0}")]
    Server(String),
}
