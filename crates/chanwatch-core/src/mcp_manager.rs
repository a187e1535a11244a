//! MCP (Model Context Protocol) Server Manager
//!
//! Manages the lifecycle of the tool servers the agent talks to: starting,
//! stopping, and discovering tools.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chanwatch_mcp::{ClientInfo, McpClient, McpError, StdioTransport};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::McpServerConfig;
use crate::error::{Error, Result};

type StdioClient = McpClient<StdioTransport>;

/// Status of an MCP server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum McpServerStatus {
    /// Server is not running
    Stopped,
    /// Server is starting up
    Starting,
    /// Server is running and ready
    Running,
    /// Server failed to start or crashed
    Failed(String),
}

/// Information about a tool provided by an MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolInfo {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// Input schema (JSON Schema)
    pub input_schema: Value,
    /// Server that provides this tool
    pub server: String,
}

/// Summary information about an MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerInfo {
    /// Server name
    pub name: String,
    /// Command used to start the server
    pub command: String,
    /// Whether the server is started with the monitor
    pub enabled: bool,
    /// Current status
    pub status: McpServerStatus,
    /// Number of tools provided
    pub tool_count: usize,
}

struct McpServerInstance {
    config: McpServerConfig,
    status: McpServerStatus,
    client: Option<Arc<StdioClient>>,
    tools: Vec<McpToolInfo>,
}

impl McpServerInstance {
    fn stopped(config: McpServerConfig) -> Self {
        Self {
            config,
            status: McpServerStatus::Stopped,
            client: None,
            tools: Vec::new(),
        }
    }
}

/// Manager for MCP servers
///
/// The server table sits behind a synchronous lock that is never held
/// across an await; each running server owns its own client, which
/// serializes requests to that server.
pub struct McpServerManager {
    servers: Mutex<BTreeMap<String, McpServerInstance>>,
    client_info: ClientInfo,
}

impl Default for McpServerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl McpServerManager {
    /// Create a new MCP server manager
    pub fn new() -> Self {
        Self {
            servers: Mutex::new(BTreeMap::new()),
            client_info: ClientInfo::new("chanwatch", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Initialize the manager with server configurations
    pub fn with_configs(configs: HashMap<String, McpServerConfig>) -> Self {
        let manager = Self::new();
        {
            let mut servers = manager.servers.lock();
            for (name, config) in configs {
                servers.insert(name, McpServerInstance::stopped(config));
            }
        }
        manager
    }

    /// Add a server configuration, replacing any stopped entry of the same name
    pub fn add_server(&self, name: impl Into<String>, config: McpServerConfig) {
        self.servers
            .lock()
            .insert(name.into(), McpServerInstance::stopped(config));
    }

    /// Start an MCP server by name and discover its tools
    pub async fn start_server(&self, name: &str) -> Result<()> {
        let config = {
            let mut servers = self.servers.lock();
            let instance = servers
                .get_mut(name)
                .ok_or_else(|| Error::Config(format!("Unknown tool server '{}'", name)))?;
            if instance.status == McpServerStatus::Running {
                return Ok(());
            }
            instance.status = McpServerStatus::Starting;
            instance.config.clone()
        };

        match self.connect(name, &config).await {
            Ok((client, tools)) => {
                tracing::info!(server = name, tools = tools.len(), "tool server running");
                let mut servers = self.servers.lock();
                if let Some(instance) = servers.get_mut(name) {
                    instance.client = Some(Arc::new(client));
                    instance.tools = tools;
                    instance.status = McpServerStatus::Running;
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(server = name, error = %e, "tool server failed to start");
                if let Some(instance) = self.servers.lock().get_mut(name) {
                    instance.status = McpServerStatus::Failed(e.to_string());
                }
                Err(e)
            }
        }
    }

    async fn connect(
        &self,
        name: &str,
        config: &McpServerConfig,
    ) -> Result<(StdioClient, Vec<McpToolInfo>)> {
        let env = config.resolve_env(name)?;

        tracing::debug!(server = name, command = %config.command, args = ?config.args, "starting tool server");
        let transport = StdioTransport::spawn(&config.command, &config.args, &env)
            .await
            .map_err(|e| Error::mcp(name, McpError::Transport(e.to_string())))?;

        let mut client = McpClient::new(transport);
        let handshake = async {
            let info = client.initialize(self.client_info.clone()).await?;
            tracing::debug!(
                server = name,
                remote = %info.name,
                version = %info.version,
                protocol = %info.protocol_version,
                "tool server initialized"
            );
            let tools = client.list_tools().await?;
            Ok::<_, McpError>(tools)
        };

        match handshake.await {
            Ok(listed) => {
                let tools = listed
                    .into_iter()
                    .map(|t| McpToolInfo {
                        name: t.name,
                        description: t.description,
                        input_schema: t.input_schema,
                        server: name.to_string(),
                    })
                    .collect();
                Ok((client, tools))
            }
            Err(e) => {
                let _ = client.close().await;
                Err(Error::mcp(name, e))
            }
        }
    }

    /// Start every enabled server in name order
    ///
    /// Fails on the first server that cannot start; servers started before
    /// it are stopped again so no subprocess outlives a failed startup.
    pub async fn start_all(&self) -> Result<()> {
        let enabled: Vec<String> = self
            .servers
            .lock()
            .iter()
            .filter(|(_, s)| s.config.enabled)
            .map(|(name, _)| name.clone())
            .collect();

        let mut started: Vec<String> = Vec::with_capacity(enabled.len());
        for name in enabled {
            if let Err(e) = self.start_server(&name).await {
                for running in started.iter().rev() {
                    let _ = self.stop_server(running).await;
                }
                return Err(e);
            }
            started.push(name);
        }
        Ok(())
    }

    /// Stop an MCP server by name
    pub async fn stop_server(&self, name: &str) -> Result<()> {
        let client = {
            let mut servers = self.servers.lock();
            let instance = servers
                .get_mut(name)
                .ok_or_else(|| Error::Config(format!("Unknown tool server '{}'", name)))?;
            instance.status = McpServerStatus::Stopped;
            instance.tools.clear();
            instance.client.take()
        };

        if let Some(client) = client {
            tracing::debug!(server = name, "stopping tool server");
            client.close().await.map_err(|e| Error::mcp(name, e))?;
        }
        Ok(())
    }

    /// Stop all running servers
    pub async fn stop_all(&self) -> Vec<(String, Result<()>)> {
        let running: Vec<String> = self
            .servers
            .lock()
            .iter()
            .filter(|(_, s)| s.client.is_some())
            .map(|(name, _)| name.clone())
            .collect();

        let mut results = Vec::with_capacity(running.len());
        for name in running {
            let result = self.stop_server(&name).await;
            if let Err(e) = &result {
                tracing::warn!(server = %name, error = %e, "tool server did not stop cleanly");
            }
            results.push((name, result));
        }
        results
    }

    /// List all servers and their status
    pub fn list_servers(&self) -> Vec<McpServerInfo> {
        self.servers
            .lock()
            .iter()
            .map(|(name, s)| McpServerInfo {
                name: name.clone(),
                command: s.config.command.clone(),
                enabled: s.config.enabled,
                status: s.status.clone(),
                tool_count: s.tools.len(),
            })
            .collect()
    }

    /// Get all tools from all running servers
    pub fn get_all_tools(&self) -> Vec<McpToolInfo> {
        self.servers
            .lock()
            .values()
            .filter(|s| s.status == McpServerStatus::Running)
            .flat_map(|s| s.tools.clone())
            .collect()
    }

    /// Get tools from a specific server
    pub fn get_server_tools(&self, name: &str) -> Option<Vec<McpToolInfo>> {
        self.servers.lock().get(name).map(|s| s.tools.clone())
    }

    /// Execute a tool call on an MCP server
    pub async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<chanwatch_mcp::ToolCallResult> {
        let client = {
            let servers = self.servers.lock();
            let instance = servers
                .get(server_name)
                .ok_or_else(|| Error::Config(format!("Unknown tool server '{}'", server_name)))?;
            instance.client.clone().ok_or_else(|| {
                Error::mcp(
                    server_name,
                    McpError::Transport("server is not running".to_string()),
                )
            })?
        };

        tracing::debug!(server = server_name, tool = tool_name, "calling tool");
        client
            .call_tool(tool_name, arguments)
            .await
            .map_err(|e| Error::mcp(server_name, e))
    }
}
