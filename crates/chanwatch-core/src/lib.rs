//! Chanwatch Core - a chat channel monitored by an LLM agent
//!
//! This crate provides the core functionality for the chanwatch binary:
//! - Configuration and credential resolution
//! - MCP tool servers and the tools they expose
//! - The LLM agent and its tool-calling loop
//! - The monitor loop that drives the agent on a timer

pub mod agent;
pub mod config;
pub mod error;
pub mod mcp_manager;
pub mod monitor;
pub mod prompt;
pub mod provider;
pub mod session;
pub mod tools;

pub use agent::{Agent, EventStream, LlmAgent, Part, ResponseEvent};
pub use config::{AgentConfig, Config, ConfigManager, McpServerConfig, MonitorConfig};
pub use error::{Error, Result, ToolError};
pub use mcp_manager::{McpServerInfo, McpServerManager, McpServerStatus, McpToolInfo};
pub use monitor::{Monitor, MonitorContext, MonitorSummary, TurnOutcome, TurnReport};
pub use prompt::{TurnKind, TurnRequest};
pub use provider::{create_provider, CompletionResult, GenAIProvider, LlmProvider, ProviderType};
pub use session::Session;
pub use tools::{Tool, ToolDefinition, ToolOutput, ToolRegistry};
