//! Configuration management for chanwatch
//!
//! Handles loading and saving the TOML configuration: which LLM drives the
//! agent, which channel to watch and how often, and which MCP tool servers
//! to launch with which credentials.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::provider::ProviderType;

/// Environment variable consulted when `monitor.channel_id` is not set
pub const CHANNEL_ID_ENV: &str = "CHANWATCH_CHANNEL_ID";

/// `${VAR}` references inside tool server environment values
static ENV_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// LLM agent settings
    #[serde(default)]
    pub agent: AgentConfig,
    /// Poll loop settings
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Tool servers, keyed by the name the tools are registered under
    #[serde(default = "default_mcp_servers")]
    pub mcp_servers: HashMap<String, McpServerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            monitor: MonitorConfig::default(),
            mcp_servers: default_mcp_servers(),
        }
    }
}

fn default_mcp_servers() -> HashMap<String, McpServerConfig> {
    let mut servers = HashMap::new();
    servers.insert(
        "maps".to_string(),
        McpServerConfig::new("npx")
            .with_args(vec![
                "-y".to_string(),
                "@modelcontextprotocol/server-google-maps".to_string(),
            ])
            .with_env("GOOGLE_MAPS_API_KEY", "${GOOGLE_MAPS_API_KEY}"),
    );
    servers.insert(
        "airbnb".to_string(),
        McpServerConfig::new("npx").with_args(vec![
            "-y".to_string(),
            "@openbnb/mcp-server-airbnb".to_string(),
            "--ignore-robots-txt".to_string(),
        ]),
    );
    servers.insert(
        "slack".to_string(),
        McpServerConfig::new("npx")
            .with_args(vec![
                "-y".to_string(),
                "@modelcontextprotocol/server-slack".to_string(),
            ])
            .with_env("SLACK_BOT_TOKEN", "${SLACK_BOT_TOKEN}")
            .with_env("SLACK_TEAM_ID", "${SLACK_TEAM_ID}")
            .with_env("SLACK_CHANNEL_IDS", "${SLACK_CHANNEL_IDS}"),
    );
    servers
}

impl Config {
    /// Check everything `initialize` needs, using the process environment
    pub fn validate(&self) -> Result<()> {
        self.validate_with(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::validate`] with an explicit variable lookup
    pub fn validate_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if self.monitor.interval_secs == 0 {
            return Err(Error::Config("monitor.interval_secs must be greater than zero".to_string()));
        }
        self.monitor.channel_id_with(&lookup)?;

        let provider = self.agent.provider_type()?;
        if provider.requires_api_key() && self.agent.api_key_with(&lookup).is_none() {
            return Err(Error::Config(format!(
                "No API key configured for {}. Set agent.api_key or {}",
                provider,
                self.agent.api_key_env_names().join(" / ")
            )));
        }

        for (name, server) in self.enabled_servers() {
            server.resolve_env_with(name, &lookup)?;
        }
        Ok(())
    }

    /// Enabled tool servers sorted by name, so startup order is stable
    pub fn enabled_servers(&self) -> Vec<(&str, &McpServerConfig)> {
        let mut servers: Vec<_> = self
            .mcp_servers
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(name, s)| (name.as_str(), s))
            .collect();
        servers.sort_by_key(|(name, _)| *name);
        servers
    }
}

/// LLM agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Provider type: "gemini", "anthropic", "openai", etc.
    pub provider: String,
    /// Model to use (defaults to the provider's default model)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// API key (prefer the environment)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable name for the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Agent name, used as the author of response events
    pub name: String,
    /// Replaces the built-in instruction text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    /// Model round-trips allowed in a single turn
    pub max_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: None,
            api_key: None,
            api_key_env: None,
            name: "channel_assistant".to_string(),
            instruction: None,
            max_iterations: 25,
        }
    }
}

impl AgentConfig {
    pub fn provider_type(&self) -> Result<ProviderType> {
        self.provider.parse().map_err(Error::Config)
    }

    /// Model name, falling back to the provider default
    pub fn model_name(&self) -> Result<String> {
        match &self.model {
            Some(model) if !model.is_empty() => Ok(model.clone()),
            _ => Ok(self.provider_type()?.default_model().to_string()),
        }
    }

    /// Environment variables checked for the API key, in order
    pub fn api_key_env_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(env) = &self.api_key_env {
            names.push(env.clone());
        }
        if let Ok(provider) = self.provider_type() {
            names.extend(provider.api_key_envs().iter().map(|s| s.to_string()));
        }
        names
    }

    /// Get the API key, checking environment variables if not set directly
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key_with(|name| std::env::var(name).ok())
    }

    pub fn api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        if let Some(key) = &self.api_key
            && !key.is_empty()
        {
            return Some(key.clone());
        }

        self.api_key_env_names()
            .iter()
            .filter_map(|name| lookup(name.as_str()))
            .find(|key| !key.is_empty())
    }
}

/// Poll loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Channel the agent reads from and posts to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Seconds to sleep between turns
    pub interval_secs: u64,
    /// Session identity
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    /// Completed turns kept in the session history
    pub history_turns: usize,
    /// Characters of each response fragment shown in the log
    pub preview_chars: usize,
    /// Characters of the error text included in the error notice
    pub error_excerpt_chars: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            channel_id: None,
            interval_secs: 30,
            app_name: "chanwatch".to_string(),
            user_id: "chanwatch_bot".to_string(),
            session_id: "monitoring_session".to_string(),
            history_turns: 20,
            preview_chars: 150,
            error_excerpt_chars: 100,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Channel id from config, falling back to `CHANWATCH_CHANNEL_ID`
    pub fn channel_id(&self) -> Result<String> {
        self.channel_id_with(|name| std::env::var(name).ok())
    }

    pub fn channel_id_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
        self.channel_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| lookup(CHANNEL_ID_ENV).filter(|id| !id.is_empty()))
            .ok_or_else(|| {
                Error::Config(format!(
                    "No channel configured. Set monitor.channel_id or {}",
                    CHANNEL_ID_ENV
                ))
            })
    }
}

/// How to launch one MCP tool server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment; values may reference credentials as `${VAR}`
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl McpServerConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            enabled: true,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Credential variables this server needs
    pub fn required_credentials(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .env
            .values()
            .flat_map(|value| ENV_REF.captures_iter(value).map(|c| c[1].to_string()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Expand `${VAR}` references from the process environment
    pub fn resolve_env(&self, server_name: &str) -> Result<HashMap<String, String>> {
        self.resolve_env_with(server_name, |name| std::env::var(name).ok())
    }

    pub fn resolve_env_with(
        &self,
        server_name: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<HashMap<String, String>> {
        let mut resolved = HashMap::with_capacity(self.env.len());
        for (key, value) in &self.env {
            let mut missing = None;
            let expanded = ENV_REF.replace_all(value, |caps: &regex::Captures<'_>| {
                match lookup(&caps[1]).filter(|v| !v.is_empty()) {
                    Some(v) => v,
                    None => {
                        missing.get_or_insert_with(|| caps[1].to_string());
                        String::new()
                    }
                }
            });
            if let Some(var) = missing {
                return Err(Error::Config(format!(
                    "Missing credential {} required by tool server '{}'",
                    var, server_name
                )));
            }
            resolved.insert(key.clone(), expanded.into_owned());
        }
        Ok(resolved)
    }
}

/// Configuration manager for loading and saving config
pub struct ConfigManager {
    config_path: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::with_path(config_path)
    }

    /// Create a config manager with a specific path
    pub fn with_path(config_path: PathBuf) -> Result<Self> {
        let config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            tracing::debug!(path = %config_path.display(), "config file not found, using defaults");
            Config::default()
        };

        Ok(Self { config_path, config })
    }

    /// Get the default config path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".to_string()))?;

        Ok(config_dir.join("chanwatch").join("config.toml"))
    }

    /// Load configuration from a file
    fn load_from_path(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Get the current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get mutable access to configuration
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the manager, keeping only the configuration
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to disk
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&self.config_path, content)
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }
}
