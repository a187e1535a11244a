//! GenAI-based LLM provider implementation
//!
//! Uses the genai framework with manual tool control: the model only
//! proposes tool calls, the agent executes them and feeds results back.

use async_trait::async_trait;
use futures::StreamExt;
use genai::chat::{ChatMessage, ChatRequest, ChatStreamEvent, Tool};
use genai::resolver::{AuthData, AuthResolver};
use genai::Client;
use genai::WebConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::catalog;
use super::logging::{log_llm_interaction, LogConfig};
use super::{CompletionResult, LlmProvider};
use crate::error::{Error, Result};
use crate::tools::ToolDefinition;

/// Supported LLM provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Google Gemini
    Gemini,
    /// Anthropic (Claude)
    Anthropic,
    /// OpenAI (GPT-4o, etc.)
    OpenAI,
    /// DeepSeek
    DeepSeek,
    /// Groq (fast inference)
    Groq,
    /// Ollama (local)
    Ollama,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderType::Gemini),
            "anthropic" => Ok(ProviderType::Anthropic),
            "openai" => Ok(ProviderType::OpenAI),
            "deepseek" => Ok(ProviderType::DeepSeek),
            "groq" => Ok(ProviderType::Groq),
            "ollama" => Ok(ProviderType::Ollama),
            _ => Err(format!(
                "Unknown provider: {} (expected one of: {})",
                s,
                catalog::ids().collect::<Vec<_>>().join(", ")
            )),
        }
    }
}

impl ProviderType {
    /// Get the provider type as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Gemini => "gemini",
            ProviderType::Anthropic => "anthropic",
            ProviderType::OpenAI => "openai",
            ProviderType::DeepSeek => "deepseek",
            ProviderType::Groq => "groq",
            ProviderType::Ollama => "ollama",
        }
    }

    /// Get the default model for this provider
    pub fn default_model(&self) -> &'static str {
        catalog::default_model(self.as_str()).unwrap_or("unknown")
    }

    /// Environment variables that may hold the API key
    pub fn api_key_envs(&self) -> &'static [&'static str] {
        catalog::api_key_envs(self.as_str())
    }

    pub fn requires_api_key(&self) -> bool {
        !self.api_key_envs().is_empty()
    }
}

/// A provider implementation using genai
pub struct GenAIProvider {
    client: Client,
    provider_type: ProviderType,
    model: String,
}

impl GenAIProvider {
    /// Default timeout for LLM API requests (5 minutes)
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    fn default_web_config() -> WebConfig {
        WebConfig::default()
            .with_timeout(Self::DEFAULT_TIMEOUT)
            .with_connect_timeout(Duration::from_secs(30))
    }

    /// Create a new provider with default settings (uses environment variables for auth)
    pub fn new(provider_type: ProviderType, model: Option<&str>) -> Self {
        let client = Client::builder()
            .with_web_config(Self::default_web_config())
            .build();
        Self {
            client,
            provider_type,
            model: model.unwrap_or(provider_type.default_model()).to_string(),
        }
    }

    /// Create a provider with a specific API key
    pub fn with_api_key(provider_type: ProviderType, api_key: &str, model: Option<&str>) -> Self {
        let api_key = api_key.to_string();
        let auth_resolver = AuthResolver::from_resolver_fn(
            move |_model_iden| -> std::result::Result<Option<AuthData>, genai::resolver::Error> {
                Ok(Some(AuthData::from_single(api_key.clone())))
            },
        );

        let client = Client::builder()
            .with_web_config(Self::default_web_config())
            .with_auth_resolver(auth_resolver)
            .build();

        Self {
            client,
            provider_type,
            model: model.unwrap_or(provider_type.default_model()).to_string(),
        }
    }

    /// Get the provider type
    pub fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    /// Execute a streamed chat completion and collect text and tool calls
    pub async fn chat(
        &self,
        system: Option<&str>,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<CompletionResult> {
        let mut chat_req = ChatRequest::default();

        if let Some(system) = system {
            chat_req = chat_req.with_system(system);
        }

        for msg in messages {
            chat_req = chat_req.append_message(msg.clone());
        }

        if !tools.is_empty() {
            let genai_tools: Vec<Tool> = tools
                .iter()
                .map(|t| {
                    Tool::new(&t.name)
                        .with_description(&t.description)
                        .with_schema(t.parameters.clone())
                })
                .collect();
            chat_req = chat_req.with_tools(genai_tools);
        }

        let log_failure = |error_msg: &str| {
            log_llm_interaction(LogConfig {
                model: &self.model,
                system_prompt: system,
                messages,
                tools: Some(tools),
                error: Some(error_msg),
                ..Default::default()
            });
        };

        // Streaming avoids request timeouts on long generations
        let stream_response = match self.client.exec_chat_stream(&self.model, chat_req, None).await {
            Ok(response) => response,
            Err(e) => {
                let error_msg = format!("GenAI error: {:?}", e);
                log_failure(&error_msg);
                tracing::error!(error = ?e, model = %self.model, "LLM request failed");
                return Err(Error::Provider(error_msg));
            }
        };

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        let mut stream = stream_response.stream;

        while let Some(event) = stream.next().await {
            match event {
                Ok(ChatStreamEvent::Chunk(chunk)) => {
                    content.push_str(&chunk.content);
                }
                Ok(ChatStreamEvent::ToolCallChunk(tc)) => {
                    // Each ToolCallChunk contains a complete ToolCall
                    tool_calls.push(tc.tool_call);
                }
                Ok(ChatStreamEvent::End(_)) => {
                    break;
                }
                Ok(_) => {
                    // Start, reasoning and thought-signature events carry nothing we keep
                }
                Err(e) => {
                    let error_msg = format!("GenAI stream error: {:?}", e);
                    log_failure(&error_msg);
                    tracing::error!(error = ?e, model = %self.model, "LLM stream error");
                    return Err(Error::Provider(error_msg));
                }
            }
        }

        let result = CompletionResult {
            content: if content.is_empty() { None } else { Some(content) },
            tool_calls,
        };

        log_llm_interaction(LogConfig {
            model: &self.model,
            system_prompt: system,
            messages,
            tools: Some(tools),
            result: Some(&result),
            error: None,
        });

        Ok(result)
    }
}

#[async_trait]
impl LlmProvider for GenAIProvider {
    fn name(&self) -> &str {
        self.provider_type.as_str()
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        system: Option<&str>,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<CompletionResult> {
        self.chat(system, messages, tools).await
    }
}

/// Create a provider from configuration
pub fn create_provider(
    provider_type: ProviderType,
    api_key: Option<&str>,
    model: Option<&str>,
) -> GenAIProvider {
    match api_key {
        Some(key) => GenAIProvider::with_api_key(provider_type, key, model),
        None => GenAIProvider::new(provider_type, model),
    }
}
