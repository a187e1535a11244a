//! LLM Provider abstraction using GenAI
//!
//! The agent talks to the model through the [`LlmProvider`] trait so the
//! tool loop can be exercised without network access. [`GenAIProvider`] is
//! the real implementation, backed by the genai framework. Supported
//! backends are listed in [`catalog`].

pub mod catalog;
mod genai_provider;
mod logging;

pub use genai_provider::{create_provider, GenAIProvider, ProviderType};

use async_trait::async_trait;

use crate::error::Result;
use crate::tools::ToolDefinition;

// Re-export the genai message types used in conversation history
pub use genai::chat::{ChatMessage, ChatRole, MessageContent, ToolCall, ToolResponse};

/// Response from completion that may contain both content and tool calls
#[derive(Debug, Clone, Default)]
pub struct CompletionResult {
    /// Text content from the assistant (may be present even with tool calls)
    pub content: Option<String>,
    /// Tool calls requested by the model
    pub tool_calls: Vec<ToolCall>,
}

impl CompletionResult {
    /// Plain text answer with no tool calls
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Check if this result has any tool calls
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Check if this result has text content
    pub fn has_content(&self) -> bool {
        self.content.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// A chat model that can be asked for the next step of a conversation
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., "gemini", "anthropic")
    fn name(&self) -> &str;

    /// Model identifier requests are sent to
    fn model(&self) -> &str;

    /// Run one completion over the conversation so far
    async fn complete(
        &self,
        system: Option<&str>,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<CompletionResult>;
}

/// Build a tool-call message for the conversation history
pub fn tool_call_message(tool_calls: Vec<ToolCall>) -> ChatMessage {
    ChatMessage::from(tool_calls)
}

/// Build a tool-result message for the conversation history
pub fn tool_result_message(call_id: impl Into<String>, content: impl Into<String>) -> ChatMessage {
    ChatMessage::from(ToolResponse::new(call_id.into(), content.into()))
}
