//! LLM-driven agent with tool calling
//!
//! A turn is a loop: ask the model, run the tools it asked for, feed the
//! results back, until it answers without tool calls. The loop runs lazily
//! as the caller polls the returned stream.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use tracing::{debug, warn};

use super::{Agent, EventStream, Part, ResponseEvent};
use crate::error::{Error, Result, ToolError};
use crate::prompt::TurnRequest;
use crate::provider::{
    ChatMessage, LlmProvider, ToolCall, tool_call_message, tool_result_message,
};
use crate::session::Session;
use crate::tools::{ToolDefinition, ToolRegistry};

/// Model round-trips allowed per turn unless configured otherwise
pub const DEFAULT_MAX_ITERATIONS: usize = 25;

pub struct LlmAgent {
    name: String,
    instruction: String,
    provider: Arc<dyn LlmProvider>,
    tools: ToolRegistry,
    tool_definitions: Vec<ToolDefinition>,
    max_iterations: usize,
}

impl LlmAgent {
    pub fn new(
        name: impl Into<String>,
        instruction: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        tools: ToolRegistry,
    ) -> Self {
        let tool_definitions = tools.list();
        Self {
            name: name.into(),
            instruction: instruction.into(),
            provider,
            tools,
            tool_definitions,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit<'a>(
        &'a self,
        session: &'a Session,
        request: TurnRequest,
    ) -> Result<EventStream<'a>> {
        if request.text.trim().is_empty() {
            return Err(Error::Agent("Empty turn request".to_string()));
        }

        debug!(
            agent = %self.name,
            session = session.id(),
            kind = %request.kind,
            "submitting turn"
        );

        let mut messages = session.history();
        let turn_start = messages.len();
        messages.push(ChatMessage::user(request.text));

        let state = TurnState {
            agent: self,
            session,
            messages,
            turn_start,
            pending: VecDeque::new(),
            iteration: 0,
            done: false,
        };

        Ok(stream::unfold(state, |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Some((Ok(event), state));
                }
                if state.done {
                    return None;
                }
                if let Err(e) = state.step().await {
                    state.done = true;
                    return Some((Err(e), state));
                }
            }
        })
        .boxed())
    }
}

/// In-flight turn driven by the event stream
struct TurnState<'a> {
    agent: &'a LlmAgent,
    session: &'a Session,
    messages: Vec<ChatMessage>,
    turn_start: usize,
    pending: VecDeque<ResponseEvent>,
    iteration: usize,
    done: bool,
}

impl TurnState<'_> {
    /// One model round-trip plus the tool calls it requested
    async fn step(&mut self) -> Result<()> {
        self.iteration += 1;
        if self.iteration > self.agent.max_iterations {
            return Err(Error::Agent(format!(
                "Max iteration limit reached ({})",
                self.agent.max_iterations
            )));
        }

        let response = self
            .agent
            .provider
            .complete(
                Some(self.agent.instruction.as_str()),
                &self.messages,
                &self.agent.tool_definitions,
            )
            .await?;

        let mut parts = Vec::new();
        if response.has_content() {
            let text = response.content.clone().unwrap_or_default();
            self.messages.push(ChatMessage::assistant(text.clone()));
            parts.push(Part::Text(text));
        }
        for call in &response.tool_calls {
            parts.push(Part::ToolCall {
                call_id: call.call_id.clone(),
                name: call.fn_name.clone(),
                arguments: call.fn_arguments.clone(),
            });
        }
        if !parts.is_empty() {
            self.pending
                .push_back(ResponseEvent::new(&self.agent.name, parts));
        }

        if !response.has_tool_calls() {
            let turn = self.messages.split_off(self.turn_start);
            self.session.commit_turn(turn);
            self.done = true;
            return Ok(());
        }

        self.messages
            .push(tool_call_message(response.tool_calls.clone()));
        for call in response.tool_calls {
            let (content, is_error) = self.run_tool(&call).await;
            self.messages
                .push(tool_result_message(call.call_id.clone(), content.clone()));
            self.pending.push_back(ResponseEvent::new(
                &self.agent.name,
                vec![Part::ToolResult {
                    call_id: call.call_id,
                    name: call.fn_name,
                    content,
                    is_error,
                }],
            ));
        }
        Ok(())
    }

    /// Unknown tools and tool failures become error results for the model
    async fn run_tool(&self, call: &ToolCall) -> (String, bool) {
        let Some(tool) = self.agent.tools.get(&call.fn_name) else {
            let err = ToolError::NotFound(call.fn_name.clone());
            warn!(error = %err, "model requested unknown tool");
            return (format!("Error: {}", err), true);
        };

        debug!(tool = %call.fn_name, call_id = %call.call_id, "executing tool");
        match tool.execute(call.fn_arguments.clone()).await {
            Ok(output) => {
                debug!(tool = %call.fn_name, success = output.success, metadata = ?output.metadata, "tool finished");
                (output.to_model_text(), !output.success)
            }
            Err(e) => {
                warn!(tool = %call.fn_name, error = %e, "tool execution failed");
                (format!("Error: {}", e), true)
            }
        }
    }
}
