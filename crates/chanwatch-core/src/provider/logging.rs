//! LLM request/response logging
//!
//! Set the `LLM_LOG_FILE` environment variable to append one JSON line per
//! model call, including the tools offered and the parsed result.
//!
//! Example: `LLM_LOG_FILE=/tmp/llm.log chanwatch`

use serde_json::json;
use std::io::Write;
use tracing::{debug, warn};

use super::{ChatMessage, CompletionResult};
use crate::tools::ToolDefinition;

fn message_to_json(msg: &ChatMessage) -> serde_json::Value {
    json!({
        "role": format!("{:?}", msg.role),
        "content": msg.content.joined_texts().unwrap_or_default()
    })
}

/// What to include in one log entry
#[derive(Default)]
pub struct LogConfig<'a> {
    pub model: &'a str,
    pub system_prompt: Option<&'a str>,
    pub messages: &'a [ChatMessage],
    pub tools: Option<&'a [ToolDefinition]>,
    pub result: Option<&'a CompletionResult>,
    pub error: Option<&'a str>,
}

/// Append an interaction to the log file if `LLM_LOG_FILE` is set
pub fn log_llm_interaction(config: LogConfig<'_>) {
    let log_file = match std::env::var("LLM_LOG_FILE") {
        Ok(path) => path,
        Err(_) => return,
    };

    let entry = json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "model": config.model,
        "request": {
            "system_prompt": config.system_prompt,
            "messages": config.messages.iter().map(message_to_json).collect::<Vec<_>>(),
            "message_count": config.messages.len(),
            "tools": config.tools.map(|t| t.iter().map(|tool| tool.name.as_str()).collect::<Vec<_>>()),
        },
        "response": config.result.map(|r| json!({
            "type": if r.has_tool_calls() { "tool_calls" } else { "message" },
            "content": r.content,
            "tool_calls": r.tool_calls.iter().map(|c| json!({
                "name": c.fn_name,
                "call_id": c.call_id,
                "arguments": c.fn_arguments
            })).collect::<Vec<_>>()
        })),
        "error": config.error,
    });

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
    {
        Ok(mut file) => {
            if let Err(e) = writeln!(file, "{}", entry) {
                warn!("Failed to write to LLM log file: {}", e);
            }
        }
        Err(e) => {
            warn!("Failed to open LLM log file {}: {}", log_file, e);
        }
    }

    debug!("Logged LLM interaction to {}", log_file);
}
