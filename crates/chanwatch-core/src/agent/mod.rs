//! Agent abstraction
//!
//! The monitor hands each [`TurnRequest`] to an [`Agent`] and drains the
//! stream of [`ResponseEvent`]s it returns. [`LlmAgent`] is the real agent;
//! tests substitute scripted ones.

mod llm_agent;

pub use llm_agent::LlmAgent;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::prompt::TurnRequest;
use crate::session::Session;

/// Streamed output of one turn
pub type EventStream<'a> = BoxStream<'a, Result<ResponseEvent>>;

/// Something that can take a turn in the monitor's session
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// Start a turn. Errors before the turn starts are returned here;
    /// errors while it runs are yielded by the stream, which then ends.
    async fn submit<'a>(&'a self, session: &'a Session, request: TurnRequest)
    -> Result<EventStream<'a>>;
}

/// One part of a response event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    Text(String),
    ToolCall {
        call_id: String,
        name: String,
        arguments: Value,
    },
    ToolResult {
        call_id: String,
        name: String,
        content: String,
        is_error: bool,
    },
}

/// A unit of streamed agent output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub id: String,
    pub author: String,
    pub parts: Vec<Part>,
}

impl ResponseEvent {
    pub fn new(author: impl Into<String>, parts: Vec<Part>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            author: author.into(),
            parts,
        }
    }

    /// Event carrying a single text part
    pub fn text(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(author, vec![Part::Text(text.into())])
    }

    /// Non-empty text parts, in order
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            Part::Text(text) if !text.is_empty() => Some(text.as_str()),
            _ => None,
        })
    }
}
