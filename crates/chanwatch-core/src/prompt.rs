//! Instruction text and per-turn requests
//!
//! The agent gets a fixed instruction once, at construction. Each turn
//! then sends a short [`TurnRequest`] stamped with the wall-clock time.

use std::fmt;

/// Placeholder in the instruction replaced by the watched channel id
pub const CHANNEL_PLACEHOLDER: &str = "{channel}";

/// Built-in agent instruction
pub const DEFAULT_INSTRUCTION: &str = r#"You are an assistant that monitors and responds in chat channel {channel}.
You help with travel planning, smart home control, calendar management and general questions.

When asked to check the channel:
1. Read the recent messages of channel {channel} with the messaging tools.
2. Look for messages that need your help with:
   - Travel planning: use the lodging tools for accommodation searches and the maps tools for directions and places.
   - Smart home control: use the light tools to turn lights on or off, change brightness or color, or read their state.
   - Calendar: use the calendar tools to list, create or delete events.
   - General questions addressed to you.
3. Always post exactly one message to channel {channel}:
   - If you found requests, carry them out with the tools above and post your answer.
   - If nothing needs a response, post a short status such as "I'm ready! No new requests at <time>".

Never finish a check without posting a message to the channel, even if it is only a status update."#;

/// Substitute the channel id into an instruction template
pub fn render_instruction(template: &str, channel_id: &str) -> String {
    template.replace(CHANNEL_PLACEHOLDER, channel_id)
}

/// Current local wall-clock time as `HH:MM:SS`
pub fn current_time() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Truncate to at most `max_chars` characters, never splitting a character
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    /// Regular poll of the channel
    Check,
    /// Recovery turn after a failed check
    ErrorNotice,
}

impl fmt::Display for TurnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnKind::Check => write!(f, "check"),
            TurnKind::ErrorNotice => write!(f, "error_notice"),
        }
    }
}

/// One instruction submitted to the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub kind: TurnKind,
    /// `HH:MM:SS` the request was built at
    pub time: String,
    pub text: String,
}

impl TurnRequest {
    pub fn check(time: impl Into<String>, channel_id: &str) -> Self {
        let time = time.into();
        let text = format!(
            "Check channel {channel_id} for any new messages and fulfill any requests. \
             ALWAYS send a message to channel {channel_id} with either your response to \
             requests or a status update if no requests were found. Current time: {time}"
        );
        Self {
            kind: TurnKind::Check,
            time,
            text,
        }
    }

    /// Ask the agent to post a short error notice; `error` is cut to
    /// `max_chars` characters
    pub fn error_notice(
        time: impl Into<String>,
        channel_id: &str,
        error: &str,
        max_chars: usize,
    ) -> Self {
        let time = time.into();
        let excerpt = truncate_chars(error, max_chars);
        let text = format!(
            "Send an error status message to channel {channel_id}: \
             'Error during monitoring at {time}: {excerpt}'"
        );
        Self {
            kind: TurnKind::ErrorNotice,
            time,
            text,
        }
    }
}
