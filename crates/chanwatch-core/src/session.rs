//! The monitor's single conversation session

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::config::MonitorConfig;
use crate::provider::ChatMessage;

/// Conversation session shared by every turn of one monitor process
///
/// Created once at startup and never persisted. History is kept per turn
/// so trimming never separates a tool call from its result.
pub struct Session {
    app_name: String,
    user_id: String,
    id: String,
    history: Mutex<VecDeque<Vec<ChatMessage>>>,
    history_turns: usize,
}

impl Session {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        id: impl Into<String>,
        history_turns: usize,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            id: id.into(),
            history: Mutex::new(VecDeque::new()),
            history_turns,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(
            &config.app_name,
            &config.user_id,
            &config.session_id,
            config.history_turns,
        )
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Messages of the retained turns, oldest first
    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.lock().iter().flatten().cloned().collect()
    }

    /// Number of turns currently retained
    pub fn turn_count(&self) -> usize {
        self.history.lock().len()
    }

    /// Append a completed turn, dropping the oldest beyond the limit
    pub fn commit_turn(&self, messages: Vec<ChatMessage>) {
        if messages.is_empty() {
            return;
        }
        let mut history = self.history.lock();
        history.push_back(messages);
        while history.len() > self.history_turns {
            history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(n: usize) -> Vec<ChatMessage> {
        vec![
            ChatMessage::user(format!("request {n}")),
            ChatMessage::assistant(format!("reply {n}")),
        ]
    }

    #[test]
    fn test_identity_from_config() {
        let config = MonitorConfig::default();
        let session = Session::from_config(&config);
        assert_eq!(session.app_name(), "chanwatch");
        assert_eq!(session.user_id(), "chanwatch_bot");
        assert_eq!(session.id(), "monitoring_session");
        assert_eq!(session.turn_count(), 0);
    }

    #[test]
    fn test_history_keeps_most_recent_turns() {
        let session = Session::new("app", "user", "s", 2);
        for n in 0..5 {
            session.commit_turn(turn(n));
        }

        assert_eq!(session.turn_count(), 2);
        let history = session.history();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content.joined_texts().as_deref(), Some("request 3"));
        assert_eq!(history[3].content.joined_texts().as_deref(), Some("reply 4"));
    }

    #[test]
    fn test_empty_turn_not_recorded() {
        let session = Session::new("app", "user", "s", 2);
        session.commit_turn(Vec::new());
        assert_eq!(session.turn_count(), 0);
    }

    #[test]
    fn test_zero_history_turns_keeps_nothing() {
        let session = Session::new("app", "user", "s", 0);
        session.commit_turn(turn(1));
        assert!(session.history().is_empty());
    }
}
