//! Mutable run state: conversation, step counter, usage totals.
//!
//! The session is an explicit value owned by the controller and passed by
//! reference to every component; persistence goes through [`SessionStore`].
mod store;

pub use store::{BestEffortOutcome, HistoryMetadata, HistorySnapshot, SessionStore};

use crate::artifacts::ArtifactId;
use crate::pipeline::StepId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    /// Ordered transcript; `conversation[0]` is the system message once any
    /// step has run.
    pub conversation: Vec<Message>,
    /// Last completed step number, 0 when nothing has completed.
    pub step: u32,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub estimated_cost: f64,
    pub artifacts: BTreeMap<ArtifactId, PathBuf>,
    pub completed_steps: Vec<String>,
    pub skipped_steps: BTreeSet<StepId>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_input_tokens + self.total_output_tokens
    }

    pub fn is_skipped(&self, id: StepId) -> bool {
        self.skipped_steps.contains(&id)
    }

    /// Make `conversation[0]` the given system message, replacing a different
    /// one in place. The system message is never removed.
    pub fn ensure_system_message(&mut self, system_prompt: &str) {
        match self.conversation.first_mut() {
            Some(first) if first.role == Role::System => {
                if first.content != system_prompt {
                    first.content = system_prompt.to_string();
                }
            }
            _ => self.conversation.insert(0, Message::system(system_prompt)),
        }
    }

    /// Replace the conversation with a single system message.
    pub fn reset_conversation(&mut self, system_prompt: &str) {
        self.conversation = vec![Message::system(system_prompt)];
    }

    pub fn record_completed(&mut self, label: String) {
        if !self.completed_steps.contains(&label) {
            self.completed_steps.push(label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_system_message_inserts_then_replaces() {
        let mut session = Session::new();
        session.conversation.push(Message::user("hello"));

        session.ensure_system_message("sys a");
        assert_eq!(session.conversation[0], Message::system("sys a"));
        assert_eq!(session.conversation.len(), 2);

        session.ensure_system_message("sys b");
        assert_eq!(session.conversation[0], Message::system("sys b"));
        assert_eq!(session.conversation.len(), 2);
    }

    #[test]
    fn reset_keeps_only_system() {
        let mut session = Session::new();
        session.ensure_system_message("sys");
        session.conversation.push(Message::user("u"));
        session.conversation.push(Message::assistant("a"));
        session.reset_conversation("fresh");
        assert_eq!(session.conversation, vec![Message::system("fresh")]);
    }

    #[test]
    fn completed_labels_are_not_duplicated() {
        let mut session = Session::new();
        session.record_completed("step 1: initial translation".to_string());
        session.record_completed("step 1: initial translation".to_string());
        assert_eq!(session.completed_steps.len(), 1);
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&Message::assistant("x")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"x"}"#);
    }
}
