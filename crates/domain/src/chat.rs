//! Conversation data model: messages, history, the reduction-surviving
//! memory zone, and the session record that ties them together.
//!
//! Token counts everywhere in this crate are *estimates* — `⌈len/4⌉`
//! characters per token. Callers must not depend on exact values.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Internal marker carried in [`Message::name`] by synthetic summary
/// messages, so later reductions preserve them instead of re-summarizing
/// summaries.
pub const SUMMARY_MARKER: &str = "relay_summary";

/// Estimate the token count of a text as `⌈len/4⌉`.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

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

/// A single conversation message. Immutable once appended to a history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Build the synthetic system message that carries a summary produced
    /// by context reduction.
    pub fn summary(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            name: Some(SUMMARY_MARKER.to_string()),
            timestamp: Some(Utc::now()),
        }
    }

    /// True for summary messages injected by a previous reduction.
    pub fn is_summary(&self) -> bool {
        self.name.as_deref() == Some(SUMMARY_MARKER)
    }

    pub fn estimated_tokens(&self) -> u64 {
        estimate_tokens(&self.content)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation history
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An ordered, append-only sequence of messages.
///
/// The context engine may produce a *replacement* history during
/// reduction, but never mutates an existing one in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of conversation turns. A turn begins at each user message;
    /// system messages never count.
    pub fn turn_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .count()
    }

    /// Sum of per-message `⌈len/4⌉` estimates.
    pub fn estimated_tokens(&self) -> u64 {
        self.messages.iter().map(Message::estimated_tokens).sum()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory zone
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ordered store of summary texts that survives every reduction and every
/// session reset. Cleared only by explicit administrator action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryZone {
    entries: Vec<String>,
}

impl MemoryZone {
    pub fn push(&mut self, summary: impl Into<String>) {
        self.entries.push(summary.into());
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Explicit administrator clear. Never called by reduction or reset.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single conversation session tracked by the store.
///
/// `history` and `memory_zone` are stored side by side but are fully
/// independent: mutating one never observably affects the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    #[serde(default)]
    pub history: ConversationHistory,
    #[serde(default)]
    pub memory_zone: MemoryZone,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub total_tokens_used: u64,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            history: ConversationHistory::new(),
            memory_zone: MemoryZone::default(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            total_tokens_used: 0,
        }
    }

    /// Advance `updated_at`. Called on every append, replace, or reduction.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn append(&mut self, message: Message) {
        self.total_tokens_used += message.estimated_tokens();
        self.history.push(message);
        self.touch();
    }

    /// Clear the conversation history. The memory zone and metadata are
    /// left intact.
    pub fn reset(&mut self) {
        self.history = ConversationHistory::new();
        self.touch();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(400)), 100);
    }

    #[test]
    fn turn_count_counts_user_messages_only() {
        let mut h = ConversationHistory::new();
        h.push(Message::system("rules"));
        h.push(Message::user("hi"));
        h.push(Message::assistant("hello"));
        h.push(Message::user("more"));
        assert_eq!(h.turn_count(), 2);
    }

    #[test]
    fn history_estimated_tokens_sums_messages() {
        let mut h = ConversationHistory::new();
        h.push(Message::user("abcd")); // 1
        h.push(Message::assistant("abcdefgh")); // 2
        assert_eq!(h.estimated_tokens(), 3);
    }

    #[test]
    fn append_preserves_order() {
        let mut s = Session::new("alice");
        s.append(Message::user("one"));
        s.append(Message::assistant("two"));
        s.append(Message::user("three"));
        let contents: Vec<_> = s
            .history
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[test]
    fn reset_clears_history_keeps_memory_zone() {
        let mut s = Session::new("alice");
        s.append(Message::user("hi"));
        s.memory_zone.push("earlier summary");
        s.metadata
            .insert("origin".into(), serde_json::json!("webui"));

        s.reset();

        assert!(s.history.is_empty());
        assert_eq!(s.memory_zone.entries(), ["earlier summary"]);
        assert_eq!(s.metadata.len(), 1);
    }

    #[test]
    fn history_and_memory_zone_are_independent() {
        let mut s = Session::new("alice");
        s.append(Message::user("hi"));
        let before = s.history.clone();

        s.memory_zone.push("summary one");
        s.memory_zone.push("summary two");
        assert_eq!(s.history, before);

        s.append(Message::assistant("reply"));
        assert_eq!(s.memory_zone.len(), 2);
    }

    #[test]
    fn summary_message_is_marked() {
        let m = Message::summary("what happened so far");
        assert_eq!(m.role, Role::System);
        assert!(m.is_summary());
        assert!(!Message::system("user-authored").is_summary());
    }

    #[test]
    fn session_serde_round_trip() {
        let mut s = Session::new("bob");
        s.append(Message::user("hi"));
        s.memory_zone.push("s1");

        let json = serde_json::to_string(&s).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session_id, s.session_id);
        assert_eq!(back.history, s.history);
        assert_eq!(back.memory_zone, s.memory_zone);
    }
}
