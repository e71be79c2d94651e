//! Persisted conversation record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::Message;

/// The stored history of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Owning session id.
    pub id: String,
    /// Messages in insertion order.
    pub messages: Vec<Message>,
    /// When the first message was stored.
    pub created_at: DateTime<Utc>,
    /// When the conversation was last appended to.
    pub last_activity: DateTime<Utc>,
}

impl Conversation {
    /// Create an empty conversation for `id`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            created_at: now,
            last_activity: now,
        }
    }

    /// Append a message and bump the activity timestamp.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.last_activity = Utc::now();
    }
}
