//! Durable per-session conversation storage.
//!
//! Every session id maps to one [`Conversation`]. Stores guarantee that
//! writes to the same session are serialized and that an acknowledged
//! append survives a process restart.
//!
//! # Architecture
//!
//! - [`SessionStore`]: the storage seam the router and interceptor talk to
//! - [`FileSessionStore`]: one JSON document per session on local disk
//!
//! # Example
//!
//! ```rust,no_run
//! use chat_relay::llm::Message;
//! use chat_relay::session::{FileSessionStore, SessionStore};
//!
//! # async fn demo() -> Result<(), chat_relay::session::StoreError> {
//! let store = FileSessionStore::new("data/sessions");
//! store.append_message("abc", Message::user("Hello!")).await?;
//!
//! let history = store.get_history("abc").await?;
//! assert_eq!(history.len(), 1);
//! # Ok(())
//! # }
//! ```

mod conversation;
mod file_store;

pub use conversation::Conversation;
pub use file_store::FileSessionStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::llm::Message;

/// Errors raised by a session store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The session id cannot be used as a storage key.
    #[error("invalid session id: {0}")]
    InvalidId(String),
    /// Backing storage failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A stored record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Keyed conversation storage.
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Ordered message history for a session; empty if nothing is stored.
    async fn get_history(&self, session_id: &str) -> Result<Vec<Message>, StoreError>;

    /// Append one message, returning once it is durable.
    async fn append_message(&self, session_id: &str, message: Message) -> Result<(), StoreError>;

    /// Erase the conversation entirely.
    async fn clear(&self, session_id: &str) -> Result<(), StoreError>;
}

/// Generate a fresh opaque session id.
#[must_use]
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Reject ids that are unsafe as storage keys.
///
/// Ids are client-supplied and end up in file names, so path separators,
/// `..` and control characters are refused.
pub fn validate_session_id(session_id: &str) -> Result<(), StoreError> {
    if session_id.is_empty() {
        return Err(StoreError::InvalidId(
            "session id cannot be empty".to_string(),
        ));
    }
    if session_id.contains('/') || session_id.contains('\\') || session_id.contains("..") {
        return Err(StoreError::InvalidId(format!(
            "session id contains invalid characters: {session_id:?}"
        )));
    }
    if session_id.chars().any(char::is_control) {
        return Err(StoreError::InvalidId(format!(
            "session id contains control characters: {session_id:?}"
        )));
    }
    Ok(())
}
