//! Inference backend abstractions.
//!
//! The relay never runs a model itself. It hands a message list to an
//! [`InferenceClient`] and either relays the streamed bytes or a complete
//! JSON reply back to the caller.
//!
//! # Clients
//!
//! - [`WorkersAiClient`]: Workers-AI-style REST surface (`/run/{model}`)
//!
//! # Example
//!
//! ```rust
//! use chat_relay::llm::{Message, MessageRole};
//!
//! let msg = Message::user("Hello!");
//! assert_eq!(msg.role, MessageRole::User);
//! ```

pub mod workers_ai;

pub use workers_ai::WorkersAiClient;

use std::pin::Pin;

use axum::body::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author.
    pub role: MessageRole,
    /// Text content of the message.
    pub content: String,
}

impl Message {
    /// Create a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
}

/// Raw upstream byte stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, GatewayError>> + Send>>;

/// What the backend handed back for a chat request.
pub enum ChatReply {
    /// The backend answered in one JSON document.
    Complete(serde_json::Value),
    /// The backend is streaming framed fragments.
    Stream(ByteStream),
}

impl std::fmt::Debug for ChatReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(v) => f.debug_tuple("Complete").field(v).finish(),
            Self::Stream(_) => f.debug_tuple("Stream").finish_non_exhaustive(),
        }
    }
}

/// Errors from the inference backend.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Transport-level failure (connect, read, status).
    #[error("inference request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The backend answered but the payload was not what we expected.
    #[error("unexpected inference response: {0}")]
    InvalidResponse(String),
}

/// Client for the hosted inference backend.
///
/// Implementations are treated as black boxes by the router: errors are
/// logged and mapped to a generic 500.
#[async_trait::async_trait]
pub trait InferenceClient: Send + Sync {
    /// Run a chat completion over `messages` with the given model.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails before any bytes are available.
    async fn chat(&self, model_id: &str, messages: &[Message]) -> Result<ChatReply, GatewayError>;

    /// Transcribe raw audio bytes, returning the recognized text.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the reply carries no text field.
    async fn transcribe(&self, model_id: &str, audio: Bytes) -> Result<String, GatewayError>;
}
