//! Chat Relay
//!
//! A thin request router in front of a hosted inference backend. Chat
//! replies stream straight through to the client while the full assistant
//! message is accumulated and persisted to a per-session conversation store.
//!
//! # Architecture
//!
//! - **Server**: Axum-based HTTP server; `/api/*` routes plus static assets
//! - **Inference**: opaque backend client for chat and transcription
//! - **Interceptor**: byte-exact passthrough that folds streamed fragments
//! - **Sessions**: durable, per-session serialized conversation storage
//!
//! # Modules
//!
//! - [`api`]: HTTP handlers
//! - [`config`]: layered configuration
//! - [`intercept`]: stream passthrough and reply accumulation
//! - [`llm`]: inference client trait and implementation
//! - [`session`]: conversation storage

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod api;
pub mod config;
pub mod error;
pub mod intercept;
pub mod llm;
pub mod server;
pub mod session;

use std::sync::Arc;

use config::ModelConfig;
use llm::InferenceClient;
use session::SessionStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Inference backend for chat and transcription.
    pub inference: Arc<dyn InferenceClient>,
    /// Conversation store keyed by session id.
    pub sessions: Arc<dyn SessionStore>,
    /// Model identifiers and system prompt.
    pub models: Arc<ModelConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("sessions", &self.sessions)
            .field("models", &self.models)
            .finish()
    }
}
