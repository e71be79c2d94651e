//! Chat completion endpoint.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::info;

use crate::AppState;
use crate::error::ApiError;
use crate::intercept::{PersistTarget, intercept, persist_reply};
use crate::llm::{ChatReply, Message, MessageRole};

/// Request body for chat API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// New turn(s) from the client.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Session to read history from and persist into.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// POST /api/chat - Relay a chat turn, streaming the reply back.
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    if req.messages.is_empty() {
        return Err(ApiError::bad_request("No messages provided"));
    }

    let session_id = req.session_id.filter(|id| !id.is_empty());
    info!(
        name: "chat.request",
        session_id = ?session_id,
        messages = req.messages.len(),
        "Received chat request"
    );

    let history = match &session_id {
        Some(id) => {
            let history = state.sessions.get_history(id).await?;
            if let Some(latest) = req
                .messages
                .iter()
                .rev()
                .find(|m| m.role == MessageRole::User)
            {
                state.sessions.append_message(id, latest.clone()).await?;
            }
            history
        }
        None => Vec::new(),
    };

    let upstream = assemble_messages(&state.models.system_prompt, history, req.messages);
    let reply = state
        .inference
        .chat(&state.models.llm_model_id, &upstream)
        .await?;

    let target = session_id.map(|session_id| PersistTarget {
        store: Arc::clone(&state.sessions),
        session_id,
    });

    match reply {
        ChatReply::Stream(stream) => Ok((
            [(CONTENT_TYPE, "text/event-stream"), (CACHE_CONTROL, "no-cache")],
            Body::from_stream(intercept(stream, target)),
        )
            .into_response()),
        ChatReply::Complete(value) => {
            let text = value
                .get("response")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            if let Some(target) = target {
                if !text.is_empty() {
                    persist_reply(target, text.to_string()).await;
                }
            }
            Ok(Json(value).into_response())
        }
    }
}

/// Build the upstream message list.
///
/// System messages go first; the configured prompt is used only when the
/// client sent none. Stored history precedes the new turn.
fn assemble_messages(
    system_prompt: &str,
    history: Vec<Message>,
    request: Vec<Message>,
) -> Vec<Message> {
    let (system, turn): (Vec<_>, Vec<_>) = request
        .into_iter()
        .partition(|m| m.role == MessageRole::System);

    let mut out = if system.is_empty() && !system_prompt.trim().is_empty() {
        vec![Message::system(system_prompt)]
    } else {
        system
    };
    out.extend(history);
    out.extend(turn);
    out
}
