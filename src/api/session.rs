//! Session management endpoints.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::AppState;
use crate::error::ApiError;
use crate::llm::Message;
use crate::session::new_session_id;

/// Query parameters for session lookups.
#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(default)]
    pub id: Option<String>,
}

impl SessionQuery {
    fn require_id(self) -> Result<String, ApiError> {
        self.id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::bad_request("Session ID is required"))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionHistory {
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct Cleared {
    pub success: bool,
}

/// POST /api/session - Hand out a fresh session id.
///
/// Nothing is stored until the first message is appended.
pub async fn create_session() -> Json<CreatedSession> {
    let session_id = new_session_id();
    info!(name: "session.created", session_id = %session_id, "Session created");
    Json(CreatedSession { session_id })
}

/// GET /api/session?id= - Return the stored history.
pub async fn get_session(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<SessionHistory>, ApiError> {
    let id = query.require_id()?;
    let messages = state.sessions.get_history(&id).await?;
    Ok(Json(SessionHistory { messages }))
}

/// DELETE /api/session?id= - Erase the stored history.
pub async fn delete_session(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<Cleared>, ApiError> {
    let id = query.require_id()?;
    state.sessions.clear(&id).await?;
    info!(name: "session.cleared", session_id = %id, "Session cleared");
    Ok(Json(Cleared { success: true }))
}
