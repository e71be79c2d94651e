//! HTTP API handlers, mounted under `/api`.
//!
//! - [`chat`]: streamed chat completion with reply persistence
//! - [`speech`]: speech-to-text and the text-to-speech echo
//! - [`session`]: session create / read / delete

pub mod chat;
pub mod session;
pub mod speech;

use axum::{Router, routing::post};

use crate::AppState;
use crate::error::ApiError;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat::chat).fallback(method_not_allowed))
        .route(
            "/speech-to-text",
            post(speech::speech_to_text).fallback(method_not_allowed),
        )
        .route(
            "/text-to-speech",
            post(speech::text_to_speech).fallback(method_not_allowed),
        )
        .route(
            "/session",
            post(session::create_session)
                .get(session::get_session)
                .delete(session::delete_session)
                .fallback(method_not_allowed),
        )
        .fallback(not_found)
}

async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}

async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}
