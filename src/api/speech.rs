//! Speech endpoints.
//!
//! Transcription is delegated to the inference backend. Synthesis happens in
//! the browser, so text-to-speech only validates and echoes the text back.

use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::AppState;
use crate::error::ApiError;

const AUDIO_FIELD: &str = "audio";
const NO_AUDIO: &str = "No audio file provided";

/// Text payload shared by the speech endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct TextPayload {
    #[serde(default)]
    pub text: String,
}

/// POST /api/speech-to-text - Transcribe the multipart `audio` field.
pub async fn speech_to_text(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<TextPayload>, ApiError> {
    // A body that is not multipart at all carries no audio either.
    let Ok(mut multipart) = multipart else {
        return Err(ApiError::bad_request(NO_AUDIO));
    };

    let mut audio = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read multipart field: {e}")))?
    {
        if field.name() == Some(AUDIO_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read audio: {e}")))?;
            audio = Some(bytes);
            break;
        }
    }

    let audio = audio
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ApiError::bad_request(NO_AUDIO))?;

    info!(name: "stt.request", bytes = audio.len(), "Transcription request");

    let text = state
        .inference
        .transcribe(&state.models.stt_model_id, audio)
        .await?;

    if text.trim().is_empty() {
        warn!(name: "stt.empty", "Transcription returned no text");
    }

    Ok(Json(TextPayload { text }))
}

/// POST /api/text-to-speech - Echo text for client-side playback.
pub async fn text_to_speech(
    payload: Result<Json<TextPayload>, JsonRejection>,
) -> Result<Json<TextPayload>, ApiError> {
    let Json(payload) = payload?;
    if payload.text.trim().is_empty() {
        return Err(ApiError::bad_request("No text provided"));
    }
    Ok(Json(payload))
}
