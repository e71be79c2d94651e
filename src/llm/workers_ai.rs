//! Workers-AI-style REST client.
//!
//! Models are addressed as `POST {base_url}/run/{model_id}`. Chat requests
//! ask for `stream: true`; a `text/event-stream` reply is relayed as raw
//! bytes, anything else is read as the JSON envelope
//! `{ "result": {...}, "success": bool }`.

use axum::body::Bytes;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;

use super::{ByteStream, ChatReply, GatewayError, InferenceClient, Message};
use crate::config::InferenceConfig;

/// HTTP client for a Workers-AI-compatible inference endpoint.
#[derive(Clone)]
pub struct WorkersAiClient {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl std::fmt::Debug for WorkersAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkersAiClient")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl WorkersAiClient {
    /// Create a client from the inference section of the app config.
    #[must_use]
    pub fn new(config: &InferenceConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config
                .api_token
                .clone()
                .filter(|t| !t.trim().is_empty()),
        }
    }

    fn run_url(&self, model_id: &str) -> String {
        format!("{}/run/{}", self.base_url, model_id)
    }

    fn post(&self, model_id: &str) -> reqwest::RequestBuilder {
        let rb = self.http.post(self.run_url(model_id));
        match &self.api_token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }
}

#[async_trait::async_trait]
impl InferenceClient for WorkersAiClient {
    async fn chat(&self, model_id: &str, messages: &[Message]) -> Result<ChatReply, GatewayError> {
        let body = serde_json::json!({
            "messages": messages,
            "stream": true,
        });

        let resp = self
            .post(model_id)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let is_event_stream = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        if is_event_stream {
            let stream: ByteStream = Box::pin(
                resp.bytes_stream()
                    .map(|chunk| chunk.map_err(GatewayError::from)),
            );
            return Ok(ChatReply::Stream(stream));
        }

        let envelope: serde_json::Value = resp.json().await?;
        Ok(ChatReply::Complete(unwrap_result(envelope)?))
    }

    async fn transcribe(&self, model_id: &str, audio: Bytes) -> Result<String, GatewayError> {
        let resp = self
            .post(model_id)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(audio)
            .send()
            .await?
            .error_for_status()?;

        let envelope: serde_json::Value = resp.json().await?;
        let result = unwrap_result(envelope)?;
        result
            .get("text")
            .and_then(|t| t.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| GatewayError::InvalidResponse("missing `text` in result".to_string()))
    }
}

/// Strip the `{ result, success }` envelope, surfacing `success: false`.
fn unwrap_result(envelope: serde_json::Value) -> Result<serde_json::Value, GatewayError> {
    if envelope.get("success").and_then(serde_json::Value::as_bool) == Some(false) {
        let errors = envelope
            .get("errors")
            .map_or_else(|| "unknown error".to_string(), ToString::to_string);
        return Err(GatewayError::InvalidResponse(errors));
    }

    match envelope {
        serde_json::Value::Object(mut map) if map.contains_key("result") => map
            .remove("result")
            .ok_or_else(|| GatewayError::InvalidResponse("missing `result`".to_string())),
        // Some deployments answer with the bare result object.
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(base_url: &str) -> WorkersAiClient {
        WorkersAiClient::new(&InferenceConfig {
            base_url: base_url.to_string(),
            api_token: Some("  ".to_string()),
        })
    }

    #[test]
    fn test_run_url_trims_trailing_slash() {
        let c = client("https://api.example.com/ai/");
        assert_eq!(
            c.run_url("@cf/meta/llama-3-8b-instruct"),
            "https://api.example.com/ai/run/@cf/meta/llama-3-8b-instruct"
        );
    }

    #[test]
    fn test_blank_token_is_dropped() {
        let c = client("https://api.example.com");
        assert!(c.api_token.is_none());
    }

    #[test]
    fn test_unwrap_result_envelope() {
        let v = unwrap_result(json!({
            "result": { "response": "hello" },
            "success": true,
            "errors": []
        }))
        .unwrap();
        assert_eq!(v, json!({ "response": "hello" }));
    }

    #[test]
    fn test_unwrap_result_bare_object() {
        let v = unwrap_result(json!({ "text": "hi" })).unwrap();
        assert_eq!(v["text"], "hi");
    }

    #[test]
    fn test_unwrap_result_failure() {
        let err = unwrap_result(json!({
            "result": null,
            "success": false,
            "errors": [{ "code": 5000, "message": "boom" }]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
