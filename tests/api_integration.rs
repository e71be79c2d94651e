//! End-to-end tests for the HTTP surface.
//!
//! The real router and file-backed session store run against a scripted
//! inference client, so no network access is needed.

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::http::StatusCode;
use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use chat_relay::AppState;
use chat_relay::config::{ModelConfig, ServerConfig};
use chat_relay::llm::{ByteStream, ChatReply, GatewayError, InferenceClient, Message};
use chat_relay::server::build_app;
use chat_relay::session::{FileSessionStore, SessionStore};
use serde_json::{Value, json};
use tempfile::TempDir;

const STREAM_BODY: &[&[u8]] = &[
    b"data: {\"response\":\"Hello\"}\n\n",
    b"data: {\"resp",
    b"onse\":\" there\"}\n\ndata: {\"response\":\"!\"}\n\n",
    b"data: [DONE]\n\n",
];

// =============================================================================
// Test Utilities
// =============================================================================

#[derive(Debug, Clone)]
enum Script {
    Stream(Vec<&'static [u8]>),
    Complete(Value),
    Fail,
}

#[derive(Debug)]
struct ScriptedInference {
    script: Script,
    transcript: String,
    chat_calls: Mutex<Vec<(String, Vec<Message>)>>,
    audio_calls: Mutex<Vec<(String, usize)>>,
}

impl ScriptedInference {
    fn new(script: Script) -> Self {
        Self {
            script,
            transcript: "what time is it".to_string(),
            chat_calls: Mutex::new(Vec::new()),
            audio_calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl InferenceClient for ScriptedInference {
    async fn chat(&self, model_id: &str, messages: &[Message]) -> Result<ChatReply, GatewayError> {
        self.chat_calls
            .lock()
            .unwrap()
            .push((model_id.to_string(), messages.to_vec()));
        match &self.script {
            Script::Stream(chunks) => {
                let items: Vec<Result<Bytes, GatewayError>> = chunks
                    .iter()
                    .map(|c| Ok(Bytes::from_static(c)))
                    .collect();
                let stream: ByteStream = Box::pin(futures::stream::iter(items));
                Ok(ChatReply::Stream(stream))
            }
            Script::Complete(v) => Ok(ChatReply::Complete(v.clone())),
            Script::Fail => Err(GatewayError::InvalidResponse(
                "upstream exploded with internal detail".to_string(),
            )),
        }
    }

    async fn transcribe(&self, model_id: &str, audio: Bytes) -> Result<String, GatewayError> {
        self.audio_calls
            .lock()
            .unwrap()
            .push((model_id.to_string(), audio.len()));
        match self.script {
            Script::Fail => Err(GatewayError::InvalidResponse("no".to_string())),
            _ => Ok(self.transcript.clone()),
        }
    }
}

struct Harness {
    _dir: TempDir,
    server: TestServer,
    store: FileSessionStore,
    inference: Arc<ScriptedInference>,
}

fn models() -> ModelConfig {
    ModelConfig {
        llm_model_id: "test-llm".to_string(),
        stt_model_id: "test-stt".to_string(),
        system_prompt: "You are terse.".to_string(),
    }
}

fn harness(script: Script) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let static_dir = dir.path().join("public");
    std::fs::create_dir_all(&static_dir).unwrap();
    std::fs::write(static_dir.join("index.html"), "<h1>relay</h1>").unwrap();

    let store = FileSessionStore::new(dir.path().join("sessions"));
    let inference = Arc::new(ScriptedInference::new(script));
    let client: Arc<ScriptedInference> = Arc::clone(&inference);

    let state = AppState {
        inference: client,
        sessions: Arc::new(store.clone()),
        models: Arc::new(models()),
    };
    let server_config = ServerConfig {
        port: 0,
        host: "127.0.0.1".to_string(),
        static_dir: static_dir.to_string_lossy().into_owned(),
        body_limit_bytes: 1024 * 1024,
    };

    let server = TestServer::new(build_app(state, &server_config)).unwrap();
    Harness {
        _dir: dir,
        server,
        store,
        inference,
    }
}

fn stream_harness() -> Harness {
    harness(Script::Stream(STREAM_BODY.to_vec()))
}

async fn create_session(h: &Harness) -> String {
    let res = h.server.post("/api/session").await;
    res.assert_status_ok();
    let body: Value = res.json();
    body["sessionId"].as_str().unwrap().to_string()
}

// =============================================================================
// Session lifecycle
// =============================================================================

#[tokio::test]
async fn test_create_session_returns_fresh_ids() {
    let h = stream_harness();
    let a = create_session(&h).await;
    let b = create_session(&h).await;
    assert_ne!(a, b);
    assert!(uuid::Uuid::parse_str(&a).is_ok());
}

#[tokio::test]
async fn test_chat_then_history_contains_both_turns() {
    let h = stream_harness();
    let session_id = create_session(&h).await;

    let res = h
        .server
        .post("/api/chat")
        .json(&json!({
            "messages": [{ "role": "user", "content": "hi" }],
            "sessionId": session_id,
        }))
        .await;

    res.assert_status_ok();
    assert_eq!(
        res.header("content-type").to_str().unwrap(),
        "text/event-stream"
    );
    // Passthrough is byte-identical to what the backend sent.
    assert_eq!(res.as_bytes().as_ref(), STREAM_BODY.concat().as_slice());

    let res = h
        .server
        .get("/api/session")
        .add_query_param("id", &session_id)
        .await;
    res.assert_status_ok();
    res.assert_json(&json!({
        "messages": [
            { "role": "user", "content": "hi" },
            { "role": "assistant", "content": "Hello there!" },
        ]
    }));
}

#[tokio::test]
async fn test_second_turn_sends_prompt_and_history_upstream() {
    let h = stream_harness();
    let session_id = create_session(&h).await;

    for text in ["first", "second"] {
        h.server
            .post("/api/chat")
            .json(&json!({
                "messages": [{ "role": "user", "content": text }],
                "sessionId": session_id,
            }))
            .await
            .assert_status_ok();
    }

    let calls = h.inference.chat_calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    let (model, upstream) = &calls[1];
    assert_eq!(model, "test-llm");
    assert_eq!(
        upstream,
        &vec![
            Message::system("You are terse."),
            Message::user("first"),
            Message::assistant("Hello there!"),
            Message::user("second"),
        ]
    );
}

#[tokio::test]
async fn test_delete_then_get_is_empty() {
    let h = stream_harness();
    let session_id = create_session(&h).await;
    h.store
        .append_message(&session_id, Message::user("hi"))
        .await
        .unwrap();

    let res = h
        .server
        .delete("/api/session")
        .add_query_param("id", &session_id)
        .await;
    res.assert_status_ok();
    res.assert_json(&json!({ "success": true }));

    let res = h
        .server
        .get("/api/session")
        .add_query_param("id", &session_id)
        .await;
    res.assert_json(&json!({ "messages": [] }));
}

#[tokio::test]
async fn test_session_lookup_requires_id() {
    let h = stream_harness();

    let res = h.server.get("/api/session").await;
    res.assert_status(StatusCode::BAD_REQUEST);
    res.assert_json(&json!({ "error": "Session ID is required" }));

    let res = h.server.delete("/api/session").add_query_param("id", "").await;
    res.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unsafe_session_id_rejected() {
    let h = stream_harness();
    let res = h
        .server
        .get("/api/session")
        .add_query_param("id", "../../etc/passwd")
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
}

// =============================================================================
// Chat
// =============================================================================

#[tokio::test]
async fn test_chat_without_session_persists_nothing() {
    let h = stream_harness();
    let res = h
        .server
        .post("/api/chat")
        .json(&json!({ "messages": [{ "role": "user", "content": "hi" }] }))
        .await;
    res.assert_status_ok();
    assert_eq!(res.text(), String::from_utf8(STREAM_BODY.concat()).unwrap());
    assert!(!h.store.base_path().exists());
}

#[tokio::test]
async fn test_chat_requires_messages() {
    let h = stream_harness();
    let res = h.server.post("/api/chat").json(&json!({ "messages": [] })).await;
    res.assert_status(StatusCode::BAD_REQUEST);
    res.assert_json(&json!({ "error": "No messages provided" }));
    assert!(h.inference.chat_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_rejects_malformed_json() {
    let h = stream_harness();
    let res = h
        .server
        .post("/api/chat")
        .content_type("application/json")
        .bytes(Bytes::from_static(b"{not json"))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = res.json();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_upstream_failure_is_generic_500() {
    let h = harness(Script::Fail);
    let res = h
        .server
        .post("/api/chat")
        .json(&json!({ "messages": [{ "role": "user", "content": "hi" }] }))
        .await;
    res.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    res.assert_json(&json!({ "error": "Failed to process request" }));
}

#[tokio::test]
async fn test_complete_reply_is_returned_and_persisted() {
    let h = harness(Script::Complete(json!({ "response": "All at once." })));
    let session_id = create_session(&h).await;

    let res = h
        .server
        .post("/api/chat")
        .json(&json!({
            "messages": [{ "role": "user", "content": "hi" }],
            "sessionId": session_id,
        }))
        .await;
    res.assert_status_ok();
    res.assert_json(&json!({ "response": "All at once." }));

    let history = h.store.get_history(&session_id).await.unwrap();
    assert_eq!(
        history,
        vec![Message::user("hi"), Message::assistant("All at once.")]
    );
}

// =============================================================================
// Speech
// =============================================================================

#[tokio::test]
async fn test_speech_to_text_without_audio_is_400() {
    let h = stream_harness();
    let form = MultipartForm::new().add_text("note", "no audio here");
    let res = h.server.post("/api/speech-to-text").multipart(form).await;
    res.assert_status(StatusCode::BAD_REQUEST);
    res.assert_json(&json!({ "error": "No audio file provided" }));
}

#[tokio::test]
async fn test_speech_to_text_non_multipart_is_400() {
    let h = stream_harness();
    let res = h
        .server
        .post("/api/speech-to-text")
        .json(&json!({ "audio": "nope" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    res.assert_json(&json!({ "error": "No audio file provided" }));
}

#[tokio::test]
async fn test_speech_to_text_transcribes_audio() {
    let h = stream_harness();
    let part = Part::bytes(vec![1u8, 2, 3, 4, 5])
        .file_name("clip.webm")
        .mime_type("audio/webm");
    let form = MultipartForm::new().add_part("audio", part);

    let res = h.server.post("/api/speech-to-text").multipart(form).await;
    res.assert_status_ok();
    res.assert_json(&json!({ "text": "what time is it" }));

    let calls = h.inference.audio_calls.lock().unwrap();
    assert_eq!(calls.as_slice(), &[("test-stt".to_string(), 5)]);
}

#[tokio::test]
async fn test_speech_to_text_upstream_failure_is_500() {
    let h = harness(Script::Fail);
    let form = MultipartForm::new().add_part("audio", Part::bytes(vec![9u8; 16]));
    let res = h.server.post("/api/speech-to-text").multipart(form).await;
    res.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    res.assert_json(&json!({ "error": "Failed to process request" }));
}

#[tokio::test]
async fn test_text_to_speech_echoes_text() {
    let h = stream_harness();
    let res = h
        .server
        .post("/api/text-to-speech")
        .json(&json!({ "text": "read me aloud" }))
        .await;
    res.assert_status_ok();
    res.assert_json(&json!({ "text": "read me aloud" }));

    let res = h
        .server
        .post("/api/text-to-speech")
        .json(&json!({ "text": "   " }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    res.assert_json(&json!({ "error": "No text provided" }));
}

// =============================================================================
// Routing
// =============================================================================

#[tokio::test]
async fn test_unknown_api_path_is_404_json() {
    let h = stream_harness();
    let res = h.server.get("/api/nope").await;
    res.assert_status(StatusCode::NOT_FOUND);
    res.assert_json(&json!({ "error": "Not found" }));
}

#[tokio::test]
async fn test_wrong_method_is_405_json() {
    let h = stream_harness();
    let res = h.server.get("/api/chat").await;
    res.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    res.assert_json(&json!({ "error": "Method not allowed" }));

    let res = h.server.put("/api/session").await;
    res.assert_status(StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_non_api_paths_serve_static_assets() {
    let h = stream_harness();
    let res = h.server.get("/").await;
    res.assert_status_ok();
    assert_eq!(res.text(), "<h1>relay</h1>");
}
