//! Passthrough interception of streamed chat replies.
//!
//! The upstream reply is a sequence of framed fragments, each a JSON object
//! with an optional incremental `response` text field, usually in SSE form:
//!
//! ```text
//! data: {"response":"Hel"}
//!
//! data: {"response":"lo"}
//!
//! data: [DONE]
//! ```
//!
//! [`intercept`] forwards every upstream chunk to the client untouched while a
//! [`FragmentAccumulator`] folds the text fields. When the upstream ends, the
//! complete text is appended to the session as one assistant message.
//!
//! # Framing
//!
//! Bytes up to each newline are tried as one fragment. A JSON value that is
//! cut short stays buffered and is retried with the following lines, so
//! pretty-printed fragments spanning several lines still decode. Whatever
//! trails the last newline is tried as one whole fragment on every read and
//! kept buffered until it parses. Fragments concatenated on a single line
//! with no separator cannot be recovered this way; that case is detected and
//! logged.

use std::sync::Arc;

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::llm::{GatewayError, Message};
use crate::session::SessionStore;

const DATA_PREFIX: &[u8] = b"data:";
const DONE_SENTINEL: &[u8] = b"[DONE]";

/// Outcome of decoding one candidate frame.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    /// A complete fragment, with its text field if it carried one.
    Fragment(Option<String>),
    /// SSE bookkeeping (`event:`, `id:`, comments) or a blank line.
    Ignored,
    /// A JSON value cut short; more bytes may complete it.
    Incomplete,
    /// Syntactically invalid, no suffix can fix it.
    Invalid,
}

/// Folds the text of streamed fragments while bytes pass through.
#[derive(Debug, Default)]
pub struct FragmentAccumulator {
    buffer: Vec<u8>,
    text: String,
    fragments: usize,
    concatenation_flagged: bool,
}

impl FragmentAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one upstream read.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);

        // Start of the newest line; bytes before it are an incomplete fragment.
        let mut line_start = 0;
        while let Some(offset) = self.buffer[line_start..].iter().position(|&b| b == b'\n') {
            let end = line_start + offset + 1;
            match decode_frame(&self.buffer[..end]) {
                Frame::Fragment(text) => {
                    self.fold(text);
                    self.buffer.drain(..end);
                    line_start = 0;
                }
                Frame::Ignored => {
                    self.buffer.drain(..end);
                    line_start = 0;
                }
                Frame::Incomplete => line_start = end,
                Frame::Invalid => {
                    // Retry the newest line on its own before giving up on it.
                    let cut = if line_start > 0 { line_start } else { end };
                    self.discard(cut);
                    line_start = 0;
                }
            }
        }

        match decode_frame(&self.buffer) {
            Frame::Fragment(text) => {
                self.fold(text);
                self.buffer.clear();
            }
            Frame::Invalid if line_start > 0 => {
                if let Frame::Fragment(text) = decode_frame(&self.buffer[line_start..]) {
                    self.discard(line_start);
                    self.fold(text);
                    self.buffer.clear();
                } else {
                    let tail = self.buffer.split_off(line_start);
                    self.flag_if_concatenated(&tail);
                    self.buffer.extend_from_slice(&tail);
                }
            }
            Frame::Invalid => {
                let tail = std::mem::take(&mut self.buffer);
                self.flag_if_concatenated(&tail);
                self.buffer = tail;
            }
            Frame::Ignored | Frame::Incomplete => {}
        }
    }

    /// Number of complete fragments seen.
    #[must_use]
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// Whether concatenated fragments were seen on one line.
    #[must_use]
    pub fn concatenation_flagged(&self) -> bool {
        self.concatenation_flagged
    }

    /// Make a last attempt on buffered bytes and return the full text.
    ///
    /// Leftovers that still do not decode are dropped.
    #[must_use]
    pub fn finish(mut self) -> String {
        match decode_frame(&self.buffer) {
            Frame::Fragment(text) => self.fold(text),
            Frame::Ignored => {}
            Frame::Incomplete | Frame::Invalid => debug!(
                name: "stream.tail.discarded",
                bytes = self.buffer.len(),
                "Discarding incomplete trailing fragment"
            ),
        }
        self.text
    }

    fn fold(&mut self, text: Option<String>) {
        self.fragments += 1;
        if let Some(t) = text {
            self.text.push_str(&t);
        }
    }

    /// Drop the first `len` buffered bytes as undecodable.
    fn discard(&mut self, len: usize) {
        let dropped: Vec<u8> = self.buffer.drain(..len).collect();
        self.flag_if_concatenated(&dropped);
        warn!(
            name: "stream.fragment.invalid",
            bytes = dropped.len(),
            "Discarding undecodable stream bytes"
        );
    }

    fn flag_if_concatenated(&mut self, raw: &[u8]) {
        if self.concatenation_flagged || !starts_with_complete_value(raw) {
            return;
        }
        self.concatenation_flagged = true;
        warn!(
            name: "stream.fragment.concatenated",
            "Several fragments arrived without a separator; their text is not recoverable"
        );
    }
}

/// Strip whitespace and an optional `data:` prefix.
///
/// Returns `None` for lines that are not fragment payloads at all.
fn payload(raw: &[u8]) -> Option<&[u8]> {
    let trimmed = raw.trim_ascii();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(rest) = trimmed.strip_prefix(DATA_PREFIX) {
        return Some(rest.trim_ascii());
    }
    match trimmed.first() {
        Some(b'{' | b'[') => Some(trimmed),
        _ => None,
    }
}

fn decode_frame(raw: &[u8]) -> Frame {
    let Some(body) = payload(raw) else {
        return Frame::Ignored;
    };
    if body.is_empty() {
        return Frame::Ignored;
    }
    if body == DONE_SENTINEL {
        return Frame::Fragment(None);
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(v) => Frame::Fragment(
            v.get("response")
                .and_then(Value::as_str)
                .map(ToString::to_string),
        ),
        Err(e) if e.is_eof() => Frame::Incomplete,
        Err(_) => Frame::Invalid,
    }
}

/// True when `raw` opens with one complete JSON value followed by more data.
fn starts_with_complete_value(raw: &[u8]) -> bool {
    let Some(body) = payload(raw) else {
        return false;
    };
    let mut values = serde_json::Deserializer::from_slice(body).into_iter::<Value>();
    matches!(values.next(), Some(Ok(_))) && values.byte_offset() < body.len()
}

/// Where the final assistant message goes.
#[derive(Debug, Clone)]
pub struct PersistTarget {
    /// Store holding the conversation.
    pub store: Arc<dyn SessionStore>,
    /// Session the reply belongs to.
    pub session_id: String,
}

/// Relay `source` unchanged, persisting the accumulated reply at the end.
///
/// The final append runs on its own task, so a client that disconnects while
/// it is in flight does not cancel it. Its failure is logged and never reaches
/// the client, which has already received every byte. An upstream read error
/// is forwarded and ends the stream without persisting partial text.
pub fn intercept<S>(
    source: S,
    target: Option<PersistTarget>,
) -> impl Stream<Item = Result<Bytes, GatewayError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, GatewayError>> + Send + 'static,
{
    async_stream::stream! {
        let mut acc = FragmentAccumulator::new();
        futures::pin_mut!(source);

        while let Some(chunk) = source.next().await {
            match chunk {
                Ok(bytes) => {
                    acc.push(&bytes);
                    yield Ok(bytes);
                }
                Err(e) => {
                    error!(
                        name: "stream.upstream.failed",
                        error = %e,
                        "Upstream stream failed; skipping persistence"
                    );
                    yield Err(e);
                    return;
                }
            }
        }

        let fragments = acc.fragments();
        let text = acc.finish();
        info!(
            name: "stream.completed",
            fragments,
            chars = text.chars().count(),
            "Upstream stream completed"
        );

        if let Some(target) = target {
            if !text.is_empty() {
                let handle = tokio::spawn(persist_reply(target, text));
                if let Err(e) = handle.await {
                    error!(name: "session.persist.join_failed", error = %e, "Persistence task failed");
                }
            }
        }
    }
}

/// Append `text` as the assistant reply, logging rather than returning failures.
pub async fn persist_reply(target: PersistTarget, text: String) {
    match target
        .store
        .append_message(&target.session_id, Message::assistant(text))
        .await
    {
        Ok(()) => info!(
            name: "session.assistant.persisted",
            session_id = %target.session_id,
            "Assistant reply persisted"
        ),
        Err(e) => error!(
            name: "session.assistant.persist_failed",
            session_id = %target.session_id,
            error = %e,
            "Failed to persist assistant reply"
        ),
    }
}
