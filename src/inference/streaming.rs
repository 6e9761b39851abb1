//! Chunked response decoding.
//!
//! Turns a response byte stream into a stream of text chunks. Two framings are
//! supported: SSE (`data: {...}` lines, `[DONE]` terminator) for the cloud API,
//! and NDJSON (one JSON object per line) for Ollama.
//!
//! Blank chunks are dropped. The first transport error ends the stream.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;

use super::errors::ChatError;
use super::normalizer::{extract_value, ShapeHypothesis};

/// A lazy, single-consumer stream of assistant text chunks.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// Line framing used by a streaming endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Server-sent events: `data: <json>` lines, `data: [DONE]` ends.
    Sse,
    /// Newline-delimited JSON.
    Ndjson,
}

/// Hypotheses for a complete, non-incremental completion that turns up where
/// SSE frames were expected.
const UNSTREAMED_BODY: &[ShapeHypothesis] = &[
    ShapeHypothesis::OpenAiChoices,
    ShapeHypothesis::GenerateResponse,
];

/// A stream that yields `text` once and ends.
pub fn single_chunk(text: String) -> ChatStream {
    Box::pin(stream::once(async move { Ok(text) }))
}

/// A stream over an already complete reply: one chunk, or nothing if blank.
pub fn complete_reply(text: String) -> ChatStream {
    if text.trim().is_empty() {
        Box::pin(stream::empty())
    } else {
        single_chunk(text)
    }
}

// ─── Chunk stream ────────────────────────────────────────────────────────────

/// Decode a byte stream into text chunks.
///
/// Each complete line is one frame. A frame is parsed as JSON and run through
/// `hypotheses`; frames that match nothing or decode to blank text are
/// skipped. A frame carrying a non-null `error` field, or a read error from
/// the underlying stream, is yielded as `Err` and terminates the stream.
///
/// Under SSE framing a bare `{...}` line is read as a complete completion,
/// which is what a server that does not stream sends back.
pub fn text_chunks<S, B, E>(
    bytes: S,
    framing: Framing,
    hypotheses: &'static [ShapeHypothesis],
) -> impl Stream<Item = Result<String, ChatError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + Unpin,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let state = ChunkState {
        bytes,
        decoder: FrameDecoder::new(framing, hypotheses),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let items = state.decoder.push(chunk.as_ref());
                    state.enqueue(items);
                }
                Some(Err(e)) => {
                    state.done = true;
                    state.pending.push_back(Err(ChatError::StreamError {
                        reason: format!("stream read error: {e}"),
                    }));
                }
                None => {
                    // Body closed; a final frame may lack its trailing newline.
                    let items = state.decoder.finish();
                    state.enqueue(items);
                    state.done = true;
                }
            }
        }
    })
}

struct ChunkState<S> {
    bytes: S,
    decoder: FrameDecoder,
    pending: VecDeque<Result<String, ChatError>>,
    done: bool,
}

impl<S> ChunkState<S> {
    /// Queue decoded items, stopping at the first error.
    fn enqueue(&mut self, items: Vec<Result<String, ChatError>>) {
        for item in items {
            let is_err = item.is_err();
            self.pending.push_back(item);
            if is_err {
                self.done = true;
                return;
            }
        }
        if self.decoder.finished {
            self.done = true;
        }
    }
}

// ─── Frame decoder ───────────────────────────────────────────────────────────

/// Buffers raw bytes and splits them into newline-terminated frames.
///
/// Bytes are buffered, not text, so a multi-byte UTF-8 sequence split across
/// two network reads is reassembled before decoding.
struct FrameDecoder {
    framing: Framing,
    hypotheses: &'static [ShapeHypothesis],
    buffer: Vec<u8>,
    finished: bool,
}

impl FrameDecoder {
    fn new(framing: Framing, hypotheses: &'static [ShapeHypothesis]) -> Self {
        Self {
            framing,
            hypotheses,
            buffer: Vec::new(),
            finished: false,
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Vec<Result<String, ChatError>> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            match self.decode_line(&String::from_utf8_lossy(&line)) {
                Ok(Some(text)) => out.push(Ok(text)),
                Ok(None) => {}
                Err(e) => {
                    out.push(Err(e));
                    break;
                }
            }
            if self.finished {
                break;
            }
        }

        out
    }

    fn finish(&mut self) -> Vec<Result<String, ChatError>> {
        if self.finished || self.buffer.is_empty() {
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.buffer);
        match self.decode_line(&String::from_utf8_lossy(&rest)) {
            Ok(Some(text)) => vec![Ok(text)],
            Ok(None) => Vec::new(),
            Err(e) => vec![Err(e)],
        }
    }

    /// Decode one frame. `Ok(None)` means nothing to forward.
    fn decode_line(&mut self, line: &str) -> Result<Option<String>, ChatError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (payload, hypotheses) = match self.framing {
            Framing::Sse => match line.strip_prefix("data:") {
                Some(data) => (data.trim(), self.hypotheses),
                // Server ignored `stream: true` and sent a plain JSON body.
                None if line.starts_with('{') => (line, UNSTREAMED_BODY),
                None => return Ok(None), // event:, id:, comments
            },
            Framing::Ndjson => (line, self.hypotheses),
        };

        if self.framing == Framing::Sse && payload == "[DONE]" {
            self.finished = true;
            return Ok(None);
        }

        let value: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, frame_len = payload.len(), "skipping undecodable frame");
                return Ok(None);
            }
        };

        // Some gateways put `"error": null` on every normal frame.
        if let Some(err) = value.get("error").filter(|e| !e.is_null()) {
            return Err(ChatError::StreamError {
                reason: format!("backend reported: {}", error_message(err)),
            });
        }

        Ok(extract_value(&value, hypotheses).filter(|text| !text.trim().is_empty()))
    }
}

/// Render an `error` field as either a bare string or `{"message": ...}`.
fn error_message(err: &Value) -> String {
    err.as_str()
        .or_else(|| err.pointer("/message").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
