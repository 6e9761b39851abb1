//! Defensive extraction of assistant text from backend response bodies.
//!
//! Each shape hypothesis is a pure `&Value -> Option<String>` extractor.
//! Hypotheses are tried in order; when none matches, the first
//! [`RAW_FALLBACK_CHARS`] characters of the raw body are returned instead, so
//! the caller always sees something diagnostic.

use serde_json::Value;

use super::types::BackendOutcome;

/// How much of an unparseable body is echoed back.
pub const RAW_FALLBACK_CHARS: usize = 2000;

/// A named field path where assistant text may live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeHypothesis {
    /// `choices[0].message.content` (OpenAI chat completion).
    OpenAiChoices,
    /// `choices[0].delta.content` (OpenAI streaming delta).
    OpenAiDelta,
    /// `message.content` (Ollama `/api/chat`).
    ChatMessage,
    /// `response` (Ollama `/api/generate`).
    GenerateResponse,
}

impl ShapeHypothesis {
    fn extractor(self) -> fn(&Value) -> Option<String> {
        match self {
            ShapeHypothesis::OpenAiChoices => openai_choices,
            ShapeHypothesis::OpenAiDelta => openai_delta,
            ShapeHypothesis::ChatMessage => chat_message,
            ShapeHypothesis::GenerateResponse => generate_response,
        }
    }

    /// Apply this hypothesis to a parsed body.
    pub fn extract(self, value: &Value) -> Option<String> {
        (self.extractor())(value)
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn openai_choices(value: &Value) -> Option<String> {
    non_empty(value.pointer("/choices/0/message/content"))
}

fn openai_delta(value: &Value) -> Option<String> {
    non_empty(value.pointer("/choices/0/delta/content"))
}

fn chat_message(value: &Value) -> Option<String> {
    non_empty(value.pointer("/message/content"))
}

fn generate_response(value: &Value) -> Option<String> {
    non_empty(value.get("response"))
}

/// Try each hypothesis against an already-parsed value.
pub fn extract_value(value: &Value, hypotheses: &[ShapeHypothesis]) -> Option<String> {
    hypotheses.iter().find_map(|h| h.extract(value))
}

/// Extract assistant text from a raw body. Never fails.
pub fn normalize(raw: &str, hypotheses: &[ShapeHypothesis]) -> BackendOutcome {
    let extracted = serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|value| extract_value(&value, hypotheses));

    match extracted {
        Some(text) => BackendOutcome::Success(text),
        None => {
            tracing::debug!(
                body_len = raw.len(),
                hypotheses = ?hypotheses,
                "no shape matched response body, echoing raw prefix"
            );
            BackendOutcome::ParseFallback(truncate_chars(raw, RAW_FALLBACK_CHARS))
        }
    }
}

/// [`normalize`], except that a body of several JSON lines is stitched back
/// together. Ollama streams unless told otherwise, so a plain request may
/// still be answered in NDJSON.
pub fn normalize_ndjson(raw: &str, hypotheses: &[ShapeHypothesis]) -> BackendOutcome {
    let outcome = normalize(raw, hypotheses);
    if !matches!(outcome, BackendOutcome::ParseFallback(_)) {
        return outcome;
    }

    let joined = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str::<Value>(line).ok())
        .collect::<Option<Vec<_>>>()
        .filter(|frames| frames.len() > 1)
        .map(|frames| {
            frames
                .iter()
                .filter_map(|frame| extract_value(frame, hypotheses))
                .collect::<String>()
        })
        .filter(|text| !text.is_empty());

    match joined {
        Some(text) => BackendOutcome::Success(text),
        None => outcome,
    }
}

/// Convenience wrapper returning the rendered text.
pub fn extract(raw: &str, hypothesis: ShapeHypothesis) -> String {
    normalize(raw, &[hypothesis]).into_text()
}

/// First `max` characters of `s`, never splitting a UTF-8 sequence.
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
