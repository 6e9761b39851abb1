//! Wire types shared by the adapters.
//!
//! Request bodies for the cloud `/v1/chat/completions` endpoint and the two
//! Ollama endpoints, plus the internal outcome every call resolves to.

use serde::{Deserialize, Serialize};

// ─── Request Types ───────────────────────────────────────────────────────────

/// Message role. Calls are single-turn, so only the user ever speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

/// A single message in a chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Request body for `POST /v1/chat/completions` and `POST /api/chat`.
///
/// Both endpoints accept the same `{model, messages}` shape. `stream` is only
/// sent for streaming calls.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl ChatRequest {
    /// A request carrying exactly one user message.
    pub fn single_user(model: &str, prompt: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: prompt.to_string(),
            }],
            stream: None,
        }
    }

    pub fn streaming(mut self) -> Self {
        self.stream = Some(true);
        self
    }
}

/// Request body for Ollama's legacy `POST /api/generate`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// What a single backend call resolved to.
///
/// Every path through an adapter ends in exactly one of these; only transport
/// failures bypass it as a `ChatError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOutcome {
    /// Text extracted from a well-formed response.
    Success(String),
    /// Non-2xx response; `label` names the backend (`"Cloud API"`, `"Ollama"`).
    HttpError {
        label: &'static str,
        status: u16,
        reason: String,
    },
    /// Body could not be matched to any shape; holds the raw-body prefix.
    ParseFallback(String),
}

impl BackendOutcome {
    /// Render the outcome as the text handed back to the caller.
    pub fn into_text(self) -> String {
        match self {
            BackendOutcome::Success(text) | BackendOutcome::ParseFallback(text) => text,
            BackendOutcome::HttpError {
                label,
                status,
                reason,
            } => format!("{label} error: {status} {reason}"),
        }
    }

    /// Build an `HttpError` outcome from a response status.
    pub fn http_error(label: &'static str, status: reqwest::StatusCode) -> Self {
        BackendOutcome::HttpError {
            label,
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_body_shape() {
        let req = ChatRequest::single_user("gpt-4o-mini", "hello");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "hello"}]
            })
        );
    }

    #[test]
    fn test_stream_flag_only_when_streaming() {
        let req = ChatRequest::single_user("m", "p");
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("stream"), "stream should be omitted when None");

        let json = serde_json::to_string(&req.streaming()).unwrap();
        assert!(json.contains("\"stream\":true"));
    }

    #[test]
    fn test_generate_request_body_shape() {
        let req = GenerateRequest {
            model: "llama3".into(),
            prompt: "hi".into(),
            stream: false,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"model": "llama3", "prompt": "hi", "stream": false})
        );
    }

    #[test]
    fn test_http_error_text() {
        let outcome = BackendOutcome::http_error("Cloud API", reqwest::StatusCode::UNAUTHORIZED);
        assert_eq!(outcome.into_text(), "Cloud API error: 401 Unauthorized");
    }

    #[test]
    fn test_fallback_text_passthrough() {
        let outcome = BackendOutcome::ParseFallback("{}".into());
        assert_eq!(outcome.into_text(), "{}");
    }
}
