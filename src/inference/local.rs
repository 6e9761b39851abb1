//! Ollama-style local adapter.
//!
//! Local servers may speak either API generation, so a call walks a small
//! state machine: `TryChat` (`/api/chat`) → `TryGenerate` (`/api/generate`)
//! → `Fail`. Only a non-2xx status advances the machine; a transport error on
//! any leg ends the call.

use std::time::Instant;

use reqwest::StatusCode;

use super::client::HttpClients;
use super::errors::ChatError;
use super::normalizer::{normalize_ndjson, ShapeHypothesis};
use super::resolver::join_url;
use super::streaming::{single_chunk, text_chunks, ChatStream, Framing};
use super::types::{BackendOutcome, ChatRequest, GenerateRequest};

pub const CHAT_PATH: &str = "api/chat";
pub const GENERATE_PATH: &str = "api/generate";
pub const TAGS_PATH: &str = "api/tags";

const LABEL: &str = "Ollama";

// ─── Fallback state machine ──────────────────────────────────────────────────

/// Where a local call currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalStep {
    TryChat,
    TryGenerate,
    Fail(StatusCode),
}

impl LocalStep {
    /// The step that follows a non-2xx `status` on this step.
    pub fn on_failure(self, status: StatusCode) -> LocalStep {
        match self {
            LocalStep::TryChat => LocalStep::TryGenerate,
            LocalStep::TryGenerate | LocalStep::Fail(_) => LocalStep::Fail(status),
        }
    }

    fn hypotheses(self) -> &'static [ShapeHypothesis] {
        match self {
            LocalStep::TryChat => &[ShapeHypothesis::ChatMessage],
            LocalStep::TryGenerate | LocalStep::Fail(_) => &[ShapeHypothesis::GenerateResponse],
        }
    }
}

/// Result of walking the state machine up to the first 2xx.
enum Opened {
    Answered {
        step: LocalStep,
        url: String,
        response: reqwest::Response,
    },
    Failed(StatusCode),
}

// ─── Adapter ─────────────────────────────────────────────────────────────────

pub struct LocalAdapter<'a> {
    http: &'a HttpClients,
}

impl<'a> LocalAdapter<'a> {
    pub fn new(http: &'a HttpClients) -> Self {
        Self { http }
    }

    /// Send a prompt and return the assistant text (or displayable error text).
    pub async fn send(&self, base: &str, prompt: &str, model: &str) -> Result<String, ChatError> {
        Ok(self.call(base, prompt, model).await?.into_text())
    }

    /// Send a prompt and return the structured outcome.
    pub async fn call(
        &self,
        base: &str,
        prompt: &str,
        model: &str,
    ) -> Result<BackendOutcome, ChatError> {
        let start = Instant::now();

        match self.open(base, prompt, model, false).await? {
            Opened::Answered {
                step,
                url,
                response,
            } => {
                let text = response
                    .text()
                    .await
                    .map_err(|e| self.http.transport_error(&url, e))?;
                tracing::info!(
                    url = %url,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    body_len = text.len(),
                    "ollama response received"
                );
                Ok(normalize_ndjson(&text, step.hypotheses()))
            }
            Opened::Failed(status) => Ok(BackendOutcome::http_error(LABEL, status)),
        }
    }

    /// Streaming variant: NDJSON from whichever endpoint answers first.
    pub async fn send_streaming(
        &self,
        base: &str,
        prompt: &str,
        model: &str,
    ) -> Result<ChatStream, ChatError> {
        match self.open(base, prompt, model, true).await? {
            Opened::Answered { step, response, .. } => {
                let stream: ChatStream = Box::pin(text_chunks(
                    Box::pin(response.bytes_stream()),
                    Framing::Ndjson,
                    step.hypotheses(),
                ));
                Ok(stream)
            }
            Opened::Failed(status) => {
                Ok(single_chunk(BackendOutcome::http_error(LABEL, status).into_text()))
            }
        }
    }

    /// `GET {base}/api/tags`, reporting only the status line.
    pub async fn probe(&self, base: &str) -> Result<String, ChatError> {
        let url = join_url(base, TAGS_PATH);
        let response = self
            .http
            .request
            .get(&url)
            .send()
            .await
            .map_err(|e| self.http.transport_error(&url, e))?;

        let status = response.status();
        Ok(format!(
            "Ollama: {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        ))
    }

    /// Walk `TryChat → TryGenerate → Fail` until a leg answers 2xx.
    async fn open(
        &self,
        base: &str,
        prompt: &str,
        model: &str,
        streaming: bool,
    ) -> Result<Opened, ChatError> {
        let base = base.trim_end_matches('/');
        let client = if streaming {
            &self.http.stream
        } else {
            &self.http.request
        };

        let mut step = LocalStep::TryChat;
        loop {
            let (url, request) = match step {
                LocalStep::TryChat => {
                    let body = ChatRequest::single_user(model, prompt);
                    let body = if streaming { body.streaming() } else { body };
                    let url = join_url(base, CHAT_PATH);
                    let request = client.post(&url).json(&body);
                    (url, request)
                }
                LocalStep::TryGenerate => {
                    let body = GenerateRequest {
                        model: model.to_string(),
                        prompt: prompt.to_string(),
                        stream: streaming,
                    };
                    let url = join_url(base, GENERATE_PATH);
                    let request = client.post(&url).json(&body);
                    (url, request)
                }
                LocalStep::Fail(status) => return Ok(Opened::Failed(status)),
            };

            tracing::info!(url = %url, model = %model, backend = "local", stream = streaming, "sending ollama request");

            let response = request
                .send()
                .await
                .map_err(|e| self.http.transport_error(&url, e))?;

            let status = response.status();
            if status.is_success() {
                return Ok(Opened::Answered {
                    step,
                    url,
                    response,
                });
            }

            tracing::warn!(url = %url, status = status.as_u16(), step = ?step, "ollama endpoint refused request");
            step = step.on_failure(status);
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use httpmock::MockServer;
    use serde_json::json;

    fn clients() -> HttpClients {
        HttpClients::build().unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let step = LocalStep::TryChat.on_failure(StatusCode::NOT_FOUND);
        assert_eq!(step, LocalStep::TryGenerate);

        let step = step.on_failure(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(step, LocalStep::Fail(StatusCode::INTERNAL_SERVER_ERROR));

        // Terminal state keeps the latest status.
        let step = step.on_failure(StatusCode::BAD_GATEWAY);
        assert_eq!(step, LocalStep::Fail(StatusCode::BAD_GATEWAY));
    }

    #[tokio::test]
    async fn test_chat_404_falls_back_to_generate() {
        let server = MockServer::start_async().await;
        let chat = server
            .mock_async(|when, then| {
                when.method("POST").path("/api/chat");
                then.status(404).body("404 page not found");
            })
            .await;
        let generate = server
            .mock_async(|when, then| {
                when.method("POST").path("/api/generate").json_body(json!({
                    "model": "llama3",
                    "prompt": "hello",
                    "stream": false
                }));
                then.status(200).json_body(json!({"response": "ok", "done": true}));
            })
            .await;

        let http = clients();
        let out = LocalAdapter::new(&http)
            .send(&server.base_url(), "hello", "llama3")
            .await
            .unwrap();

        assert_eq!(out, "ok");
        chat.assert_hits_async(1).await;
        generate.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_chat_success_skips_generate() {
        let server = MockServer::start_async().await;
        let chat = server
            .mock_async(|when, then| {
                when.method("POST").path("/api/chat").json_body(json!({
                    "model": "llama3",
                    "messages": [{"role": "user", "content": "hello"}]
                }));
                then.status(200)
                    .json_body(json!({"message": {"role": "assistant", "content": "hey"}, "done": true}));
            })
            .await;
        let generate = server
            .mock_async(|when, then| {
                when.method("POST").path("/api/generate");
                then.status(200).json_body(json!({"response": "wrong"}));
            })
            .await;

        let http = clients();
        let base = format!("{}/", server.base_url());
        let out = LocalAdapter::new(&http).send(&base, "hello", "llama3").await.unwrap();

        assert_eq!(out, "hey");
        chat.assert_hits_async(1).await;
        generate.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_unrequested_ndjson_reply_joined() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST").path("/api/chat");
                then.status(200).body(concat!(
                    "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n",
                    "{\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n",
                    "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
                ));
            })
            .await;

        let http = clients();
        let outcome = LocalAdapter::new(&http)
            .call(&server.base_url(), "hello", "llama3")
            .await
            .unwrap();
        assert_eq!(outcome, BackendOutcome::Success("Hello".into()));
    }

    #[tokio::test]
    async fn test_both_legs_fail() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST").path("/api/chat");
                then.status(404);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method("POST").path("/api/generate");
                then.status(500);
            })
            .await;

        let http = clients();
        let outcome = LocalAdapter::new(&http)
            .call(&server.base_url(), "hello", "llama3")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            BackendOutcome::HttpError {
                label: "Ollama",
                status: 500,
                reason: "Internal Server Error".into()
            }
        );
        assert_eq!(outcome.into_text(), "Ollama error: 500 Internal Server Error");
    }

    #[tokio::test]
    async fn test_transport_error_on_chat_propagates() {
        // Nothing listens on port 1.
        let http = clients();
        let result = LocalAdapter::new(&http)
            .send("http://127.0.0.1:1", "hello", "llama3")
            .await;
        let err = result.unwrap_err();
        assert!(err.is_transport(), "expected transport error, got {err:?}");
    }

    #[tokio::test]
    async fn test_streaming_chat_ndjson() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST").path("/api/chat").json_body(json!({
                    "model": "llama3",
                    "messages": [{"role": "user", "content": "hi"}],
                    "stream": true
                }));
                then.status(200).body(concat!(
                    "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n",
                    "{\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n",
                    "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
                ));
            })
            .await;

        let http = clients();
        let stream = LocalAdapter::new(&http)
            .send_streaming(&server.base_url(), "hi", "llama3")
            .await
            .unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[tokio::test]
    async fn test_streaming_falls_back_to_generate() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST").path("/api/chat");
                then.status(404);
            })
            .await;
        let generate = server
            .mock_async(|when, then| {
                when.method("POST").path("/api/generate").json_body(json!({
                    "model": "llama3",
                    "prompt": "hi",
                    "stream": true
                }));
                then.status(200)
                    .body("{\"response\":\"a\",\"done\":false}\n{\"response\":\"b\",\"done\":true}\n");
            })
            .await;

        let http = clients();
        let stream = LocalAdapter::new(&http)
            .send_streaming(&server.base_url(), "hi", "llama3")
            .await
            .unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec!["a".to_string(), "b".to_string()]);
        generate.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_streaming_failure_single_chunk() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST");
                then.status(503);
            })
            .await;

        let http = clients();
        let stream = LocalAdapter::new(&http)
            .send_streaming(&server.base_url(), "hi", "llama3")
            .await
            .unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec!["Ollama error: 503 Service Unavailable".to_string()]);
    }

    #[tokio::test]
    async fn test_probe_tags() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/api/tags");
                then.status(200).json_body(json!({"models": []}));
            })
            .await;

        let http = clients();
        let line = LocalAdapter::new(&http)
            .probe(&format!("{}/", server.base_url()))
            .await
            .unwrap();
        assert_eq!(line, "Ollama: 200 OK");
    }
}
