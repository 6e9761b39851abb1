//! OpenAI-compatible cloud adapter.
//!
//! One bearer-authenticated POST to `{base}/v1/chat/completions`, no retry.

use std::time::Instant;

use super::client::HttpClients;
use super::errors::ChatError;
use super::normalizer::{normalize, ShapeHypothesis};
use super::resolver::join_url;
use super::streaming::{complete_reply, single_chunk, text_chunks, ChatStream, Framing};
use super::types::{BackendOutcome, ChatRequest};

pub const CHAT_PATH: &str = "v1/chat/completions";
pub const MODELS_PATH: &str = "v1/models";

const LABEL: &str = "Cloud API";

/// Some OpenAI-compatible servers answer with a bare `response` field.
const HYPOTHESES: &[ShapeHypothesis] = &[
    ShapeHypothesis::OpenAiChoices,
    ShapeHypothesis::GenerateResponse,
];

const STREAM_HYPOTHESES: &[ShapeHypothesis] = &[ShapeHypothesis::OpenAiDelta];

pub struct CloudAdapter<'a> {
    http: &'a HttpClients,
}

impl<'a> CloudAdapter<'a> {
    pub fn new(http: &'a HttpClients) -> Self {
        Self { http }
    }

    /// Send a prompt and return the assistant text (or displayable error text).
    pub async fn send(
        &self,
        base: &str,
        key: &str,
        prompt: &str,
        model: &str,
    ) -> Result<String, ChatError> {
        Ok(self.call(base, key, prompt, model).await?.into_text())
    }

    /// Send a prompt and return the structured outcome.
    pub async fn call(
        &self,
        base: &str,
        key: &str,
        prompt: &str,
        model: &str,
    ) -> Result<BackendOutcome, ChatError> {
        let url = join_url(base, CHAT_PATH);
        let body = ChatRequest::single_user(model, prompt);
        let start = Instant::now();

        tracing::info!(url = %url, model = %model, backend = "cloud", "sending chat request");

        let response = self
            .http
            .request
            .post(&url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.http.transport_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                url = %url,
                status = status.as_u16(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "cloud API returned non-success status"
            );
            return Ok(BackendOutcome::http_error(LABEL, status));
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.http.transport_error(&url, e))?;

        tracing::info!(
            url = %url,
            elapsed_ms = start.elapsed().as_millis() as u64,
            body_len = text.len(),
            "cloud response received"
        );

        Ok(normalize(&text, HYPOTHESES))
    }

    /// Send a prompt with `stream: true` and decode the SSE reply.
    ///
    /// A non-2xx status yields a single chunk carrying the error text.
    pub async fn send_streaming(
        &self,
        base: &str,
        key: &str,
        prompt: &str,
        model: &str,
    ) -> Result<ChatStream, ChatError> {
        let url = join_url(base, CHAT_PATH);
        let body = ChatRequest::single_user(model, prompt).streaming();

        tracing::info!(url = %url, model = %model, backend = "cloud", stream = true, "sending chat request");

        let response = self
            .http
            .stream
            .post(&url)
            .bearer_auth(key)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.http.transport_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %url, status = status.as_u16(), "cloud API returned non-success status");
            return Ok(single_chunk(BackendOutcome::http_error(LABEL, status).into_text()));
        }

        if !is_event_stream(&response) {
            let text = response
                .text()
                .await
                .map_err(|e| self.http.transport_error(&url, e))?;
            tracing::warn!(url = %url, body_len = text.len(), "cloud API did not stream, using whole body");
            return Ok(complete_reply(normalize(&text, HYPOTHESES).into_text()));
        }

        let stream: ChatStream = Box::pin(text_chunks(
            Box::pin(response.bytes_stream()),
            Framing::Sse,
            STREAM_HYPOTHESES,
        ));
        Ok(stream)
    }

    /// `GET {base}/v1/models`, reporting only the status line.
    pub async fn probe(&self, base: &str, key: &str) -> Result<String, ChatError> {
        let url = join_url(base, MODELS_PATH);
        let response = self
            .http
            .request
            .get(&url)
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| self.http.transport_error(&url, e))?;

        let status = response.status();
        Ok(format!(
            "Cloud: {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        ))
    }
}

/// A missing `Content-Type` is given the benefit of the doubt.
fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(true, |ct| ct.contains("text/event-stream"))
}
