//! Unified chat client.
//!
//! Holds the HTTP transport and the current endpoint configuration, picks a
//! backend per call, and hands off to the matching adapter. Configuration can
//! be swapped at any time with [`ChatClient::configure`]; each call works from
//! the snapshot it captured when it started.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::Client as HttpClient;

use super::cloud::CloudAdapter;
use super::config::{EndpointConfig, Settings, DEFAULT_MODEL};
use super::errors::ChatError;
use super::local::LocalAdapter;
use super::resolver::{resolve, Backend};
use super::streaming::{single_chunk, ChatStream};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Read timeout, applied to every request including each local fallback leg.
///
/// Non-streaming calls get it as a total deadline. A streamed answer may
/// legitimately run longer, so for streaming calls only the gap between
/// reads is bounded.
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Returned when neither backend is usable. No request is made.
pub const NO_ENDPOINTS_MESSAGE: &str =
    "No endpoints configured. Open settings to add Cloud API/Ollama.";

// ─── Transport ───────────────────────────────────────────────────────────────

/// The pair of HTTP clients shared by both adapters.
pub struct HttpClients {
    /// Non-streaming requests (connect timeout, total read deadline).
    pub(crate) request: HttpClient,
    /// Streaming requests (connect timeout, deadline between reads).
    pub(crate) stream: HttpClient,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl HttpClients {
    /// Clients with the standard 30s connect / 60s read limits.
    pub fn build() -> Result<Self, ChatError> {
        Self::with_timeouts(CONNECT_TIMEOUT, READ_TIMEOUT)
    }

    pub fn with_timeouts(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, ChatError> {
        let request = HttpClient::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|e| ChatError::ConfigError {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let stream = HttpClient::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()
            .map_err(|e| ChatError::ConfigError {
                reason: format!("failed to build streaming HTTP client: {e}"),
            })?;

        Ok(Self {
            request,
            stream,
            connect_timeout,
            read_timeout,
        })
    }

    /// Map a transport failure, reporting whichever limit applied.
    pub(crate) fn transport_error(&self, url: &str, err: reqwest::Error) -> ChatError {
        let limit = if err.is_connect() {
            self.connect_timeout
        } else {
            self.read_timeout
        };
        ChatError::from_transport(url, limit.as_secs(), err)
    }
}

// ─── ChatClient ──────────────────────────────────────────────────────────────

/// Stateless one-prompt-in, one-answer-out client over cloud or local backends.
///
/// Safe to share across tasks (`Arc<ChatClient>`): calls never hold the config
/// lock across an await.
pub struct ChatClient {
    http: HttpClients,
    config: RwLock<Arc<EndpointConfig>>,
    default_model: String,
}

impl ChatClient {
    /// Create a client with no endpoints configured.
    pub fn new() -> Result<Self, ChatError> {
        Ok(Self::with_http(HttpClients::build()?))
    }

    /// Create a client over prebuilt transport, e.g. with custom timeouts.
    pub fn with_http(http: HttpClients) -> Self {
        Self {
            http,
            config: RwLock::new(Arc::new(EndpointConfig::default())),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create a client from loaded settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, ChatError> {
        let mut client = Self::new()?;
        client.default_model = settings.default_model.clone();
        client.replace_config(settings.endpoints());
        Ok(client)
    }

    /// Install new endpoints. Blank values are treated as absent.
    ///
    /// Calls already in flight keep the configuration they started with.
    pub fn configure(
        &self,
        cloud_base: Option<&str>,
        cloud_key: Option<&str>,
        local_base: Option<&str>,
    ) {
        self.replace_config(EndpointConfig::new(cloud_base, cloud_key, local_base));
    }

    fn replace_config(&self, config: EndpointConfig) {
        let backend = resolve(&config).map(|b| b.name()).unwrap_or("none");
        tracing::info!(backend, "endpoint configuration updated");

        let mut guard = self.config.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(config);
    }

    /// The configuration a call started now would use.
    pub fn snapshot(&self) -> Arc<EndpointConfig> {
        let guard = self.config.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Send a prompt and return the assistant's text.
    ///
    /// HTTP errors and unparseable bodies come back as `Ok` text; only
    /// transport failures are `Err`.
    pub async fn send(&self, prompt: &str, model: &str) -> Result<String, ChatError> {
        let config = self.snapshot();

        match resolve(&config) {
            Some(Backend::Local { base }) => {
                LocalAdapter::new(&self.http).send(&base, prompt, model).await
            }
            Some(Backend::Cloud { base, key }) => {
                CloudAdapter::new(&self.http)
                    .send(&base, &key, prompt, model)
                    .await
            }
            None => Ok(NO_ENDPOINTS_MESSAGE.to_string()),
        }
    }

    /// [`send`](Self::send) with the configured default model.
    pub async fn send_default(&self, prompt: &str) -> Result<String, ChatError> {
        self.send(prompt, &self.default_model).await
    }

    /// Send a prompt and return a stream of text chunks.
    ///
    /// The stream is finite and single-use. A mid-stream transport error is
    /// yielded as the last item.
    pub async fn send_streaming(&self, prompt: &str, model: &str) -> Result<ChatStream, ChatError> {
        let config = self.snapshot();

        match resolve(&config) {
            Some(Backend::Local { base }) => {
                LocalAdapter::new(&self.http)
                    .send_streaming(&base, prompt, model)
                    .await
            }
            Some(Backend::Cloud { base, key }) => {
                CloudAdapter::new(&self.http)
                    .send_streaming(&base, &key, prompt, model)
                    .await
            }
            None => Ok(single_chunk(NO_ENDPOINTS_MESSAGE.to_string())),
        }
    }

    /// Check connectivity of every configured backend.
    ///
    /// Returns one status line per probed backend, e.g. `"Cloud: 200 OK"`.
    /// Unlike [`send`](Self::send), both backends are probed when both are set.
    pub async fn probe(&self) -> Vec<String> {
        let config = self.snapshot();
        let mut results = Vec::new();

        if let (Some(base), Some(key)) = (&config.cloud_base, &config.cloud_key) {
            let line = CloudAdapter::new(&self.http).probe(base, key).await;
            results.push(line.unwrap_or_else(|e| e.display_for_user()));
        }
        if let Some(base) = &config.local_base {
            let line = LocalAdapter::new(&self.http).probe(base).await;
            results.push(line.unwrap_or_else(|e| e.display_for_user()));
        }

        results
    }
}

/// Render a call result the way a chat surface shows it.
pub fn display_reply(result: Result<String, ChatError>) -> String {
    match result {
        Ok(text) => text,
        Err(e) => e.display_for_user(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
