//! Chat inference core: one call surface over an OpenAI-compatible cloud API
//! and a local Ollama-style server.
//!
//! - Endpoint selection from the current configuration (local preferred)
//! - Per-backend request building and response parsing
//! - Ollama `/api/chat` → `/api/generate` fallback
//! - Defensive JSON extraction with raw-body echo on failure
//! - Chunked streaming over SSE and NDJSON

pub mod client;
pub mod cloud;
pub mod config;
pub mod errors;
pub mod local;
pub mod normalizer;
pub mod resolver;
pub mod streaming;
pub mod types;

// Re-exports for convenience
pub use client::{display_reply, ChatClient, HttpClients, NO_ENDPOINTS_MESSAGE};
pub use config::{EndpointConfig, Settings, DEFAULT_MODEL};
pub use errors::ChatError;
pub use normalizer::ShapeHypothesis;
pub use resolver::{resolve, Backend};
pub use streaming::ChatStream;
pub use types::BackendOutcome;
