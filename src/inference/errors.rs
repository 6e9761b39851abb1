//! Chat error types.
//!
//! Only transport-level failures are represented here. HTTP non-success
//! statuses and unparseable bodies never become errors; they are rendered
//! into displayable text by the adapters (see `types::BackendOutcome`).

use thiserror::Error;

/// Errors that can escape a `send` / `send_streaming` call.
#[derive(Debug, Error)]
pub enum ChatError {
    /// TCP/HTTP connection to the backend failed (DNS, refused, reset).
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed {
        endpoint: String,
        reason: String,
    },

    /// The backend did not connect or respond within the configured timeout.
    #[error("request to {endpoint} timed out after {duration_secs}s")]
    Timeout {
        endpoint: String,
        duration_secs: u64,
    },

    /// The response body broke off while it was being streamed.
    #[error("stream error: {reason}")]
    StreamError {
        reason: String,
    },

    /// Configuration file loading or parsing error.
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },
}

impl ChatError {
    /// Map a `reqwest` error from a request to `endpoint` into a `ChatError`.
    ///
    /// `timeout_secs` is the limit that applied to the request, reported back
    /// when the failure was a timeout.
    pub fn from_transport(endpoint: &str, timeout_secs: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatError::Timeout {
                endpoint: endpoint.to_string(),
                duration_secs: timeout_secs,
            }
        } else {
            ChatError::ConnectionFailed {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Whether this error came from the network rather than local config.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ChatError::ConnectionFailed { .. }
                | ChatError::Timeout { .. }
                | ChatError::StreamError { .. }
        )
    }

    /// The line a chat surface shows in place of an assistant reply.
    pub fn display_for_user(&self) -> String {
        format!("Error: {self}")
    }
}
