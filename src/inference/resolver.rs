//! Endpoint selection.
//!
//! Picks exactly one backend per call from a configuration snapshot. This is a
//! policy decision only: no connectivity is checked here.

use super::config::EndpointConfig;

/// The backend a call will be sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Self-hosted Ollama-style server.
    Local { base: String },
    /// OpenAI-compatible cloud API with a bearer key.
    Cloud { base: String, key: String },
}

impl Backend {
    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Local { .. } => "local",
            Backend::Cloud { .. } => "cloud",
        }
    }
}

/// Choose a backend, or `None` when nothing usable is configured.
///
/// Local always wins when set; cloud needs both a base URL and a key.
pub fn resolve(config: &EndpointConfig) -> Option<Backend> {
    if let Some(base) = non_blank(&config.local_base) {
        return Some(Backend::Local {
            base: base.to_string(),
        });
    }

    match (non_blank(&config.cloud_base), non_blank(&config.cloud_key)) {
        (Some(base), Some(key)) => Some(Backend::Cloud {
            base: base.to_string(),
            key: key.to_string(),
        }),
        _ => None,
    }
}

/// Trimmed value, or `None` when blank. Fields are public, so a snapshot
/// built by hand may not have gone through `EndpointConfig::new`.
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Join a base URL and a relative path with exactly one `/` between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

// ─── Tests ───────────────────────────────────────────────────────────────────
