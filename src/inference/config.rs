//! Endpoint configuration loading and normalization.
//!
//! Reads `chatbridge.yaml` (if present) and resolves environment variables.
//! Falls back to `CHATBRIDGE_*` environment variables when no file exists.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::errors::ChatError;

/// File name searched for by [`find_config_path`].
pub const CONFIG_FILE_NAME: &str = "chatbridge.yaml";

/// Model used when the caller does not name one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Backend endpoints the client may talk to.
///
/// Every field is trimmed; an empty value after trimming is stored as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointConfig {
    pub cloud_base: Option<String>,
    pub cloud_key: Option<String>,
    pub local_base: Option<String>,
}

impl EndpointConfig {
    pub fn new(
        cloud_base: Option<&str>,
        cloud_key: Option<&str>,
        local_base: Option<&str>,
    ) -> Self {
        Self {
            cloud_base: normalize_field(cloud_base),
            cloud_key: normalize_field(cloud_key),
            local_base: normalize_field(local_base),
        }
    }

    /// Whether nothing at all is configured.
    pub fn is_empty(&self) -> bool {
        self.cloud_base.is_none() && self.cloud_key.is_none() && self.local_base.is_none()
    }
}

/// Trim a raw setting, treating blank as absent.
fn normalize_field(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// On-disk settings (mirrors `chatbridge.yaml`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub cloud_base: Option<String>,
    #[serde(default)]
    pub cloud_key: Option<String>,
    #[serde(default)]
    pub local_base: Option<String>,
    #[serde(default = "default_model")]
    pub default_model: String,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Settings {
    /// The normalized endpoint snapshot described by these settings.
    pub fn endpoints(&self) -> EndpointConfig {
        EndpointConfig::new(
            self.cloud_base.as_deref(),
            self.cloud_key.as_deref(),
            self.local_base.as_deref(),
        )
    }

    /// Build settings from the `CHATBRIDGE_*_BASE` / `_KEY` environment
    /// variables. The model stays at [`DEFAULT_MODEL`].
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        Self {
            cloud_base: var("CHATBRIDGE_CLOUD_BASE"),
            cloud_key: var("CHATBRIDGE_CLOUD_KEY"),
            local_base: var("CHATBRIDGE_LOCAL_BASE"),
            default_model: default_model(),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the settings file.
///
/// An `explicit` path (from `--config` / `CHATBRIDGE_CONFIG`) must exist.
/// Otherwise walks upward from `start` looking for `chatbridge.yaml`, then
/// tries `<config dir>/chatbridge/chatbridge.yaml`.
pub fn find_config_path(explicit: Option<&Path>, start: &Path) -> Result<PathBuf, ChatError> {
    if let Some(path) = explicit {
        let candidate = PathBuf::from(expand_home(&path.to_string_lossy()));
        if candidate.is_file() {
            return Ok(candidate);
        }
        return Err(ChatError::ConfigError {
            reason: format!("config file {} does not exist", candidate.display()),
        });
    }

    if let Some(found) = start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
    {
        return Ok(found);
    }

    dirs::config_dir()
        .map(|dir| dir.join("chatbridge").join(CONFIG_FILE_NAME))
        .filter(|candidate| candidate.is_file())
        .ok_or_else(|| ChatError::ConfigError {
            reason: format!("could not find {CONFIG_FILE_NAME}"),
        })
}

/// Load and parse a settings file.
///
/// `${VAR}` and `${VAR:-default}` references are substituted before parsing,
/// so keys can stay out of the file.
pub fn load_settings(path: &Path) -> Result<Settings, ChatError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ChatError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    serde_yaml::from_str(&interpolate_env_vars(&raw)).map_err(|e| ChatError::ConfigError {
        reason: format!("failed to parse {}: {e}", path.display()),
    })
}

/// Load settings from the discovered file, or from the environment if none.
///
/// A missing `explicit` file is an error; a missing discovered file is not.
/// Returns the path that was used alongside the settings, for logging.
pub fn load_or_env(
    explicit: Option<&Path>,
    start: &Path,
) -> Result<(Settings, Option<PathBuf>), ChatError> {
    match find_config_path(explicit, start) {
        Ok(path) => {
            let settings = load_settings(&path)?;
            Ok((settings, Some(path)))
        }
        Err(e) if explicit.is_some() => Err(e),
        Err(_) => Ok((Settings::from_env(), None)),
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Substitute every `${...}` reference in `input`.
///
/// An unterminated `${` is copied through unchanged.
fn interpolate_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let body = &rest[open + 2..];
        match body.find('}') {
            Some(close) => {
                out.push_str(&lookup_var(&body[..close]));
                rest = &body[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// Value of `NAME` or `NAME:-fallback`. Unset and empty both take the fallback.
fn lookup_var(expr: &str) -> String {
    let (name, fallback) = match expr.split_once(":-") {
        Some((name, fallback)) => (name, Some(fallback)),
        None => (expr, None),
    };

    match std::env::var(name.trim()) {
        Ok(value) if !value.is_empty() => value,
        _ => fallback.map(expand_home).unwrap_or_default(),
    }
}

/// Expand `~` or a leading `~/` to the home directory. `~user` is left alone.
fn expand_home(path: &str) -> String {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return path.to_string(),
    };
    match dirs::home_dir() {
        Some(home) => format!("{}{rest}", home.display()),
        None => path.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
