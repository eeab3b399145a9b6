// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime settings loading, environment overrides, and validation for the
//! kdeps workflow runtime.
//!
//! This crate provides [`RuntimeSettings`] — the top-level knobs every other
//! crate draws from — together with helpers to load it from an optional TOML
//! file and apply environment-variable overrides on top.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while loading or validating [`RuntimeSettings`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },
    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },
    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

impl From<ConfigError> for kdeps_error::Error {
    fn from(e: ConfigError) -> Self {
        let code = match &e {
            ConfigError::FileNotFound { .. } => kdeps_error::ErrorCode::ConfigFileNotFound,
            ConfigError::ParseError { .. } => kdeps_error::ErrorCode::ConfigParseFailed,
            ConfigError::ValidationError { .. } => kdeps_error::ErrorCode::ConfigValidationFailed,
        };
        kdeps_error::Error::new(code, e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Top-level runtime configuration for the kdeps workflow runtime.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Root directory holding `agents/<name>/<version>/workflow.pkl` trees
    /// and `.kdeps` bundle files.
    #[serde(default = "default_kdeps_dir")]
    pub kdeps_dir: String,

    /// Project-local directory holding `resources/` and `agents/` trees.
    #[serde(default = "default_project_dir")]
    pub project_dir: String,

    /// Default LLM backend name when a workflow's `chatConfig.backend` is
    /// unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_backend: Option<String>,

    /// Default outbound HTTP timeout, in seconds, for provider requests.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Time-to-live for a request-scoped [`Session`](#session) map, in
    /// seconds. `None` means sessions never expire on their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_ttl_secs: Option<u64>,

    /// Log level (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Request-body/query parameter names exposed to the execution context.
    #[serde(default)]
    pub allowed_params: Vec<String>,

    /// Header names exposed to the execution context.
    #[serde(default)]
    pub allowed_headers: Vec<String>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            kdeps_dir: default_kdeps_dir(),
            project_dir: default_project_dir(),
            default_backend: None,
            default_timeout_secs: default_timeout_secs(),
            session_ttl_secs: None,
            log_level: default_log_level(),
            allowed_params: Vec::new(),
            allowed_headers: Vec::new(),
        }
    }
}

fn default_kdeps_dir() -> String {
    ".kdeps".to_string()
}

fn default_project_dir() -> String {
    ".".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Maximum allowed timeout in seconds (24 hours).
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Threshold above which a timeout is considered unusually large.
pub const LARGE_TIMEOUT_THRESHOLD_SECS: u64 = 3_600;

/// Recognised log levels.
pub const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Environment variables recognized as LLM provider API-key fallbacks.
pub const PROVIDER_API_KEY_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "GOOGLE_API_KEY",
    "COHERE_API_KEY",
    "MISTRAL_API_KEY",
    "TOGETHER_API_KEY",
    "PERPLEXITY_API_KEY",
    "GROQ_API_KEY",
    "DEEPSEEK_API_KEY",
];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load [`RuntimeSettings`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`RuntimeSettings::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_settings(path: Option<&Path>) -> Result<RuntimeSettings, ConfigError> {
    let mut settings = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => RuntimeSettings::default(),
    };
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Parse a TOML string into [`RuntimeSettings`].
pub fn parse_toml(content: &str) -> Result<RuntimeSettings, ConfigError> {
    toml::from_str::<RuntimeSettings>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

/// Apply environment variable overrides.
///
/// Recognised variables: `KDEPS_DIR`, `KDEPS_CURRENT_AGENT` and
/// `KDEPS_CURRENT_VERSION` (read by `kdeps-identity`, not stored here),
/// `KDEPS_LOG_LEVEL`, `KDEPS_DEFAULT_BACKEND`, `KDEPS_DEFAULT_TIMEOUT_SECS`.
pub fn apply_env_overrides(settings: &mut RuntimeSettings) {
    if let Ok(val) = std::env::var("KDEPS_DIR") {
        settings.kdeps_dir = val;
    }
    if let Ok(val) = std::env::var("KDEPS_LOG_LEVEL") {
        settings.log_level = val;
    }
    if let Ok(val) = std::env::var("KDEPS_DEFAULT_BACKEND") {
        settings.default_backend = Some(val);
    }
    if let Ok(val) = std::env::var("KDEPS_DEFAULT_TIMEOUT_SECS") {
        if let Ok(secs) = val.parse::<u64>() {
            settings.default_timeout_secs = secs;
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// `default_timeout_secs` is unusually large.
    LargeTimeout {
        /// The configured timeout, in seconds.
        secs: u64,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::LargeTimeout { secs } => {
                write!(f, "default_timeout_secs is unusually large ({secs}s)")
            }
        }
    }
}

/// Validate parsed settings, returning advisory warnings.
///
/// Hard errors (invalid log level, out-of-range timeout) come back as
/// [`ConfigError::ValidationError`]; soft issues come back as warnings.
pub fn validate_settings(settings: &RuntimeSettings) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if !VALID_LOG_LEVELS.contains(&settings.log_level.as_str()) {
        errors.push(format!("invalid log_level '{}'", settings.log_level));
    }

    if settings.default_timeout_secs == 0 || settings.default_timeout_secs > MAX_TIMEOUT_SECS {
        errors.push(format!(
            "default_timeout_secs {} out of range (1-{MAX_TIMEOUT_SECS})",
            settings.default_timeout_secs
        ));
    } else if settings.default_timeout_secs > LARGE_TIMEOUT_THRESHOLD_SECS {
        warnings.push(ConfigWarning::LargeTimeout {
            secs: settings.default_timeout_secs,
        });
    }

    if !errors.is_empty() {
        return Err(ConfigError::ValidationError { reasons: errors });
    }
    Ok(warnings)
}
