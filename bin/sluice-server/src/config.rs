//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use sluice_core::MediationSettings;
use sluice_core::shaper::{DEFAULT_PREFILL, ShapeConfig};

/// Runtime configuration for sluice-server.
///
/// Every field has a default so the server starts without any environment
/// variables set; it just refuses to forward completions until
/// `SLUICE_API_KEY` is provided.
#[derive(Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:5000"`).
    pub bind_address: String,

    /// Base URL of the OpenAI-compatible provider.
    pub api_endpoint: String,

    /// Server-held provider key. Never logged.
    pub api_key: Option<String>,

    /// Model used when the caller does not name one.
    pub model: String,

    pub prefill_enabled: bool,
    pub prefill_text: String,

    /// Trim non-streaming answers to their last complete sentence.
    pub auto_trim: bool,

    /// Token allow-list file, re-read on every authenticated request.
    pub allow_list_path: PathBuf,

    /// Transport connect timeout for upstream calls.
    pub connect_timeout: Duration,

    /// Comma-separated CORS origins; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Serve the OpenAPI document at `/api-docs/openapi.json`.
    pub enable_openapi: bool,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("api_endpoint", &self.api_endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("prefill_enabled", &self.prefill_enabled)
            .field("auto_trim", &self.auto_trim)
            .field("allow_list_path", &self.allow_list_path)
            .field("connect_timeout", &self.connect_timeout)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("enable_openapi", &self.enable_openapi)
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .finish()
    }
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            bind_address: env_or(&lookup, "SLUICE_BIND", "0.0.0.0:5000"),
            api_endpoint: env_or(&lookup, "SLUICE_API_ENDPOINT", "https://openrouter.ai/api/v1"),
            api_key: env_opt(&lookup, "SLUICE_API_KEY"),
            model: env_or(&lookup, "SLUICE_MODEL", "gpt-3.5-turbo"),
            prefill_enabled: env_flag(&lookup, "SLUICE_PREFILL_ENABLED", false),
            prefill_text: env_or(&lookup, "SLUICE_PREFILL_TEXT", DEFAULT_PREFILL),
            auto_trim: env_flag(&lookup, "SLUICE_AUTO_TRIM", true),
            allow_list_path: PathBuf::from(env_or(
                &lookup,
                "SLUICE_ALLOWLIST",
                "whitelist_token.txt",
            )),
            connect_timeout: Duration::from_secs(parse_env(
                &lookup,
                "SLUICE_CONNECT_TIMEOUT_SECS",
                10,
            )),
            cors_allowed_origins: env_opt(&lookup, "SLUICE_CORS_ORIGINS"),
            enable_openapi: env_flag(&lookup, "SLUICE_ENABLE_OPENAPI", true),
            log_level: env_or(&lookup, "SLUICE_LOG", "info"),
            log_json: env_flag(&lookup, "SLUICE_LOG_JSON", false),
        }
    }

    /// The subset of configuration consumed by the mediation pipeline.
    pub fn mediation_settings(&self) -> MediationSettings {
        MediationSettings {
            shape: ShapeConfig {
                model: self.model.clone(),
                prefill_enabled: self.prefill_enabled,
                prefill_text: self.prefill_text.clone(),
            },
            auto_trim: self.auto_trim,
            has_upstream_key: self.api_key.is_some(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_owned())
}

/// Unset and blank values both read as `None`.
fn env_opt(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn env_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key).map(|v| parse_flag(&v)).unwrap_or(default)
}

fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
