//! Error taxonomy for the mediation pipeline.
//!
//! Each stage returns its own error kind; [`MediationError`] unifies them so
//! the server can perform the single translation to an HTTP status.

use thiserror::Error;

/// The Auth Gate refused the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthDenied {
    /// No bearer token was supplied.
    #[error("no API key provided")]
    Missing,

    /// The token is not in the allow-list.
    #[error("API key is not allow-listed")]
    Invalid,

    /// The allow-list source could not be read.
    #[error("allow-list unavailable: {reason}")]
    Misconfigured { reason: String },
}

/// Server-side configuration prevents contacting the upstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no upstream API key configured")]
    MissingKey,
}

/// The inbound payload could not be shaped into a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("`messages` must not be empty")]
    EmptyMessages,
}

/// Failure reported by the upstream client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Rate limit or exhausted credit.
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// The provider rejected the server-held key.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Other(String),
}

impl UpstreamError {
    /// Classify a provider failure from its HTTP status (when there is one)
    /// and its message text.
    ///
    /// Quota wins over unauthorized when both match.
    pub fn classify(status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if status == Some(429) || lower.contains("429") || lower.contains("quota") {
            UpstreamError::Quota(message)
        } else if status == Some(401) || lower.contains("401") || lower.contains("unauthorized") {
            UpstreamError::Unauthorized(message)
        } else {
            UpstreamError::Other(message)
        }
    }
}

/// Any failure of a mediated request, before or after the upstream call.
#[derive(Debug, Error)]
pub enum MediationError {
    #[error(transparent)]
    Auth(#[from] AuthDenied),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

// ── Tests ──────────────────────────────────────────────────────────────────────
