//! Bearer-token admission against an allow-list.
//!
//! The allow-list is loaded from its source on every call, never cached, so
//! removing a token from the file revokes it for the very next request.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::AuthDenied;

/// The set of bearer tokens admitted to the authenticated entry point.
///
/// Entries may be bare tokens or full header values (`Bearer <token>`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    tokens: HashSet<String>,
}

impl AllowList {
    /// Parse the line-oriented format: one token per line, surrounding
    /// whitespace ignored, blank lines skipped.
    pub fn parse(text: &str) -> Self {
        let tokens = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();
        Self { tokens }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// A caller is admitted when either its full header value or the bare
    /// token is listed.
    fn admits(&self, header: &str, token: &str) -> bool {
        self.contains(token) || self.contains(header)
    }
}

impl<S: Into<String>> FromIterator<S> for AllowList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Where the allow-list comes from. Read on every authorisation.
#[async_trait::async_trait]
pub trait AllowListSource: Send + Sync {
    async fn load(&self) -> std::io::Result<AllowList>;
}

/// Allow-list stored as a text file.
#[derive(Debug, Clone)]
pub struct FileAllowList {
    path: PathBuf,
}

impl FileAllowList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl AllowListSource for FileAllowList {
    async fn load(&self) -> std::io::Result<AllowList> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        Ok(AllowList::parse(&text))
    }
}

/// Extract the caller's token from an `Authorization` header value.
///
/// A `Bearer` scheme (any case) is removed when present; the bare value is
/// accepted too. Empty or whitespace-only values count as absent.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let token = match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ if value.eq_ignore_ascii_case("bearer") => "",
        _ => value,
    };
    (!token.is_empty()).then_some(token)
}

/// Admit the caller presenting `authorization` (the raw header value) if
/// the freshly loaded allow-list lists it.
pub async fn authorize(
    authorization: Option<&str>,
    source: &dyn AllowListSource,
) -> Result<(), AuthDenied> {
    let token = bearer_token(authorization).ok_or(AuthDenied::Missing)?;
    let header = authorization.map(str::trim).unwrap_or(token);

    let allowed = source.load().await.map_err(|e| {
        warn!(error = %e, "allow-list could not be loaded");
        AuthDenied::Misconfigured {
            reason: e.to_string(),
        }
    })?;

    if allowed.admits(header, token) {
        debug!(allow_list_size = allowed.len(), "caller admitted");
        Ok(())
    } else {
        debug!("caller token not in allow-list");
        Err(AuthDenied::Invalid)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
