//! Upstream provider capability consumed by the pipeline.
//!
//! The core never talks to a provider SDK directly; the server injects an
//! implementation of [`UpstreamClient`] (an HTTP client in production, a
//! scripted fake in tests).

use std::pin::Pin;

use futures::Stream;
use serde_json::Value;

use crate::error::UpstreamError;
use crate::types::{CompletionRequest, CompletionResult, StreamChunk};

/// Lazy, finite, non-restartable sequence of chunks from the provider.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, UpstreamError>> + Send>>;

/// Outcome of a successful submission.
pub enum Submission {
    /// `stream == false`: the full result.
    Completed(CompletionResult),
    /// `stream == true`: chunks arrive as the provider produces them.
    Streaming(ChunkStream),
}

impl std::fmt::Debug for Submission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Submission::Completed(r) => f.debug_tuple("Completed").field(&r.id).finish(),
            Submission::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

/// Abstraction over the client that forwards completions to the provider.
///
/// Implementations must be `Send + Sync` so one instance can be shared
/// across request handlers via `Arc`. Failures are reported with
/// [`UpstreamError`] so callers can tell quota and credential problems apart.
#[async_trait::async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Submit one completion request. The variant of the returned
    /// [`Submission`] follows `request.stream`.
    async fn submit(&self, request: CompletionRequest) -> Result<Submission, UpstreamError>;

    /// The provider's model listing, passed through as-is.
    async fn list_models(&self) -> Result<Value, UpstreamError>;
}
