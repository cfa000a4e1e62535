//! `reqwest` client for OpenAI-compatible providers.
//!
//! `POST {endpoint}/chat/completions` and `GET {endpoint}/models`, with the
//! server-held key sent as a bearer token. Streaming answers are read as
//! server-sent events, one `data:` line per chunk, until `data: [DONE]`.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, future};
use serde::Deserialize;
use serde_json::Value;
use sluice_core::reframe::DONE_SENTINEL;
use sluice_core::upstream::{ChunkStream, Submission, UpstreamClient};
use sluice_core::{CompletionRequest, CompletionResult, FinishReason, StreamChunk, UpstreamError};
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;
use tokio_util::io::StreamReader;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAiCompatClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        connect_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        let endpoint = endpoint.into().trim_end_matches('/').to_owned();
        Ok(Self {
            http,
            endpoint,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, format!("{}{path}", self.endpoint));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl UpstreamClient for OpenAiCompatClient {
    async fn submit(&self, request: CompletionRequest) -> Result<Submission, UpstreamError> {
        let streaming = request.stream;
        let response = self
            .request(reqwest::Method::POST, "/chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let response = ensure_success(response).await?;

        if streaming {
            debug!("upstream accepted streaming request");
            return Ok(Submission::Streaming(sse_chunks(response)));
        }

        let body: Value = response.json().await.map_err(transport_error)?;
        if let Some(e) = in_band_error(&body) {
            return Err(e);
        }
        let result: CompletionResult = serde_json::from_value(body)
            .map_err(|e| UpstreamError::Other(format!("undecodable completion: {e}")))?;
        Ok(Submission::Completed(result))
    }

    async fn list_models(&self) -> Result<Value, UpstreamError> {
        let response = self
            .request(reqwest::Method::GET, "/models")
            .send()
            .await
            .map_err(transport_error)?;
        let response = ensure_success(response).await?;
        response.json().await.map_err(transport_error)
    }
}

fn transport_error(e: reqwest::Error) -> UpstreamError {
    UpstreamError::classify(e.status().map(|s| s.as_u16()), e.to_string())
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| error_message(&v))
        .unwrap_or_else(|| format!("{status}: {body}"));
    Err(UpstreamError::classify(Some(status.as_u16()), message))
}

/// A 2xx body that is nevertheless an error object.
fn in_band_error(body: &Value) -> Option<UpstreamError> {
    let error = body.get("error")?;
    let code = error
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|c| u16::try_from(c).ok());
    let message = error_message(body).unwrap_or_else(|| error.to_string());
    Some(UpstreamError::classify(code, message))
}

/// `{"error": "..."}` or `{"error": {"message": "..."}}`.
fn error_message(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    error
        .as_str()
        .or_else(|| error.get("message").and_then(Value::as_str))
        .map(str::to_owned)
}

// ── Server-sent events ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChunkEnvelope {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<FinishReason>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug)]
enum SseLine {
    Chunk(Result<StreamChunk, UpstreamError>),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data.is_empty() {
        return SseLine::Skip;
    }
    if data == DONE_SENTINEL {
        return SseLine::Done;
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            return SseLine::Chunk(Err(UpstreamError::Other(format!(
                "undecodable stream chunk: {e}"
            ))));
        }
    };
    if let Some(e) = in_band_error(&value) {
        return SseLine::Chunk(Err(e));
    }

    let chunk = serde_json::from_value::<ChunkEnvelope>(value)
        .map(|envelope| {
            let first = envelope.choices.into_iter().next();
            let (delta_content, finish_reason) = match first {
                Some(choice) => (choice.delta.content, choice.finish_reason),
                None => (None, None),
            };
            StreamChunk {
                id: envelope.id,
                model: envelope.model,
                created: envelope.created,
                delta_content,
                finish_reason,
            }
        })
        .map_err(|e| UpstreamError::Other(format!("undecodable stream chunk: {e}")));
    SseLine::Chunk(chunk)
}

fn sse_chunks(response: reqwest::Response) -> ChunkStream {
    let bytes = response.bytes_stream().map(|r| r.map_err(std::io::Error::other));
    LinesStream::new(StreamReader::new(bytes).lines())
        .map(|line| match line {
            Ok(line) => parse_sse_line(&line),
            Err(e) => SseLine::Chunk(Err(UpstreamError::classify(None, e.to_string()))),
        })
        .take_while(|line| future::ready(!matches!(line, SseLine::Done)))
        .filter_map(|line| {
            future::ready(match line {
                SseLine::Chunk(chunk) => Some(chunk),
                SseLine::Done | SseLine::Skip => None,
            })
        })
        .boxed()
}

// ── Tests ──────────────────────────────────────────────────────────────────────
