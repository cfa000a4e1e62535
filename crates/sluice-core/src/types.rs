//! Chat-completion data model shared by the pipeline stages.
//!
//! The wire shapes follow the OpenAI chat-completions API so that existing
//! SDK clients work against the proxy unchanged. Fields the pipeline does
//! not inspect are carried in `extra` maps and passed through verbatim.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    /// A JSON `null` content (e.g. tool-call replies) is read as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            extra: Map::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Inbound completion payload after structural validation.
///
/// Only `messages` is mandatory; every sampling parameter falls back to a
/// default during shaping.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub stream: Option<bool>,
}

/// Outbound request handed to the upstream client. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub stream: bool,
}

/// Why generation stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    FunctionCall,
    /// Provider-specific reason, kept verbatim.
    #[serde(untagged)]
    Other(String),
}

/// Token accounting reported by the provider.
///
/// Counters a provider leaves out read as zero; provider extensions such as
/// `cost` or `completion_tokens_details` are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One generated alternative in a [`CompletionResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Non-streaming completion returned by the upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    #[serde(default)]
    pub id: String,
    #[serde(default = "completion_object")]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn completion_object() -> String {
    "chat.completion".to_owned()
}

impl CompletionResult {
    /// Content of the first choice, which is what auto-trim rewrites.
    pub fn primary_content_mut(&mut self) -> Option<&mut String> {
        self.choices.first_mut().map(|c| &mut c.message.content)
    }
}

/// One incremental unit of a streamed completion, flattened from the
/// provider's chunk envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    pub id: String,
    pub model: String,
    pub created: i64,
    pub delta_content: Option<String>,
    pub finish_reason: Option<FinishReason>,
}

// ── Tests ──────────────────────────────────────────────────────────────────────
