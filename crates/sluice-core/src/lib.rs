//! sluice-core – the request mediation pipeline.
//!
//! An inbound chat-completion payload flows through:
//!
//! 1. [`auth`] – bearer token checked against an allow-list that is re-read
//!    on every call (authenticated entry point only).
//! 2. [`gate`] – a process-wide single-flight lock held for the whole upstream
//!    exchange, including stream drain.
//! 3. [`shaper`] – defaults, prefill injection and the diagnostic short-circuit.
//! 4. [`upstream`] – the provider client, consumed through a trait.
//! 5. [`reframe`] (streaming) or [`trim`] (non-streaming) post-processing.
//!
//! [`mediator::Mediator`] composes these stages; HTTP concerns live in the
//! server binary.

pub mod auth;
pub mod error;
pub mod gate;
pub mod mediator;
pub mod reframe;
pub mod shaper;
pub mod trim;
pub mod types;
pub mod upstream;

pub use error::{AuthDenied, ConfigError, MediationError, UpstreamError, ValidationError};
pub use mediator::{Mediated, MediationSettings, Mediator};
pub use types::{
    ChatMessage, Choice, CompletionRequest, CompletionResult, FinishReason, Role, StreamChunk,
    Usage,
};
