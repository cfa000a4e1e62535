//! Mediation orchestrator.
//!
//! Sequence for one inbound completion:
//!
//! ```text
//! [auth gate] → completion gate → diagnostic probe? → shape → key check
//!             → upstream submit → reframe (stream) | auto-trim (complete)
//! ```
//!
//! The completion gate is taken before anything else that touches the
//! payload and is held until the response is fully produced; for streams
//! that means until the last event has been generated or the caller goes
//! away. Exactly one upstream call is made per request and nothing is
//! retried.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::auth::{self, AllowListSource};
use crate::error::{AuthDenied, ConfigError, MediationError, UpstreamError};
use crate::gate::{CompletionGate, GatePermit};
use crate::reframe::{EventStream, reframe};
use crate::shaper::{self, ShapeConfig};
use crate::trim::auto_trim;
use crate::types::CompletionResult;
use crate::upstream::{Submission, UpstreamClient};

/// Server-held knobs consumed by the pipeline.
#[derive(Debug, Clone)]
pub struct MediationSettings {
    pub shape: ShapeConfig,
    /// Trim non-streaming results to their last complete sentence.
    pub auto_trim: bool,
    /// Whether an upstream key is configured; without one, nothing is sent.
    pub has_upstream_key: bool,
}

impl Default for MediationSettings {
    fn default() -> Self {
        Self {
            shape: ShapeConfig::default(),
            auto_trim: true,
            has_upstream_key: false,
        }
    }
}

/// Result of a mediated completion.
pub enum Mediated {
    Completion(CompletionResult),
    /// Live event channel; holds the completion gate until dropped.
    Stream(EventStream),
}

impl std::fmt::Debug for Mediated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mediated::Completion(r) => f.debug_tuple("Completion").field(r).finish(),
            Mediated::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Composes the pipeline stages. Cheap to clone; clones share the gate.
#[derive(Clone)]
pub struct Mediator {
    gate: CompletionGate,
    upstream: Arc<dyn UpstreamClient>,
    allow_list: Arc<dyn AllowListSource>,
    settings: Arc<MediationSettings>,
}

impl std::fmt::Debug for Mediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mediator")
            .field("settings", &self.settings)
            .field("busy", &self.gate.is_busy())
            .finish()
    }
}

impl Mediator {
    pub fn new(
        settings: MediationSettings,
        upstream: Arc<dyn UpstreamClient>,
        allow_list: Arc<dyn AllowListSource>,
    ) -> Self {
        Self {
            gate: CompletionGate::new(),
            upstream,
            allow_list,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &MediationSettings {
        &self.settings
    }

    pub fn gate(&self) -> &CompletionGate {
        &self.gate
    }

    /// Auth Gate for the token-authenticated entry point. Takes the raw
    /// `Authorization` header value; the caller then proceeds to
    /// [`Self::complete`].
    pub async fn authorize(&self, authorization: Option<&str>) -> Result<(), AuthDenied> {
        auth::authorize(authorization, self.allow_list.as_ref()).await
    }

    /// Mediate one completion. Entry points that need the Auth Gate call
    /// [`Self::authorize`] first.
    pub async fn complete(&self, payload: Value) -> Result<Mediated, MediationError> {
        self.gate
            .with_exclusive_access(|permit| self.complete_exclusive(permit, payload))
            .await
    }

    async fn complete_exclusive(
        &self,
        permit: GatePermit,
        payload: Value,
    ) -> Result<Mediated, MediationError> {
        let settings = &self.settings;

        if shaper::is_diagnostic_probe(&payload) {
            info!("diagnostic probe answered locally");
            return Ok(Mediated::Completion(shaper::diagnostic_completion(
                &settings.shape.model,
            )));
        }

        let request = shaper::shape(&payload, &settings.shape)?;

        if !settings.has_upstream_key {
            return Err(ConfigError::MissingKey.into());
        }

        info!(
            model = %request.model,
            messages = request.messages.len(),
            stream = request.stream,
            "submitting completion upstream"
        );

        if request.stream {
            let opened = match self.upstream.submit(request).await {
                Ok(Submission::Streaming(chunks)) => Ok(chunks),
                Ok(Submission::Completed(_)) => Err(UpstreamError::Other(
                    "upstream answered a streaming request with a complete result".into(),
                )),
                Err(e) => Err(e),
            };
            return Ok(Mediated::Stream(reframe(opened, permit)));
        }

        let mut result = match self.upstream.submit(request).await {
            Ok(Submission::Completed(result)) => result,
            Ok(Submission::Streaming(_)) => {
                return Err(UpstreamError::Other(
                    "upstream streamed a non-streaming request".into(),
                )
                .into());
            }
            Err(e) => {
                warn!(error = %e, "upstream completion failed");
                return Err(e.into());
            }
        };

        if settings.auto_trim {
            if let Some(content) = result.primary_content_mut() {
                *content = auto_trim(content);
            }
        }

        info!(id = %result.id, choices = result.choices.len(), "completion done");
        Ok(Mediated::Completion(result))
    }

    /// Pass the provider's model listing through. Not gated.
    pub async fn list_models(&self) -> Result<Value, MediationError> {
        if !self.settings.has_upstream_key {
            return Err(ConfigError::MissingKey.into());
        }
        info!("fetching models from upstream");
        self.upstream.list_models().await.map_err(|e| {
            warn!(error = %e, "model listing failed");
            e.into()
        })
    }
}
