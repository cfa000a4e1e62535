//! Re-framing of provider chunks into the normalised event stream.
//!
//! Each upstream chunk carrying content becomes one `chat.completion.chunk`
//! event. The stream always ends with [`WireEvent::Done`]: after the first
//! chunk with a finish reason, after an in-band error, or when the provider
//! runs dry. Failures never surface out-of-band because response headers
//! have already been sent by the time chunks flow.

use std::pin::Pin;

use futures::{Stream, StreamExt, stream};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::UpstreamError;
use crate::gate::GatePermit;
use crate::types::StreamChunk;
use crate::upstream::ChunkStream;

/// Payload of the terminal sentinel event.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Error text sent in-band when the provider reports exhausted quota.
pub const QUOTA_MESSAGE: &str = "out of quota";

/// Normalised events produced for the caller.
pub type EventStream = Pin<Box<dyn Stream<Item = WireEvent> + Send>>;

/// One event on the caller-facing stream.
#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    /// A `chat.completion.chunk` object.
    Delta(Value),
    /// In-band failure; always followed by [`WireEvent::Done`].
    Error(String),
    /// End of stream.
    Done,
}

impl WireEvent {
    fn delta(chunk: StreamChunk) -> Self {
        WireEvent::Delta(json!({
            "id": chunk.id,
            "object": "chat.completion.chunk",
            "created": chunk.created,
            "model": chunk.model,
            "choices": [{
                "index": 0,
                "delta": { "content": chunk.delta_content },
                "finish_reason": chunk.finish_reason,
            }],
        }))
    }

    fn failure(error: &UpstreamError) -> Self {
        match error {
            UpstreamError::Quota(_) => WireEvent::Error(QUOTA_MESSAGE.to_owned()),
            UpstreamError::Unauthorized(message) | UpstreamError::Other(message) => {
                WireEvent::Error(format!("request failed: {message}"))
            }
        }
    }

    /// Body of the `data:` field.
    pub fn data(&self) -> String {
        match self {
            WireEvent::Delta(v) => v.to_string(),
            WireEvent::Error(message) => json!({ "error": message }).to_string(),
            WireEvent::Done => DONE_SENTINEL.to_owned(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, WireEvent::Done)
    }
}

enum Phase {
    Relaying {
        chunks: ChunkStream,
        permit: GatePermit,
        relayed: usize,
    },
    /// The upstream failed before producing anything.
    Failed { event: WireEvent, permit: GatePermit },
    /// Only the sentinel is left to send; the upstream has been abandoned.
    Closing { permit: GatePermit },
    Finished,
}

/// Turn an opened (or failed-to-open) upstream stream into caller events.
///
/// `permit` lives inside the returned stream and is released once the
/// sentinel has been produced or the stream is dropped, whichever is first.
pub fn reframe(opened: Result<ChunkStream, UpstreamError>, permit: GatePermit) -> EventStream {
    let initial = match opened {
        Ok(chunks) => Phase::Relaying {
            chunks,
            permit,
            relayed: 0,
        },
        Err(e) => {
            warn!(error = %e, "upstream stream could not be opened");
            Phase::Failed {
                event: WireEvent::failure(&e),
                permit,
            }
        }
    };

    stream::unfold(initial, |phase| async move {
        match phase {
            Phase::Relaying {
                mut chunks,
                permit,
                mut relayed,
            } => loop {
                match chunks.next().await {
                    Some(Ok(chunk)) => {
                        let finished = chunk.finish_reason.is_some();
                        if chunk.delta_content.is_some() {
                            relayed += 1;
                            let next = if finished {
                                info!(relayed, "upstream stream finished");
                                Phase::Closing { permit }
                            } else {
                                Phase::Relaying {
                                    chunks,
                                    permit,
                                    relayed,
                                }
                            };
                            return Some((WireEvent::delta(chunk), next));
                        }
                        if finished {
                            info!(relayed, "upstream stream finished");
                            return Some((WireEvent::Done, Phase::Finished));
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, relayed, "upstream stream failed");
                        return Some((WireEvent::failure(&e), Phase::Closing { permit }));
                    }
                    None => {
                        info!(relayed, "upstream stream ended without a finish reason");
                        return Some((WireEvent::Done, Phase::Finished));
                    }
                }
            },
            Phase::Failed { event, permit } => Some((event, Phase::Closing { permit })),
            Phase::Closing { permit } => {
                drop(permit);
                Some((WireEvent::Done, Phase::Finished))
            }
            Phase::Finished => None,
        }
    })
    .boxed()
}

// ── Tests ──────────────────────────────────────────────────────────────────────
