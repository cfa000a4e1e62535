use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{StreamExt, stream};
use serde_json::{Value, json};
use tracing_test::traced_test;

use super::{Mediated, MediationSettings, Mediator};
use crate::auth::{AllowList, AllowListSource};
use crate::error::{AuthDenied, ConfigError, MediationError, UpstreamError, ValidationError};
use crate::reframe::{QUOTA_MESSAGE, WireEvent};
use crate::shaper::{DIAGNOSTIC_PROMPT, ShapeConfig};
use crate::types::{
    ChatMessage, Choice, CompletionRequest, CompletionResult, FinishReason, Role, StreamChunk,
};
use crate::upstream::{Submission, UpstreamClient};

// ── Fakes ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
enum Reply {
    Complete(String),
    Chunks(Vec<Result<StreamChunk, UpstreamError>>),
    Fail(UpstreamError),
}

/// Decrements the in-flight counter when the upstream exchange is over.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FakeUpstream {
    reply: Reply,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    peak: AtomicUsize,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl FakeUpstream {
    fn new(reply: Reply) -> Arc<Self> {
        Self::with_delay(reply, Duration::ZERO)
    }

    fn with_delay(reply: Reply, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply,
            delay,
            calls: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> CompletionRequest {
        self.last_request
            .lock()
            .unwrap()
            .clone()
            .expect("upstream was never called")
    }
}

#[async_trait::async_trait]
impl UpstreamClient for FakeUpstream {
    async fn submit(&self, request: CompletionRequest) -> Result<Submission, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(Arc::clone(&self.in_flight));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        *self.last_request.lock().unwrap() = Some(request.clone());

        match self.reply.clone() {
            Reply::Complete(content) => Ok(Submission::Completed(result_with(&content))),
            Reply::Chunks(items) => {
                let delay = self.delay;
                let chunks = stream::iter(items)
                    .then(move |item| async move {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        item
                    })
                    .map(move |item| {
                        let _held = &guard;
                        item
                    })
                    .boxed();
                Ok(Submission::Streaming(chunks))
            }
            Reply::Fail(e) => Err(e),
        }
    }

    async fn list_models(&self) -> Result<Value, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Reply::Fail(e) => Err(e.clone()),
            _ => Ok(json!({ "object": "list", "data": [{ "id": "m-1" }] })),
        }
    }
}

struct StaticAllowList(AllowList);

#[async_trait::async_trait]
impl AllowListSource for StaticAllowList {
    async fn load(&self) -> std::io::Result<AllowList> {
        Ok(self.0.clone())
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────

fn result_with(content: &str) -> CompletionResult {
    CompletionResult {
        id: "chatcmpl-up".into(),
        object: "chat.completion".into(),
        created: 1_700_000_000,
        model: "up-model".into(),
        choices: vec![Choice {
            index: 0,
            message: ChatMessage::assistant(content),
            finish_reason: Some(FinishReason::Stop),
            extra: Default::default(),
        }],
        usage: None,
        extra: Default::default(),
    }
}

fn chunk(content: Option<&str>, finish: Option<FinishReason>) -> StreamChunk {
    StreamChunk {
        id: "chatcmpl-s".into(),
        model: "up-model".into(),
        created: 1_700_000_000,
        delta_content: content.map(str::to_owned),
        finish_reason: finish,
    }
}

fn two_chunk_reply() -> Reply {
    Reply::Chunks(vec![
        Ok(chunk(Some("Hel"), None)),
        Ok(chunk(Some("lo"), Some(FinishReason::Stop))),
    ])
}

fn settings() -> MediationSettings {
    MediationSettings {
        shape: ShapeConfig {
            model: "default-model".into(),
            ..ShapeConfig::default()
        },
        auto_trim: true,
        has_upstream_key: true,
    }
}

fn mediator(settings: MediationSettings, upstream: Arc<FakeUpstream>) -> Mediator {
    let allow: AllowList = ["good-token"].into_iter().collect();
    Mediator::new(settings, upstream, Arc::new(StaticAllowList(allow)))
}

fn user_payload(text: &str, stream: bool) -> Value {
    json!({
        "messages": [{ "role": "user", "content": text }],
        "stream": stream,
    })
}

fn expect_completion(outcome: Result<Mediated, MediationError>) -> CompletionResult {
    match outcome {
        Ok(Mediated::Completion(result)) => result,
        other => panic!("expected a completion, got {other:?}"),
    }
}

async fn drain(outcome: Result<Mediated, MediationError>) -> Vec<WireEvent> {
    match outcome {
        Ok(Mediated::Stream(events)) => events.collect().await,
        other => panic!("expected a stream, got {other:?}"),
    }
}

// ── Non-streaming path ────────────────────────────────────────────────────

#[tokio::test]
async fn auto_trim_cuts_trailing_fragment() {
    let upstream = FakeUpstream::new(Reply::Complete("One sentence. Incomplete cut off".into()));
    let m = mediator(settings(), upstream.clone());

    let result = expect_completion(m.complete(user_payload("hi", false)).await);
    assert_eq!(result.choices[0].message.content, "One sentence.");
    assert_eq!(upstream.calls(), 1);
    assert!(!m.gate().is_busy());
}

#[tokio::test]
async fn auto_trim_disabled_keeps_content() {
    let upstream = FakeUpstream::new(Reply::Complete("One sentence. Incomplete cut off".into()));
    let m = mediator(
        MediationSettings {
            auto_trim: false,
            ..settings()
        },
        upstream,
    );

    let result = expect_completion(m.complete(user_payload("hi", false)).await);
    assert_eq!(
        result.choices[0].message.content,
        "One sentence. Incomplete cut off"
    );
}

#[tokio::test]
async fn defaults_are_applied_before_submission() {
    let upstream = FakeUpstream::new(Reply::Complete("ok.".into()));
    let m = mediator(settings(), upstream.clone());

    m.complete(user_payload("hi", false)).await.unwrap();

    let sent = upstream.last_request();
    assert_eq!(sent.model, "default-model");
    assert_eq!(sent.temperature, 0.9);
    assert_eq!(sent.max_tokens, 2048);
    assert_eq!(sent.top_p, 0.9);
    assert!(!sent.stream);
}

#[tokio::test]
async fn prefill_reaches_upstream() {
    let upstream = FakeUpstream::new(Reply::Complete("ok.".into()));
    let mut s = settings();
    s.shape.prefill_enabled = true;
    s.shape.prefill_text = "Sure:".into();
    let m = mediator(s, upstream.clone());

    m.complete(user_payload("hi", false)).await.unwrap();

    let sent = upstream.last_request();
    assert_eq!(sent.messages.len(), 2);
    assert_eq!(sent.messages[1].role, Role::Assistant);
    assert_eq!(sent.messages[1].content, "Sure:");
}

#[tokio::test]
async fn upstream_quota_is_classified() {
    let upstream = FakeUpstream::new(Reply::Fail(UpstreamError::Quota("429".into())));
    let m = mediator(settings(), upstream);

    let err = m.complete(user_payload("hi", false)).await.unwrap_err();
    assert!(matches!(
        err,
        MediationError::Upstream(UpstreamError::Quota(_))
    ));
    assert!(!m.gate().is_busy());
}

// ── Short-circuits and validation ─────────────────────────────────────────

#[tokio::test]
async fn diagnostic_probe_skips_upstream() {
    let upstream = FakeUpstream::new(Reply::Complete("unused".into()));
    let mut s = settings();
    s.has_upstream_key = false;
    s.shape.prefill_enabled = true;
    let m = mediator(s, upstream.clone());

    let result = expect_completion(m.complete(user_payload(DIAGNOSTIC_PROMPT, true)).await);

    assert_eq!(upstream.calls(), 0);
    assert_eq!(result.id, "chatcmpl-test");
    assert_eq!(result.model, "default-model");
    assert_eq!(result.choices[0].message.content, "TEST");
    assert_eq!(result.usage.map(|u| u.total_tokens), Some(11));
}

#[tokio::test]
async fn missing_key_is_config_error() {
    let upstream = FakeUpstream::new(Reply::Complete("unused".into()));
    let m = mediator(
        MediationSettings {
            has_upstream_key: false,
            ..settings()
        },
        upstream.clone(),
    );

    let err = m.complete(user_payload("hi", false)).await.unwrap_err();
    assert!(matches!(err, MediationError::Config(ConfigError::MissingKey)));
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn malformed_body_is_validation_error() {
    let upstream = FakeUpstream::new(Reply::Complete("unused".into()));
    let m = mediator(settings(), upstream.clone());

    let err = m.complete(json!({ "model": "x" })).await.unwrap_err();
    assert!(matches!(
        err,
        MediationError::Validation(ValidationError::MalformedBody(_))
    ));

    let err = m.complete(json!([1, 2, 3])).await.unwrap_err();
    assert!(matches!(err, MediationError::Validation(_)));

    assert_eq!(upstream.calls(), 0);
    assert!(!m.gate().is_busy());
}

// ── Streaming path ────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_relays_chunks_then_sentinel() {
    let upstream = FakeUpstream::new(two_chunk_reply());
    let m = mediator(settings(), upstream.clone());

    let events = drain(m.complete(user_payload("hi", true)).await).await;

    assert_eq!(events.len(), 3);
    let text: String = events
        .iter()
        .filter_map(|e| match e {
            WireEvent::Delta(v) => v["choices"][0]["delta"]["content"].as_str().map(str::to_owned),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Hello");
    assert!(events[2].is_done());
    assert!(upstream.last_request().stream);
    assert!(!m.gate().is_busy());
}

#[tokio::test]
async fn stream_content_is_not_trimmed() {
    let upstream = FakeUpstream::new(Reply::Chunks(vec![Ok(chunk(
        Some("Done. and then"),
        Some(FinishReason::Length),
    ))]));
    let m = mediator(settings(), upstream);

    let events = drain(m.complete(user_payload("hi", true)).await).await;
    let WireEvent::Delta(v) = &events[0] else {
        panic!("expected a delta, got {:?}", events[0]);
    };
    assert_eq!(v["choices"][0]["delta"]["content"], "Done. and then");
}

#[tokio::test]
async fn stream_open_failure_is_in_band() {
    let upstream = FakeUpstream::new(Reply::Fail(UpstreamError::Quota("quota".into())));
    let m = mediator(settings(), upstream);

    let events = drain(m.complete(user_payload("hi", true)).await).await;
    assert_eq!(
        events,
        vec![WireEvent::Error(QUOTA_MESSAGE.into()), WireEvent::Done]
    );
    assert!(!m.gate().is_busy());
}

#[tokio::test]
async fn stream_holds_gate_until_dropped() {
    let upstream = FakeUpstream::new(Reply::Chunks(vec![
        Ok(chunk(Some("a"), None)),
        Ok(chunk(Some("b"), None)),
    ]));
    let m = mediator(settings(), upstream.clone());

    let Ok(Mediated::Stream(mut events)) = m.complete(user_payload("first", true)).await else {
        panic!("expected a stream");
    };
    assert!(events.next().await.is_some());
    assert!(m.gate().is_busy());

    let second = {
        let m = m.clone();
        tokio::spawn(async move { m.complete(user_payload("second", true)).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!second.is_finished(), "second caller must wait for the stream");
    assert_eq!(upstream.calls(), 1);

    drop(events);
    let outcome = tokio::time::timeout(Duration::from_secs(2), second)
        .await
        .expect("second caller should proceed once the stream is gone")
        .expect("task panicked");
    assert!(outcome.is_ok());
    assert_eq!(upstream.calls(), 2);
}

// ── Serialisation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_requests_never_overlap_upstream() {
    let upstream = FakeUpstream::with_delay(two_chunk_reply(), Duration::from_millis(5));
    let m = mediator(settings(), upstream.clone());

    let mut handles = Vec::new();
    for i in 0..6 {
        let m = m.clone();
        handles.push(tokio::spawn(async move {
            let events = drain(m.complete(user_payload(&format!("req {i}"), true)).await).await;
            assert!(events.last().is_some_and(WireEvent::is_done));
        }));
    }
    for h in handles {
        h.await.expect("task panicked");
    }

    assert_eq!(upstream.calls(), 6);
    assert_eq!(upstream.peak(), 1, "upstream exchanges must be serialised");
    assert!(!m.gate().is_busy());
}

// ── Authenticated entry ───────────────────────────────────────────────────

#[tokio::test]
async fn authorize_reads_the_authorization_header() {
    let upstream = FakeUpstream::new(Reply::Complete("ok.".into()));
    let m = mediator(settings(), upstream.clone());

    assert_eq!(m.authorize(None).await, Err(AuthDenied::Missing));
    assert_eq!(m.authorize(Some("Bearer ")).await, Err(AuthDenied::Missing));
    assert_eq!(
        m.authorize(Some("Bearer bad-token")).await,
        Err(AuthDenied::Invalid)
    );
    assert_eq!(m.authorize(Some("Bearer good-token")).await, Ok(()));
    assert_eq!(m.authorize(Some("good-token")).await, Ok(()));
    assert_eq!(upstream.calls(), 0);
}

// ── Model listing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn list_models_requires_key() {
    let upstream = FakeUpstream::new(Reply::Complete("unused".into()));
    let m = mediator(
        MediationSettings {
            has_upstream_key: false,
            ..settings()
        },
        upstream.clone(),
    );
    assert!(matches!(
        m.list_models().await,
        Err(MediationError::Config(ConfigError::MissingKey))
    ));
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn list_models_passes_through() {
    let upstream = FakeUpstream::new(Reply::Complete("unused".into()));
    let m = mediator(settings(), upstream);
    let models = m.list_models().await.unwrap();
    assert_eq!(models["data"][0]["id"], "m-1");
}

// ── Logging ───────────────────────────────────────────────────────────────

#[tokio::test]
#[traced_test]
async fn diagnostic_probe_is_logged() {
    let m = mediator(settings(), FakeUpstream::new(Reply::Complete("x".into())));
    m.complete(user_payload(DIAGNOSTIC_PROMPT, false))
        .await
        .unwrap();
    assert!(logs_contain("diagnostic probe answered locally"));
}
