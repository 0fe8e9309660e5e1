use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chatrelay::core::{EventStream, LanguageModelUsage, ProviderEvent};
use chatrelay::{
    ApiMode, BridgeConfig, Capabilities, CompletionBridge, CompletionProvider,
    ConversationContext, DeltaSink, FailureKind, LlmError, Message, PacingConfig, StreamDelta,
};
use futures::StreamExt;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
enum Failure {
    Capability,
    RateLimited,
    Malformed,
}

impl Failure {
    fn error(self) -> LlmError {
        match self {
            Failure::Capability => LlmError::CapabilityUnavailable {
                message: "code=unsupported_parameter param=instructions".to_string(),
            },
            Failure::RateLimited => LlmError::Api {
                message: "code=rate_limit_exceeded Rate limit reached".to_string(),
                status_code: Some(429),
                source: None,
            },
            Failure::Malformed => LlmError::StreamMalformed {
                message: "Event without a type".to_string(),
                source: None,
            },
        }
    }
}

enum Step {
    Text(&'static str),
    Wait(u64),
    Fail(Failure),
    Done,
    Stall,
}

enum Opening {
    Stream(Vec<Step>),
    Fail(Failure),
}

/// Counts scripted streams that have been dropped.
struct ReleaseGuard(Arc<AtomicUsize>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn scripted(steps: Vec<Step>, guard: ReleaseGuard) -> EventStream {
    Box::pin(futures::stream::unfold(
        (steps.into_iter(), guard),
        |(mut steps, guard)| async move {
            loop {
                match steps.next()? {
                    Step::Wait(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                    Step::Text(text) => {
                        let event = Ok(ProviderEvent::TextDelta(text.to_string()));
                        return Some((event, (steps, guard)));
                    }
                    Step::Fail(failure) => return Some((Err(failure.error()), (steps, guard))),
                    Step::Done => {
                        let completed = ProviderEvent::Completed {
                            response_id: Some("resp_123".to_string()),
                            model: Some("gpt-4o-mini".to_string()),
                            usage: Some(LanguageModelUsage {
                                prompt_tokens: 5,
                                completion_tokens: 3,
                                total_tokens: 8,
                            }),
                        };
                        return Some((Ok(completed), (steps, guard)));
                    }
                    Step::Stall => futures::future::pending::<()>().await,
                }
            }
        },
    ))
}

/// Provider that replays one queued script per call and records every call.
struct ScriptedProvider {
    responses_api: bool,
    legacy: Mutex<VecDeque<Opening>>,
    responses: Mutex<VecDeque<Opening>>,
    calls: Mutex<Vec<(ApiMode, ConversationContext)>>,
    opened: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    fn new(responses_api: bool) -> Self {
        Self {
            responses_api,
            legacy: Mutex::new(VecDeque::new()),
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            opened: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn legacy(self, opening: Opening) -> Self {
        self.legacy.lock().unwrap().push_back(opening);
        self
    }

    fn responses(self, opening: Opening) -> Self {
        self.responses.lock().unwrap().push_back(opening);
        self
    }

    fn calls(&self) -> Vec<(ApiMode, ConversationContext)> {
        self.calls.lock().unwrap().clone()
    }

    /// Streams handed out and streams dropped so far.
    fn streams(&self) -> (usize, usize) {
        (
            self.opened.load(Ordering::SeqCst),
            self.released.load(Ordering::SeqCst),
        )
    }

    fn open(&self, mode: ApiMode, context: &ConversationContext) -> Result<EventStream, LlmError> {
        self.calls.lock().unwrap().push((mode, context.clone()));

        let queue = match mode {
            ApiMode::Legacy => &self.legacy,
            ApiMode::New => &self.responses,
        };
        let opening = queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected {mode} call"));

        match opening {
            Opening::Stream(steps) => {
                self.opened.fetch_add(1, Ordering::SeqCst);
                Ok(scripted(steps, ReleaseGuard(Arc::clone(&self.released))))
            }
            Opening::Fail(failure) => Err(failure.error()),
        }
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            responses_api: self.responses_api,
            stream_usage: true,
        }
    }

    async fn stream_legacy(&self, context: &ConversationContext) -> Result<EventStream, LlmError> {
        self.open(ApiMode::Legacy, context)
    }

    async fn stream_responses(
        &self,
        context: &ConversationContext,
    ) -> Result<EventStream, LlmError> {
        self.open(ApiMode::New, context)
    }
}

fn ping() -> ConversationContext {
    ConversationContext::new(vec![
        Message::system("You are terse."),
        Message::user("ping"),
    ])
}

fn pong() -> Opening {
    Opening::Stream(vec![
        Step::Text("p"),
        Step::Text("on"),
        Step::Text("g"),
        Step::Done,
    ])
}

fn bridge(provider: ScriptedProvider, config: BridgeConfig) -> CompletionBridge<ScriptedProvider> {
    CompletionBridge::new(provider, config).expect("valid config")
}

fn joined(deltas: &[StreamDelta]) -> String {
    deltas.iter().map(|d| d.text.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn legacy_chunks_concatenate_into_final_text() {
    let bridge = bridge(ScriptedProvider::new(false).legacy(pong()), BridgeConfig::new());
    let mut deltas: Vec<StreamDelta> = Vec::new();

    let deadline = Instant::now() + Duration::from_secs(5);
    let completion = bridge
        .stream_completion(&ping(), ApiMode::Legacy, deadline, &mut deltas)
        .await
        .expect("completion");

    assert_eq!(completion.text, "pong");
    assert_eq!(completion.mode, ApiMode::Legacy);
    assert!(!completion.fallback_used);
    assert_eq!(completion.response_id.as_deref(), Some("resp_123"));
    assert_eq!(completion.usage.map(|u| u.total_tokens), Some(8));

    assert!(!deltas.is_empty() && deltas.len() <= 3);
    assert_eq!(joined(&deltas), "pong");
}

#[tokio::test(start_paused = true)]
async fn capability_rejection_falls_back_once_with_same_context() {
    let provider = ScriptedProvider::new(true)
        .responses(Opening::Fail(Failure::Capability))
        .legacy(pong());
    let bridge = bridge(provider, BridgeConfig::new().with_responses_api(true));
    assert_eq!(bridge.probe_capability(), ApiMode::New);

    let mut deltas: Vec<StreamDelta> = Vec::new();
    let context = ping();
    let completion = bridge
        .complete(&context, Instant::now() + Duration::from_secs(5), &mut deltas)
        .await
        .expect("fallback completion");

    assert_eq!(completion.text, "pong");
    assert_eq!(completion.mode, ApiMode::Legacy);
    assert!(completion.fallback_used);

    let calls = bridge.provider().calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, ApiMode::New);
    assert_eq!(calls[1].0, ApiMode::Legacy);
    assert_eq!(calls[1].1, context);
}

#[tokio::test(start_paused = true)]
async fn stalled_stream_hits_deadline_with_partial_text() {
    let provider = ScriptedProvider::new(false).legacy(Opening::Stream(vec![
        Step::Wait(1000),
        Step::Text("p"),
        Step::Stall,
    ]));
    let bridge = bridge(provider, BridgeConfig::new());
    let mut deltas: Vec<StreamDelta> = Vec::new();

    let start = Instant::now();
    let failure = bridge
        .stream_completion(&ping(), ApiMode::Legacy, start + Duration::from_secs(2), &mut deltas)
        .await
        .expect_err("deadline should pass");

    assert_eq!(failure.kind, FailureKind::DeadlineExceeded);
    assert_eq!(failure.partial_text, "p");
    assert_eq!(start.elapsed(), Duration::from_secs(2));
    assert!(matches!(
        failure.source,
        LlmError::DeadlineExceeded { elapsed } if elapsed == Duration::from_secs(2)
    ));
    assert_eq!(joined(&deltas), "p");
    assert_eq!(bridge.provider().streams(), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn fallback_keeps_the_original_deadline() {
    let provider = ScriptedProvider::new(true)
        .responses(Opening::Stream(vec![
            Step::Wait(1500),
            Step::Fail(Failure::Capability),
        ]))
        .legacy(Opening::Stream(vec![Step::Text("p"), Step::Stall]));
    let bridge = bridge(provider, BridgeConfig::new().with_responses_api(true));
    let mut deltas: Vec<StreamDelta> = Vec::new();

    let start = Instant::now();
    let failure = bridge
        .complete(&ping(), start + Duration::from_secs(2), &mut deltas)
        .await
        .expect_err("legacy stalls past the deadline");

    assert_eq!(start.elapsed(), Duration::from_secs(2));
    assert_eq!(failure.kind, FailureKind::DeadlineExceeded);
    assert_eq!(failure.mode, ApiMode::Legacy);
    assert!(failure.fallback_used);
    assert_eq!(failure.partial_text, "p");
    assert_eq!(bridge.provider().streams(), (2, 2));
}

/// Sink that takes ten seconds to accept each delta.
#[derive(Default)]
struct SlowSink {
    received: Vec<StreamDelta>,
}

#[async_trait]
impl DeltaSink for SlowSink {
    async fn on_delta(&mut self, delta: &StreamDelta) {
        tokio::time::sleep(Duration::from_secs(10)).await;
        self.received.push(delta.clone());
    }
}

#[tokio::test(start_paused = true)]
async fn slow_sink_does_not_outlive_deadline() {
    let provider = ScriptedProvider::new(false).legacy(Opening::Stream(vec![
        Step::Text("p"),
        Step::Text("ong"),
        Step::Stall,
    ]));
    let pacing = PacingConfig::new(1, Duration::from_millis(100), 10);
    let bridge = bridge(provider, BridgeConfig::new().with_pacing(pacing));
    let mut sink = SlowSink::default();

    let start = Instant::now();
    let failure = bridge
        .stream_completion(&ping(), ApiMode::Legacy, start + Duration::from_secs(2), &mut sink)
        .await
        .expect_err("sink blocks past the deadline");

    assert_eq!(start.elapsed(), Duration::from_secs(2));
    assert_eq!(failure.kind, FailureKind::DeadlineExceeded);
    assert_eq!(failure.partial_text, "p");
    assert!(sink.received.is_empty());
    assert_eq!(bridge.provider().streams(), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn fresh_call_after_deadline_starts_clean() {
    let provider = ScriptedProvider::new(false)
        .legacy(Opening::Stream(vec![Step::Text("stale"), Step::Stall]))
        .legacy(pong());
    let bridge = bridge(provider, BridgeConfig::new());

    let mut first: Vec<StreamDelta> = Vec::new();
    let failure = bridge
        .complete(&ping(), Instant::now() + Duration::from_secs(2), &mut first)
        .await
        .expect_err("first call stalls");
    assert_eq!(failure.partial_text, "stale");

    let mut second: Vec<StreamDelta> = Vec::new();
    let completion = bridge
        .complete(&ping(), Instant::now() + Duration::from_secs(2), &mut second)
        .await
        .expect("second call completes");
    assert_eq!(completion.text, "pong");
    assert_eq!(second[0].sequence, 0);
    assert_eq!(second[0].offset, 0);
}

#[tokio::test(start_paused = true)]
async fn quiet_provider_triggers_timed_flush() {
    let provider = ScriptedProvider::new(false).legacy(Opening::Stream(vec![
        Step::Text("Hel"),
        Step::Wait(3000),
        Step::Text("lo"),
        Step::Done,
    ]));
    let pacing = PacingConfig::new(80, Duration::from_secs(1), 10);
    let bridge = bridge(provider, BridgeConfig::new().with_pacing(pacing));
    let mut deltas: Vec<StreamDelta> = Vec::new();

    let completion = bridge
        .complete(&ping(), Instant::now() + Duration::from_secs(10), &mut deltas)
        .await
        .expect("completion");

    assert_eq!(completion.text, "Hello");
    assert_eq!(
        deltas,
        vec![
            StreamDelta {
                sequence: 0,
                offset: 0,
                text: "Hel".to_string(),
            },
            StreamDelta {
                sequence: 1,
                offset: 3,
                text: "lo".to_string(),
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn forwarded_updates_respect_cap() {
    let steps: Vec<Step> = std::iter::repeat_with(|| Step::Text("x"))
        .take(50)
        .chain(std::iter::once(Step::Done))
        .collect();
    let provider = ScriptedProvider::new(false).legacy(Opening::Stream(steps));
    let pacing = PacingConfig::new(1, Duration::from_millis(100), 5);
    let bridge = bridge(provider, BridgeConfig::new().with_pacing(pacing));
    let mut deltas: Vec<StreamDelta> = Vec::new();

    let completion = bridge
        .complete(&ping(), Instant::now() + Duration::from_secs(10), &mut deltas)
        .await
        .expect("completion");

    assert_eq!(deltas.len(), 5);
    assert_eq!(joined(&deltas), completion.text);
    assert_eq!(completion.text.len(), 50);
}

#[tokio::test(start_paused = true)]
async fn legacy_failures_are_not_retried() {
    let provider = ScriptedProvider::new(true).legacy(Opening::Fail(Failure::RateLimited));
    let bridge = bridge(provider, BridgeConfig::new());
    let mut deltas: Vec<StreamDelta> = Vec::new();

    let failure = bridge
        .complete(&ping(), Instant::now() + Duration::from_secs(5), &mut deltas)
        .await
        .expect_err("rate limited");

    assert_eq!(failure.kind, FailureKind::ProviderError);
    assert_eq!(failure.mode, ApiMode::Legacy);
    assert!(!failure.fallback_used);
    assert_eq!(bridge.provider().calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn legacy_capability_error_is_not_retried() {
    let provider = ScriptedProvider::new(false).legacy(Opening::Fail(Failure::Capability));
    let bridge = bridge(provider, BridgeConfig::new());
    let mut deltas: Vec<StreamDelta> = Vec::new();

    let failure = bridge
        .stream_completion(&ping(), ApiMode::Legacy, Instant::now() + Duration::from_secs(5), &mut deltas)
        .await
        .expect_err("legacy rejected");

    assert_eq!(failure.kind, FailureKind::ProviderError);
    assert_eq!(bridge.provider().calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn new_mode_provider_error_does_not_fall_back() {
    let provider = ScriptedProvider::new(true).responses(Opening::Fail(Failure::RateLimited));
    let bridge = bridge(provider, BridgeConfig::new().with_responses_api(true));
    let mut deltas: Vec<StreamDelta> = Vec::new();

    let failure = bridge
        .complete(&ping(), Instant::now() + Duration::from_secs(5), &mut deltas)
        .await
        .expect_err("rate limited");

    assert_eq!(failure.kind, FailureKind::ProviderError);
    assert_eq!(failure.mode, ApiMode::New);
    assert!(!failure.fallback_used);
    assert_eq!(bridge.provider().calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn capability_error_after_text_does_not_fall_back() {
    let provider = ScriptedProvider::new(true).responses(Opening::Stream(vec![
        Step::Text("par"),
        Step::Fail(Failure::Capability),
    ]));
    let bridge = bridge(provider, BridgeConfig::new().with_responses_api(true));
    let mut deltas: Vec<StreamDelta> = Vec::new();

    let failure = bridge
        .complete(&ping(), Instant::now() + Duration::from_secs(5), &mut deltas)
        .await
        .expect_err("mid-stream rejection");

    assert_eq!(failure.partial_text, "par");
    assert_eq!(failure.mode, ApiMode::New);
    assert_eq!(bridge.provider().calls().len(), 1);
    assert_eq!(joined(&deltas), "par");
}

#[tokio::test(start_paused = true)]
async fn fallback_is_attempted_at_most_once() {
    let provider = ScriptedProvider::new(true)
        .responses(Opening::Fail(Failure::Capability))
        .legacy(Opening::Fail(Failure::Capability));
    let bridge = bridge(provider, BridgeConfig::new().with_responses_api(true));
    let mut deltas: Vec<StreamDelta> = Vec::new();

    let failure = bridge
        .complete(&ping(), Instant::now() + Duration::from_secs(5), &mut deltas)
        .await
        .expect_err("both shapes rejected");

    assert_eq!(failure.kind, FailureKind::ProviderError);
    assert_eq!(failure.mode, ApiMode::Legacy);
    assert!(failure.fallback_used);
    assert_eq!(bridge.provider().calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn malformed_stream_flushes_partial_text() {
    let provider = ScriptedProvider::new(false).legacy(Opening::Stream(vec![
        Step::Text("ab"),
        Step::Fail(Failure::Malformed),
        Step::Text("never"),
    ]));
    let bridge = bridge(provider, BridgeConfig::new());
    let mut deltas: Vec<StreamDelta> = Vec::new();

    let failure = bridge
        .complete(&ping(), Instant::now() + Duration::from_secs(5), &mut deltas)
        .await
        .expect_err("malformed");

    assert_eq!(failure.kind, FailureKind::StreamMalformed);
    assert_eq!(failure.partial_text, "ab");
    assert_eq!(joined(&deltas), "ab");
    assert_eq!(bridge.provider().streams(), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn stream_ending_without_completion_is_malformed() {
    let provider = ScriptedProvider::new(false)
        .legacy(Opening::Stream(vec![Step::Text("cut"), Step::Text(" off")]));
    let bridge = bridge(provider, BridgeConfig::new());
    let mut deltas: Vec<StreamDelta> = Vec::new();

    let failure = bridge
        .complete(&ping(), Instant::now() + Duration::from_secs(5), &mut deltas)
        .await
        .expect_err("truncated");

    assert_eq!(failure.kind, FailureKind::StreamMalformed);
    assert_eq!(failure.partial_text, "cut off");
}

#[tokio::test(start_paused = true)]
async fn spawned_completion_streams_deltas_through_channel() {
    let provider = ScriptedProvider::new(false).legacy(pong());
    let bridge = Arc::new(bridge(provider, BridgeConfig::new()));

    let (deltas, handle) = bridge.spawn(ping(), Instant::now() + Duration::from_secs(5), 4);
    let received: Vec<StreamDelta> = deltas.collect().await;
    let completion = handle.await.expect("task joined").expect("completion");

    assert_eq!(joined(&received), completion.text);
    assert_eq!(completion.text, "pong");
}
