//! Deadline-bounded streaming between a conversation and a completion provider.
//!
//! The bridge picks an API shape, opens the provider stream, coalesces the
//! text fragments it yields into paced [`StreamDelta`]s and returns exactly
//! one [`CompletionResult`] per invocation. A responses-API call that the
//! provider rejects as unsupported is retried once in the legacy shape.

mod pacing;
mod result;

pub use result::{ApiMode, Completion, CompletionFailure, CompletionResult, FailureKind};

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::core::{
    Capabilities, CompletionProvider, ConversationContext, DeltaSink, LanguageModelUsage,
    LlmError, ProviderEvent, StreamDelta,
};
use pacing::Pacer;

/// Terminal metadata of a stream that reached its completion event.
struct Finished {
    response_id: Option<String>,
    model: Option<String>,
    usage: Option<LanguageModelUsage>,
}

/// An attempt that ended without a completion event.
struct Interrupted {
    error: LlmError,
    partial_text: String,
}

/// Streams completions from a provider under a deadline.
///
/// Holds only read-only state, so one bridge can serve concurrent
/// invocations for independent conversations.
pub struct CompletionBridge<P> {
    provider: P,
    config: BridgeConfig,
    capabilities: Capabilities,
}

impl<P: CompletionProvider> CompletionBridge<P> {
    /// Queries the provider's capabilities once and caches them.
    pub fn new(provider: P, config: BridgeConfig) -> Result<Self, LlmError> {
        config.pacing.validate()?;
        let capabilities = provider.capabilities();
        debug!(
            responses_api = capabilities.responses_api,
            use_responses_api = config.use_responses_api,
            "Completion bridge created"
        );

        Ok(Self {
            provider,
            config,
            capabilities,
        })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// New only when the caller opted in and the provider supports it. No I/O.
    pub fn probe_capability(&self) -> ApiMode {
        if self.config.use_responses_api && self.capabilities.responses_api {
            ApiMode::New
        } else {
            ApiMode::Legacy
        }
    }

    /// Probe the mode, then stream a completion for `context`.
    pub async fn complete(
        &self,
        context: &ConversationContext,
        deadline: Instant,
        sink: &mut dyn DeltaSink,
    ) -> CompletionResult {
        let mode = self.probe_capability();
        self.stream_completion(context, mode, deadline, sink).await
    }

    /// Stream a completion in `mode`, forwarding coalesced deltas to `sink`.
    ///
    /// A capability rejection in New mode that arrives before any text
    /// triggers exactly one Legacy attempt with the same context and the
    /// remaining budget. Legacy failures are returned as they are.
    #[tracing::instrument(
        name = "stream_completion",
        skip_all,
        fields(mode = %mode, messages = context.messages().len())
    )]
    pub async fn stream_completion(
        &self,
        context: &ConversationContext,
        mode: ApiMode,
        deadline: Instant,
        sink: &mut dyn DeltaSink,
    ) -> CompletionResult {
        let started = Instant::now();
        let mut pacer = Pacer::new(self.config.pacing.clone(), started);

        let first = self
            .attempt(context, mode, deadline, started, &mut pacer, sink)
            .await;

        let (outcome, mode, fallback_used) = match first {
            Err(interrupted)
                if mode == ApiMode::New
                    && interrupted.error.is_capability_unavailable()
                    && interrupted.partial_text.is_empty() =>
            {
                warn!(
                    error = %interrupted.error,
                    "Responses API unavailable, falling back to chat completions"
                );
                let retried = self
                    .attempt(context, ApiMode::Legacy, deadline, started, &mut pacer, sink)
                    .await;
                (retried, ApiMode::Legacy, true)
            }
            other => (other, mode, false),
        };

        match outcome {
            Ok((text, finished)) => {
                info!(
                    mode = %mode,
                    fallback_used,
                    chars = text.chars().count(),
                    updates = pacer.forwarded(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Completion finished"
                );
                Ok(Completion {
                    text,
                    usage: finished.usage,
                    mode,
                    fallback_used,
                    response_id: finished.response_id,
                    model: finished.model,
                })
            }
            Err(interrupted) => {
                let failure = CompletionFailure::new(
                    interrupted.error,
                    interrupted.partial_text,
                    mode,
                    fallback_used,
                );
                warn!(
                    kind = %failure.kind,
                    mode = %mode,
                    fallback_used,
                    partial_chars = failure.partial_text.chars().count(),
                    error = %failure.source,
                    "Completion failed"
                );
                Err(failure)
            }
        }
    }

    /// One provider call. Buffered text is flushed to `sink` however it ends,
    /// as long as the sink accepts it before the deadline.
    async fn attempt(
        &self,
        context: &ConversationContext,
        mode: ApiMode,
        deadline: Instant,
        started: Instant,
        pacer: &mut Pacer,
        sink: &mut dyn DeltaSink,
    ) -> Result<(String, Finished), Interrupted> {
        let mut text = String::new();
        let mut outcome = self
            .drive(context, mode, deadline, started, pacer, &mut text, sink)
            .await;

        if let Some(delta) = pacer.finish(Instant::now())
            && let Err(expired) = forward(sink, &delta, deadline, started).await
            && outcome.is_ok()
        {
            outcome = Err(expired);
        }

        match outcome {
            Ok(finished) => Ok((text, finished)),
            Err(error) => Err(Interrupted {
                error,
                partial_text: text,
            }),
        }
    }

    /// Read provider events until the completion event, an error or the deadline.
    ///
    /// The provider stream is owned here and dropped on every exit path,
    /// which closes the underlying connection.
    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        context: &ConversationContext,
        mode: ApiMode,
        deadline: Instant,
        started: Instant,
        pacer: &mut Pacer,
        text: &mut String,
        sink: &mut dyn DeltaSink,
    ) -> Result<Finished, LlmError> {
        let open = match mode {
            ApiMode::Legacy => self.provider.stream_legacy(context),
            ApiMode::New => self.provider.stream_responses(context),
        };
        let mut stream = timeout_at(deadline, open)
            .await
            .map_err(|_| deadline_exceeded(started))??;

        loop {
            let wake = pacer
                .flush_due()
                .map_or(deadline, |due| due.min(deadline));

            let next = match timeout_at(wake, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(deadline_exceeded(started));
                    }
                    if let Some(delta) = pacer.tick(now) {
                        forward(sink, &delta, deadline, started).await?;
                    }
                    continue;
                }
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(deadline_exceeded(started));
            }

            match next {
                Some(Ok(ProviderEvent::TextDelta(fragment))) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    text.push_str(&fragment);
                    if let Some(delta) = pacer.push(&fragment, now) {
                        forward(sink, &delta, deadline, started).await?;
                    }
                }
                Some(Ok(ProviderEvent::Completed {
                    response_id,
                    model,
                    usage,
                })) => {
                    return Ok(Finished {
                        response_id,
                        model,
                        usage,
                    });
                }
                Some(Err(error)) => return Err(error),
                None => {
                    return Err(LlmError::malformed(
                        "Stream ended without a completion event",
                    ));
                }
            }
        }
    }
}

impl<P: CompletionProvider + 'static> CompletionBridge<P> {
    /// Run [`complete`](Self::complete) on a background task.
    ///
    /// Deltas arrive on the returned stream; the task yields the terminal
    /// result. Dropping the stream does not cancel the completion.
    pub fn spawn(
        self: &Arc<Self>,
        context: ConversationContext,
        deadline: Instant,
        buffer: usize,
    ) -> (ReceiverStream<StreamDelta>, JoinHandle<CompletionResult>) {
        let (mut tx, rx) = mpsc::channel(buffer.max(1));
        let bridge = Arc::clone(self);

        let handle = tokio::spawn(async move { bridge.complete(&context, deadline, &mut tx).await });

        (ReceiverStream::new(rx), handle)
    }
}

/// Hand `delta` to the sink, giving up once the deadline passes.
async fn forward(
    sink: &mut dyn DeltaSink,
    delta: &StreamDelta,
    deadline: Instant,
    started: Instant,
) -> Result<(), LlmError> {
    timeout_at(deadline, sink.on_delta(delta))
        .await
        .map_err(|_| deadline_exceeded(started))
}

fn deadline_exceeded(started: Instant) -> LlmError {
    LlmError::DeadlineExceeded {
        elapsed: started.elapsed(),
    }
}
