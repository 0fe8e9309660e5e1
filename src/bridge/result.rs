use std::fmt;

use thiserror::Error;

use crate::core::{LanguageModelUsage, LlmError};

/// Request/response shape used to talk to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiMode {
    /// Chat completions: role-tagged message list, per-chunk content deltas.
    Legacy,
    /// Responses API: instructions plus input, named streaming events.
    New,
}

impl fmt::Display for ApiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiMode::Legacy => f.write_str("legacy"),
            ApiMode::New => f.write_str("new"),
        }
    }
}

/// Successful terminal outcome of one bridge invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Concatenation of every forwarded delta, in order.
    pub text: String,
    pub usage: Option<LanguageModelUsage>,
    /// Mode of the call that produced `text`.
    pub mode: ApiMode,
    pub fallback_used: bool,
    pub response_id: Option<String>,
    pub model: Option<String>,
}

/// Classification the caller uses to pick user-facing messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    DeadlineExceeded,
    ProviderError,
    StreamMalformed,
}

impl FailureKind {
    pub(crate) fn classify(error: &LlmError) -> Self {
        match error {
            LlmError::DeadlineExceeded { .. } => FailureKind::DeadlineExceeded,
            LlmError::StreamMalformed { .. } | LlmError::Parse { .. } => {
                FailureKind::StreamMalformed
            }
            _ => FailureKind::ProviderError,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::DeadlineExceeded => f.write_str("deadline exceeded"),
            FailureKind::ProviderError => f.write_str("provider error"),
            FailureKind::StreamMalformed => f.write_str("malformed stream"),
        }
    }
}

/// Failed terminal outcome, carrying whatever text was already forwarded.
#[derive(Debug, Error)]
#[error("Completion failed ({kind}) in {mode} mode: {source}")]
pub struct CompletionFailure {
    pub kind: FailureKind,
    pub partial_text: String,
    pub mode: ApiMode,
    pub fallback_used: bool,
    #[source]
    pub source: LlmError,
}

impl CompletionFailure {
    pub(crate) fn new(
        source: LlmError,
        partial_text: String,
        mode: ApiMode,
        fallback_used: bool,
    ) -> Self {
        Self {
            kind: FailureKind::classify(&source),
            partial_text,
            mode,
            fallback_used,
            source,
        }
    }
}

pub type CompletionResult = Result<Completion, CompletionFailure>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_failure_classification() {
        let deadline = LlmError::DeadlineExceeded {
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(FailureKind::classify(&deadline), FailureKind::DeadlineExceeded);
        assert_eq!(
            FailureKind::classify(&LlmError::malformed("bad frame")),
            FailureKind::StreamMalformed
        );

        let rate_limited = LlmError::Api {
            message: "Rate limit reached".to_string(),
            status_code: Some(429),
            source: None,
        };
        assert_eq!(FailureKind::classify(&rate_limited), FailureKind::ProviderError);

        // Surfaces only when the fallback could not absorb it.
        let capability = LlmError::CapabilityUnavailable {
            message: "unknown field".to_string(),
        };
        assert_eq!(FailureKind::classify(&capability), FailureKind::ProviderError);
    }

    #[test]
    fn test_failure_display_names_kind_and_mode() {
        let failure = CompletionFailure::new(
            LlmError::malformed("missing type"),
            "par".to_string(),
            ApiMode::New,
            false,
        );
        let rendered = failure.to_string();
        assert!(rendered.contains("malformed stream"));
        assert!(rendered.contains("new mode"));
    }
}
