use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ChatSurface, SurfaceError, split_long_message};
use crate::bridge::{CompletionResult, FailureKind};
use crate::core::{DeltaSink, StreamDelta};

/// Texts and limits used when rendering a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyConfig {
    /// Longest message the platform accepts, in characters.
    pub max_message_length: usize,
    /// Appended to the reply while it is still streaming.
    pub in_progress_marker: String,
    /// Appended to partial text when the deadline passes.
    pub timeout_notice: String,
    /// Appended to partial text on any other failure.
    pub error_notice: String,
    /// Shown instead of an empty reply.
    pub placeholder: String,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            max_message_length: 2000,
            in_progress_marker: " ...".to_string(),
            timeout_notice: ":warning: Apologies! It seems that OpenAI didn't respond within \
                             the time limit. Please try your question again later. :bow:"
                .to_string(),
            error_notice: ":warning: Failed to get a reply. Please try again later.".to_string(),
            placeholder: ":hourglass_flowing_sand: Processing...".to_string(),
        }
    }
}

impl ReplyConfig {
    pub fn with_max_message_length(mut self, max_message_length: usize) -> Self {
        self.max_message_length = max_message_length;
        self
    }

    pub fn with_in_progress_marker(mut self, marker: impl Into<String>) -> Self {
        self.in_progress_marker = marker.into();
        self
    }

    pub fn with_timeout_notice(mut self, notice: impl Into<String>) -> Self {
        self.timeout_notice = notice.into();
        self
    }

    pub fn with_error_notice(mut self, notice: impl Into<String>) -> Self {
        self.error_notice = notice.into();
        self
    }

    /// Shown when a completion finishes without any text.
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }
}

/// Renders a streamed completion onto a [`ChatSurface`].
///
/// Used as the bridge's [`DeltaSink`]: every forwarded delta rewrites the
/// work-in-progress message. Call [`finish`](Self::finish) with the terminal
/// result to write the final text.
pub struct ReplyWriter<S> {
    surface: S,
    config: ReplyConfig,
    text: String,
    rendered: String,
}

impl<S: ChatSurface> ReplyWriter<S> {
    pub fn new(surface: S) -> Self {
        Self::with_config(surface, ReplyConfig::default())
    }

    pub fn with_config(surface: S, config: ReplyConfig) -> Self {
        Self {
            surface,
            config,
            text: String::new(),
            rendered: String::new(),
        }
    }

    /// Text received so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Write the terminal state of the reply.
    ///
    /// Partial text stays in place on failure, followed by a notice. Provider
    /// error details are never shown. Text beyond the platform limit is
    /// posted as follow-up messages.
    pub async fn finish(&mut self, result: &CompletionResult) -> Result<(), SurfaceError> {
        let body = match result {
            Ok(completion) => completion.text.clone(),
            Err(failure) => {
                let notice = match failure.kind {
                    FailureKind::DeadlineExceeded => &self.config.timeout_notice,
                    FailureKind::ProviderError | FailureKind::StreamMalformed => {
                        &self.config.error_notice
                    }
                };
                if failure.partial_text.trim().is_empty() {
                    notice.clone()
                } else {
                    format!("{}\n\n{notice}", failure.partial_text)
                }
            }
        };

        let body = if body.trim().is_empty() {
            self.config.placeholder.clone()
        } else {
            body
        };

        let mut chunks = split_long_message(&body, self.config.max_message_length).into_iter();
        if let Some(first) = chunks.next() {
            self.surface.update(&first).await?;
            self.rendered = first;
        }
        for chunk in chunks {
            self.surface.post(&chunk).await?;
        }

        Ok(())
    }

    fn preview(&self) -> String {
        let marker = &self.config.in_progress_marker;
        let limit = self.config.max_message_length;

        if self.text.chars().count() + marker.chars().count() <= limit {
            return format!("{}{marker}", self.text);
        }

        let budget = limit.saturating_sub(marker.chars().count());
        split_long_message(&self.text, budget)
            .into_iter()
            .next()
            .unwrap_or_default()
    }
}

#[async_trait]
impl<S: ChatSurface> DeltaSink for ReplyWriter<S> {
    async fn on_delta(&mut self, delta: &StreamDelta) {
        self.text.push_str(&delta.text);

        let preview = self.preview();
        if preview == self.rendered {
            debug!(sequence = delta.sequence, "Reply unchanged, skipping update");
            return;
        }

        match self.surface.update(&preview).await {
            Ok(()) => self.rendered = preview,
            Err(error) => {
                warn!(sequence = delta.sequence, error = %error, "Failed to update reply");
            }
        }
    }
}
