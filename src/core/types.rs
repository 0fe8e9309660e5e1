use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;

use super::error::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: ChatRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Immutable snapshot of a conversation thread.
///
/// Cloning is cheap: the messages live in a shared slice, so the same context
/// can be handed to a fallback attempt or another task without copying.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationContext {
    messages: Arc<[Message]>,
    user: Option<String>,
}

impl ConversationContext {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages: messages.into(),
            user: None,
        }
    }

    /// Attach the end-user identifier forwarded to the provider.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// All system messages joined by a blank line, or `None` if there are none.
    pub fn instructions(&self) -> Option<String> {
        let system: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect();

        if system.is_empty() {
            None
        } else {
            Some(system.join("\n\n"))
        }
    }

    /// Non-system messages in conversation order.
    pub fn turns(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role != ChatRole::System)
    }
}

impl From<Vec<Message>> for ConversationContext {
    fn from(messages: Vec<Message>) -> Self {
        Self::new(messages)
    }
}

/// Configuration for text generation parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationConfig {
    /// Maximum number of tokens to generate
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter (0.0 to 1.0)
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LanguageModelUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Provider-agnostic request handed to either API shape.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub context: ConversationContext,
    pub generation: GenerationConfig,
}

/// What a provider advertises about itself, queried once at bridge construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// The client can speak the responses API.
    pub responses_api: bool,
    /// Legacy streams can carry a trailing usage chunk.
    pub stream_usage: bool,
}

/// Provider-neutral event decoded from either streaming shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    TextDelta(String),
    Completed {
        response_id: Option<String>,
        model: Option<String>,
        usage: Option<LanguageModelUsage>,
    },
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<ProviderEvent, LlmError>> + Send>>;

/// One coalesced piece of generated text forwarded toward the display surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDelta {
    /// Zero-based ordinal among the deltas forwarded by one invocation.
    pub sequence: u64,
    /// Byte offset of `text` within the accumulated reply.
    pub offset: usize,
    pub text: String,
}
