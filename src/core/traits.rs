use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    error::LlmError,
    types::{Capabilities, ConversationContext, EventStream, StreamDelta},
};

/// A client able to stream completions in one or both API shapes.
///
/// Model name and generation parameters belong to the client; callers only
/// supply the conversation.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Feature set advertised by this client. Must not perform I/O.
    fn capabilities(&self) -> Capabilities;

    /// Open a chat-completions stream (role-tagged message list, content chunks).
    async fn stream_legacy(&self, context: &ConversationContext)
    -> Result<EventStream, LlmError>;

    /// Open a responses-API stream (instructions plus input, named events).
    async fn stream_responses(
        &self,
        context: &ConversationContext,
    ) -> Result<EventStream, LlmError>;
}

/// Receives coalesced deltas in order while a completion streams.
#[async_trait]
pub trait DeltaSink: Send {
    async fn on_delta(&mut self, delta: &StreamDelta);
}

#[async_trait]
impl DeltaSink for Vec<StreamDelta> {
    async fn on_delta(&mut self, delta: &StreamDelta) {
        self.push(delta.clone());
    }
}

#[async_trait]
impl DeltaSink for mpsc::Sender<StreamDelta> {
    async fn on_delta(&mut self, delta: &StreamDelta) {
        if self.send(delta.clone()).await.is_err() {
            tracing::debug!(sequence = delta.sequence, "Delta receiver dropped");
        }
    }
}
