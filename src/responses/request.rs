use serde::Serialize;

use crate::core::{ChatRole, CompletionRequest};

#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub model: String,

    pub input: Vec<InputMessage>,

    /// Flattened system messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Always `true`; this crate only consumes streamed responses.
    pub stream: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// Conversation history is owned by the caller, never by the provider.
    pub store: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Alter this or temperature but not both.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Used to boost cache hit rates by better bucketing similar requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct InputMessage {
    pub role: InputMessageRole,
    pub content: String,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputMessageRole {
    User,
    Assistant,
}

/// Build a responses request: system messages become `instructions`, every
/// other turn goes to `input` in order.
pub(crate) fn build_request(request: &CompletionRequest) -> Request {
    let input = request
        .context
        .turns()
        .map(|m| InputMessage {
            role: match m.role {
                ChatRole::Assistant => InputMessageRole::Assistant,
                _ => InputMessageRole::User,
            },
            content: m.content.clone(),
        })
        .collect();

    Request {
        model: request.model.clone(),
        input,
        instructions: request.context.instructions(),
        stream: true,
        max_output_tokens: request.generation.max_tokens,
        store: false,
        temperature: request.generation.temperature,
        top_p: request.generation.top_p,
        user: request.context.user().map(str::to_string),
    }
}
