use serde::Serialize;

use crate::core::{ChatRole, CompletionRequest};

#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub model: String,

    pub messages: Vec<ChatMessage>,

    /// Always `true`; this crate only consumes streamed completions.
    pub stream: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Alter this or temperature but not both.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// End-user identifier for abuse monitoring
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: ChatMessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatMessageRole {
    System,
    User,
    Assistant,
}

impl From<ChatRole> for ChatMessageRole {
    fn from(value: ChatRole) -> Self {
        match value {
            ChatRole::System => ChatMessageRole::System,
            ChatRole::User => ChatMessageRole::User,
            ChatRole::Assistant => ChatMessageRole::Assistant,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamOptions {
    pub include_usage: bool,
}

/// Build a chat-completions request carrying the full message list.
pub(crate) fn build_request(request: &CompletionRequest, include_usage: bool) -> Request {
    let messages = request
        .context
        .messages()
        .iter()
        .map(|m| ChatMessage {
            role: m.role.into(),
            content: m.content.clone(),
        })
        .collect();

    Request {
        model: request.model.clone(),
        messages,
        stream: true,
        stream_options: include_usage.then_some(StreamOptions {
            include_usage: true,
        }),
        max_tokens: request.generation.max_tokens,
        temperature: request.generation.temperature,
        top_p: request.generation.top_p,
        user: request.context.user().map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConversationContext, GenerationConfig, Message};

    #[test]
    fn test_request_keeps_every_message_in_order() {
        let request = CompletionRequest {
            model: "gpt-4o-mini".to_string(),
            context: ConversationContext::new(vec![
                Message::system("Be brief."),
                Message::user("ping"),
                Message::assistant("pong"),
            ])
            .with_user("U123"),
            generation: GenerationConfig {
                temperature: Some(0.2),
                ..Default::default()
            },
        };

        let value = serde_json::to_value(build_request(&request, true)).unwrap();

        assert_eq!(value["stream"], true);
        assert_eq!(value["stream_options"]["include_usage"], true);
        assert_eq!(value["user"], "U123");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "ping");
        assert_eq!(value["messages"][2]["role"], "assistant");
        assert!(value.get("max_tokens").is_none());
    }

    #[test]
    fn test_stream_options_omitted_without_usage_support() {
        let request = CompletionRequest {
            model: "gpt-4o-mini".to_string(),
            context: ConversationContext::new(vec![Message::user("ping")]),
            generation: GenerationConfig::default(),
        };

        let value = serde_json::to_value(build_request(&request, false)).unwrap();
        assert!(value.get("stream_options").is_none());
        assert!(value.get("user").is_none());
    }
}
