//! Parser for streamed `chat.completion.chunk` objects.

use serde::Deserialize;

use crate::core::{
    LanguageModelUsage, LlmError, ProviderEvent, SseEvent, StreamParser, http::ApiErrorBody,
    http::classify_error_body,
};

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<ChunkUsage>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Tracks the metadata spread across chunks until `[DONE]` arrives.
#[derive(Debug, Default)]
pub struct ChatChunkParser {
    response_id: Option<String>,
    model: Option<String>,
    usage: Option<LanguageModelUsage>,
    finish_reason: Option<String>,
    completed: bool,
}

impl ChatChunkParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn completed_event(&mut self) -> ProviderEvent {
        self.completed = true;
        ProviderEvent::Completed {
            response_id: self.response_id.take(),
            model: self.model.take(),
            usage: self.usage.take(),
        }
    }
}

impl StreamParser for ChatChunkParser {
    fn feed(&mut self, event: SseEvent) -> Result<Vec<ProviderEvent>, LlmError> {
        if self.completed {
            return Ok(Vec::new());
        }

        let data = event.data.trim();
        if data == DONE_SENTINEL {
            return Ok(vec![self.completed_event()]);
        }

        let chunk: ChatChunk = serde_json::from_str(data).map_err(|e| LlmError::StreamMalformed {
            message: "Unexpected chat completion chunk".to_string(),
            source: Some(Box::new(e)),
        })?;

        if let Some(error) = &chunk.error {
            return Err(classify_error_body(error));
        }

        if self.response_id.is_none() {
            self.response_id = chunk.id;
        }
        if self.model.is_none() {
            self.model = chunk.model;
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(LanguageModelUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            });
        }

        let mut events = Vec::new();
        for choice in chunk.choices {
            if let Some(content) = choice.delta.and_then(|d| d.content) {
                if !content.is_empty() {
                    events.push(ProviderEvent::TextDelta(content));
                }
            }
            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
        }

        Ok(events)
    }

    fn finish(&mut self) -> Result<Vec<ProviderEvent>, LlmError> {
        if self.completed {
            return Ok(Vec::new());
        }

        // Some compatible servers close the stream without the sentinel.
        if self.finish_reason.is_some() {
            return Ok(vec![self.completed_event()]);
        }

        Err(LlmError::malformed(
            "Chat completion stream ended before completion",
        ))
    }
}
