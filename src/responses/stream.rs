//! Parser for responses-API streaming events.
//!
//! Only the text delta, refusal delta, terminal and error events are
//! interpreted. Every other event type is skipped so new provider events do
//! not break existing clients.

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::core::{
    LanguageModelUsage, LlmError, ProviderEvent, SseEvent, StreamParser, http::ApiErrorBody,
    http::classify_error_body,
};

mod event_type {
    pub const OUTPUT_TEXT_DELTA: &str = "response.output_text.delta";
    pub const REFUSAL_DELTA: &str = "response.refusal.delta";
    pub const COMPLETED: &str = "response.completed";
    pub const DONE: &str = "response.done";
    pub const INCOMPLETE: &str = "response.incomplete";
    pub const FAILED: &str = "response.failed";
    pub const ERROR: &str = "error";
}

/// Only the type is read up front; payload fields of unknown events are never typed.
#[derive(Debug, Deserialize)]
struct EventHeader {
    #[serde(default, rename = "type")]
    r#type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeltaEvent {
    #[serde(default)]
    delta: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseEvent {
    #[serde(default)]
    response: Option<ResponseSnapshot>,
}

#[derive(Debug, Deserialize)]
struct ErrorEvent {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    param: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseSnapshot {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
    #[serde(default)]
    incomplete_details: Option<IncompleteDetails>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct IncompleteDetails {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default)]
pub struct ResponseEventParser {
    completed: bool,
}

impl ResponseEventParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn completed_event(&mut self, response: Option<ResponseSnapshot>) -> ProviderEvent {
        self.completed = true;
        let (response_id, model, usage) = match response {
            Some(r) => (r.id, r.model, r.usage),
            None => (None, None, None),
        };

        ProviderEvent::Completed {
            response_id,
            model,
            usage: usage.map(|u| LanguageModelUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.total_tokens,
            }),
        }
    }
}

impl StreamParser for ResponseEventParser {
    fn feed(&mut self, event: SseEvent) -> Result<Vec<ProviderEvent>, LlmError> {
        if self.completed {
            return Ok(Vec::new());
        }

        let header: EventHeader = payload(&event.data)?;
        let Some(kind) = header.r#type.or(event.event) else {
            return Err(LlmError::malformed("Responses stream event has no type"));
        };

        match kind.as_str() {
            event_type::OUTPUT_TEXT_DELTA | event_type::REFUSAL_DELTA => {
                match payload::<DeltaEvent>(&event.data)?.delta {
                    Some(delta) if delta.is_empty() => Ok(Vec::new()),
                    Some(delta) => Ok(vec![ProviderEvent::TextDelta(delta)]),
                    None => Err(LlmError::malformed(format!("{kind} event without delta"))),
                }
            }
            event_type::COMPLETED | event_type::DONE => {
                let response = payload::<ResponseEvent>(&event.data)?.response;
                Ok(vec![self.completed_event(response)])
            }
            event_type::INCOMPLETE => {
                let response = payload::<ResponseEvent>(&event.data)?.response;
                let reason = response
                    .as_ref()
                    .and_then(|r| r.incomplete_details.as_ref())
                    .and_then(|d| d.reason.clone());
                tracing::warn!(reason = ?reason, "Response finished incomplete");
                Ok(vec![self.completed_event(response)])
            }
            event_type::FAILED => {
                let error = payload::<ResponseEvent>(&event.data)?
                    .response
                    .and_then(|r| r.error)
                    .unwrap_or_default();
                Err(classify_error_body(&error))
            }
            event_type::ERROR => {
                let raw: ErrorEvent = payload(&event.data)?;
                Err(classify_error_body(&ApiErrorBody {
                    message: raw.message,
                    r#type: None,
                    code: raw.code,
                    param: raw.param,
                }))
            }
            other => {
                tracing::trace!(event_type = other, "Ignoring responses stream event");
                Ok(Vec::new())
            }
        }
    }

    fn finish(&mut self) -> Result<Vec<ProviderEvent>, LlmError> {
        if self.completed {
            Ok(Vec::new())
        } else {
            Err(LlmError::malformed(
                "Responses stream ended before response.completed",
            ))
        }
    }
}

fn payload<T: DeserializeOwned>(data: &str) -> Result<T, LlmError> {
    serde_json::from_str(data).map_err(|e| LlmError::StreamMalformed {
        message: "Unexpected responses stream event".to_string(),
        source: Some(Box::new(e)),
    })
}
