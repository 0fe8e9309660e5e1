//! Server-sent events decoding shared by both streaming shapes.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::BytesMut;
use futures::{Stream, StreamExt};

use super::error::LlmError;
use super::types::{EventStream, ProviderEvent};

/// A single dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if any.
    pub event: Option<String>,
    pub data: String,
}

/// Incremental decoder; chunk boundaries may fall anywhere, including inside
/// a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and collect every event completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, LlmError> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw = self.buffer.split_to(pos + 1);
            let line = std::str::from_utf8(&raw[..pos]).map_err(|e| LlmError::StreamMalformed {
                message: "Stream line is not valid UTF-8".to_string(),
                source: Some(Box::new(e)),
            })?;
            let line = line.strip_suffix('\r').unwrap_or(line);

            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }

        Ok(events)
    }

    /// Flush a trailing event not terminated by a blank line.
    pub fn finish(&mut self) -> Result<Option<SseEvent>, LlmError> {
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            let line = std::str::from_utf8(&rest).map_err(|e| LlmError::StreamMalformed {
                message: "Stream tail is not valid UTF-8".to_string(),
                source: Some(Box::new(e)),
            })?;
            let line = line.trim_end_matches('\r').to_string();
            if let Some(event) = self.process_line(&line) {
                return Ok(Some(event));
            }
        }

        Ok(self.dispatch())
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }

        // Comment / keep-alive
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id and retry are irrelevant for a single non-resumable request
            _ => {}
        }

        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }

        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent { event, data })
    }
}

/// Turns SSE events of one API shape into provider-neutral events.
pub trait StreamParser: Send {
    fn feed(&mut self, event: SseEvent) -> Result<Vec<ProviderEvent>, LlmError>;

    /// Called once when the byte stream ends.
    fn finish(&mut self) -> Result<Vec<ProviderEvent>, LlmError>;
}

struct ParseState<S, P> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    parser: P,
    queue: VecDeque<ProviderEvent>,
    pending_error: Option<LlmError>,
    done: bool,
}

impl<S, P: StreamParser> ParseState<S, P> {
    fn feed_all(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match self.parser.feed(event) {
                Ok(parsed) => self.queue.extend(parsed),
                Err(e) => {
                    self.fail(e);
                    return;
                }
            }
        }
    }

    fn fail(&mut self, error: LlmError) {
        self.pending_error = Some(error);
        self.done = true;
    }
}

/// Decode a byte stream with `parser`, yielding events in arrival order.
///
/// Events decoded before an error are yielded first; the stream ends after
/// the first error.
pub fn parse_event_stream<S, B, E, P>(bytes: S, parser: P) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::error::Error + Send + Sync + 'static,
    P: StreamParser + 'static,
{
    let state = ParseState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        parser,
        queue: VecDeque::new(),
        pending_error: None,
        done: false,
    };

    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.queue.pop_front() {
                return Some((Ok(event), state));
            }
            if let Some(error) = state.pending_error.take() {
                return Some((Err(error), state));
            }
            if state.done {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => match state.decoder.push(chunk.as_ref()) {
                    Ok(events) => state.feed_all(events),
                    Err(e) => state.fail(e),
                },
                Some(Err(e)) => state.fail(LlmError::Network {
                    message: "Failed to read response stream".to_string(),
                    source: Box::new(e),
                }),
                None => {
                    match state.decoder.finish() {
                        Ok(Some(event)) => state.feed_all(vec![event]),
                        Ok(None) => {}
                        Err(e) => state.fail(e),
                    }
                    if state.pending_error.is_none() {
                        match state.parser.finish() {
                            Ok(parsed) => state.queue.extend(parsed),
                            Err(e) => state.pending_error = Some(e),
                        }
                    }
                    state.done = true;
                }
            }
        }
    });

    Box::pin(stream)
}
