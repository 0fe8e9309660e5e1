pub mod error;
pub mod http;
pub mod sse;
pub mod traits;
pub mod types;

pub use error::LlmError;
pub use http::{HttpClient, HttpClientConfig};
pub use sse::{SseDecoder, SseEvent, StreamParser, parse_event_stream};
pub use traits::{CompletionProvider, DeltaSink};
pub use types::{
    Capabilities, ChatRole, CompletionRequest, ConversationContext, EventStream,
    GenerationConfig, LanguageModelUsage, Message, ProviderEvent, StreamDelta,
};
