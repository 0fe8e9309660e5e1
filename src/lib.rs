//! # chatrelay
//!
//! Deadline-bounded streaming between chat threads and OpenAI-compatible completion APIs.
//!
//! The [`CompletionBridge`] picks between the chat-completions API and the responses API,
//! falls back to chat completions once when the responses API is unavailable, and
//! forwards paced text deltas to a [`DeltaSink`] such as a [`ReplyWriter`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatrelay::{
//!     BridgeConfig, CompletionBridge, ConversationContext, Message, OpenAiClient, OpenAiConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OpenAiClient::new(OpenAiConfig::from_env()?)?;
//!     let config = BridgeConfig::from_env()?;
//!     let deadline = config.deadline();
//!     let bridge = CompletionBridge::new(client, config)?;
//!
//!     let context = ConversationContext::new(vec![
//!         Message::system("You are a helpful assistant."),
//!         Message::user("ping"),
//!     ]);
//!
//!     let mut deltas = Vec::new();
//!     let completion = bridge.complete(&context, deadline, &mut deltas).await?;
//!     println!("{} ({} updates)", completion.text, deltas.len());
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod completions;
pub mod config;
pub mod core;
pub mod provider;
pub mod responses;
pub mod surface;

pub use bridge::{
    ApiMode, Completion, CompletionBridge, CompletionFailure, CompletionResult, FailureKind,
};
pub use config::{BridgeConfig, PacingConfig};
pub use self::core::{
    Capabilities, ChatRole, CompletionProvider, ConversationContext, DeltaSink, LlmError,
    Message, StreamDelta,
};
pub use provider::{ApiFlavor, OpenAiClient, OpenAiConfig};
pub use surface::{ChatSurface, ReplyConfig, ReplyWriter, SurfaceError, split_long_message};
