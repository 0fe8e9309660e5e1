//! Legacy chat-completions API: role-tagged message lists in, content chunks out.

pub mod client;
pub(crate) mod request;
pub(crate) mod stream;

pub use client::{CompletionClient, CompletionProviderConfig};
pub use stream::ChatChunkParser;
