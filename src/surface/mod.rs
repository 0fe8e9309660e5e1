//! Display side of a streamed reply.
//!
//! A [`ChatSurface`] is the chat platform's work-in-progress message; the
//! [`ReplyWriter`] feeds it from the bridge's deltas and writes the final
//! text, notice and overflow messages once the completion ends.

mod reply;
mod split;

pub use reply::{ReplyConfig, ReplyWriter};
pub use split::split_long_message;

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a chat platform while writing a reply.
#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("Chat API error: {0}")]
    Api(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Network error: {0}")]
    Network(String),
}

/// A reply message in a chat thread that can be rewritten in place.
#[async_trait]
pub trait ChatSurface: Send + Sync {
    /// Replace the text of the work-in-progress reply.
    async fn update(&self, text: &str) -> Result<(), SurfaceError>;

    /// Post an additional message in the same thread.
    async fn post(&self, text: &str) -> Result<(), SurfaceError>;
}
