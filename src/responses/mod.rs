//! Responses API: flattened instructions and input in, named events out.

pub mod client;
pub(crate) mod request;
pub(crate) mod stream;

pub use client::{ResponsesClient, ResponsesProviderConfig};
pub use stream::ResponseEventParser;
