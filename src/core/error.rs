use std::time::Duration;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("API error: {message}")]
    Api {
        message: String,
        status_code: Option<u16>,
        #[source]
        source: Option<BoxError>,
    },

    /// The provider or client does not support the requested API shape.
    #[error("Capability unavailable: {message}")]
    CapabilityUnavailable { message: String },

    #[error("Malformed stream: {message}")]
    StreamMalformed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Parse error: {message}")]
    Parse {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("Deadline exceeded after {elapsed:?}")]
    DeadlineExceeded { elapsed: Duration },
}

impl LlmError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        LlmError::StreamMalformed {
            message: message.into(),
            source: None,
        }
    }

    pub fn is_capability_unavailable(&self) -> bool {
        matches!(self, LlmError::CapabilityUnavailable { .. })
    }
}
