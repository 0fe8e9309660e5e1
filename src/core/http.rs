//! Shared HTTP client for both streaming shapes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::LlmError;

/// Error codes providers use to reject a parameter or value they do not know.
const CAPABILITY_ERROR_CODES: &[&str] = &[
    "unsupported_parameter",
    "unknown_parameter",
    "unsupported_value",
];

/// Lowercase message fragments that mark a request shape the server does not understand.
const CAPABILITY_ERROR_HINTS: &[&str] = &[
    "unrecognized request argument",
    "unknown parameter",
    "unknown field",
    "unsupported parameter",
    "is not supported",
];

/// Configuration for the HTTP transport
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Bound on establishing the connection. The response body is bounded by
    /// the caller's deadline instead, so no total timeout is set.
    pub connect_timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_agent: None,
        }
    }
}

/// Thin wrapper over `reqwest` that opens streaming POST requests.
///
/// Nothing is retried here: rate limits and server errors are reported to
/// the caller, which owns the retry policy.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &HttpClientConfig) -> Result<Self, LlmError> {
        let default_ua = format!("chatrelay/{}", env!("CARGO_PKG_VERSION"));
        let ua = config.user_agent.as_deref().unwrap_or(&default_ua);

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(ua)
            .build()
            .map_err(|e| {
                LlmError::Configuration(format!("Failed to build reqwest client: {e}"))
            })?;

        Ok(Self { client })
    }

    /// POST a JSON body and return the response once headers arrive.
    ///
    /// Non-success statuses are read in full and classified.
    #[tracing::instrument(
        name = "http_post_stream",
        skip(self, headers, body),
        fields(url = %url),
        err
    )]
    pub async fn post_stream<Req>(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Req,
    ) -> Result<reqwest::Response, LlmError>
    where
        Req: Serialize,
    {
        let mut req_builder = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(body);

        for (name, value) in headers {
            req_builder = req_builder.header(name, value);
        }

        let res = req_builder.send().await.map_err(|e| LlmError::Network {
            message: "Request failed".to_string(),
            source: Box::new(e),
        })?;

        let status = res.status();
        if status.is_success() {
            debug!(status = %status, "Stream opened");
            return Ok(res);
        }

        warn!(status = %status, "API returned error status");
        let error_text = res
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Err(classify_api_error(Some(status.as_u16()), &error_text))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

/// Error object shared by both APIs, in HTTP bodies and in-stream error events.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "type")]
    pub r#type: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    #[serde(default)]
    pub param: Option<String>,
}

impl ApiErrorBody {
    fn code_str(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    fn is_capability_error(&self) -> bool {
        if let Some(code) = self.code_str() {
            if CAPABILITY_ERROR_CODES.contains(&code.as_str()) {
                return true;
            }
        }

        let message = self.message.as_deref().unwrap_or_default().to_lowercase();
        CAPABILITY_ERROR_HINTS
            .iter()
            .any(|hint| message.contains(hint))
    }

    fn describe_or(&self, fallback: &str) -> String {
        let described = self.describe();
        if described.is_empty() {
            fallback.to_string()
        } else {
            described
        }
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(code) = self.code_str() {
            parts.push(format!("code={code}"));
        } else if let Some(kind) = &self.r#type {
            parts.push(format!("type={kind}"));
        }
        if let Some(param) = &self.param {
            parts.push(format!("param={param}"));
        }
        if let Some(message) = &self.message {
            parts.push(message.clone());
        }
        parts.join(" ")
    }
}

/// Classify an error body (HTTP or in-stream) into a capability or API error.
pub(crate) fn classify_api_error(status_code: Option<u16>, body: &str) -> LlmError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error)
        .or_else(|_| serde_json::from_str::<ApiErrorBody>(body));

    let endpoint_missing = matches!(status_code, Some(404 | 405 | 501));

    match parsed {
        Ok(error) if endpoint_missing || error.is_capability_error() => {
            LlmError::CapabilityUnavailable {
                message: error.describe_or(body),
            }
        }
        Ok(error) => LlmError::Api {
            message: error.describe_or(body),
            status_code,
            source: None,
        },
        Err(_) if endpoint_missing => LlmError::CapabilityUnavailable {
            message: format!("Endpoint unavailable (status {})", status_code.unwrap_or(0)),
        },
        Err(_) => LlmError::Api {
            message: body.to_string(),
            status_code,
            source: None,
        },
    }
}

/// Classify an already-parsed error object found inside a stream.
pub(crate) fn classify_error_body(error: &ApiErrorBody) -> LlmError {
    if error.is_capability_error() {
        LlmError::CapabilityUnavailable {
            message: error.describe(),
        }
    } else {
        LlmError::Api {
            message: error.describe(),
            status_code: None,
            source: None,
        }
    }
}
