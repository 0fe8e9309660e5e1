//! Client for the chat-completions streaming shape.

use crate::core::{CompletionRequest, EventStream, HttpClient, HttpClientConfig, LlmError};

use super::{request, stream::ChatChunkParser};

/// Configuration trait for providers exposing the chat-completions API.
pub trait CompletionProviderConfig {
    /// Full URL of the chat-completions endpoint.
    fn completions_url(&self, model: &str) -> String;

    /// Authentication header as (header_name, header_value) tuple
    fn auth_header(&self) -> (String, String);

    /// Additional headers to include with each request
    fn extra_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Ask for a trailing usage chunk via `stream_options`.
    fn stream_usage(&self) -> bool {
        false
    }

    fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig::default()
    }
}

/// Streams chat completions for any [`CompletionProviderConfig`].
pub struct CompletionClient<P: CompletionProviderConfig> {
    pub config: P,
    http: HttpClient,
}

impl<P: CompletionProviderConfig> CompletionClient<P> {
    pub fn new(config: P) -> Result<Self, LlmError> {
        let http = HttpClient::new(&config.http_config())?;
        Ok(Self { config, http })
    }

    /// Open the stream; the returned events end with exactly one `Completed`
    /// or an error.
    #[tracing::instrument(
        name = "chat_completions_stream",
        skip(self, request),
        fields(model = %request.model, messages = request.context.messages().len()),
        err
    )]
    pub async fn open_stream(&self, request: &CompletionRequest) -> Result<EventStream, LlmError> {
        let url = self.config.completions_url(&request.model);
        let body = request::build_request(request, self.config.stream_usage());

        let mut headers = vec![self.config.auth_header()];
        headers.extend(self.config.extra_headers());

        let response = self.http.post_stream(&url, &headers, &body).await?;

        Ok(crate::core::parse_event_stream(
            response.bytes_stream(),
            ChatChunkParser::new(),
        ))
    }
}
