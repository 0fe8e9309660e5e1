//! Client for the responses-API streaming shape.

use crate::core::{CompletionRequest, EventStream, HttpClient, HttpClientConfig, LlmError};

use super::{request, stream::ResponseEventParser};

/// Configuration trait for providers that use the OpenAI-style responses API
pub trait ResponsesProviderConfig {
    /// Full URL of the responses endpoint.
    fn responses_url(&self) -> String;

    /// Authentication header as (header_name, header_value) tuple
    fn auth_header(&self) -> (String, String);

    /// Additional headers to include with each request
    fn extra_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig::default()
    }
}

/// Streams responses for any [`ResponsesProviderConfig`].
pub struct ResponsesClient<P: ResponsesProviderConfig> {
    pub config: P,
    http: HttpClient,
}

impl<P: ResponsesProviderConfig> ResponsesClient<P> {
    pub fn new(config: P) -> Result<Self, LlmError> {
        let http = HttpClient::new(&config.http_config())?;
        Ok(Self { config, http })
    }

    #[tracing::instrument(
        name = "responses_stream",
        skip(self, request),
        fields(model = %request.model, messages = request.context.messages().len()),
        err
    )]
    pub async fn open_stream(&self, request: &CompletionRequest) -> Result<EventStream, LlmError> {
        let url = self.config.responses_url();
        let body = request::build_request(request);

        let mut headers = vec![self.config.auth_header()];
        headers.extend(self.config.extra_headers());

        let response = self.http.post_stream(&url, &headers, &body).await?;

        Ok(crate::core::parse_event_stream(
            response.bytes_stream(),
            ResponseEventParser::new(),
        ))
    }
}
