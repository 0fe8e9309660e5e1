use async_trait::async_trait;

use crate::completions::{CompletionClient, CompletionProviderConfig};
use crate::config::{env_bool, env_parse, env_string};
use crate::core::{
    Capabilities, CompletionProvider, CompletionRequest, ConversationContext, EventStream,
    GenerationConfig, HttpClientConfig, LlmError,
};
use crate::provider::constants::{azure, env, openai};
use crate::responses::{ResponsesClient, ResponsesProviderConfig};

/// Which dialect of the OpenAI API the server speaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFlavor {
    OpenAi,
    Azure {
        deployment_id: String,
        api_version: String,
    },
}

/// OpenAI-specific configuration shared by both streaming clients
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub organization: Option<String>,
    pub flavor: ApiFlavor,
    /// Explicit override of whether the server speaks the responses API.
    /// `None` means detect from the flavor and base URL.
    pub responses_api: Option<bool>,
    /// Request a trailing usage chunk on chat-completions streams.
    pub stream_usage: bool,
    pub generation: GenerationConfig,
    pub http_config: HttpClientConfig,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: openai::API_BASE.to_string(),
            model: openai::DEFAULT_MODEL.to_string(),
            organization: None,
            flavor: ApiFlavor::OpenAi,
            responses_api: None,
            stream_usage: true,
            generation: GenerationConfig::default(),
            http_config: HttpClientConfig::default(),
        }
    }

    /// Read the provider settings from `OPENAI_*` environment variables.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = env_string(env::API_KEY).ok_or_else(|| {
            LlmError::Configuration(format!("{} not set.", env::API_KEY))
        })?;

        let mut config = Self::new(api_key);

        if let Some(model) = env_string(env::MODEL) {
            config.model = model;
        }
        if let Some(base_url) = env_string(env::API_BASE) {
            config.base_url = base_url;
        }
        config.organization = env_string(env::ORG_ID);
        config.responses_api = env_bool(env::RESPONSES_API)?;
        config.generation.temperature = env_parse(env::TEMPERATURE)?;

        match env_string(env::API_TYPE).as_deref() {
            None | Some("openai") => {}
            Some("azure") => {
                let deployment_id = env_string(env::DEPLOYMENT_ID).ok_or_else(|| {
                    LlmError::Configuration(format!(
                        "{} is required when {} is azure",
                        env::DEPLOYMENT_ID,
                        env::API_TYPE
                    ))
                })?;
                let api_version = env_string(env::API_VERSION)
                    .unwrap_or_else(|| azure::DEFAULT_API_VERSION.to_string());
                config.flavor = ApiFlavor::Azure {
                    deployment_id,
                    api_version,
                };
            }
            Some(other) => {
                return Err(LlmError::Configuration(format!(
                    "Unsupported {}: {other}",
                    env::API_TYPE
                )));
            }
        }

        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_azure(
        mut self,
        deployment_id: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        self.flavor = ApiFlavor::Azure {
            deployment_id: deployment_id.into(),
            api_version: api_version.into(),
        };
        self
    }

    pub fn with_responses_api(mut self, supported: bool) -> Self {
        self.responses_api = Some(supported);
        self
    }

    pub fn with_stream_usage(mut self, stream_usage: bool) -> Self {
        self.stream_usage = stream_usage;
        self
    }

    pub fn with_generation_config(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_http_config(mut self, config: HttpClientConfig) -> Self {
        self.http_config = config;
        self
    }

    /// Capability descriptor derived from configuration alone.
    ///
    /// Without an explicit override, only the official OpenAI endpoint is
    /// assumed to serve the responses API.
    pub fn capabilities(&self) -> Capabilities {
        let responses_api = self.responses_api.unwrap_or_else(|| {
            self.flavor == ApiFlavor::OpenAi
                && self.base_url.trim_end_matches('/') == openai::API_BASE
        });

        Capabilities {
            responses_api,
            stream_usage: self.stream_usage,
        }
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

impl CompletionProviderConfig for OpenAiConfig {
    fn completions_url(&self, _model: &str) -> String {
        match &self.flavor {
            ApiFlavor::OpenAi => format!("{}{}", self.base(), openai::CHAT_COMPLETIONS_ENDPOINT),
            ApiFlavor::Azure {
                deployment_id,
                api_version,
            } => format!(
                "{}/openai/deployments/{deployment_id}/chat/completions?api-version={api_version}",
                self.base()
            ),
        }
    }

    fn auth_header(&self) -> (String, String) {
        auth_header(self)
    }

    fn extra_headers(&self) -> Vec<(String, String)> {
        extra_headers(self)
    }

    fn stream_usage(&self) -> bool {
        self.stream_usage
    }

    fn http_config(&self) -> HttpClientConfig {
        self.http_config.clone()
    }
}

impl ResponsesProviderConfig for OpenAiConfig {
    fn responses_url(&self) -> String {
        match &self.flavor {
            ApiFlavor::OpenAi => format!("{}{}", self.base(), openai::RESPONSES_ENDPOINT),
            ApiFlavor::Azure { api_version, .. } => format!(
                "{}/openai/responses?api-version={api_version}",
                self.base()
            ),
        }
    }

    fn auth_header(&self) -> (String, String) {
        auth_header(self)
    }

    fn extra_headers(&self) -> Vec<(String, String)> {
        extra_headers(self)
    }

    fn http_config(&self) -> HttpClientConfig {
        self.http_config.clone()
    }
}

fn auth_header(config: &OpenAiConfig) -> (String, String) {
    match config.flavor {
        ApiFlavor::OpenAi => (
            "Authorization".to_string(),
            format!("Bearer {}", config.api_key),
        ),
        ApiFlavor::Azure { .. } => (azure::API_KEY_HEADER.to_string(), config.api_key.clone()),
    }
}

fn extra_headers(config: &OpenAiConfig) -> Vec<(String, String)> {
    match (&config.flavor, &config.organization) {
        (ApiFlavor::OpenAi, Some(org)) => {
            vec![(openai::ORGANIZATION_HEADER.to_string(), org.clone())]
        }
        _ => Vec::new(),
    }
}

/// OpenAI (or Azure OpenAI) client speaking both streaming shapes.
pub struct OpenAiClient {
    completions: CompletionClient<OpenAiConfig>,
    responses: ResponsesClient<OpenAiConfig>,
    capabilities: Capabilities,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let capabilities = config.capabilities();
        Ok(Self {
            completions: CompletionClient::new(config.clone())?,
            responses: ResponsesClient::new(config)?,
            capabilities,
        })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.completions.config
    }

    /// Build a provider-neutral request from this client's model and
    /// generation settings.
    pub fn request_for(&self, context: &ConversationContext) -> CompletionRequest {
        let config = self.config();
        CompletionRequest {
            model: config.model.clone(),
            context: context.clone(),
            generation: config.generation.clone(),
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn stream_legacy(&self, context: &ConversationContext) -> Result<EventStream, LlmError> {
        self.completions.open_stream(&self.request_for(context)).await
    }

    async fn stream_responses(
        &self,
        context: &ConversationContext,
    ) -> Result<EventStream, LlmError> {
        if !self.capabilities.responses_api {
            return Err(LlmError::CapabilityUnavailable {
                message: "Client does not advertise the responses API".to_string(),
            });
        }

        self.responses.open_stream(&self.request_for(context)).await
    }
}
