pub mod openai {
    pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
    pub const API_BASE: &str = "https://api.openai.com/v1";
    pub const CHAT_COMPLETIONS_ENDPOINT: &str = "/chat/completions";
    pub const RESPONSES_ENDPOINT: &str = "/responses";
    pub const ORGANIZATION_HEADER: &str = "OpenAI-Organization";
}

pub mod azure {
    pub const DEFAULT_API_VERSION: &str = "2024-10-21";
    pub const API_KEY_HEADER: &str = "api-key";
}

pub mod env {
    pub const API_KEY: &str = "OPENAI_API_KEY";
    pub const MODEL: &str = "OPENAI_MODEL";
    pub const API_BASE: &str = "OPENAI_API_BASE";
    pub const API_TYPE: &str = "OPENAI_API_TYPE";
    pub const API_VERSION: &str = "OPENAI_API_VERSION";
    pub const DEPLOYMENT_ID: &str = "OPENAI_DEPLOYMENT_ID";
    pub const ORG_ID: &str = "OPENAI_ORG_ID";
    pub const TEMPERATURE: &str = "OPENAI_TEMPERATURE";
    pub const RESPONSES_API: &str = "OPENAI_RESPONSES_API";
}
