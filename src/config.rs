use crate::error::{Error, Result};
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvKey {
    AnthropicApiKey,
    OpenAiApiKey,
    ReplicateApiToken,
    ProjectId,
    LocationId,
    ModelId,
    ApiEndpoint,
    TokenUrl,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::AnthropicApiKey => "ANTHROPIC_API_KEY",
            EnvKey::OpenAiApiKey => "OPENAI_API_KEY",
            EnvKey::ReplicateApiToken => "REPLICATE_API_TOKEN",
            EnvKey::ProjectId => "PROJECT_ID",
            EnvKey::LocationId => "LOCATION_ID",
            EnvKey::ModelId => "MODEL_ID",
            EnvKey::ApiEndpoint => "API_ENDPOINT",
            EnvKey::TokenUrl => "TOKEN_URL",
        }
    }
}

/// Settings for the long-running-operation video endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexConfig {
    pub project_id: String,
    pub location_id: String,
    pub model_id: String,
    pub api_endpoint: String,
    pub token_url: String,
}

/// Credentials and endpoints gathered from the environment.
///
/// Every field is optional here; the accessors fail with [`Error::Config`]
/// when the pipeline actually needs a value that was not provided.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub anthropic_key: Option<String>,
    pub openai_key: Option<String>,
    pub replicate_token: Option<String>,
    pub project_id: Option<String>,
    pub location_id: Option<String>,
    pub model_id: Option<String>,
    pub api_endpoint: Option<String>,
    pub token_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key.as_str()).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(EnvKey) -> Option<String>,
    {
        let get = |key| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            anthropic_key: get(EnvKey::AnthropicApiKey),
            openai_key: get(EnvKey::OpenAiApiKey),
            replicate_token: get(EnvKey::ReplicateApiToken),
            project_id: get(EnvKey::ProjectId),
            location_id: get(EnvKey::LocationId),
            model_id: get(EnvKey::ModelId),
            api_endpoint: get(EnvKey::ApiEndpoint),
            token_url: get(EnvKey::TokenUrl),
        }
    }

    pub fn vertex(&self) -> Result<VertexConfig> {
        let mut missing = Vec::new();
        let mut need = |value: &Option<String>, key: EnvKey| match value {
            Some(v) => v.clone(),
            None => {
                missing.push(key.as_str());
                String::new()
            }
        };

        let cfg = VertexConfig {
            project_id: need(&self.project_id, EnvKey::ProjectId),
            location_id: need(&self.location_id, EnvKey::LocationId),
            model_id: need(&self.model_id, EnvKey::ModelId),
            api_endpoint: need(&self.api_endpoint, EnvKey::ApiEndpoint),
            token_url: need(&self.token_url, EnvKey::TokenUrl),
        };

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing environment variables: {}",
                missing.join(", ")
            )));
        }
        Ok(cfg)
    }

    pub fn replicate_token(&self) -> Result<&str> {
        required(&self.replicate_token, EnvKey::ReplicateApiToken)
    }

    pub fn anthropic_key(&self) -> Result<&str> {
        required(&self.anthropic_key, EnvKey::AnthropicApiKey)
    }

    pub fn openai_key(&self) -> Result<&str> {
        required(&self.openai_key, EnvKey::OpenAiApiKey)
    }
}

fn required(value: &Option<String>, key: EnvKey) -> Result<&str> {
    value
        .as_deref()
        .ok_or_else(|| Error::Config(format!("{} is not set", key.as_str())))
}
