use super::openai::trim_copy_utf8_safe;
use super::snippet;
use crate::error::{Error, Result};
use crate::prompt::PromptModel;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2500;
const TEMPERATURE: f32 = 0.7;
const MAX_ARTICLE_BYTES: usize = 320_000;

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

fn first_text(resp: MessagesResponse) -> Option<String> {
    resp.content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
}

/// Anthropic Messages API client.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(client: Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl PromptModel for AnthropicClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
            "system": system,
            "messages": [
                {"role": "user", "content": trim_copy_utf8_safe(user, MAX_ARTICLE_BYTES)},
            ],
        });

        let resp = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .timeout(std::time::Duration::from_secs(600))
            .send()
            .await?;

        let status = resp.status();
        let raw = resp.text().await?;

        if status.as_u16() == 401 {
            return Err(Error::Auth("Anthropic rejected ANTHROPIC_API_KEY".to_string()));
        }
        if !status.is_success() {
            warn!("Anthropic HTTP {}: {}", status.as_u16(), snippet(&raw, 800));
            return Err(Error::Fetch(format!("Anthropic answered HTTP {}", status.as_u16())));
        }

        let parsed: MessagesResponse = serde_json::from_str(&raw)
            .map_err(|e| Error::Fetch(format!("invalid JSON from Anthropic: {}", e)))?;
        let text = first_text(parsed)
            .ok_or_else(|| Error::Fetch("Anthropic response had no text block".to_string()))?;

        info!("Anthropic prompt received: {} chars", text.len());
        Ok(text)
    }
}
