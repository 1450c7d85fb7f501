use super::snippet;
use crate::error::{Error, Result};
use crate::prompt::PromptModel;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";
const MAX_ARTICLE_BYTES: usize = 320_000;

pub(crate) fn trim_copy_utf8_safe(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }

    let mut cut = max_bytes.min(input.len());
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    input[..cut].to_string()
}

fn openai_extract_output_text(resp_json: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(resp_json).ok()?;

    if let Some(err) = root.get("error").filter(|e| !e.is_null()) {
        if let Some(msg) = err.get("message").and_then(|v| v.as_str()) {
            warn!("OpenAI error message: {}", msg);
        }
        if let Some(code) = err.get("code").and_then(|v| v.as_str()) {
            warn!("OpenAI error code: {}", code);
        }
        return None;
    }

    let output = root.get("output")?.as_array()?;
    for item in output {
        let content = item.get("content").and_then(|v| v.as_array());
        if let Some(content) = content {
            for entry in content {
                let typ = entry.get("type").and_then(|v| v.as_str());
                let text = entry.get("text").and_then(|v| v.as_str());
                if typ == Some("output_text") {
                    if let Some(text) = text {
                        return Some(text.to_string());
                    }
                }
            }
        }
    }

    None
}

/// OpenAI Responses API client.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(client: Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl PromptModel for OpenAiClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "input": [
                {"role": "system", "content": system},
                {"role": "user", "content": trim_copy_utf8_safe(user, MAX_ARTICLE_BYTES)},
            ],
        });

        let resp = self
            .client
            .post(RESPONSES_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(std::time::Duration::from_secs(600))
            .send()
            .await?;

        let status = resp.status();
        let raw = resp.text().await?;

        if status.as_u16() == 401 {
            return Err(Error::Auth("OpenAI rejected OPENAI_API_KEY".to_string()));
        }
        if !status.is_success() {
            warn!("OpenAI HTTP {}", status.as_u16());
            warn!("OpenAI raw body: {}", snippet(&raw, 800));
            return Err(Error::Fetch(format!("OpenAI answered HTTP {}", status.as_u16())));
        }

        let text = openai_extract_output_text(&raw).ok_or_else(|| {
            warn!("OpenAI raw body: {}", snippet(&raw, 800));
            Error::Fetch("OpenAI response had no output text".to_string())
        })?;

        info!("OpenAI prompt received: {} chars", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_output_text() {
        let raw = r#"{
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "<prompts>a shot</prompts>"}
                ]}
            ]
        }"#;
        assert_eq!(
            openai_extract_output_text(raw).as_deref(),
            Some("<prompts>a shot</prompts>")
        );
    }

    #[test]
    fn error_body_has_no_text() {
        let raw = r#"{"error": {"message": "context length exceeded", "code": "context_length_exceeded"}}"#;
        assert_eq!(openai_extract_output_text(raw), None);
        assert_eq!(openai_extract_output_text("not json"), None);
    }

    #[test]
    fn trimming_respects_char_boundaries() {
        assert_eq!(trim_copy_utf8_safe("héllo", 2), "h");
        assert_eq!(trim_copy_utf8_safe("héllo", 3), "hé");
        assert_eq!(trim_copy_utf8_safe("abc", 10), "abc");
    }
}
