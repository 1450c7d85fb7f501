//! Turning article text into a movie prompt with a chat-completion model.

use crate::api::{anthropic::AnthropicClient, openai::OpenAiClient};
use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::info;

pub const DEFAULT_PROMPT_MODEL: &str = "claude-sonnet-4-20250514";

pub const DEFAULT_MASTER_PROMPT: &str = "You are a film director adapting an encyclopedia article \
into a short cinematic video. Read the article the user provides and pick the single most \
visual, dramatic moment or idea in it. Describe one continuous shot: setting, subjects, \
camera movement, lighting, mood and sound. Stay faithful to the facts of the article, avoid \
on-screen text and real people's likenesses, and keep it to one paragraph.\n\n\
Return the final video prompt wrapped in <prompts></prompts> tags. Anything outside the tags \
is ignored.";

static PROMPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<prompts>(.*?)</prompts>").expect("prompt block pattern"));

/// Returns the trimmed text between the first `<prompts>` and `</prompts>`.
pub fn extract_marked_prompt(text: &str) -> Option<&str> {
    PROMPT_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

/// A chat-completion LLM taking one system and one user message.
#[async_trait]
pub trait PromptModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Picks the client for `model_id`: `claude*` goes to Anthropic, anything
/// else to OpenAI.
pub fn prompt_model_for(model_id: &str, cfg: &Config, client: Client) -> Result<Arc<dyn PromptModel>> {
    if model_id.starts_with("claude") {
        let key = cfg.anthropic_key()?;
        Ok(Arc::new(AnthropicClient::new(client, key, model_id)))
    } else {
        let key = cfg.openai_key()?;
        Ok(Arc::new(OpenAiClient::new(client, key, model_id)))
    }
}

/// What the generated prompt should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptRequest {
    pub duration_secs: u32,
    /// More than one asks for a multi-episode script.
    pub episodes: usize,
}

pub struct PromptGenerator {
    model: Arc<dyn PromptModel>,
    master_prompt: String,
}

impl PromptGenerator {
    pub fn new(model: Arc<dyn PromptModel>, master_prompt: impl Into<String>) -> Self {
        Self {
            model,
            master_prompt: master_prompt.into(),
        }
    }

    pub fn with_default_prompt(model: Arc<dyn PromptModel>) -> Self {
        Self::new(model, DEFAULT_MASTER_PROMPT)
    }

    pub fn system_prompt(&self, request: &PromptRequest) -> String {
        let mut system = self.master_prompt.trim_end().to_string();
        system.push_str(&format!(
            "\n\nThe video is {} seconds long.",
            request.duration_secs
        ));
        if request.episodes > 1 {
            system.push_str(&format!(
                "\n\nWrite a mini-series of exactly {n} episodes. Inside the <prompts> block, start \
                 each episode on its own line with \"Episode <number>:\", numbered 0 to {last}, \
                 followed by that episode's video prompt. Each episode is rendered as a separate \
                 {d}-second clip, so every episode must stand on its own visually.",
                n = request.episodes,
                last = request.episodes - 1,
                d = request.duration_secs,
            ));
        }
        system
    }

    pub async fn generate(&self, article_markdown: &str, request: &PromptRequest) -> Result<String> {
        if article_markdown.trim().is_empty() {
            return Err(Error::Config("article text is empty".to_string()));
        }

        info!(model = self.model.model_id(), "analyzing article for movie potential");
        let system = self.system_prompt(request);
        self.model.complete(&system, article_markdown).await
    }
}

pub async fn load_master_prompt(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .await
        .map_err(|e| Error::Config(format!("could not read master prompt {}: {}", path.display(), e)))
}

/// `<dir>/<Title>.md` → `<dir>/<Title>.movie_prompt.txt`
pub fn prompt_path_for(markdown: &Path) -> PathBuf {
    let stem = markdown
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    markdown.with_file_name(format!("{stem}.movie_prompt.txt"))
}

pub async fn save_prompt(prompt: &str, markdown: &Path) -> Result<PathBuf> {
    let path = prompt_path_for(markdown);
    fs::write(&path, prompt)
        .await
        .map_err(|e| Error::persist(&path, e))?;
    info!("movie prompt saved to {}", path.display());
    Ok(path)
}
