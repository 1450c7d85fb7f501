use super::auth::TokenProvider;
use super::{Job, JobHandle, JobResult, PollStatus, Submission, VideoBackend, VideoPayload};
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info};

const REPLICATE_API: &str = "https://api.replicate.com/v1";

/// Replicate predictions. Submissions ask the API to wait for the result so
/// short clips come back inline; anything still running is polled by id.
pub struct ReplicateBackend {
    client: Client,
    tokens: Arc<dyn TokenProvider>,
    base_url: String,
}

impl ReplicateBackend {
    pub fn new(client: Client, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            client,
            tokens,
            base_url: REPLICATE_API.to_string(),
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn predictions_url(&self, model: &str) -> Result<String> {
        match model.split_once(':') {
            // Pinned versions go through the generic endpoint.
            Some(_) => Ok(format!("{}/predictions", self.base_url)),
            None if model.contains('/') => Ok(format!("{}/models/{}/predictions", self.base_url, model)),
            None => Err(Error::Submission(format!(
                "replicate model id must look like owner/name, got {:?}",
                model
            ))),
        }
    }
}

fn build_input(job: &Job) -> Value {
    let params = &job.parameters;
    let mut input = json!({
        "prompt": job.prompt,
        "duration": params.duration_secs,
        "aspect_ratio": params.aspect_ratio,
    });
    if let Some(image) = &job.reference_image {
        input["image"] = json!(format!("data:image/png;base64,{}", STANDARD.encode(image)));
    }
    if let Some(resolution) = &params.resolution {
        input["resolution"] = json!(resolution);
    }
    input
}

fn build_body(job: &Job) -> Value {
    let mut body = json!({ "input": build_input(job) });
    if let Some((_, version)) = job.provider_model_id.split_once(':') {
        body["version"] = json!(version);
    }
    body
}

/// Output is either a single URL or a list of URLs depending on the model.
fn output_urls(raw: &Value) -> Vec<VideoPayload> {
    match raw.get("output") {
        Some(Value::String(url)) => vec![VideoPayload::Url(url.clone())],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|url| VideoPayload::Url(url.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_prediction(raw: Value) -> PollStatus {
    let status = raw.get("status").and_then(Value::as_str).map(str::to_owned);
    match status.as_deref() {
        Some("succeeded") => PollStatus::Done(JobResult {
            videos: output_urls(&raw),
            raw,
        }),
        Some("failed") | Some("canceled") => {
            let detail = raw
                .get("error")
                .filter(|e| !e.is_null())
                .cloned()
                .unwrap_or_else(|| json!({ "status": status }));
            PollStatus::Failed(detail)
        }
        _ => PollStatus::Pending,
    }
}

#[async_trait]
impl VideoBackend for ReplicateBackend {
    fn name(&self) -> &str {
        "replicate"
    }

    async fn submit(&self, job: &Job) -> Result<Submission> {
        let token = self.tokens.token().await?;
        let url = self.predictions_url(&job.provider_model_id)?;

        info!(model = %job.provider_model_id, "starting video generation");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .header("Prefer", "wait")
            .json(&build_body(job))
            .send()
            .await
            .map_err(|e| {
                error!(model = %job.provider_model_id, "error starting video generation: {}", e);
                Error::Submission(e.to_string())
            })?;

        let status = resp.status();
        let raw = resp.text().await.map_err(|e| {
            error!(model = %job.provider_model_id, "could not read replicate response: {}", e);
            Error::Submission(format!("could not read response body: {}", e))
        })?;
        if status.as_u16() == 401 {
            return Err(Error::Auth("replicate rejected the API token".to_string()));
        }
        if !status.is_success() {
            let snippet = raw.chars().take(800).collect::<String>();
            error!(model = %job.provider_model_id, "replicate HTTP {}: {}", status.as_u16(), snippet);
            return Err(Error::Submission(format!("HTTP {}: {}", status.as_u16(), snippet)));
        }

        let body: Value = serde_json::from_str(&raw)
            .map_err(|e| Error::Submission(format!("invalid JSON from replicate: {}", e)))?;
        let id = body.get("id").and_then(Value::as_str).map(str::to_string);

        match parse_prediction(body) {
            PollStatus::Done(result) => Ok(Submission::Finished(result)),
            PollStatus::Failed(detail) => Err(Error::Submission(detail.to_string())),
            PollStatus::Pending => {
                let id = id.ok_or_else(|| Error::Submission("prediction has no id".to_string()))?;
                Ok(Submission::Pending(JobHandle::new(id)))
            }
        }
    }

    async fn fetch_status(&self, handle: &JobHandle) -> Result<PollStatus> {
        let token = self.tokens.token().await?;
        let resp = self
            .client
            .get(format!("{}/predictions/{}", self.base_url, handle))
            .bearer_auth(&token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("prediction status answered HTTP {}", status.as_u16())));
        }

        let raw: Value = resp.json().await?;
        Ok(parse_prediction(raw))
    }
}
