use super::auth::TokenProvider;
use super::{Job, JobHandle, JobResult, PollStatus, Submission, VideoBackend, VideoPayload};
use crate::config::VertexConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Long-running-operation video model endpoint (`predictLongRunning` +
/// `fetchPredictOperation`).
pub struct VertexBackend {
    client: Client,
    cfg: VertexConfig,
    tokens: Arc<dyn TokenProvider>,
}

impl VertexBackend {
    pub fn new(client: Client, cfg: VertexConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            client,
            cfg,
            tokens,
        }
    }

    fn model_path(&self, model_id: &str) -> String {
        format!(
            "projects/{}/locations/{}/publishers/google/models/{}",
            self.cfg.project_id, self.cfg.location_id, model_id
        )
    }

    fn method_url(&self, model_id: &str, method: &str) -> String {
        format!(
            "https://{}/v1/{}:{}",
            self.cfg.api_endpoint,
            self.model_path(model_id),
            method
        )
    }

    fn model_for<'a>(&'a self, job: &'a Job) -> &'a str {
        if job.provider_model_id.is_empty() {
            &self.cfg.model_id
        } else {
            &job.provider_model_id
        }
    }

    async fn bearer(&self) -> Result<String> {
        self.tokens.token().await.map_err(|e| match e {
            Error::Auth(_) => e,
            other => Error::Auth(other.to_string()),
        })
    }

    async fn note_status(&self, status: StatusCode) {
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }
    }
}

fn build_payload(endpoint: &str, job: &Job) -> Value {
    let mut instance = json!({ "prompt": job.prompt });
    if let Some(image) = &job.reference_image {
        instance["image"] = json!({
            "bytesBase64Encoded": STANDARD.encode(image),
            "mimeType": "image/png",
        });
    }

    let params = &job.parameters;
    let mut parameters = json!({
        "aspectRatio": params.aspect_ratio,
        "sampleCount": params.sample_count,
        "durationSeconds": params.duration_secs,
        "personGeneration": "allow_adult",
        "enablePromptRewriting": true,
        "addWatermark": true,
        "includeRaiReason": true,
    });
    if let Some(resolution) = &params.resolution {
        parameters["resolution"] = json!(resolution);
    }

    json!({
        "endpoint": endpoint,
        "instances": [instance],
        "parameters": parameters,
    })
}

/// Interprets a `fetchPredictOperation` answer.
fn parse_operation(raw: Value) -> PollStatus {
    if !raw.get("done").and_then(Value::as_bool).unwrap_or(false) {
        return PollStatus::Pending;
    }
    if let Some(err) = raw.get("error") {
        return PollStatus::Failed(err.clone());
    }

    let videos = raw
        .pointer("/response/videos")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|video| {
                    let encoded = video.get("bytesBase64Encoded").and_then(Value::as_str);
                    if encoded.is_none() {
                        warn!("skipping video entry without inline bytes: {}", video);
                    }
                    encoded.map(|b| VideoPayload::Base64(b.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    PollStatus::Done(JobResult { videos, raw })
}

#[async_trait]
impl VideoBackend for VertexBackend {
    fn name(&self) -> &str {
        "vertex"
    }

    async fn submit(&self, job: &Job) -> Result<Submission> {
        let token = self.bearer().await?;
        let model = self.model_for(job);
        let url = self.method_url(model, "predictLongRunning");
        let payload = build_payload(&self.model_path(model), job);

        info!("generating video with prompt: {}", job.prompt);
        info!(model, "starting video generation");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!("error starting video generation: {}", e);
                Error::Submission(e.to_string())
            })?;

        let status = resp.status();
        let raw = resp.text().await.map_err(|e| {
            error!("could not read predictLongRunning response: {}", e);
            Error::Submission(format!("could not read response body: {}", e))
        })?;
        if !status.is_success() {
            self.note_status(status).await;
            let snippet = raw.chars().take(800).collect::<String>();
            error!("video generation rejected with HTTP {}: {}", status.as_u16(), snippet);
            return Err(Error::Submission(format!(
                "HTTP {}: {}",
                status.as_u16(),
                snippet
            )));
        }

        let body: Value = serde_json::from_str(&raw)
            .map_err(|e| Error::Submission(format!("invalid JSON from predictLongRunning: {}", e)))?;
        let name = body.get("name").and_then(Value::as_str).ok_or_else(|| {
            error!("could not extract operation ID from response: {}", body);
            Error::Submission("response has no operation name".to_string())
        })?;

        info!("operation ID: {}", name);
        Ok(Submission::Pending(JobHandle::new(name)))
    }

    async fn fetch_status(&self, handle: &JobHandle) -> Result<PollStatus> {
        let token = self.bearer().await?;
        let model = operation_model(handle.as_str()).unwrap_or(&self.cfg.model_id);
        let url = self.method_url(model, "fetchPredictOperation");

        info!(operation = %handle, "checking status");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&json!({ "operationName": handle.as_str() }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            self.note_status(status).await;
            return Err(Error::Fetch(format!(
                "fetchPredictOperation answered HTTP {}",
                status.as_u16()
            )));
        }

        let raw: Value = resp.json().await?;
        Ok(parse_operation(raw))
    }
}

/// Operation names look like `projects/p/locations/l/publishers/google/models/<model>/operations/<id>`.
fn operation_model(operation: &str) -> Option<&str> {
    let (prefix, _) = operation.split_once("/operations/")?;
    prefix.rsplit_once("/models/").map(|(_, model)| model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::GenerationParams;

    #[test]
    fn payload_matches_predict_long_running_shape() {
        let job = Job::new(
            "a lighthouse in a storm",
            Some(vec![1, 2, 3]),
            GenerationParams {
                duration_secs: 6,
                sample_count: 2,
                ..GenerationParams::default()
            },
            "veo-2.0-generate-001",
        );
        let payload = build_payload("projects/p/locations/l/publishers/google/models/veo", &job);

        assert_eq!(payload["instances"][0]["prompt"], "a lighthouse in a storm");
        assert_eq!(payload["instances"][0]["image"]["bytesBase64Encoded"], "AQID");
        assert_eq!(payload["instances"][0]["image"]["mimeType"], "image/png");
        assert_eq!(payload["parameters"]["durationSeconds"], 6);
        assert_eq!(payload["parameters"]["sampleCount"], 2);
        assert_eq!(payload["parameters"]["aspectRatio"], "16:9");
        assert!(payload["parameters"].get("resolution").is_none());
    }

    #[test]
    fn payload_without_image_omits_it() {
        let job = Job::new("text only", None, GenerationParams::default(), "veo");
        let payload = build_payload("projects/p", &job);
        assert!(payload["instances"][0].get("image").is_none());
    }

    #[test]
    fn not_done_is_pending() {
        assert_eq!(parse_operation(json!({"name": "op"})), PollStatus::Pending);
        assert_eq!(parse_operation(json!({"name": "op", "done": false})), PollStatus::Pending);
    }

    #[test]
    fn done_with_error_is_failed() {
        let status = parse_operation(json!({"done": true, "error": {"code": 3, "message": "blocked"}}));
        assert_eq!(status, PollStatus::Failed(json!({"code": 3, "message": "blocked"})));
    }

    #[test]
    fn done_keeps_raw_payload_and_extracts_videos() {
        let raw = json!({
            "name": "op",
            "done": true,
            "response": {
                "raiMediaFilteredCount": 0,
                "videos": [
                    {"bytesBase64Encoded": "AAAA", "mimeType": "video/mp4"},
                    {"gcsUri": "gs://bucket/v.mp4"},
                    {"bytesBase64Encoded": "BBBB", "mimeType": "video/mp4"}
                ]
            }
        });
        match parse_operation(raw.clone()) {
            PollStatus::Done(result) => {
                assert_eq!(result.raw, raw);
                assert_eq!(
                    result.videos,
                    vec![
                        VideoPayload::Base64("AAAA".into()),
                        VideoPayload::Base64("BBBB".into())
                    ]
                );
            }
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[test]
    fn model_is_read_from_operation_name() {
        let op = "projects/p/locations/us-central1/publishers/google/models/veo-3.0-generate-preview/operations/1234";
        assert_eq!(operation_model(op), Some("veo-3.0-generate-preview"));
        assert_eq!(operation_model("operations/1234"), None);
    }
}
