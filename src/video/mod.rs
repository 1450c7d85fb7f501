//! Video generation jobs: submission, polling and persistence.
//!
//! A [`VideoBackend`] either finishes a job inline (the response already
//! carries the media) or hands back a [`JobHandle`] that the [`Poller`]
//! drives to a terminal state. Either way the caller ends up with a
//! [`JobResult`] that the [`Persister`] writes to disk.

pub mod auth;
pub mod persist;
pub mod poller;
pub mod replicate;
pub mod vertex;

use crate::error::{Error, Result};
use crate::prompt;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;

pub use persist::{PersistedSet, Persister};
pub use poller::{PollPolicy, PollState, Poller};

/// Provider-independent generation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationParams {
    pub aspect_ratio: String,
    pub duration_secs: u32,
    pub sample_count: u32,
    pub resolution: Option<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            aspect_ratio: "16:9".to_string(),
            duration_secs: 8,
            sample_count: 1,
            resolution: None,
        }
    }
}

/// One request to a video-generation provider.
#[derive(Debug, Clone)]
pub struct Job {
    pub prompt: String,
    /// PNG bytes used as the first frame / style reference.
    pub reference_image: Option<Vec<u8>>,
    pub parameters: GenerationParams,
    pub provider_model_id: String,
}

impl Job {
    pub fn new(
        prompt: impl Into<String>,
        reference_image: Option<Vec<u8>>,
        parameters: GenerationParams,
        provider_model_id: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            reference_image,
            parameters,
            provider_model_id: provider_model_id.into(),
        }
    }

    /// Builds a job from LLM output that wraps the usable prompt in
    /// `<prompts>…</prompts>`, attaching the image at `image_path`.
    pub async fn from_movie_prompt(
        generated: &str,
        image_path: &Path,
        parameters: GenerationParams,
        provider_model_id: &str,
    ) -> Result<Self> {
        let prompt = prompt::extract_marked_prompt(generated).ok_or_else(|| {
            Error::Submission("generated text has no <prompts>...</prompts> block".to_string())
        })?;

        let image = tokio::fs::read(image_path).await.map_err(|e| {
            Error::Submission(format!(
                "could not read reference image {}: {}",
                image_path.display(),
                e
            ))
        })?;

        Ok(Self::new(prompt, Some(image), parameters, provider_model_id))
    }
}

/// Opaque identifier for an in-flight asynchronous job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A produced clip, either carried in the response or hosted remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoPayload {
    Base64(String),
    Url(String),
}

/// Terminal outcome of a successful job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub videos: Vec<VideoPayload>,
    /// Provider response exactly as received.
    pub raw: serde_json::Value,
}

/// What a backend returns right after submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Finished(JobResult),
    Pending(JobHandle),
}

/// Outcome of a single status query.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    Pending,
    Done(JobResult),
    /// Finished with an error payload.
    Failed(serde_json::Value),
}

/// A video-generation provider.
///
/// Synchronous providers return [`Submission::Finished`] and never see
/// [`VideoBackend::fetch_status`]; submit-and-poll providers return a handle.
#[async_trait]
pub trait VideoBackend: Send + Sync {
    /// Short name used for logging and output file names.
    fn name(&self) -> &str;

    async fn submit(&self, job: &Job) -> Result<Submission>;

    async fn fetch_status(&self, handle: &JobHandle) -> Result<PollStatus>;
}

/// Submits `job` and polls it to completion when the backend answers with a
/// handle.
pub async fn run_job(backend: &dyn VideoBackend, poller: &Poller, job: &Job) -> Result<JobResult> {
    match backend.submit(job).await? {
        Submission::Finished(result) => Ok(result),
        Submission::Pending(handle) => {
            tracing::info!(backend = backend.name(), operation = %handle, "job submitted");
            poller.poll(backend, &handle).await
        }
    }
}

/// Makes a model id usable as a file stem.
pub fn file_safe_model_name(model: &str) -> String {
    model
        .chars()
        .map(|c| match c {
            '/' | ':' | '\\' | ' ' => '_',
            c => c,
        })
        .collect()
}
