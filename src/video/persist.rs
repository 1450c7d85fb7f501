use super::{JobResult, VideoPayload};
use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

/// Files written for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSet {
    pub metadata: PathBuf,
    pub videos: Vec<PathBuf>,
}

/// Writes job results to disk.
#[derive(Debug, Clone, Default)]
pub struct Persister {
    client: Client,
}

impl Persister {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Writes `<stem>.json` with the raw response, then every video.
    ///
    /// A single video lands in `<stem>.mp4`, several in `<stem>_<i>.mp4`.
    /// Files written before a failing item stay on disk.
    pub async fn persist(&self, result: &JobResult, dest: &Path, stem: &str) -> Result<PersistedSet> {
        fs::create_dir_all(dest)
            .await
            .map_err(|e| Error::persist(dest, e))?;

        let metadata = dest.join(format!("{stem}.json"));
        let pretty = serde_json::to_vec_pretty(&result.raw).map_err(|e| Error::persist(&metadata, e))?;
        fs::write(&metadata, pretty)
            .await
            .map_err(|e| Error::persist(&metadata, e))?;

        if result.videos.is_empty() {
            warn!("no videos found in response, metadata kept at {}", metadata.display());
            return Err(Error::persist(&metadata, "response contains no videos"));
        }

        info!("found {} video(s), extracting", result.videos.len());

        let single = result.videos.len() == 1;
        let mut videos = Vec::with_capacity(result.videos.len());
        for (i, video) in result.videos.iter().enumerate() {
            let path = if single {
                dest.join(format!("{stem}.mp4"))
            } else {
                dest.join(format!("{stem}_{i}.mp4"))
            };

            if let Err(err) = self.write_video(video, &path).await {
                error!("error saving video {}: {}", i, err);
                return Err(err);
            }
            info!("saved video {} to {}", i, path.display());
            videos.push(path);
        }

        Ok(PersistedSet { metadata, videos })
    }

    async fn write_video(&self, video: &VideoPayload, path: &Path) -> Result<()> {
        match video {
            VideoPayload::Base64(encoded) => {
                let bytes = STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| Error::persist(path, format!("invalid base64 payload: {e}")))?;
                fs::write(path, bytes).await.map_err(|e| Error::persist(path, e))
            }
            VideoPayload::Url(url) => self.download(url, path).await,
        }
    }

    async fn download(&self, url: &str, path: &Path) -> Result<()> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::persist(path, format!("download of {url} failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::persist(
                path,
                format!("download of {url} answered HTTP {}", resp.status().as_u16()),
            ));
        }

        let mut file = fs::File::create(path)
            .await
            .map_err(|e| Error::persist(path, e))?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::persist(path, format!("download of {url} broke off: {e}")))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::persist(path, e))?;
        }
        file.flush().await.map_err(|e| Error::persist(path, e))?;
        Ok(())
    }
}
