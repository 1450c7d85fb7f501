use crate::batch::{self, BatchReport};
use crate::combine::{self, CombineReport, Concatenator};
use crate::episodes;
use crate::error::Error;
use crate::page::{self, PageFiles, PageSource};
use crate::prompt::{self, PromptGenerator, PromptRequest};
use crate::video::{
    self, GenerationParams, Job, PersistedSet, Persister, PollPolicy, Poller, VideoBackend,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

/// Knobs for one run, shared by every article in it.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    /// One job per model; episodes always use the first.
    pub movie_models: Vec<String>,
    pub params: GenerationParams,
    pub episodes: usize,
    pub poll: PollPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            movie_models: Vec::new(),
            params: GenerationParams::default(),
            episodes: 1,
            poll: PollPolicy::default(),
        }
    }
}

/// Everything produced for one article.
#[derive(Debug, Clone)]
pub struct ArticleOutcome {
    pub page: PageFiles,
    pub prompt_file: PathBuf,
    pub videos: Vec<PersistedSet>,
    pub combined: Option<CombineReport>,
}

/// Article → prompt → video jobs → files on disk.
pub struct Generator {
    pages: Arc<dyn PageSource>,
    prompts: PromptGenerator,
    backend: Arc<dyn VideoBackend>,
    persister: Persister,
    poller: Poller,
    concat: Arc<dyn Concatenator>,
    options: RunOptions,
}

impl Generator {
    pub fn new(
        pages: Arc<dyn PageSource>,
        prompts: PromptGenerator,
        backend: Arc<dyn VideoBackend>,
        persister: Persister,
        concat: Arc<dyn Concatenator>,
        options: RunOptions,
    ) -> Self {
        Self {
            pages,
            prompts,
            backend,
            persister,
            poller: Poller::new(options.poll),
            concat,
            options,
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    fn videos_dir(&self, name: &str) -> PathBuf {
        self.options.output_dir.join(name).join("videos")
    }

    /// Processes every article concurrently. One article failing does not
    /// stop the others.
    pub async fn run_batch(&self, urls: &[String]) -> BatchReport<ArticleOutcome, anyhow::Error> {
        let units = urls
            .iter()
            .map(|url| (url.clone(), self.run_article(url)));
        batch::run_all(units).await
    }

    pub async fn run_article(&self, url_or_title: &str) -> Result<ArticleOutcome> {
        let page = self
            .pages
            .fetch_page(url_or_title)
            .await
            .with_context(|| format!("Failed to fetch article {url_or_title}"))?;
        let files = page::save_page(&self.options.data_dir, &page).await?;

        let image = files
            .image
            .clone()
            .with_context(|| format!("Could not download an image for {}", page.title))?;

        let markdown = fs::read_to_string(&files.markdown)
            .await
            .with_context(|| format!("Failed to read {}", files.markdown.display()))?;
        let request = PromptRequest {
            duration_secs: self.options.params.duration_secs,
            episodes: self.options.episodes,
        };
        let generated = self
            .prompts
            .generate(&markdown, &request)
            .await
            .context("Prompt generation failed")?;
        let prompt_file = prompt::save_prompt(&generated, &files.markdown).await?;

        let (videos, combined) = if self.options.episodes > 1 {
            let (videos, report) = self.render_episodes(&files, &generated, &image).await?;
            (videos, Some(report))
        } else {
            (self.render_models(&files, &generated, &image).await?, None)
        };

        info!("video generation completed for {}", files.name);
        Ok(ArticleOutcome {
            page: files,
            prompt_file,
            videos,
            combined,
        })
    }

    /// Submits, polls and persists one job.
    async fn render(&self, job: Job, dest: &Path, stem: &str) -> Result<PersistedSet> {
        let result = video::run_job(self.backend.as_ref(), &self.poller, &job).await?;
        let set = self.persister.persist(&result, dest, stem).await?;
        Ok(set)
    }

    /// One independent job per configured movie model.
    async fn render_models(&self, files: &PageFiles, generated: &str, image: &Path) -> Result<Vec<PersistedSet>> {
        if self.options.movie_models.is_empty() {
            anyhow::bail!("no movie model configured");
        }

        let dest = self.videos_dir(&files.name);
        let units = self.options.movie_models.iter().map(|model| {
            let dest = dest.clone();
            let fut = async move {
                let job = Job::from_movie_prompt(generated, image, self.options.params.clone(), model).await?;
                self.render(job, &dest, &video::file_safe_model_name(model)).await
            };
            (format!("{} [{}]", files.name, model), fut)
        });

        let report = batch::run_all(units).await;
        let videos: Vec<PersistedSet> = report.succeeded().map(|(_, set)| set.clone()).collect();
        if videos.is_empty() {
            anyhow::bail!("no movie model produced a video for {}", files.name);
        }
        Ok(videos)
    }

    /// Splits the script, renders every episode, then joins them in order.
    async fn render_episodes(
        &self,
        files: &PageFiles,
        generated: &str,
        image: &Path,
    ) -> Result<(Vec<PersistedSet>, CombineReport)> {
        let model = self
            .options
            .movie_models
            .first()
            .context("no movie model configured")?;
        let script = prompt::extract_marked_prompt(generated).ok_or_else(|| {
            Error::Submission("generated script has no <prompts>...</prompts> block".to_string())
        })?;
        let episodes = episodes::split(script, self.options.episodes)?;
        let image_bytes = fs::read(image)
            .await
            .map_err(|e| Error::Submission(format!("could not read reference image {}: {}", image.display(), e)))?;

        let dest = self.videos_dir(&files.name);
        let params = GenerationParams {
            sample_count: 1,
            ..self.options.params.clone()
        };

        let units = episodes.into_iter().map(|episode| {
            let job = Job::new(episode.prompt, Some(image_bytes.clone()), params.clone(), model.clone());
            let stem = combine::episode_stem(&files.name, episode.index);
            let dest = dest.clone();
            let fut = async move { self.render(job, &dest, &stem).await };
            (format!("{} episode {}", files.name, episode.index), fut)
        });

        let report = batch::run_all(units).await;
        let videos: Vec<PersistedSet> = report.succeeded().map(|(_, set)| set.clone()).collect();
        let failed = report.failed().count();
        if failed > 0 {
            warn!("{} of {} episodes failed for {}", failed, self.options.episodes, files.name);
        }

        let output = dest.join(format!("{}_full.mp4", files.name));
        let combined = combine::combine_episodes(
            self.concat.as_ref(),
            &dest,
            &files.name,
            self.options.episodes,
            &output,
        )
        .await?;

        Ok((videos, combined))
    }
}
