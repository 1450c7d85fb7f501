use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wiki_movie::api::wikipedia::WikipediaClient;
use wiki_movie::config::Config;
use wiki_movie::ffmpeg::FfmpegConcat;
use wiki_movie::generator::{Generator, RunOptions};
use wiki_movie::init;
use wiki_movie::prompt::{self, DEFAULT_PROMPT_MODEL, PromptGenerator};
use wiki_movie::video::auth::{CachedTokenProvider, HttpTokenSource, StaticToken};
use wiki_movie::video::replicate::ReplicateBackend;
use wiki_movie::video::vertex::VertexBackend;
use wiki_movie::video::{GenerationParams, PollPolicy, Persister, VideoBackend};

const DEFAULT_REPLICATE_MODEL: &str = "google/veo-3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Long-running operation endpoint configured through PROJECT_ID and friends.
    Vertex,
    /// Replicate predictions, authenticated with REPLICATE_API_TOKEN.
    Replicate,
}

/// Turn Wikipedia articles into short generated videos.
#[derive(Debug, Parser)]
#[command(name = "wiki-movie", version)]
struct Args {
    /// URL or title of the Wikipedia page to process.
    wiki_url: Option<String>,

    /// More pages, processed concurrently alongside WIKI_URL.
    #[arg(long, num_args = 1..)]
    urls: Vec<String>,

    /// Duration of the generated video in seconds.
    #[arg(long, default_value_t = 8)]
    duration: u32,

    /// File with the system prompt used to write the movie prompt.
    #[arg(long)]
    master_prompt: Option<PathBuf>,

    /// LLM used to write the movie prompt (claude-* or an OpenAI model).
    #[arg(long, default_value = DEFAULT_PROMPT_MODEL)]
    prompt_model: String,

    /// Video model; repeat to render with several models.
    #[arg(long = "movie-model")]
    movie_models: Vec<String>,

    /// Number of episodes; more than one renders a mini-series.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    episodes: u16,

    #[arg(long, value_enum, default_value_t = Backend::Vertex)]
    backend: Backend,

    /// Videos requested per job.
    #[arg(long, default_value_t = 1)]
    samples: u32,

    #[arg(long, default_value = "16:9")]
    aspect_ratio: String,

    /// Seconds between status checks.
    #[arg(long, default_value_t = 10)]
    poll_interval: u64,

    /// Status checks before giving up on a job.
    #[arg(long, default_value_t = 90)]
    max_polls: u32,

    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    #[arg(long, default_value = "output")]
    output_dir: PathBuf,
}

impl Args {
    fn targets(&self) -> Vec<String> {
        self.wiki_url.iter().chain(self.urls.iter()).cloned().collect()
    }
}

fn build_backend(
    backend: Backend,
    cfg: &Config,
    client: &reqwest::Client,
) -> Result<(Arc<dyn VideoBackend>, String)> {
    match backend {
        Backend::Vertex => {
            let vertex = cfg.vertex()?;
            let tokens = Arc::new(CachedTokenProvider::new(HttpTokenSource::new(
                client.clone(),
                vertex.token_url.clone(),
            )));
            let default_model = vertex.model_id.clone();
            Ok((Arc::new(VertexBackend::new(client.clone(), vertex, tokens)), default_model))
        }
        Backend::Replicate => {
            let token = cfg.replicate_token()?;
            let tokens = Arc::new(StaticToken::new(token));
            Ok((
                Arc::new(ReplicateBackend::new(client.clone(), tokens)),
                DEFAULT_REPLICATE_MODEL.to_string(),
            ))
        }
    }
}

async fn run(args: Args) -> Result<i32> {
    let targets = args.targets();
    if targets.is_empty() {
        anyhow::bail!("give a Wikipedia URL or title, or --urls");
    }

    let cfg = Config::from_env();
    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    let (backend, default_model) = build_backend(args.backend, &cfg, &client)?;
    let movie_models = if args.movie_models.is_empty() {
        vec![default_model]
    } else {
        args.movie_models.clone()
    };

    let prompt_model = prompt::prompt_model_for(&args.prompt_model, &cfg, client.clone())?;
    let prompts = match &args.master_prompt {
        Some(path) => PromptGenerator::new(prompt_model, prompt::load_master_prompt(path).await?),
        None => PromptGenerator::with_default_prompt(prompt_model),
    };

    let options = RunOptions {
        data_dir: args.data_dir.clone(),
        output_dir: args.output_dir.clone(),
        movie_models,
        params: GenerationParams {
            aspect_ratio: args.aspect_ratio.clone(),
            duration_secs: args.duration,
            sample_count: args.samples,
            resolution: None,
        },
        episodes: args.episodes as usize,
        poll: PollPolicy::new(Duration::from_secs(args.poll_interval)).with_max_attempts(args.max_polls),
    };

    init::ensure_directories(&[options.data_dir.as_path(), options.output_dir.as_path()]).await?;
    if options.episodes > 1 && !init::check_ffmpeg().await {
        warn!("FFmpeg not found in PATH; episodes will render but cannot be combined");
    }

    let generator = Generator::new(
        Arc::new(WikipediaClient::new(client.clone())),
        prompts,
        backend,
        Persister::new(client),
        Arc::new(FfmpegConcat),
        options,
    );
    info!(
        models = ?generator.options().movie_models,
        episodes = generator.options().episodes,
        "starting generation for {} article(s)",
        targets.len()
    );

    if let [single] = targets.as_slice() {
        return match generator.run_article(single).await {
            Ok(outcome) => {
                for set in &outcome.videos {
                    for video in &set.videos {
                        info!("saved {}", video.display());
                    }
                }
                if let Some(combined) = &outcome.combined {
                    info!("combined video at {}", combined.output.display());
                }
                Ok(0)
            }
            Err(err) => {
                error!("{:#}", err);
                Ok(1)
            }
        };
    }

    let report = generator.run_batch(&targets).await;
    let failed = report.failed().count();
    info!(
        "batch finished: {} succeeded, {} failed",
        report.items.len() - failed,
        failed
    );
    Ok(0)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let code = match run(args).await {
        Ok(code) => code,
        Err(err) => {
            error!("{:#}", err);
            1
        }
    };
    std::process::exit(code);
}
