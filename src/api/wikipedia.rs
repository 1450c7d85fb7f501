use super::snippet;
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

const DEFAULT_HOST: &str = "en.wikipedia.org";
const USER_AGENT: &str = "wiki-movie/0.1 (video generation from encyclopedia articles)";

static NOT_WORDISH: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").expect("file name pattern"));
static DASH_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").expect("dash pattern"));

/// Where an article lives: wiki host plus human-readable title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRef {
    pub host: String,
    pub title: String,
}

impl ArticleRef {
    /// Accepts either a page title or a `https://<lang>.wikipedia.org/wiki/<Title>` URL.
    pub fn parse(url_or_title: &str) -> Result<Self> {
        let input = url_or_title.trim();
        if !input.starts_with("http") {
            if input.is_empty() {
                return Err(Error::Config("empty article title".to_string()));
            }
            return Ok(Self {
                host: DEFAULT_HOST.to_string(),
                title: input.replace('_', " "),
            });
        }

        let url = Url::parse(input).map_err(|e| Error::Config(format!("invalid article URL {input}: {e}")))?;
        let host = url.host_str().unwrap_or(DEFAULT_HOST).to_string();
        let last = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Config(format!("no article title in {input}")))?;

        let title = urlencoding::decode(last)
            .map_err(|e| Error::Config(format!("article title in {input} is not UTF-8: {e}")))?;

        Ok(Self {
            host,
            title: title.replace('_', " "),
        })
    }
}

/// Title reduced to characters that are safe in file and directory names.
pub fn safe_file_name(title: &str) -> String {
    let cleaned = NOT_WORDISH.replace_all(title, "");
    DASH_RUNS
        .replace_all(&cleaned, "-")
        .trim_matches('-')
        .to_string()
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    title: String,
    #[serde(default)]
    extract: String,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
    #[serde(default)]
    originalimage: Option<ImageRef>,
    #[serde(default)]
    thumbnail: Option<ImageRef>,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    desktop: Option<PageUrls>,
}

#[derive(Debug, Deserialize)]
struct PageUrls {
    page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageRef {
    source: String,
}

/// The fields of the REST summary endpoint this crate uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub title: String,
    pub extract: String,
    pub page_url: Option<String>,
    pub image_url: Option<String>,
}

fn summary_from(resp: SummaryResponse) -> Summary {
    Summary {
        title: resp.title,
        extract: resp.extract,
        page_url: resp.content_urls.and_then(|c| c.desktop).and_then(|d| d.page),
        image_url: resp
            .originalimage
            .or(resp.thumbnail)
            .map(|img| absolute_image_url(&img.source)),
    }
}

fn absolute_image_url(src: &str) -> String {
    if let Some(rest) = src.strip_prefix("//") {
        format!("https://{rest}")
    } else if src.starts_with('/') {
        format!("https://{DEFAULT_HOST}{src}")
    } else {
        src.to_string()
    }
}

/// Wikipedia REST API client.
#[derive(Debug, Clone)]
pub struct WikipediaClient {
    client: Client,
}

impl WikipediaClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn summary(&self, article: &ArticleRef) -> Result<Summary> {
        let mut url = Url::parse(&format!("https://{}/api/rest_v1/page/summary/", article.host))
            .map_err(|e| Error::Config(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("bad wiki host {}", article.host)))?
            .pop_if_empty()
            .push(&article.title.replace(' ', "_"));

        info!("fetching Wikipedia summary: {}", url);
        let resp = self
            .client
            .get(url.as_str())
            .header("User-Agent", USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await?;

        let status = resp.status();
        let raw = resp.text().await?;
        if !status.is_success() {
            warn!("Wikipedia HTTP {} for {}: {}", status.as_u16(), article.title, snippet(&raw, 200));
            return Err(Error::Fetch(format!(
                "failed to fetch Wikipedia page {}: HTTP {}",
                article.title,
                status.as_u16()
            )));
        }

        let parsed: SummaryResponse = serde_json::from_str(&raw)
            .map_err(|e| Error::Fetch(format!("invalid summary JSON for {}: {}", article.title, e)))?;
        Ok(summary_from(parsed))
    }

    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        info!("downloading image from {}", url);
        let resp = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .timeout(std::time::Duration::from_secs(60))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::Fetch(format!(
                "image download {} answered HTTP {}",
                url,
                resp.status().as_u16()
            )));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_titles_and_urls() {
        assert_eq!(
            ArticleRef::parse("Ethereum").unwrap(),
            ArticleRef {
                host: "en.wikipedia.org".into(),
                title: "Ethereum".into()
            }
        );
        assert_eq!(
            ArticleRef::parse("https://en.wikipedia.org/wiki/Apollo_11").unwrap().title,
            "Apollo 11"
        );

        let article = ArticleRef::parse("https://de.wikipedia.org/wiki/K%C3%B6lner_Dom").unwrap();
        assert_eq!(article.host, "de.wikipedia.org");
        assert_eq!(article.title, "Kölner Dom");
    }

    #[test]
    fn rejects_url_without_title() {
        assert!(ArticleRef::parse("https://en.wikipedia.org/").is_err());
        assert!(ArticleRef::parse("   ").is_err());
    }

    #[test]
    fn escaped_titles_are_decoded() {
        assert_eq!(
            ArticleRef::parse("https://en.wikipedia.org/wiki/Mercury_%28planet%29").unwrap().title,
            "Mercury (planet)"
        );
        assert_eq!(
            ArticleRef::parse("https://en.wikipedia.org/wiki/100%25_Fun").unwrap().title,
            "100% Fun"
        );
        assert!(matches!(
            ArticleRef::parse("https://en.wikipedia.org/wiki/Bad%FF"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn file_names_drop_punctuation() {
        assert_eq!(safe_file_name("Ethereum"), "Ethereum");
        assert_eq!(safe_file_name("Apollo 11"), "Apollo-11");
        assert_eq!(safe_file_name("C++ (programming language)"), "C-programming-language");
        assert_eq!(safe_file_name("  Kölner Dom! "), "Kölner-Dom");
    }

    #[test]
    fn summary_prefers_original_image() {
        let resp: SummaryResponse = serde_json::from_str(
            r#"{
                "title": "Ethereum",
                "extract": "Ethereum is a decentralized blockchain.",
                "content_urls": {"desktop": {"page": "https://en.wikipedia.org/wiki/Ethereum"}},
                "thumbnail": {"source": "//upload.wikimedia.org/thumb.png", "width": 320},
                "originalimage": {"source": "https://upload.wikimedia.org/full.png", "width": 1200}
            }"#,
        )
        .unwrap();
        let summary = summary_from(resp);
        assert_eq!(summary.image_url.as_deref(), Some("https://upload.wikimedia.org/full.png"));
        assert_eq!(summary.page_url.as_deref(), Some("https://en.wikipedia.org/wiki/Ethereum"));
    }

    #[test]
    fn protocol_relative_images_get_https() {
        assert_eq!(absolute_image_url("//upload.wikimedia.org/a.jpg"), "https://upload.wikimedia.org/a.jpg");
        assert_eq!(absolute_image_url("/static/a.png"), "https://en.wikipedia.org/static/a.png");
    }
}
