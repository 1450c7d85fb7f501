//! Article text and lead image, written under `data/<Title>/`.

use crate::api::wikipedia::{ArticleRef, WikipediaClient, safe_file_name};
use crate::error::{Error, Result};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

/// Article content as fetched, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub title: String,
    pub source_url: Option<String>,
    pub text: String,
    /// Lead image in whatever format the wiki served it.
    pub image: Option<Vec<u8>>,
}

impl Page {
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n\n", self.title);
        if let Some(url) = &self.source_url {
            out.push_str(&format!("**Source:** {}\n\n", url));
        }
        out.push_str("---\n\n");
        out.push_str(self.text.trim());
        out.push('\n');
        out
    }
}

/// Anything that can look up an article by title or URL.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url_or_title: &str) -> Result<Page>;
}

#[async_trait]
impl PageSource for WikipediaClient {
    async fn fetch_page(&self, url_or_title: &str) -> Result<Page> {
        let article = ArticleRef::parse(url_or_title)?;
        info!("processing Wikipedia page: {}", article.title);

        let summary = self.summary(&article).await?;
        let image = match &summary.image_url {
            Some(url) => match self.download(url).await {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    warn!("failed to download image: {}", err);
                    None
                }
            },
            None => {
                warn!("no main image found for {}", summary.title);
                None
            }
        };

        Ok(Page {
            title: summary.title,
            source_url: summary.page_url,
            text: summary.extract,
            image,
        })
    }
}

/// Where a saved page ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFiles {
    /// File-safe title used for every path derived from this page.
    pub name: String,
    pub dir: PathBuf,
    pub markdown: PathBuf,
    pub image: Option<PathBuf>,
}

/// Re-encodes any supported image as an opaque RGB PNG, flattening
/// transparency onto white.
pub fn to_png(bytes: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| Error::Fetch(format!("unsupported image data: {e}")))?;

    let rgba = decoded.to_rgba8();
    let mut flat = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a)) / 255) as u8;
        flat.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }

    let mut out = Vec::new();
    DynamicImage::ImageRgb8(flat)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|e| Error::Fetch(format!("PNG encoding failed: {e}")))?;
    Ok(out)
}

/// Writes `<data_dir>/<Title>/<Title>.md` and, when the page has one,
/// `<Title>.png`.
pub async fn save_page(data_dir: &Path, page: &Page) -> Result<PageFiles> {
    let name = safe_file_name(&page.title);
    if name.is_empty() {
        return Err(Error::Config(format!("title {:?} has no usable characters", page.title)));
    }

    let dir = data_dir.join(&name);
    fs::create_dir_all(&dir)
        .await
        .map_err(|e| Error::persist(&dir, e))?;

    let markdown = dir.join(format!("{name}.md"));
    fs::write(&markdown, page.to_markdown())
        .await
        .map_err(|e| Error::persist(&markdown, e))?;
    info!("markdown saved as {}", markdown.display());

    let image = match &page.image {
        Some(bytes) => {
            let bytes = bytes.clone();
            let png = tokio::task::spawn_blocking(move || to_png(&bytes))
                .await
                .map_err(|e| Error::Fetch(format!("image conversion task failed: {e}")))?;
            match png {
                Ok(png) => {
                    let path = dir.join(format!("{name}.png"));
                    fs::write(&path, png)
                        .await
                        .map_err(|e| Error::persist(&path, e))?;
                    info!("image saved as {}", path.display());
                    Some(path)
                }
                Err(err) => {
                    warn!("failed to convert image: {}", err);
                    None
                }
            }
        }
        None => None,
    };

    Ok(PageFiles {
        name,
        dir,
        markdown,
        image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageReader, Rgba, RgbaImage};

    fn rgba_png(px: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(2, 2, Rgba(px));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    fn decode(bytes: &[u8]) -> DynamicImage {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .unwrap()
            .decode()
            .unwrap()
    }

    #[test]
    fn transparency_is_flattened_onto_white() {
        let png = to_png(&rgba_png([0, 0, 0, 0])).unwrap();
        let img = decode(&png).to_rgb8();
        assert_eq!(img.get_pixel(0, 0), &Rgb([255, 255, 255]));

        let png = to_png(&rgba_png([10, 20, 30, 255])).unwrap();
        assert_eq!(decode(&png).to_rgb8().get_pixel(1, 1), &Rgb([10, 20, 30]));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(to_png(b"definitely not an image").is_err());
    }

    #[test]
    fn markdown_has_header_and_source() {
        let page = Page {
            title: "Ethereum".into(),
            source_url: Some("https://en.wikipedia.org/wiki/Ethereum".into()),
            text: "Ethereum is a decentralized blockchain.\n".into(),
            image: None,
        };
        assert_eq!(
            page.to_markdown(),
            "# Ethereum\n\n**Source:** https://en.wikipedia.org/wiki/Ethereum\n\n---\n\nEthereum is a decentralized blockchain.\n"
        );
    }

    #[tokio::test]
    async fn saves_markdown_and_png() {
        let dir = tempfile::tempdir().unwrap();
        let page = Page {
            title: "Apollo 11".into(),
            source_url: None,
            text: "First crewed Moon landing.".into(),
            image: Some(rgba_png([200, 100, 50, 255])),
        };

        let files = save_page(dir.path(), &page).await.unwrap();

        assert_eq!(files.name, "Apollo-11");
        assert_eq!(files.markdown, dir.path().join("Apollo-11/Apollo-11.md"));
        assert_eq!(files.image, Some(dir.path().join("Apollo-11/Apollo-11.png")));
        let saved = fs::read(files.image.unwrap()).await.unwrap();
        assert_eq!(&saved[..4], b"\x89PNG");
    }

    #[tokio::test]
    async fn page_without_image_has_no_png() {
        let dir = tempfile::tempdir().unwrap();
        let page = Page {
            title: "Zero".into(),
            source_url: None,
            text: "Nothing to see.".into(),
            image: Some(b"broken".to_vec()),
        };
        let files = save_page(dir.path(), &page).await.unwrap();
        assert_eq!(files.image, None);
        assert!(files.markdown.exists());
    }
}
