//! Cover art acquisition and caching.
//!
//! A [`CoverArtPipeline`] holds an ordered list of [`CoverStrategy`]
//! implementations and tries them in turn until one produces an image. The
//! winner is written to `{cache_path}/{slug}.{ext}` and served as
//! `{url_prefix}/{slug}.{ext}`. Every failure is logged and swallowed: the
//! worst outcome is an empty cover URL.

pub mod preview;
mod strategies;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::archive::ArchiveError;
use crate::config::{CoverImageConfig, CoversConfig, MetadataConfig};

pub use strategies::{ArchiveImage, PosterFile, ProviderDownload, POSTER_FILE_STEMS};

/// What a strategy gets to look at.
#[derive(Debug, Clone)]
pub struct CoverRequest<'a> {
    pub slug: &'a str,
    /// Media folder, or the single chapter file.
    pub path: &'a Path,
    /// Cover URL resolved from the metadata provider, if any.
    pub provider_url: Option<&'a str>,
}

/// Encoded image bytes ready to be cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub data: Vec<u8>,
    /// File extension without the dot (`jpg`, `png`, `webp`, `gif`).
    pub ext: &'static str,
}

/// One way of obtaining a cover. `Ok(None)` means "not applicable here".
#[async_trait]
pub trait CoverStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, request: &CoverRequest<'_>) -> Result<Option<CoverImage>, CoverError>;
}

pub struct CoverArtPipeline {
    cache_path: PathBuf,
    url_prefix: String,
    image: CoverImageConfig,
    strategies: Vec<Box<dyn CoverStrategy>>,
}

impl CoverArtPipeline {
    pub fn new(
        cache_path: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
        image: CoverImageConfig,
        strategies: Vec<Box<dyn CoverStrategy>>,
    ) -> Self {
        Self {
            cache_path: cache_path.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
            image,
            strategies,
        }
    }

    /// Provider download, then a poster file next to the media, then the
    /// first page of the first chapter.
    pub fn from_config(covers: &CoversConfig, metadata: &MetadataConfig) -> Result<Self, CoverError> {
        let image = CoverImageConfig::from(covers);
        let timeout = Duration::from_secs(metadata.timeout_secs.max(1));
        let strategies: Vec<Box<dyn CoverStrategy>> = vec![
            Box::new(ProviderDownload::new(timeout)?),
            Box::new(PosterFile::new(image)),
            Box::new(ArchiveImage::new(image)),
        ];
        Ok(Self::new(
            covers.cache_path.clone(),
            covers.url_prefix.clone(),
            image,
            strategies,
        ))
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn image_config(&self) -> CoverImageConfig {
        self.image
    }

    /// Run the strategies in order and cache the first image produced.
    ///
    /// Returns the served URL, or an empty string when nothing worked.
    pub async fn acquire(&self, request: &CoverRequest<'_>) -> String {
        for strategy in &self.strategies {
            match strategy.fetch(request).await {
                Ok(Some(image)) => match self.store(request.slug, &image).await {
                    Ok(url) => {
                        info!("Cover for {} from {}: {url}", request.slug, strategy.name());
                        return url;
                    }
                    Err(e) => warn!("Failed to cache cover for {}: {e}", request.slug),
                },
                Ok(None) => debug!("{}: no cover from {}", request.slug, strategy.name()),
                Err(e) => warn!("{}: cover strategy {} failed: {e}", request.slug, strategy.name()),
            }
        }
        debug!("No cover art found for {}", request.slug);
        String::new()
    }

    /// Write `image` to the cache and return its URL. Replacing an existing
    /// file appends a `?v=` suffix so clients refetch it.
    pub async fn store(&self, slug: &str, image: &CoverImage) -> Result<String, CoverError> {
        tokio::fs::create_dir_all(&self.cache_path).await?;
        let file_name = format!("{slug}.{}", image.ext);
        let target = self.cache_path.join(&file_name);
        let replaced = tokio::fs::try_exists(&target).await.unwrap_or(false);
        tokio::fs::write(&target, &image.data).await?;

        let url = format!("{}/{file_name}", self.url_prefix);
        if replaced {
            Ok(format!("{url}?v={}", chrono::Utc::now().timestamp()))
        } else {
            Ok(url)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoverError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("downloaded data is not an image: {0}")]
    NotAnImage(String),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
