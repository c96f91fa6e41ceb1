use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{CoverError, CoverImage, CoverRequest, CoverStrategy};
use crate::archive::{self, natural_cmp};
use crate::config::CoverImageConfig;
use crate::imaging;

/// File stems recognised as a ready-made poster inside a media folder.
pub const POSTER_FILE_STEMS: &[&str] = &["poster", "cover", "thumbnail", "folder"];

const POSTER_FILE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Download the provider's cover URL and cache it unmodified.
pub struct ProviderDownload {
    client: reqwest::Client,
}

impl ProviderDownload {
    pub fn new(timeout: Duration) -> Result<Self, CoverError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mangaindex/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CoverStrategy for ProviderDownload {
    fn name(&self) -> &'static str {
        "provider"
    }

    async fn fetch(&self, request: &CoverRequest<'_>) -> Result<Option<CoverImage>, CoverError> {
        let Some(url) = request.provider_url.filter(|u| !u.is_empty()) else {
            return Ok(None);
        };
        let response = self.client.get(url).send().await?.error_for_status()?;
        let data = response.bytes().await?.to_vec();
        let ext = match image::guess_format(&data) {
            Ok(image::ImageFormat::Png) => "png",
            Ok(image::ImageFormat::WebP) => "webp",
            Ok(image::ImageFormat::Gif) => "gif",
            Ok(image::ImageFormat::Jpeg) => "jpg",
            _ => return Err(CoverError::NotAnImage(url.to_string())),
        };
        Ok(Some(CoverImage { data, ext }))
    }
}

/// A `poster.jpg`, `cover.png` or similar shipped inside the media folder.
pub struct PosterFile {
    image: CoverImageConfig,
}

impl PosterFile {
    pub fn new(image: CoverImageConfig) -> Self {
        Self { image }
    }
}

#[async_trait]
impl CoverStrategy for PosterFile {
    fn name(&self) -> &'static str {
        "poster file"
    }

    async fn fetch(&self, request: &CoverRequest<'_>) -> Result<Option<CoverImage>, CoverError> {
        if !request.path.is_dir() {
            return Ok(None);
        }
        let dir = request.path.to_path_buf();
        let cfg = self.image;
        tokio::task::spawn_blocking(move || -> Result<Option<CoverImage>, CoverError> {
            let Some(poster) = find_poster_file(&dir) else {
                return Ok(None);
            };
            debug!("Using poster file {}", poster.display());
            let data = std::fs::read(&poster)?;
            let data = imaging::render_poster(&data, &cfg)?;
            Ok(Some(CoverImage { data, ext: "jpg" }))
        })
        .await?
    }
}

/// Find a conventional poster file directly inside `dir`, matching names
/// case-insensitively. Stems are tried in [`POSTER_FILE_STEMS`] order.
pub fn find_poster_file(dir: &Path) -> Option<PathBuf> {
    let mut files: Vec<(String, PathBuf)> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .map(|e| (e.file_name().to_string_lossy().to_lowercase(), e.path()))
        .collect();
    files.sort_by(|a, b| natural_cmp(&a.0, &b.0));

    POSTER_FILE_STEMS.iter().find_map(|stem| {
        files.iter().find_map(|(name, path)| {
            let (file_stem, ext) = name.rsplit_once('.')?;
            (file_stem == *stem && POSTER_FILE_EXTENSIONS.contains(&ext)).then(|| path.clone())
        })
    })
}

/// First page of the media: the single archive itself, or the first
/// chapter container of a folder. Cropped from the top so that long strips
/// still give a sensible poster.
pub struct ArchiveImage {
    image: CoverImageConfig,
}

impl ArchiveImage {
    pub fn new(image: CoverImageConfig) -> Self {
        Self { image }
    }
}

#[async_trait]
impl CoverStrategy for ArchiveImage {
    fn name(&self) -> &'static str {
        "archive image"
    }

    async fn fetch(&self, request: &CoverRequest<'_>) -> Result<Option<CoverImage>, CoverError> {
        let path = request.path.to_path_buf();
        let cfg = self.image;
        tokio::task::spawn_blocking(move || -> Result<Option<CoverImage>, CoverError> {
            let Some(container) = imaging::first_chapter_container(&path) else {
                return Ok(None);
            };
            let mut source = archive::open(&container)?;
            let (name, data) = match archive::first_image(source.as_mut()) {
                Ok(found) => found,
                Err(archive::ArchiveError::NoImages) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            debug!("Cover from {} in {}", name, container.display());
            let data = imaging::render_poster(&data, &cfg)?;
            Ok(Some(CoverImage { data, ext: "jpg" }))
        })
        .await?
    }
}
