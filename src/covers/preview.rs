//! Chapter preview thumbnails.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{CoverArtPipeline, CoverError};
use crate::archive;
use crate::imaging;

/// Pages considered when picking a preview.
pub const PREVIEW_CANDIDATES: usize = 8;

pub const PREVIEW_SIZE: u32 = 320;

/// Render a JPEG thumbnail of the most interesting of the first few pages of
/// a chapter. `Ok(None)` when the chapter has no decodable image.
pub fn chapter_preview(path: &Path, size: u32, quality: u8) -> Result<Option<Vec<u8>>, CoverError> {
    let mut source = archive::open(path)?;
    let Some((name, page)) = imaging::most_interesting_page(source.as_mut(), PREVIEW_CANDIDATES)?
    else {
        return Ok(None);
    };
    debug!("Preview page for {}: {name}", path.display());
    Ok(Some(imaging::make_thumbnail(&page, size, quality)?))
}

impl CoverArtPipeline {
    /// Render and cache the preview of one chapter under
    /// `{cache_path}/previews/{media_slug}/{chapter_slug}.jpg`.
    pub async fn chapter_preview(
        &self,
        media_slug: &str,
        chapter_slug: &str,
        chapter_path: &Path,
    ) -> Result<Option<PathBuf>, CoverError> {
        let path = chapter_path.to_path_buf();
        let quality = self.image_config().jpeg_quality();
        let rendered =
            tokio::task::spawn_blocking(move || chapter_preview(&path, PREVIEW_SIZE, quality)).await??;
        let Some(data) = rendered else {
            return Ok(None);
        };

        let target = self.preview_path(media_slug, chapter_slug);
        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&target, data).await?;
        Ok(Some(target))
    }

    /// Drop the cached preview of a deleted chapter.
    pub async fn remove_chapter_preview(&self, media_slug: &str, chapter_slug: &str) {
        let target = self.preview_path(media_slug, chapter_slug);
        match tokio::fs::remove_file(&target).await {
            Ok(()) => debug!("Removed preview {}", target.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Cannot remove preview {}: {e}", target.display()),
        }
    }

    fn preview_path(&self, media_slug: &str, chapter_slug: &str) -> PathBuf {
        self.cache_path()
            .join("previews")
            .join(media_slug)
            .join(format!("{chapter_slug}.jpg"))
    }
}
