//! Indexing of a single media folder or file.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::ScanError;
use super::chapters::{ChapterReconciler, ReconcileOutcome, count_candidates};
use super::duplicates;
use super::naming::{clean_title, display_name, slugify};
use crate::archive::is_epub_path;
use crate::covers::CoverRequest;
use crate::db::models::{Media, MediaType, NewMedia, RATING_SAFE, STATUS_UNKNOWN};
use crate::db::queries::{media, tags};
use crate::imaging;
use crate::metadata::MediaMetadata;
use crate::state::IndexContext;

/// Why a candidate was left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing survived name cleaning.
    EmptyName,
    /// The slug already belongs to another library.
    OtherLibrary(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    Skipped(SkipReason),
    /// Candidate count matched the stored file count.
    Unchanged,
    Updated(ReconcileOutcome),
    Created(ReconcileOutcome),
}

/// Entry point for one candidate path of a library.
pub struct MediaIndexer<'a> {
    ctx: &'a IndexContext,
}

impl<'a> MediaIndexer<'a> {
    pub fn new(ctx: &'a IndexContext) -> Self {
        Self { ctx }
    }

    pub async fn index(&self, path: &Path, library_slug: &str) -> Result<IndexOutcome, ScanError> {
        let title = clean_title(&display_name(path));
        let slug = slugify(&title);
        if slug.is_empty() {
            debug!("Nothing left of {} after cleaning", path.display());
            return Ok(IndexOutcome::Skipped(SkipReason::EmptyName));
        }

        match media::get_unfiltered(&self.ctx.db, &slug).await? {
            Some(existing) if existing.library_slug != library_slug => {
                warn!(
                    "{} maps to {slug}, which belongs to library {}; skipping",
                    path.display(),
                    existing.library_slug
                );
                Ok(IndexOutcome::Skipped(SkipReason::OtherLibrary(
                    existing.library_slug,
                )))
            }
            Some(existing) => self.update_existing(existing, path).await,
            None => self.create(&slug, &title, path, library_slug).await,
        }
    }

    async fn update_existing(&self, existing: Media, path: &Path) -> Result<IndexOutcome, ScanError> {
        let path_str = path.to_string_lossy().into_owned();
        let candidates = candidate_count(path).await? as i64;

        if existing.path != path_str {
            duplicates::record(
                &self.ctx.db,
                &existing.slug,
                &existing.library_slug,
                &existing.path,
                &path_str,
            )
            .await?;
            return self.merge_duplicate(existing, path, candidates).await;
        }

        if candidates == existing.file_count {
            debug!("{}: {candidates} candidates, unchanged", existing.slug);
            return Ok(IndexOutcome::Unchanged);
        }

        let db = &self.ctx.db;
        let keep = duplicates::sibling_chapter_slugs(db, &existing.slug, &existing.path).await?;
        let outcome = self
            .reconciler()
            .keeping(keep)
            .reconcile(&existing.slug, path)
            .await?;
        if outcome.changed() {
            media::touch(db, &existing.slug).await?;
        }
        self.notify(&existing.slug, &outcome).await;
        Ok(IndexOutcome::Updated(outcome))
    }

    /// A second folder of an existing media. Its chapters are added to the
    /// catalog and never used to delete any. A richer folder becomes the
    /// media path and brings its count along.
    async fn merge_duplicate(
        &self,
        mut existing: Media,
        path: &Path,
        candidates: i64,
    ) -> Result<IndexOutcome, ScanError> {
        if candidates == existing.file_count {
            debug!("{}: duplicate {} has the same count", existing.slug, path.display());
            return Ok(IndexOutcome::Unchanged);
        }

        let outcome = self.reconciler().merge(&existing.slug, path).await?;
        let repointed = candidates > existing.file_count;
        if repointed {
            info!(
                "{}: repointing from {} to richer folder {} ({candidates} > {})",
                existing.slug,
                existing.path,
                path.display(),
                existing.file_count
            );
            existing.path = path.to_string_lossy().into_owned();
            existing.file_count = candidates;
            media::update(&self.ctx.db, &existing).await?;
        } else if outcome.changed() {
            media::touch(&self.ctx.db, &existing.slug).await?;
        }
        self.notify(&existing.slug, &outcome).await;

        if outcome.changed() || repointed {
            Ok(IndexOutcome::Updated(outcome))
        } else {
            Ok(IndexOutcome::Unchanged)
        }
    }

    fn reconciler(&self) -> ChapterReconciler<'a> {
        let reconciler = ChapterReconciler::new(&self.ctx.db);
        if self.ctx.config.covers.previews {
            reconciler.with_previews(&self.ctx.covers)
        } else {
            reconciler
        }
    }

    async fn notify(&self, slug: &str, outcome: &ReconcileOutcome) {
        if !outcome.added.is_empty() {
            self.ctx.notifier.notify_new_chapters(slug, &outcome.added).await;
        }
    }

    async fn create(
        &self,
        slug: &str,
        title: &str,
        path: &Path,
        library_slug: &str,
    ) -> Result<IndexOutcome, ScanError> {
        let db = &self.ctx.db;
        let metadata = match self.ctx.metadata.find_best_match(title).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Metadata lookup for {title:?} failed: {e}");
                None
            }
        };
        let provider_url = metadata
            .as_ref()
            .and_then(|m| self.ctx.metadata.cover_image_url(m));

        let cover_url = self
            .ctx
            .covers
            .acquire(&CoverRequest {
                slug,
                path,
                provider_url: provider_url.as_deref(),
            })
            .await;
        let media_type = classify(path, metadata.as_ref()).await;

        let meta = metadata.unwrap_or_default();
        let new = NewMedia {
            slug: slug.to_string(),
            library_slug: library_slug.to_string(),
            name: title.to_string(),
            path: path.to_string_lossy().into_owned(),
            media_type,
            status: non_empty_or(meta.status, STATUS_UNKNOWN),
            content_rating: non_empty_or(meta.content_rating, RATING_SAFE),
            cover_url,
            description: meta.description,
            year: meta.year,
            original_language: meta.original_language,
            author: meta.author,
        };
        media::insert(db, &new).await?;
        if !meta.tags.is_empty() {
            tags::add_for_media(db, slug, &meta.tags).await?;
        }
        info!("New {media_type} {slug} at {}", path.display());

        let outcome = self.reconciler().reconcile(slug, path).await?;
        self.notify(slug, &outcome).await;
        Ok(IndexOutcome::Created(outcome))
    }
}

async fn candidate_count(path: &Path) -> Result<usize, ScanError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || count_candidates(&path))
        .await
        .map_err(|e| ScanError::Internal(e.to_string()))
}

/// Epub content wins, then the provider's type, then the webtoon check.
async fn classify(path: &Path, metadata: Option<&MediaMetadata>) -> MediaType {
    let path: PathBuf = path.to_path_buf();
    let provider_type = metadata.and_then(|m| m.media_type);
    let detected = tokio::task::spawn_blocking(move || {
        if contains_epub(&path) {
            Some(MediaType::Novel)
        } else if provider_type.is_some() {
            provider_type
        } else if imaging::detect_webtoon(&path) {
            Some(MediaType::Webtoon)
        } else {
            None
        }
    })
    .await;
    match detected {
        Ok(found) => found.unwrap_or_default(),
        Err(e) => {
            warn!("Type detection failed: {e}");
            provider_type.unwrap_or_default()
        }
    }
}

fn contains_epub(path: &Path) -> bool {
    if !path.is_dir() {
        return is_epub_path(path);
    }
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .any(|e| e.file_type().is_file() && is_epub_path(e.path()))
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}
