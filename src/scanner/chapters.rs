//! Chapter discovery and reconciliation against the catalog.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use super::ScanError;
use super::naming::{chapter_name, clean_name, display_name, is_chapter_like, slugify};
use crate::archive::{is_archive_path, is_image_name, natural_cmp};
use crate::covers::CoverArtPipeline;
use crate::db::DbPool;
use crate::db::models::Chapter;
use crate::db::queries::{chapters, media};

/// A chapter as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterFile {
    pub slug: String,
    pub name: String,
    /// Location relative to the media folder (the file name for single-file
    /// media, `.` for a folder that is itself one chapter).
    pub file: String,
    pub path: PathBuf,
}

/// Chapters present at `media_path`, in natural order, unique by slug.
///
/// A single archive is one chapter. In a folder, every archive and every
/// sub-folder that directly holds images is a candidate, kept only when its
/// cleaned name contains a digit. A folder with loose images and no
/// candidates counts as a single chapter.
pub fn collect_chapter_files(media_path: &Path) -> Vec<ChapterFile> {
    if !media_path.is_dir() {
        let raw = display_name(media_path);
        return vec![single_chapter(&raw, file_name(media_path), media_path)];
    }

    let mut seen = HashSet::new();
    let mut found = Vec::new();
    let walker = WalkDir::new(media_path)
        .min_depth(1)
        .follow_links(true)
        .sort_by(|a, b| natural_cmp(&a.file_name().to_string_lossy(), &b.file_name().to_string_lossy()))
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    for entry in walker.filter_map(|e| e.ok()) {
        let path = entry.path();
        let raw = if entry.file_type().is_dir() {
            if !holds_images(path) {
                continue;
            }
            file_name(path)
        } else if is_archive_path(path) {
            display_name(path)
        } else {
            continue;
        };
        if !is_chapter_like(&raw) {
            continue;
        }

        let slug = slugify(&clean_name(&raw));
        if !seen.insert(slug.clone()) {
            debug!("Chapter {} collides with an earlier slug {slug}", path.display());
            continue;
        }
        found.push(ChapterFile {
            slug,
            name: chapter_name(&raw),
            file: relative_file(media_path, path),
            path: path.to_path_buf(),
        });
    }

    if found.is_empty() && holds_images(media_path) {
        let raw = display_name(media_path);
        found.push(single_chapter(&raw, ".".to_string(), media_path));
    }
    found
}

/// Number of chapter candidates at `media_path`; the value stored as a
/// media's file count.
pub fn count_candidates(media_path: &Path) -> usize {
    collect_chapter_files(media_path).len()
}

fn single_chapter(raw: &str, file: String, path: &Path) -> ChapterFile {
    let slug = slugify(&clean_name(raw));
    let (slug, name) = if slug.is_empty() {
        ("1".to_string(), "Chapter 1".to_string())
    } else {
        (slug, chapter_name(raw))
    };
    ChapterFile {
        slug,
        name,
        file,
        path: path.to_path_buf(),
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn holds_images(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries.filter_map(|e| e.ok()).any(|e| {
                e.file_type().is_ok_and(|t| t.is_file())
                    && is_image_name(&e.file_name().to_string_lossy())
            })
        })
        .unwrap_or(false)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn relative_file(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_else(|_| file_name(path))
}

/// Result of reconciling one media's chapters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub added: Vec<String>,
    pub deleted: Vec<String>,
    pub file_count: usize,
}

impl ReconcileOutcome {
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.deleted.is_empty()
    }
}

/// Brings the stored chapters of one media in line with what is on disk.
pub struct ChapterReconciler<'a> {
    db: &'a DbPool,
    previews: Option<&'a CoverArtPipeline>,
    keep: HashSet<String>,
}

impl<'a> ChapterReconciler<'a> {
    pub fn new(db: &'a DbPool) -> Self {
        Self {
            db,
            previews: None,
            keep: HashSet::new(),
        }
    }

    /// Render a preview thumbnail for every chapter added.
    pub fn with_previews(mut self, covers: &'a CoverArtPipeline) -> Self {
        self.previews = Some(covers);
        self
    }

    /// Chapter slugs that must survive even when missing from the folder
    /// being reconciled (they live in a duplicate folder).
    pub fn keeping(mut self, slugs: HashSet<String>) -> Self {
        self.keep = slugs;
        self
    }

    /// Create chapters that appeared, delete the ones that vanished and
    /// store the new file count. Chapters present on both sides are left
    /// alone. The first persistence error aborts the media.
    pub async fn reconcile(&self, media_slug: &str, media_path: &Path) -> Result<ReconcileOutcome, ScanError> {
        let outcome = self.apply(media_slug, media_path, true).await?;
        media::set_file_count(self.db, media_slug, outcome.file_count as i64).await?;
        Ok(outcome)
    }

    /// Add the chapters of a duplicate folder that the catalog lacks.
    /// Nothing is deleted and the stored file count is left as is.
    pub async fn merge(&self, media_slug: &str, media_path: &Path) -> Result<ReconcileOutcome, ScanError> {
        self.apply(media_slug, media_path, false).await
    }

    async fn apply(&self, media_slug: &str, media_path: &Path, prune: bool) -> Result<ReconcileOutcome, ScanError> {
        let present = chapter_files(media_path).await?;
        let present: BTreeMap<String, ChapterFile> =
            present.into_iter().map(|c| (c.slug.clone(), c)).collect();

        let existing = chapters::list_for_media(self.db, media_slug).await?;
        let existing_slugs: HashSet<&str> = existing.iter().map(|c| c.slug.as_str()).collect();

        let mut outcome = ReconcileOutcome {
            file_count: present.len(),
            ..Default::default()
        };

        for (slug, file) in &present {
            if existing_slugs.contains(slug.as_str()) {
                continue;
            }
            chapters::insert(
                self.db,
                &Chapter {
                    media_slug: media_slug.to_string(),
                    slug: slug.clone(),
                    name: file.name.clone(),
                    file: file.file.clone(),
                },
            )
            .await?;
            outcome.added.push(slug.clone());
            self.render_preview(media_slug, file).await;
        }

        if prune {
            for chapter in &existing {
                if present.contains_key(&chapter.slug) || self.keep.contains(&chapter.slug) {
                    continue;
                }
                chapters::delete(self.db, media_slug, &chapter.slug).await?;
                outcome.deleted.push(chapter.slug.clone());
                if let Some(covers) = self.previews {
                    covers.remove_chapter_preview(media_slug, &chapter.slug).await;
                }
            }
        }

        if outcome.changed() {
            info!(
                "{media_slug}: {} chapters added, {} deleted, {} on disk",
                outcome.added.len(),
                outcome.deleted.len(),
                outcome.file_count
            );
        }
        Ok(outcome)
    }

    async fn render_preview(&self, media_slug: &str, file: &ChapterFile) {
        let Some(covers) = self.previews else {
            return;
        };
        if let Err(e) = covers.chapter_preview(media_slug, &file.slug, &file.path).await {
            warn!("Preview for {media_slug}/{} failed: {e}", file.slug);
        }
    }
}

/// [`collect_chapter_files`] off the async runtime.
pub async fn chapter_files(media_path: &Path) -> Result<Vec<ChapterFile>, ScanError> {
    let path = media_path.to_path_buf();
    tokio::task::spawn_blocking(move || collect_chapter_files(&path))
        .await
        .map_err(|e| ScanError::Internal(e.to_string()))
}
