pub mod chapters;
pub mod cleanup;
pub mod duplicates;
pub mod media;
pub mod naming;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveError, is_archive_path, natural_cmp};
use crate::db::models::Library;
use crate::state::IndexContext;

use self::chapters::ReconcileOutcome;
use self::media::{IndexOutcome, MediaIndexer};

/// Candidates indexed by all scans of this process, for progress logs.
static SCANNED_ITEMS: Mutex<u64> = Mutex::new(0);

const PROGRESS_EVERY: u64 = 100;

fn bump_scanned_items() -> u64 {
    let mut count = SCANNED_ITEMS.lock().unwrap_or_else(|e| e.into_inner());
    *count += 1;
    *count
}

pub fn scanned_items() -> u64 {
    *SCANNED_ITEMS.lock().unwrap_or_else(|e| e.into_inner())
}

/// Statistics collected during a scan run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    pub media_created: u64,
    pub media_updated: u64,
    pub media_unchanged: u64,
    pub media_skipped: u64,
    pub chapters_added: u64,
    pub chapters_deleted: u64,
    pub errors: u64,
    /// The scan stopped early because it was cancelled.
    pub cancelled: bool,
}

impl ScanStats {
    fn record(&mut self, outcome: &IndexOutcome) {
        match outcome {
            IndexOutcome::Created(o) => {
                self.count_chapters(o);
                self.media_created += 1;
            }
            IndexOutcome::Updated(o) => {
                self.count_chapters(o);
                self.media_updated += 1;
            }
            IndexOutcome::Unchanged => self.media_unchanged += 1,
            IndexOutcome::Skipped(_) => self.media_skipped += 1,
        }
    }

    fn count_chapters(&mut self, outcome: &ReconcileOutcome) {
        self.chapters_added += outcome.added.len() as u64;
        self.chapters_deleted += outcome.deleted.len() as u64;
    }
}

/// Walks a library's folders and hands every candidate to the
/// [`MediaIndexer`], one at a time.
pub struct FolderScanner<'a> {
    ctx: &'a IndexContext,
}

impl<'a> FolderScanner<'a> {
    pub fn new(ctx: &'a IndexContext) -> Self {
        Self { ctx }
    }

    /// Scan every folder of `library` in configured order.
    ///
    /// `cancel` is checked between folders and between entries; work already
    /// done stays in the catalog. Per-item failures are counted, not
    /// returned.
    pub async fn scan(&self, library: &Library, cancel: &CancellationToken) -> ScanStats {
        let mut stats = ScanStats::default();
        info!("Starting scan of library {}", library.slug);

        for folder in library.folder_paths() {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }
            let entries = match list_candidates(&folder).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Cannot read library folder {}: {e}", folder.display());
                    stats.errors += 1;
                    continue;
                }
            };
            debug!("{}: {} candidates", folder.display(), entries.len());

            for path in entries {
                if cancel.is_cancelled() {
                    stats.cancelled = true;
                    break;
                }
                match MediaIndexer::new(self.ctx).index(&path, &library.slug).await {
                    Ok(outcome) => stats.record(&outcome),
                    Err(e) => {
                        warn!("Failed to index {}: {e}", path.display());
                        stats.errors += 1;
                    }
                }
                let total = bump_scanned_items();
                if total % PROGRESS_EVERY == 0 {
                    info!("Indexed {total} items so far");
                }
            }
            if stats.cancelled {
                break;
            }
        }

        if stats.cancelled {
            info!("Scan of {} cancelled", library.slug);
        } else {
            info!(
                "Scan of {} complete: created={}, updated={}, unchanged={}, skipped={}, chapters +{}/-{}, errors={}",
                library.slug,
                stats.media_created,
                stats.media_updated,
                stats.media_unchanged,
                stats.media_skipped,
                stats.chapters_added,
                stats.chapters_deleted,
                stats.errors
            );
        }
        stats
    }
}

/// Direct children of a library folder that can be media: sub-directories
/// and chapter containers, hidden entries excluded, in natural name order.
/// Paths are canonical so they compare equal across scans.
pub async fn list_candidates(folder: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let folder = folder.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>, ScanError> {
        let root = std::fs::canonicalize(&folder)?;
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&root)?
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .map(|e| e.path())
            .filter(|p| p.is_dir() || is_archive_path(p))
            .collect();
        entries.sort_by(|a, b| {
            natural_cmp(
                &a.file_name().unwrap_or_default().to_string_lossy(),
                &b.file_name().unwrap_or_default().to_string_lossy(),
            )
        });
        Ok(entries)
    })
    .await
    .map_err(|e| ScanError::Internal(e.to_string()))?
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("scan already running")]
    AlreadyRunning,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),
    #[error("internal error: {0}")]
    Internal(String),
}
