//! Post-scan removal of catalog rows whose folders are gone.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::db::DbPool;
use crate::db::models::Library;
use crate::db::queries::{duplicates, media};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupStats {
    pub media_removed: Vec<String>,
    pub duplicates_removed: u64,
}

/// Library roots in the form media paths are stored in.
pub fn canonical_roots(library: &Library) -> Vec<PathBuf> {
    library
        .folder_paths()
        .into_iter()
        .map(|p| std::fs::canonicalize(&p).unwrap_or(p))
        .collect()
}

/// Delete media of `library` whose path vanished or is no longer under one
/// of its folders, then duplicate records pointing at missing folders.
pub async fn remove_orphans(db: &DbPool, library: &Library) -> Result<CleanupStats, sqlx::Error> {
    let roots = canonical_roots(library);
    let mut stats = CleanupStats::default();

    for item in media::list_by_library(db, &library.slug).await? {
        let path = Path::new(&item.path);
        let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
        let inside = roots.iter().any(|root| path.starts_with(root));
        if exists && inside {
            continue;
        }
        debug!(
            "Orphaned media {} at {} (exists: {exists}, inside library: {inside})",
            item.slug, item.path
        );
        if media::delete(db, &item.slug).await? {
            stats.media_removed.push(item.slug);
        }
    }

    for dup in duplicates::list_all(db).await? {
        if dup.library_slug != library.slug {
            continue;
        }
        let first = tokio::fs::try_exists(&dup.folder_path1).await.unwrap_or(false);
        let second = tokio::fs::try_exists(&dup.folder_path2).await.unwrap_or(false);
        let media_left = media::get_unfiltered(db, &dup.media_slug).await?.is_some();
        if first && second && media_left {
            continue;
        }
        duplicates::delete_by_id(db, dup.id).await?;
        stats.duplicates_removed += 1;
    }

    if !stats.media_removed.is_empty() || stats.duplicates_removed > 0 {
        info!(
            "Cleanup of {}: removed {} media, {} duplicate records",
            library.slug,
            stats.media_removed.len(),
            stats.duplicates_removed
        );
    }
    Ok(stats)
}
