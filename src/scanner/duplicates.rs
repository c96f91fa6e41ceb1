use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use tracing::info;

use super::ScanError;
use super::chapters::chapter_files;
use crate::db::DbPool;
use crate::db::queries::duplicates;

/// Order two folder paths so that the first is lexicographically smaller.
pub fn canonical_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Remember that `folder_a` and `folder_b` both map to `media_slug`.
///
/// Returns `true` when a new record was written. Lookup and insert are two
/// statements; two scans racing on the same pair can still write it twice.
pub async fn record(
    db: &DbPool,
    media_slug: &str,
    library_slug: &str,
    folder_a: &str,
    folder_b: &str,
) -> Result<bool, sqlx::Error> {
    if folder_a == folder_b {
        return Ok(false);
    }
    let (first, second) = canonical_pair(folder_a, folder_b);
    if duplicates::get_by_folders(db, media_slug, first, second)
        .await?
        .is_some()
    {
        return Ok(false);
    }
    duplicates::insert(db, media_slug, library_slug, first, second).await?;
    info!("Duplicate folders for {media_slug}: {first} and {second}");
    Ok(true)
}

/// Chapter slugs found in the recorded duplicates of `stored_path` that
/// still exist on disk.
pub async fn sibling_chapter_slugs(
    db: &DbPool,
    media_slug: &str,
    stored_path: &str,
) -> Result<HashSet<String>, ScanError> {
    let folders: BTreeSet<String> = duplicates::list_for_media(db, media_slug)
        .await?
        .into_iter()
        .flat_map(|d| [d.folder_path1, d.folder_path2])
        .filter(|f| f != stored_path)
        .collect();

    let mut slugs = HashSet::new();
    for folder in folders {
        let path = Path::new(&folder);
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            continue;
        }
        slugs.extend(chapter_files(path).await?.into_iter().map(|c| c.slug));
    }
    Ok(slugs)
}
