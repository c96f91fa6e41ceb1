use std::path::Path;

use mangaindex::db::queries::media;
use mangaindex::indexer::{IndexerState, LibraryIndexer};
use mangaindex::scanner::FolderScanner;
use tokio_util::sync::CancellationToken;

use super::*;

fn populate(root: &Path) {
    let series = root.join("Grimgar");
    std::fs::create_dir_all(&series).unwrap();
    write_chapters(&series, &[1, 2]);
    write_cbz(&root.join("Oneshot.cbz"), 8, 12, 2);
    std::fs::write(root.join("notes.txt"), b"not media").unwrap();
    let hidden = root.join(".trash");
    std::fs::create_dir_all(&hidden).unwrap();
    write_chapters(&hidden, &[1]);
}

#[tokio::test]
async fn scan_indexes_every_candidate_then_settles() {
    let env = TestEnv::new().await;
    let folder = env.dir("library");
    populate(&folder);
    let indexer = LibraryIndexer::new(env.ctx.clone(), env.library("manga", &[&folder])).unwrap();

    let first = indexer.scan_once().await.unwrap();
    assert_eq!(first.stats.media_created, 2);
    assert_eq!(first.stats.chapters_added, 3);
    assert_eq!(first.stats.errors, 0);
    assert!(!first.stats.cancelled);
    first.cleanup.expect("cleanup runs after a full scan").await.unwrap().unwrap();

    let slugs: Vec<String> = media::list_by_library(&env.ctx.db, "manga")
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.slug)
        .collect();
    assert_eq!(slugs, vec!["grimgar", "oneshot"]);

    let second = indexer.scan_once().await.unwrap();
    assert_eq!(second.stats.media_created, 0);
    assert_eq!(second.stats.media_unchanged, 2);
    assert_eq!(second.stats.chapters_added, 0);
    assert_eq!(indexer.state(), IndexerState::Idle);
}

/// An unreadable folder is counted and the next folder is still scanned.
#[tokio::test]
async fn missing_folder_does_not_stop_the_scan() {
    let env = TestEnv::new().await;
    let missing = env.root.join("gone");
    let folder = env.dir("present");
    populate(&folder);

    let library = env.library("manga", &[&missing, &folder]);
    let stats = FolderScanner::new(&env.ctx)
        .scan(&library, &CancellationToken::new())
        .await;
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.media_created, 2);
}

/// A corrupt archive does not abort the rest of the scan.
#[tokio::test]
async fn corrupt_archive_does_not_abort_scan() {
    let env = TestEnv::new().await;
    let folder = env.dir("library");
    populate(&folder);
    std::fs::write(folder.join("Broken.cbz"), b"PK\x03\x04 definitely not a zip").unwrap();

    let library = env.library("manga", &[&folder]);
    let stats = FolderScanner::new(&env.ctx)
        .scan(&library, &CancellationToken::new())
        .await;
    assert!(stats.media_created >= 2);
    assert!(media::get_unfiltered(&env.ctx.db, "grimgar").await.unwrap().is_some());
    assert!(media::get_unfiltered(&env.ctx.db, "oneshot").await.unwrap().is_some());
}

#[tokio::test]
async fn cancelled_scan_stops_early_and_skips_cleanup() {
    let env = TestEnv::new().await;
    let folder = env.dir("library");
    populate(&folder);
    let indexer = LibraryIndexer::new(env.ctx.clone(), env.library("manga", &[&folder])).unwrap();

    assert!(indexer.stop());
    let outcome = indexer.scan_once().await.unwrap();
    assert!(outcome.stats.cancelled);
    assert!(outcome.cleanup.is_none());
    assert_eq!(media::count(&env.ctx.db).await.unwrap(), 0);
}

#[tokio::test]
async fn deleted_media_is_removed_after_next_scan() {
    let env = TestEnv::new().await;
    let folder = env.dir("library");
    populate(&folder);
    let indexer = LibraryIndexer::new(env.ctx.clone(), env.library("manga", &[&folder])).unwrap();
    indexer.scan_once().await.unwrap().cleanup.unwrap().await.unwrap().unwrap();

    std::fs::remove_dir_all(folder.join("Grimgar")).unwrap();
    let outcome = indexer.scan_once().await.unwrap();
    let cleaned = outcome.cleanup.unwrap().await.unwrap().unwrap();
    assert_eq!(cleaned.media_removed, vec!["grimgar"]);
    assert!(media::get_unfiltered(&env.ctx.db, "grimgar").await.unwrap().is_none());
    assert!(media::get_unfiltered(&env.ctx.db, "oneshot").await.unwrap().is_some());
}
