use mangaindex::db::queries::{chapters, duplicates, media};
use mangaindex::indexer::LibraryIndexer;
use mangaindex::scanner::cleanup;
use mangaindex::scanner::media::{IndexOutcome, MediaIndexer};

use super::*;

async fn stored_chapters(env: &TestEnv, media_slug: &str) -> Vec<String> {
    let mut slugs: Vec<String> = chapters::list_for_media(&env.ctx.db, media_slug)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.slug)
        .collect();
    slugs.sort();
    slugs
}

/// Two folders of one library that clean to the same title: the one with
/// more chapters becomes the media path and the pair is recorded once, in
/// canonical order.
#[tokio::test]
async fn richer_duplicate_takes_over_and_pair_is_recorded() {
    let env = TestEnv::new().await;
    let poor = env.dir("b/Berserk");
    let rich = env.dir("a/Berserk [Group]");
    write_chapters(&poor, &[1]);
    write_chapters(&rich, &[1, 2]);

    let indexer = MediaIndexer::new(&env.ctx);
    indexer.index(&poor, "manga").await.unwrap();
    let outcome = indexer.index(&rich, "manga").await.unwrap();
    let IndexOutcome::Updated(reconciled) = outcome else {
        panic!("expected an update, got {outcome:?}");
    };
    assert_eq!(reconciled.added, vec!["chapter-2"]);

    let row = media::get_unfiltered(&env.ctx.db, "berserk").await.unwrap().unwrap();
    assert_eq!(row.path, rich.to_string_lossy());
    assert_eq!(row.file_count, 2);

    let recorded = duplicates::list_all(&env.ctx.db).await.unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].media_slug, "berserk");
    assert_eq!(recorded[0].library_slug, "manga");
    // "/…/a/…" sorts before "/…/b/…".
    assert_eq!(recorded[0].folder_path1, rich.to_string_lossy());
    assert_eq!(recorded[0].folder_path2, poor.to_string_lossy());

    // Seeing the poorer folder again neither repoints, re-records, deletes
    // the richer folder's chapters nor takes over the file count.
    assert_eq!(
        indexer.index(&poor, "manga").await.unwrap(),
        IndexOutcome::Unchanged
    );
    let row = media::get_unfiltered(&env.ctx.db, "berserk").await.unwrap().unwrap();
    assert_eq!(row.path, rich.to_string_lossy());
    assert_eq!(row.file_count, 2);
    assert_eq!(stored_chapters(&env, "berserk").await, vec!["chapter-1", "chapter-2"]);
    assert_eq!(duplicates::list_all(&env.ctx.db).await.unwrap().len(), 1);
    assert_eq!(env.notifier.calls().len(), 2);
}

/// Two library folders holding the same series keep the union of their
/// chapters, and rescans settle instead of deleting and re-adding them.
#[tokio::test]
async fn duplicate_folders_settle_across_scans() {
    let env = TestEnv::new().await;
    let a = env.dir("a");
    let b = env.dir("b");
    let poor = env.dir("a/Berserk");
    let rich = env.dir("b/Berserk [Group]");
    write_chapters(&poor, &[1]);
    write_chapters(&rich, &[2, 3]);
    let indexer = LibraryIndexer::new(env.ctx.clone(), env.library("manga", &[&a, &b])).unwrap();

    let first = indexer.scan_once().await.unwrap();
    assert_eq!(first.stats.media_created, 1);
    assert_eq!(first.stats.chapters_added, 3);
    assert_eq!(first.stats.chapters_deleted, 0);
    first.cleanup.unwrap().await.unwrap().unwrap();
    assert_eq!(
        stored_chapters(&env, "berserk").await,
        vec!["chapter-1", "chapter-2", "chapter-3"]
    );
    let row = media::get_unfiltered(&env.ctx.db, "berserk").await.unwrap().unwrap();
    assert_eq!(row.path, rich.to_string_lossy());
    assert_eq!(row.file_count, 2);
    assert_eq!(env.notifier.calls().len(), 2);

    for _ in 0..2 {
        let again = indexer.scan_once().await.unwrap();
        assert_eq!(again.stats.chapters_added, 0);
        assert_eq!(again.stats.chapters_deleted, 0);
        assert_eq!(again.stats.media_unchanged, 2);
        again.cleanup.unwrap().await.unwrap().unwrap();
    }
    assert_eq!(env.notifier.calls().len(), 2);
    assert_eq!(
        stored_chapters(&env, "berserk").await,
        vec!["chapter-1", "chapter-2", "chapter-3"]
    );

    // A new chapter in the stored folder triggers a full reconcile, which
    // must not drop the chapter that only the other folder holds.
    write_chapters(&rich, &[4]);
    let grown = indexer.scan_once().await.unwrap();
    assert_eq!(grown.stats.chapters_added, 1);
    assert_eq!(grown.stats.chapters_deleted, 0);
    assert_eq!(
        stored_chapters(&env, "berserk").await,
        vec!["chapter-1", "chapter-2", "chapter-3", "chapter-4"]
    );
    let row = media::get_unfiltered(&env.ctx.db, "berserk").await.unwrap().unwrap();
    assert_eq!(row.file_count, 3);
    assert_eq!(
        env.notifier.calls().last().unwrap(),
        &("berserk".to_string(), vec!["chapter-4".to_string()])
    );
}

/// A duplicate with the same chapter count keeps the first path.
#[tokio::test]
async fn equal_duplicate_keeps_original_path() {
    let env = TestEnv::new().await;
    let first = env.dir("x/Claymore");
    let second = env.dir("y/Claymore (Digital)");
    write_chapters(&first, &[1, 2]);
    write_chapters(&second, &[1, 2]);

    let indexer = MediaIndexer::new(&env.ctx);
    indexer.index(&first, "manga").await.unwrap();
    assert_eq!(
        indexer.index(&second, "manga").await.unwrap(),
        IndexOutcome::Unchanged
    );

    let row = media::get_unfiltered(&env.ctx.db, "claymore").await.unwrap().unwrap();
    assert_eq!(row.path, first.to_string_lossy());
    assert_eq!(duplicates::list_all(&env.ctx.db).await.unwrap().len(), 1);
}

#[tokio::test]
async fn cleanup_removes_vanished_media_and_stale_duplicates() {
    let env = TestEnv::new().await;
    let a = env.dir("a");
    let b = env.dir("b");
    let kept = env.dir("a/Gantz");
    let poor = env.dir("a/Hellsing");
    let rich = env.dir("b/Hellsing (Digital)");
    write_chapters(&kept, &[1]);
    write_chapters(&poor, &[1]);
    write_chapters(&rich, &[1, 2]);

    let indexer = MediaIndexer::new(&env.ctx);
    for path in [&kept, &poor, &rich] {
        indexer.index(path, "manga").await.unwrap();
    }
    assert_eq!(duplicates::list_all(&env.ctx.db).await.unwrap().len(), 1);

    std::fs::remove_dir_all(&rich).unwrap();
    let library = env.library("manga", &[&a, &b]);
    let stats = cleanup::remove_orphans(&env.ctx.db, &library).await.unwrap();

    assert_eq!(stats.media_removed, vec!["hellsing"]);
    assert_eq!(stats.duplicates_removed, 1);
    assert!(media::get_unfiltered(&env.ctx.db, "gantz").await.unwrap().is_some());
    assert!(chapters::list_for_media(&env.ctx.db, "hellsing").await.unwrap().is_empty());
    assert!(duplicates::list_all(&env.ctx.db).await.unwrap().is_empty());
}

/// Media whose folder still exists but is no longer under a library folder
/// is removed as well.
#[tokio::test]
async fn cleanup_removes_media_outside_library_folders() {
    let env = TestEnv::new().await;
    let a = env.dir("a");
    let b = env.dir("b");
    let inside = env.dir("a/Pluto");
    let outside = env.dir("b/Billy Bat");
    write_chapters(&inside, &[1]);
    write_chapters(&outside, &[1]);

    let indexer = MediaIndexer::new(&env.ctx);
    indexer.index(&inside, "manga").await.unwrap();
    indexer.index(&outside, "manga").await.unwrap();

    let narrowed = env.library("manga", &[&a]);
    let stats = cleanup::remove_orphans(&env.ctx.db, &narrowed).await.unwrap();
    assert_eq!(stats.media_removed, vec!["billy-bat"]);

    let still_wide = env.library("manga", &[&a, &b]);
    let stats = cleanup::remove_orphans(&env.ctx.db, &still_wide).await.unwrap();
    assert!(stats.media_removed.is_empty());
}

/// Cleanup of one library leaves other libraries' rows alone.
#[tokio::test]
async fn cleanup_is_scoped_to_its_library() {
    let env = TestEnv::new().await;
    let a = env.dir("a");
    let series = env.dir("other/Pluto");
    write_chapters(&series, &[1]);
    MediaIndexer::new(&env.ctx).index(&series, "comics").await.unwrap();

    let library = env.library("manga", &[&a]);
    let stats = cleanup::remove_orphans(&env.ctx.db, &library).await.unwrap();
    assert!(stats.media_removed.is_empty());
    assert!(media::get_unfiltered(&env.ctx.db, "pluto").await.unwrap().is_some());
}
