use std::sync::Arc;

use mangaindex::db::models::MediaType;
use mangaindex::db::queries::{chapters, media, tags};
use mangaindex::metadata::MediaMetadata;
use mangaindex::scanner::media::{IndexOutcome, MediaIndexer, SkipReason};

use super::*;

async fn chapter_slugs(env: &TestEnv, media_slug: &str) -> Vec<String> {
    let mut slugs: Vec<String> = chapters::list_for_media(&env.ctx.db, media_slug)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.slug)
        .collect();
    slugs.sort();
    slugs
}

/// A new folder becomes a media with chapters, a cover and one notification.
#[tokio::test]
async fn new_media_is_created_with_chapters_and_cover() {
    let env = TestEnv::new().await;
    let series = env.dir("[Group] One Piece (Digital)");
    write_chapters(&series, &[1, 2]);

    let outcome = MediaIndexer::new(&env.ctx)
        .index(&series, "manga")
        .await
        .unwrap();
    let IndexOutcome::Created(reconciled) = outcome else {
        panic!("expected a new media, got {outcome:?}");
    };
    assert_eq!(reconciled.added, vec!["chapter-1", "chapter-2"]);

    let row = media::get_by_slug(&env.ctx.db, "manga", "one-piece")
        .await
        .unwrap()
        .expect("media row");
    assert_eq!(row.name, "One Piece");
    assert_eq!(row.path, series.to_string_lossy());
    assert_eq!(row.file_count, 2);
    assert_eq!(row.media_type, "manga");
    assert_eq!(row.status, "unknown");
    assert_eq!(row.content_rating, "safe");
    assert_eq!(row.cover_url, "/api/posters/one-piece.jpg");
    assert!(env.cache.join("one-piece.jpg").exists());

    let stored = chapters::list_for_media(&env.ctx.db, "one-piece").await.unwrap();
    let first = stored.iter().find(|c| c.slug == "chapter-1").unwrap();
    assert_eq!(first.name, "Chapter 1");
    assert_eq!(first.file, "Chapter 1.cbz");
    assert!(env.cache.join("previews/one-piece/chapter-1.jpg").is_file());
    assert!(env.cache.join("previews/one-piece/chapter-2.jpg").is_file());

    assert_eq!(
        env.notifier.calls(),
        vec![(
            "one-piece".to_string(),
            vec!["chapter-1".to_string(), "chapter-2".to_string()]
        )]
    );
}

/// Indexing the same folder twice with nothing changed does not touch the
/// catalog or notify again.
#[tokio::test]
async fn unchanged_folder_takes_fast_path() {
    let env = TestEnv::new().await;
    let series = env.dir("Berserk");
    write_chapters(&series, &[1, 2, 3]);

    let indexer = MediaIndexer::new(&env.ctx);
    indexer.index(&series, "manga").await.unwrap();
    let before = media::get_unfiltered(&env.ctx.db, "berserk").await.unwrap().unwrap();

    let outcome = indexer.index(&series, "manga").await.unwrap();
    assert_eq!(outcome, IndexOutcome::Unchanged);

    let after = media::get_unfiltered(&env.ctx.db, "berserk").await.unwrap().unwrap();
    assert_eq!(before.updated_at, after.updated_at);
    assert_eq!(after.file_count, 3);
    assert_eq!(env.notifier.calls().len(), 1);
}

/// {c1, c2, c3} on disk becoming {c1, c4} leaves exactly {c1, c4} stored.
#[tokio::test]
async fn changed_folder_is_reconciled() {
    let env = TestEnv::new().await;
    let series = env.dir("Vagabond");
    write_chapters(&series, &[1, 2, 3]);
    let indexer = MediaIndexer::new(&env.ctx);
    indexer.index(&series, "manga").await.unwrap();

    std::fs::remove_file(series.join("Chapter 2.cbz")).unwrap();
    std::fs::remove_file(series.join("Chapter 3.cbz")).unwrap();
    write_chapters(&series, &[4]);

    let outcome = indexer.index(&series, "manga").await.unwrap();
    let IndexOutcome::Updated(reconciled) = outcome else {
        panic!("expected an update, got {outcome:?}");
    };
    assert_eq!(reconciled.added, vec!["chapter-4"]);
    assert_eq!(reconciled.deleted, vec!["chapter-2", "chapter-3"]);
    assert_eq!(chapter_slugs(&env, "vagabond").await, vec!["chapter-1", "chapter-4"]);

    let row = media::get_unfiltered(&env.ctx.db, "vagabond").await.unwrap().unwrap();
    assert_eq!(row.file_count, 2);
    assert!(env.cache.join("previews/vagabond/chapter-4.jpg").is_file());
    assert!(!env.cache.join("previews/vagabond/chapter-2.jpg").exists());

    let calls = env.notifier.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1], ("vagabond".to_string(), vec!["chapter-4".to_string()]));
}

/// Replacing one chapter with another keeps the candidate count, so the
/// fast path wins and the swap goes unnoticed.
#[tokio::test]
async fn same_count_swap_is_not_detected() {
    let env = TestEnv::new().await;
    let series = env.dir("Monster");
    write_chapters(&series, &[1, 2]);
    let indexer = MediaIndexer::new(&env.ctx);
    indexer.index(&series, "manga").await.unwrap();

    std::fs::remove_file(series.join("Chapter 2.cbz")).unwrap();
    write_chapters(&series, &[3]);

    assert_eq!(indexer.index(&series, "manga").await.unwrap(), IndexOutcome::Unchanged);
    assert_eq!(chapter_slugs(&env, "monster").await, vec!["chapter-1", "chapter-2"]);
}

#[tokio::test]
async fn single_archive_is_one_chapter_media() {
    let env = TestEnv::new().await;
    let file = env.root.join("Oneshot.cbz");
    write_cbz(&file, 8, 12, 3);

    let outcome = MediaIndexer::new(&env.ctx).index(&file, "manga").await.unwrap();
    assert!(matches!(outcome, IndexOutcome::Created(_)));

    let stored = chapters::list_for_media(&env.ctx.db, "oneshot").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].file, "Oneshot.cbz");
    let row = media::get_unfiltered(&env.ctx.db, "oneshot").await.unwrap().unwrap();
    assert_eq!(row.file_count, 1);
    assert_eq!(row.cover_url, "/api/posters/oneshot.jpg");
}

#[tokio::test]
async fn provider_metadata_fills_the_row() {
    let provider = Arc::new(FakeMetadata::found(MediaMetadata {
        title: "Solo Leveling".into(),
        description: "Hunters and gates.".into(),
        year: Some(2018),
        original_language: "ko".into(),
        status: "completed".into(),
        content_rating: "suggestive".into(),
        author: "Chugong".into(),
        tags: vec!["Action".into(), "Fantasy".into()],
        media_type: Some(MediaType::Manhwa),
        ..Default::default()
    }));
    let env = TestEnv::with_metadata(provider.clone()).await;
    let series = env.dir("Solo Leveling [HQ]");
    write_chapters(&series, &[1]);

    MediaIndexer::new(&env.ctx).index(&series, "manga").await.unwrap();
    assert_eq!(provider.queries(), vec!["Solo Leveling"]);

    let row = media::get_unfiltered(&env.ctx.db, "solo-leveling").await.unwrap().unwrap();
    assert_eq!(row.name, "Solo Leveling");
    assert_eq!(row.media_type, "manhwa");
    assert_eq!(row.status, "completed");
    assert_eq!(row.content_rating, "suggestive");
    assert_eq!(row.year, Some(2018));
    assert_eq!(row.author, "Chugong");
    assert_eq!(row.description, "Hunters and gates.");

    let mut stored_tags = tags::get_for_media(&env.ctx.db, "solo-leveling").await.unwrap();
    stored_tags.sort();
    assert_eq!(stored_tags, vec!["Action", "Fantasy"]);
}

/// A failing provider degrades to defaults instead of failing the media.
#[tokio::test]
async fn provider_failure_does_not_block_indexing() {
    let env = TestEnv::with_metadata(Arc::new(FakeMetadata::failing())).await;
    let series = env.dir("Akira");
    write_chapters(&series, &[1, 2]);

    let outcome = MediaIndexer::new(&env.ctx).index(&series, "manga").await.unwrap();
    assert!(matches!(outcome, IndexOutcome::Created(_)));
    let row = media::get_unfiltered(&env.ctx.db, "akira").await.unwrap().unwrap();
    assert_eq!(row.status, "unknown");
    assert_eq!(row.cover_url, "/api/posters/akira.jpg");
}

#[tokio::test]
async fn epub_content_makes_a_novel() {
    let env = TestEnv::new().await;
    let series = env.dir("Spice and Wolf");
    write_zip(
        &series.join("Volume 1.epub"),
        &[
            ("mimetype", b"application/epub+zip".to_vec()),
            ("OEBPS/images/cover.png", png(8, 12)),
        ],
    );

    MediaIndexer::new(&env.ctx).index(&series, "novels").await.unwrap();
    let row = media::get_unfiltered(&env.ctx.db, "spice-and-wolf").await.unwrap().unwrap();
    assert_eq!(row.media_type, "novel");
    assert_eq!(chapter_slugs(&env, "spice-and-wolf").await, vec!["volume-1"]);
}

#[tokio::test]
async fn tall_pages_make_a_webtoon() {
    let env = TestEnv::new().await;
    let series = env.dir("Tower of God");
    write_cbz(&series.join("Episode 1.cbz"), 10, 40, 3);

    MediaIndexer::new(&env.ctx).index(&series, "manga").await.unwrap();
    let row = media::get_unfiltered(&env.ctx.db, "tower-of-god").await.unwrap().unwrap();
    assert_eq!(row.media_type, "webtoon");
}

/// A poster file in the media folder wins over the first archive page.
#[tokio::test]
async fn poster_file_is_used_for_cover() {
    let env = TestEnv::new().await;
    let series = env.dir("Blame");
    write_chapters(&series, &[1]);
    std::fs::write(series.join("Cover.PNG"), png(20, 30)).unwrap();

    MediaIndexer::new(&env.ctx).index(&series, "manga").await.unwrap();
    let row = media::get_unfiltered(&env.ctx.db, "blame").await.unwrap().unwrap();
    assert_eq!(row.cover_url, "/api/posters/blame.jpg");
    let cached = image::open(env.cache.join("blame.jpg")).unwrap();
    assert_eq!((cached.width(), cached.height()), (40, 60));
}

#[tokio::test]
async fn slug_owned_by_other_library_is_skipped() {
    let env = TestEnv::new().await;
    let first = env.dir("a/Dorohedoro");
    let second = env.dir("b/Dorohedoro (Digital)");
    write_chapters(&first, &[1]);
    write_chapters(&second, &[1, 2]);

    let indexer = MediaIndexer::new(&env.ctx);
    indexer.index(&first, "manga").await.unwrap();
    let outcome = indexer.index(&second, "comics").await.unwrap();
    assert_eq!(
        outcome,
        IndexOutcome::Skipped(SkipReason::OtherLibrary("manga".into()))
    );

    let row = media::get_unfiltered(&env.ctx.db, "dorohedoro").await.unwrap().unwrap();
    assert_eq!(row.library_slug, "manga");
    assert_eq!(row.path, first.to_string_lossy());
    assert_eq!(row.file_count, 1);
}

#[tokio::test]
async fn name_without_title_is_skipped() {
    let env = TestEnv::new().await;
    let junk = env.dir("[Group] (2020)");
    write_chapters(&junk, &[1]);

    let outcome = MediaIndexer::new(&env.ctx).index(&junk, "manga").await.unwrap();
    assert_eq!(outcome, IndexOutcome::Skipped(SkipReason::EmptyName));
    assert_eq!(media::count(&env.ctx.db).await.unwrap(), 0);
}

/// Disk {f1, f2, f3} against a catalog of {f1, f4}.
#[tokio::test]
async fn reconciler_diffs_disk_against_catalog() {
    use mangaindex::db::models::{Chapter, NewMedia};
    use mangaindex::scanner::chapters::ChapterReconciler;

    let env = TestEnv::new().await;
    let series = env.dir("Pluto");
    write_chapters(&series, &[1, 2, 3]);

    media::insert(
        &env.ctx.db,
        &NewMedia {
            slug: "pluto".into(),
            library_slug: "manga".into(),
            name: "Pluto".into(),
            path: series.to_string_lossy().into_owned(),
            media_type: MediaType::Manga,
            status: "unknown".into(),
            content_rating: "safe".into(),
            cover_url: String::new(),
            description: String::new(),
            year: None,
            original_language: String::new(),
            author: String::new(),
        },
    )
    .await
    .unwrap();
    for n in [1, 4] {
        chapters::insert(
            &env.ctx.db,
            &Chapter {
                media_slug: "pluto".into(),
                slug: format!("chapter-{n}"),
                name: format!("Chapter {n}"),
                file: format!("Chapter {n}.cbz"),
            },
        )
        .await
        .unwrap();
    }

    let outcome = ChapterReconciler::new(&env.ctx.db)
        .reconcile("pluto", &series)
        .await
        .unwrap();
    assert_eq!(outcome.added, vec!["chapter-2", "chapter-3"]);
    assert_eq!(outcome.deleted, vec!["chapter-4"]);
    assert_eq!(outcome.file_count, 3);
    assert_eq!(
        chapter_slugs(&env, "pluto").await,
        vec!["chapter-1", "chapter-2", "chapter-3"]
    );
    let row = media::get_unfiltered(&env.ctx.db, "pluto").await.unwrap().unwrap();
    assert_eq!(row.file_count, 3);
}
