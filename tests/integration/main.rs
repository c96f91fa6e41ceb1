mod duplicate_tests;
mod indexing_tests;
mod scan_tests;

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use mangaindex::config::{Config, CoverImageConfig};
use mangaindex::covers::{ArchiveImage, CoverArtPipeline, CoverStrategy, PosterFile};
use mangaindex::db::create_test_pool;
use mangaindex::db::models::Library;
use mangaindex::metadata::{DisabledProvider, MediaMetadata, MetadataError, MetadataProvider};
use mangaindex::notify::ChapterNotifier;
use mangaindex::state::IndexContext;

/// Records every notification instead of delivering it.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingNotifier {
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChapterNotifier for RecordingNotifier {
    async fn notify_new_chapters(&self, media_slug: &str, chapter_slugs: &[String]) {
        self.calls
            .lock()
            .unwrap()
            .push((media_slug.to_string(), chapter_slugs.to_vec()));
    }
}

/// Answers every lookup with the same canned result.
pub struct FakeMetadata {
    result: Result<Option<MediaMetadata>, String>,
    queries: Mutex<Vec<String>>,
}

impl FakeMetadata {
    pub fn found(metadata: MediaMetadata) -> Self {
        Self {
            result: Ok(Some(metadata)),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Err("provider unavailable".to_string()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataProvider for FakeMetadata {
    async fn find_best_match(&self, name: &str) -> Result<Option<MediaMetadata>, MetadataError> {
        self.queries.lock().unwrap().push(name.to_string());
        self.result.clone().map_err(MetadataError::Response)
    }
}

/// A temp library root, a temp cover cache and a context wired to fakes.
pub struct TestEnv {
    pub ctx: IndexContext,
    pub notifier: Arc<RecordingNotifier>,
    pub root: PathBuf,
    pub cache: PathBuf,
    _root_dir: TempDir,
    _cache_dir: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_metadata(Arc::new(DisabledProvider)).await
    }

    pub async fn with_metadata(metadata: Arc<dyn MetadataProvider>) -> Self {
        let root_dir = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(root_dir.path()).unwrap();
        let cache = cache_dir.path().to_path_buf();

        let image = CoverImageConfig::new(40, 60, 80);
        let strategies: Vec<Box<dyn CoverStrategy>> = vec![
            Box::new(PosterFile::new(image)),
            Box::new(ArchiveImage::new(image)),
        ];
        let covers = CoverArtPipeline::new(&cache, "/api/posters", image, strategies);
        let config: Config = toml::from_str("").unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = IndexContext::new(
            config,
            create_test_pool().await,
            covers,
            metadata,
            notifier.clone(),
        );
        Self {
            ctx,
            notifier,
            root,
            cache,
            _root_dir: root_dir,
            _cache_dir: cache_dir,
        }
    }

    /// Create `rel` (and parents) under the library root.
    pub fn dir(&self, rel: &str) -> PathBuf {
        let path = self.root.join(rel);
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    pub fn library(&self, slug: &str, folders: &[&Path]) -> Library {
        Library {
            slug: slug.to_string(),
            name: slug.to_string(),
            folders: folders
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            schedule: "@daily".to_string(),
            description: String::new(),
        }
    }
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let image = image::DynamicImage::new_rgb8(width, height);
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let opts = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        zip.start_file(*name, opts).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// A chapter archive of `pages` images of the given size.
pub fn write_cbz(path: &Path, width: u32, height: u32, pages: usize) {
    let entries: Vec<(String, Vec<u8>)> = (1..=pages)
        .map(|i| (format!("{i:03}.png"), png(width, height)))
        .collect();
    let refs: Vec<(&str, Vec<u8>)> = entries
        .iter()
        .map(|(n, d)| (n.as_str(), d.clone()))
        .collect();
    write_zip(path, &refs);
}

/// Chapters `Chapter {n}.cbz` for every `n` in `numbers`.
pub fn write_chapters(media_dir: &Path, numbers: &[u32]) {
    for n in numbers {
        write_cbz(&media_dir.join(format!("Chapter {n}.cbz")), 8, 12, 2);
    }
}
