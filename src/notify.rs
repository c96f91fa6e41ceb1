use async_trait::async_trait;
use tracing::info;

/// Tells readers tracking a media that new chapters arrived.
#[async_trait]
pub trait ChapterNotifier: Send + Sync {
    async fn notify_new_chapters(&self, media_slug: &str, chapter_slugs: &[String]);
}

/// Writes the notification to the log and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl ChapterNotifier for LogNotifier {
    async fn notify_new_chapters(&self, media_slug: &str, chapter_slugs: &[String]) {
        if chapter_slugs.is_empty() {
            return;
        }
        info!(
            media = media_slug,
            count = chapter_slugs.len(),
            "New chapters: {}",
            chapter_slugs.join(", ")
        );
    }
}
