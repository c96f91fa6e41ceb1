use crate::db::DbPool;

/// Attach tags to a media row, ignoring ones it already has.
pub async fn add_for_media(pool: &DbPool, media_slug: &str, tags: &[String]) -> Result<(), sqlx::Error> {
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() {
            continue;
        }
        sqlx::query("INSERT OR IGNORE INTO media_tags (media_slug, tag) VALUES (?, ?)")
            .bind(media_slug)
            .bind(&tag)
            .execute(pool)
            .await?;
    }
    Ok(())
}

pub async fn get_for_media(pool: &DbPool, media_slug: &str) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT tag FROM media_tags WHERE media_slug = ? ORDER BY tag")
            .bind(media_slug)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(tag,)| tag).collect())
}
