use crate::db::DbPool;
use crate::db::models::Chapter;

pub async fn list_for_media(pool: &DbPool, media_slug: &str) -> Result<Vec<Chapter>, sqlx::Error> {
    sqlx::query_as::<_, Chapter>(
        "SELECT media_slug, slug, name, file FROM chapters WHERE media_slug = ? ORDER BY slug",
    )
    .bind(media_slug)
    .fetch_all(pool)
    .await
}

pub async fn insert(pool: &DbPool, chapter: &Chapter) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO chapters (media_slug, slug, name, file) VALUES (?, ?, ?, ?)")
        .bind(&chapter.media_slug)
        .bind(&chapter.slug)
        .bind(&chapter.name)
        .bind(&chapter.file)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete(pool: &DbPool, media_slug: &str, slug: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM chapters WHERE media_slug = ? AND slug = ?")
        .bind(media_slug)
        .bind(slug)
        .execute(pool)
        .await?;
    Ok(())
}
