use crate::db::DbPool;
use crate::db::models::{Media, NewMedia};

/// Library-scoped lookup.
pub async fn get_by_slug(
    pool: &DbPool,
    library_slug: &str,
    slug: &str,
) -> Result<Option<Media>, sqlx::Error> {
    sqlx::query_as::<_, Media>("SELECT * FROM media WHERE library_slug = ? AND slug = ?")
        .bind(library_slug)
        .bind(slug)
        .fetch_optional(pool)
        .await
}

/// Catalog-wide lookup; slugs are unique across all libraries.
pub async fn get_unfiltered(pool: &DbPool, slug: &str) -> Result<Option<Media>, sqlx::Error> {
    sqlx::query_as::<_, Media>("SELECT * FROM media WHERE slug = ?")
        .bind(slug)
        .fetch_optional(pool)
        .await
}

pub async fn list_by_library(pool: &DbPool, library_slug: &str) -> Result<Vec<Media>, sqlx::Error> {
    sqlx::query_as::<_, Media>("SELECT * FROM media WHERE library_slug = ? ORDER BY slug")
        .bind(library_slug)
        .fetch_all(pool)
        .await
}

pub async fn insert(pool: &DbPool, media: &NewMedia) -> Result<Media, sqlx::Error> {
    sqlx::query(
        "INSERT INTO media (slug, library_slug, name, path, file_count, media_type, status, \
         content_rating, cover_url, description, year, original_language, author) \
         VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&media.slug)
    .bind(&media.library_slug)
    .bind(&media.name)
    .bind(&media.path)
    .bind(media.media_type.as_str())
    .bind(&media.status)
    .bind(&media.content_rating)
    .bind(&media.cover_url)
    .bind(&media.description)
    .bind(media.year)
    .bind(&media.original_language)
    .bind(&media.author)
    .execute(pool)
    .await?;

    sqlx::query_as::<_, Media>("SELECT * FROM media WHERE slug = ?")
        .bind(&media.slug)
        .fetch_one(pool)
        .await
}

/// Write back the mutable columns of a media row.
pub async fn update(pool: &DbPool, media: &Media) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE media SET name = ?, path = ?, file_count = ?, media_type = ?, status = ?, \
         content_rating = ?, cover_url = ?, description = ?, year = ?, original_language = ?, \
         author = ?, updated_at = CURRENT_TIMESTAMP WHERE slug = ?",
    )
    .bind(&media.name)
    .bind(&media.path)
    .bind(media.file_count)
    .bind(&media.media_type)
    .bind(&media.status)
    .bind(&media.content_rating)
    .bind(&media.cover_url)
    .bind(&media.description)
    .bind(media.year)
    .bind(&media.original_language)
    .bind(&media.author)
    .bind(&media.slug)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_file_count(pool: &DbPool, slug: &str, file_count: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE media SET file_count = ? WHERE slug = ?")
        .bind(file_count)
        .bind(slug)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn touch(pool: &DbPool, slug: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE media SET updated_at = CURRENT_TIMESTAMP WHERE slug = ?")
        .bind(slug)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a media row together with its chapters and tags.
pub async fn delete(pool: &DbPool, slug: &str) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM chapters WHERE media_slug = ?")
        .bind(slug)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM media_tags WHERE media_slug = ?")
        .bind(slug)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM media WHERE slug = ?")
        .bind(slug)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count(pool: &DbPool) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}
