use crate::db::DbPool;
use crate::db::models::MediaDuplicate;

/// Exact lookup; callers pass the pair already in canonical order.
pub async fn get_by_folders(
    pool: &DbPool,
    media_slug: &str,
    folder_path1: &str,
    folder_path2: &str,
) -> Result<Option<MediaDuplicate>, sqlx::Error> {
    sqlx::query_as::<_, MediaDuplicate>(
        "SELECT id, media_slug, library_slug, folder_path1, folder_path2 FROM media_duplicates \
         WHERE media_slug = ? AND folder_path1 = ? AND folder_path2 = ?",
    )
    .bind(media_slug)
    .bind(folder_path1)
    .bind(folder_path2)
    .fetch_optional(pool)
    .await
}

pub async fn insert(
    pool: &DbPool,
    media_slug: &str,
    library_slug: &str,
    folder_path1: &str,
    folder_path2: &str,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO media_duplicates (media_slug, library_slug, folder_path1, folder_path2) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(media_slug)
    .bind(library_slug)
    .bind(folder_path1)
    .bind(folder_path2)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn list_all(pool: &DbPool) -> Result<Vec<MediaDuplicate>, sqlx::Error> {
    sqlx::query_as::<_, MediaDuplicate>(
        "SELECT id, media_slug, library_slug, folder_path1, folder_path2 FROM media_duplicates \
         ORDER BY id",
    )
    .fetch_all(pool)
    .await
}

pub async fn list_for_media(pool: &DbPool, media_slug: &str) -> Result<Vec<MediaDuplicate>, sqlx::Error> {
    sqlx::query_as::<_, MediaDuplicate>(
        "SELECT id, media_slug, library_slug, folder_path1, folder_path2 FROM media_duplicates \
         WHERE media_slug = ? ORDER BY id",
    )
    .bind(media_slug)
    .fetch_all(pool)
    .await
}

pub async fn delete_by_id(pool: &DbPool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM media_duplicates WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
