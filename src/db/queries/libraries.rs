use crate::db::DbPool;
use crate::db::models::Library;

pub async fn list_all(pool: &DbPool) -> Result<Vec<Library>, sqlx::Error> {
    sqlx::query_as::<_, Library>("SELECT * FROM libraries ORDER BY slug")
        .fetch_all(pool)
        .await
}

pub async fn get(pool: &DbPool, slug: &str) -> Result<Option<Library>, sqlx::Error> {
    sqlx::query_as::<_, Library>("SELECT * FROM libraries WHERE slug = ?")
        .bind(slug)
        .fetch_optional(pool)
        .await
}

/// Insert a library or overwrite every column of an existing one.
pub async fn upsert(pool: &DbPool, library: &Library) -> Result<(), sqlx::Error> {
    let folders = serde_json::to_string(&library.folders)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    sqlx::query(
        "INSERT INTO libraries (slug, name, folders, schedule, description) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT (slug) DO UPDATE SET name = excluded.name, folders = excluded.folders, \
         schedule = excluded.schedule, description = excluded.description",
    )
    .bind(&library.slug)
    .bind(&library.name)
    .bind(folders)
    .bind(&library.schedule)
    .bind(&library.description)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete(pool: &DbPool, slug: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM libraries WHERE slug = ?")
        .bind(slug)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
