//! Tag persistence operations on the `evtag_tags` table.

use sqlx::PgPool;

use evtag_core::TagId;
use evtag_store::Tag;

use super::{decode_all, encode, BodyRow};

pub async fn upsert(pool: &PgPool, tag: &Tag) -> Result<(), sqlx::Error> {
    let body = encode(tag, "tag")?;
    sqlx::query(
        "INSERT INTO evtag_tags (id, organization_id, name, body, created_at)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, body = EXCLUDED.body",
    )
    .bind(*tag.id.as_uuid())
    .bind(*tag.organization.as_uuid())
    .bind(&tag.name)
    .bind(&body)
    .bind(tag.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, id: TagId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM evtag_tags WHERE id = $1")
        .bind(*id.as_uuid())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Load all tags on startup.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Tag>, sqlx::Error> {
    let rows = sqlx::query_as::<_, BodyRow>("SELECT body FROM evtag_tags ORDER BY created_at")
        .fetch_all(pool)
        .await?;
    Ok(decode_all(rows, "tag"))
}
