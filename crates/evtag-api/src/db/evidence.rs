//! Evidence persistence operations on the `evtag_evidence` table.
//!
//! Soft-deleted rows are kept with `deleted_at` set and hydrated as such.

use sqlx::PgPool;

use evtag_core::EvidenceId;
use evtag_store::Evidence;

use super::{decode_all, encode, BodyRow};

pub async fn upsert(pool: &PgPool, evidence: &Evidence) -> Result<(), sqlx::Error> {
    let body = encode(evidence, "evidence")?;
    sqlx::query(
        "INSERT INTO evtag_evidence (id, organization_id, name, kind, body, deleted_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (id) DO UPDATE SET
             name = EXCLUDED.name,
             body = EXCLUDED.body,
             deleted_at = EXCLUDED.deleted_at,
             updated_at = EXCLUDED.updated_at",
    )
    .bind(*evidence.id.as_uuid())
    .bind(*evidence.organization.as_uuid())
    .bind(&evidence.name)
    .bind(evidence.kind.as_str())
    .bind(&body)
    .bind(evidence.deleted_at)
    .bind(evidence.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, id: EvidenceId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM evtag_evidence WHERE id = $1")
        .bind(*id.as_uuid())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<Evidence>, sqlx::Error> {
    let rows = sqlx::query_as::<_, BodyRow>("SELECT body FROM evtag_evidence ORDER BY updated_at")
        .fetch_all(pool)
        .await?;
    Ok(decode_all(rows, "evidence"))
}
