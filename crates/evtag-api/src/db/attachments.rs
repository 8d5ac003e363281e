//! Attachment persistence operations on the `evtag_attachments` table.
//!
//! An owner is keyed by its display form (`DRIVE`, `DATAROOM:<uuid>`, ...)
//! within the organization.

use sqlx::PgPool;

use evtag_core::{EvidenceId, Owner};
use evtag_store::Attachment;

use super::{decode_all, encode, BodyRow};

pub async fn upsert(pool: &PgPool, attachment: &Attachment) -> Result<(), sqlx::Error> {
    let body = encode(attachment, "attachment")?;
    sqlx::query(
        "INSERT INTO evtag_attachments (organization_id, owner_key, evidence_id, body, created_at)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (organization_id, owner_key, evidence_id) DO UPDATE SET body = EXCLUDED.body",
    )
    .bind(*attachment.owner.organization.as_uuid())
    .bind(attachment.owner.reference.to_string())
    .bind(*attachment.evidence.as_uuid())
    .bind(&body)
    .bind(attachment.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, owner: &Owner, evidence: EvidenceId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM evtag_attachments
         WHERE organization_id = $1 AND owner_key = $2 AND evidence_id = $3",
    )
    .bind(*owner.organization.as_uuid())
    .bind(owner.reference.to_string())
    .bind(*evidence.as_uuid())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<Attachment>, sqlx::Error> {
    let rows =
        sqlx::query_as::<_, BodyRow>("SELECT body FROM evtag_attachments ORDER BY created_at")
            .fetch_all(pool)
            .await?;
    Ok(decode_all(rows, "attachment"))
}
