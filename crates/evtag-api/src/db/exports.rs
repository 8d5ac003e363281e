//! Export request and link persistence.
//!
//! The exporter announces every state change; both tables are plain
//! upserts keyed by id.

use sqlx::PgPool;

use evtag_export::{ExportRequest, Link};

use super::{decode_all, encode, BodyRow};

pub async fn upsert_request(pool: &PgPool, request: &ExportRequest) -> Result<(), sqlx::Error> {
    let body = encode(request, "export request")?;
    sqlx::query(
        "INSERT INTO evtag_export_requests (id, organization_id, state, body, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (id) DO UPDATE SET
             state = EXCLUDED.state,
             body = EXCLUDED.body,
             updated_at = EXCLUDED.updated_at",
    )
    .bind(*request.id.as_uuid())
    .bind(*request.organization.as_uuid())
    .bind(request.state.as_str())
    .bind(&body)
    .bind(request.created_at)
    .bind(request.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_link(pool: &PgPool, link: &Link) -> Result<(), sqlx::Error> {
    let body = encode(link, "link")?;
    sqlx::query(
        "INSERT INTO evtag_links (id, request_id, is_enabled, expiration_date, body)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (id) DO UPDATE SET is_enabled = EXCLUDED.is_enabled, body = EXCLUDED.body",
    )
    .bind(*link.id.as_uuid())
    .bind(*link.request.as_uuid())
    .bind(link.is_enabled)
    .bind(link.expiration_date)
    .bind(&body)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn load_requests(pool: &PgPool) -> Result<Vec<ExportRequest>, sqlx::Error> {
    let rows = sqlx::query_as::<_, BodyRow>(
        "SELECT body FROM evtag_export_requests ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;
    Ok(decode_all(rows, "export request"))
}

pub async fn load_links(pool: &PgPool) -> Result<Vec<Link>, sqlx::Error> {
    let rows = sqlx::query_as::<_, BodyRow>("SELECT body FROM evtag_links")
        .fetch_all(pool)
        .await?;
    Ok(decode_all(rows, "link"))
}
