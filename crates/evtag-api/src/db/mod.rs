//! # Database Persistence Layer
//!
//! Optional Postgres write-through for rows the core owns: tags, evidence,
//! attachments, export requests and links.
//!
//! The in-memory [`Database`](evtag_store::Database) stays authoritative.
//! When `DATABASE_URL` is set, [`mirror`] writes every committed change
//! after the fact and [`hydrate`] reloads the rows on startup. Without it
//! the service runs in-memory only and state does not survive restarts.
//!
//! The external catalog is not persisted here; it is seeded by its owners.

pub mod attachments;
pub mod evidence;
pub mod exports;
pub mod mirror;
pub mod tags;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};

use evtag_export::{ExportState, Exporter};
use evtag_store::Database;

/// Connect and run migrations.
///
/// Returns `None` if no URL is configured (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool(url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = url else {
        tracing::warn!(
            "DATABASE_URL not set, running in-memory only. State will not survive restarts."
        );
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    Ok(Some(pool))
}

/// Load persisted rows into the in-memory database and the exporter.
///
/// Export requests still `CREATED` are scheduled again; ones caught
/// mid-packaging are failed by [`Exporter::restore_request`].
pub async fn hydrate(pool: &PgPool, db: &Database, exporter: &Exporter) -> Result<(), sqlx::Error> {
    let tags = tags::load_all(pool).await?;
    let evidence = evidence::load_all(pool).await?;
    let attachments = attachments::load_all(pool).await?;
    tracing::info!(
        tags = tags.len(),
        evidence = evidence.len(),
        attachments = attachments.len(),
        "hydrating evidence store"
    );
    db.hydrate(|tables| {
        for tag in tags {
            tables.restore_tag(tag);
        }
        for row in evidence {
            tables.restore_evidence(row);
        }
        for attachment in attachments {
            tables.restore_attachment(attachment);
        }
    });

    let requests = exports::load_requests(pool).await?;
    let links = exports::load_links(pool).await?;
    for link in links {
        exporter.restore_link(link);
    }
    let pending: Vec<_> = requests
        .iter()
        .filter(|r| r.state == ExportState::Created)
        .map(|r| r.id)
        .collect();
    for request in requests {
        exporter.restore_request(request);
    }
    for id in pending {
        exporter.trigger(id);
    }
    Ok(())
}

/// Every table keeps the full record in a JSONB `body` column.
#[derive(sqlx::FromRow)]
struct BodyRow {
    body: serde_json::Value,
}

fn encode<T: Serialize>(value: &T, what: &str) -> Result<serde_json::Value, sqlx::Error> {
    serde_json::to_value(value)
        .map_err(|e| sqlx::Error::Protocol(format!("failed to serialize {what}: {e}")))
}

/// Decode body rows, skipping rows that no longer parse.
fn decode_all<T: DeserializeOwned>(rows: Vec<BodyRow>, what: &str) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| decode(row.body, what))
        .collect()
}

fn decode<T: DeserializeOwned>(body: serde_json::Value, what: &str) -> Option<T> {
    match serde_json::from_value(body) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "skipping unreadable {what} row");
            None
        }
    }
}
