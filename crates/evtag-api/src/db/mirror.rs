//! Write-through of committed changes.
//!
//! Each [`Commit`] lists the keys it wrote. A key whose row is present in
//! the commit's snapshot is upserted; an absent one was deleted. Commits
//! are applied in order, one at a time, so Postgres trails the in-memory
//! database but never reorders it. A failed write is logged and skipped.

use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use evtag_export::ExportEvent;
use evtag_store::Commit;

use super::{attachments, evidence, exports, tags};

/// Counts of rows written by one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub upserted: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl MirrorReport {
    /// `Ok(true)` marks an upsert, `Ok(false)` a delete.
    fn record(&mut self, result: Result<bool, sqlx::Error>, operation: &'static str) {
        match result {
            Ok(true) => self.upserted += 1,
            Ok(false) => self.deleted += 1,
            Err(e) => {
                tracing::error!(operation, error = %e, "failed to mirror row");
                self.failed += 1;
            }
        }
    }
}

pub async fn apply_commit(pool: &PgPool, commit: &Commit) -> MirrorReport {
    let mut report = MirrorReport::default();
    let snapshot = &commit.snapshot;

    for id in &commit.changes.tags {
        let result = match snapshot.tags.get(id) {
            Some(tag) => tags::upsert(pool, tag).await.map(|_| true),
            None => tags::delete(pool, *id).await.map(|_| false),
        };
        report.record(result, commit.operation);
    }
    for id in &commit.changes.evidence {
        let result = match snapshot.evidence.get_any(id) {
            Some(row) => evidence::upsert(pool, row).await.map(|_| true),
            None => evidence::delete(pool, *id).await.map(|_| false),
        };
        report.record(result, commit.operation);
    }
    for (owner, id) in &commit.changes.attachments {
        let result = match snapshot.attachments.get(owner, id) {
            Some(attachment) => attachments::upsert(pool, attachment).await.map(|_| true),
            None => attachments::delete(pool, owner, *id).await.map(|_| false),
        };
        report.record(result, commit.operation);
    }

    tracing::debug!(
        operation = commit.operation,
        upserted = report.upserted,
        deleted = report.deleted,
        failed = report.failed,
        "commit mirrored"
    );
    report
}

pub async fn apply_export_event(pool: &PgPool, event: &ExportEvent) -> Result<(), sqlx::Error> {
    match event {
        ExportEvent::Request(request) => exports::upsert_request(pool, request).await,
        ExportEvent::Link(link) => exports::upsert_link(pool, link).await,
    }
}

/// Drain both streams into Postgres until their senders are dropped.
pub fn spawn(
    pool: PgPool,
    mut commits: mpsc::UnboundedReceiver<Commit>,
    mut exports: mpsc::UnboundedReceiver<ExportEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut commits_open = true;
        let mut exports_open = true;
        while commits_open || exports_open {
            tokio::select! {
                commit = commits.recv(), if commits_open => match commit {
                    Some(commit) => {
                        apply_commit(&pool, &commit).await;
                    }
                    None => commits_open = false,
                },
                event = exports.recv(), if exports_open => match event {
                    Some(event) => {
                        if let Err(e) = apply_export_event(&pool, &event).await {
                            tracing::error!(error = %e, "failed to mirror export event");
                        }
                    }
                    None => exports_open = false,
                },
            }
        }
        tracing::info!("persistence mirror stopped");
    })
}
