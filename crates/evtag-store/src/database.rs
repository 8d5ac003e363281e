//! # Transactional Database
//!
//! All evidence, tag, attachment and catalog rows live in one [`Tables`]
//! value. Readers take an `Arc` snapshot and never block writers. Writers
//! are serialized by a single lock and run against a private clone of the
//! current tables; the clone is published only if the closure succeeds and
//! the caller's deadline has not passed. Dropping the clone is the rollback.
//!
//! Each table sits behind its own [`Shared`] pointer, so the working clone
//! costs four reference bumps and a transaction copies only the tables it
//! writes to.
//!
//! Every commit is announced to subscribers as a [`Commit`], carrying the
//! keys that changed and the snapshot they changed in. The Postgres mirror
//! in the API crate is one such subscriber.

use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use evtag_core::{Deadline, EvidenceId, EvtagError, Owner, Result, TagId};

use crate::attachment::{Attachment, AttachmentTable};
use crate::catalog::Catalog;
use crate::evidence::{Evidence, EvidenceTable};
use crate::tags::{Tag, TagTable};

/// A copy-on-write table. Clones share rows until one of them is written
/// through, which copies that table alone.
#[derive(Debug, Default)]
pub struct Shared<T>(Arc<T>);

impl<T> Shared<T> {
    /// Whether both handles still point at the same rows.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Clone> DerefMut for Shared<T> {
    fn deref_mut(&mut self) -> &mut T {
        Arc::make_mut(&mut self.0)
    }
}

/// Every table, as one consistent value.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub tags: Shared<TagTable>,
    pub evidence: Shared<EvidenceTable>,
    pub attachments: Shared<AttachmentTable>,
    pub catalog: Shared<Catalog>,
}

impl Tables {
    /// Load a persisted tag without recording a change.
    pub fn restore_tag(&mut self, tag: Tag) {
        self.tags.restore(tag);
    }

    /// Load a persisted evidence row without recording a change.
    pub fn restore_evidence(&mut self, evidence: Evidence) {
        self.evidence.restore(evidence);
    }

    /// Load a persisted attachment without recording a change.
    pub fn restore_attachment(&mut self, attachment: Attachment) {
        self.attachments.restore(attachment);
    }

    // Untouched tables are only read, so they stay shared with the
    // previous snapshot.
    fn take_changes(&mut self) -> ChangeSet {
        let mut changes = ChangeSet::default();
        if self.tags.is_dirty() {
            changes.tags = self.tags.take_dirty();
        }
        if self.evidence.is_dirty() {
            changes.evidence = self.evidence.take_dirty();
        }
        if self.attachments.is_dirty() {
            changes.attachments = self.attachments.take_dirty();
        }
        changes
    }
}

/// Keys written by one transaction. A key whose row is absent from the
/// commit snapshot was deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub tags: BTreeSet<TagId>,
    pub evidence: BTreeSet<EvidenceId>,
    pub attachments: BTreeSet<(Owner, EvidenceId)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.evidence.is_empty() && self.attachments.is_empty()
    }
}

/// A published transaction.
#[derive(Debug, Clone)]
pub struct Commit {
    pub operation: &'static str,
    pub changes: ChangeSet,
    pub snapshot: Arc<Tables>,
}

/// The in-memory transactional engine.
#[derive(Debug, Default)]
pub struct Database {
    current: RwLock<Arc<Tables>>,
    writer: Mutex<()>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Commit>>>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// A consistent, immutable view of every table.
    pub fn snapshot(&self) -> Arc<Tables> {
        Arc::clone(&self.current.read())
    }

    /// Receive every future commit that changed at least one row.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Commit> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Replace the current tables with persisted rows. No commit is
    /// announced.
    pub fn hydrate(&self, load: impl FnOnce(&mut Tables)) {
        let _writer = self.writer.lock();
        let mut working = Tables::clone(&self.snapshot());
        load(&mut working);
        let _ = working.take_changes();
        *self.current.write() = Arc::new(working);
    }

    /// Run `f` as one transaction.
    ///
    /// Waits for the writer lock at most until `deadline`. If `f` returns
    /// `Err`, or the deadline passes before publish, nothing is written and
    /// nothing `f` returned escapes.
    pub fn transaction<T>(
        &self,
        operation: &'static str,
        deadline: Deadline,
        f: impl FnOnce(&mut Tables) -> Result<T>,
    ) -> Result<T> {
        let Some(_writer) = self.writer.try_lock_for(deadline.remaining()) else {
            tracing::warn!(operation, "transaction timed out waiting for writer lock");
            return Err(EvtagError::DeadlineExceeded { operation });
        };

        let mut working = Tables::clone(&self.snapshot());
        let out = match f(&mut working) {
            Ok(out) => out,
            Err(err) => {
                tracing::debug!(operation, error = %err, "transaction rolled back");
                return Err(err);
            }
        };
        if deadline.is_expired() {
            tracing::warn!(operation, "deadline passed before commit, rolling back");
            return Err(EvtagError::DeadlineExceeded { operation });
        }

        let changes = working.take_changes();
        let published = Arc::new(working);
        *self.current.write() = Arc::clone(&published);
        if !changes.is_empty() {
            self.announce(Commit {
                operation,
                changes,
                snapshot: published,
            });
        }
        Ok(out)
    }

    fn announce(&self, commit: Commit) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(commit.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use evtag_core::OrganizationId;

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    #[test]
    fn committed_writes_are_visible_to_new_snapshots_only() {
        let db = Database::new();
        let org = OrganizationId::new();
        let before = db.snapshot();
        db.transaction("create tag", deadline(), |t| {
            t.tags.get_or_create(org, "t1", false).map(|_| ())
        })
        .unwrap();
        assert!(before.tags.find(org, "t1").is_none());
        assert!(db.snapshot().tags.find(org, "t1").is_some());
    }

    #[test]
    fn transaction_copies_only_the_tables_it_writes() {
        let db = Database::new();
        let org = OrganizationId::new();
        let before = db.snapshot();
        db.transaction("create tag", deadline(), |t| {
            t.tags.get_or_create(org, "t1", false).map(|_| ())
        })
        .unwrap();
        let after = db.snapshot();
        assert!(!after.tags.ptr_eq(&before.tags));
        assert!(after.evidence.ptr_eq(&before.evidence));
        assert!(after.attachments.ptr_eq(&before.attachments));
        assert!(after.catalog.ptr_eq(&before.catalog));

        db.transaction("read only", deadline(), |t| {
            Ok(t.tags.find(org, "t1").is_some())
        })
        .unwrap();
        assert!(db.snapshot().tags.ptr_eq(&after.tags));
    }

    #[test]
    fn error_rolls_back_every_write() {
        let db = Database::new();
        let org = OrganizationId::new();
        let err = db
            .transaction("create then fail", deadline(), |t| {
                t.tags.get_or_create(org, "t1", false)?;
                Err::<(), _>(EvtagError::not_found("control", "x"))
            })
            .unwrap_err();
        assert!(matches!(err, EvtagError::NotFound { .. }));
        assert!(db.snapshot().tags.is_empty());
    }

    #[test]
    fn expired_deadline_discards_the_result() {
        let db = Database::new();
        let org = OrganizationId::new();
        let staged = db.transaction("slow", Deadline::after(Duration::from_millis(20)), |t| {
            t.tags.get_or_create(org, "t1", false)?;
            std::thread::sleep(Duration::from_millis(40));
            Ok(vec!["staged invalidation"])
        });
        assert!(matches!(
            staged,
            Err(EvtagError::DeadlineExceeded { operation: "slow" })
        ));
        assert!(db.snapshot().tags.is_empty());
    }

    #[test]
    fn writer_lock_wait_is_bounded_by_deadline() {
        let db = Arc::new(Database::new());
        let holder = Arc::clone(&db);
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let handle = std::thread::spawn(move || {
            holder
                .transaction("long", Deadline::after(Duration::from_secs(5)), |_| {
                    let _ = locked_tx.send(());
                    std::thread::sleep(Duration::from_millis(200));
                    Ok(())
                })
                .unwrap();
        });
        locked_rx.recv().unwrap();
        let err = db
            .transaction("blocked", Deadline::after(Duration::from_millis(10)), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, EvtagError::DeadlineExceeded { operation: "blocked" }));
        handle.join().unwrap();
    }

    #[test]
    fn subscribers_see_changed_keys() {
        let db = Database::new();
        let mut rx = db.subscribe();
        let org = OrganizationId::new();
        let tag = db
            .transaction("create tag", deadline(), |t| t.tags.get_or_create(org, "t1", false))
            .unwrap();
        db.transaction("read only", deadline(), |_| Ok(())).unwrap();

        let commit = rx.try_recv().unwrap();
        assert_eq!(commit.operation, "create tag");
        assert_eq!(commit.changes.tags, BTreeSet::from([tag.id]));
        assert!(commit.snapshot.tags.get(&tag.id).is_some());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn hydrate_loads_rows_silently() {
        let db = Database::new();
        let mut rx = db.subscribe();
        let org = OrganizationId::new();
        let tag = Tag {
            id: TagId::new(),
            organization: org,
            name: "restored".into(),
            is_manual: true,
            created_at: chrono::Utc::now(),
        };
        db.hydrate(|t| t.restore_tag(tag.clone()));
        assert_eq!(db.snapshot().tags.find(org, "restored"), Some(&tag));
        assert!(rx.try_recv().is_err());
    }
}
