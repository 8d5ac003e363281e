//! # Async Exporter
//!
//! [`Exporter::create`] freezes the evidence set of a Dataroom or the
//! Drive, stores the request in `CREATED` and schedules it. One task per
//! request then packages the archive, uploads it, mints a [`Link`] and
//! mails the requester. Tasks run behind a semaphore sized by
//! `export.max_concurrent`.
//!
//! Scheduling claims the request (`CREATED → PACKAGING`) under the store's
//! write lock, so triggering the same request again never starts a second
//! packaging run. A failure anywhere in the pipeline, mail included, is
//! recorded on the request and the request is never mailed.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use evtag_core::config::ExportConfig;
use evtag_core::{
    parse_time_zone, EvidenceId, EvtagError, ExportRequestId, LinkId, OrganizationId, Result,
};
use evtag_store::{BlobStore, Database, DocumentRenderer, Store, Tables};

use crate::archive;
use crate::error::LinkError;
use crate::link::Link;
use crate::mailer::{ExportEmail, Mailer};
use crate::request::{ExportItem, ExportRequest, ExportScope, ExportState, NewExport};
use crate::storage::{link_expiry, ObjectStorage};

/// A change to an export request or link, for persistence mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportEvent {
    Request(ExportRequest),
    Link(Link),
}

/// Resolve the evidence an export will contain.
///
/// With `explicit` ids, every id must be live evidence attached to the
/// scope owner.
pub fn snapshot_items(
    tables: &Tables,
    organization: OrganizationId,
    scope: ExportScope,
    explicit: Option<&[EvidenceId]>,
) -> Result<Vec<ExportItem>> {
    let owner = scope.owner(organization);
    if !tables.catalog.owner_exists(&owner) {
        return Err(EvtagError::not_found("owner", owner));
    }
    let in_scope: BTreeSet<EvidenceId> =
        tables.attachments.evidence_of(&owner).into_iter().collect();
    let ids: BTreeSet<EvidenceId> = match explicit {
        None => in_scope,
        Some(ids) => {
            if let Some(missing) = ids.iter().find(|id| !in_scope.contains(id)) {
                return Err(EvtagError::not_found("evidence", missing));
            }
            ids.iter().copied().collect()
        }
    };
    Ok(ids
        .iter()
        .filter_map(|id| tables.evidence.get(id))
        .map(ExportItem::from)
        .collect())
}

struct Inner {
    db: Arc<Database>,
    blobs: Arc<dyn BlobStore>,
    renderer: Arc<dyn DocumentRenderer>,
    storage: Arc<dyn ObjectStorage>,
    mailer: Arc<dyn Mailer>,
    requests: Store<ExportRequestId, ExportRequest>,
    links: Store<LinkId, Link>,
    permits: Arc<Semaphore>,
    tasks: Mutex<HashMap<ExportRequestId, JoinHandle<()>>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ExportEvent>>>,
    config: ExportConfig,
}

/// Bounded pool of export packaging tasks.
#[derive(Clone)]
pub struct Exporter {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("requests", &self.inner.requests.len())
            .field("links", &self.inner.links.len())
            .field("in_flight", &self.in_flight())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Exporter {
    pub fn new(
        db: Arc<Database>,
        blobs: Arc<dyn BlobStore>,
        renderer: Arc<dyn DocumentRenderer>,
        storage: Arc<dyn ObjectStorage>,
        mailer: Arc<dyn Mailer>,
        config: ExportConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            inner: Arc::new(Inner {
                db,
                blobs,
                renderer,
                storage,
                mailer,
                requests: Store::new(),
                links: Store::new(),
                permits,
                tasks: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(Vec::new()),
                config,
            }),
        }
    }

    /// Receive every future request and link change.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ExportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    fn announce(&self, event: ExportEvent) {
        self.inner
            .subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Snapshot the evidence set, store the request and schedule it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn create(&self, new: NewExport) -> Result<ExportRequestId> {
        parse_time_zone(&new.time_zone)?;
        let snapshot = self.inner.db.snapshot();
        let items = snapshot_items(
            &snapshot,
            new.organization,
            new.scope,
            new.evidence_ids.as_deref(),
        )?;
        let request = ExportRequest::new(new, items);
        let id = request.id;
        tracing::info!(
            request_id = %id,
            organization = %request.organization,
            items = request.items.len(),
            "export request created"
        );
        self.inner.requests.insert(id, request.clone());
        self.announce(ExportEvent::Request(request));
        self.trigger(id);
        Ok(id)
    }

    /// Schedule packaging if the request is still `CREATED`. Returns
    /// whether a task was started.
    pub fn trigger(&self, id: ExportRequestId) -> bool {
        let claimed = self.inner.requests.try_update(&id, |r| {
            r.start()?;
            Ok::<_, crate::error::TransitionError>(r.clone())
        });
        let request = match claimed {
            Some(Ok(request)) => request,
            Some(Err(err)) => {
                tracing::debug!(request_id = %id, error = %err, "export already claimed");
                return false;
            }
            None => return false,
        };
        self.announce(ExportEvent::Request(request));

        // Held across the spawn so the task's own removal cannot run before
        // its handle is recorded.
        let mut tasks = self.inner.tasks.lock();
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let permit = Arc::clone(&this.inner.permits).acquire_owned().await;
            let outcome = match permit {
                Ok(_permit) => this.run(id).await,
                Err(_) => Err(EvtagError::ExportPackaging("export pool is closed".into())),
            };
            this.finish(id, outcome);
            this.inner.tasks.lock().remove(&id);
        });
        tasks.insert(id, handle);
        true
    }

    /// Number of packaging tasks not yet settled.
    pub fn in_flight(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    /// Wait for a scheduled request to settle. A task that already finished
    /// has dropped its handle, so the stored request is returned directly.
    pub async fn join(&self, id: ExportRequestId) -> Option<ExportRequest> {
        let handle = self.inner.tasks.lock().remove(&id);
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(request_id = %id, error = %err, "export task panicked");
            }
        }
        self.get(id)
    }

    pub fn get(&self, id: ExportRequestId) -> Option<ExportRequest> {
        self.inner.requests.get(&id)
    }

    pub fn link(&self, id: LinkId) -> Option<Link> {
        self.inner.links.get(&id)
    }

    /// Follow a link at `now`.
    pub fn open_link(
        &self,
        id: LinkId,
        now: chrono::DateTime<Utc>,
    ) -> std::result::Result<String, LinkError> {
        let link = self.inner.links.get(&id).ok_or(LinkError::NotFound(id))?;
        link.access(now).map(str::to_string)
    }

    pub fn disable_link(&self, id: LinkId) -> std::result::Result<Link, LinkError> {
        let link = self
            .inner
            .links
            .update(&id, |l| l.is_enabled = false)
            .ok_or(LinkError::NotFound(id))?;
        tracing::info!(link_id = %id, "link disabled");
        self.announce(ExportEvent::Link(link.clone()));
        Ok(link)
    }

    /// Load a persisted request. One interrupted mid-packaging is failed,
    /// since packaging is never retried.
    pub fn restore_request(&self, mut request: ExportRequest) {
        if request.state == ExportState::Packaging {
            if let Err(err) = request.fail("interrupted by restart") {
                tracing::warn!(request_id = %request.id, error = %err, "could not fail interrupted export");
            }
            self.announce(ExportEvent::Request(request.clone()));
        }
        self.inner.requests.insert(request.id, request);
    }

    pub fn restore_link(&self, link: Link) {
        self.inner.links.insert(link.id, link);
    }

    async fn run(&self, id: ExportRequestId) -> Result<LinkId> {
        let request = self
            .inner
            .requests
            .get(&id)
            .ok_or_else(|| EvtagError::not_found("export request", id))?;
        let tz = parse_time_zone(&request.time_zone)?;

        let snapshot = self.inner.db.snapshot();
        let (bytes, entries) = archive::package(
            &request.items,
            &snapshot,
            self.inner.blobs.as_ref(),
            self.inner.renderer.as_ref(),
        )
        .await?;
        let key = format!("exports/{}/{}.zip", request.organization, request.id);
        let size = bytes.len();
        self.inner
            .storage
            .put(&key, bytes, "application/zip")
            .await
            .map_err(|e| EvtagError::ExportPackaging(format!("upload failed: {e}")))?;
        tracing::debug!(request_id = %id, key = %key, entries, size, "export archive stored");

        let ttl = Duration::from_secs(self.inner.config.presign_ttl_secs);
        let signed = self
            .inner
            .storage
            .presign(&key, ttl)
            .await
            .map_err(|e| EvtagError::ExportPackaging(format!("presign failed: {e}")))?;
        let created_at = Utc::now();
        let link = Link {
            id: LinkId::new(),
            organization: request.organization,
            request: request.id,
            url: signed.url.clone(),
            is_enabled: true,
            expiration_date: link_expiry(
                &signed,
                created_at,
                Duration::from_secs(self.inner.config.link_fallback_ttl_secs),
            ),
            time_zone: request.time_zone.clone(),
            created_at,
        };
        self.inner.links.insert(link.id, link.clone());
        self.announce(ExportEvent::Link(link.clone()));

        let email = ExportEmail {
            to: request.notify.clone(),
            request: request.id,
            url: link.url.clone(),
            expires: link
                .expiration_date
                .with_timezone(&tz)
                .format("%Y-%m-%d %H:%M %Z")
                .to_string(),
        };
        if let Err(err) = self.inner.mailer.send(&email).await {
            // Nobody was told about this link; it must not stay usable.
            if let Err(disable) = self.disable_link(link.id) {
                tracing::error!(
                    request_id = %id,
                    link_id = %link.id,
                    error = %disable,
                    "link of an unmailed export could not be disabled"
                );
                return Err(EvtagError::ExportPackaging(format!(
                    "email failed: {err}; link {} left enabled: {disable}",
                    link.id
                )));
            }
            return Err(EvtagError::ExportPackaging(format!("email failed: {err}")));
        }
        Ok(link.id)
    }

    fn finish(&self, id: ExportRequestId, outcome: Result<LinkId>) {
        let updated = self.inner.requests.try_update(&id, |r| match &outcome {
            Ok(link) => r.deliver(*link).map(|_| r.clone()),
            Err(err) => r.fail(err.to_string()).map(|_| r.clone()),
        });
        match (&outcome, updated) {
            (Ok(link), Some(Ok(request))) => {
                tracing::info!(request_id = %id, link_id = %link, "export delivered");
                self.announce(ExportEvent::Request(request));
            }
            (Err(err), Some(Ok(request))) => {
                tracing::error!(request_id = %id, error = %err, "export failed");
                self.announce(ExportEvent::Request(request));
            }
            (_, Some(Err(err))) => {
                tracing::error!(request_id = %id, error = %err, "export finished in an unexpected state");
            }
            (_, None) => {
                tracing::error!(request_id = %id, "export request vanished while packaging");
            }
        }
    }
}
