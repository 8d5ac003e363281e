//! # Attachment Manager
//!
//! The single mutation surface of the core. Every operation:
//!
//! 1. does its I/O up front (base64 decoding, document rendering, blob
//!    writes) outside the database lock;
//! 2. runs one [`Database::transaction`] that names, attaches, propagates
//!    tags and stages cache invalidations;
//! 3. after commit, flushes the staged invalidations and releases blobs of
//!    hard-deleted evidence.
//!
//! If the transaction fails or the caller's deadline passes, blobs written
//! in step 1 are released and the staged invalidations are dropped with
//! the working copy.
//!
//! Owner-kind differences are looked up through
//! [`capabilities`](crate::capability::capabilities); nothing here matches
//! on a specific owner kind except the Drive and its folders, whose rows
//! are shared.

use std::collections::BTreeSet;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use evtag_cache::{InvalidationBatch, InvalidationMode, ProjectionCache, ProjectionKey};
use evtag_core::config::{EvtagConfig, NamingConfig};
use evtag_core::{
    parse_time_zone, ControlId, Deadline, DeleteMode, EvidenceId, EvidenceKind, EvtagError,
    OfficerId, OrganizationId, Owner, OwnerKind, OwnerRef, PolicyId, Result, TagId, TeamId,
    UserId, ValidationError,
};
use evtag_store::blob::content_type_for;
use evtag_store::catalog::Officer;
use evtag_store::naming::unique_name;
use evtag_store::synthesis;
use evtag_store::{
    Attachment, BlobRef, BlobStore, Database, DocumentRenderer, Evidence, NewEvidence,
    Synthesized, Tables,
};

use crate::capability::capabilities;
use crate::projections::Projections;
use crate::propagator;

/// One uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    pub file_name: String,
    pub base64_body: String,
}

/// A rich-text note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperNote {
    pub title: String,
    pub body: String,
}

/// An external URL to record as LINK evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInput {
    pub name: String,
    pub url: String,
}

/// Evidence waiting for its bytes to be stored.
struct Pending {
    new: NewEvidence,
    bytes: Option<Vec<u8>>,
    content_type: String,
}

impl Pending {
    fn upload(name: String, bytes: Vec<u8>, actor: Option<UserId>) -> Self {
        let content_type = content_type_for(&name).to_string();
        Self {
            new: NewEvidence {
                name,
                description: String::new(),
                kind: EvidenceKind::File,
                file: None,
                evidence_text: None,
                policy_ref: None,
                legacy_ref: None,
                created_by: actor,
            },
            bytes: Some(bytes),
            content_type,
        }
    }

    fn synthesized(mut doc: Synthesized, actor: Option<UserId>) -> Self {
        let bytes = doc.bytes.take();
        let content_type = doc.content_type.to_string();
        Self {
            new: NewEvidence::synthesized(doc, None, actor),
            bytes,
            content_type,
        }
    }
}

fn require_owner(tables: &Tables, owner: &Owner) -> Result<()> {
    if tables.catalog.owner_exists(owner) {
        Ok(())
    } else {
        Err(EvtagError::not_found("owner", owner))
    }
}

fn live_evidence<'a>(
    tables: &'a Tables,
    organization: OrganizationId,
    id: &EvidenceId,
) -> Result<&'a Evidence> {
    tables
        .evidence
        .get(id)
        .filter(|e| e.organization == organization)
        .ok_or_else(|| EvtagError::not_found("evidence", id))
}

/// Owners whose evidence must not share `(name, kind)` with new evidence
/// of `kind` on `owner`. Everything but LINK also lands in the Drive.
fn naming_scope(owner: Owner, kind: EvidenceKind) -> Vec<Owner> {
    if kind.joins_drive() && !owner.is_drive() {
        vec![owner, Owner::drive(owner.organization)]
    } else {
        vec![owner]
    }
}

fn stage_evidence(
    batch: &mut InvalidationBatch,
    organization: OrganizationId,
    evidence: EvidenceId,
    mode: InvalidationMode,
) {
    batch.extend(
        [
            ProjectionKey::ManualTagsFor {
                organization,
                evidence,
            },
            ProjectionKey::DocTags {
                organization,
                evidence,
            },
            ProjectionKey::TagsFilter { organization },
        ],
        mode,
    );
}

/// Attach one live evidence to `owner` and, when the owner kind implies
/// it, to the Drive.
fn attach_one(
    tables: &mut Tables,
    owner: Owner,
    evidence: EvidenceId,
    actor: Option<UserId>,
    batch: &mut InvalidationBatch,
) -> Result<()> {
    let kind = live_evidence(tables, owner.organization, &evidence)?.kind;
    if !owner.kind().accepts(kind) {
        return Err(EvtagError::illegal_attach(
            evidence,
            owner,
            format!("{} cannot hold {kind} evidence", owner.kind()),
        ));
    }
    let caps = capabilities(owner.kind());
    let drive = Owner::drive(owner.organization);
    match owner.reference {
        OwnerRef::Folder(folder) => {
            if tables.attachments.insert(Attachment::new(drive, evidence, actor)) {
                capabilities(OwnerKind::Drive).propagate_on_attach(tables, &drive, evidence)?;
            }
            if let Some(row) = tables.attachments.get_mut(&drive, &evidence) {
                row.folder = Some(folder);
            }
        }
        _ => {
            if tables.attachments.insert(Attachment::new(owner, evidence, actor)) {
                caps.propagate_on_attach(tables, &owner, evidence)?;
            }
            if caps.notify_drive_membership()
                && kind.joins_drive()
                && tables.attachments.insert(Attachment::new(drive, evidence, actor))
            {
                capabilities(OwnerKind::Drive).propagate_on_attach(tables, &drive, evidence)?;
            }
        }
    }
    stage_evidence(batch, owner.organization, evidence, InvalidationMode::Refresh);
    batch.extend(
        caps.affected_projections(tables, &owner),
        InvalidationMode::Refresh,
    );
    Ok(())
}

fn create_and_attach(
    tables: &mut Tables,
    owner: Owner,
    new: NewEvidence,
    naming: &NamingConfig,
    batch: &mut InvalidationBatch,
) -> Result<Evidence> {
    let actor = new.created_by;
    let scope = naming_scope(owner, new.kind);
    let created = tables.create_evidence(owner.organization, new, &scope, naming)?;
    attach_one(tables, owner, created.id, actor, batch)?;
    Ok(created)
}

/// Attach evidence that already exists, renaming it if its name is taken
/// in the target scope.
fn attach_existing_one(
    tables: &mut Tables,
    owner: Owner,
    id: EvidenceId,
    kind: EvidenceKind,
    actor: Option<UserId>,
    naming: &NamingConfig,
    batch: &mut InvalidationBatch,
) -> Result<()> {
    let evidence = tables
        .evidence
        .get(&id)
        .cloned()
        .ok_or_else(|| EvtagError::not_found("evidence", id))?;
    if evidence.organization != owner.organization {
        return Err(EvtagError::illegal_attach(
            id,
            owner,
            "evidence belongs to another organization",
        ));
    }
    if evidence.kind != kind {
        return Err(EvtagError::illegal_attach(
            id,
            owner,
            format!("expected {kind} evidence, found {}", evidence.kind),
        ));
    }
    if tables.attachments.contains(&owner, &id) {
        return Ok(());
    }

    let target = naming_scope(owner, kind);
    if tables
        .names_in_scope(&target, kind, Some(id))
        .contains(&evidence.name)
    {
        let mut scope: Vec<Owner> = tables.attachments.owners_of(&id).into_iter().collect();
        scope.extend(target);
        let taken = tables.names_in_scope(&scope, kind, Some(id));
        let fresh = unique_name(&evidence.name, &taken, naming)?;
        let renamed = tables.rename_evidence(id, &fresh, &scope, naming)?;
        tracing::info!(
            evidence_id = %id,
            owner = %owner,
            from = %evidence.name,
            to = %renamed.evidence.name,
            "renamed evidence to avoid a collision in the target owner"
        );
    }
    attach_one(tables, owner, id, actor, batch)
}

/// Outcome of a detach transaction.
struct Detached {
    deleted: Vec<EvidenceId>,
    released: Vec<BlobRef>,
}

fn detach_one(
    tables: &mut Tables,
    owner: Owner,
    id: EvidenceId,
    mode: DeleteMode,
    batch: &mut InvalidationBatch,
    candidates: &mut BTreeSet<TagId>,
    out: &mut Detached,
) -> Result<()> {
    if live_evidence(tables, owner.organization, &id).is_err() {
        tracing::debug!(evidence_id = %id, owner = %owner, "detach of unknown evidence skipped");
        return Ok(());
    }
    let drive = Owner::drive(owner.organization);
    match owner.reference {
        OwnerRef::Folder(folder) => {
            if tables.attachments.contains(&owner, &id) {
                if let Some(row) = tables.attachments.get_mut(&drive, &id) {
                    row.folder = None;
                }
            }
        }
        OwnerRef::Drive => {
            // Leaving the Drive removes the evidence from the library, so
            // every other owner lets go of it too.
            for other in tables.attachments.owners_of(&id) {
                tables.attachments.remove(&other, &id);
                let caps = capabilities(other.kind());
                candidates.extend(caps.propagate_on_detach(tables, &other, id)?);
                batch.extend(
                    caps.affected_projections(tables, &other),
                    InvalidationMode::Delete,
                );
            }
        }
        _ => {
            if tables.attachments.remove(&owner, &id).is_none() {
                return Ok(());
            }
            let caps = capabilities(owner.kind());
            candidates.extend(caps.propagate_on_detach(tables, &owner, id)?);
            batch.extend(
                caps.affected_projections(tables, &owner),
                InvalidationMode::Delete,
            );
        }
    }
    stage_evidence(batch, owner.organization, id, InvalidationMode::Delete);

    if tables.on_delete_check(&id) {
        if let Some(row) = tables.delete_evidence(&id, mode) {
            out.released.extend(row.file);
        }
        out.deleted.push(id);
    }
    Ok(())
}

/// Transactional attach, detach, rename and manual tagging.
#[derive(Clone)]
pub struct AttachmentManager {
    db: Arc<Database>,
    blobs: Arc<dyn BlobStore>,
    renderer: Arc<dyn DocumentRenderer>,
    projections: Projections,
    config: Arc<EvtagConfig>,
}

impl std::fmt::Debug for AttachmentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentManager")
            .field("projections", &self.projections)
            .field("naming", &self.config.naming)
            .finish()
    }
}

impl AttachmentManager {
    pub fn new(
        db: Arc<Database>,
        blobs: Arc<dyn BlobStore>,
        renderer: Arc<dyn DocumentRenderer>,
        cache: Arc<ProjectionCache>,
        config: Arc<EvtagConfig>,
    ) -> Self {
        let projections = Projections::new(Arc::clone(&db), cache);
        Self {
            db,
            blobs,
            renderer,
            projections,
            config,
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub fn renderer(&self) -> &Arc<dyn DocumentRenderer> {
        &self.renderer
    }

    pub fn projections(&self) -> &Projections {
        &self.projections
    }

    pub fn config(&self) -> &EvtagConfig {
        &self.config
    }

    /// Run a transaction off the async executor, then flush its batch.
    async fn commit<T, F>(&self, operation: &'static str, deadline: Deadline, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Tables, &mut InvalidationBatch) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let (out, batch) = tokio::task::spawn_blocking(move || {
            db.transaction(operation, deadline, |tables| {
                let mut batch = InvalidationBatch::new();
                let out = f(tables, &mut batch)?;
                Ok((out, batch))
            })
        })
        .await
        .map_err(|e| EvtagError::Storage(format!("{operation} task failed: {e}")))??;
        self.projections.flush(batch).await;
        Ok(out)
    }

    async fn release(&self, blobs: &[BlobRef]) {
        for blob in blobs {
            if let Err(err) = self.blobs.delete(blob).await {
                tracing::warn!(key = %blob.key, error = %err, "failed to release blob");
            }
        }
    }

    /// Store the bytes of every pending evidence, then create and attach
    /// them in one transaction.
    async fn store_and_attach(
        &self,
        operation: &'static str,
        owner: Owner,
        pending: Vec<Pending>,
        deadline: Deadline,
    ) -> Result<Vec<EvidenceId>> {
        let mut stored: Vec<BlobRef> = Vec::new();
        let mut ready: Vec<NewEvidence> = Vec::with_capacity(pending.len());
        for Pending {
            mut new,
            bytes,
            content_type,
        } in pending
        {
            if let Some(bytes) = bytes {
                match self.blobs.put(bytes, &content_type).await {
                    Ok(blob) => {
                        stored.push(blob.clone());
                        new.file = Some(blob);
                    }
                    Err(err) => {
                        self.release(&stored).await;
                        return Err(err);
                    }
                }
            }
            ready.push(new);
        }

        let naming = self.config.naming.clone();
        let result = self
            .commit(operation, deadline, move |tables, batch| {
                require_owner(tables, &owner)?;
                ready
                    .into_iter()
                    .map(|new| create_and_attach(tables, owner, new, &naming, batch).map(|e| e.id))
                    .collect::<Result<Vec<_>>>()
            })
            .await;
        match result {
            Ok(ids) => {
                tracing::info!(operation, owner = %owner, count = ids.len(), "evidence attached");
                Ok(ids)
            }
            Err(err) => {
                self.release(&stored).await;
                Err(err)
            }
        }
    }

    /// Upload files to `owner`. The whole batch commits or none of it does.
    pub async fn attach_files(
        &self,
        owner: Owner,
        uploads: Vec<Upload>,
        time_zone: &str,
        actor: Option<UserId>,
        deadline: Deadline,
    ) -> Result<Vec<EvidenceId>> {
        let tz = parse_time_zone(time_zone)?;
        tracing::debug!(owner = %owner, count = uploads.len(), time_zone = %tz, "decoding uploads");
        let mut pending = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let bytes = STANDARD.decode(upload.base64_body.trim()).map_err(|e| {
                ValidationError::InvalidUploadBody {
                    file_name: upload.file_name.clone(),
                    reason: e.to_string(),
                }
            })?;
            pending.push(Pending::upload(upload.file_name, bytes, actor));
        }
        self.store_and_attach("attach files", owner, pending, deadline)
            .await
    }

    /// Attach evidence that already exists in the organization.
    pub async fn attach_existing(
        &self,
        owner: Owner,
        evidence_ids: Vec<EvidenceId>,
        kind: EvidenceKind,
        actor: Option<UserId>,
        deadline: Deadline,
    ) -> Result<Vec<EvidenceId>> {
        let naming = self.config.naming.clone();
        let ids = self
            .commit("attach existing", deadline, move |tables, batch| {
                require_owner(tables, &owner)?;
                if !owner.kind().accepts(kind) {
                    return Err(EvtagError::illegal_attach(
                        format!("{kind} evidence"),
                        owner,
                        format!("{} cannot hold {kind} evidence", owner.kind()),
                    ));
                }
                for id in &evidence_ids {
                    attach_existing_one(tables, owner, *id, kind, actor, &naming, batch)?;
                }
                Ok(evidence_ids)
            })
            .await?;
        tracing::info!(owner = %owner, count = ids.len(), "existing evidence attached");
        Ok(ids)
    }

    /// Render the requested officers (all of them when `officer_ids` is
    /// empty) into one PDF and attach it.
    pub async fn attach_officers(
        &self,
        owner: Owner,
        officer_ids: Vec<OfficerId>,
        time_zone: &str,
        actor: Option<UserId>,
        deadline: Deadline,
    ) -> Result<Vec<EvidenceId>> {
        let tz = parse_time_zone(time_zone)?;
        let snapshot = self.db.snapshot();
        require_owner(&snapshot, &owner)?;
        let org = owner.organization;
        let officers: Vec<&Officer> = if officer_ids.is_empty() {
            snapshot.catalog.officers_in(org)
        } else {
            officer_ids
                .iter()
                .filter_map(|id| {
                    let found = snapshot
                        .catalog
                        .officer(id)
                        .filter(|o| o.organization == org);
                    if found.is_none() {
                        tracing::warn!(officer_id = %id, organization = %org, "officer not found, skipping");
                    }
                    found
                })
                .collect()
        };
        if officers.is_empty() {
            tracing::warn!(owner = %owner, "no officers to attach");
            return Ok(Vec::new());
        }
        let doc = synthesis::officers(&officers, Utc::now(), tz, self.renderer.as_ref())?;
        self.store_and_attach(
            "attach officers",
            owner,
            vec![Pending::synthesized(doc, actor)],
            deadline,
        )
        .await
    }

    /// Render one PDF per team and attach them.
    pub async fn attach_teams(
        &self,
        owner: Owner,
        team_ids: Vec<TeamId>,
        time_zone: &str,
        actor: Option<UserId>,
        deadline: Deadline,
    ) -> Result<Vec<EvidenceId>> {
        let tz = parse_time_zone(time_zone)?;
        let snapshot = self.db.snapshot();
        require_owner(&snapshot, &owner)?;
        let now = Utc::now();
        let mut pending = Vec::new();
        for id in &team_ids {
            let Some(team) = snapshot
                .catalog
                .team(id)
                .filter(|t| t.organization == owner.organization)
            else {
                tracing::warn!(team_id = %id, organization = %owner.organization, "team not found, skipping");
                continue;
            };
            let doc = synthesis::team(team, now, tz, self.renderer.as_ref())?;
            pending.push(Pending::synthesized(doc, actor));
        }
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        self.store_and_attach("attach teams", owner, pending, deadline)
            .await
    }

    /// Attach published policies. A policy already materialized as
    /// evidence in the organization is reused.
    pub async fn attach_policies(
        &self,
        owner: Owner,
        policy_ids: Vec<PolicyId>,
        actor: Option<UserId>,
        deadline: Deadline,
    ) -> Result<Vec<EvidenceId>> {
        let naming = self.config.naming.clone();
        let ids = self
            .commit("attach policies", deadline, move |tables, batch| {
                require_owner(tables, &owner)?;
                let org = owner.organization;
                let mut ids = Vec::new();
                for policy_id in &policy_ids {
                    let Some(policy) = tables
                        .catalog
                        .policy(policy_id)
                        .filter(|p| p.organization == org)
                        .cloned()
                    else {
                        tracing::warn!(policy_id = %policy_id, organization = %org, "policy not found, skipping");
                        continue;
                    };
                    let existing = tables.evidence.for_policy(org, policy.id).map(|e| e.id);
                    let id = match existing {
                        Some(id) => {
                            attach_existing_one(
                                tables,
                                owner,
                                id,
                                EvidenceKind::Policy,
                                actor,
                                &naming,
                                batch,
                            )?;
                            id
                        }
                        None => {
                            let new =
                                NewEvidence::synthesized(synthesis::policy(&policy), None, actor);
                            let created = create_and_attach(tables, owner, new, &naming, batch)?;
                            if created.name != policy.display_name {
                                tables.catalog.rename_policy(&policy.id, &created.name);
                            }
                            created.id
                        }
                    };
                    ids.push(id);
                }
                Ok(ids)
            })
            .await?;
        tracing::info!(owner = %owner, count = ids.len(), "policies attached");
        Ok(ids)
    }

    /// Store an HTML note as PAPER evidence.
    pub async fn attach_paper_note(
        &self,
        owner: Owner,
        note: PaperNote,
        actor: Option<UserId>,
        deadline: Deadline,
    ) -> Result<Vec<EvidenceId>> {
        let doc = synthesis::paper(&note.title, &note.body)?;
        self.store_and_attach(
            "attach paper",
            owner,
            vec![Pending::synthesized(doc, actor)],
            deadline,
        )
        .await
    }

    /// Record an external URL as LINK evidence on `owner` only.
    pub async fn attach_link(
        &self,
        owner: Owner,
        link: LinkInput,
        actor: Option<UserId>,
        deadline: Deadline,
    ) -> Result<EvidenceId> {
        let parsed = url::Url::parse(link.url.trim())
            .map_err(|_| ValidationError::InvalidUrl(link.url.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidUrl(link.url).into());
        }
        if !owner.kind().accepts(EvidenceKind::Link) {
            return Err(EvtagError::illegal_attach(
                "LINK evidence",
                owner,
                format!("{} cannot hold LINK evidence", owner.kind()),
            ));
        }
        let new = NewEvidence {
            name: link.name,
            description: String::new(),
            kind: EvidenceKind::Link,
            file: None,
            evidence_text: Some(parsed.to_string()),
            policy_ref: None,
            legacy_ref: None,
            created_by: actor,
        };
        let naming = self.config.naming.clone();
        let id = self
            .commit("attach link", deadline, move |tables, batch| {
                require_owner(tables, &owner)?;
                create_and_attach(tables, owner, new, &naming, batch).map(|e| e.id)
            })
            .await?;
        tracing::info!(owner = %owner, evidence_id = %id, "link attached");
        Ok(id)
    }

    /// Detach with the configured delete mode.
    pub async fn detach(
        &self,
        owner: Owner,
        evidence_ids: Vec<EvidenceId>,
        deadline: Deadline,
    ) -> Result<Vec<EvidenceId>> {
        let mode = self.config.evidence.delete_mode;
        self.detach_with_mode(owner, evidence_ids, mode, deadline)
            .await
    }

    /// Detach evidence from `owner`. Evidence left without any owner or
    /// lineage reference is deleted with `mode`; the deleted ids are
    /// returned. Unknown or already-detached evidence is skipped.
    pub async fn detach_with_mode(
        &self,
        owner: Owner,
        evidence_ids: Vec<EvidenceId>,
        mode: DeleteMode,
        deadline: Deadline,
    ) -> Result<Vec<EvidenceId>> {
        let detached = self
            .commit("detach", deadline, move |tables, batch| {
                require_owner(tables, &owner)?;
                let mut candidates = BTreeSet::new();
                let mut out = Detached {
                    deleted: Vec::new(),
                    released: Vec::new(),
                };
                for id in &evidence_ids {
                    detach_one(tables, owner, *id, mode, batch, &mut candidates, &mut out)?;
                }
                let pruned = tables.prune_system_tags(owner.organization, &candidates);
                if !pruned.is_empty() {
                    tracing::debug!(organization = %owner.organization, count = pruned.len(), "orphaned system tags removed");
                }
                Ok(out)
            })
            .await?;
        self.release(&detached.released).await;
        tracing::info!(
            owner = %owner,
            deleted = detached.deleted.len(),
            mode = ?mode,
            "evidence detached"
        );
        Ok(detached.deleted)
    }

    /// Rename evidence, suffixing on collision with any evidence sharing an
    /// owner with it or attached to one of `context`.
    pub async fn rename(
        &self,
        organization: OrganizationId,
        evidence: EvidenceId,
        new_name: String,
        context: Vec<Owner>,
        deadline: Deadline,
    ) -> Result<Evidence> {
        let naming = self.config.naming.clone();
        let renamed = self
            .commit("rename", deadline, move |tables, batch| {
                let current = live_evidence(tables, organization, &evidence)?.clone();
                let mut scope: BTreeSet<Owner> = tables.attachments.owners_of(&evidence);
                for owner in context {
                    if owner.organization != organization {
                        return Err(EvtagError::not_found("owner", owner));
                    }
                    scope.insert(owner);
                }
                if current.kind.joins_drive() {
                    scope.insert(Owner::drive(organization));
                }
                let scope: Vec<Owner> = scope.into_iter().collect();
                let renamed = tables.rename_evidence(evidence, &new_name, &scope, &naming)?;
                if renamed.changed {
                    stage_evidence(batch, organization, evidence, InvalidationMode::Refresh);
                }
                Ok(renamed)
            })
            .await?;
        if renamed.changed {
            tracing::info!(evidence_id = %evidence, name = %renamed.evidence.name, "evidence renamed");
        }
        Ok(renamed.evidence)
    }

    /// Add manual tags: existing ones by id, new ones by name.
    pub async fn link_tags(
        &self,
        organization: OrganizationId,
        evidence: EvidenceId,
        tag_ids: Vec<TagId>,
        new_tag_names: Vec<String>,
        deadline: Deadline,
    ) -> Result<()> {
        self.commit("link tags", deadline, move |tables, batch| {
            live_evidence(tables, organization, &evidence)?;
            let mut ids: BTreeSet<TagId> = BTreeSet::new();
            for id in tag_ids {
                if tables.tags.get(&id).map(|t| t.organization) != Some(organization) {
                    return Err(EvtagError::not_found("tag", id));
                }
                ids.insert(id);
            }
            for tag in tables.tags.resolve(organization, &new_tag_names, true)? {
                ids.insert(tag.id);
            }
            let row = tables
                .evidence
                .get_mut(&evidence)
                .ok_or_else(|| EvtagError::not_found("evidence", evidence))?;
            row.manual_tags.extend(ids);
            row.updated_at = Utc::now();
            batch.refresh(ProjectionKey::ManualTagsFor {
                organization,
                evidence,
            });
            batch.refresh(ProjectionKey::TagsFilter { organization });
            Ok(())
        })
        .await?;
        tracing::info!(evidence_id = %evidence, "manual tags linked");
        Ok(())
    }

    /// Remove manual tags. Propagated and system tags are unaffected.
    pub async fn unlink_tags(
        &self,
        organization: OrganizationId,
        evidence: EvidenceId,
        tag_ids: Vec<TagId>,
        deadline: Deadline,
    ) -> Result<()> {
        self.commit("unlink tags", deadline, move |tables, batch| {
            live_evidence(tables, organization, &evidence)?;
            let row = tables
                .evidence
                .get_mut(&evidence)
                .ok_or_else(|| EvtagError::not_found("evidence", evidence))?;
            for id in &tag_ids {
                row.manual_tags.remove(id);
            }
            row.updated_at = Utc::now();
            batch.refresh(ProjectionKey::ManualTagsFor {
                organization,
                evidence,
            });
            batch.refresh(ProjectionKey::TagsFilter { organization });
            Ok(())
        })
        .await?;
        tracing::info!(evidence_id = %evidence, "manual tags unlinked");
        Ok(())
    }

    /// Replace a control's tags and re-propagate to its evidence.
    pub async fn reconcile_control_tags(
        &self,
        organization: OrganizationId,
        control: ControlId,
        tag_ids: Vec<TagId>,
        deadline: Deadline,
    ) -> Result<Vec<EvidenceId>> {
        let affected = self
            .commit("reconcile control tags", deadline, move |tables, batch| {
                if tables.catalog.control(&control).map(|c| c.organization) != Some(organization) {
                    return Err(EvtagError::not_found("control", control));
                }
                let affected = propagator::reconcile_control_tags(
                    tables,
                    control,
                    tag_ids.into_iter().collect(),
                )?;
                for evidence in &affected {
                    stage_evidence(batch, organization, *evidence, InvalidationMode::Refresh);
                }
                batch.refresh(ProjectionKey::TagsFilter { organization });
                Ok(affected)
            })
            .await?;
        tracing::info!(control_id = %control, affected = affected.len(), "control tags reconciled");
        Ok(affected)
    }

    pub fn get_evidence(&self, organization: OrganizationId, id: EvidenceId) -> Result<Evidence> {
        let snapshot = self.db.snapshot();
        live_evidence(&snapshot, organization, &id).cloned()
    }

    /// Live evidence attached to `owner`, by name then kind.
    pub fn list_owner_evidence(&self, owner: Owner) -> Result<Vec<Evidence>> {
        let snapshot = self.db.snapshot();
        require_owner(&snapshot, &owner)?;
        let mut rows: Vec<Evidence> = snapshot
            .attachments
            .evidence_of(&owner)
            .iter()
            .filter_map(|id| snapshot.evidence.get(id).cloned())
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.kind.cmp(&b.kind)));
        Ok(rows)
    }
}
