//! Shared harness for the cross-crate suites.
//!
//! One organization on a fresh in-memory stack: database, blob store,
//! projection cache, attachment manager and exporter, with the catalog
//! seeded through the same transaction API the external collaborators
//! use.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use evtag_attach::{AttachmentManager, Upload};
use evtag_cache::{MemoryBackend, ProjectionCache};
use evtag_core::config::ExportConfig;
use evtag_core::{
    ActionItemId, ControlId, DataroomId, Deadline, EvidenceId, EvtagConfig, EvtagError,
    OrganizationId, Owner, OwnerRef, ProgramId, Result, SubtaskId, TagId, TaskId,
};
use evtag_export::{Exporter, MemoryObjectStorage, RecordingMailer};
use evtag_store::catalog::{
    ActionItem, Control, Dataroom, Organization, Program, Subtask, SubtaskStatus, Task,
};
use evtag_store::{Database, Evidence, MemoryBlobStore, PlainPdfRenderer, Tables};

pub fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(10))
}

pub fn upload(name: &str, body: &[u8]) -> Upload {
    Upload {
        file_name: name.to_string(),
        base64_body: STANDARD.encode(body),
    }
}

pub struct Harness {
    pub db: Arc<Database>,
    pub blobs: Arc<MemoryBlobStore>,
    pub storage: Arc<MemoryObjectStorage>,
    pub mailer: Arc<RecordingMailer>,
    pub manager: AttachmentManager,
    pub exporter: Exporter,
    pub org: OrganizationId,
}

impl Harness {
    pub fn new() -> Result<Self> {
        Self::with_config(EvtagConfig::default())
    }

    pub fn with_config(config: EvtagConfig) -> Result<Self> {
        let db = Arc::new(Database::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let storage = Arc::new(MemoryObjectStorage::new("https://files.example.com"));
        let mailer = Arc::new(RecordingMailer::new());
        let renderer = Arc::new(PlainPdfRenderer);
        let cache = Arc::new(ProjectionCache::new(
            Arc::new(MemoryBackend::new()),
            config.cache.ttl(),
        ));
        let export: ExportConfig = config.export.clone();
        let manager = AttachmentManager::new(
            Arc::clone(&db),
            blobs.clone(),
            renderer.clone(),
            cache,
            Arc::new(config),
        );
        let exporter = Exporter::new(
            Arc::clone(&db),
            blobs.clone(),
            renderer,
            storage.clone(),
            mailer.clone(),
            export,
        );

        let org = OrganizationId::new();
        let harness = Self {
            db,
            blobs,
            storage,
            mailer,
            manager,
            exporter,
            org,
        };
        harness.seed(|t| {
            t.put_organization(Organization {
                id: org,
                name: "Acme".into(),
            });
            Ok(())
        })?;
        Ok(harness)
    }

    /// Write catalog records in one transaction.
    pub fn seed<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        self.db.transaction("seed", deadline(), f)
    }

    pub fn drive(&self) -> Owner {
        Owner::drive(self.org)
    }

    pub fn owner(&self, reference: OwnerRef) -> Owner {
        Owner::new(self.org, reference)
    }

    pub fn dataroom(&self, name: &str) -> Result<Owner> {
        let id = DataroomId::new();
        let org = self.org;
        self.seed(|t| {
            t.put_dataroom(Dataroom {
                id,
                organization: org,
                name: name.into(),
            })
        })?;
        Ok(self.owner(OwnerRef::Dataroom(id)))
    }

    pub fn tag(&self, name: &str) -> Result<TagId> {
        let org = self.org;
        self.seed(|t| t.tags.get_or_create(org, name, false).map(|tag| tag.id))
    }

    pub fn action_item(&self, name: &str) -> Result<ActionItemId> {
        let id = ActionItemId::new();
        let org = self.org;
        self.seed(|t| {
            t.put_action_item(ActionItem {
                id,
                organization: org,
                name: name.into(),
            })
        })?;
        Ok(id)
    }

    pub fn control(&self, name: &str, tags: &[TagId], items: &[ActionItemId]) -> Result<ControlId> {
        let id = ControlId::new();
        let org = self.org;
        self.seed(|t| {
            t.put_control(Control {
                id,
                organization: org,
                name: name.into(),
                tags: tags.iter().copied().collect(),
                action_items: items.iter().copied().collect(),
            })
        })?;
        Ok(id)
    }

    /// A program with one task of `category` holding one subtask.
    pub fn subtask(&self, category: &str) -> Result<(ProgramId, TaskId, SubtaskId)> {
        let (program, task, subtask) = (ProgramId::new(), TaskId::new(), SubtaskId::new());
        let org = self.org;
        self.seed(|t| {
            t.put_program(Program {
                id: program,
                organization: org,
                name: "SOC 2".into(),
                certifications: vec!["SOC 2 Type II".into()],
            })?;
            t.put_task(Task {
                id: task,
                organization: org,
                program,
                name: "Access".into(),
                category: category.into(),
            })?;
            t.put_subtask(Subtask {
                id: subtask,
                organization: org,
                task,
                name: "Upload access review".into(),
                tags: BTreeSet::new(),
                visible: true,
                status: SubtaskStatus::Completed,
                requires_evidence: true,
                prerequisites: BTreeSet::new(),
            })
        })?;
        Ok((program, task, subtask))
    }

    /// Upload one file to `owner` and return its id.
    pub async fn upload_to(&self, owner: Owner, name: &str) -> Result<EvidenceId> {
        let ids = self
            .manager
            .attach_files(owner, vec![upload(name, name.as_bytes())], "UTC", None, deadline())
            .await?;
        ids.first()
            .copied()
            .ok_or_else(|| EvtagError::Storage(format!("upload of {name} created nothing")))
    }

    /// The live row, if any.
    pub fn evidence(&self, id: EvidenceId) -> Option<Evidence> {
        self.db.snapshot().evidence.get(&id).cloned()
    }

    /// Names of the visible (manual and propagated) tags.
    pub fn tag_names(&self, id: EvidenceId) -> Vec<String> {
        let tables = self.db.snapshot();
        tables
            .evidence
            .get(&id)
            .map(|e| tables.tags.names(&e.tags()))
            .unwrap_or_default()
    }

    pub fn system_tag_names(&self, id: EvidenceId) -> Vec<String> {
        let tables = self.db.snapshot();
        tables
            .evidence
            .get(&id)
            .map(|e| tables.tags.names(&e.system_tags))
            .unwrap_or_default()
    }

    /// Names of everything attached to `owner`, sorted.
    pub fn names_on(&self, owner: Owner) -> Result<Vec<String>> {
        Ok(self
            .manager
            .list_owner_evidence(owner)?
            .into_iter()
            .map(|e| e.name)
            .collect())
    }
}
