//! # Evidence Store Operations
//!
//! Create, rename and delete evidence inside a transaction, plus the
//! relation check that gates deletion and the cleanup of orphaned system
//! tags. Owner-scope selection belongs to the attachment manager; these
//! functions take the scope as a list of owners.

use std::collections::BTreeSet;

use chrono::Utc;

use evtag_core::config::NamingConfig;
use evtag_core::{
    DeleteMode, EvidenceId, EvidenceKind, EvtagError, OrganizationId, Owner, PolicyId, Result,
    TagId, UserId,
};

use crate::blob::BlobRef;
use crate::database::Tables;
use crate::evidence::Evidence;
use crate::naming::{normalize, unique_name};
use crate::synthesis::Synthesized;
use crate::tags::Tag;

/// Input for a new evidence row.
#[derive(Debug, Clone)]
pub struct NewEvidence {
    pub name: String,
    pub description: String,
    pub kind: EvidenceKind,
    pub file: Option<BlobRef>,
    pub evidence_text: Option<String>,
    pub policy_ref: Option<PolicyId>,
    pub legacy_ref: Option<EvidenceId>,
    pub created_by: Option<UserId>,
}

impl NewEvidence {
    /// A plain upload.
    pub fn upload(name: impl Into<String>, file: BlobRef, created_by: Option<UserId>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind: EvidenceKind::File,
            file: Some(file),
            evidence_text: None,
            policy_ref: None,
            legacy_ref: None,
            created_by,
        }
    }

    /// A synthesized artifact whose bytes (if any) were stored as `file`.
    pub fn synthesized(doc: Synthesized, file: Option<BlobRef>, created_by: Option<UserId>) -> Self {
        Self {
            name: doc.name,
            description: String::new(),
            kind: doc.kind,
            file,
            evidence_text: doc.evidence_text,
            policy_ref: doc.policy_ref,
            legacy_ref: None,
            created_by,
        }
    }
}

/// Result of a rename.
#[derive(Debug, Clone)]
pub struct Renamed {
    pub evidence: Evidence,
    /// `false` when the requested name was already the current name.
    pub changed: bool,
}

impl Tables {
    /// Names used by live evidence of `kind` attached to any owner in
    /// `scope`, excluding `exclude`.
    pub fn names_in_scope(
        &self,
        scope: &[Owner],
        kind: EvidenceKind,
        exclude: Option<EvidenceId>,
    ) -> Vec<String> {
        let ids: BTreeSet<EvidenceId> = scope
            .iter()
            .flat_map(|owner| self.attachments.evidence_of(owner))
            .filter(|id| Some(*id) != exclude)
            .collect();
        ids.iter()
            .filter_map(|id| self.evidence.get(id))
            .filter(|e| e.kind == kind)
            .map(|e| e.name.clone())
            .collect()
    }

    /// Insert a new evidence row named uniquely within `scope`.
    pub fn create_evidence(
        &mut self,
        organization: OrganizationId,
        new: NewEvidence,
        scope: &[Owner],
        naming: &NamingConfig,
    ) -> Result<Evidence> {
        let taken = self.names_in_scope(scope, new.kind, None);
        let name = unique_name(&new.name, &taken, naming)?;
        let now = Utc::now();
        let evidence = Evidence {
            id: EvidenceId::new(),
            organization,
            name,
            description: new.description,
            kind: new.kind,
            file: new.file,
            evidence_text: new.evidence_text,
            created_at: now,
            updated_at: now,
            created_by: new.created_by,
            policy_ref: new.policy_ref,
            legacy_ref: new.legacy_ref,
            manual_tags: BTreeSet::new(),
            propagated_tags: BTreeSet::new(),
            system_tags: BTreeSet::new(),
            deleted_at: None,
        };
        self.evidence.insert(evidence.clone());
        Ok(evidence)
    }

    /// Rename live evidence, suffixing on collision within `scope`.
    ///
    /// Renaming to the current name is a no-op. POLICY evidence carries its
    /// policy's display name along in the same transaction.
    pub fn rename_evidence(
        &mut self,
        id: EvidenceId,
        new_name: &str,
        scope: &[Owner],
        naming: &NamingConfig,
    ) -> Result<Renamed> {
        let current = self
            .evidence
            .get(&id)
            .cloned()
            .ok_or_else(|| EvtagError::not_found("evidence", id))?;
        if normalize(new_name, naming)? == current.name {
            return Ok(Renamed {
                evidence: current,
                changed: false,
            });
        }

        let taken = self.names_in_scope(scope, current.kind, Some(id));
        let name = unique_name(new_name, &taken, naming)?;
        if let Some(policy) = current.policy_ref {
            if !self.catalog.rename_policy(&policy, &name) {
                return Err(EvtagError::not_found("policy", policy));
            }
        }
        let row = self
            .evidence
            .get_mut(&id)
            .ok_or_else(|| EvtagError::not_found("evidence", id))?;
        row.name = name;
        row.updated_at = Utc::now();
        Ok(Renamed {
            evidence: row.clone(),
            changed: true,
        })
    }

    /// Whether evidence may be deleted: no attachment references it and no
    /// LEGACY row names it as its lineage source.
    pub fn on_delete_check(&self, id: &EvidenceId) -> bool {
        !self.attachments.is_attached(id) && !self.evidence.is_legacy_source(id)
    }

    /// Delete evidence that passed [`on_delete_check`](Self::on_delete_check).
    ///
    /// Soft delete stamps `deleted_at`; hard delete removes the row and
    /// returns it so the caller can release its blob.
    pub fn delete_evidence(&mut self, id: &EvidenceId, mode: DeleteMode) -> Option<Evidence> {
        match mode {
            DeleteMode::Soft => {
                let row = self.evidence.get_mut(id)?;
                row.deleted_at = Some(Utc::now());
                row.updated_at = Utc::now();
                None
            }
            DeleteMode::Hard => self.evidence.remove(id),
        }
    }

    /// Delete system tags among `candidates` that nothing references any
    /// more. Only tags named after a subtask id or a task category of the
    /// organization are eligible. Returns the removed tags.
    pub fn prune_system_tags(
        &mut self,
        organization: OrganizationId,
        candidates: &BTreeSet<TagId>,
    ) -> Vec<Tag> {
        let eligible_names: BTreeSet<String> = self
            .catalog
            .subtasks_in(organization)
            .map(|s| s.id.to_string())
            .chain(
                self.catalog
                    .categories_in(organization)
                    .into_iter()
                    .map(str::to_string),
            )
            .collect();

        let doomed: Vec<TagId> = candidates
            .iter()
            .filter(|id| {
                self.tags.get(id).is_some_and(|t| {
                    t.organization == organization && eligible_names.contains(&t.name)
                })
            })
            .filter(|id| {
                !self.evidence.iter_all().any(|e| e.references_tag(id))
                    && !self.catalog.references_tag(id)
            })
            .copied()
            .collect();
        doomed
            .iter()
            .filter_map(|id| self.tags.remove(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::Attachment;
    use crate::catalog::{Organization, Policy, Program, Subtask, SubtaskStatus, Task};
    use evtag_core::{DataroomId, OwnerRef, ProgramId, SubtaskId, TaskId, ValidationError};

    fn blob(name: &str) -> BlobRef {
        BlobRef {
            key: format!("k/{name}"),
            sha256: String::new(),
            size: 0,
            content_type: "application/pdf".into(),
        }
    }

    fn setup() -> (Tables, OrganizationId, Owner) {
        let mut t = Tables::default();
        let org = OrganizationId::new();
        t.put_organization(Organization {
            id: org,
            name: "Acme".into(),
        });
        let room = Owner::new(org, OwnerRef::Dataroom(DataroomId::new()));
        (t, org, room)
    }

    fn upload(t: &mut Tables, org: OrganizationId, owner: Owner, name: &str) -> Evidence {
        let e = t
            .create_evidence(
                org,
                NewEvidence::upload(name, blob(name), None),
                &[owner, Owner::drive(org)],
                &NamingConfig::default(),
            )
            .unwrap();
        t.attachments.insert(Attachment::new(owner, e.id, None));
        t.attachments.insert(Attachment::new(Owner::drive(org), e.id, None));
        e
    }

    #[test]
    fn three_uploads_of_the_same_name() {
        let (mut t, org, room) = setup();
        let names: Vec<String> = (0..3)
            .map(|_| upload(&mut t, org, room, "report.pdf").name)
            .collect();
        assert_eq!(names, ["report.pdf", "report(1).pdf", "report(2).pdf"]);
    }

    #[test]
    fn uniqueness_is_per_kind() {
        let (mut t, org, room) = setup();
        upload(&mut t, org, room, "minutes");
        let mut paper = NewEvidence::upload("minutes", blob("p"), None);
        paper.kind = EvidenceKind::Paper;
        let e = t
            .create_evidence(org, paper, &[room], &NamingConfig::default())
            .unwrap();
        assert_eq!(e.name, "minutes");
    }

    #[test]
    fn rename_to_same_name_is_a_no_op() {
        let (mut t, org, room) = setup();
        let e = upload(&mut t, org, room, "a.pdf");
        let out = t
            .rename_evidence(e.id, " a.pdf ", &[room], &NamingConfig::default())
            .unwrap();
        assert!(!out.changed);
        assert_eq!(out.evidence, e);
    }

    #[test]
    fn rename_suffixes_on_collision_and_ignores_itself() {
        let (mut t, org, room) = setup();
        upload(&mut t, org, room, "a.pdf");
        let b = upload(&mut t, org, room, "b.pdf");
        let out = t
            .rename_evidence(b.id, "a.pdf", &[room], &NamingConfig::default())
            .unwrap();
        assert!(out.changed);
        assert_eq!(out.evidence.name, "a(1).pdf");
    }

    #[test]
    fn rename_rejects_overlong_names() {
        let (mut t, org, room) = setup();
        let e = upload(&mut t, org, room, "a.pdf");
        let err = t
            .rename_evidence(e.id, &"y".repeat(513), &[room], &NamingConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            EvtagError::Validation(ValidationError::NameTooLong { .. })
        ));
    }

    #[test]
    fn policy_rename_updates_display_name() {
        let (mut t, org, _) = setup();
        let policy = PolicyId::new();
        t.put_policy(Policy {
            id: policy,
            organization: org,
            display_name: "Access".into(),
            published_version: None,
        })
        .unwrap();
        let mut new = NewEvidence::upload("Access", blob("x"), None);
        new.kind = EvidenceKind::Policy;
        new.file = None;
        new.policy_ref = Some(policy);
        let e = t
            .create_evidence(org, new, &[Owner::drive(org)], &NamingConfig::default())
            .unwrap();
        t.rename_evidence(e.id, "Access Control", &[Owner::drive(org)], &NamingConfig::default())
            .unwrap();
        assert_eq!(
            t.catalog.policy(&policy).map(|p| p.display_name.as_str()),
            Some("Access Control")
        );
    }

    #[test]
    fn delete_check_respects_attachments_and_lineage() {
        let (mut t, org, room) = setup();
        let e = upload(&mut t, org, room, "a.pdf");
        assert!(!t.on_delete_check(&e.id));
        t.attachments.remove(&room, &e.id);
        t.attachments.remove(&Owner::drive(org), &e.id);
        assert!(t.on_delete_check(&e.id));

        let mut legacy = NewEvidence::upload("a.pdf", blob("old"), None);
        legacy.kind = EvidenceKind::Legacy;
        legacy.legacy_ref = Some(e.id);
        t.create_evidence(org, legacy, &[], &NamingConfig::default())
            .unwrap();
        assert!(!t.on_delete_check(&e.id));
    }

    #[test]
    fn soft_delete_hides_and_hard_delete_removes() {
        let (mut t, org, room) = setup();
        let a = upload(&mut t, org, room, "a.pdf");
        let b = upload(&mut t, org, room, "b.pdf");
        assert!(t.delete_evidence(&a.id, DeleteMode::Soft).is_none());
        assert!(t.evidence.get(&a.id).is_none());
        assert!(t.evidence.get_any(&a.id).is_some());

        assert_eq!(t.delete_evidence(&b.id, DeleteMode::Hard).map(|e| e.id), Some(b.id));
        assert!(t.evidence.get_any(&b.id).is_none());
    }

    #[test]
    fn prune_removes_only_unreferenced_system_tags() {
        let (mut t, org, _) = setup();
        let program = ProgramId::new();
        let task = TaskId::new();
        let subtask = SubtaskId::new();
        t.put_program(Program {
            id: program,
            organization: org,
            name: "SOC 2".into(),
            certifications: vec![],
        })
        .unwrap();
        t.put_task(Task {
            id: task,
            organization: org,
            program,
            name: "Policies".into(),
            category: "Governance".into(),
        })
        .unwrap();
        t.put_subtask(Subtask {
            id: subtask,
            organization: org,
            task,
            name: "Upload".into(),
            tags: BTreeSet::new(),
            visible: true,
            status: SubtaskStatus::NotStarted,
            requires_evidence: true,
            prerequisites: BTreeSet::new(),
        })
        .unwrap();
        let sys = t.tags.get_or_create(org, &subtask.to_string(), false).unwrap();
        let cat = t.tags.get_or_create(org, "Governance", false).unwrap();
        let manual = t.tags.get_or_create(org, "keep-me", true).unwrap();

        let candidates = BTreeSet::from([sys.id, cat.id, manual.id]);
        let removed: BTreeSet<TagId> = t
            .prune_system_tags(org, &candidates)
            .into_iter()
            .map(|tag| tag.id)
            .collect();
        assert_eq!(removed, BTreeSet::from([sys.id, cat.id]));
        assert!(t.tags.get(&manual.id).is_some());
    }
}
