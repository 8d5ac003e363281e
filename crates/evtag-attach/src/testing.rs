//! Test fixture: one organization with helpers to seed catalog records
//! and evidence directly into a [`Tables`] value.

use std::collections::BTreeSet;

use evtag_core::config::NamingConfig;
use evtag_core::{
    ActionItemId, ControlId, EvidenceId, OrganizationId, Owner, OwnerRef,
    ProgramId, SubtaskId, TagId, TaskId,
};
use evtag_store::catalog::{
    ActionItem, Control, Organization, Program, Subtask, SubtaskStatus, Task,
};
use evtag_store::{Attachment, BlobRef, Database, NewEvidence, Tables};

pub(crate) struct Fixture {
    pub tables: Tables,
    pub org: OrganizationId,
}

impl Fixture {
    pub fn new() -> Self {
        let mut tables = Tables::default();
        let org = OrganizationId::new();
        tables.put_organization(Organization {
            id: org,
            name: "Acme".into(),
        });
        Self { tables, org }
    }

    pub fn owner(&self, reference: OwnerRef) -> Owner {
        Owner::new(self.org, reference)
    }

    pub fn tag(&mut self, name: &str) -> TagId {
        self.tables.tags.get_or_create(self.org, name, false).unwrap().id
    }

    pub fn action_item(&mut self, name: &str) -> ActionItemId {
        let id = ActionItemId::new();
        self.tables
            .put_action_item(ActionItem {
                id,
                organization: self.org,
                name: name.into(),
            })
            .unwrap();
        id
    }

    pub fn control(&mut self, name: &str, tags: &[&str], items: &[ActionItemId]) -> ControlId {
        let id = ControlId::new();
        let tags = tags.iter().map(|t| self.tag(t)).collect();
        self.tables
            .put_control(Control {
                id,
                organization: self.org,
                name: name.into(),
                tags,
                action_items: items.iter().copied().collect(),
            })
            .unwrap();
        id
    }

    /// A program with one task of `category` and one subtask carrying `tags`.
    pub fn subtask(&mut self, category: &str, tags: &[&str]) -> (ProgramId, TaskId, SubtaskId) {
        let program = ProgramId::new();
        self.tables
            .put_program(Program {
                id: program,
                organization: self.org,
                name: "SOC 2".into(),
                certifications: vec!["SOC 2 Type II".into()],
            })
            .unwrap();
        let task = TaskId::new();
        self.tables
            .put_task(Task {
                id: task,
                organization: self.org,
                program,
                name: "Policies".into(),
                category: category.into(),
            })
            .unwrap();
        let tags: BTreeSet<TagId> = tags.iter().map(|t| self.tag(t)).collect();
        let subtask = self.put_subtask(task, tags);
        (program, task, subtask)
    }

    /// Another subtask in an existing task.
    pub fn subtask_in(&mut self, task: TaskId) -> SubtaskId {
        self.put_subtask(task, BTreeSet::new())
    }

    fn put_subtask(&mut self, task: TaskId, tags: BTreeSet<TagId>) -> SubtaskId {
        let id = SubtaskId::new();
        self.tables
            .put_subtask(Subtask {
                id,
                organization: self.org,
                task,
                name: "Upload evidence".into(),
                tags,
                visible: true,
                status: SubtaskStatus::NotStarted,
                requires_evidence: true,
                prerequisites: BTreeSet::new(),
            })
            .unwrap();
        id
    }

    /// A FILE evidence in the Drive.
    pub fn evidence(&mut self, name: &str) -> EvidenceId {
        let drive = Owner::drive(self.org);
        let blob = BlobRef {
            key: format!("evidence/{name}"),
            sha256: String::new(),
            size: 0,
            content_type: "application/pdf".into(),
        };
        let e = self
            .tables
            .create_evidence(
                self.org,
                NewEvidence::upload(name, blob, None),
                &[drive],
                &NamingConfig::default(),
            )
            .unwrap();
        self.tables.attachments.insert(Attachment::new(drive, e.id, None));
        e.id
    }

    pub fn names(&self, ids: &BTreeSet<TagId>) -> Vec<String> {
        self.tables.tags.names(ids)
    }

    /// Manual and propagated tag names.
    pub fn visible_tags(&self, evidence: EvidenceId) -> Vec<String> {
        let row = self.tables.evidence.get(&evidence).unwrap();
        self.names(&row.tags())
    }

    pub fn system_tags(&self, evidence: EvidenceId) -> Vec<String> {
        let row = self.tables.evidence.get(&evidence).unwrap();
        self.names(&row.system_tags)
    }

    pub fn into_database(self) -> Database {
        let db = Database::new();
        let tables = self.tables;
        db.hydrate(move |t| *t = tables);
        db
    }
}
