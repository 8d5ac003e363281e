//! # External Catalog
//!
//! Records owned by collaborators outside the core: organizations, controls
//! and their action items, playbook programs with tasks and subtasks,
//! datarooms, vendors, drive folders, officers, teams, and policies. The
//! core reads them to resolve owners and to synthesize documents; it never
//! authors them. Seeding goes through [`Tables`], which checks that every
//! reference stays inside one organization.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use evtag_core::{
    ActionItemId, ControlId, DataroomId, EvtagError, FolderId, OfficerId, OrgVendorId,
    OrganizationId, Owner, OwnerRef, PolicyId, ProgramId, Result, SubtaskId, TagId, TaskId,
    TeamId,
};

use crate::database::Tables;

/// Tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
}

/// A compliance control. Its tags flow to every evidence attached to it
/// or to any of its action items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub id: ControlId,
    pub organization: OrganizationId,
    pub name: String,
    pub tags: BTreeSet<TagId>,
    pub action_items: BTreeSet<ActionItemId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: ActionItemId,
    pub organization: OrganizationId,
    pub name: String,
}

/// A playbook program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    pub organization: OrganizationId,
    pub name: String,
    /// Certification names the program leads to.
    pub certifications: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub organization: OrganizationId,
    pub program: ProgramId,
    pub name: String,
    /// Category name. Evidence attached to any of the task's subtasks
    /// carries a tag of this name.
    pub category: String,
}

/// Subtask progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: SubtaskId,
    pub organization: OrganizationId,
    pub task: TaskId,
    pub name: String,
    /// Manual tags set on the subtask; they flow to attached evidence.
    pub tags: BTreeSet<TagId>,
    pub visible: bool,
    pub status: SubtaskStatus,
    /// Completion also requires at least one attached evidence.
    pub requires_evidence: bool,
    /// Subtasks that must be completed before this one unlocks.
    pub prerequisites: BTreeSet<SubtaskId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataroom {
    pub id: DataroomId,
    pub organization: OrganizationId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgVendor {
    pub id: OrgVendorId,
    pub organization: OrganizationId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    pub organization: OrganizationId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Officer {
    pub id: OfficerId,
    pub organization: OrganizationId,
    pub name: String,
    pub title: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub organization: OrganizationId,
    pub name: String,
    pub members: Vec<TeamMember>,
}

/// The published revision of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVersion {
    pub version: u32,
    /// Body as HTML.
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub organization: OrganizationId,
    /// Kept equal to the name of the policy's evidence.
    pub display_name: String,
    pub published_version: Option<PolicyVersion>,
}

/// Read side of the external catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    organizations: BTreeMap<OrganizationId, Organization>,
    controls: BTreeMap<ControlId, Control>,
    action_items: BTreeMap<ActionItemId, ActionItem>,
    programs: BTreeMap<ProgramId, Program>,
    tasks: BTreeMap<TaskId, Task>,
    subtasks: BTreeMap<SubtaskId, Subtask>,
    datarooms: BTreeMap<DataroomId, Dataroom>,
    org_vendors: BTreeMap<OrgVendorId, OrgVendor>,
    folders: BTreeMap<FolderId, Folder>,
    officers: BTreeMap<OfficerId, Officer>,
    teams: BTreeMap<TeamId, Team>,
    policies: BTreeMap<PolicyId, Policy>,
}

impl Catalog {
    pub fn organization(&self, id: &OrganizationId) -> Option<&Organization> {
        self.organizations.get(id)
    }

    pub fn control(&self, id: &ControlId) -> Option<&Control> {
        self.controls.get(id)
    }

    pub fn action_item(&self, id: &ActionItemId) -> Option<&ActionItem> {
        self.action_items.get(id)
    }

    pub fn program(&self, id: &ProgramId) -> Option<&Program> {
        self.programs.get(id)
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn subtask(&self, id: &SubtaskId) -> Option<&Subtask> {
        self.subtasks.get(id)
    }

    pub fn dataroom(&self, id: &DataroomId) -> Option<&Dataroom> {
        self.datarooms.get(id)
    }

    pub fn folder(&self, id: &FolderId) -> Option<&Folder> {
        self.folders.get(id)
    }

    pub fn officer(&self, id: &OfficerId) -> Option<&Officer> {
        self.officers.get(id)
    }

    pub fn team(&self, id: &TeamId) -> Option<&Team> {
        self.teams.get(id)
    }

    pub fn policy(&self, id: &PolicyId) -> Option<&Policy> {
        self.policies.get(id)
    }

    /// Controls listing `action_item` among their action items.
    pub fn controls_of_action_item(&self, action_item: &ActionItemId) -> Vec<&Control> {
        self.controls
            .values()
            .filter(|c| c.action_items.contains(action_item))
            .collect()
    }

    /// All controls of an organization.
    pub fn controls_in(&self, organization: OrganizationId) -> impl Iterator<Item = &Control> {
        self.controls
            .values()
            .filter(move |c| c.organization == organization)
    }

    /// Officers of an organization, in id order.
    pub fn officers_in(&self, organization: OrganizationId) -> Vec<&Officer> {
        self.officers
            .values()
            .filter(|o| o.organization == organization)
            .collect()
    }

    /// Tasks of a program, in id order.
    pub fn tasks_of(&self, program: &ProgramId) -> Vec<&Task> {
        self.tasks.values().filter(|t| &t.program == program).collect()
    }

    /// Subtasks of a task, in id order.
    pub fn subtasks_of(&self, task: &TaskId) -> Vec<&Subtask> {
        self.subtasks.values().filter(|s| &s.task == task).collect()
    }

    /// All subtasks of an organization.
    pub fn subtasks_in(&self, organization: OrganizationId) -> impl Iterator<Item = &Subtask> {
        self.subtasks
            .values()
            .filter(move |s| s.organization == organization)
    }

    /// Distinct task categories of an organization.
    pub fn categories_in(&self, organization: OrganizationId) -> BTreeSet<&str> {
        self.tasks
            .values()
            .filter(|t| t.organization == organization)
            .map(|t| t.category.as_str())
            .collect()
    }

    /// Category of the task a subtask belongs to.
    pub fn category_of(&self, subtask: &SubtaskId) -> Option<&str> {
        let subtask = self.subtasks.get(subtask)?;
        self.tasks.get(&subtask.task).map(|t| t.category.as_str())
    }

    /// Whether the owner row exists inside its organization.
    pub fn owner_exists(&self, owner: &Owner) -> bool {
        let org = owner.organization;
        match owner.reference {
            OwnerRef::Drive => self.organizations.contains_key(&org),
            OwnerRef::Folder(id) => self.folders.get(&id).is_some_and(|r| r.organization == org),
            OwnerRef::Control(id) => self.controls.get(&id).is_some_and(|r| r.organization == org),
            OwnerRef::ActionItem(id) => self
                .action_items
                .get(&id)
                .is_some_and(|r| r.organization == org),
            OwnerRef::Subtask(id) => self.subtasks.get(&id).is_some_and(|r| r.organization == org),
            OwnerRef::Dataroom(id) => self
                .datarooms
                .get(&id)
                .is_some_and(|r| r.organization == org),
            OwnerRef::OrgVendor(id) => self
                .org_vendors
                .get(&id)
                .is_some_and(|r| r.organization == org),
        }
    }

    /// Whether any control or subtask references `tag`.
    pub fn references_tag(&self, tag: &TagId) -> bool {
        self.controls.values().any(|c| c.tags.contains(tag))
            || self.subtasks.values().any(|s| s.tags.contains(tag))
    }

    /// Replace a control's tag set, returning the previous one.
    ///
    /// Evidence attached to the control is not re-tagged here; the tag
    /// propagator's control reconciliation wraps this call.
    pub fn replace_control_tags(
        &mut self,
        id: &ControlId,
        tags: BTreeSet<TagId>,
    ) -> Option<BTreeSet<TagId>> {
        self.controls
            .get_mut(id)
            .map(|c| std::mem::replace(&mut c.tags, tags))
    }

    /// Update a subtask's progress.
    pub fn set_subtask_status(&mut self, id: &SubtaskId, status: SubtaskStatus) -> bool {
        match self.subtasks.get_mut(id) {
            Some(s) => {
                s.status = status;
                true
            }
            None => false,
        }
    }

    /// Update a policy's display name.
    pub fn rename_policy(&mut self, id: &PolicyId, display_name: &str) -> bool {
        match self.policies.get_mut(id) {
            Some(p) => {
                p.display_name = display_name.to_string();
                true
            }
            None => false,
        }
    }
}

fn same_org(
    entity: &'static str,
    id: impl std::fmt::Display,
    expected: OrganizationId,
    actual: Option<OrganizationId>,
) -> Result<()> {
    match actual {
        Some(org) if org == expected => Ok(()),
        _ => Err(EvtagError::not_found(entity, id)),
    }
}

impl Tables {
    fn require_org(&self, organization: OrganizationId) -> Result<()> {
        if self.catalog.organizations.contains_key(&organization) {
            Ok(())
        } else {
            Err(EvtagError::not_found("organization", organization))
        }
    }

    fn require_tags(&self, organization: OrganizationId, tags: &BTreeSet<TagId>) -> Result<()> {
        for tag in tags {
            same_org(
                "tag",
                tag,
                organization,
                self.tags.get(tag).map(|t| t.organization),
            )?;
        }
        Ok(())
    }

    /// Register an organization. Its Drive exists implicitly.
    pub fn put_organization(&mut self, organization: Organization) {
        self.catalog
            .organizations
            .insert(organization.id, organization);
    }

    pub fn put_action_item(&mut self, item: ActionItem) -> Result<()> {
        self.require_org(item.organization)?;
        self.catalog.action_items.insert(item.id, item);
        Ok(())
    }

    /// Register a new control. Existing controls change tags only through
    /// propagation-aware reconciliation.
    pub fn put_control(&mut self, control: Control) -> Result<()> {
        self.require_org(control.organization)?;
        if self.catalog.controls.contains_key(&control.id) {
            return Err(EvtagError::Conflict {
                constraint: "controls_pkey",
                key: control.id.to_string(),
            });
        }
        self.require_tags(control.organization, &control.tags)?;
        for item in &control.action_items {
            same_org(
                "action item",
                item,
                control.organization,
                self.catalog.action_items.get(item).map(|a| a.organization),
            )?;
        }
        self.catalog.controls.insert(control.id, control);
        Ok(())
    }

    pub fn put_program(&mut self, program: Program) -> Result<()> {
        self.require_org(program.organization)?;
        self.catalog.programs.insert(program.id, program);
        Ok(())
    }

    pub fn put_task(&mut self, task: Task) -> Result<()> {
        same_org(
            "program",
            task.program,
            task.organization,
            self.catalog.programs.get(&task.program).map(|p| p.organization),
        )?;
        self.catalog.tasks.insert(task.id, task);
        Ok(())
    }

    pub fn put_subtask(&mut self, subtask: Subtask) -> Result<()> {
        same_org(
            "task",
            subtask.task,
            subtask.organization,
            self.catalog.tasks.get(&subtask.task).map(|t| t.organization),
        )?;
        self.require_tags(subtask.organization, &subtask.tags)?;
        for prerequisite in &subtask.prerequisites {
            same_org(
                "subtask",
                prerequisite,
                subtask.organization,
                self.catalog.subtasks.get(prerequisite).map(|s| s.organization),
            )?;
        }
        self.catalog.subtasks.insert(subtask.id, subtask);
        Ok(())
    }

    pub fn put_dataroom(&mut self, dataroom: Dataroom) -> Result<()> {
        self.require_org(dataroom.organization)?;
        self.catalog.datarooms.insert(dataroom.id, dataroom);
        Ok(())
    }

    pub fn put_org_vendor(&mut self, vendor: OrgVendor) -> Result<()> {
        self.require_org(vendor.organization)?;
        self.catalog.org_vendors.insert(vendor.id, vendor);
        Ok(())
    }

    pub fn put_folder(&mut self, folder: Folder) -> Result<()> {
        self.require_org(folder.organization)?;
        self.catalog.folders.insert(folder.id, folder);
        Ok(())
    }

    pub fn put_officer(&mut self, officer: Officer) -> Result<()> {
        self.require_org(officer.organization)?;
        self.catalog.officers.insert(officer.id, officer);
        Ok(())
    }

    pub fn put_team(&mut self, team: Team) -> Result<()> {
        self.require_org(team.organization)?;
        self.catalog.teams.insert(team.id, team);
        Ok(())
    }

    pub fn put_policy(&mut self, policy: Policy) -> Result<()> {
        self.require_org(policy.organization)?;
        self.catalog.policies.insert(policy.id, policy);
        Ok(())
    }
}
