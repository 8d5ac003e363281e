//! # Owner Capabilities
//!
//! Owners differ in only a few ways: which tags they pass to attached
//! evidence, whether attaching to them also puts the evidence in the
//! Drive, and which projections go stale when their evidence changes.
//! [`capabilities`] maps each [`OwnerKind`] to a static implementation of
//! [`OwnerCapabilities`]; the attachment manager is written once against
//! that trait.

use std::collections::BTreeSet;

use evtag_cache::ProjectionKey;
use evtag_core::{
    EvidenceId, EvtagError, OrganizationId, Owner, OwnerKind, OwnerRef, Result, TagId,
};
use evtag_store::Tables;

use crate::propagator::{self, Contribution};

/// Tags an owner contributes, before name resolution.
///
/// `tag_names` and `system_tag_names` are created on attach and looked up
/// (never created) on detach.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSpec {
    /// Tags contributed to the propagated layer by id.
    pub tags: BTreeSet<TagId>,
    /// Tags contributed to the propagated layer by name.
    pub tag_names: BTreeSet<String>,
    /// Tags contributed to the system layer by name.
    pub system_tag_names: BTreeSet<String>,
}

impl TagSpec {
    /// Resolve names, creating missing tags.
    pub fn resolve_creating(
        &self,
        tables: &mut Tables,
        organization: OrganizationId,
    ) -> Result<Contribution> {
        let mut tags = self.tags.clone();
        for tag in tables.tags.resolve(organization, &self.tag_names, false)? {
            tags.insert(tag.id);
        }
        let system_tags = tables
            .tags
            .resolve(organization, &self.system_tag_names, false)?
            .into_iter()
            .map(|t| t.id)
            .collect();
        Ok(Contribution { tags, system_tags })
    }

    /// Resolve names against existing tags only.
    pub fn resolve_existing(&self, tables: &Tables, organization: OrganizationId) -> Contribution {
        let lookup = |names: &BTreeSet<String>| -> BTreeSet<TagId> {
            names
                .iter()
                .filter_map(|n| tables.tags.find(organization, n).map(|t| t.id))
                .collect()
        };
        let mut tags = self.tags.clone();
        tags.extend(lookup(&self.tag_names));
        Contribution {
            tags,
            system_tags: lookup(&self.system_tag_names),
        }
    }
}

/// The per-kind behaviour the attachment manager relies on.
pub trait OwnerCapabilities: Send + Sync {
    /// Tags flowing from `owner` to evidence attached to it.
    fn list_tags(&self, _tables: &Tables, _owner: &Owner) -> Result<TagSpec> {
        Ok(TagSpec::default())
    }

    /// Whether attaching evidence here also attaches it to the Drive.
    fn notify_drive_membership(&self) -> bool {
        true
    }

    /// Owner-specific projections that go stale when its evidence changes.
    fn affected_projections(&self, _tables: &Tables, _owner: &Owner) -> Vec<ProjectionKey> {
        Vec::new()
    }

    /// Add the owner's contribution to `evidence`.
    fn propagate_on_attach(
        &self,
        tables: &mut Tables,
        owner: &Owner,
        evidence: EvidenceId,
    ) -> Result<()> {
        let spec = self.list_tags(tables, owner)?;
        let contribution = spec.resolve_creating(tables, owner.organization)?;
        propagator::apply_attach(tables, evidence, &contribution)
    }

    /// Remove the part of the owner's contribution no remaining owner
    /// justifies. Call after the attachment row is gone. Returns the tags
    /// taken off the evidence.
    fn propagate_on_detach(
        &self,
        tables: &mut Tables,
        owner: &Owner,
        evidence: EvidenceId,
    ) -> Result<BTreeSet<TagId>> {
        let contribution = match self.list_tags(tables, owner) {
            Ok(spec) => spec.resolve_existing(tables, owner.organization),
            Err(EvtagError::NotFound { .. }) => Contribution::default(),
            Err(err) => return Err(err),
        };
        propagator::apply_detach(tables, evidence, &contribution)
    }
}

struct Drive;
struct Folder;
struct Control;
struct ActionItem;
struct Subtask;
struct Dataroom;
struct OrgVendor;

impl OwnerCapabilities for Drive {
    fn notify_drive_membership(&self) -> bool {
        false
    }
}

impl OwnerCapabilities for Folder {}

impl OwnerCapabilities for Control {
    fn list_tags(&self, tables: &Tables, owner: &Owner) -> Result<TagSpec> {
        let OwnerRef::Control(id) = owner.reference else {
            return Ok(TagSpec::default());
        };
        let control = tables
            .catalog
            .control(&id)
            .filter(|c| c.organization == owner.organization)
            .ok_or_else(|| EvtagError::not_found("control", id))?;
        Ok(TagSpec {
            tags: control.tags.clone(),
            ..TagSpec::default()
        })
    }
}

impl OwnerCapabilities for ActionItem {
    fn list_tags(&self, tables: &Tables, owner: &Owner) -> Result<TagSpec> {
        let OwnerRef::ActionItem(id) = owner.reference else {
            return Ok(TagSpec::default());
        };
        tables
            .catalog
            .action_item(&id)
            .filter(|a| a.organization == owner.organization)
            .ok_or_else(|| EvtagError::not_found("action item", id))?;
        let tags = tables
            .catalog
            .controls_of_action_item(&id)
            .into_iter()
            .filter(|c| c.organization == owner.organization)
            .flat_map(|c| c.tags.iter().copied())
            .collect();
        Ok(TagSpec {
            tags,
            ..TagSpec::default()
        })
    }
}

impl OwnerCapabilities for Subtask {
    fn list_tags(&self, tables: &Tables, owner: &Owner) -> Result<TagSpec> {
        let OwnerRef::Subtask(id) = owner.reference else {
            return Ok(TagSpec::default());
        };
        let subtask = tables
            .catalog
            .subtask(&id)
            .filter(|s| s.organization == owner.organization)
            .ok_or_else(|| EvtagError::not_found("subtask", id))?;
        let mut tag_names = BTreeSet::new();
        if let Some(category) = tables.catalog.category_of(&id) {
            if !category.trim().is_empty() {
                tag_names.insert(category.trim().to_string());
            }
        }
        Ok(TagSpec {
            tags: subtask.tags.clone(),
            tag_names,
            system_tag_names: BTreeSet::from([id.to_string()]),
        })
    }

    fn affected_projections(&self, tables: &Tables, owner: &Owner) -> Vec<ProjectionKey> {
        let OwnerRef::Subtask(id) = owner.reference else {
            return Vec::new();
        };
        let organization = owner.organization;
        let Some(program) = tables
            .catalog
            .subtask(&id)
            .and_then(|s| tables.catalog.task(&s.task))
            .map(|t| t.program)
        else {
            return Vec::new();
        };
        let mut keys = vec![
            ProjectionKey::ProgramProgress {
                program,
                organization,
            },
            ProjectionKey::VisibleTasks {
                program,
                organization,
            },
        ];
        // Prerequisites may cross tasks, so every task of the program can
        // unlock differently.
        for task in tables.catalog.tasks_of(&program) {
            keys.push(ProjectionKey::UnlockedSubtasksForTask {
                task: task.id,
                organization,
            });
            keys.push(ProjectionKey::AllUnlockedSubtasksForTask {
                task: task.id,
                organization,
            });
        }
        keys
    }
}

impl OwnerCapabilities for Dataroom {}
impl OwnerCapabilities for OrgVendor {}

/// The capability set for an owner kind.
pub fn capabilities(kind: OwnerKind) -> &'static dyn OwnerCapabilities {
    match kind {
        OwnerKind::Drive => &Drive,
        OwnerKind::Folder => &Folder,
        OwnerKind::Control => &Control,
        OwnerKind::ActionItem => &ActionItem,
        OwnerKind::Subtask => &Subtask,
        OwnerKind::Dataroom => &Dataroom,
        OwnerKind::OrgVendor => &OrgVendor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn action_item_inherits_tags_of_every_parent_control() {
        let mut fx = Fixture::new();
        let item = fx.action_item("review access");
        fx.control("CC1", &["t1"], &[item]);
        fx.control("CC2", &["t2", "t3"], &[item]);
        let spec = capabilities(OwnerKind::ActionItem)
            .list_tags(&fx.tables, &fx.owner(OwnerRef::ActionItem(item)))
            .unwrap();
        assert_eq!(fx.names(&spec.tags), ["t1", "t2", "t3"]);
    }

    #[test]
    fn subtask_contributes_system_and_category_tags() {
        let mut fx = Fixture::new();
        let (_, _, subtask) = fx.subtask("Governance", &["board"]);
        let spec = capabilities(OwnerKind::Subtask)
            .list_tags(&fx.tables, &fx.owner(OwnerRef::Subtask(subtask)))
            .unwrap();
        assert_eq!(spec.system_tag_names, BTreeSet::from([subtask.to_string()]));
        assert_eq!(spec.tag_names, BTreeSet::from(["Governance".to_string()]));
        assert_eq!(fx.names(&spec.tags), ["board"]);
    }

    #[test]
    fn foreign_control_is_not_found() {
        let mut fx = Fixture::new();
        let control = fx.control("CC1", &["t1"], &[]);
        let other = Owner::new(OrganizationId::new(), OwnerRef::Control(control));
        let err = capabilities(OwnerKind::Control)
            .list_tags(&fx.tables, &other)
            .unwrap_err();
        assert!(matches!(err, EvtagError::NotFound { entity: "control", .. }));
    }

    #[test]
    fn only_drive_skips_drive_membership() {
        for kind in OwnerKind::all() {
            assert_eq!(
                capabilities(*kind).notify_drive_membership(),
                *kind != OwnerKind::Drive
            );
        }
    }
}
